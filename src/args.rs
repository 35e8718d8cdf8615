use crate::images::Image;

/// Splits `name=source` image arguments. Without a `name=` prefix the last
/// path segment of the image name is used as the logical name.
fn image_arg(item: &str) -> anyhow::Result<(String, String)> {
    log::trace!("image_arg called with {}", item);
    match item.find('=') {
        Some(ix) => {
            let name = &item[..ix];
            if name.is_empty() {
                anyhow::bail!("Empty image name in argument '{}'", item);
            }
            Ok((name.to_owned(), item[ix + 1..].to_owned()))
        }
        None => {
            let image = Image::parse(item)?;
            let name = image.name.rsplit('/').next().unwrap_or(&image.name);
            log::trace!("Argument '{}' named {}", item, name);
            Ok((name.to_owned(), item.to_owned()))
        }
    }
}

pub fn process_image_args<'a, I>(args: Option<I>) -> anyhow::Result<Vec<(String, String)>>
where
    I: Iterator<Item = &'a str>,
{
    match args {
        Some(values) => values.map(image_arg).collect(),
        None => Ok(Vec::new()),
    }
}
