use std::fmt;

/// Errors from parsing a source image reference or deriving its target.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("cannot parse the image reference '{reference}': {reason}")]
    Parse { reference: String, reason: &'static str },
    #[error("cannot extract the tag from the source image {0}")]
    MissingTag(String),
}

impl ReferenceError {
    fn parse(reference: &str, reason: &'static str) -> Self {
        ReferenceError::Parse {
            reference: reference.to_owned(),
            reason,
        }
    }
}

/// A source image reference of the form `registry/name[:tag]`.
///
/// The registry is everything before the first `/` and may carry a port.
/// The name never contains a `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub registry: String,
    pub name: String,
    pub tag: Option<String>,
}

impl Image {
    pub fn parse(inp: &str) -> Result<Self, ReferenceError> {
        log::trace!("Image::parse called with {}", inp);
        if inp.is_empty() {
            return Err(ReferenceError::parse(inp, "empty reference"));
        }
        let (registry, rest) = match inp.find('/') {
            Some(ix) => (&inp[..ix], &inp[ix + 1..]),
            None => return Err(ReferenceError::parse(inp, "no registry separator")),
        };
        if registry.is_empty() {
            return Err(ReferenceError::parse(inp, "empty registry"));
        }
        let (name, tag) = match rest.rfind(':') {
            Some(ix) => {
                log::trace!("Image has tag starting at {}", ix + 1);
                (&rest[..ix], Some(&rest[ix + 1..]))
            }
            None => (rest, None),
        };
        if name.is_empty() {
            return Err(ReferenceError::parse(inp, "empty name"));
        }
        if name.contains(':') {
            return Err(ReferenceError::parse(inp, "name contains a colon"));
        }
        match tag {
            Some("") => return Err(ReferenceError::parse(inp, "empty tag")),
            Some(t) if t.contains('/') => {
                return Err(ReferenceError::parse(inp, "tag contains a slash"))
            }
            _ => (),
        }
        Ok(Image {
            registry: registry.to_owned(),
            name: name.to_owned(),
            tag: tag.map(str::to_owned),
        })
    }

    /// Returns the tag, failing when the reference has none.
    pub fn require_tag(&self) -> Result<&str, ReferenceError> {
        self.tag
            .as_deref()
            .ok_or_else(|| ReferenceError::MissingTag(self.to_string()))
    }

    /// Host serving the registry API for this image.
    pub fn registry_host(&self) -> &str {
        match self.registry.as_str() {
            "docker.io" => "registry-1.docker.io",
            other => other,
        }
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}

/// Appends the source image's tag to the target repository.
///
/// Registry and name of the source never reach the target reference.
pub fn target_image(source_image: &str, target_repository_uri: &str) -> Result<String, ReferenceError> {
    let image = Image::parse(source_image)?;
    let tag = image.require_tag()?;
    Ok([target_repository_uri, ":", tag].concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = "123.dkr.ecr.eu-west-1.amazonaws.com/proj/example";

    #[test]
    fn parse_full_reference() {
        let i = Image::parse("docker.io/ruilopes/example-docker-buildx-go:v1.11.0").unwrap();
        assert_eq!(i.registry, "docker.io");
        assert_eq!(i.name, "ruilopes/example-docker-buildx-go");
        assert_eq!(i.tag.as_deref(), Some("v1.11.0"));
    }

    #[test]
    fn parse_without_tag() {
        let i = Image::parse("ghcr.io/rgl/hello-etcd").unwrap();
        assert_eq!(i.registry, "ghcr.io");
        assert_eq!(i.name, "rgl/hello-etcd");
        assert_eq!(i.tag, None);
    }

    #[test]
    fn parse_registry_with_port() {
        let i = Image::parse("localhost:5000/app").unwrap();
        assert_eq!(i.registry, "localhost:5000");
        assert_eq!(i.name, "app");
        assert_eq!(i.tag, None);

        let i = Image::parse("localhost:5000/team/app:2").unwrap();
        assert_eq!(i.registry, "localhost:5000");
        assert_eq!(i.name, "team/app");
        assert_eq!(i.tag.as_deref(), Some("2"));
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in &[
            "",
            "ubuntu",
            "ubuntu:22.04",
            "/app:1",
            "ghcr.io/",
            "ghcr.io/:1",
            "ghcr.io/app:",
            "ghcr.io/app:1:2",
            "ghcr.io/app:1/2",
        ] {
            match Image::parse(bad) {
                Err(ReferenceError::Parse { reference, .. }) => assert_eq!(&reference, bad),
                other => panic!("expected parse error for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn parse_keeps_at_sign_in_name() {
        let i = Image::parse("ghcr.io/app@sha256:abc").unwrap();
        assert_eq!(i.registry, "ghcr.io");
        assert_eq!(i.name, "app@sha256");
        assert_eq!(i.tag.as_deref(), Some("abc"));

        let i = Image::parse("ghcr.io/user@corp/app").unwrap();
        assert_eq!(i.name, "user@corp/app");
        assert_eq!(i.tag, None);
    }

    #[test]
    fn display_matches_input() {
        for s in &["ghcr.io/rgl/hello-etcd:0.0.2", "ghcr.io/rgl/hello-etcd"] {
            assert_eq!(Image::parse(s).unwrap().to_string(), *s);
        }
    }

    #[test]
    fn docker_hub_uses_registry_one() {
        let i = Image::parse("docker.io/library/alpine:3").unwrap();
        assert_eq!(i.registry_host(), "registry-1.docker.io");
        let i = Image::parse("ghcr.io/rgl/hello-etcd:0.0.2").unwrap();
        assert_eq!(i.registry_host(), "ghcr.io");
    }

    #[test]
    fn target_image_appends_tag() {
        assert_eq!(
            target_image("docker.io/foo/bar:1.2.3", TARGET).unwrap(),
            "123.dkr.ecr.eu-west-1.amazonaws.com/proj/example:1.2.3"
        );
    }

    #[test]
    fn target_image_requires_tag() {
        assert_eq!(
            target_image("ghcr.io/rgl/hello-etcd", TARGET),
            Err(ReferenceError::MissingTag("ghcr.io/rgl/hello-etcd".to_owned()))
        );
        assert_eq!(
            target_image("localhost:5000/app", TARGET),
            Err(ReferenceError::MissingTag("localhost:5000/app".to_owned()))
        );
    }

    #[test]
    fn target_image_propagates_parse_error() {
        match target_image("hello-etcd:0.0.2", TARGET) {
            Err(ReferenceError::Parse { .. }) => (),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn target_image_is_repeatable() {
        let a = target_image("ghcr.io/rgl/hello-etcd:0.0.2", TARGET).unwrap();
        let b = target_image("ghcr.io/rgl/hello-etcd:0.0.2", TARGET).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn target_tag_matches_source_tag() {
        let source = "ghcr.io/rgl/hello-etcd:0.0.2";
        let target = target_image(source, TARGET).unwrap();
        let tag = Image::parse(source).unwrap().tag.unwrap();
        assert_eq!(&target[target.rfind(':').unwrap() + 1..], tag);
    }
}
