use crate::images::Image;
use dkregistry::v2::Client;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;

const REGISTRY_CRED_USR: &str = "REGISTRY_CRED_USR";
const REGISTRY_CRED_PSW: &str = "REGISTRY_CRED_PSW";

/// Connects to `host`, taking credentials from the environment and, when
/// given, a docker config file.
fn connect(host: &str, docker_config: Option<&Path>) -> anyhow::Result<Client> {
    let mut config = Client::configure()
        .registry(host)
        .username(std::env::var(REGISTRY_CRED_USR).ok())
        .password(std::env::var(REGISTRY_CRED_PSW).ok());
    if let Some(path) = docker_config {
        config = config.read_credentials(File::open(path)?);
    }
    Ok(config.build()?)
}

/// One `repository:<name>:pull` scope per distinct repository.
fn pull_scopes(items: &[(String, Image)]) -> Vec<String> {
    let repos: BTreeSet<&str> = items.iter().map(|(_, i)| i.name.as_str()).collect();
    repos
        .into_iter()
        .map(|repo| format!("repository:{}:pull", repo))
        .collect()
}

/// Groups `(name, image)` pairs by the host serving their registry.
fn by_registry_host(images: Vec<(String, Image)>) -> BTreeMap<String, Vec<(String, Image)>> {
    let mut grouped: BTreeMap<String, Vec<(String, Image)>> = BTreeMap::new();
    for (name, image) in images {
        grouped
            .entry(image.registry_host().to_owned())
            .or_default()
            .push((name, image));
    }
    grouped
}

/// Returns the names of the images whose tag has no manifest in the source
/// registry. Only manifests are queried; nothing is pulled.
pub async fn find_missing_images(
    config_file: Option<&Path>,
    images: Vec<(String, Image)>,
) -> anyhow::Result<Vec<String>> {
    let mut missing = Vec::new();
    for (host, items) in by_registry_host(images) {
        log::debug!("Querying {} for images: {:?}", host, items);
        let scopes = pull_scopes(&items);
        let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
        let client = connect(&host, config_file)?.authenticate(&scopes).await?;
        for (name, image) in &items {
            let tag = image.require_tag()?;
            if client.has_manifest(&image.name, tag, None).await?.is_none() {
                log::info!("{} not found in {}", image, host);
                missing.push(name.clone());
            }
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_api_host() {
        let images = vec![
            ("a".to_owned(), Image::parse("docker.io/library/alpine:3").unwrap()),
            ("b".to_owned(), Image::parse("ghcr.io/rgl/hello-etcd:0.0.2").unwrap()),
            ("c".to_owned(), Image::parse("docker.io/ruilopes/x:1").unwrap()),
        ];
        let grouped = by_registry_host(images);
        let hosts: Vec<_> = grouped.keys().map(String::as_str).collect();
        assert_eq!(hosts, vec!["ghcr.io", "registry-1.docker.io"]);
        let names: Vec<_> = grouped["registry-1.docker.io"]
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn one_scope_per_repository() {
        let items = vec![
            ("a".to_owned(), Image::parse("ghcr.io/rgl/hello-etcd:0.0.1").unwrap()),
            ("b".to_owned(), Image::parse("ghcr.io/rgl/hello-etcd:0.0.2").unwrap()),
            ("c".to_owned(), Image::parse("ghcr.io/rgl/example:1").unwrap()),
        ];
        assert_eq!(
            pull_scopes(&items),
            vec!["repository:rgl/example:pull", "repository:rgl/hello-etcd:pull"]
        );
    }
}
