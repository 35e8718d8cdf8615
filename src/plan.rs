use crate::config::{ConfigError, MirrorConfig};
use crate::images::{target_image, Image};
use crate::tags::{merge_tags, Tag};
use serde::Serialize;
use std::collections::BTreeMap;

pub const COPY_SCRIPT: &str = "ecr-image.sh";
pub const ENV_SOURCE_IMAGE: &str = "ECR_IMAGE_SOURCE_IMAGE";
pub const ENV_TARGET_IMAGE: &str = "ECR_IMAGE_TARGET_IMAGE";
pub const ENV_TARGET_REGION: &str = "ECR_IMAGE_TARGET_REGION";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryPlan {
    pub resource_name: String,
    pub repository_name: String,
    pub repository_uri: String,
    pub image_tag_mutability: &'static str,
    pub scan_on_push: bool,
    pub empty_on_delete: bool,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyCommand {
    pub resource_name: String,
    pub interpreter: Vec<&'static str>,
    pub create: String,
    pub delete: String,
    pub environment: BTreeMap<&'static str, String>,
}

impl CopyCommand {
    fn new(resource_name: String, source: &str, target: &str, region: &str) -> Self {
        let mut environment = BTreeMap::new();
        environment.insert(ENV_SOURCE_IMAGE, source.to_owned());
        environment.insert(ENV_TARGET_IMAGE, target.to_owned());
        environment.insert(ENV_TARGET_REGION, region.to_owned());
        CopyCommand {
            resource_name,
            interpreter: vec!["bash", "-c"],
            create: script_invocation("copy"),
            delete: script_invocation("delete"),
            environment,
        }
    }

    /// Shell `export` lines for running the copy script by hand.
    pub fn to_env_lines(&self) -> String {
        self.environment
            .iter()
            .map(|(k, v)| format!("export {}='{}'\n", k, v.replace('\'', r"'\''")))
            .collect()
    }
}

fn script_invocation(command: &str) -> String {
    format!("ECR_IMAGE_COMMAND={} exec bash {}", command, COPY_SCRIPT)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePlan {
    pub name: String,
    pub source_image: String,
    pub target_image: String,
    pub repository: RepositoryPlan,
    pub command: CopyCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outputs {
    pub images: BTreeMap<String, String>,
    pub registry_domain: String,
    pub registry_region: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorPlan {
    pub images: Vec<ImagePlan>,
    pub outputs: Outputs,
}

impl MirrorPlan {
    /// Lays out one repository and one copy command per configured image.
    pub fn build(config: &MirrorConfig, registry_override: Option<&str>) -> Result<Self, ConfigError> {
        if config.images.is_empty() {
            return Err(ConfigError::NoImages);
        }
        let registry = config.target_registry(registry_override)?;
        let defaults = config.default_tags();
        let mut images = Vec::with_capacity(config.images.len());
        for (name, entry) in &config.images {
            let source = entry.source();
            let image_error = |source| ConfigError::Image {
                name: name.clone(),
                source,
            };
            let tag = Image::parse(source)
                .and_then(|i| i.require_tag().map(str::to_owned))
                .map_err(image_error)?;
            let repository_name = format!("{}/{}", config.project, name);
            let repository_uri = format!("{}/{}", registry, repository_name);
            let target = target_image(source, &repository_uri).map_err(image_error)?;
            log::debug!("Planned {} -> {}", source, target);

            let mut layers = vec![&config.tags];
            layers.extend(entry.tags());
            let command = CopyCommand::new(
                format!("{}:{}", repository_name, tag),
                source,
                &target,
                &config.region,
            );
            images.push(ImagePlan {
                name: name.clone(),
                source_image: source.to_owned(),
                target_image: target,
                repository: RepositoryPlan {
                    resource_name: repository_name.clone(),
                    repository_name,
                    repository_uri,
                    image_tag_mutability: "IMMUTABLE",
                    scan_on_push: false,
                    empty_on_delete: true,
                    tags: merge_tags(&defaults, &layers),
                },
                command,
            });
        }
        let registry_domain = registry_domain(&images[0].target_image)?;
        let outputs = Outputs {
            images: images
                .iter()
                .map(|i| (i.name.clone(), i.target_image.clone()))
                .collect(),
            registry_domain,
            registry_region: config.region.clone(),
        };
        Ok(MirrorPlan { images, outputs })
    }
}

/// Host (and port, if any) of an image reference, read as a URI authority.
pub fn registry_domain(reference: &str) -> Result<String, ConfigError> {
    let url = url::Url::parse(&format!("uri://{}", reference))
        .map_err(|e| ConfigError::Domain(reference.to_owned(), e))?;
    let host = url
        .host_str()
        .ok_or_else(|| ConfigError::Domain(reference.to_owned(), url::ParseError::EmptyHost))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_owned(),
    })
}
