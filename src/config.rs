use crate::images::{Image, ReferenceError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot expand config path {path}: {reason}")]
    Expand { path: String, reason: String },
    #[error("cannot read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file")]
    Toml(#[from] toml::de::Error),
    #[error("config value '{0}' is missing or empty")]
    Missing(&'static str),
    #[error("no target registry: set 'registry' or 'account_id', or pass --registry")]
    NoRegistry,
    #[error("no images configured")]
    NoImages,
    #[error("cannot extract the registry domain from {0}")]
    Domain(String, #[source] url::ParseError),
    #[error("image '{name}' is given more than once on the command line")]
    DuplicateImage { name: String },
    #[error("image '{name}' uses a digest reference ({reference}); mirror by tag instead")]
    DigestReference { name: String, reference: String },
    #[error("invalid image '{name}'")]
    Image {
        name: String,
        #[source]
        source: ReferenceError,
    },
}

/// An entry under `[images]`: either a bare source reference or a table
/// carrying extra resource tags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ImageEntry {
    Source(String),
    Detailed {
        source: String,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
}

impl ImageEntry {
    pub fn source(&self) -> &str {
        match self {
            ImageEntry::Source(s) => s,
            ImageEntry::Detailed { source, .. } => source,
        }
    }

    pub fn tags(&self) -> Option<&HashMap<String, String>> {
        match self {
            ImageEntry::Source(_) => None,
            ImageEntry::Detailed { tags, .. } => Some(tags),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub environment: String,
    pub registry: Option<String>,
    pub account_id: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub images: BTreeMap<String, ImageEntry>,
}

impl MirrorConfig {
    /// Reads the config file at `path`, expanding `~` and environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let expanded = shellexpand::full(path).map_err(|e| ConfigError::Expand {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        let path = PathBuf::from(expanded.into_owned());
        log::debug!("Loading config from {:?}", path);
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: MirrorConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Adds `name=source` pairs given on the command line, replacing config
    /// entries of the same name. Names must be unique within `items`.
    pub fn add_images(&mut self, items: Vec<(String, String)>) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (name, _) in &items {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateImage { name: name.clone() });
            }
        }
        for (name, source) in items {
            check_image(&name, &source)?;
            if self.images.insert(name.clone(), ImageEntry::Source(source)).is_some() {
                log::debug!("Image {} replaced from command line", name);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in &[
            ("region", &self.region),
            ("project", &self.project),
            ("environment", &self.environment),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(*field));
            }
        }
        for (name, entry) in &self.images {
            check_image(name, entry.source())?;
        }
        Ok(())
    }

    /// Host of the registry the target repositories live in.
    pub fn target_registry(&self, cli_override: Option<&str>) -> Result<String, ConfigError> {
        if let Some(host) = cli_override.or_else(|| self.registry.as_deref()) {
            return Ok(host.trim_end_matches('/').to_owned());
        }
        match &self.account_id {
            Some(account) => Ok(format!("{}.dkr.ecr.{}.amazonaws.com", account, self.region)),
            None => Err(ConfigError::NoRegistry),
        }
    }

    /// Tags applied to every repository before `[tags]` and per-image tags.
    pub fn default_tags(&self) -> HashMap<String, String> {
        let mut tags = HashMap::new();
        tags.insert("project".to_owned(), self.project.clone());
        tags.insert("environment".to_owned(), self.environment.clone());
        tags
    }
}

fn check_image(name: &str, source: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Missing("images.<name>"));
    }
    // `@` parses as part of the name, which would turn a digest into a tag.
    if source.contains('@') {
        return Err(ConfigError::DigestReference {
            name: name.to_owned(),
            reference: source.to_owned(),
        });
    }
    Image::parse(source)
        .and_then(|image| image.require_tag().map(|_| ()))
        .map_err(|source| ConfigError::Image {
            name: name.to_owned(),
            source,
        })
}
