use std::{fmt, path::Path};

use serde::Deserialize;

use crate::cli::Args;

const DEFAULT_TAG: &str = "latest";
const DEFAULT_NETWORK: &str = "bridge";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("No image was given")]
    MissingImage,
    #[error("No container name was given")]
    MissingName,
    #[error("Invalid image reference '{0}'")]
    InvalidImage(String),
    #[error("Non-detached mode is not supported, pass --detach")]
    DetachRequired,
}

/// An image reference split into repository and tag.
///
/// A digest reference (`repo@sha256:...`) keeps the digest in `tag`; since a
/// plain tag can never contain a colon, that is enough to tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    pub fn parse(image: &str) -> Result<Self, ConfigError> {
        let image = image.trim();
        if image.is_empty() {
            return Err(ConfigError::MissingImage);
        }

        let (name, tag) = if let Some((name, digest)) = image.split_once('@') {
            (name, digest)
        } else {
            match image.rsplit_once(':') {
                // A colon followed by a slash belongs to a registry port,
                // e.g. localhost:5000/app
                Some((name, tag)) if !tag.contains('/') => (name, tag),
                _ => (image, DEFAULT_TAG),
            }
        };

        if name.is_empty() || tag.is_empty() {
            return Err(ConfigError::InvalidImage(image.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    pub fn is_digest(&self) -> bool {
        self.tag.contains(':')
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_digest() {
            write!(f, "{}@{}", self.name, self.tag)
        } else {
            write!(f, "{}:{}", self.name, self.tag)
        }
    }
}

/// Restart policy values accepted on the command line.
///
/// Only `always` is forwarded to the runtime. `image-push` turns on the
/// webhook listener. Anything else is accepted and has no effect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RestartPolicy {
    Always,
    ImagePush,
    Other(String),
}

impl From<String> for RestartPolicy {
    fn from(value: String) -> Self {
        match value.trim() {
            "always" => RestartPolicy::Always,
            "image-push" => RestartPolicy::ImagePush,
            _ => RestartPolicy::Other(value),
        }
    }
}

impl From<&str> for RestartPolicy {
    fn from(value: &str) -> Self {
        RestartPolicy::from(value.to_string())
    }
}

/// On-disk form of the deployment settings. Every field is optional so the
/// command line can fill in or override what the file leaves out.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfigFile {
    pub image: Option<String>,
    pub name: Option<String>,
    pub network: Option<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub detach: bool,
    #[serde(default)]
    pub tty: bool,
    #[serde(default)]
    pub restart: Vec<RestartPolicy>,
    pub auth_token: Option<String>,
}

impl DeployConfigFile {
    pub fn try_init_from_string(val: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(val)?)
    }

    pub fn try_init(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::try_init_from_string(&content)
    }
}

/// Immutable deployment settings, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub name: String,
    pub network: String,
    pub volumes: Vec<String>,
    pub env: Vec<String>,
    pub detach: bool,
    pub tty: bool,
    pub restart: Vec<RestartPolicy>,
    pub image: ImageRef,
    pub auth_token: Option<String>,
}

impl DeployConfig {
    /// Load the optional config file and apply command line overrides.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => {
                log::debug!("Reading config file {path:?}");
                DeployConfigFile::try_init(path)?
            }
            None => DeployConfigFile::default(),
        };
        Self::resolve(args, file)
    }

    pub fn resolve(args: Args, file: DeployConfigFile) -> Result<Self, ConfigError> {
        let image = args.image.or(file.image).ok_or(ConfigError::MissingImage)?;
        let name = args
            .name
            .or(file.name)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(ConfigError::MissingName)?;

        let restart = if args.restart.is_empty() {
            file.restart
        } else {
            args.restart.into_iter().map(RestartPolicy::from).collect()
        };

        let config = DeployConfig {
            name,
            network: args
                .network
                .or(file.network)
                .unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
            volumes: prefer_non_empty(args.volumes, file.volumes),
            env: prefer_non_empty(args.env, file.env),
            detach: args.detach || file.detach,
            tty: args.tty || file.tty,
            restart,
            image: ImageRef::parse(&image)?,
            auth_token: args.auth_token.or(file.auth_token),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.detach {
            return Err(ConfigError::DetachRequired);
        }
        for policy in &self.restart {
            if let RestartPolicy::Other(value) = policy {
                log::warn!("Restart policy '{value}' is not supported and has no effect");
            }
        }
        Ok(())
    }

    pub fn restart_always(&self) -> bool {
        self.restart.contains(&RestartPolicy::Always)
    }

    pub fn watches_pushes(&self) -> bool {
        self.restart.contains(&RestartPolicy::ImagePush)
    }
}

fn prefer_non_empty(cli: Vec<String>, file: Vec<String>) -> Vec<String> {
    if cli.is_empty() { file } else { cli }
}

#[cfg(test)]
pub(crate) fn test_config(name: &str, image: &str) -> DeployConfig {
    DeployConfig {
        name: name.to_string(),
        network: DEFAULT_NETWORK.to_string(),
        volumes: Vec::new(),
        env: Vec::new(),
        detach: true,
        tty: false,
        restart: vec![RestartPolicy::Always],
        image: ImageRef::parse(image).expect("valid image"),
        auth_token: None,
    }
}
