//! Capability interface over the container runtime.
//!
//! The deployment logic only talks to [`RuntimeClient`]. The production
//! implementation lives in [`docker`]; tests use an in-memory fake.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::config::ImageRef;

pub mod docker;
#[cfg(test)]
pub mod fake;

/// Tag list reported for images without a repository or tag.
pub const DANGLING_TAG: &str = "<none>:<none>";

pub type Result<T> = std::result::Result<T, RuntimeError>;

pub type SharedRuntime = Arc<dyn RuntimeClient>;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
    #[error("{0} not found")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub repo_tags: Vec<String>,
}

impl ImageRecord {
    pub fn is_dangling(&self) -> bool {
        self.repo_tags.len() == 1 && self.repo_tags[0] == DANGLING_TAG
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub id: String,
    pub names: Vec<String>,
    pub running: bool,
}

impl ContainerDescriptor {
    /// The runtime reports names with a leading slash.
    pub fn has_name(&self, name: &str) -> bool {
        let wanted = format!("/{name}");
        self.names.iter().any(|n| *n == wanted)
    }
}

/// One event of an image pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullProgress {
    pub id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<String>,
}

/// Everything needed to create the managed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub tty: bool,
    pub network_mode: String,
    pub binds: Vec<String>,
    pub restart_always: bool,
}

#[async_trait]
pub trait RuntimeClient: Send + Sync {
    async fn list_images(&self) -> Result<Vec<ImageRecord>>;

    /// Resolve the id the runtime currently associates with `image`, or
    /// `None` if it has never been pulled.
    async fn image_id(&self, image: &ImageRef) -> Result<Option<String>>;

    fn pull_image<'a>(
        &'a self,
        image: &'a ImageRef,
        auth_token: Option<&'a str>,
    ) -> BoxStream<'a, Result<PullProgress>>;

    async fn remove_image(&self, id: &str) -> Result<()>;

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerDescriptor>>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor>;

    /// Returns the id of the new container.
    async fn create_container(&self, spec: &CreateSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stopping a container that is already stopped is not an error.
    async fn stop_container(&self, id: &str) -> Result<()>;

    async fn remove_container(&self, id: &str) -> Result<()>;
}
