//! Docker runtime backed by bollard.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::models::{
    ContainerCreateBody, CreateImageInfo, HostConfig, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateContainerOptionsBuilder, CreateImageOptions,
    CreateImageOptionsBuilder, InspectContainerOptions, InspectContainerOptionsBuilder,
    ListContainersOptions, ListContainersOptionsBuilder, ListImagesOptions,
    ListImagesOptionsBuilder, RemoveContainerOptions, RemoveContainerOptionsBuilder,
    RemoveImageOptions, RemoveImageOptionsBuilder, StartContainerOptions,
    StartContainerOptionsBuilder, StopContainerOptions, StopContainerOptionsBuilder,
};
use futures_util::stream::{BoxStream, StreamExt};

use super::{
    ContainerDescriptor, CreateSpec, DANGLING_TAG, ImageRecord, PullProgress, Result,
    RuntimeClient, RuntimeError,
};
use crate::config::ImageRef;

const STOP_TIMEOUT_SECS: i32 = 10;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the default method for the platform (unix socket on
    /// Linux/macOS, named pipe on Windows, or `DOCKER_HOST` when set).
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

fn is_status(err: &bollard::errors::Error, code: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

/// Byte counters are only reported while a layer downloads or extracts.
fn pull_progress(info: CreateImageInfo) -> PullProgress {
    let progress = info
        .progress_detail
        .and_then(|detail| Some(format!("{}/{}", detail.current?, detail.total?)));
    PullProgress {
        id: info.id,
        status: info.status,
        progress,
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        let options: ListImagesOptions = ListImagesOptionsBuilder::new().all(false).build();
        let images = self.docker.list_images(Some(options)).await?;

        Ok(images
            .into_iter()
            .map(|image| {
                // Newer engines report dangling images with no tags at all
                let repo_tags = if image.repo_tags.is_empty() {
                    vec![DANGLING_TAG.to_string()]
                } else {
                    image.repo_tags
                };
                ImageRecord {
                    id: image.id,
                    repo_tags,
                }
            })
            .collect())
    }

    async fn image_id(&self, image: &ImageRef) -> Result<Option<String>> {
        match self.docker.inspect_image(&image.to_string()).await {
            Ok(inspect) => Ok(inspect.id),
            Err(e) if is_status(&e, 404) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn pull_image<'a>(
        &'a self,
        image: &'a ImageRef,
        auth_token: Option<&'a str>,
    ) -> BoxStream<'a, Result<PullProgress>> {
        let options: CreateImageOptions = CreateImageOptionsBuilder::new()
            .from_image(&image.name)
            .tag(&image.tag)
            .build();

        let credentials = auth_token.map(|token| DockerCredentials {
            identitytoken: Some(token.to_string()),
            ..Default::default()
        });

        self.docker
            .create_image(Some(options), None, credentials)
            .map(|item| {
                item.map(pull_progress).map_err(RuntimeError::from)
            })
            .boxed()
    }

    async fn remove_image(&self, id: &str) -> Result<()> {
        let options: RemoveImageOptions = RemoveImageOptionsBuilder::new().build();
        self.docker.remove_image(id, Some(options), None).await?;
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerDescriptor>> {
        let options: ListContainersOptions = ListContainersOptionsBuilder::new().all(all).build();
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|summary| {
                let running = summary
                    .state
                    .as_ref()
                    .is_some_and(|state| state.to_string() == "running");
                Some(ContainerDescriptor {
                    id: summary.id?,
                    names: summary.names.unwrap_or_default(),
                    running,
                })
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor> {
        let options: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();

        match self.docker.inspect_container(id, Some(options)).await {
            Ok(info) => Ok(ContainerDescriptor {
                id: info.id.unwrap_or_else(|| id.to_string()),
                names: info.name.into_iter().collect(),
                running: info
                    .state
                    .and_then(|state| state.running)
                    .unwrap_or(false),
            }),
            Err(e) if is_status(&e, 404) => Err(RuntimeError::NotFound(format!("Container {id}"))),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String> {
        // Only `always` is forwarded, other policies keep the engine default
        let restart_policy = spec.restart_always.then(|| RestartPolicy {
            name: Some(RestartPolicyNameEnum::ALWAYS),
            maximum_retry_count: None,
        });

        let host_config = HostConfig {
            binds: if spec.binds.is_empty() {
                None
            } else {
                Some(spec.binds.clone())
            },
            network_mode: Some(spec.network_mode.clone()),
            restart_policy,
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            tty: Some(spec.tty),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options: CreateContainerOptions =
            CreateContainerOptionsBuilder::new().name(&spec.name).build();

        let response = self.docker.create_container(Some(options), body).await?;
        for warning in &response.warnings {
            log::warn!("Runtime warning for container {}: {}", spec.name, warning);
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let options: StartContainerOptions = StartContainerOptionsBuilder::new().build();
        self.docker.start_container(id, Some(options)).await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let options: StopContainerOptions = StopContainerOptionsBuilder::new()
            .t(STOP_TIMEOUT_SECS)
            .build();

        match self.docker.stop_container(id, Some(options)).await {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 304) => {
                log::info!("Container {id} already stopped");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => {
                log::warn!("Container {id} not found, skipping stop");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options: RemoveContainerOptions = RemoveContainerOptionsBuilder::new().build();

        match self.docker.remove_container(id, Some(options)).await {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 404) => {
                log::info!("Container {id} not found, skipping removal");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use bollard::models::ProgressDetail;

    use super::*;

    #[test]
    fn test_pull_progress_formats_layer_counters() {
        let info = CreateImageInfo {
            id: Some("a1b2c3".to_string()),
            status: Some("Downloading".to_string()),
            progress_detail: Some(ProgressDetail {
                current: Some(1024),
                total: Some(4096),
            }),
            ..Default::default()
        };

        let progress = pull_progress(info);

        assert_eq!(progress.id.as_deref(), Some("a1b2c3"));
        assert_eq!(progress.status.as_deref(), Some("Downloading"));
        assert_eq!(progress.progress.as_deref(), Some("1024/4096"));
    }

    #[test]
    fn test_pull_progress_without_counters() {
        let info = CreateImageInfo {
            status: Some("Pulling fs layer".to_string()),
            progress_detail: Some(ProgressDetail {
                current: None,
                total: None,
            }),
            ..Default::default()
        };
        assert_eq!(pull_progress(info).progress, None);

        let info = CreateImageInfo {
            status: Some("Status: Image is up to date for nginx:latest".to_string()),
            ..Default::default()
        };
        assert_eq!(pull_progress(info).progress, None);
    }
}
