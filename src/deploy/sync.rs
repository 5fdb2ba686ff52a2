use futures_util::StreamExt;
use thiserror::Error;

use crate::config::ImageRef;
use crate::runtime::{RuntimeClient, RuntimeError};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to resolve image {image}: {source}")]
    Resolve {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error("Failed to pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: RuntimeError,
    },
}

/// Pulls the target image and reports whether the runtime now resolves it to
/// a different image than before.
pub struct ImageSynchronizer<'a> {
    runtime: &'a dyn RuntimeClient,
}

impl<'a> ImageSynchronizer<'a> {
    pub fn new(runtime: &'a dyn RuntimeClient) -> Self {
        Self { runtime }
    }

    pub async fn sync(&self, image: &ImageRef, auth_token: Option<&str>) -> Result<bool, SyncError> {
        let previous = self.resolve(image).await?;
        log::info!("Pulling image: {image}");

        let mut stream = self.runtime.pull_image(image, auth_token);
        let mut last_status: Option<String> = None;
        while let Some(result) = stream.next().await {
            let info = result.map_err(|source| SyncError::Pull {
                image: image.to_string(),
                source,
            })?;
            if let Some(progress) = &info.progress {
                log::debug!("{}: {}", info.id.as_deref().unwrap_or("-"), progress);
            }
            if let Some(status) = info.status {
                if last_status.as_deref() != Some(status.as_str()) {
                    log::info!("Pull status: {status}");
                    last_status = Some(status);
                }
            }
        }

        let current = self.resolve(image).await?;
        let changed = previous != current;
        if changed {
            log::info!(
                "Image {image} changed: {} -> {}",
                previous.as_deref().unwrap_or("<none>"),
                current.as_deref().unwrap_or("<none>")
            );
        } else {
            log::info!("Image {image} is up to date");
        }
        Ok(changed)
    }

    async fn resolve(&self, image: &ImageRef) -> Result<Option<String>, SyncError> {
        self.runtime
            .image_id(image)
            .await
            .map_err(|source| SyncError::Resolve {
                image: image.to_string(),
                source,
            })
    }
}
