use crate::runtime::{RuntimeClient, RuntimeError};

/// Result of one collection pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Collected {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Removes dangling images left behind by redeploys.
///
/// Cleanup is best effort: only listing the images can fail the pass, a
/// single removal failure is logged and the rest are still attempted.
pub struct ImageGarbageCollector<'a> {
    runtime: &'a dyn RuntimeClient,
}

impl<'a> ImageGarbageCollector<'a> {
    pub fn new(runtime: &'a dyn RuntimeClient) -> Self {
        Self { runtime }
    }

    pub async fn collect(&self) -> Result<Collected, RuntimeError> {
        let images = self.runtime.list_images().await?;
        let mut collected = Collected::default();

        for image in images.into_iter().filter(|i| i.is_dangling()) {
            match self.runtime.remove_image(&image.id).await {
                Ok(()) => {
                    log::info!("Removed dangling image {}", image.id);
                    collected.removed.push(image.id);
                }
                Err(e) => {
                    log::warn!("Failed to remove dangling image {}: {}", image.id, e);
                    collected.failed.push(image.id);
                }
            }
        }

        Ok(collected)
    }
}
