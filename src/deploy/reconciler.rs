use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use super::gc::ImageGarbageCollector;
use super::lifecycle::{ContainerLifecycleManager, LifecycleError};
use super::sync::{ImageSynchronizer, SyncError};
use crate::config::DeployConfig;
use crate::runtime::SharedRuntime;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Redeployed { container_id: String },
}

/// Runs reconciliation passes against one container.
///
/// Passes are serialized: a trigger that arrives while a pass is running
/// waits for it and then runs its own full pass.
pub struct Reconciler {
    runtime: SharedRuntime,
    config: Arc<DeployConfig>,
    gate: Mutex<()>,
}

impl Reconciler {
    pub fn new(runtime: SharedRuntime, config: Arc<DeployConfig>) -> Self {
        Self {
            runtime,
            config,
            gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Pull the image and, if it changed, replace the container.
    ///
    /// Any failure after the pull aborts the pass. The container may then be
    /// left stopped or removed until the next pass completes the sequence.
    pub async fn reconcile(&self) -> Result<Outcome, ReconcileError> {
        let pass = Uuid::now_v7();
        let _guard = match self.gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::info!("[{pass}] Waiting for the running reconciliation to finish");
                self.gate.lock().await
            }
        };

        let config = &*self.config;
        let runtime = &*self.runtime;
        log::info!("[{pass}] Reconciling {} ({})", config.name, config.image);

        let changed = ImageSynchronizer::new(runtime)
            .sync(&config.image, config.auth_token.as_deref())
            .await?;
        if !changed {
            log::info!("[{pass}] Nothing to do for {}", config.name);
            return Ok(Outcome::Unchanged);
        }

        let lifecycle = ContainerLifecycleManager::new(runtime);
        lifecycle.stop_if_running(&config.name).await?;
        lifecycle.remove(&config.name).await?;
        let container_id = lifecycle.create_and_start(config).await?;

        match ImageGarbageCollector::new(runtime).collect().await {
            Ok(collected) => {
                if !collected.removed.is_empty() {
                    log::info!(
                        "[{pass}] Removed {} dangling image(s)",
                        collected.removed.len()
                    );
                }
                if !collected.failed.is_empty() {
                    log::warn!(
                        "[{pass}] {} dangling image(s) could not be removed: {}",
                        collected.failed.len(),
                        collected.failed.join(", ")
                    );
                }
            }
            Err(e) => log::warn!("[{pass}] Skipping image cleanup: {e}"),
        }

        log::info!("[{pass}] Redeployed {} as {}", config.name, container_id);
        Ok(Outcome::Redeployed { container_id })
    }

    /// Make sure the container exists and runs, creating it if needed.
    pub async fn ensure_running(&self) -> Result<(), LifecycleError> {
        let _guard = self.gate.lock().await;
        let lifecycle = ContainerLifecycleManager::new(&*self.runtime);
        if !lifecycle.start_if_stopped(&self.config.name).await? {
            log::info!("Container {} does not exist, creating it", self.config.name);
            lifecycle.create_and_start(&self.config).await?;
        }
        Ok(())
    }
}
