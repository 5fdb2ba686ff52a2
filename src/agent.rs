use std::future::Future;
use std::sync::Arc;

use crate::config::DeployConfig;
use crate::deploy::lifecycle::LifecycleError;
use crate::deploy::{ReconcileError, Reconciler};
use crate::runtime::SharedRuntime;
use crate::signals;
use crate::webhook::{self, WebhookError};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Startup reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),
    #[error("Failed to ensure the container is running: {0}")]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error("Failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

pub struct Agent {
    reconciler: Arc<Reconciler>,
}

impl Agent {
    pub fn new(runtime: SharedRuntime, config: DeployConfig) -> Self {
        Self {
            reconciler: Arc::new(Reconciler::new(runtime, Arc::new(config))),
        }
    }

    /// Run the startup pass and, when pushes are watched, serve the webhook
    /// until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), AgentError> {
        if self.reconciler.config().watches_pushes() {
            let shutdown = signals::shutdown_signal().map_err(AgentError::Signals)?;
            self.run_until(shutdown).await
        } else {
            self.startup().await
        }
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<(), AgentError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.reconciler.config().watches_pushes() {
            return self.startup().await;
        }

        // Bind first so a taken port fails before anything is touched
        let listener = webhook::bind(&self.reconciler).await?;
        self.startup().await?;
        signals::notify_ready();
        webhook::serve(listener, Arc::clone(&self.reconciler), shutdown).await?;
        log::info!("Webhook listener stopped");
        Ok(())
    }

    /// One reconciliation pass, then make sure the container is up.
    ///
    /// When listening for pushes a failure here is logged rather than
    /// returned, the next push retries the pass.
    pub async fn startup(&self) -> Result<(), AgentError> {
        let config = self.reconciler.config();
        let tolerate = config.watches_pushes();

        if let Err(e) = self.reconciler.reconcile().await {
            if !tolerate {
                return Err(e.into());
            }
            log::error!("Startup reconciliation of {} failed: {e}", config.name);
        }

        if let Err(e) = self.reconciler.ensure_running().await {
            if !tolerate {
                return Err(e.into());
            }
            log::error!("Failed to start {}: {e}", config.name);
        }

        Ok(())
    }
}
