use crate::config::DeployConfig;
use crate::runtime::{ContainerDescriptor, CreateSpec, RuntimeClient, RuntimeError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Non-detached mode is not supported")]
    DetachRequired,
    #[error("Failed to {action} container {name}: {source}")]
    Runtime {
        action: &'static str,
        name: String,
        #[source]
        source: RuntimeError,
    },
}

fn runtime_err(action: &'static str, name: &str) -> impl FnOnce(RuntimeError) -> LifecycleError {
    let name = name.to_string();
    move |source| LifecycleError::Runtime {
        action,
        name,
        source,
    }
}

/// Stop, remove, create and start transitions for the managed container.
///
/// The container is looked up by name on every call. Nothing is cached, the
/// runtime may have changed since the last step.
pub struct ContainerLifecycleManager<'a> {
    runtime: &'a dyn RuntimeClient,
}

impl<'a> ContainerLifecycleManager<'a> {
    pub fn new(runtime: &'a dyn RuntimeClient) -> Self {
        Self { runtime }
    }

    pub async fn find(&self, name: &str) -> Result<Option<ContainerDescriptor>, LifecycleError> {
        let containers = self
            .runtime
            .list_containers(true)
            .await
            .map_err(runtime_err("list", name))?;
        Ok(containers.into_iter().find(|c| c.has_name(name)))
    }

    pub async fn stop_if_running(&self, name: &str) -> Result<(), LifecycleError> {
        let Some(container) = self.find(name).await? else {
            log::debug!("No container {name} to stop");
            return Ok(());
        };

        let state = match self.runtime.inspect_container(&container.id).await {
            Ok(state) => state,
            Err(RuntimeError::NotFound(_)) => {
                log::warn!("Container {name} disappeared before it could be stopped");
                return Ok(());
            }
            Err(e) => return Err(runtime_err("inspect", name)(e)),
        };

        if !state.running {
            log::debug!("Container {name} is not running");
            return Ok(());
        }

        log::info!("Stopping container: {name}");
        self.runtime
            .stop_container(&container.id)
            .await
            .map_err(runtime_err("stop", name))?;
        log::info!("Container {name} stopped successfully");
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<(), LifecycleError> {
        let Some(container) = self.find(name).await? else {
            log::debug!("No container {name} to remove");
            return Ok(());
        };

        log::info!("Removing container: {name}");
        self.runtime
            .remove_container(&container.id)
            .await
            .map_err(runtime_err("remove", name))?;
        log::info!("Container {name} removed successfully");
        Ok(())
    }

    pub async fn create_and_start(&self, config: &DeployConfig) -> Result<String, LifecycleError> {
        if !config.detach {
            return Err(LifecycleError::DetachRequired);
        }

        let spec = CreateSpec {
            name: config.name.clone(),
            image: config.image.to_string(),
            env: config.env.clone(),
            tty: config.tty,
            network_mode: config.network.clone(),
            binds: config.volumes.clone(),
            restart_always: config.restart_always(),
        };

        log::info!("Creating container: {} from {}", spec.name, spec.image);
        let id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(runtime_err("create", &spec.name))?;

        self.runtime
            .start_container(&id)
            .await
            .map_err(runtime_err("start", &spec.name))?;
        log::info!("Container {} started successfully", spec.name);
        Ok(id)
    }

    /// Start the container if it exists but is stopped. Returns `false` when
    /// there is no container with that name.
    pub async fn start_if_stopped(&self, name: &str) -> Result<bool, LifecycleError> {
        let Some(container) = self.find(name).await? else {
            return Ok(false);
        };
        if !container.running {
            log::info!("Starting stopped container: {name}");
            self.runtime
                .start_container(&container.id)
                .await
                .map_err(runtime_err("start", name))?;
        }
        Ok(true)
    }
}
