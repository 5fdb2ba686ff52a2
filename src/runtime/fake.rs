use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use super::{
    ContainerDescriptor, CreateSpec, DANGLING_TAG, ImageRecord, PullProgress, Result,
    RuntimeClient, RuntimeError,
};
use crate::config::ImageRef;

fn server_error(status_code: u16, message: String) -> RuntimeError {
    RuntimeError::DockerApi(bollard::errors::Error::DockerResponseServerError {
        status_code,
        message,
    })
}

/// The `CreateSpec` that `create_and_start` builds from `config::test_config(name, image)`.
pub fn test_spec(name: &str, image: &str) -> CreateSpec {
    CreateSpec {
        name: name.to_string(),
        image: image.to_string(),
        env: Vec::new(),
        tty: false,
        network_mode: "bridge".to_string(),
        binds: Vec::new(),
        restart_always: true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ImageId(String),
    Pull(String, Option<String>),
    ListImages,
    RemoveImage(String),
    ListContainers,
    Inspect(String),
    Create(CreateSpec),
    Start(String),
    Stop(String),
    Remove(String),
}

impl Call {
    /// Calls that change runtime state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::RemoveImage(_) | Call::Create(_) | Call::Start(_) | Call::Stop(_) | Call::Remove(_)
        )
    }
}

#[derive(Default)]
struct State {
    images: Vec<ImageRecord>,
    tagged: HashMap<String, String>,
    pull_results: VecDeque<String>,
    containers: Vec<ContainerDescriptor>,
    calls: Vec<Call>,
    next_id: u32,
    fail_pull: bool,
    fail_create: bool,
    fail_remove_image: HashSet<String>,
}

impl State {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn tag_image(&mut self, reference: &str, id: &str) {
        if let Some(previous) = self.tagged.insert(reference.to_string(), id.to_string()) {
            if previous != id {
                if let Some(old) = self.images.iter_mut().find(|i| i.id == previous) {
                    old.repo_tags = vec![DANGLING_TAG.to_string()];
                }
            }
        }
        match self.images.iter_mut().find(|i| i.id == id) {
            Some(image) => image.repo_tags = vec![reference.to_string()],
            None => self.images.push(ImageRecord {
                id: id.to_string(),
                repo_tags: vec![reference.to_string()],
            }),
        }
    }
}

/// In-memory runtime that behaves like a small docker engine and records
/// every call made against it.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, reference: &str, id: &str) -> Self {
        self.state.lock().unwrap().tag_image(reference, id);
        self
    }

    pub fn with_image_record(self, id: &str, repo_tags: &[&str]) -> Self {
        self.state.lock().unwrap().images.push(ImageRecord {
            id: id.to_string(),
            repo_tags: repo_tags.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn with_container(self, name: &str, running: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.fresh_id("container-");
            state.containers.push(ContainerDescriptor {
                id,
                names: vec![format!("/{name}")],
                running,
            });
        }
        self
    }

    /// The next pull resolves the reference to `id`.
    pub fn queue_pull(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .pull_results
            .push_back(id.to_string());
    }

    pub fn fail_pull(&self) {
        self.state.lock().unwrap().fail_pull = true;
    }

    pub fn fail_create(&self) {
        self.state.lock().unwrap().fail_create = true;
    }

    pub fn allow_create(&self) {
        self.state.lock().unwrap().fail_create = false;
    }

    pub fn fail_remove_image(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_remove_image
            .insert(id.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn containers_named(&self, name: &str) -> Vec<ContainerDescriptor> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| c.has_name(name))
            .cloned()
            .collect()
    }

    pub fn image_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .images
            .iter()
            .map(|i| i.id.clone())
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Every async call yields once so concurrent callers interleave the way
    /// they would against a real engine.
    async fn enter(&self, call: Call) {
        tokio::task::yield_now().await;
        self.record(call);
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        self.enter(Call::ListImages).await;
        Ok(self.state.lock().unwrap().images.clone())
    }

    async fn image_id(&self, image: &ImageRef) -> Result<Option<String>> {
        let reference = image.to_string();
        self.enter(Call::ImageId(reference.clone())).await;
        Ok(self.state.lock().unwrap().tagged.get(&reference).cloned())
    }

    fn pull_image<'a>(
        &'a self,
        image: &'a ImageRef,
        auth_token: Option<&'a str>,
    ) -> BoxStream<'a, Result<PullProgress>> {
        let reference = image.to_string();
        self.record(Call::Pull(
            reference.clone(),
            auth_token.map(str::to_string),
        ));

        let mut state = self.state.lock().unwrap();
        if state.fail_pull {
            return stream::iter(vec![Err(server_error(
                404,
                format!("pull access denied for {reference}"),
            ))])
            .boxed();
        }
        if let Some(id) = state.pull_results.pop_front() {
            state.tag_image(&reference, &id);
        }

        let events = vec![
            Ok(PullProgress {
                id: Some(image.tag.clone()),
                status: Some(format!("Pulling from {}", image.name)),
                progress: None,
            }),
            Ok(PullProgress {
                id: None,
                status: Some(format!("Status: Image is up to date for {reference}")),
                progress: None,
            }),
        ];
        stream::iter(events).boxed()
    }

    async fn remove_image(&self, id: &str) -> Result<()> {
        self.enter(Call::RemoveImage(id.to_string())).await;
        let mut state = self.state.lock().unwrap();
        if state.fail_remove_image.contains(id) {
            return Err(server_error(
                409,
                format!("conflict: unable to delete {id}, image is being used"),
            ));
        }
        let before = state.images.len();
        state.images.retain(|i| i.id != id);
        if state.images.len() == before {
            return Err(RuntimeError::NotFound(format!("Image {id}")));
        }
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerDescriptor>> {
        self.enter(Call::ListContainers).await;
        Ok(self
            .state
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| all || c.running)
            .cloned()
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor> {
        self.enter(Call::Inspect(id.to_string())).await;
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(format!("Container {id}")))
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String> {
        self.enter(Call::Create(spec.clone())).await;
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(server_error(500, "no space left on device".to_string()));
        }
        let wanted = format!("/{}", spec.name);
        if state.containers.iter().any(|c| c.names.contains(&wanted)) {
            return Err(server_error(
                409,
                format!("Conflict. The container name \"{wanted}\" is already in use"),
            ));
        }
        let id = state.fresh_id("container-");
        state.containers.push(ContainerDescriptor {
            id: id.clone(),
            names: vec![wanted],
            running: false,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.enter(Call::Start(id.to_string())).await;
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| RuntimeError::NotFound(format!("Container {id}")))?;
        container.running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.enter(Call::Stop(id.to_string())).await;
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.iter_mut().find(|c| c.id == id) {
            container.running = false;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.enter(Call::Remove(id.to_string())).await;
        let mut state = self.state.lock().unwrap();
        if state.containers.iter().any(|c| c.id == id && c.running) {
            return Err(server_error(
                409,
                format!("You cannot remove a running container {id}"),
            ));
        }
        state.containers.retain(|c| c.id != id);
        Ok(())
    }
}
