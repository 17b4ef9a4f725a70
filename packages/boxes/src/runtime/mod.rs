// ABOUTME: Container runtime trait consumed by the box manager and image service
// ABOUTME: Defines runtime-neutral request/response types and the runtime error classification

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::Port;

pub mod docker;

pub use docker::DockerRuntime;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Request had no effect, e.g. stopping a container that is not running
    #[error("not modified: {0}")]
    NotModified(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("runtime error: {0}")]
    Api(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }

    /// Stop requests against a container that is already down
    pub fn is_already_stopped(&self) -> bool {
        match self {
            RuntimeError::NotModified(_) => true,
            RuntimeError::Api(msg) | RuntimeError::Conflict(msg) => msg.contains("is not running"),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Run one runtime request, giving up early if `cancel` fires.
pub(crate) async fn call<T, F>(
    cancel: &CancellationToken,
    operation: &'static str,
    target: &str,
    request: F,
) -> crate::error::Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(crate::error::BoxError::Cancelled(format!("{} {}", operation, target))),
        result = request => result.map_err(|e| crate::error::BoxError::runtime(operation, target, e)),
    }
}

/// Container as reported by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    pub id: String,
    /// Runtime name, possibly with a leading `/`
    pub name: String,
    pub image: String,
    pub status: String,
    pub state: String,
    pub ports: Vec<Port>,
}

/// Everything the runtime needs to create a box container.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub ports: Vec<Port>,
    /// `host:container[:mode]`
    pub binds: Vec<String>,
    pub network: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub subnet: String,
}

/// Transient description of one image build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSpec {
    pub tag: String,
    /// Dockerfile name relative to the context root
    pub dockerfile: String,
    /// Tarred build context
    pub context: Vec<u8>,
    pub remove_intermediate: bool,
    pub no_cache: bool,
    pub build_args: HashMap<String, String>,
}

/// One decoded line of the build status stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuildFrame {
    pub stream: Option<String>,
    pub error: Option<String>,
}

impl BuildFrame {
    pub fn log(line: impl Into<String>) -> Self {
        Self {
            stream: Some(line.into()),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            stream: None,
            error: Some(message.into()),
        }
    }
}

/// Build output, fed by a background task until the runtime closes the stream.
pub struct BuildStream {
    pub receiver: tokio::sync::mpsc::Receiver<BuildFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSummary {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub size: i64,
    /// Unix seconds
    pub created: i64,
}

/// Operations vbox needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// All containers, running or not
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    async fn inspect_container(&self, id_or_name: &str) -> Result<ContainerSummary>;

    /// Returns the new container ID. A name collision is reported as [`RuntimeError::Conflict`].
    async fn create_container(&self, spec: &CreateSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str) -> Result<()>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Names of all networks
    async fn list_networks(&self) -> Result<Vec<String>>;

    async fn create_network(&self, spec: &NetworkSpec) -> Result<()>;

    async fn build_image(&self, spec: BuildSpec) -> Result<BuildStream>;

    async fn image_exists(&self, tag: &str) -> Result<bool>;

    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    async fn remove_image(&self, id: &str, force: bool, prune_children: bool) -> Result<()>;
}
