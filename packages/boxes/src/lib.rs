// ABOUTME: Box lifecycle library for vbox: SSH-reachable dev containers on a local runtime
// ABOUTME: Re-exports the manager, image service, SSH config store and runtime abstractions

pub mod credentials;
pub mod error;
pub mod images;
pub mod manager;
pub mod naming;
pub mod ports;
pub mod runtime;
pub mod ssh;
pub mod templates;
pub mod types;

pub use credentials::{Credential, Ed25519KeyGenerator, KeyGenerator};
pub use error::{BoxError, Result};
pub use images::{ImageService, LogSink};
pub use manager::BoxManager;
pub use ports::{PortAllocator, PortProbe, TcpProbe};
pub use runtime::{ContainerRuntime, DockerRuntime, RuntimeError};
pub use ssh::{SshConfigStore, SshHostEntry};
pub use types::{BoxInfo, ImageInfo, ImageRef, Port, Protocol, RunRequest, VolumeBind};
