// ABOUTME: Error taxonomy surfaced by box, image and SSH operations
// ABOUTME: Wraps runtime failures with the operation and target they came from

use crate::runtime::RuntimeError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoxError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("No template matches image '{name}' in {dir}")]
    TemplateNotFound { name: String, dir: PathBuf },

    #[error("Image build failed: {0}")]
    Build(String),

    #[error("Image build cancelled: {0}")]
    BuildCancelled(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("No free port found after {attempts} attempts")]
    PortsExhausted { attempts: u32 },

    #[error("Failed to {operation} {target}: {source}")]
    Runtime {
        operation: &'static str,
        target: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BoxError>;

impl BoxError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        BoxError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn runtime(
        operation: &'static str,
        target: impl Into<String>,
        source: RuntimeError,
    ) -> Self {
        BoxError::Runtime {
            operation,
            target: target.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            BoxError::NotFound(_) => true,
            BoxError::Runtime { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
