// ABOUTME: Error types separating per-message failures from fatal task failures
// ABOUTME: DeliveryError/StorageError/BusError stay local; TaskFailure ends the process

use std::path::PathBuf;

/// A backend could not deliver one outbound message.
///
/// Logged by the outbound direction and otherwise ignored; the loop moves on
/// to the next message.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("backend rejected message: {0}")]
    Rejected(String),
    #[error("no backend room for target '{0}'")]
    UnknownRoom(String),
    #[error("unrecognized image format")]
    UnsupportedImage,
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

impl DeliveryError {
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        Self::Transport(err.into())
    }
}

/// The content store could not persist a blob.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("payload is not a recognized image format")]
    UnrecognizedImage,
    #[error("url '{0}' was not issued by this store")]
    ForeignUrl(String),
}

/// Publishing to the bus failed for one message.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus closed")]
    Closed,
}

/// Terminal outcome of a supervised task.
///
/// Only the supervisor builds these. Any variant, including a clean exit,
/// means a relay leg is gone and the process must stop.
#[derive(Debug, thiserror::Error)]
pub enum TaskFailure {
    #[error("task '{task}' failed: {error:#}")]
    Failed { task: String, error: anyhow::Error },
    #[error("task '{task}' panicked: {message}")]
    Panicked { task: String, message: String },
    #[error("task '{task}' exited")]
    Exited { task: String },
}

impl TaskFailure {
    /// Name of the task that died
    pub fn task(&self) -> &str {
        match self {
            TaskFailure::Failed { task, .. }
            | TaskFailure::Panicked { task, .. }
            | TaskFailure::Exited { task } => task,
        }
    }
}
