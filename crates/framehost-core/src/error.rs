//! Error types for framehost-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for framehost-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in framehost-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Unrecoverable failure while bringing the scheduler up.
    #[error("startup failed: {0}")]
    Startup(String),

    /// A module could not be loaded.
    #[error("failed to load module {}: {message}", path.display())]
    ModuleLoad { path: PathBuf, message: String },

    /// A module with the same path is already registered.
    #[error("module already loaded: {}", .0.display())]
    AlreadyLoaded(PathBuf),

    /// Failed to map or resolve a dynamic library.
    #[error("failed to load library: {0}")]
    Library(#[from] libloading::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// A raw job submitted over the C ABI was malformed.
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// A module hook or handler returned an error.
    #[error("hook error: {0}")]
    Hook(String),

    /// Code called by the scheduler panicked.
    #[error("panicked: {0}")]
    Panic(String),

    /// The scheduler loop already finished and cannot be driven again.
    #[error("scheduler stopped")]
    SchedulerStopped,
}

impl Error {
    /// Build an [`Error::Panic`] from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Error::Panic(message)
    }

    /// Whether the embedder must halt instead of continuing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Startup(_))
    }
}
