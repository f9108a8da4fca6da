use std::fmt;

/// The crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error kind, mirrored from the language-independent contract: the system does not
/// branch on kind, richer diagnosis uses the message.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ErrorKind {
    /// Success (only meaningful inside a [`crate::future::Future`] that was never set to error)
    Ok,
    /// Generic failure
    #[default]
    NotOk,
    /// The condition could not be classified by the caller
    Unknown,
}

/// Error carries a coarse `kind` plus a human message; richer diagnosis is expected to read the
/// message, not branch on the kind.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct CoreError {
    kind: ErrorKind,
    message: String,
}

impl CoreError {
    /// Creates a new error with the given kind and message
    pub fn new<S: fmt::Display>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }
    /// Creates a new `NotOk` error
    pub fn not_ok<S: fmt::Display>(message: S) -> Self {
        Self::new(ErrorKind::NotOk, message)
    }
    /// The error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
    /// The human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The crate error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Module name is empty or was registered twice
    #[error("duplicate or invalid module name: {0}")]
    DuplicateModule(String),
    /// A dependency name does not resolve to any registered module
    #[error("module {0} depends on unknown module {1}")]
    UnknownDependency(String, String),
    /// The dependency graph contains a cycle
    #[error("dependency cycle detected involving module {0}")]
    DependencyCycle(String),
    /// A task's period is not an integer multiple of the scheduler tick, or offset >= period
    #[error("invalid task schedule for {0}: {1}")]
    InvalidTaskSchedule(String, String),
    /// A task name is not unique within its owning module
    #[error("duplicate task name `{1}` for module `{0}`")]
    DuplicateTask(String, String),
    /// A module stayed in `starting` for longer than the configured threshold
    #[error("module {0} stalled in starting state")]
    StartingStall(String),
    /// A module was registered after the controller started running
    #[error("modules cannot be registered after run() has started")]
    AlreadyRunning,
    /// Generic core error carrying a coarse kind, raised by module/operation logic
    #[error(transparent)]
    Core(#[from] CoreError),
    /// A promise was set twice
    #[error("promise set twice")]
    PromiseAlreadySet,
    /// A future was polled/read after it had already been consumed
    #[error("future already consumed")]
    FutureConsumed,
    /// An owned-value handle was empty at the point of dereference
    #[error("owned value handle is empty")]
    HandleEmpty,
    /// I/O error surfaced from configuration loading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration file could not be parsed
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`CoreError::not_ok`] wrapped as [`Error::Core`]
    pub fn not_ok<S: fmt::Display>(message: S) -> Self {
        Error::Core(CoreError::not_ok(message))
    }
}
