//! Error types for the audio relay

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Capture stream closed")]
    CaptureClosed,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Wire frame reassembly errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Declared frame length {declared} exceeds limit of {max} bytes")]
    TooLarge { declared: u64, max: usize },
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Worker spawn failed: {0}")]
    SpawnFailed(String),

    #[error("HTTP request failed: {0}")]
    Http(String),
}

/// Input registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Endpoint {endpoint} is already registered by input {owner}")]
    EndpointConflict { endpoint: String, owner: String },

    #[error("Unknown output: {0}")]
    UnknownOutput(String),
}

/// Stream control errors (input and output hosts)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid stream target: {0}")]
    InvalidTarget(String),

    #[error("Stream already running: {0}")]
    AlreadyRunning(String),

    #[error("Input already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Remote unreachable: {0}")]
    Unreachable(String),
}

/// Trigger dispatch errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Trigger not found: {0}")]
    NotFound(String),

    #[error("Trigger already exists: {0}")]
    AlreadyExists(String),

    #[error("Action {action} not found in trigger {trigger}")]
    ActionNotFound { trigger: String, action: String },
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
