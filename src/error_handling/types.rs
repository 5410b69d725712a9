use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    MissingValue(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::MissingValue(e) => write!(f, "Missing configuration value: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures reported by the container runtime client.
#[derive(Debug)]
pub enum ContainerError {
    /// The runtime binary is missing or its daemon cannot be reached.
    RuntimeNotAvailable(String),
    /// The daemon answered but the requested image is not present.
    ImageNotFound(String),
    ImagePullFailed(String),
    CommandFailed(String),
    IoError(std::io::Error),
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::RuntimeNotAvailable(e) => {
                write!(f, "Container runtime not available: {}", e)
            }
            ContainerError::ImageNotFound(e) => write!(f, "Container image not found: {}", e),
            ContainerError::ImagePullFailed(e) => write!(f, "Container image pull failed: {}", e),
            ContainerError::CommandFailed(e) => write!(f, "Container command failed: {}", e),
            ContainerError::IoError(e) => write!(f, "Container IO error: {}", e),
        }
    }
}

impl std::error::Error for ContainerError {}

impl From<std::io::Error> for ContainerError {
    fn from(err: std::io::Error) -> Self {
        ContainerError::IoError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    PathInvalid(String),
    ReadFailed(String),
    WriteFailed(String),
    NotFound,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::PathInvalid(e) => write!(f, "Recording path is not valid: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::NotFound => write!(f, "Storage entry not found"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Errors returned across the recording orchestrator boundary.
#[derive(Debug)]
pub enum RecordingError {
    AlreadyRecording(String),
    NotFound(String),
    Conflict(String),
    InvalidState(String),
    RuntimeUnavailable(String),
    PathInvalid(String),
    StrategyFailure(String),
    Timeout(String),
    Storage(StorageError),
}

/// Closed set of outcomes an API layer maps onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    NotFound,
    Conflict,
    ForbiddenByState,
    InternalFailure,
}

impl RecordingError {
    pub fn outcome(&self) -> RequestOutcome {
        match self {
            RecordingError::NotFound(_) => RequestOutcome::NotFound,
            RecordingError::Conflict(_) | RecordingError::AlreadyRecording(_) => {
                RequestOutcome::Conflict
            }
            RecordingError::InvalidState(_) => RequestOutcome::ForbiddenByState,
            RecordingError::Storage(StorageError::NotFound) => RequestOutcome::NotFound,
            _ => RequestOutcome::InternalFailure,
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::AlreadyRecording(e) => write!(f, "Session is already being recorded: {}", e),
            RecordingError::NotFound(e) => write!(f, "Recording not found: {}", e),
            RecordingError::Conflict(e) => write!(f, "Recording conflict: {}", e),
            RecordingError::InvalidState(e) => write!(f, "Recording in invalid state: {}", e),
            RecordingError::RuntimeUnavailable(e) => write!(f, "Recording runtime unavailable: {}", e),
            RecordingError::PathInvalid(e) => write!(f, "Recording path is not valid: {}", e),
            RecordingError::StrategyFailure(e) => write!(f, "Recording service failure: {}", e),
            RecordingError::Timeout(e) => write!(f, "Recording operation timed out: {}", e),
            RecordingError::Storage(e) => write!(f, "Recording storage error: {}", e),
        }
    }
}

impl std::error::Error for RecordingError {}

impl From<StorageError> for RecordingError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PathInvalid(e) => RecordingError::PathInvalid(e),
            other => RecordingError::Storage(other),
        }
    }
}

impl From<ContainerError> for RecordingError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::RuntimeNotAvailable(e) => RecordingError::RuntimeUnavailable(e),
            ContainerError::ImageNotFound(e) => RecordingError::NotFound(e),
            other => RecordingError::StrategyFailure(other.to_string()),
        }
    }
}
