pub mod configuration;
pub mod container_management;
pub mod error_handling;
pub mod recording;
pub mod recording_management;
pub mod session_management;
pub mod storage;

pub use error_handling::types::{RecordingError, RequestOutcome};
pub use recording::{OutputMode, Recording, RecordingProperties, RecordingStatus};
pub use recording_management::RecordingManager;
