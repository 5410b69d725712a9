//! Recording data model.

pub mod types;

pub use types::{
    final_reason, OutputMode, Recording, RecordingProperties, RecordingStatus, AUTOMATIC_STOP,
    LAST_PARTICIPANT_LEFT,
};
