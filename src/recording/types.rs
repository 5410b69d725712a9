//! Recording entity, its status machine and the naming rules derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reasons that all mean "the last participant left the session".
pub const LAST_PARTICIPANT_LEFT_REASONS: [&str; 4] = [
    "disconnect",
    "forceDisconnectByUser",
    "forceDisconnectByServer",
    "networkDisconnect",
];

pub const LAST_PARTICIPANT_LEFT: &str = "lastParticipantLeft";
pub const AUTOMATIC_STOP: &str = "automaticStop";

/// Normalizes a stop reason before it is persisted.
pub fn final_reason(reason: &str) -> String {
    if LAST_PARTICIPANT_LEFT_REASONS.contains(&reason) {
        LAST_PARTICIPANT_LEFT.to_string()
    } else {
        reason.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputMode {
    /// Every stream mixed into one file by a shared worker.
    Composed,
    /// One file per published stream, bundled as a zip.
    Individual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Starting,
    Started,
    Stopped,
    Available,
    Failed,
}

impl RecordingStatus {
    /// `Starting` and `Started` recordings are still owned by a live worker.
    pub fn is_active(&self) -> bool {
        matches!(self, RecordingStatus::Starting | RecordingStatus::Started)
    }

    /// `Stopped` and `Available` recordings are complete on disk.
    pub fn is_finished(&self) -> bool {
        matches!(self, RecordingStatus::Stopped | RecordingStatus::Available)
    }
}

/// Caller-supplied options for a new recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingProperties {
    pub name: Option<String>,
    pub output_mode: OutputMode,
    pub has_audio: bool,
    pub has_video: bool,
    pub resolution: Option<String>,
}

impl Default for RecordingProperties {
    fn default() -> Self {
        RecordingProperties {
            name: None,
            output_mode: OutputMode::Composed,
            has_audio: true,
            has_video: true,
            resolution: None,
        }
    }
}

/// A recording of one session, as persisted in its metadata file.
///
/// `url` is never trusted from disk: the catalog recomputes it on every read,
/// so it is present exactly when `status` is `Available`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub output_mode: OutputMode,
    pub has_audio: bool,
    pub has_video: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub status: RecordingStatus,
    /// Creation time in milliseconds since the epoch.
    pub created_at: i64,
    /// Seconds between creation and stop.
    #[serde(default)]
    pub duration: f64,
    /// Bytes of media produced.
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Recording {
    /// Builds a `Starting` recording for `session_id` from the caller's properties.
    pub fn starting(id: &str, session_id: &str, properties: &RecordingProperties) -> Self {
        Recording {
            id: id.to_string(),
            session_id: session_id.to_string(),
            name: properties.name.clone().unwrap_or_else(|| id.to_string()),
            output_mode: properties.output_mode,
            has_audio: properties.has_audio,
            has_video: properties.has_video,
            resolution: properties.resolution.clone(),
            status: RecordingStatus::Starting,
            created_at: Utc::now().timestamp_millis(),
            duration: 0.0,
            size: 0,
            url: None,
            reason: None,
        }
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }

    /// Extension of the artifact a finished recording exposes.
    pub fn extension(&self) -> &'static str {
        match self.output_mode {
            OutputMode::Composed if self.has_video => "mp4",
            OutputMode::Composed => "webm",
            OutputMode::Individual => "zip",
        }
    }

    /// Derives the public URL of a finished recording.
    ///
    /// With public access a `Stopped` or `Available` recording is `Available`
    /// at a freshly computed URL. Otherwise it has no URL, and `Available`
    /// falls back to `Stopped`.
    pub fn apply_public_url(&mut self, public_access: bool, base_url: &str) {
        let finished = matches!(
            self.status,
            RecordingStatus::Stopped | RecordingStatus::Available
        );
        if public_access && finished {
            self.url = Some(format!(
                "{}/recordings/{}/{}.{}",
                base_url.trim_end_matches('/'),
                self.id,
                self.name,
                self.extension()
            ));
            self.status = RecordingStatus::Available;
        } else {
            if self.status == RecordingStatus::Available {
                self.status = RecordingStatus::Stopped;
            }
            self.url = None;
        }
    }
}
