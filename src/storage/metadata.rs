//! Per-recording metadata file: `<root>/<id>/.recording.<id>`, a JSON object
//! with camelCase keys.

use log::debug;
use std::fs;
use std::path::Path;

use crate::error_handling::types::StorageError;
use crate::recording::Recording;

/// Fixed prefix of every metadata file name.
pub const RECORDING_ENTITY_FILE: &str = ".recording.";

pub fn entity_file_name(recording_id: &str) -> String {
    format!("{}{}", RECORDING_ENTITY_FILE, recording_id)
}

pub fn is_entity_file_name(file_name: &str) -> bool {
    file_name.starts_with(RECORDING_ENTITY_FILE) && file_name.len() > RECORDING_ENTITY_FILE.len()
}

pub fn to_document(recording: &Recording) -> Result<String, StorageError> {
    serde_json::to_string_pretty(recording).map_err(|e| {
        StorageError::WriteFailed(format!("cannot serialize recording {}: {}", recording.id, e))
    })
}

pub fn from_document(document: &str) -> Result<Recording, StorageError> {
    serde_json::from_str(document)
        .map_err(|e| StorageError::ReadFailed(format!("malformed recording metadata: {}", e)))
}

/// Reads one metadata file.
pub fn read_entity_file(path: &Path) -> Result<Recording, StorageError> {
    let content = fs::read_to_string(path)
        .map_err(|e| StorageError::ReadFailed(format!("{}: {}", path.display(), e)))?;
    let recording = from_document(&content)
        .map_err(|e| StorageError::ReadFailed(format!("{}: {}", path.display(), e)))?;
    debug!("Parsed recording {} from {}", recording.id, path.display());
    Ok(recording)
}

/// Writes the metadata file through a temporary file and a rename, so readers
/// never observe a half-written document.
pub fn write_entity_file(dir: &Path, recording: &Recording) -> Result<(), StorageError> {
    let document = to_document(recording)?;
    let target = dir.join(entity_file_name(&recording.id));
    let tmp = dir.join(format!(".{}.metadata.tmp", recording.id));
    fs::write(&tmp, document)
        .map_err(|e| StorageError::WriteFailed(format!("{}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, &target)
        .map_err(|e| StorageError::WriteFailed(format!("{}: {}", target.display(), e)))?;
    debug!("Saved recording {} to {}", recording.id, target.display());
    Ok(())
}
