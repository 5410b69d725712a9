use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::configuration::Config;
use crate::error_handling::types::StorageError;
use crate::recording::Recording;
use crate::storage::metadata::{self, entity_file_name, is_entity_file_name};

const WRITE_PROBE_FILE: &str = ".sessrec-write-probe";

/// Filesystem catalog of recordings, authoritative across restarts.
///
/// Layout: `<root>/<recordingId>/` holds the media artifacts plus the metadata
/// file `.recording.<recordingId>`. Reads never mutate disk; the URL and the
/// `Available` status are derived on the fly from the public-access settings.
pub struct HostCatalog {
    root: PathBuf,
    public_access: bool,
    public_url: String,
}

impl HostCatalog {
    pub fn new(config: &Config) -> Self {
        Self::with_root(&config.recording_path, config.public_access, &config.public_url)
    }

    pub fn with_root<P: AsRef<Path>>(root: P, public_access: bool, public_url: &str) -> Self {
        HostCatalog {
            root: root.as_ref().to_path_buf(),
            public_access,
            public_url: public_url.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the recording root if needed and checks that it is writable.
    pub fn init_path(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            error!("Failed to create recording path {}: {}", self.root.display(), e);
            StorageError::PathInvalid(format!("{}: {}", self.root.display(), e))
        })?;

        let probe = self.root.join(WRITE_PROBE_FILE);
        fs::write(&probe, b"").map_err(|e| {
            error!("Recording path {} is not writable: {}", self.root.display(), e);
            StorageError::PathInvalid(format!(
                "{}: the process needs write permissions ({})",
                self.root.display(),
                e
            ))
        })?;
        let _ = fs::remove_file(&probe);

        info!("Recording path: {}", self.root.display());
        Ok(())
    }

    pub fn recording_dir(&self, recording_id: &str) -> PathBuf {
        self.root.join(recording_id)
    }

    pub fn metadata_path(&self, recording_id: &str) -> PathBuf {
        self.recording_dir(recording_id)
            .join(entity_file_name(recording_id))
    }

    /// Persists `recording`, creating its directory when needed.
    pub fn write_metadata(&self, recording: &Recording) -> Result<(), StorageError> {
        if !is_valid_id(&recording.id) {
            return Err(StorageError::WriteFailed(format!(
                "invalid recording id '{}'",
                recording.id
            )));
        }
        let dir = self.recording_dir(&recording.id);
        fs::create_dir_all(&dir).map_err(|e| {
            error!("Failed to create recording dir {}: {}", dir.display(), e);
            StorageError::WriteFailed(format!("{}: {}", dir.display(), e))
        })?;
        metadata::write_entity_file(&dir, recording)
    }

    /// Reads one recording; `Ok(None)` when it has no metadata file.
    pub fn get(&self, recording_id: &str) -> Result<Option<Recording>, StorageError> {
        if !is_valid_id(recording_id) {
            return Ok(None);
        }
        let path = self.metadata_path(recording_id);
        debug!("Looking up recording metadata at {}", path.display());
        if !path.is_file() {
            return Ok(None);
        }
        let mut recording = metadata::read_entity_file(&path)?;
        recording.apply_public_url(self.public_access, &self.public_url);
        Ok(Some(recording))
    }

    /// Every recording on disk, ordered by id.
    ///
    /// Unreadable or malformed entries are skipped with a warning.
    pub fn list_all(&self) -> Result<Vec<Recording>, StorageError> {
        let mut recordings = Vec::new();
        for dir in self.recording_dirs()? {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping unreadable recording dir {}: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let is_entity = path.is_file()
                    && entry
                        .file_name()
                        .to_str()
                        .map(is_entity_file_name)
                        .unwrap_or(false);
                if !is_entity {
                    continue;
                }
                match metadata::read_entity_file(&path) {
                    Ok(mut recording) => {
                        recording.apply_public_url(self.public_access, &self.public_url);
                        recordings.push(recording);
                    }
                    Err(e) => warn!("Skipping recording metadata {}: {}", path.display(), e),
                }
            }
        }
        recordings.sort_by(|a, b| a.id.cmp(&b.id));
        debug!("Loaded {} recording(s) from {}", recordings.len(), self.root.display());
        Ok(recordings)
    }

    /// Recordings whose status is `Stopped` or `Available`.
    pub fn list_finished(&self) -> Result<Vec<Recording>, StorageError> {
        let mut recordings = self.list_all()?;
        recordings.retain(|r| r.status.is_finished());
        Ok(recordings)
    }

    /// Names of every first-level directory under the root.
    pub fn recording_ids(&self) -> Result<HashSet<String>, StorageError> {
        Ok(self
            .recording_dirs()?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect())
    }

    /// Returns `preferred` if no directory uses it yet, otherwise the first free
    /// `preferred-N` with `N >= 1`.
    ///
    /// Two concurrent calls may return the same id; the registry decides.
    pub fn allocate_free_id(&self, session_id: &str, preferred: &str) -> Result<String, StorageError> {
        self.allocate_free_id_excluding(session_id, preferred, &[])
    }

    /// Like [`allocate_free_id`](Self::allocate_free_id), also skipping `reserved` ids
    /// that have no directory yet.
    pub fn allocate_free_id_excluding(
        &self,
        session_id: &str,
        preferred: &str,
        reserved: &[String],
    ) -> Result<String, StorageError> {
        let mut taken = self.recording_ids()?;
        taken.extend(reserved.iter().cloned());
        let mut candidate = preferred.to_string();
        let mut suffix = 1u32;
        while taken.contains(&candidate) {
            candidate = format!("{}-{}", preferred, suffix);
            suffix += 1;
        }
        debug!("Allocated recording id {} for session {}", candidate, session_id);
        Ok(candidate)
    }

    pub fn exists(&self, recording_id: &str) -> bool {
        is_valid_id(recording_id) && self.recording_dir(recording_id).is_dir()
    }

    /// Recursively removes a recording directory.
    ///
    /// Individual files that cannot be removed are logged and skipped.
    pub fn delete(&self, recording_id: &str) -> Result<(), StorageError> {
        if !self.exists(recording_id) {
            return Err(StorageError::NotFound);
        }
        let dir = self.recording_dir(recording_id);
        let failures = remove_tree(&dir);
        if failures > 0 {
            warn!(
                "Recording {} removed with {} entr(y/ies) left behind in {}",
                recording_id,
                failures,
                dir.display()
            );
        } else {
            info!("Recording {} deleted from {}", recording_id, dir.display());
        }
        Ok(())
    }

    /// Bytes of media in a recording directory, metadata excluded.
    pub fn recording_size(&self, recording_id: &str) -> u64 {
        tree_size(&self.recording_dir(recording_id))
    }

    fn recording_dirs(&self) -> Result<Vec<PathBuf>, StorageError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            error!("Failed to read recording path {}: {}", self.root.display(), e);
            StorageError::ReadFailed(format!("{}: {}", self.root.display(), e))
        })?;
        let mut dirs = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) if entry.path().is_dir() => dirs.push(entry.path()),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry in {}: {}", self.root.display(), e),
            }
        }
        Ok(dirs)
    }
}

/// Ids are single path components.
fn is_valid_id(recording_id: &str) -> bool {
    !recording_id.is_empty()
        && recording_id != "."
        && recording_id != ".."
        && !recording_id.contains(['/', '\\'])
}

/// Removes `path` depth-first and returns how many entries could not be removed.
fn remove_tree(path: &Path) -> usize {
    let mut failures = 0;
    match fs::read_dir(path) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let child = entry.path();
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    failures += remove_tree(&child);
                } else if let Err(e) = fs::remove_file(&child) {
                    warn!("Couldn't delete file {}: {}", child.display(), e);
                    failures += 1;
                }
            }
        }
        Err(e) => warn!("Couldn't list folder {}: {}", path.display(), e),
    }
    if let Err(e) = fs::remove_dir(path) {
        error!("Couldn't delete folder {}: {}", path.display(), e);
        failures += 1;
    }
    failures
}

fn tree_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let Ok(file_type) = entry.file_type() else {
                return 0;
            };
            if file_type.is_dir() {
                tree_size(&entry.path())
            } else if entry
                .file_name()
                .to_str()
                .map(is_entity_file_name)
                .unwrap_or(false)
            {
                0
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{OutputMode, RecordingProperties, RecordingStatus};
    use tempfile::TempDir;

    fn catalog(dir: &TempDir) -> HostCatalog {
        HostCatalog::with_root(dir.path(), false, "https://media.example.com/")
    }

    fn public_catalog(dir: &TempDir) -> HostCatalog {
        HostCatalog::with_root(dir.path(), true, "https://media.example.com/")
    }

    fn recording(id: &str, status: RecordingStatus) -> Recording {
        let mut r = Recording::starting(id, &format!("ses_{}", id), &RecordingProperties::default());
        r.status = status;
        r
    }

    #[test]
    fn metadata_round_trips_through_catalog() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        let mut written = recording("abc", RecordingStatus::Stopped);
        written.size = 1024;
        written.duration = 12.5;
        written.reason = Some("sessionClosedByServer".into());
        written.resolution = Some("1280x720".into());

        catalog.write_metadata(&written).unwrap();
        let loaded = catalog.get("abc").unwrap().unwrap();
        assert_eq!(loaded, written);
    }

    #[test]
    fn absent_recording_is_none() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        assert!(catalog.get("missing").unwrap().is_none());
        assert!(catalog.get("../etc").unwrap().is_none());
    }

    #[test]
    fn stopped_recording_is_available_when_public() {
        let dir = TempDir::new().unwrap();
        let catalog = public_catalog(&dir);
        let mut r = recording("abc", RecordingStatus::Stopped);
        r.output_mode = OutputMode::Individual;
        catalog.write_metadata(&r).unwrap();

        let loaded = catalog.get("abc").unwrap().unwrap();
        assert_eq!(loaded.status, RecordingStatus::Available);
        assert_eq!(
            loaded.url.as_deref(),
            Some("https://media.example.com/recordings/abc/abc.zip")
        );
        // disk copy is untouched
        let raw = metadata::read_entity_file(&catalog.metadata_path("abc")).unwrap();
        assert_eq!(raw.status, RecordingStatus::Stopped);
    }

    #[test]
    fn free_id_skips_existing_directories() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        assert_eq!(catalog.allocate_free_id("s", "abc").unwrap(), "abc");

        fs::create_dir(dir.path().join("abc")).unwrap();
        fs::create_dir(dir.path().join("abc-1")).unwrap();
        assert_eq!(catalog.allocate_free_id("s", "abc").unwrap(), "abc-2");

        fs::create_dir(dir.path().join("abc-3")).unwrap();
        assert_eq!(catalog.allocate_free_id("s", "abc").unwrap(), "abc-2");

        let reserved = vec!["abc-2".to_string()];
        assert_eq!(
            catalog
                .allocate_free_id_excluding("s", "abc", &reserved)
                .unwrap(),
            "abc-4"
        );
    }

    #[test]
    fn free_id_ignores_plain_files() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        fs::write(dir.path().join("abc"), b"not a dir").unwrap();
        assert_eq!(catalog.allocate_free_id("s", "abc").unwrap(), "abc");
    }

    #[test]
    fn listing_skips_malformed_entries_and_sorts() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        catalog.write_metadata(&recording("b", RecordingStatus::Stopped)).unwrap();
        catalog.write_metadata(&recording("a", RecordingStatus::Started)).unwrap();
        catalog.write_metadata(&recording("c", RecordingStatus::Failed)).unwrap();

        fs::create_dir(dir.path().join("broken")).unwrap();
        fs::write(dir.path().join("broken").join(".recording.broken"), b"{not json").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("stray-file"), b"x").unwrap();

        let all = catalog.list_all().unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let finished = catalog.list_finished().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, "b");
    }

    #[test]
    fn finished_listing_includes_available() {
        let dir = TempDir::new().unwrap();
        let catalog = public_catalog(&dir);
        catalog.write_metadata(&recording("x", RecordingStatus::Stopped)).unwrap();
        catalog.write_metadata(&recording("y", RecordingStatus::Starting)).unwrap();

        let finished = catalog.list_finished().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, RecordingStatus::Available);
        assert!(finished[0].url.is_some());
    }

    #[test]
    fn delete_removes_whole_directory() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        catalog.write_metadata(&recording("abc", RecordingStatus::Stopped)).unwrap();
        let nested = catalog.recording_dir("abc").join("streams");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("str_1.webm"), b"media").unwrap();

        catalog.delete("abc").unwrap();
        assert!(!catalog.recording_dir("abc").exists());
        assert!(matches!(catalog.delete("abc"), Err(StorageError::NotFound)));
    }

    #[test]
    fn size_excludes_metadata() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        catalog.write_metadata(&recording("abc", RecordingStatus::Started)).unwrap();
        assert_eq!(catalog.recording_size("abc"), 0);
        fs::write(catalog.recording_dir("abc").join("abc.mp4"), vec![0u8; 300]).unwrap();
        assert_eq!(catalog.recording_size("abc"), 300);
        assert_eq!(catalog.recording_size("missing"), 0);
    }

    #[test]
    fn init_path_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("recordings");
        let catalog = HostCatalog::with_root(&root, false, "");
        catalog.init_path().unwrap();
        assert!(root.is_dir());
        assert!(!root.join(WRITE_PROBE_FILE).exists());
    }

    #[test]
    fn init_path_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();
        let catalog = HostCatalog::with_root(&file, false, "");
        assert!(matches!(catalog.init_path(), Err(StorageError::PathInvalid(_))));
    }

    #[test]
    fn listing_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let catalog = HostCatalog::with_root(dir.path().join("nope"), false, "");
        assert!(matches!(catalog.list_all(), Err(StorageError::ReadFailed(_))));
    }
}
