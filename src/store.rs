//! Append-only record log for computed results and lab notes, optionally
//! mirrored to a JSON file.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed store file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no record with id {0}")]
    NotFound(RecordId),
}

/// Stable handle to a stored record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = self.0.simple().to_string();
        f.write_str(&full[..8])
    }
}

pub trait RecordStore<T> {
    /// Appends a record and returns its handle.
    fn add(&mut self, value: T) -> RecordId;

    /// All records in insertion order.
    fn list(&self) -> Vec<(RecordId, &T)>;

    fn get(&self, id: RecordId) -> Option<&T>;

    fn remove(&mut self, id: RecordId) -> Result<T, StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Serialize, Deserialize)]
struct Record<T> {
    id: RecordId,
    value: T,
}

pub struct JsonStore<T> {
    path: Option<PathBuf>,
    records: Vec<Record<T>>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Vec::new(),
        }
    }

    /// Opens the store backed by `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "store file absent, starting empty");
            return Ok(Self {
                path: Some(path),
                records: Vec::new(),
            });
        }

        let file = File::open(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let records: Vec<Record<T>> =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), records = records.len(), "loaded store");

        Ok(Self {
            path: Some(path),
            records,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes all records to the backing file, if any. The file is replaced
    /// atomically, so a failed save leaves the previous contents in place.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &self.records).map_err(|source| {
                StoreError::Json {
                    path: path.clone(),
                    source,
                }
            })?;
            writer.flush().map_err(io_err)?;
        }
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(path).map_err(|err| io_err(err.error))?;

        debug!(path = %path.display(), records = self.records.len(), "saved store");
        Ok(())
    }

    /// Drops every record and deletes the backing file.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.records.clear();
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Copies the backing file into `dir` under a timestamped name. Returns
    /// `None` when there is nothing on disk to copy.
    pub fn backup(&self, dir: &Path) -> Result<Option<PathBuf>, StoreError> {
        let Some(path) = self.path.as_ref().filter(|p| p.exists()) else {
            return Ok(None);
        };
        fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("store");
        let target = dir.join(format!(
            "{}_{}.json",
            stem,
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        fs::copy(path, &target).map_err(|source| StoreError::Io {
            path: target.clone(),
            source,
        })?;
        info!(from = %path.display(), to = %target.display(), "backed up store");
        Ok(Some(target))
    }

    /// 1-based display number of a record.
    pub fn number_of(&self, id: RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id).map(|i| i + 1)
    }
}

/// Copies attachments into `dir` under collision-free names and returns the
/// new paths, in order. Files already inside `dir` are kept as they are.
pub fn import_attachments(paths: &[PathBuf], dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut copied = Vec::with_capacity(paths.len());
    for source_path in paths {
        if source_path.parent() == Some(dir) {
            copied.push(source_path.clone());
            continue;
        }
        let name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let target = dir.join(format!("{}_{}", RecordId::new(), name));
        fs::copy(source_path, &target).map_err(|source| StoreError::Io {
            path: source_path.clone(),
            source,
        })?;
        debug!(from = %source_path.display(), to = %target.display(), "copied attachment");
        copied.push(target);
    }
    Ok(copied)
}

impl<T> RecordStore<T> for JsonStore<T> {
    fn add(&mut self, value: T) -> RecordId {
        let id = RecordId::new();
        self.records.push(Record { id, value });
        id
    }

    fn list(&self) -> Vec<(RecordId, &T)> {
        self.records.iter().map(|r| (r.id, &r.value)).collect()
    }

    fn get(&self, id: RecordId) -> Option<&T> {
        self.records.iter().find(|r| r.id == id).map(|r| &r.value)
    }

    fn remove(&mut self, id: RecordId) -> Result<T, StoreError> {
        let idx = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        Ok(self.records.remove(idx).value)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::compute_distribution;
    use crate::structs::{DistributionResult, Sample};

    fn result(d: f64) -> DistributionResult {
        compute_distribution(vec![Sample::new(d, 60.0, 0.1), Sample::new(d * 2.0, 40.0, 0.2)])
            .unwrap()
    }

    #[test]
    fn test_add_list_remove_keeps_order() {
        let mut store: JsonStore<String> = JsonStore::in_memory();
        let a = store.add("a".to_string());
        let b = store.add("b".to_string());
        let c = store.add("c".to_string());

        assert_eq!(store.len(), 3);
        assert_eq!(store.number_of(c), Some(3));
        assert_eq!(store.remove(b).unwrap(), "b");

        let values: Vec<&String> = store.list().into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec!["a", "c"]);
        assert_eq!(store.get(a).map(String::as_str), Some("a"));
        assert!(store.get(b).is_none());
        assert!(matches!(store.remove(b), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_results_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("psa_results.json");

        let mut store: JsonStore<DistributionResult> = JsonStore::load(&path).unwrap();
        assert!(store.is_empty());
        let id = store.add(result(10.0));
        store.add(result(50.0));
        store.save().unwrap();

        let reloaded: JsonStore<DistributionResult> = JsonStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        let first = reloaded.get(id).unwrap();
        assert_eq!(first.samples[0].diameter, 10.0);
        assert_eq!(first.grade, result(10.0).grade);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let loaded: Result<JsonStore<String>, _> = JsonStore::load(&path);
        assert!(matches!(loaded, Err(StoreError::Json { .. })));
    }

    #[derive(Deserialize)]
    struct Flaky {
        fail: bool,
    }

    impl Serialize for Flaky {
        fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            use serde::ser::{Error, SerializeStruct};
            if self.fail {
                return Err(S::Error::custom("cannot serialize"));
            }
            let mut st = serializer.serialize_struct("Flaky", 1)?;
            st.serialize_field("fail", &self.fail)?;
            st.end()
        }
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let mut store: JsonStore<Flaky> = JsonStore::load(&path).unwrap();
        store.add(Flaky { fail: false });
        store.save().unwrap();
        let before = fs::read_to_string(&path).unwrap();

        store.add(Flaky { fail: true });
        assert!(matches!(store.save(), Err(StoreError::Json { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);

        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1, "temporary file left behind");
    }

    #[test]
    fn test_save_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("notes.json");
        let mut store: JsonStore<String> = JsonStore::load(&path).unwrap();
        store.add("x".to_string());
        store.save().unwrap();
        let reloaded: JsonStore<String> = JsonStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        let mut store: JsonStore<String> = JsonStore::load(&path).unwrap();
        store.add("x".to_string());
        store.save().unwrap();
        assert!(path.exists());

        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_backup_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        let mut store: JsonStore<String> = JsonStore::load(&path).unwrap();
        assert!(store.backup(&dir.path().join("backups")).unwrap().is_none());

        store.add("x".to_string());
        store.save().unwrap();
        let copy = store.backup(&dir.path().join("backups")).unwrap().unwrap();
        assert!(copy.file_name().unwrap().to_string_lossy().starts_with("notes_"));
        assert_eq!(fs::read_to_string(copy).unwrap(), fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn test_import_attachments_copies_into_dir() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("tem.png");
        fs::write(&original, b"png bytes").unwrap();
        let images = dir.path().join("images");

        let copied = import_attachments(&[original.clone()], &images).unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].parent(), Some(images.as_path()));
        assert!(copied[0].to_string_lossy().ends_with("_tem.png"));

        fs::remove_file(&original).unwrap();
        assert_eq!(fs::read(&copied[0]).unwrap(), b"png bytes");

        // Re-importing a stored copy does not duplicate it.
        assert_eq!(import_attachments(&copied, &images).unwrap(), copied);
    }

    #[test]
    fn test_import_missing_attachment_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.jpg");
        let err = import_attachments(&[missing.clone()], &dir.path().join("images")).unwrap_err();
        assert!(matches!(err, StoreError::Io { path, .. } if path == missing));
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let mut store: JsonStore<String> = JsonStore::in_memory();
        store.add("x".to_string());
        store.save().unwrap();
        assert!(store.path().is_none());
    }

    #[test]
    fn test_record_id_display_is_short() {
        assert_eq!(RecordId::new().to_string().len(), 8);
    }
}
