#![deny(warnings)]

//! Persistence layer: key-value storage backends and the versioned state envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Version written by [`seal`]. Older blobs are migrated by [`open`].
pub const SCHEMA_VERSION: u32 = 1;

/// Returns the default directory used for local saves.
pub fn default_state_dir() -> &'static str {
    "./saves"
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u64, supported: u32 },
    #[error("malformed persisted blob: {0}")]
    Malformed(&'static str),
}

/// Key-value store for JSON blobs.
///
/// Backends never fail loudly: a missing or unreadable key is `None`, a
/// rejected write is `false`.
pub trait StorageBackend {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> bool;
}

/// In-process backend. Clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> bool {
        match self.entries.write() {
            Ok(mut map) => {
                map.insert(key.to_string(), value);
                true
            }
            Err(_) => false,
        }
    }
}

/// One pretty-printed JSON file per key under `dir`.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    fn read(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        let path = self.path_for(key);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Write to a sibling temp file, then rename over the target.
    fn write(&self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, value)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "state file written");
        Ok(())
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<Value> {
        match self.read(key) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "could not read persisted state");
                None
            }
        }
    }

    fn set(&self, key: &str, value: Value) -> bool {
        match self.write(key, &value) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "could not write persisted state");
                false
            }
        }
    }
}

/// What actually lands in storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub payload: Value,
}

/// Wrap `payload` in a current-version envelope.
pub fn seal(payload: Value, saved_at: DateTime<Utc>) -> Result<Value, PersistenceError> {
    Ok(serde_json::to_value(Envelope {
        schema_version: SCHEMA_VERSION,
        saved_at,
        payload,
    })?)
}

/// Unwrap a stored blob into its payload, migrating older layouts.
///
/// A blob without `schema_version` predates the envelope and is the payload itself.
pub fn open(blob: Value) -> Result<Value, PersistenceError> {
    let version = match blob.get("schema_version") {
        None => 0,
        Some(v) => v
            .as_u64()
            .ok_or(PersistenceError::Malformed("schema_version is not an integer"))?,
    };
    match version {
        0 => migrate_v0(blob),
        v if v == u64::from(SCHEMA_VERSION) => {
            let envelope: Envelope = serde_json::from_value(blob)?;
            Ok(envelope.payload)
        }
        found => Err(PersistenceError::UnsupportedVersion {
            found,
            supported: SCHEMA_VERSION,
        }),
    }
}

fn migrate_v0(blob: Value) -> Result<Value, PersistenceError> {
    if !blob.is_object() {
        return Err(PersistenceError::Malformed("unversioned blob is not an object"));
    }
    debug!("migrating unversioned state blob");
    Ok(blob)
}

/// Overlay the top-level keys of `persisted` onto `defaults`.
///
/// Nested objects are replaced wholesale. A non-object `persisted` leaves
/// `defaults` untouched.
pub fn shallow_merge(defaults: Value, persisted: Value) -> Value {
    match (defaults, persisted) {
        (Value::Object(mut base), Value::Object(over)) => {
            for (k, v) in over {
                base.insert(k, v);
            }
            Value::Object(base)
        }
        (Value::Object(base), _) => Value::Object(base),
        (_, Value::Object(over)) => Value::Object(over),
        (defaults, _) => defaults,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn default_dir_is_relative() {
        assert!(default_state_dir().starts_with("./"));
    }

    #[test]
    fn memory_clones_share_entries() {
        let a = MemoryStorage::new();
        let b = a.clone();
        assert!(a.set("k", json!({"x": 1})));
        assert_eq!(b.get("k"), Some(json!({"x": 1})));
        assert_eq!(b.get("missing"), None);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path().join("nested"));
        assert_eq!(store.get("app_state"), None);
        assert!(store.set("app_state", json!({"view": "dashboard"})));
        assert_eq!(store.get("app_state"), Some(json!({"view": "dashboard"})));
        assert!(!store.path_for("app_state").with_extension("json.tmp").exists());
    }

    #[test]
    fn file_storage_sanitizes_keys() {
        let store = FileStorage::new("/tmp/x");
        assert_eq!(store.path_for("../evil key"), PathBuf::from("/tmp/x/___evil_key.json"));
    }

    #[test]
    fn corrupt_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path());
        fs::write(store.path_for("app_state"), "{not json").unwrap();
        assert_eq!(store.get("app_state"), None);
    }

    #[test]
    fn unwritable_dir_rejects_write() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let store = FileStorage::new(blocker.join("sub"));
        assert!(!store.set("app_state", json!({})));
    }

    #[test]
    fn seal_then_open_yields_payload() {
        let payload = json!({"history": [], "ui": {"current_view": "simulator"}});
        let sealed = seal(payload.clone(), at()).unwrap();
        assert_eq!(sealed["schema_version"], json!(SCHEMA_VERSION));
        assert_eq!(open(sealed).unwrap(), payload);
    }

    #[test]
    fn unversioned_blob_is_the_payload() {
        let raw = json!({"simulation": {"history": []}});
        assert_eq!(open(raw.clone()).unwrap(), raw);
        assert!(matches!(
            open(json!([1, 2])),
            Err(PersistenceError::Malformed(_))
        ));
    }

    #[test]
    fn future_versions_are_rejected() {
        let blob = json!({"schema_version": 99, "saved_at": at(), "payload": {}});
        assert!(matches!(
            open(blob),
            Err(PersistenceError::UnsupportedVersion { found: 99, .. })
        ));
        assert!(matches!(
            open(json!({"schema_version": "one"})),
            Err(PersistenceError::Malformed(_))
        ));
    }

    #[test]
    fn merge_overlays_top_level_only() {
        let defaults = json!({"ui": {"loading": false, "view": "a"}, "cache": {}});
        let persisted = json!({"ui": {"view": "b"}, "extra": 1});
        let merged = shallow_merge(defaults, persisted);
        assert_eq!(merged["ui"], json!({"view": "b"}));
        assert_eq!(merged["cache"], json!({}));
        assert_eq!(merged["extra"], json!(1));
        assert_eq!(shallow_merge(json!({"a": 1}), json!(null)), json!({"a": 1}));
    }

    proptest! {
        #[test]
        fn merge_keeps_every_default_key(keys in prop::collection::btree_set("[a-z]{1,6}", 0..8)) {
            let defaults = Value::Object(keys.iter().map(|k| (k.clone(), json!(0))).collect());
            let merged = shallow_merge(defaults, json!({"other": 1}));
            for k in &keys {
                prop_assert!(merged.get(k).is_some());
            }
        }
    }
}
