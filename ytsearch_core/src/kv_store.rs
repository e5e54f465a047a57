//! KV Store (§4.A): a durable `key -> value` mapping backed by one file per key.
//!
//! Grounded on the file-backed JSON store pattern used elsewhere in this codebase
//! for auth persistence, generalised from "one file holding a map" to "one file
//! per key" so individual entries can be enumerated and aged out independently.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct KvStore {
    root: PathBuf,
}

impl KvStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Deserialises the stored value. On corruption the file is deleted and
    /// `Ok(None)` is returned (self-healing, per §4.A).
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage(e.to_string())),
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(target: "ytsearch.kv_store", key, error = %e, "corrupt value, deleting");
                let _ = std::fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    /// `value = None` deletes the key. Otherwise a write-then-close, matching
    /// the "atomic-ish" guarantee in §4.A: write to a sibling temp file, then
    /// rename over the target so readers never observe a half-written file.
    pub fn set<T: Serialize>(&self, key: &str, value: Option<&T>) -> Result<()> {
        let path = self.path_for(key);
        match value {
            None => {
                match std::fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(Error::storage(e.to_string())),
                }
            }
            Some(value) => {
                let serialized =
                    serde_json::to_vec_pretty(value).map_err(|e| Error::storage(e.to_string()))?;
                let tmp_path = path.with_extension("json.tmp");
                std::fs::write(&tmp_path, &serialized)?;
                std::fs::rename(&tmp_path, &path)?;
                debug!(target: "ytsearch.kv_store", key, bytes = serialized.len(), "wrote key");
                Ok(())
            }
        }
    }

    pub fn last_modified(&self, key: &str) -> Result<Option<SystemTime>> {
        match std::fs::metadata(self.path_for(key)) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(e.to_string())),
        }
    }

    /// Every stored key whose sanitised file stem starts with `prefix`, optionally
    /// restricted to entries not modified within `not_accessed_days`.
    pub fn keys_with_prefix(&self, prefix: &str, not_accessed_days: Option<u64>) -> Result<Vec<String>> {
        let cutoff = not_accessed_days.map(|days| Duration::from_secs(days * 86_400));
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = unsanitize(stem);
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(min_age) = cutoff {
                let modified = entry.metadata()?.modified()?;
                let age = modified.elapsed().unwrap_or(Duration::ZERO);
                if age < min_age {
                    continue;
                }
            }
            out.push(key);
        }
        Ok(out)
    }

    /// Deletes by exact key or by prefix (age-filtered). `simulate = true` reports
    /// what would be deleted without touching the filesystem.
    pub fn delete(
        &self,
        key: Option<&str>,
        prefix: Option<&str>,
        not_accessed_days: Option<u64>,
        simulate: bool,
    ) -> Result<Vec<String>> {
        let targets = match (key, prefix) {
            (Some(k), _) => vec![k.to_string()],
            (None, Some(p)) => self.keys_with_prefix(p, not_accessed_days)?,
            (None, None) => self.keys_with_prefix("", not_accessed_days)?,
        };
        if !simulate {
            for k in &targets {
                let _ = std::fs::remove_file(self.path_for(k));
            }
        }
        Ok(targets)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize(key)))
    }
}

/// Replaces filesystem-unsafe characters with `_` so arbitrary KV keys (which may
/// contain spaces, as in `"video dQw4w9WgXcQ"`) become valid file stems.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ' ' => '_',
            other => other,
        })
        .collect()
}

/// Best-effort inverse of [`sanitize`] for prefix matching; since the mapping
/// is lossy, prefix queries are matched against the sanitised form instead.
fn unsanitize(stem: &str) -> String {
    stem.replace('_', " ")
}

pub fn cache_dir_for(root: &Path) -> PathBuf {
    root.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        n: u32,
    }

    #[test]
    fn round_trips_a_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path()).unwrap();
        store.set("video abc", Some(&Payload { n: 7 })).unwrap();
        let loaded: Option<Payload> = store.get("video abc").unwrap();
        assert_eq!(loaded, Some(Payload { n: 7 }));
    }

    #[test]
    fn set_none_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path()).unwrap();
        store.set("k", Some(&Payload { n: 1 })).unwrap();
        store.set::<Payload>("k", None).unwrap();
        let loaded: Option<Payload> = store.get("k").unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn corrupt_file_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path()).unwrap();
        let path = store.path_for("k");
        std::fs::write(&path, b"not json").unwrap();
        let loaded: Option<Payload> = store.get("k").unwrap();
        assert_eq!(loaded, None);
        assert!(!path.exists());
    }

    #[test]
    fn keys_with_prefix_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path()).unwrap();
        store.set("video a", Some(&Payload { n: 1 })).unwrap();
        store.set("playlist b", Some(&Payload { n: 2 })).unwrap();
        let keys = store.keys_with_prefix("video", None).unwrap();
        assert_eq!(keys, vec!["video a".to_string()]);
    }
}
