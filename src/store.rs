// Pattern persistence.
//
// Patterns live in one JSON blob under a fixed key of a string key-value
// store, the way a browser keeps them in local storage. The blob carries a
// schema version; the unversioned legacy form (a bare array) still loads.
// A blob that cannot be read is set aside under a backup key and the store
// starts empty, so a bad write never takes startup down with it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::error::TranceError;
use crate::pattern::Pattern;

pub const PATTERNS_KEY: &str = "savedPatterns";
pub const CORRUPT_SUFFIX: &str = ".corrupt";
pub const SCHEMA_VERSION: u32 = 1;

pub trait PatternStore {
    /// Keeps `pattern` in memory even when persisting it fails; the error
    /// only reports the failed write.
    fn append(&mut self, pattern: Pattern) -> Result<(), TranceError>;

    fn list(&self) -> &[Pattern];

    /// Removes and returns the pattern at `index`; later ones shift down.
    fn delete(&mut self, index: usize) -> Result<Pattern, TranceError>;

    fn get(&self, index: usize) -> Option<&Pattern> {
        self.list().get(index)
    }

    fn len(&self) -> usize {
        self.list().len()
    }

    fn is_empty(&self) -> bool {
        self.list().is_empty()
    }
}

/// String blobs by key.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, TranceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), TranceError>;

    /// Copies the entry under `from` to `to` as is. Backends that can hold
    /// data `get` refuses to return must copy it without reading it.
    fn copy(&mut self, from: &str, to: &str) -> Result<(), TranceError> {
        match self.get(from)? {
            Some(value) => self.set(to, &value),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    entries: HashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        MemoryKv::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, TranceError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), TranceError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn open(dir: &Path) -> Result<Self, TranceError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| TranceError::StoreWrite(format!("{}: {}", dir.display(), e)))?;
        Ok(FileKv { dir: dir.to_path_buf() })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>, TranceError> {
        let path = self.path_for(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TranceError::StoreCorrupt(format!("{}: {}", path.display(), e))),
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| TranceError::StoreCorrupt(format!("{}: {}", path.display(), e)))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), TranceError> {
        let path = self.path_for(key);
        // write-then-rename so a crash never leaves half a blob behind
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| TranceError::StoreWrite(format!("{}: {}", path.display(), e)))
    }

    fn copy(&mut self, from: &str, to: &str) -> Result<(), TranceError> {
        let (src, dst) = (self.path_for(from), self.path_for(to));
        match std::fs::copy(&src, &dst) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TranceError::StoreWrite(format!("{}: {}", dst.display(), e))),
        }
    }
}

#[derive(Serialize)]
struct StoredPatternsRef<'a> {
    version: u32,
    patterns: &'a [Pattern],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredBlob {
    Versioned { version: u32, patterns: Vec<Pattern> },
    Legacy(Vec<Pattern>),
}

/// Decodes a blob into `(version, patterns)`.
fn decode(blob: &str) -> Result<(u32, Vec<Pattern>), TranceError> {
    let parsed: StoredBlob = serde_json::from_str(blob)
        .map_err(|e| TranceError::StoreCorrupt(e.to_string()))?;
    match parsed {
        StoredBlob::Versioned { version, .. } if version > SCHEMA_VERSION => Err(TranceError::StoreCorrupt(
            format!("schema version {} is newer than supported {}", version, SCHEMA_VERSION),
        )),
        StoredBlob::Versioned { version, patterns } => Ok((version, patterns)),
        StoredBlob::Legacy(patterns) => Ok((0, patterns)),
    }
}

pub struct JsonPatternStore<K: KeyValueStore> {
    kv: K,
    patterns: Vec<Pattern>,
    /// The stored blob could be neither read nor backed up. Writing would
    /// destroy it, so every persist fails until it is dealt with by hand.
    guarded: bool,
}

impl<K: KeyValueStore> JsonPatternStore<K> {
    /// Loads whatever `kv` holds. Never fails: unreadable data is backed up
    /// and replaced by an empty list.
    pub fn open(mut kv: K) -> Self {
        let loaded = match kv.get(PATTERNS_KEY) {
            Ok(None) => Ok(Vec::new()),
            Ok(Some(blob)) => decode(&blob).map(|(version, patterns)| {
                debug!(version, count = patterns.len(), "pattern store loaded");
                patterns
            }),
            Err(e) => Err(e),
        };

        let mut guarded = false;
        let patterns = loaded.unwrap_or_else(|e| {
            warn!("{}; starting with an empty pattern store", e);
            let backup = format!("{}{}", PATTERNS_KEY, CORRUPT_SUFFIX);
            if let Err(e) = kv.copy(PATTERNS_KEY, &backup) {
                warn!("could not back up unreadable patterns, leaving them untouched: {}", e);
                guarded = true;
            }
            Vec::new()
        });
        JsonPatternStore { kv, patterns, guarded }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    fn persist(&mut self) -> Result<(), TranceError> {
        if self.guarded {
            return Err(TranceError::StoreWrite(format!(
                "{} holds unreadable data that could not be backed up",
                PATTERNS_KEY
            )));
        }
        let blob = serde_json::to_string(&StoredPatternsRef { version: SCHEMA_VERSION, patterns: &self.patterns })
            .map_err(|e| TranceError::StoreWrite(e.to_string()))?;
        self.kv.set(PATTERNS_KEY, &blob)
    }
}

impl<K: KeyValueStore> PatternStore for JsonPatternStore<K> {
    fn append(&mut self, pattern: Pattern) -> Result<(), TranceError> {
        self.patterns.push(pattern);
        self.persist()
    }

    fn list(&self) -> &[Pattern] {
        &self.patterns
    }

    fn delete(&mut self, index: usize) -> Result<Pattern, TranceError> {
        if index >= self.patterns.len() {
            return Err(TranceError::PatternIndex { index, len: self.patterns.len() });
        }
        let removed = self.patterns.remove(index);
        self.persist()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::pattern::generate_pattern;
    use crate::scale::generate_scale;

    fn patterns(n: usize, seed: u64) -> Vec<Pattern> {
        let mut rng = fastrand::Rng::with_seed(seed);
        let scale = generate_scale(&GenerationConfig::default(), &mut rng).unwrap();
        (0..n).map(|i| generate_pattern(&scale, 8 + i, 0.6, &mut rng)).collect()
    }

    struct FailingKv;

    impl KeyValueStore for FailingKv {
        fn get(&self, _key: &str) -> Result<Option<String>, TranceError> {
            Ok(None)
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<(), TranceError> {
            Err(TranceError::StoreWrite("quota exceeded".to_string()))
        }
    }

    #[test]
    fn append_then_list_round_trips() {
        let mut store = JsonPatternStore::open(MemoryKv::new());
        let p = patterns(1, 1).remove(0);
        store.append(p.clone()).unwrap();

        let reopened = JsonPatternStore::open(store.kv().clone());
        assert_eq!(reopened.list(), &[p]);
    }

    #[test]
    fn delete_shifts_later_indices() {
        let mut store = JsonPatternStore::open(MemoryKv::new());
        let ps = patterns(4, 2);
        for p in &ps {
            store.append(p.clone()).unwrap();
        }
        let removed = store.delete(1).unwrap();
        assert_eq!(removed, ps[1]);
        assert_eq!(store.list(), &[ps[0].clone(), ps[2].clone(), ps[3].clone()]);

        let reopened = JsonPatternStore::open(store.kv().clone());
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.get(1), Some(&ps[2]));
    }

    #[test]
    fn delete_out_of_range() {
        let mut store = JsonPatternStore::open(MemoryKv::new());
        assert_eq!(store.delete(0), Err(TranceError::PatternIndex { index: 0, len: 0 }));
    }

    #[test]
    fn corrupt_blob_is_backed_up_and_ignored() {
        let mut kv = MemoryKv::new();
        kv.set(PATTERNS_KEY, "{not json").unwrap();
        let store = JsonPatternStore::open(kv);
        assert!(store.is_empty());
        let backup = store.kv().get(&format!("{}{}", PATTERNS_KEY, CORRUPT_SUFFIX)).unwrap();
        assert_eq!(backup.as_deref(), Some("{not json"));
    }

    #[test]
    fn newer_schema_is_not_trusted() {
        let mut kv = MemoryKv::new();
        kv.set(PATTERNS_KEY, r#"{"version": 99, "patterns": []}"#).unwrap();
        assert!(JsonPatternStore::open(kv).is_empty());
    }

    #[test]
    fn legacy_array_blob_loads() {
        let legacy = r#"[{
            "notes": ["C4", null, "Eb4", null],
            "rhythm": [true, false, true, false],
            "noteLengths": ["16n", "16n", "8n", "16n"],
            "velocities": [0.75, 0, 0.8, 0],
            "scale": ["C4", "Eb4"],
            "timestamp": "2024-05-01T12:00:00.000Z"
        }]"#;
        let mut kv = MemoryKv::new();
        kv.set(PATTERNS_KEY, legacy).unwrap();
        let store = JsonPatternStore::open(kv);
        assert_eq!(store.len(), 1);
        let p = &store.list()[0];
        assert!(p.is_consistent());
        assert_eq!(p.scale.len(), 2);
        assert_eq!(p.lead_at(2).map(|s| s.note.to_string()), Some("Eb4".to_string()));
    }

    #[test]
    fn written_blob_is_versioned() {
        let mut store = JsonPatternStore::open(MemoryKv::new());
        store.append(patterns(1, 3).remove(0)).unwrap();
        let blob = store.kv().get(PATTERNS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(value["version"], SCHEMA_VERSION);
        assert_eq!(value["patterns"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn failed_write_keeps_pattern_in_memory() {
        let mut store = JsonPatternStore::open(FailingKv);
        let result = store.append(patterns(1, 4).remove(0));
        assert!(matches!(result, Err(TranceError::StoreWrite(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let ps = patterns(2, 5);
        {
            let mut store = JsonPatternStore::open(FileKv::open(dir.path()).unwrap());
            for p in &ps {
                store.append(p.clone()).unwrap();
            }
        }
        let store = JsonPatternStore::open(FileKv::open(dir.path()).unwrap());
        assert_eq!(store.list(), ps.as_slice());
        assert!(dir.path().join("savedPatterns.json").exists());
    }

    #[test]
    fn file_backend_backs_up_unreadable_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let raw = [0xff_u8, 0xfe];
        std::fs::write(dir.path().join("savedPatterns.json"), raw).unwrap();

        let mut store = JsonPatternStore::open(FileKv::open(dir.path()).unwrap());
        assert!(store.is_empty());
        let backup = dir.path().join("savedPatterns.corrupt.json");
        assert_eq!(std::fs::read(&backup).unwrap(), raw);

        let ps = patterns(1, 6);
        store.append(ps[0].clone()).unwrap();
        assert_eq!(std::fs::read(&backup).unwrap(), raw);
        let store = JsonPatternStore::open(FileKv::open(dir.path()).unwrap());
        assert_eq!(store.list(), ps.as_slice());
    }

    // Reads fail and so does the backup: the only copy must not be overwritten.
    #[derive(Default)]
    struct UnreadableKv {
        writes: usize,
    }

    impl KeyValueStore for UnreadableKv {
        fn get(&self, key: &str) -> Result<Option<String>, TranceError> {
            Err(TranceError::StoreCorrupt(format!("{}: invalid utf-8", key)))
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<(), TranceError> {
            self.writes += 1;
            Ok(())
        }

        fn copy(&mut self, _from: &str, to: &str) -> Result<(), TranceError> {
            Err(TranceError::StoreWrite(format!("{}: read-only", to)))
        }
    }

    #[test]
    fn unreadable_blob_without_backup_is_never_overwritten() {
        let mut store = JsonPatternStore::open(UnreadableKv::default());
        let p = patterns(1, 7).remove(0);
        assert!(matches!(store.append(p), Err(TranceError::StoreWrite(_))));
        assert_eq!(store.len(), 1);
        assert!(matches!(store.delete(0), Err(TranceError::StoreWrite(_))));
        assert_eq!(store.kv().writes, 0);
    }

    #[test]
    fn out_of_range_octave_in_blob_is_backed_up() {
        let blob = r#"[{
            "notes": ["Cb-128"],
            "rhythm": [true],
            "noteLengths": ["16n"],
            "velocities": [0.75],
            "scale": ["Cb-128"],
            "timestamp": "2024-05-01T12:00:00.000Z"
        }]"#;
        let mut kv = MemoryKv::new();
        kv.set(PATTERNS_KEY, blob).unwrap();
        let store = JsonPatternStore::open(kv);
        assert!(store.is_empty());
        let backup = store.kv().get(&format!("{}{}", PATTERNS_KEY, CORRUPT_SUFFIX)).unwrap();
        assert_eq!(backup.as_deref(), Some(blob));
    }
}
