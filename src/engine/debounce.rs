use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Durable record of when each camera last triggered.
///
/// A camera with no entry has never triggered. Implementations must either succeed or
/// return an error; the decision engine refuses to decide without a working store.
pub trait TriggerStore: Send + Sync {
    fn get(&self, camera_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
    fn set(&self, camera_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct CameraState {
    last_trigger: DateTime<Utc>,
}

/// Keeps one small JSON file per camera so that cameras never contend on a shared file.
#[derive(Debug, Clone)]
pub struct FileTriggerStore {
    dir: PathBuf,
}

impl FileTriggerStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::Io(dir.display().to_string(), e))?;
        debug!(dir = %dir.display(), "Trigger state directory ready");
        Ok(FileTriggerStore { dir })
    }

    fn state_path(&self, camera_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_key(camera_id) {
            return Err(StoreError::InvalidKey(camera_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", camera_id)))
    }
}

impl TriggerStore for FileTriggerStore {
    fn get(&self, camera_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let path = self.state_path(camera_id)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(path.display().to_string(), e)),
        };
        let state: CameraState = serde_json::from_str(&text)
            .map_err(|e| StoreError::Corrupt(path.display().to_string(), e))?;
        trace!(camera = %camera_id, last_trigger = %state.last_trigger, "Loaded trigger state");
        Ok(Some(state.last_trigger))
    }

    fn set(&self, camera_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let path = self.state_path(camera_id)?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec(&CameraState { last_trigger: at })
            .map_err(|e| StoreError::Corrupt(path.display().to_string(), e))?;
        // Write then rename, so a crash never leaves a half written state file behind
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        write().map_err(|e| StoreError::Io(path.display().to_string(), e))?;
        trace!(camera = %camera_id, last_trigger = %at, "Saved trigger state");
        Ok(())
    }
}

/// Only `[A-Za-z0-9_-]` may be used, since the key names a file.
pub fn is_valid_key(camera_id: &str) -> bool {
    !camera_id.is_empty()
        && camera_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Volatile store, used when state does not need to outlive the process.
#[derive(Debug, Default)]
pub struct MemoryTriggerStore {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TriggerStore for MemoryTriggerStore {
    fn get(&self, camera_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(camera_id).copied())
    }

    fn set(&self, camera_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(camera_id.to_string(), at);
        Ok(())
    }
}

/// One mutex per camera. Holding a camera's lock serializes its debounce check and commit,
/// while other cameras take their own locks and are never blocked.
#[derive(Debug, Default)]
pub struct CameraLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl CameraLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, camera_id: &str) -> Arc<Mutex<()>> {
        // The maps only guard lock creation, so a poisoned map is still consistent
        if let Some(lock) = self
            .locks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(camera_id)
        {
            return lock.clone();
        }
        self.locks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(camera_id.to_string())
            .or_default()
            .clone()
    }
}

quick_error! {
    #[derive(Debug)]
    pub enum StoreError {
        Io(path: String, error: io::Error) {
            display("Trigger state file {} could not be accessed: {}", path, error)
            source(error)
        }
        Corrupt(path: String, error: serde_json::Error) {
            display("Trigger state file {} is corrupt: {}", path, error)
            source(error)
        }
        InvalidKey(camera_id: String) {
            display("Camera id `{}` cannot be used as a state key", camera_id)
        }
        Poisoned {
            display("Trigger state lock poisoned")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_store_round_trip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        {
            let store = FileTriggerStore::open(dir.path()).unwrap();
            assert_eq!(store.get("7").unwrap(), None);
            store.set("7", at).unwrap();
        }
        let reopened = FileTriggerStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("7").unwrap(), Some(at));
        assert_eq!(reopened.get("8").unwrap(), None);
        assert!(!dir.path().join("7.json.tmp").exists());
    }

    #[test]
    fn test_file_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state").join("triggers");
        let store = FileTriggerStore::open(&nested).unwrap();
        store.set("front_door", Utc::now()).unwrap();
        assert!(nested.join("front_door.json").exists());
    }

    #[test]
    fn test_file_store_corrupt_state_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("3.json"), "not json").unwrap();
        let store = FileTriggerStore::open(dir.path()).unwrap();
        assert!(matches!(store.get("3"), Err(StoreError::Corrupt(_, _))));
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTriggerStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.set("../escape", Utc::now()),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(store.get(""), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryTriggerStore::default();
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(store.get("1").unwrap(), None);
        store.set("1", at).unwrap();
        assert_eq!(store.get("1").unwrap(), Some(at));
    }

    #[test]
    fn test_camera_locks_are_per_key() {
        let locks = CameraLocks::new();
        let a = locks.handle("a");
        let a_again = locks.handle("a");
        let b = locks.handle("b");
        assert!(Arc::ptr_eq(&a, &a_again));
        assert!(!Arc::ptr_eq(&a, &b));

        let _held = a.lock().unwrap();
        // Another camera is free while `a` is held
        assert!(b.try_lock().is_ok());
        assert!(a_again.try_lock().is_err());
    }
}
