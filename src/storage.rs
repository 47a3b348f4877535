use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use log::*;

use crate::GenericError;

/// Small synchronous string store persisted as one JSON object.
pub struct LocalStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl LocalStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(values) => Some(values),
                Err(why) => {
                    warn!("Ignoring unreadable store {}: {}", path.display(), why);
                    None
                }
            })
            .unwrap_or_default();
        LocalStore {
            path,
            values: Mutex::new(values),
        }
    }

    /// Opens the store under the platform config directory.
    pub fn open_default() -> Result<Self, GenericError> {
        let dirs = ProjectDirs::from("", "", "nearby-bot")
            .ok_or("no home directory to keep local storage in")?;
        Ok(Self::open(dirs.config_dir().join("local_storage.json")))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), GenericError> {
        let mut values = self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&*values)?)?;
        Ok(())
    }
}
