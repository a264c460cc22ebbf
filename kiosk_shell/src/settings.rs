//! Kiosk settings that must survive a relaunch, such as the kiosk's name or the selected language. They are kept as a
//! flat JSON object on disk.
use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use log::*;
use serde_json::Value;
use tokio::{fs, sync::RwLock};

use crate::errors::ShellError;

const MAX_KEY_LENGTH: usize = 64;

pub type Settings = BTreeMap<String, Value>;

pub struct SettingsStore {
    path: PathBuf,
    values: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads the settings file. A missing file is an empty set of settings. So is a corrupt one: the kiosk has to
    /// start regardless, and the file is rewritten on the next change.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ShellError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read(&path).await {
            Ok(data) => serde_json::from_slice::<Settings>(&data).unwrap_or_else(|e| {
                warn!("🪛️ The settings file {} is corrupt and will be replaced. {e}", path.display());
                Settings::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("🪛️ No settings file at {}. Starting with empty settings.", path.display());
                Settings::new()
            },
            Err(e) => return Err(e.into()),
        };
        debug!("🪛️ Loaded {} settings from {}", values.len(), path.display());
        Ok(Self { path, values: RwLock::new(values) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn all(&self) -> Settings {
        self.values.read().await.clone()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    /// Stores the value and writes the settings file. Setting `null` removes the key.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), ShellError> {
        if !is_valid_key(key) {
            return Err(ShellError::InvalidRequestBody(format!("'{key}' is not a valid settings key")));
        }
        let mut values = self.values.write().await;
        let mut updated = values.clone();
        if value.is_null() {
            updated.remove(key);
        } else {
            updated.insert(key.to_string(), value);
        }
        self.persist(&updated).await?;
        *values = updated;
        debug!("🪛️ Setting {key} saved");
        Ok(())
    }

    async fn persist(&self, values: &Settings) -> Result<(), ShellError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let data = serde_json::to_vec_pretty(values).map_err(|e| ShellError::SettingsError(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
