use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{env, path::Path, path::PathBuf};
use tokio::fs;
use tracing::error;

/// Write-once flags such as "seasonal animation already shown".
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FlagStore {
    pub flags: BTreeMap<String, bool>,
}

impl FlagStore {
    pub fn is_set(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(false)
    }

    /// Sets `key`; returns false when it was already set.
    pub fn mark(&mut self, key: &str) -> bool {
        if self.is_set(key) {
            return false;
        }
        self.flags.insert(key.to_string(), true);
        true
    }
}

pub fn flag_key(scope: &str, name: &str) -> String {
    format!("{scope}:{name}")
}

pub fn resolve_data_path() -> PathBuf {
    env::var("APP_DATA_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/flags.json"))
}

pub async fn load_flags(path: &Path) -> FlagStore {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse flag file: {err}");
                FlagStore::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => FlagStore::default(),
        Err(err) => {
            error!("failed to read flag file: {err}");
            FlagStore::default()
        }
    }
}

pub async fn persist_flags(path: &Path, data: &FlagStore) -> Result<(), AppError> {
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        env::temp_dir().join(format!("mood_pixels_{name}_{}_{nanos}.json", std::process::id()))
    }

    #[test]
    fn flags_are_write_once() {
        let mut store = FlagStore::default();
        assert!(store.mark("u:valentine"));
        assert!(!store.mark("u:valentine"));
        assert!(store.is_set("u:valentine"));
        assert!(!store.is_set("other:valentine"));
    }

    #[tokio::test]
    async fn flags_survive_a_reload() {
        let path = temp_path("reload");
        let mut store = FlagStore::default();
        store.mark(&flag_key("user", "valentine_seen"));
        persist_flags(&path, &store).await.unwrap();

        let loaded = load_flags(&path).await;
        assert_eq!(loaded, store);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn missing_or_corrupt_files_load_empty() {
        let path = temp_path("corrupt");
        assert_eq!(load_flags(&path).await, FlagStore::default());

        std::fs::write(&path, b"{not json").unwrap();
        assert_eq!(load_flags(&path).await, FlagStore::default());
        let _ = std::fs::remove_file(path);
    }
}
