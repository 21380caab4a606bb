//! Whole-state snapshot: temperament, episodic memory and the alarm flag.
//!
//! Saving writes a sibling temp file and renames it over the target, so a
//! crash mid-save never leaves a half-written snapshot behind.

use algea_core::{PersistenceError, Temperament};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::EpisodicMemory;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub traits: Temperament,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub memory: EpisodicMemory,
    #[serde(default)]
    pub alarm: bool,
}

/// An explicit `"memory": null` decodes to an empty memory.
fn null_as_empty<'de, D>(deserializer: D) -> Result<EpisodicMemory, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<EpisodicMemory>::deserialize(deserializer)?.unwrap_or_default())
}

impl Snapshot {
    pub fn from_json(path: &Path, data: &[u8]) -> Result<Self, PersistenceError> {
        serde_json::from_slice(data).map_err(|source| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a snapshot; a missing file is `Ok(None)`, not an error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>, PersistenceError> {
        let path = path.as_ref();
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_json(path, &data).map(Some)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        let data = serde_json::to_vec_pretty(self).map_err(PersistenceError::Encode)?;

        let tmp = temp_path(path);
        let io_err = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::write(&tmp, &data).await.map_err(io_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }

        tracing::debug!("Snapshot saved to {}", path.display());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}
