use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SqlBridgeError;

/// Persisted replica metadata: the auxiliary sidecar file next to the local
/// store. The sync transport is external; this crate only records its
/// completion signal and frame watermark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ReplicaMeta {
    pub uri: String,
    pub synced_at: Option<DateTime<Utc>>,
    pub frame_index: u64,
}

#[derive(Debug)]
pub(crate) struct ReplicaState {
    sidecar: PathBuf,
    meta: ReplicaMeta,
}

fn sidecar_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push("-replica.json");
    PathBuf::from(name)
}

fn meta_error(err: impl std::fmt::Display) -> SqlBridgeError {
    SqlBridgeError::ConnectionError(format!("replica metadata: {err}"))
}

impl ReplicaState {
    /// Load the sidecar next to `db_path`, or initialize a fresh one for
    /// `uri`. A sidecar recorded for a different remote is reset to frame 0.
    pub(crate) fn open(db_path: &Path, uri: &str) -> Result<Self, SqlBridgeError> {
        let sidecar = sidecar_path(db_path);
        let meta = match std::fs::read(&sidecar) {
            Ok(bytes) => {
                let existing: ReplicaMeta =
                    serde_json::from_slice(&bytes).map_err(meta_error)?;
                if existing.uri == uri {
                    existing
                } else {
                    tracing::warn!(
                        old = %existing.uri,
                        new = %uri,
                        "replica remote changed, resetting watermark"
                    );
                    ReplicaMeta {
                        uri: uri.to_owned(),
                        synced_at: None,
                        frame_index: 0,
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => ReplicaMeta {
                uri: uri.to_owned(),
                synced_at: None,
                frame_index: 0,
            },
            Err(err) => return Err(meta_error(err)),
        };
        let state = Self { sidecar, meta };
        state.persist()?;
        Ok(state)
    }

    fn persist(&self) -> Result<(), SqlBridgeError> {
        let bytes = serde_json::to_vec_pretty(&self.meta).map_err(meta_error)?;
        std::fs::write(&self.sidecar, bytes).map_err(meta_error)
    }

    /// Consume a sync-completion signal from the external transport.
    pub(crate) fn record_sync(&mut self, frame_index: u64) -> Result<(), SqlBridgeError> {
        self.meta.frame_index = frame_index;
        self.meta.synced_at = Some(Utc::now());
        self.persist()
    }

    pub(crate) fn frame_index(&self) -> u64 {
        self.meta.frame_index
    }

    pub(crate) fn uri(&self) -> &str {
        &self.meta.uri
    }
}
