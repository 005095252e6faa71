//! Best-effort persistence of a remembered session hint.
//!
//! The access credential itself is never written to disk; only the identity
//! hint (the account email) survives a restart, so the bootstrapper can pass
//! it to the renewal endpoint the way a returning client would.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const REMEMBERED_SESSION_FILE: &str = "remembered-session.json";

/// On-disk payload for the remembered session
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RememberedPayload {
    /// Identity hint to offer at bootstrap
    identity_hint: String,
    /// When this hint was last written
    updated_at: DateTime<Utc>,
}

/// File-backed store for the last signed-in identity hint.
///
/// Everything here is best-effort: a missing, unreadable or corrupt file
/// degrades to "no hint" and write failures are logged, never escalated.
pub struct RememberedSession {
    path: PathBuf,
}

impl RememberedSession {
    /// Create a store rooted in the given data directory
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(REMEMBERED_SESSION_FILE),
        }
    }

    /// The remembered identity hint, if a valid one is on disk
    pub fn identity_hint(&self) -> Option<String> {
        match self.read_payload() {
            Ok(Some(payload)) => {
                debug!(hint = %payload.identity_hint, "loaded remembered session hint");
                Some(payload.identity_hint)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "remembered session unreadable, ignoring");
                None
            }
        }
    }

    /// Remember the given identity hint
    pub fn remember(&self, identity_hint: &str) {
        let payload = RememberedPayload {
            identity_hint: identity_hint.to_string(),
            updated_at: Utc::now(),
        };
        if let Err(e) = self.write_payload(&payload) {
            warn!(error = %e, "failed to persist remembered session hint");
        }
    }

    /// Forget any remembered hint
    pub fn forget(&self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(error = %e, "failed to remove remembered session file");
            }
        }
    }

    fn read_payload(&self) -> Result<Option<RememberedPayload>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let payload = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(Some(payload))
    }

    fn write_payload(&self, payload: &RememberedPayload) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string(payload).context("failed to serialize session hint")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RememberedSession::new(dir.path());

        assert!(store.identity_hint().is_none());

        store.remember("ada@example.com");
        assert_eq!(store.identity_hint().as_deref(), Some("ada@example.com"));

        store.forget();
        assert!(store.identity_hint().is_none());
    }

    #[test]
    fn corrupt_file_degrades_to_no_hint() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(REMEMBERED_SESSION_FILE), "not json").unwrap();

        let store = RememberedSession::new(dir.path());
        assert!(store.identity_hint().is_none());
    }
}
