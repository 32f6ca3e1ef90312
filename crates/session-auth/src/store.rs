//! Session token storage
//!
//! Holds at most one access/refresh token pair. An optional JSON file gives
//! the pair durability across restarts; the file has two slots, `token` and
//! `refreshToken`, and is rewritten atomically (temp file + rename) on every
//! change.
//!
//! Persistence is best effort. A file that cannot be read, parsed or written
//! is logged and the store carries on in memory, so callers never see a
//! storage error.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Slots {
    access: Option<Secret<String>>,
    refresh: Option<Secret<String>>,
}

/// On-disk layout. Absent and empty slots both mean "no token".
#[derive(Serialize, Deserialize, Default)]
struct SlotsFile<'a> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<std::borrow::Cow<'a, str>>,
    #[serde(
        default,
        rename = "refreshToken",
        skip_serializing_if = "Option::is_none"
    )]
    refresh_token: Option<std::borrow::Cow<'a, str>>,
}

/// Thread-safe holder of the current credential pair.
///
/// The Mutex serializes writers and makes replacing the pair atomic: a reader
/// sees either the old pair or the new one, never a mix.
pub struct TokenStore {
    path: Option<PathBuf>,
    state: Mutex<Slots>,
}

impl TokenStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(Slots::default()),
        }
    }

    /// Open a file-backed store.
    ///
    /// A missing file is a cold start with no tokens. An unreadable or corrupt
    /// file is logged and treated the same way; the next write replaces it.
    pub async fn load(path: PathBuf) -> Self {
        let slots = match read_slots(&path).await {
            Ok(Some(slots)) => {
                info!(
                    path = %path.display(),
                    has_access = slots.access.is_some(),
                    has_refresh = slots.refresh.is_some(),
                    "loaded session tokens"
                );
                slots
            }
            Ok(None) => {
                info!(path = %path.display(), "session file not found, starting signed out");
                Slots::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "session file unusable, starting signed out");
                Slots::default()
            }
        };

        Self {
            path: Some(path),
            state: Mutex::new(slots),
        }
    }

    /// Whether writes are mirrored to a file.
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    /// Current access token, if any.
    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.state.lock().await.access.clone()
    }

    /// Current refresh token, if any.
    pub async fn refresh_token(&self) -> Option<Secret<String>> {
        self.state.lock().await.refresh.clone()
    }

    /// Replace the access token and, when one is supplied, the refresh token.
    ///
    /// A `None` or empty refresh token leaves the stored one untouched: refresh
    /// responses that do not rotate the refresh token must not erase it.
    ///
    /// An empty access token clears the access slot rather than keeping the
    /// previous one, so a stale bearer is never sent after a bad login.
    pub async fn set_tokens(&self, access: Secret<String>, refresh: Option<Secret<String>>) {
        let mut state = self.state.lock().await;
        state.access = Secret::non_empty(access.expose().as_str());
        if let Some(refresh) = refresh.and_then(|r| Secret::non_empty(r.expose().as_str())) {
            state.refresh = Some(refresh);
        }
        debug!(rotated_refresh = state.refresh.is_some(), "stored session tokens");
        self.persist(&state).await;
    }

    /// Remove both tokens.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        *state = Slots::default();
        debug!("cleared session tokens");
        self.persist(&state).await;
    }

    async fn persist(&self, state: &Slots) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_atomic(path, state).await {
            warn!(path = %path.display(), error = %e, "failed to persist session tokens, keeping them in memory");
        }
    }
}

async fn read_slots(path: &Path) -> Result<Option<Slots>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(format!("reading session file: {e}"))),
    };
    let file: SlotsFile<'_> = serde_json::from_str(&contents)
        .map_err(|e| Error::Malformed(format!("parsing session file: {e}")))?;
    Ok(Some(Slots {
        access: file.token.and_then(|t| Secret::non_empty(t.into_owned())),
        refresh: file.refresh_token.and_then(|t| Secret::non_empty(t.into_owned())),
    }))
}

/// Temp file next to `path`, unique per write so stores sharing a directory
/// (or a file) never write through each other's temp file.
fn temp_file_name(path: &Path) -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".into());
    format!(
        ".{stem}.tmp.{}.{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

/// Write the slots to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over the
/// target. Permissions are 0600 on unix since the file holds bearer tokens.
async fn write_atomic(path: &Path, state: &Slots) -> Result<()> {
    let file = SlotsFile {
        token: state.access.as_ref().map(|t| t.expose().as_str().into()),
        refresh_token: state.refresh.as_ref().map(|t| t.expose().as_str().into()),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| Error::Io(format!("serializing session file: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;

    let tmp_path = dir.join(temp_file_name(path));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session tokens");
    Ok(())
}
