//! ==============================================================================
//! session.rs - token store for the current session credential
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     holds the bearer credential for the rest of the session. a clone-able
//!     handle: the auth client writes it, the request pipeline reads it on
//!     every protected request and clears it on a 401.
//!
//! persistence:
//!     a persistent store mirrors the credential into a small json file
//!     (`{"id_token": "..."}`), so consecutive cli invocations share one login
//!     the way browser tabs share session storage. the in-memory value is the
//!     source of truth; file errors are logged and otherwise ignored.
//!
//! relationships:
//!     - used by: auth.rs (sign_in / sign_out), pipeline.rs (inject / clear)
//! ```
//!
//! ==============================================================================

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Serialize, Deserialize)]
struct SessionFile {
    id_token: String,
}

#[derive(Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
    file: Option<Arc<PathBuf>>,
}

impl TokenStore {
    /// store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// store mirrored to `path`; picks up a credential left there earlier
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let token = read_session_file(&path);
        if token.is_some() {
            tracing::debug!(path = %path.display(), "restored session");
        }
        Self {
            token: Arc::new(RwLock::new(token)),
            file: Some(Arc::new(path)),
        }
    }

    pub fn get_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    /// no validation; whatever the caller hands over is the credential
    pub fn set_token(&self, value: impl Into<String>) {
        let value = value.into();
        if let Some(path) = &self.file {
            write_session_file(path, &value);
        }
        *self.token.write() = Some(value);
    }

    pub fn clear_token(&self) {
        self.token.write().take();
        if let Some(path) = &self.file {
            remove_session_file(path);
        }
    }

    pub fn session_file(&self) -> Option<&Path> {
        self.file.as_deref().map(PathBuf::as_path)
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("token", &self.has_token().then_some("<redacted>"))
            .field("file", &self.file)
            .finish()
    }
}

// ==============================================================================
// session file
// ==============================================================================

fn read_session_file(path: &Path) -> Option<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to read session file: {}", e);
            return None;
        }
    };
    match serde_json::from_str::<SessionFile>(&content) {
        Ok(file) if !file.id_token.is_empty() => Some(file.id_token),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring malformed session file: {}", e);
            None
        }
    }
}

fn write_session_file(path: &Path, token: &str) {
    let body = match serde_json::to_string(&SessionFile { id_token: token.to_string() }) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("failed to encode session file: {}", e);
            return;
        }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(path = %parent.display(), "failed to create session dir: {}", e);
            return;
        }
    }
    if let Err(e) = write_private(path, body.as_bytes()) {
        tracing::warn!(path = %path.display(), "failed to write session file: {}", e);
    }
}

// the file holds a bearer credential: owner read/write only
#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode only applies on create; tighten a file left by an older run
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

fn remove_session_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove session file: {}", e),
    }
}
