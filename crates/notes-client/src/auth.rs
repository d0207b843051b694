//! Credential sources for `HttpRemote`.

use notes_sync::AuthProvider;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// A token fixed at startup (from `--token` / `NOTES_TOKEN`), or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }
}

impl AuthProvider for StaticToken {
    fn get_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// A token read from a file on every request, so a login flow can rotate it
/// while the client runs.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AuthProvider for TokenFile {
    fn get_token(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Could not read token file {:?}: {}", self.path, e);
                None
            }
        }
    }
}
