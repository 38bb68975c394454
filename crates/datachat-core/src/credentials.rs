//! Login session context and its persisted form
//!
//! An [`AuthSession`] is created at login and dropped at logout. It is handed
//! to the [`ServiceClient`](crate::ServiceClient) explicitly; nothing reads the
//! token from ambient storage.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed name the bearer credential is stored under
pub const CREDENTIAL_FILE: &str = "token.json";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub email: String,
}

impl AuthSession {
    pub fn new(token: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            email: email.into(),
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

// Keep the token out of logs
impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// On-disk home of the current [`AuthSession`]
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CREDENTIAL_FILE),
        }
    }

    /// Store inside the user config directory
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(&crate::Config::config_dir()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nobody is logged in
    pub fn load(&self) -> Result<Option<AuthSession>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        let session: AuthSession = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse stored credential {:?}: {}", self.path, e))?;
        Ok(Some(session))
    }

    pub fn save(&self, session: &AuthSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        restrict_permissions(&self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_store_loads_none() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(&dir.path().join("datachat"));
        assert!(store.path().ends_with("datachat/token.json"));
        let session = AuthSession::new("abc.def.ghi", "ana@example.com");

        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = AuthSession::new("secret-token", "ana@example.com");
        let printed = format!("{:?}", session);
        assert!(!printed.contains("secret-token"));
        assert!(printed.contains("ana@example.com"));
        assert_eq!(session.bearer(), "Bearer secret-token");
    }
}
