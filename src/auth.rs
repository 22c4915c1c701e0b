//! Credential exchange and token storage.
//!
//! The login flow never touches storage directly; callers inject a
//! [`SecretStore`].

use crate::client::ChatClient;
use crate::config::neptune_dir;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Somewhere to keep the access token between runs.
pub trait SecretStore {
    fn get(&self) -> Result<Option<String>>;
    fn set(&mut self, token: &str) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

/// Token kept in a single file, `~/.neptune/token` unless configured.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        neptune_dir().join("token")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSecretStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => {
                let token = s.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)?;
        restrict_permissions(&self.path)?;
        debug!(path = %self.path.display(), "token stored");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// In-process token storage; nothing survives the run.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    token: Option<String>,
}

impl SecretStore for MemorySecretStore {
    fn get(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }

    fn set(&mut self, token: &str) -> Result<()> {
        self.token = Some(token.to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.token = None;
        Ok(())
    }
}

/// Exchange credentials for a token and persist it. On rejection the store is
/// left as it was and [`Error::Auth`] is returned.
pub async fn login(
    client: &ChatClient,
    store: &mut dyn SecretStore,
    email: &str,
    password: &str,
) -> Result<String> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(Error::auth("email and password are required"));
    }
    let token = client.login(email.trim(), password).await?;
    store.set(&token)?;
    info!("access token saved");
    Ok(token)
}

pub fn logout(store: &mut dyn SecretStore) -> Result<()> {
    store.clear()?;
    info!("access token cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let mut store = MemorySecretStore::default();
        assert_eq!(store.get().unwrap(), None);
        store.set("abc").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("abc"));
        logout(&mut store).unwrap();
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn file_store_persists_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token");
        let mut store = FileSecretStore::new(&path);

        assert_eq!(store.get().unwrap(), None);
        store.set("tok-123").unwrap();
        assert_eq!(FileSecretStore::new(&path).get().unwrap().as_deref(), Some("tok-123"));

        store.clear().unwrap();
        assert!(!path.exists());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn blank_token_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(FileSecretStore::new(path).get().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSecretStore::new(dir.path().join("token"));
        store.set("secret").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
