//! Who is signed in, and how the store learns the bearer token.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::gateway::GatewayError;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub access_token: AccessToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// Supplies the token for the current user, if any.
pub trait SessionProvider: Send + Sync {
    fn current_token(&self) -> Option<AccessToken>;
}

/// Fixed token, mostly useful in tests and one-shot scripts.
#[derive(Debug, Clone, Default)]
pub struct StaticSession(Option<AccessToken>);

impl StaticSession {
    pub fn signed_in(token: impl Into<String>) -> Self {
        Self(Some(AccessToken::new(token)))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }
}

impl SessionProvider for StaticSession {
    fn current_token(&self) -> Option<AccessToken> {
        self.0.clone()
    }
}

/// Session persisted as JSON in the data directory.
#[derive(Debug)]
pub struct FileSession {
    path: PathBuf,
    record: RwLock<Option<SessionRecord>>,
}

impl FileSession {
    /// Load the session at `path`. A missing file means nobody is signed in.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let record = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read session from {}", path.display()))?;
            let record: SessionRecord = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse session file {}", path.display()))?;
            Some(record)
        } else {
            None
        };
        Ok(Self {
            path,
            record: RwLock::new(record),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.record.read().as_ref().and_then(|r| r.user.clone())
    }

    pub fn save(&self, record: SessionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write session to {}", self.path.display()))?;
        set_owner_only(&self.path)?;
        *self.record.write() = Some(record);
        Ok(())
    }

    /// Forget the session. Returns whether anyone was signed in.
    pub fn clear(&self) -> Result<bool> {
        let had_session = self.record.write().take().is_some();
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        Ok(had_session)
    }
}

impl SessionProvider for FileSession {
    fn current_token(&self) -> Option<AccessToken> {
        self.record.read().as_ref().map(|r| r.access_token.clone())
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

/// Account endpoints that hand out sessions.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<SessionRecord, GatewayError>;

    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionRecord, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(token: &str) -> SessionRecord {
        SessionRecord {
            access_token: AccessToken::new(token),
            user: Some(UserProfile {
                id: "u1".into(),
                email: "ana@example.com".into(),
                username: None,
            }),
        }
    }

    #[test]
    fn file_session_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let session = FileSession::load(&path).unwrap();
        assert!(session.current_token().is_none());

        session.save(record("abc")).unwrap();
        assert_eq!(session.current_token(), Some(AccessToken::new("abc")));

        let reloaded = FileSession::load(&path).unwrap();
        assert_eq!(reloaded.current_token(), Some(AccessToken::new("abc")));
        assert_eq!(
            reloaded.user().map(|u| u.display_name().to_string()),
            Some("ana@example.com".to_string())
        );
    }

    #[test]
    fn clear_removes_file_and_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let session = FileSession::load(&path).unwrap();
        session.save(record("abc")).unwrap();
        assert!(path.exists());

        assert!(session.clear().unwrap());
        assert!(!path.exists());
        assert!(session.current_token().is_none());
        assert!(!session.clear().unwrap());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = AccessToken::new("secret");
        assert_eq!(format!("{token:?}"), "AccessToken(***)");
    }

    #[test]
    fn static_session_reports_token() {
        assert!(StaticSession::signed_out().current_token().is_none());
        assert_eq!(
            StaticSession::signed_in("t").current_token(),
            Some(AccessToken::new("t"))
        );
    }
}
