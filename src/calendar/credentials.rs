//! Credential storage and lifecycle
//!
//! The [`CredentialManager`] is the only component that mutates the stored
//! token. Every Calendar API call obtains an [`AuthorizedHandle`] from it:
//!
//! 1. A stored, unexpired credential carrying the required scopes is used as is.
//! 2. An expired credential with a refresh token is refreshed once.
//! 3. Otherwise the interactive consent flow runs and its result is persisted.
//!
//! Load, check, refresh and save run under a single async mutex, so concurrent
//! callers racing on an expired token observe one refresh.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AuthError, CalendarMcpError, Result, StorageError};

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Safety margin subtracted from provider-reported lifetimes
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Persisted OAuth credential
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    /// Access token
    #[serde(alias = "token")]
    pub access_token: String,

    /// Refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Expiry; a record without one is treated as expired
    #[serde(default, alias = "expiry")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scopes
    #[serde(default, alias = "scope", deserialize_with = "deserialize_scopes")]
    pub scopes: Vec<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Scopes are stored as a list, but the token endpoint reports a space-separated string
fn deserialize_scopes<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Option::<Scopes>::deserialize(deserializer)? {
        Some(Scopes::List(list)) => list,
        Some(Scopes::Joined(joined)) => joined.split_whitespace().map(str::to_string).collect(),
        None => Vec::new(),
    })
}

impl Credential {
    /// Build a credential from token endpoint data
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        let lifetime = expires_in_secs.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Self {
            access_token: access_token.into(),
            refresh_token,
            token_type: default_token_type(),
            expires_at: Some(Utc::now() + Duration::seconds(lifetime - EXPIRY_MARGIN_SECS)),
            scopes,
        }
    }

    /// Expired at `now`, or of unknown expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Granted scopes are a superset of `required`
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Fill in what a refresh response leaves out from the credential it replaces
    fn inherit(mut self, previous: &Credential) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        if self.scopes.is_empty() {
            self.scopes = previous.scopes.clone();
        }
        self
    }
}

/// Capability to call the Calendar API with one valid credential
#[derive(Debug, Clone)]
pub struct AuthorizedHandle {
    access_token: String,
    token_type: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthorizedHandle {
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl From<&Credential> for AuthorizedHandle {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: credential.access_token.clone(),
            token_type: credential.token_type.clone(),
            expires_at: credential.expires_at,
        }
    }
}

/// File-backed credential store
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored credential; `Ok(None)` when no token file exists
    pub async fn load(&self) -> std::result::Result<Option<Credential>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file at {}", self.path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::Malformed {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Persist a credential, replacing the file atomically
    pub async fn save(&self, credential: &Credential) -> std::result::Result<(), StorageError> {
        let write_err = |source| StorageError::Write {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(credential).map_err(|e| {
            write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await.map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = tokio::fs::set_permissions(&temp_path, perms).await {
                warn!("Could not restrict permissions on {}: {}", temp_path.display(), e);
            }
        }

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(write_err)?;

        debug!("Saved credential to {}", self.path.display());
        Ok(())
    }

    /// Remove the stored credential
    pub async fn clear(&self) -> std::result::Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Removed token file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Write {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }
}

/// Token traffic with the OAuth identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange the credential's refresh token for a new access token.
    ///
    /// A rejected refresh token must surface as [`AuthError::TokenRefreshFailed`].
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;

    /// Run the interactive consent flow for `scopes`
    async fn authorize(&self, scopes: &[String]) -> Result<Credential>;
}

/// Decides whether the stored credential is usable and repairs it when it is not
pub struct CredentialManager {
    store: CredentialStore,
    provider: Arc<dyn IdentityProvider>,
    lock: Mutex<()>,
}

impl CredentialManager {
    pub fn new(store: CredentialStore, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            provider,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return a handle backed by an unexpired credential granting `required_scopes`
    pub async fn acquire_handle(&self, required_scopes: &[String]) -> Result<AuthorizedHandle> {
        let _guard = self.lock.lock().await;

        let stored = match self.store.load().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Ignoring unusable token file: {}", e);
                None
            }
        };

        if let Some(credential) = stored {
            let scoped = credential.has_scopes(required_scopes);

            if scoped && !credential.is_expired() {
                debug!("Using stored credential");
                return Ok(AuthorizedHandle::from(&credential));
            }

            if !scoped {
                info!("Stored credential lacks required scopes, re-authorizing");
            } else if credential.refresh_token.is_none() {
                info!("Stored credential expired without a refresh token, re-authorizing");
            } else {
                info!("Access token expired, refreshing");
                let refreshed = self
                    .provider
                    .refresh(&credential)
                    .await
                    .and_then(|fresh| ensure_unexpired(fresh.inherit(&credential), refresh_failed));

                match refreshed {
                    Ok(fresh) => return Ok(self.persist(fresh).await),
                    Err(CalendarMcpError::Auth(AuthError::TokenRefreshFailed { message })) => {
                        warn!("Refresh rejected ({}), discarding stored credential", message);
                        if let Err(e) = self.store.clear().await {
                            warn!("Could not remove revoked credential: {}", e);
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!("Starting interactive authorization");
        let credential = self
            .provider
            .authorize(required_scopes)
            .await
            .and_then(|fresh| ensure_unexpired(fresh, exchange_failed))?;

        Ok(self.persist(credential).await)
    }

    /// Drop the stored credential, e.g. after the API reports it revoked
    pub async fn invalidate(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store.clear().await?;
        Ok(())
    }

    /// Mark the stored access token as expired after the API rejected it.
    ///
    /// The refresh token is kept so the next acquisition refreshes silently.
    /// Nothing changes if the store already holds a different access token.
    pub async fn expire(&self, rejected_token: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        let Some(mut credential) = self.store.load().await.ok().flatten() else {
            return Ok(());
        };
        if credential.access_token != rejected_token {
            debug!("Stored credential already replaced, keeping it");
            return Ok(());
        }

        if credential.refresh_token.is_none() {
            self.store.clear().await?;
        } else {
            credential.expires_at = None;
            self.store.save(&credential).await?;
        }
        Ok(())
    }

    async fn persist(&self, credential: Credential) -> AuthorizedHandle {
        if let Err(e) = self.store.save(&credential).await {
            warn!("Could not persist credential, continuing with in-memory token: {}", e);
        }
        AuthorizedHandle::from(&credential)
    }
}

fn refresh_failed(message: String) -> AuthError {
    AuthError::TokenRefreshFailed { message }
}

fn exchange_failed(message: String) -> AuthError {
    AuthError::TokenExchangeFailed { message }
}

fn ensure_unexpired(
    credential: Credential,
    on_expired: fn(String) -> AuthError,
) -> Result<Credential> {
    if credential.is_expired() {
        return Err(on_expired("identity provider issued an already-expired token".to_string()).into());
    }
    Ok(credential)
}
