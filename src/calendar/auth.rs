//! OAuth authentication for the Google Calendar API
//!
//! Handles the OAuth 2.0 installed-app flow:
//! - Loading the client descriptor (`credentials.json`)
//! - Interactive browser consent with a loopback callback listener and PKCE
//! - Authorization code exchange and refresh-token grants

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use yup_oauth2::ApplicationSecret;

use crate::calendar::credentials::{Credential, IdentityProvider};
use crate::config::{calendar, Config};
use crate::error::{AuthError, CalendarMcpError, Result};

/// PKCE verifier entropy in bytes
const CODE_VERIFIER_LENGTH: usize = 32;

/// How long to let the browser receive the callback page before dropping the listener
const CALLBACK_DRAIN: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<html><body><h1>Authentication successful!</h1><p>You can close this window.</p></body></html>";
const DENIED_PAGE: &str = "<html><body><h1>Authentication failed</h1><p>Access was not granted.</p></body></html>";
const MISSING_CODE_PAGE: &str = "<html><body><h1>Authentication failed</h1><p>No authorization code received.</p></body></html>";
const STALE_PAGE: &str = "<html><body><h1>Authentication already completed</h1></body></html>";

/// Opens the consent URL for the user
pub type BrowserLauncher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Load the OAuth client descriptor (`installed` or `web` layout)
pub fn load_client_secret(path: &Path) -> Result<ApplicationSecret> {
    if !path.exists() {
        return Err(AuthError::ClientSecretNotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let content = std::fs::read(path)?;
    yup_oauth2::parse_application_secret(content).map_err(|e| {
        AuthError::InvalidClientSecret {
            message: e.to_string(),
        }
        .into()
    })
}

/// PKCE flow state (RFC 7636)
#[derive(Debug)]
pub struct PkceFlow {
    /// High-entropy code verifier
    pub verifier: String,
    /// SHA-256 of the verifier, base64url encoded
    pub challenge: String,
    /// CSRF state echoed back by the callback
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = Self::random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        let state = Self::random_token(16);

        Self {
            verifier,
            challenge,
            state,
        }
    }

    fn random_token(len: usize) -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Build the consent URL; requests offline access so a refresh token is issued
    pub fn build_auth_url(
        &self,
        auth_uri: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        let scope = scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            auth_uri,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Query parameters Google appends to the redirect URI
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// The `state` is checked first so an unrelated request cannot pose as a denial
    fn into_code(self, expected_state: &str) -> Result<String> {
        if self.state.as_deref() != Some(expected_state) {
            return Err(AuthError::StateMismatch.into());
        }
        if let Some(reason) = self.error {
            return Err(AuthError::AuthorizationDenied { reason }.into());
        }
        self.code.ok_or_else(|| {
            AuthError::CallbackError {
                message: "no authorization code received".to_string(),
            }
            .into()
        })
    }
}

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// Router serving the OAuth redirect; the first callback carrying a code or error is forwarded
pub fn callback_router(tx: oneshot::Sender<CallbackParams>) -> Router {
    let sender: CallbackSender = Arc::new(Mutex::new(Some(tx)));
    Router::new()
        .route(calendar::CALLBACK_PATH, get(handle_callback))
        .with_state(sender)
}

async fn handle_callback(
    State(sender): State<CallbackSender>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    if params.code.is_none() && params.error.is_none() {
        return (StatusCode::BAD_REQUEST, Html(MISSING_CODE_PAGE));
    }

    let page = if params.error.is_some() {
        DENIED_PAGE
    } else {
        SUCCESS_PAGE
    };

    let tx = sender.lock().ok().and_then(|mut slot| slot.take());
    match tx {
        Some(tx) => {
            let _ = tx.send(params);
            (StatusCode::OK, Html(page))
        }
        None => (StatusCode::GONE, Html(STALE_PAGE)),
    }
}

/// Loopback listener receiving the consent redirect
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Bind on 127.0.0.1; port 0 picks a free port
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr).await.map_err(|e| AuthError::CallbackError {
            message: format!("could not bind callback listener on {}: {}", addr, e),
        })?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, calendar::CALLBACK_PATH)
    }

    /// Serve the redirect until a callback arrives or `timeout` elapses.
    ///
    /// The listener is released before this returns, whatever the outcome.
    pub async fn wait_for_code(self, expected_state: &str, timeout: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = callback_router(tx);
        let listener = self.listener;

        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        debug!("Waiting for authorization callback on port {}", self.port);
        let outcome = tokio::time::timeout(timeout, rx).await;

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(CALLBACK_DRAIN, &mut server).await.is_err() {
            server.abort();
            let _ = server.await;
        }

        match outcome {
            Err(_) => Err(AuthError::AuthorizationTimeout {
                seconds: timeout.as_secs(),
            }
            .into()),
            Ok(Err(_)) => Err(AuthError::CallbackError {
                message: "callback listener stopped before a response arrived".to_string(),
            }
            .into()),
            Ok(Ok(params)) => params.into_code(expected_state),
        }
    }
}

/// Token response from the OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credential(self, fallback_scopes: &[String]) -> Credential {
        let scopes: Vec<String> = match self.scope {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(str::to_string).collect()
            }
            _ => fallback_scopes.to_vec(),
        };
        Credential::new(self.access_token, self.refresh_token, self.expires_in, scopes)
    }
}

/// Error body from the OAuth token endpoint
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn describe_oauth_error(body: &str) -> String {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(OAuthErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{}: {}", error, description),
        Ok(OAuthErrorBody { error, .. }) => error,
        Err(_) => body.trim().to_string(),
    }
}

/// Google OAuth identity provider
pub struct GoogleOAuth {
    /// HTTP client
    http_client: reqwest::Client,

    /// OAuth client descriptor
    secret: ApplicationSecret,

    /// Loopback listener port (0 for ephemeral)
    callback_port: u16,

    /// Consent wait limit
    auth_timeout: Duration,

    browser: BrowserLauncher,
}

impl GoogleOAuth {
    /// Create a provider from the configured client descriptor
    pub fn new(config: &Config) -> Result<Self> {
        config.find_and_copy_client_secret()?;
        let secret = load_client_secret(&config.credentials_path)?;
        Ok(Self::from_secret(
            secret,
            config.oauth_callback_port,
            config.auth_timeout,
        ))
    }

    pub fn from_secret(secret: ApplicationSecret, callback_port: u16, auth_timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            secret,
            callback_port,
            auth_timeout,
            browser: Arc::new(|url: &str| open::that(url)),
        }
    }

    /// Replace the browser launcher
    pub fn with_browser(mut self, browser: BrowserLauncher) -> Self {
        self.browser = browser;
        self
    }

    /// POST a grant to the token endpoint
    async fn request_token(
        &self,
        params: &[(&str, &str)],
        rejected: fn(String) -> AuthError,
    ) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(&self.secret.token_uri)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = describe_oauth_error(&body);

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AuthError::ProviderUnavailable {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        Err(rejected(message).into())
    }

    /// Exchange an authorization code for tokens
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<Credential> {
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let token = self
            .request_token(&params, |message| AuthError::TokenExchangeFailed { message })
            .await?;
        Ok(token.into_credential(scopes))
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuth {
    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            CalendarMcpError::Auth(AuthError::TokenRefreshFailed {
                message: "No refresh token available".to_string(),
            })
        })?;

        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let token = self
            .request_token(&params, |message| AuthError::TokenRefreshFailed { message })
            .await?;
        debug!("Access token refreshed");
        Ok(token.into_credential(&credential.scopes))
    }

    async fn authorize(&self, scopes: &[String]) -> Result<Credential> {
        let listener = CallbackListener::bind(self.callback_port).await?;
        let redirect_uri = listener.redirect_uri();
        let pkce = PkceFlow::new();
        let auth_url = pkce.build_auth_url(
            &self.secret.auth_uri,
            &self.secret.client_id,
            &redirect_uri,
            scopes,
        );

        eprintln!("\nPlease visit this URL to authorize access to Google Calendar:");
        eprintln!("{}\n", auth_url);

        if let Err(e) = (self.browser)(&auth_url) {
            warn!("Could not open browser automatically: {}", e);
            eprintln!("Please open the URL manually.");
        }

        eprintln!(
            "Waiting for authorization callback on port {}...",
            listener.port()
        );
        let code = listener.wait_for_code(&pkce.state, self.auth_timeout).await?;

        info!("Received authorization code, exchanging for tokens");
        let credential = self
            .exchange_code(&code, &pkce.verifier, &redirect_uri, scopes)
            .await?;
        eprintln!("Authorization completed successfully!");
        Ok(credential)
    }
}
