//! HTTP client for the pocketledger backend.
//!
//! One [`ApiClient`] speaks the `{ success, data, error }` envelope the
//! backend wraps every response in, holds the bearer session token after
//! login, and implements the two seams the rest of the crate consumes:
//! [`ConfigSource`] (the gate's config feed) and [`FinanceStore`] (the
//! ledger's persistence target).
//!
//! A 401 from any authenticated endpoint drops the stored session so the
//! caller re-authenticates instead of hammering a dead token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gate::ConfigSource;
use crate::ledger::FinanceStore;
use crate::types::{
    ConfigPatch, Credentials, Expense, Income, LedgerPatch, LedgerSnapshot, RemoteConfig, Session,
    User,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-request timeout. Short on purpose: the gate must fall back to its
/// cache quickly on a dead network rather than hang the caller.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Wire envelope & errors
// ---------------------------------------------------------------------------

/// Every backend response body: `{ success, data }` or
/// `{ success: false, error }`.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// Errors surfaced by the backend client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Session token rejected. The stored session has been cleared.
    #[error("Session expired or invalid")]
    Unauthorized,

    #[error("Backend error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Backend returned an empty success payload")]
    EmptyPayload,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Backend API client with bearer-session auth.
pub struct ApiClient {
    http: Client,
    base_url: String,
    /// Bearer token once signed in. Cleared on logout and on any 401.
    session: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("pocketledger/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build backend HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: RwLock::new(None),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().unwrap().is_some()
    }

    /// Restore a previously saved session token (e.g. from keychain).
    pub fn set_session_token(&self, token: String) {
        *self.session.write().unwrap() = Some(token);
    }

    pub fn logout(&self) {
        *self.session.write().unwrap() = None;
        debug!("Session cleared");
    }

    // -- Auth ------------------------------------------------------------

    /// Create an account and start a session.
    pub async fn register(&self, credentials: &Credentials) -> Result<User> {
        let session: Session = self
            .execute(
                self.http
                    .post(self.url("/auth/register"))
                    .json(credentials),
            )
            .await
            .context("Register request failed")?;
        info!(email = %session.user.email, "Registered and signed in");
        *self.session.write().unwrap() = Some(session.token);
        Ok(session.user)
    }

    /// Sign in with existing credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let body = Credentials {
            email: email.to_string(),
            password: password.to_string(),
            display_name: String::new(),
        };
        let session: Session = self
            .execute(self.http.post(self.url("/auth/login")).json(&body))
            .await
            .context("Login request failed")?;
        info!(email = %session.user.email, "Signed in");
        *self.session.write().unwrap() = Some(session.token);
        Ok(session.user)
    }

    // -- Admin -----------------------------------------------------------

    /// Partially update the remote config singleton. Admin token, not a
    /// user session.
    pub async fn update_config(&self, admin_token: &str, patch: &ConfigPatch) -> Result<RemoteConfig> {
        self.execute(
            self.http
                .put(self.url("/config"))
                .bearer_auth(admin_token)
                .json(patch),
        )
        .await
        .context("Config update request failed")
    }

    // -- Internal helpers ------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.session.read().unwrap().as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and unwrap the response envelope.
    ///
    /// 401 clears the stored session before surfacing
    /// [`ClientError::Unauthorized`].
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = request.send().await.context("Backend request failed")?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!("Backend rejected session token; clearing session");
            *self.session.write().unwrap() = None;
            return Err(ClientError::Unauthorized.into());
        }

        if !status.is_success() {
            // Error envelopes still carry a message worth surfacing
            let message = match resp.json::<ApiEnvelope<serde_json::Value>>().await {
                Ok(env) => env.error.unwrap_or_default(),
                Err(_) => String::new(),
            };
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let envelope: ApiEnvelope<T> = resp
            .json()
            .await
            .context("Failed to parse backend response envelope")?;
        Self::unwrap_envelope(envelope, status)
    }

    fn unwrap_envelope<T>(envelope: ApiEnvelope<T>, status: StatusCode) -> Result<T> {
        if !envelope.success {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: envelope.error.unwrap_or_default(),
            }
            .into());
        }
        envelope.data.ok_or_else(|| ClientError::EmptyPayload.into())
    }

    /// Body-less success (`data: null` with `success: true`), as returned
    /// by the DELETE endpoints.
    async fn execute_no_content(&self, request: RequestBuilder) -> Result<()> {
        let resp = request.send().await.context("Backend request failed")?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!("Backend rejected session token; clearing session");
            *self.session.write().unwrap() = None;
            return Err(ClientError::Unauthorized.into());
        }

        let envelope: ApiEnvelope<serde_json::Value> = resp
            .json()
            .await
            .context("Failed to parse backend response envelope")?;
        if !status.is_success() || !envelope.success {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: envelope.error.unwrap_or_default(),
            }
            .into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ConfigSource implementation (gate feed)
// ---------------------------------------------------------------------------

#[async_trait]
impl ConfigSource for ApiClient {
    /// `GET /config` — public, no session required.
    async fn fetch_config(&self) -> Result<RemoteConfig> {
        debug!("Fetching remote config");
        self.execute(self.http.get(self.url("/config")))
            .await
            .context("Config fetch failed")
    }
}

// ---------------------------------------------------------------------------
// FinanceStore implementation (ledger persistence)
// ---------------------------------------------------------------------------

#[async_trait]
impl FinanceStore for ApiClient {
    async fn save_expense(&self, expense: &Expense) -> Result<()> {
        let _: Expense = self
            .execute(self.authed(Method::POST, "/finance/expense").json(expense))
            .await
            .context("Expense save failed")?;
        Ok(())
    }

    async fn delete_expense(&self, id: Uuid) -> Result<()> {
        self.execute_no_content(self.authed(Method::DELETE, &format!("/finance/expense/{id}")))
            .await
            .context("Expense delete failed")
    }

    async fn save_income(&self, income: &Income) -> Result<()> {
        let _: Income = self
            .execute(self.authed(Method::POST, "/finance/income").json(income))
            .await
            .context("Income save failed")?;
        Ok(())
    }

    async fn delete_income(&self, id: Uuid) -> Result<()> {
        self.execute_no_content(self.authed(Method::DELETE, &format!("/finance/income/{id}")))
            .await
            .context("Income delete failed")
    }

    /// `PUT /finance` merges the patch into the stored snapshot.
    async fn merge_snapshot(&self, patch: &LedgerPatch) -> Result<()> {
        let _: LedgerSnapshot = self
            .execute(self.authed(Method::PUT, "/finance").json(patch))
            .await
            .context("Snapshot merge failed")?;
        Ok(())
    }

    async fn fetch_snapshot(&self) -> Result<LedgerSnapshot> {
        self.execute(self.authed(Method::GET, "/finance"))
            .await
            .context("Snapshot fetch failed")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
