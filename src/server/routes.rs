//! Backend route handlers.
//!
//! All endpoints wrap their payload in the `{ success, data }` envelope.
//! State is shared via `Arc<BackendState>` — everything lives in memory,
//! keyed per user. Writes follow last-writer-wins; there is no version
//! checking on the snapshot.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::types::{
    Category, ConfigPatch, Credentials, Expense, Income, LedgerPatch, LedgerSnapshot, RemoteConfig,
    Session, User,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct UserRecord {
    user: User,
    password_digest: String,
}

/// Shared state accessible by all route handlers.
pub struct BackendState {
    /// App-wide config singleton, admin-writable.
    config: RwLock<RemoteConfig>,
    /// Users keyed by lowercased email.
    users: RwLock<HashMap<String, UserRecord>>,
    /// Bearer token → user id.
    sessions: RwLock<HashMap<String, Uuid>>,
    /// Per-user financial snapshots.
    ledgers: RwLock<HashMap<Uuid, LedgerSnapshot>>,
    /// Static token authorizing `PUT /config`.
    admin_token: String,
}

pub type AppState = Arc<BackendState>;

impl BackendState {
    pub fn new(admin_token: String) -> Self {
        Self {
            config: RwLock::new(RemoteConfig::default()),
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            ledgers: RwLock::new(HashMap::new()),
            admin_token,
        }
    }

    fn digest(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }
}

/// Categories every fresh account starts with.
fn default_categories() -> Vec<Category> {
    let builtin = [
        ("Groceries", "#4caf50", "cart"),
        ("Transport", "#2196f3", "bus"),
        ("Housing", "#795548", "home"),
        ("Entertainment", "#9c27b0", "film"),
        ("Health", "#f44336", "heart"),
        ("Other", "#607d8b", "dots"),
    ];
    builtin
        .iter()
        .map(|(name, color, icon)| Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            is_custom: false,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// `{ success: true, data }` — the success half of the envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

// ---------------------------------------------------------------------------
// Auth helpers
// ---------------------------------------------------------------------------

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the session token in `Authorization: Bearer ...` to a user id.
async fn authenticate(state: &BackendState, headers: &HeaderMap) -> ApiResult<Uuid> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    state
        .sessions
        .read()
        .await
        .get(token)
        .copied()
        .ok_or(ApiError::Unauthorized)
}

async fn start_session(state: &BackendState, user: User) -> Session {
    let token = Uuid::new_v4().to_string();
    state.sessions.write().await.insert(token.clone(), user.id);
    Session { token, user }
}

// ---------------------------------------------------------------------------
// Config routes
// ---------------------------------------------------------------------------

/// GET /config — public.
pub async fn get_config(State(state): State<AppState>) -> Json<Envelope<RemoteConfig>> {
    ok(state.config.read().await.clone())
}

/// PUT /config — admin token only; merges the patch into the singleton.
pub async fn put_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<ConfigPatch>,
) -> ApiResult<Json<Envelope<RemoteConfig>>> {
    match bearer_token(&headers) {
        Some(token) if token == state.admin_token => {}
        _ => return Err(ApiError::AdminOnly),
    }

    let mut config = state.config.write().await;
    config.merge(patch);
    info!(
        maintenance = config.is_maintenance,
        force_update = config.force_update,
        "Remote config updated"
    );
    Ok(ok(config.clone()))
}

// ---------------------------------------------------------------------------
// Auth routes
// ---------------------------------------------------------------------------

/// POST /auth/register — creates the account, seeds its ledger with the
/// built-in categories, and starts a session.
pub async fn register(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Json<Envelope<Session>>> {
    let email = credentials.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(ApiError::InvalidRequest("Invalid email address".into()));
    }
    if credentials.password.len() < 8 {
        return Err(ApiError::InvalidRequest(
            "Password must be at least 8 characters".into(),
        ));
    }

    let mut users = state.users.write().await;
    if users.contains_key(&email) {
        return Err(ApiError::EmailTaken);
    }

    let user = User {
        id: Uuid::new_v4(),
        email: email.clone(),
        display_name: if credentials.display_name.trim().is_empty() {
            email.clone()
        } else {
            credentials.display_name.trim().to_string()
        },
    };
    users.insert(
        email,
        UserRecord {
            user: user.clone(),
            password_digest: BackendState::digest(&credentials.password),
        },
    );
    drop(users);

    state.ledgers.write().await.insert(
        user.id,
        LedgerSnapshot {
            categories: default_categories(),
            ..Default::default()
        },
    );

    info!(email = %user.email, "User registered");
    Ok(ok(start_session(&state, user).await))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Json<Envelope<Session>>> {
    let email = credentials.email.trim().to_lowercase();
    let users = state.users.read().await;
    let record = users.get(&email).ok_or(ApiError::InvalidCredentials)?;
    if record.password_digest != BackendState::digest(&credentials.password) {
        warn!(email = %email, "Login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }
    let user = record.user.clone();
    drop(users);

    debug!(email = %user.email, "User signed in");
    Ok(ok(start_session(&state, user).await))
}

// ---------------------------------------------------------------------------
// Finance routes
// ---------------------------------------------------------------------------

/// GET /finance — the caller's full snapshot.
pub async fn get_finance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Envelope<LedgerSnapshot>>> {
    let user_id = authenticate(&state, &headers).await?;
    let ledgers = state.ledgers.read().await;
    Ok(ok(ledgers.get(&user_id).cloned().unwrap_or_default()))
}

/// PUT /finance — merge a partial snapshot; absent fields untouched.
pub async fn put_finance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<LedgerPatch>,
) -> ApiResult<Json<Envelope<LedgerSnapshot>>> {
    let user_id = authenticate(&state, &headers).await?;
    let mut ledgers = state.ledgers.write().await;
    let snapshot = ledgers.entry(user_id).or_default();
    patch.apply_to(snapshot);
    Ok(ok(snapshot.clone()))
}

/// POST /finance/expense — upsert one expense by id.
pub async fn post_expense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(expense): Json<Expense>,
) -> ApiResult<Json<Envelope<Expense>>> {
    let user_id = authenticate(&state, &headers).await?;
    let mut ledgers = state.ledgers.write().await;
    let snapshot = ledgers.entry(user_id).or_default();

    match snapshot.expenses.iter_mut().find(|e| e.id == expense.id) {
        Some(slot) => *slot = expense.clone(),
        None => snapshot.expenses.push(expense.clone()),
    }
    Ok(ok(expense))
}

/// DELETE /finance/expense/:id
pub async fn delete_expense(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Envelope<Option<()>>>> {
    let user_id = authenticate(&state, &headers).await?;
    let mut ledgers = state.ledgers.write().await;
    let snapshot = ledgers.entry(user_id).or_default();

    let idx = snapshot
        .expenses
        .iter()
        .position(|e| e.id == id)
        .ok_or(ApiError::ExpenseNotFound)?;
    snapshot.expenses.remove(idx);
    Ok(ok(None))
}

/// POST /finance/income — upsert one income by id.
pub async fn post_income(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(income): Json<Income>,
) -> ApiResult<Json<Envelope<Income>>> {
    let user_id = authenticate(&state, &headers).await?;
    let mut ledgers = state.ledgers.write().await;
    let snapshot = ledgers.entry(user_id).or_default();

    match snapshot.incomes.iter_mut().find(|i| i.id == income.id) {
        Some(slot) => *slot = income.clone(),
        None => snapshot.incomes.push(income.clone()),
    }
    Ok(ok(income))
}

/// DELETE /finance/income/:id
pub async fn delete_income(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Envelope<Option<()>>>> {
    let user_id = authenticate(&state, &headers).await?;
    let mut ledgers = state.ledgers.write().await;
    let snapshot = ledgers.entry(user_id).or_default();

    let idx = snapshot
        .incomes
        .iter()
        .position(|i| i.id == id)
        .ok_or(ApiError::IncomeNotFound)?;
    snapshot.incomes.remove(idx);
    Ok(ok(None))
}

/// GET /health
pub async fn health() -> axum::http::StatusCode {
    axum::http::StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
