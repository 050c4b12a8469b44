//! Remote app-configuration gate.
//!
//! Fetches the server-owned [`RemoteConfig`] through a [`ConfigSource`],
//! caches the last good copy, and derives the gating the rest of the app
//! obeys: maintenance blocks everything, a forced update blocks until the
//! user follows the update link, a soft update and the warning banner are
//! dismissible for the session.
//!
//! Refresh policy: stale-but-available. A failed fetch keeps the previous
//! cached values and logs a warning; nothing propagates to callers.
//! Overlapping refreshes collapse into a single in-flight request, and a
//! superseded fetch never overwrites newer data.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::types::RemoteConfig;
use crate::version;

#[cfg(test)]
use mockall::automock;

/// Version string baked into the host binary at build time.
pub fn app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ---------------------------------------------------------------------------
// Source seam
// ---------------------------------------------------------------------------

/// Where remote configuration comes from.
///
/// The production implementation is the HTTP [`crate::client::ApiClient`];
/// tests substitute mocks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch_config(&self) -> Result<RemoteConfig>;
}

// ---------------------------------------------------------------------------
// Gate decision
// ---------------------------------------------------------------------------

/// What the app is allowed to do right now, in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Blocks all functionality, regardless of update/warning state.
    Maintenance { message: String },
    /// Blocks interaction until the user follows the update link.
    UpdateRequired { message: String, url: String },
    /// Dismissible update prompt; reappears on next cold start.
    UpdateAvailable { message: String, url: String },
    /// Normal operation.
    Open,
}

// ---------------------------------------------------------------------------
// Cached config
// ---------------------------------------------------------------------------

/// The cached remote config plus when it was fetched.
#[derive(Debug, Clone)]
struct CachedConfig {
    config: RemoteConfig,
    fetched_at: Option<DateTime<Utc>>,
}

impl CachedConfig {
    fn empty() -> Self {
        CachedConfig {
            config: RemoteConfig::default(),
            fetched_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigGate
// ---------------------------------------------------------------------------

/// Derives client-facing gating flags from remote config + local version.
///
/// Dismissal flags are session-scoped: they live on this instance, so a
/// cold start (a fresh gate) resurfaces a still-relevant prompt.
pub struct ConfigGate {
    source: Arc<dyn ConfigSource>,
    current_version: String,
    cached: RwLock<CachedConfig>,
    /// Held across the fetch await point; `try_lock` failure means a
    /// refresh is already in flight and the caller collapses into it.
    in_flight: Mutex<()>,
    /// Monotonic fetch counter; a fetch only applies its result while it
    /// is still the newest started fetch (last-request-wins).
    generation: AtomicU64,
    update_dismissed: AtomicBool,
    warning_dismissed: AtomicBool,
}

impl ConfigGate {
    /// Gate for the running binary's own version.
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self::with_version(source, app_version())
    }

    /// Gate pinned to an explicit app version.
    pub fn with_version(source: Arc<dyn ConfigSource>, current_version: &str) -> Self {
        ConfigGate {
            source,
            current_version: current_version.to_string(),
            cached: RwLock::new(CachedConfig::empty()),
            in_flight: Mutex::new(()),
            generation: AtomicU64::new(0),
            update_dismissed: AtomicBool::new(false),
            warning_dismissed: AtomicBool::new(false),
        }
    }

    // -- Refresh ---------------------------------------------------------

    /// Fetch fresh config and replace the cache.
    ///
    /// Never fails: a transport error keeps the previous cached values.
    /// If a refresh is already in flight this call returns immediately
    /// (the in-flight fetch will deliver the same data).
    pub async fn refresh(&self) {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Config refresh already in flight, collapsing");
            return;
        };

        let generation = self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1;

        match self.source.fetch_config().await {
            Ok(config) => {
                if self.generation.load(AtomicOrdering::SeqCst) != generation {
                    warn!("Discarding superseded config response");
                    return;
                }
                debug!(
                    maintenance = config.is_maintenance,
                    update_flag = config.has_update_flag,
                    latest = %config.latest_version,
                    "Remote config refreshed"
                );
                let mut cached = self.cached.write().await;
                *cached = CachedConfig {
                    config,
                    fetched_at: Some(Utc::now()),
                };
            }
            Err(e) => {
                warn!(error = %e, "Config refresh failed, keeping cached values");
            }
        }
    }

    // -- Derived flags ---------------------------------------------------

    /// Update derivation: raw flag gates everything; an empty
    /// `latest_version` falls back to the raw flag; otherwise the remote
    /// version must be strictly newer than ours.
    fn derive_has_update(config: &RemoteConfig, current_version: &str) -> bool {
        if !config.has_update_flag {
            return false;
        }
        if config.latest_version.trim().is_empty() {
            return true;
        }
        version::is_newer(&config.latest_version, current_version)
    }

    /// Whether an update applies to this install.
    pub async fn has_update(&self) -> bool {
        let cached = self.cached.read().await;
        Self::derive_has_update(&cached.config, &self.current_version)
    }

    /// The gate decision, in priority order: maintenance, forced update,
    /// dismissible update, open.
    pub async fn decision(&self) -> GateDecision {
        let cached = self.cached.read().await;
        let config = &cached.config;

        if config.is_maintenance {
            return GateDecision::Maintenance {
                message: config.maintenance_message.clone(),
            };
        }

        if Self::derive_has_update(config, &self.current_version) {
            if config.force_update {
                return GateDecision::UpdateRequired {
                    message: config.update_message.clone(),
                    url: config.update_url.clone(),
                };
            }
            if !self.update_dismissed.load(AtomicOrdering::SeqCst) {
                return GateDecision::UpdateAvailable {
                    message: config.update_message.clone(),
                    url: config.update_url.clone(),
                };
            }
        }

        GateDecision::Open
    }

    /// The informational warning banner, if shown and not yet dismissed.
    /// Never blocks anything.
    pub async fn active_warning(&self) -> Option<String> {
        if self.warning_dismissed.load(AtomicOrdering::SeqCst) {
            return None;
        }
        let cached = self.cached.read().await;
        if cached.config.show_warning {
            Some(cached.config.warning_message.clone())
        } else {
            None
        }
    }

    /// Dismiss a non-forced update prompt for the rest of this session.
    pub fn dismiss_update(&self) {
        self.update_dismissed.store(true, AtomicOrdering::SeqCst);
    }

    /// Dismiss the warning banner for the rest of this session.
    pub fn dismiss_warning(&self) {
        self.warning_dismissed.store(true, AtomicOrdering::SeqCst);
    }

    // -- Cache inspection ------------------------------------------------

    /// A copy of the cached remote config.
    pub async fn snapshot(&self) -> RemoteConfig {
        self.cached.read().await.config.clone()
    }

    /// When the cache was last successfully refreshed, if ever.
    pub async fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.cached.read().await.fetched_at
    }

    /// Whether the cached config is older than `max_age` (a never-fetched
    /// cache is always stale).
    pub async fn is_stale(&self, max_age: chrono::Duration) -> bool {
        match self.cached.read().await.fetched_at {
            Some(at) => Utc::now() - at > max_age,
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

/// Run the periodic refresh loop until the foreground channel closes.
///
/// Refreshes immediately, then on every interval tick, and whenever the
/// host signals an app-foreground transition on `foreground`.
pub async fn run_poll_loop(
    gate: Arc<ConfigGate>,
    interval: Duration,
    mut foreground: mpsc::Receiver<()>,
) {
    info!(interval_secs = interval.as_secs(), "Config gate poll loop starting");
    gate.refresh().await;

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; already refreshed

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                gate.refresh().await;
            }
            signal = foreground.recv() => {
                match signal {
                    Some(()) => {
                        debug!("Foreground transition, refreshing config");
                        gate.refresh().await;
                    }
                    None => {
                        info!("Config gate poll loop stopping");
                        break;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
