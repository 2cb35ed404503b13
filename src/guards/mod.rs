//! Admission guards for quizgate.
//!
//! Each guard encapsulates one advisory check on the request metadata.  The
//! `GuardPipeline` runs the registered guards in order until the first
//! rejection.  None of this is a security boundary: user agents are
//! spoofable and forwarding headers can be shared or absent.  Deployments
//! that need hard guarantees must put authenticated access control in front
//! of the service.

use std::sync::Arc;

use crate::util::RequestMeta;

pub mod bot;
pub mod rate_limit;

use self::bot::BotGuard;
use self::rate_limit::{Clock, RateLimitGuard, RateLimitStore};

/// Guard tuning loaded from environment or a JSON file.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardConfig {
    /// Signatures added to the built-in bot list.  Matched
    /// case-insensitively as substrings of the user agent.
    #[serde(default)]
    pub extra_bot_signatures: Vec<String>,
    /// Requests admitted per client within one window.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,
    /// Window length in seconds.
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

fn default_rate_limit_max() -> u32 {
    10
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            extra_bot_signatures: Vec::new(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectionKind {
    /// Automated client; maps to 403.
    AccessDenied,
    /// Over the per-client quota; maps to 429.
    QuotaExceeded,
}

/// Why a request was refused admission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub guard: String,
    pub reason: String,
}

/// Trait implemented by all guards.  Returning `None` admits the request as
/// far as this guard is concerned.
#[async_trait::async_trait]
pub trait Guard: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, meta: &RequestMeta) -> Option<Rejection>;
}

/// Runs registered guards in order and stops at the first rejection.
#[derive(Clone)]
pub struct GuardPipeline {
    guards: Vec<Arc<dyn Guard>>,
}

impl GuardPipeline {
    pub fn new(
        order: &[String],
        cfg: &GuardConfig,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut guards: Vec<Arc<dyn Guard>> = Vec::new();
        for name in order {
            match name.as_str() {
                "bot" => guards.push(Arc::new(BotGuard::new(&cfg.extra_bot_signatures))),
                "rate_limit" => guards.push(Arc::new(RateLimitGuard::new(
                    cfg.rate_limit_max,
                    cfg.rate_limit_window_secs,
                    store.clone(),
                    clock.clone(),
                ))),
                _ => {
                    tracing::warn!(guard = %name, "unknown guard name, skipping");
                }
            }
        }
        Self { guards }
    }

    /// Evaluate guards against the request metadata.  Later guards never
    /// run once one rejects, so a bot never consumes quota when `bot` is
    /// ordered before `rate_limit`.
    pub async fn evaluate(&self, meta: &RequestMeta) -> Result<(), Rejection> {
        for guard in &self.guards {
            let gname = guard.name();
            tracing::trace!(guard = %gname, client = %meta.client_id, "evaluating guard");
            if let Some(mut rejection) = guard.check(meta).await {
                if rejection.guard.is_empty() {
                    rejection.guard = gname.to_string();
                }
                tracing::info!(
                    guard = %gname,
                    client = %meta.client_id,
                    reason = %rejection.reason,
                    "request rejected"
                );
                return Err(rejection);
            }
        }
        Ok(())
    }

    /// Registered guard names in evaluation order.
    pub fn names(&self) -> Vec<String> {
        self.guards.iter().map(|g| g.name().to_string()).collect()
    }

    /// Number of registered guards.
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Returns true if the pipeline has no registered guards.
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

/// Parse the guard order from `QUIZGATE_GUARDS`.  If unset, bot detection
/// runs before rate limiting.  Strings are trimmed and lower-cased.
pub fn parse_guard_order() -> Vec<String> {
    if let Ok(var) = std::env::var("QUIZGATE_GUARDS") {
        var.split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        vec!["bot".into(), "rate_limit".into()]
    }
}
