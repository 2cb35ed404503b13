use super::{Guard, Rejection, RejectionKind};
use crate::util::{ac_for, RequestMeta};

/// Built-in user-agent signatures: generic crawler words, common HTTP client
/// libraries and headless browser markers.
pub const DEFAULT_BOT_SIGNATURES: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "scraper",
    "curl",
    "wget",
    "python-requests",
    "python-urllib",
    "aiohttp",
    "httpx",
    "go-http-client",
    "java/",
    "okhttp",
    "libwww-perl",
    "axios",
    "node-fetch",
    "headlesschrome",
    "phantomjs",
    "selenium",
    "puppeteer",
    "playwright",
];

/// Rejects requests whose declared user agent matches a bot signature.
/// Advisory only: an empty or spoofed user agent passes.
pub struct BotGuard {
    signatures: Vec<String>,
}

impl BotGuard {
    pub fn new(extra: &[String]) -> Self {
        let mut signatures: Vec<String> =
            DEFAULT_BOT_SIGNATURES.iter().map(|s| s.to_string()).collect();
        signatures.extend(
            extra
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),
        );
        Self { signatures }
    }

    pub fn is_bot(&self, user_agent: &str) -> bool {
        if user_agent.is_empty() {
            return false;
        }
        match ac_for(&self.signatures) {
            Some(ac) => ac.is_match(user_agent),
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl Guard for BotGuard {
    fn name(&self) -> &str {
        "bot"
    }

    async fn check(&self, meta: &RequestMeta) -> Option<Rejection> {
        if self.is_bot(&meta.user_agent) {
            return Some(Rejection {
                kind: RejectionKind::AccessDenied,
                guard: "bot".into(),
                reason: "Automated client detected".into(),
            });
        }
        None
    }
}
