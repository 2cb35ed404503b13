#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use quizgate::generator::{GenerationError, QuestionGenerator};
use quizgate::guards::GuardConfig;
use quizgate::{AppConfig, RotationConfig};

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Configuration with default guards and no provider, files or limits.
pub fn test_config() -> AppConfig {
    AppConfig {
        provider: None,
        guard_config: GuardConfig::default(),
        guard_order: vec!["bot".into(), "rate_limit".into()],
        record_log_file: None,
        rotation: RotationConfig {
            max_bytes: None,
            keep: 1,
            compress: false,
        },
        max_request_bytes: None,
    }
}

/// Generator that returns a canned reply and remembers every prompt.
pub struct StubGenerator {
    reply: Result<String, u16>,
    prompts: Mutex<Vec<String>>,
}

impl StubGenerator {
    pub fn replying(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(status),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl QuestionGenerator for StubGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(GenerationError::Status { status: *status }),
        }
    }
}

/// A browser-looking JSON POST from `client`.
pub fn post_json(uri: &str, client: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("user-agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
        .header("x-forwarded-for", client)
        .header("origin", "https://recruit.example.com")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn read_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A reply that satisfies the question contract.
pub fn valid_question_reply() -> String {
    serde_json::json!({
        "question": "在 Vue 3 中，下列哪個 API 最適合在元件卸載時清除計時器？",
        "options": ["onUnmounted", "onMounted", "watchEffect", "computed"],
        "answer": 0,
        "explanation": "onUnmounted 在元件卸載後執行，適合釋放資源。",
        "difficulty": "進階",
        "category": "Vue"
    })
    .to_string()
}
