#[path = "common/mod.rs"]
mod common;

use common::EnvGuard;
use once_cell::sync::Lazy;
use quizgate::{build_state_from_env, AppConfig};
use tokio::sync::Mutex;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[tokio::test]
async fn rejects_invalid_boolean_env_values() {
    let _lock = ENV_MUTEX.lock().await;
    let mut env = EnvGuard::new();
    env.remove("LOG_MAX_BYTES");
    env.remove("LOG_ROTATE_KEEP");
    env.set("LOG_ROTATE_COMPRESS", "maybe");

    let err = AppConfig::from_env().expect_err("expected invalid boolean to error");
    assert!(format!("{}", err).contains("LOG_ROTATE_COMPRESS"));
    assert!(build_state_from_env().await.is_err());
}

#[tokio::test]
async fn rejects_malformed_guard_config_file() {
    let _lock = ENV_MUTEX.lock().await;
    let mut env = EnvGuard::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guards.json");
    std::fs::write(&path, "{ not json").unwrap();
    env.set("QUIZGATE_GUARD_CONFIG", path.to_str().unwrap());

    let err = AppConfig::from_env().expect_err("expected invalid JSON to error");
    assert!(format!("{:#}", err).contains("invalid JSON configuration"));
}

#[tokio::test]
async fn guard_order_and_extra_signatures_come_from_env() {
    let _lock = ENV_MUTEX.lock().await;
    let mut env = EnvGuard::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guards.json");
    std::fs::write(&path, r#"{"extraBotSignatures": ["recruitscan"]}"#).unwrap();
    env.set_many(&[
        ("QUIZGATE_GUARD_CONFIG", path.to_str().unwrap()),
        ("QUIZGATE_GUARDS", "bot"),
    ]);
    env.remove("ANTHROPIC_API_KEY");
    env.remove("RECORD_LOG_FILE");

    let state = build_state_from_env().await.unwrap();
    assert_eq!(state.guards.names(), vec!["bot"]);
    assert!(state.generator.is_none());

    let meta = quizgate::util::RequestMeta {
        client_id: "10.0.0.1".into(),
        user_agent: "RecruitScan/0.9".into(),
    };
    assert!(state.guards.evaluate(&meta).await.is_err());
}
