#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration;
use common::{post_json, read_json, test_config, valid_question_reply, StubGenerator};
use quizgate::guards::rate_limit::ManualClock;
use quizgate::records::{AuditAction, MemoryRecordSink};
use quizgate::validate::fallback_question;
use quizgate::{app, build_state_with, Collaborators};
use serde_json::json;
use tower::ServiceExt; // for oneshot

const URI: &str = "/api/generate-question";

struct Harness {
    router: axum::Router,
    generator: Arc<StubGenerator>,
    records: Arc<MemoryRecordSink>,
    clock: Arc<ManualClock>,
}

fn harness(generator: Arc<StubGenerator>) -> Harness {
    let records = Arc::new(MemoryRecordSink::default());
    let clock = Arc::new(ManualClock::default());
    let collab = Collaborators {
        generator: Some(generator.clone()),
        records: records.clone(),
        clock: clock.clone(),
        ..Collaborators::in_memory()
    };
    Harness {
        router: app(build_state_with(&test_config(), collab)),
        generator,
        records,
        clock,
    }
}

#[tokio::test]
async fn vue_quick_accurate_candidate_gets_advanced_question() {
    let h = harness(StubGenerator::replying(format!(
        "好的，這是題目：\n{}\n祝順利！",
        valid_question_reply()
    )));
    let body = json!({
        "position": "vue",
        "behavior": {
            "avgResponseTimeSeconds": 5,
            "correctRate": 0.9,
            "changeCount": 0,
            "questionCount": 5
        },
        "previousQuestions": ["什麼是虛擬 DOM？"]
    });
    let resp = h
        .router
        .clone()
        .oneshot(post_json(URI, "203.0.113.10", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let v = read_json(resp).await;
    assert_eq!(v["success"], json!(true));
    assert_eq!(v["question"]["answer"], json!(0));
    assert_eq!(v["question"]["options"].as_array().unwrap().len(), 4);
    assert_eq!(v["question"]["difficulty"], json!("進階"));
    let insight = v["aiInsight"].as_str().unwrap();
    assert!(insight.contains("你的反應很快！"));

    let prompts = h.generator.prompts();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    assert!(prompt.contains("vue"));
    assert!(prompt.contains("進階"));
    assert!(prompt.contains("quick"));
    assert!(prompt.contains("什麼是虛擬 DOM？"));

    let audit = h.records.audit_entries_for(AuditAction::QuestionGenerated);
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].actor, "203.0.113.10");
}

#[tokio::test]
async fn explicit_difficulty_overrides_suggestion() {
    let h = harness(StubGenerator::replying(valid_question_reply()));
    let body = json!({ "position": "python", "difficulty": "basic" });
    let resp = h
        .router
        .clone()
        .oneshot(post_json(URI, "203.0.113.11", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let prompt = &h.generator.prompts()[0];
    assert!(prompt.contains("難度：基礎"));
    assert!(prompt.contains("python"));
}

#[tokio::test]
async fn unusable_reply_serves_fallback_question() {
    let h = harness(StubGenerator::replying("抱歉，我無法完成這個請求。"));
    let resp = h
        .router
        .clone()
        .oneshot(post_json(URI, "203.0.113.12", &json!({ "position": "devops" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = read_json(resp).await;
    assert_eq!(v["success"], json!(true));
    assert_eq!(v["question"], serde_json::to_value(fallback_question()).unwrap());
    assert_eq!(v["aiInsight"], json!("讓我們開始了解你吧！"));
    assert_eq!(h.records.audit_entries_for(AuditAction::FallbackServed).len(), 1);
}

#[tokio::test]
async fn provider_failure_returns_generic_500() {
    let h = harness(StubGenerator::failing(500));
    let resp = h
        .router
        .clone()
        .oneshot(post_json(URI, "203.0.113.13", &json!({ "position": "ai" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let v = read_json(resp).await;
    assert_eq!(v["success"], json!(false));
    assert_eq!(v["error"], json!("generation_failed"));
    assert_eq!(v["message"], json!("Failed to generate question"));
    assert_eq!(h.records.audit_entries_for(AuditAction::ProviderFailed).len(), 1);
}

#[tokio::test]
async fn missing_provider_is_a_server_error() {
    let router = app(build_state_with(&test_config(), Collaborators::in_memory()));
    let resp = router
        .oneshot(post_json(URI, "203.0.113.14", &json!({ "position": "vue" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let v = read_json(resp).await;
    assert_eq!(v["error"], json!("provider_not_configured"));
}

#[tokio::test]
async fn malformed_requests_are_rejected_before_generation() {
    let h = harness(StubGenerator::replying(valid_question_reply()));
    let cases = [
        (json!({}), "position_required"),
        (json!({ "position": "   " }), "position_required"),
        (json!({ "position": "cobol" }), "invalid_position"),
        (json!({ "position": "vue", "difficulty": "expert" }), "invalid_difficulty"),
        (json!({ "position": "vue", "previousQuestions": [1, 2] }), "invalid_json"),
    ];
    for (i, (body, code)) in cases.into_iter().enumerate() {
        let client = format!("198.51.100.{i}");
        let resp = h
            .router
            .clone()
            .oneshot(post_json(URI, &client, &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
        let v = read_json(resp).await;
        assert_eq!(v["error"], json!(code), "{body}");
    }

    let raw = Request::builder()
        .method("POST")
        .uri(URI)
        .header("content-type", "application/json")
        .header("user-agent", "Mozilla/5.0")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = h.router.clone().oneshot(raw).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = read_json(resp).await;
    assert_eq!(v["error"], json!("invalid_json"));
    assert_eq!(v["message"], json!("Request body is not valid JSON"));
    assert!(h.generator.prompts().is_empty());
}

#[tokio::test]
async fn invalid_json_message_hides_parser_detail() {
    let h = harness(StubGenerator::replying(valid_question_reply()));
    let body = json!({ "position": "vue", "previousQuestions": "not a list" });
    let resp = h
        .router
        .clone()
        .oneshot(post_json(URI, "198.51.100.77", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = read_json(resp).await;
    assert_eq!(v["error"], json!("invalid_json"));
    let message = v["message"].as_str().unwrap();
    assert_eq!(message, "Request body is not valid JSON");
    assert!(!message.contains("line"));
    assert!(!message.contains("expected"));
}

#[tokio::test]
async fn markup_in_previous_questions_is_stripped() {
    let h = harness(StubGenerator::replying(valid_question_reply()));
    let body = json!({
        "position": "angular",
        "previousQuestions": ["<script>alert(1)</script>RxJS 是什麼？"]
    });
    let resp = h
        .router
        .clone()
        .oneshot(post_json(URI, "203.0.113.15", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let prompt = &h.generator.prompts()[0];
    assert!(prompt.contains("scriptalert(1)/scriptRxJS 是什麼？"));
    assert!(!prompt.contains("<script>"));
}

#[tokio::test]
async fn non_post_is_405() {
    let h = harness(StubGenerator::replying(valid_question_reply()));
    let req = Request::builder()
        .method("GET")
        .uri(URI)
        .body(Body::empty())
        .unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let v = read_json(resp).await;
    assert_eq!(v["error"], json!("method_not_allowed"));
}

#[tokio::test]
async fn bot_user_agent_is_403() {
    let h = harness(StubGenerator::replying(valid_question_reply()));
    let req = Request::builder()
        .method("POST")
        .uri(URI)
        .header("content-type", "application/json")
        .header("user-agent", "python-requests/2.31.0")
        .header("x-forwarded-for", "192.0.2.1")
        .body(Body::from(json!({ "position": "vue" }).to_string()))
        .unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let v = read_json(resp).await;
    assert_eq!(v["error"], json!("access_denied"));
    assert!(h.generator.prompts().is_empty());
    assert_eq!(h.records.audit_entries_for(AuditAction::AdmissionRejected).len(), 1);
}

#[tokio::test]
async fn eleventh_request_in_window_is_429_until_window_passes() {
    let h = harness(StubGenerator::replying(valid_question_reply()));
    let body = json!({ "position": "iot" });
    for _ in 0..10 {
        let resp = h
            .router
            .clone()
            .oneshot(post_json(URI, "192.0.2.50", &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = h
        .router
        .clone()
        .oneshot(post_json(URI, "192.0.2.50", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(read_json(resp).await["error"], json!("quota_exceeded"));

    // A different client is unaffected.
    let other = h
        .router
        .clone()
        .oneshot(post_json(URI, "192.0.2.51", &body))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);

    h.clock.advance(Duration::seconds(61));
    let resp = h
        .router
        .clone()
        .oneshot(post_json(URI, "192.0.2.50", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn oversized_body_is_413() {
    let mut cfg = test_config();
    cfg.max_request_bytes = Some(64);
    let collab = Collaborators {
        generator: Some(StubGenerator::replying(valid_question_reply())),
        ..Collaborators::in_memory()
    };
    let router = app(build_state_with(&cfg, collab));
    let body = json!({ "position": "vue", "previousQuestions": ["x".repeat(256)] });
    let resp = router
        .oneshot(post_json(URI, "192.0.2.60", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(read_json(resp).await["error"], json!("payload_too_large"));
}
