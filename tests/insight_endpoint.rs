#[path = "common/mod.rs"]
mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{post_json, read_json, test_config};
use quizgate::insight::TIPS;
use quizgate::{app, build_state_with, Collaborators};
use serde_json::json;
use tower::ServiceExt; // for oneshot

const URI: &str = "/api/ai-insight";

fn router() -> axum::Router {
    app(build_state_with(&test_config(), Collaborators::in_memory()))
}

#[tokio::test]
async fn empty_body_is_warm_up() {
    let req = Request::builder()
        .method("POST")
        .uri(URI)
        .body(Body::empty())
        .unwrap();
    let resp = router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = read_json(resp).await;
    assert_eq!(v["success"], json!(true));
    assert_eq!(v["message"], json!("剛開始熱身，放輕鬆！"));
    assert_eq!(v["encouragement"], json!("每一題都是學習的機會"));
    assert_eq!(v["tip"], json!(TIPS[0]));
}

#[tokio::test]
async fn behavior_drives_all_three_messages() {
    let body = json!({
        "behavior": {
            "avgResponseTime": 6,
            "correctRate": 0.85,
            "consecutiveCorrect": 5,
            "questionIndex": 7,
            "totalQuestions": 12
        },
        "questionType": "review",
        "position": "vue"
    });
    let resp = router()
        .oneshot(post_json(URI, "203.0.113.30", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = read_json(resp).await;
    assert_eq!(v["message"], json!("反應快又準確，impressive！"));
    assert_eq!(v["encouragement"], json!("連續答對 5 題！你太厲害了！"));
    assert_eq!(v["tip"], json!("找出潛在問題，並說明為什麼是問題"));
}

#[tokio::test]
async fn personality_questions_get_honesty_tip() {
    let body = json!({ "questionType": "choice", "questionCategory": "人格特質" });
    let resp = router()
        .oneshot(post_json(URI, "203.0.113.31", &body))
        .await
        .unwrap();
    let v = read_json(resp).await;
    assert_eq!(v["tip"], json!("這題沒有對錯，誠實回答就好"));
}

#[tokio::test]
async fn insight_path_is_not_guarded() {
    let router = router();
    for _ in 0..15 {
        let req = Request::builder()
            .method("POST")
            .uri(URI)
            .header("user-agent", "curl/8.4.0")
            .header("x-forwarded-for", "192.0.2.99")
            .body(Body::from("{}"))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn invalid_json_and_wrong_method() {
    let req = Request::builder()
        .method("POST")
        .uri(URI)
        .body(Body::from("[oops"))
        .unwrap();
    let resp = router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(resp).await["error"], json!("invalid_json"));

    let req = Request::builder()
        .method("PUT")
        .uri(URI)
        .body(Body::empty())
        .unwrap();
    let resp = router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}
