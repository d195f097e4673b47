use backend_guard::captcha::{CaptchaConfig, CaptchaError, CaptchaVerifier, RecaptchaVerifier};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, secret: Option<&str>, production: bool) -> CaptchaConfig {
    CaptchaConfig {
        secret: secret.map(str::to_string),
        verify_url: format!("{}/siteverify", server.uri()),
        min_score: 0.5,
        production,
    }
}

async fn reply_with(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/siteverify"))
        .and(body_string_contains("secret=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn score_above_threshold_passes() {
    let server = MockServer::start().await;
    reply_with(&server, json!({ "success": true, "score": 0.9 })).await;

    let verifier = RecaptchaVerifier::new(config(&server, Some("s3cret"), true)).unwrap();
    let verdict = verifier.verify("token-ok", Some("192.0.2.1")).await.unwrap();

    assert!(verdict.passed);
    assert_eq!(verdict.score, Some(0.9));
}

#[tokio::test]
async fn low_score_is_rejected() {
    let server = MockServer::start().await;
    reply_with(&server, json!({ "success": true, "score": 0.2 })).await;

    let verifier = RecaptchaVerifier::new(config(&server, Some("s3cret"), true)).unwrap();
    let verdict = verifier.verify("token-bot", None).await.unwrap();

    assert!(!verdict.passed);
}

#[tokio::test]
async fn unsuccessful_reply_is_rejected() {
    let server = MockServer::start().await;
    reply_with(
        &server,
        json!({ "success": false, "error-codes": ["invalid-input-response"] }),
    )
    .await;

    let verifier = RecaptchaVerifier::new(config(&server, Some("s3cret"), false)).unwrap();
    assert!(!verifier.verify("expired", None).await.unwrap().passed);
}

#[tokio::test]
async fn checkbox_reply_without_score_passes() {
    let server = MockServer::start().await;
    reply_with(&server, json!({ "success": true })).await;

    let verifier = RecaptchaVerifier::new(config(&server, Some("s3cret"), true)).unwrap();
    assert!(verifier.verify("v2-token", None).await.unwrap().passed);
}

#[tokio::test]
async fn token_and_address_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/siteverify"))
        .and(body_string_contains("response=abc123"))
        .and(body_string_contains("remoteip=192.0.2.9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let verifier = RecaptchaVerifier::new(config(&server, Some("s3cret"), true)).unwrap();
    assert!(verifier.verify("abc123", Some("192.0.2.9")).await.unwrap().passed);
}

#[tokio::test]
async fn service_error_is_a_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/siteverify"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let verifier = RecaptchaVerifier::new(config(&server, Some("s3cret"), true)).unwrap();
    let result = verifier.verify("token", None).await;
    assert!(matches!(result, Err(CaptchaError::Transport(_))));
}

#[tokio::test]
async fn production_refuses_to_start_without_secret() {
    let server = MockServer::start().await;
    let result = RecaptchaVerifier::new(config(&server, None, true));
    assert!(matches!(result, Err(CaptchaError::Misconfigured)));
}

#[tokio::test]
async fn development_bypasses_without_secret() {
    let server = MockServer::start().await;
    // 放行模式不应请求外部服务
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .expect(0)
        .mount(&server)
        .await;

    let verifier = RecaptchaVerifier::new(config(&server, None, false)).unwrap();
    assert!(verifier.verify("anything", None).await.unwrap().passed);
}
