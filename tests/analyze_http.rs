#[path = "common/mod.rs"]
mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{spawn_app, spawn_mock_provider, state_with_provider, MOCK_COMPLETION};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt; // for oneshot
use verdict::{app, AppConfig, AppState, Environment};

const POST: &str = "AITA for asking my roommate to pay their half of the utilities?";

fn analyze_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header("content-type", "application/json")
        .header("x-real-ip", "203.0.113.7")
        .body(body.into())
        .unwrap()
}

async fn read_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn successful_analysis_returns_judgment() {
    let mock = spawn_mock_provider().await;
    let state = state_with_provider(AppConfig::default(), &mock.base_url);
    let (base, handle) = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/analyze", base))
        .json(&json!({ "post": POST }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["judgment"], "NTA");
    assert_eq!(
        body["analysis"],
        MOCK_COMPLETION.trim_start_matches("NTA\n")
    );
    // Verdict prefix, structure keyword and balanced wording.
    assert_eq!(body["confidenceScore"], 65);
    assert_eq!(body["formatted"], true);

    let captured = mock.captured.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].body["messages"][1]["content"], POST);

    handle.abort();
    mock.handle.abort();
}

#[tokio::test]
async fn humanized_flag_extends_instruction() {
    let mock = spawn_mock_provider().await;
    let state = state_with_provider(AppConfig::default(), &mock.base_url);
    let router = app(state);

    let plain = router
        .clone()
        .oneshot(analyze_request(json!({ "post": POST }).to_string()))
        .await
        .unwrap();
    assert_eq!(plain.status(), StatusCode::OK);
    let humanized = router
        .oneshot(analyze_request(
            json!({ "post": POST, "isHumanized": true }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(humanized.status(), StatusCode::OK);

    let captured = mock.captured.lock().unwrap().clone();
    let base = captured[0].body["messages"][0]["content"].as_str().unwrap();
    let extended = captured[1].body["messages"][0]["content"].as_str().unwrap();
    assert!(extended.starts_with(base));
    assert!(extended.len() > base.len());
    mock.handle.abort();
}

#[tokio::test]
async fn markup_is_stripped_before_the_provider_sees_it() {
    let mock = spawn_mock_provider().await;
    let state = state_with_provider(AppConfig::default(), &mock.base_url);
    let resp = app(state)
        .oneshot(analyze_request(
            json!({ "post": "  <b>AITA</b> for skipping\u{0007} the wedding?  " }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let captured = mock.captured.lock().unwrap().clone();
    assert_eq!(
        captured[0].body["messages"][1]["content"],
        "AITA for skipping the wedding?"
    );
    mock.handle.abort();
}

#[tokio::test]
async fn validation_failures_return_400() {
    let config = AppConfig {
        rate_limit_max: 100,
        ..AppConfig::default()
    };
    let router = app(AppState::new(config, None));
    let cases = [
        (json!({}).to_string(), "Post content is required and must be a string"),
        (json!({ "post": 7 }).to_string(), "Post content is required and must be a string"),
        (json!({ "post": "" }).to_string(), "Post content is required and must be a string"),
        (json!([1, 2]).to_string(), "Post content is required and must be a string"),
        (json!("just a string").to_string(), "Invalid request body"),
        (json!({ "post": "too short" }).to_string(), "Post content is too short"),
        (
            json!({ "post": "x".repeat(100_001) }).to_string(),
            "Post content must not exceed 100000 characters",
        ),
        ("{not json".to_string(), "Invalid JSON in request body"),
    ];
    for (body, expected) in cases {
        let resp = router.clone().oneshot(analyze_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", expected);
        assert_eq!(read_json(resp).await, json!({ "error": expected }));
    }
}

#[tokio::test]
async fn post_that_sanitizes_below_minimum_is_too_short() {
    let router = app(AppState::new(AppConfig::default(), None));
    let resp = router
        .oneshot(analyze_request(
            json!({ "post": "<p></p><br/><span>hi</span>" }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json(resp).await,
        json!({ "error": "Post content is too short" })
    );
}

#[tokio::test]
async fn missing_credential_returns_500() {
    let router = app(AppState::new(AppConfig::default(), None));
    let resp = router
        .oneshot(analyze_request(json!({ "post": POST }).to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        read_json(resp).await,
        json!({ "error": "GROQ API key not configured" })
    );
}

#[tokio::test]
async fn upstream_auth_and_throttle_are_classified() {
    let mock = spawn_mock_provider().await;
    let router = app(state_with_provider(AppConfig::default(), &mock.base_url));

    let resp = router
        .clone()
        .oneshot(analyze_request(
            json!({ "post": "AITA auth-fail scenario here" }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        read_json(resp).await,
        json!({ "error": "Authentication failed with the AI service" })
    );

    let resp = router
        .oneshot(analyze_request(
            json!({ "post": "AITA throttle scenario here" }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        read_json(resp).await,
        json!({ "error": "AI service rate limit exceeded. Please try again later." })
    );
    mock.handle.abort();
}

#[tokio::test]
async fn empty_completion_detail_depends_on_environment() {
    let mock = spawn_mock_provider().await;
    let body = json!({ "post": "AITA empty-choices scenario" }).to_string();

    let prod = app(state_with_provider(AppConfig::default(), &mock.base_url));
    let resp = prod.oneshot(analyze_request(body.clone())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        read_json(resp).await,
        json!({ "error": "Failed to analyze post" })
    );

    let dev_config = AppConfig {
        environment: Environment::Development,
        ..AppConfig::default()
    };
    let dev = app(state_with_provider(dev_config, &mock.base_url));
    let resp = dev.oneshot(analyze_request(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        read_json(resp).await,
        json!({ "error": "Invalid response from GROQ API" })
    );
    mock.handle.abort();
}

#[tokio::test]
async fn unclassified_provider_status_passes_through() {
    let mock = spawn_mock_provider().await;
    let body = json!({ "post": "AITA overloaded scenario" }).to_string();

    let prod = app(state_with_provider(AppConfig::default(), &mock.base_url));
    let resp = prod.oneshot(analyze_request(body.clone())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        read_json(resp).await,
        json!({ "error": "Failed to analyze post" })
    );

    let dev_config = AppConfig {
        environment: Environment::Development,
        ..AppConfig::default()
    };
    let dev = app(state_with_provider(dev_config, &mock.base_url));
    let resp = dev.oneshot(analyze_request(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(read_json(resp).await, json!({ "error": "over capacity" }));
    mock.handle.abort();
}

#[tokio::test]
async fn unreachable_provider_is_a_generic_500() {
    // Bind then drop a listener so the port refuses connections.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let router = app(state_with_provider(
        AppConfig::default(),
        &format!("http://{}", addr),
    ));
    let resp = router
        .oneshot(analyze_request(json!({ "post": POST }).to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        read_json(resp).await,
        json!({ "error": "Failed to analyze post" })
    );
}

#[tokio::test]
async fn healthz_reports_provider_presence() {
    let router = app(AppState::new(AppConfig::default(), None));
    let req = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "llama-3.3-70b-versatile");
    assert_eq!(body["providerConfigured"], false);
}
