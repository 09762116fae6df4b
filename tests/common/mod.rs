use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use verdict::provider::{CompletionProvider, GroqProvider};
use verdict::{app, AppConfig, AppState};

/// Tracks environment variable mutations and restores originals on drop.
#[allow(dead_code)]
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

#[allow(dead_code)]
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

/// Canned completion returned by the mock provider on the happy path.
#[allow(dead_code)]
pub const MOCK_COMPLETION: &str = "NTA\n## Summary\nYou asked your roommate to pay their share.\n\nHowever, the tone could have been kinder.";

/// One request the mock provider received.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Captured {
    pub authorization: Option<String>,
    pub body: Value,
}

#[allow(dead_code)]
pub struct MockProvider {
    pub base_url: String,
    pub captured: Arc<Mutex<Vec<Captured>>>,
    pub handle: JoinHandle<()>,
}

/// Spin up an OpenAI-compatible `/chat/completions` mock. The reply is
/// picked from markers in the user message:
/// `auth-fail` (401), `throttle` (429), `overloaded` (503),
/// `empty-choices` (200 with no choices), anything else (200 with
/// [`MOCK_COMPLETION`]).
#[allow(dead_code)]
pub async fn spawn_mock_provider() -> MockProvider {
    async fn complete(
        State(captured): State<Arc<Mutex<Vec<Captured>>>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> axum::response::Response {
        let user = body["messages"]
            .as_array()
            .and_then(|msgs| msgs.iter().find(|m| m["role"] == "user"))
            .and_then(|m| m["content"].as_str())
            .unwrap_or("")
            .to_string();
        captured.lock().unwrap().push(Captured {
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
        });

        if user.contains("auth-fail") {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"message": "Invalid API Key"}})),
            )
                .into_response()
        } else if user.contains("throttle") {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {"message": "Rate limit reached"}})),
            )
                .into_response()
        } else if user.contains("overloaded") {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": {"message": "over capacity"}})),
            )
                .into_response()
        } else if user.contains("empty-choices") {
            Json(json!({"choices": []})).into_response()
        } else {
            Json(json!({
                "choices": [
                    {"index": 0, "message": {"role": "assistant", "content": MOCK_COMPLETION}}
                ]
            }))
            .into_response()
        }
    }

    let captured = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/chat/completions", post(complete))
        .with_state(captured.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    MockProvider {
        base_url: format!("http://{}", addr),
        captured,
        handle,
    }
}

/// State wired to a Groq client pointed at `base_url`.
#[allow(dead_code)]
pub fn state_with_provider(config: AppConfig, base_url: &str) -> AppState {
    let provider: Arc<dyn CompletionProvider> =
        Arc::new(GroqProvider::new("gsk_test", base_url).unwrap());
    AppState::new(config, Some(provider))
}

/// Serve the app on an ephemeral port and return its base URL.
#[allow(dead_code)]
pub async fn spawn_app(state: AppState) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

/// Send a request head plus the start of a body that never finishes, and
/// return the response status line. The socket stays open so the server can
/// only answer by deciding before the body is complete.
#[allow(dead_code)]
pub async fn status_for_stalled_body(base: &str, extra_headers: &[(&str, &str)]) -> String {
    let addr = base.trim_start_matches("http://");
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut head = String::from(
        "POST /api/analyze HTTP/1.1\r\nhost: localhost\r\ncontent-type: application/json\r\n",
    );
    let declares_length = extra_headers
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case("content-length"));
    if !declares_length {
        head.push_str("content-length: 4096\r\n");
    }
    for (k, v) in extra_headers {
        head.push_str(&format!("{}: {}\r\n", k, v));
    }
    head.push_str("\r\n{\"post\":");
    stream.write_all(head.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(2).any(|w| w == b"\r\n") {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before a status line arrived");
        buf.extend_from_slice(&chunk[..n]);
    }
    let text = String::from_utf8_lossy(&buf);
    text.lines().next().unwrap_or("").to_string()
}
