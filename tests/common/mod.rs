#![allow(dead_code)]

use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{StreamExt, stream};
use ollama_relay::{
    config::RelayConfig,
    routes::create_router,
    state::{AppState, SharedState},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const MODELS: [&str; 2] = ["tinyllama:latest", "llama3:8b"];

/// Exactly the three lines from the reference scenario.
pub const SCENARIO_BODY: &str =
    "{\"message\":{\"content\":\"Hel\"}}\n{\"message\":{\"content\":\"lo!\"}}\n{}\n";

/// Same reply with a malformed line in the middle and a closing `done` object.
pub const NOISY_BODY: &str = concat!(
    "{\"model\":\"tinyllama:latest\",\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
    "this line is not json\n",
    "{\"model\":\"tinyllama:latest\",\"message\":{\"role\":\"assistant\",\"content\":\"lo!\"},\"done\":false}\n",
    "{\"model\":\"tinyllama:latest\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
);

pub const REPLY: &str = "Hello!";

/// Gap between the two fragments of the `paced` model.
pub const PACE: Duration = Duration::from_secs(2);

#[derive(Clone, Default)]
struct Recorder {
    hits: Arc<AtomicUsize>,
    chats: Arc<Mutex<Vec<Value>>>,
}

/// A stand-in Ollama server on an ephemeral port. Behaviour is picked by the
/// `model` field of each chat request:
///
/// - `scenario`: streams [`SCENARIO_BODY`]
/// - `missing`: 404 with an Ollama error body
/// - `slow`: answers after two seconds
/// - `garbage`: 200 with a non-JSON body
/// - `broken-stream`: one fragment, then the connection fails
/// - `error-line`: a fragment, an `{"error": ...}` line, another fragment
/// - `paced`: one fragment, then [`PACE`] of silence, then a second fragment
/// - anything else: streams [`NOISY_BODY`] in small chunks, or replies [`REPLY`] buffered
pub struct Upstream {
    pub base_url: String,
    recorder: Recorder,
}

impl Upstream {
    pub fn hits(&self) -> usize {
        self.recorder.hits.load(Ordering::SeqCst)
    }

    pub fn chat_requests(&self) -> Vec<Value> {
        self.recorder.chats.lock().unwrap().clone()
    }

    pub fn last_chat(&self) -> Value {
        self.chat_requests().pop().expect("no chat request recorded")
    }
}

pub async fn spawn_upstream() -> Upstream {
    let recorder = Recorder::default();
    let app = Router::new()
        .route("/api/tags", get(tags))
        .route("/api/chat", post(chat))
        .with_state(recorder.clone());

    let base_url = serve(app).await;
    Upstream { base_url, recorder }
}

/// An Ollama whose `/api/tags` accepts the request and never answers.
pub async fn spawn_stalled_upstream() -> String {
    let app = Router::new().route(
        "/api/tags",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Json(json!({ "models": [] }))
        }),
    );
    serve(app).await
}

/// Serve a router on 127.0.0.1 and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn relay_state(ollama_host: &str) -> SharedState {
    relay_state_with(RelayConfig {
        ollama_host: ollama_host.to_string(),
        ..RelayConfig::default()
    })
}

pub fn relay_state_with(config: RelayConfig) -> SharedState {
    AppState::new(config).unwrap().shared()
}

/// Run the full relay on an ephemeral port in front of `ollama_host`.
pub async fn spawn_relay(ollama_host: &str) -> String {
    serve(create_router().with_state(relay_state(ollama_host))).await
}

/// Nothing listens on port 1.
pub const UNREACHABLE: &str = "http://127.0.0.1:1";

async fn tags(State(rec): State<Recorder>) -> Json<Value> {
    rec.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "models": MODELS
            .iter()
            .map(|name| json!({ "name": name, "size": 637700138, "digest": "2af3b81862c6" }))
            .collect::<Vec<_>>()
    }))
}

async fn chat(State(rec): State<Recorder>, Json(body): Json<Value>) -> Response {
    rec.hits.fetch_add(1, Ordering::SeqCst);
    rec.chats.lock().unwrap().push(body.clone());

    let model = body["model"].as_str().unwrap_or_default().to_string();
    let streaming = body["stream"].as_bool().unwrap_or(false);

    match model.as_str() {
        "missing" => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "model 'missing' not found, try pulling it first" })),
        )
            .into_response(),
        "garbage" => (StatusCode::OK, "<html>definitely not json</html>").into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            buffered(REPLY)
        }
        "scenario" if streaming => ndjson(vec![Ok(SCENARIO_BODY.to_string())]),
        "broken-stream" if streaming => {
            let items = vec![
                Ok(line("Hel")),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream crashed")),
            ];
            let body = stream::iter(items).then(|item| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                item
            });
            ndjson_body(Body::from_stream(body))
        }
        "paced" if streaming => {
            let first = stream::once(async { Ok::<_, io::Error>(line("Hel")) });
            let second = stream::once(async {
                tokio::time::sleep(PACE).await;
                Ok(line("lo!"))
            });
            ndjson_body(Body::from_stream(first.chain(second)))
        }
        "error-line" if streaming => ndjson(vec![Ok(format!(
            "{}{{\"error\":\"out of memory\"}}\n{}",
            line("Hel"),
            line("lo!")
        ))]),
        _ if streaming => {
            // Small chunks so lines straddle chunk boundaries.
            let chunks = NOISY_BODY
                .as_bytes()
                .chunks(7)
                .map(|c| Ok(String::from_utf8(c.to_vec()).unwrap()))
                .collect();
            ndjson(chunks)
        }
        _ => buffered(REPLY),
    }
}

fn line(content: &str) -> String {
    format!("{}\n", json!({ "message": { "role": "assistant", "content": content }, "done": false }))
}

fn buffered(content: &str) -> Response {
    Json(json!({
        "model": "stub",
        "message": { "role": "assistant", "content": content },
        "done": true
    }))
    .into_response()
}

fn ndjson(chunks: Vec<io::Result<String>>) -> Response {
    ndjson_body(Body::from_stream(stream::iter(chunks)))
}

fn ndjson_body(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}
