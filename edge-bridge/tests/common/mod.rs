//! Fake engine served by axum on an ephemeral port

#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use edge_bridge::engine::{CircuitBreaker, EngineClient, EngineConfig};
use edge_bridge::store::{FailedPostLedger, LocalStore, SqliteLocalStore};
use parking_lot::Mutex;
use serde_json::{Value, json};
use shared::record::Record;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;

pub const SECRET: &str = "test-secret";

/// How the fake engine answers
#[derive(Debug, Clone)]
pub enum Mode {
    Ok(Value),
    Status(u16),
    Malformed,
    Slow(Duration),
}

/// One captured request
#[derive(Debug, Clone)]
pub struct Captured {
    pub headers: HeaderMap,
    pub body: Value,
}

/// Local edit applied while a request is in flight
pub struct ConcurrentEdit {
    pub store: Arc<SqliteLocalStore>,
    pub table: String,
    pub record: Record,
}

pub struct FakeEngine {
    mode: Mutex<Mode>,
    requests: Mutex<Vec<Captured>>,
    edit: Mutex<Option<ConcurrentEdit>>,
}

impl FakeEngine {
    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    pub fn edit_during_next_request(&self, edit: ConcurrentEdit) {
        *self.edit.lock() = Some(edit);
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().clone()
    }
}

async fn execute(
    State(engine): State<Arc<FakeEngine>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    engine.requests.lock().push(Captured { headers, body });

    let edit = engine.edit.lock().take();
    if let Some(edit) = edit {
        edit.store.save_record(&edit.table, &edit.record).await.unwrap();
    }

    let mode = engine.mode.lock().clone();
    match mode {
        Mode::Ok(body) => Json(body).into_response(),
        Mode::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap();
            (status, Json(json!({"ok": false}))).into_response()
        }
        Mode::Malformed => (StatusCode::OK, "<html>gateway</html>").into_response(),
        Mode::Slow(delay) => {
            tokio::time::sleep(delay).await;
            Json(json!({"ok": true})).into_response()
        }
    }
}

/// Start the fake engine; returns it with its port
pub async fn spawn_engine(mode: Mode) -> (Arc<FakeEngine>, u16) {
    let engine = Arc::new(FakeEngine {
        mode: Mutex::new(mode),
        requests: Mutex::new(Vec::new()),
        edit: Mutex::new(None),
    });
    let app = Router::new()
        .route("/rpc/execute", post(execute))
        .with_state(engine.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (engine, port)
}

pub fn engine_config(port: u16, timeout_ms: u64, threshold: u32) -> EngineConfig {
    EngineConfig {
        enabled: true,
        host: "127.0.0.1".into(),
        port,
        timeout: Duration::from_millis(timeout_ms),
        secret: SECRET.into(),
        service_name: "edge-bridge-test".into(),
        failure_threshold: threshold,
        recovery_time: Duration::from_secs(30),
    }
}

pub async fn memory_store() -> Arc<SqliteLocalStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    Arc::new(SqliteLocalStore::with_pool(pool).await.unwrap())
}

pub fn client(config: &EngineConfig, store: Arc<dyn LocalStore>) -> EngineClient {
    EngineClient::new(
        config,
        Arc::new(CircuitBreaker::new(config.breaker())),
        FailedPostLedger::new(store),
    )
    .unwrap()
}
