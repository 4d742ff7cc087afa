//! HTTP handlers for the web interface

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sysinfo::System;
use tokio::sync::Mutex;
use tracing::debug;

use crate::commands::ClientState;
use crate::dispatch::Dispatcher;
use crate::protocol::RespValue;
use crate::store::KeyspaceStats;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Mutex<Dispatcher>>,
    /// Identity used for every HTTP command; always on database 0
    pub client: ClientState,
}

/// Request body for command execution
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// The command as a string, e.g., "SET key value"
    pub command: String,
}

/// Response for command execution
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// Whether the command succeeded
    pub success: bool,
    /// The result or error message
    pub result: String,
}

/// Host figures
#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub total_memory_mb: f64,
    pub used_memory_mb: f64,
    pub free_memory_mb: f64,
    /// CPU usage percentage (0-100)
    pub cpu_usage: f64,
    /// Approximate size of all stored keys and values
    pub db_memory_mb: f64,
}

/// Body of `GET /stats`
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub databases: Vec<KeyspaceStats>,
    pub blocked_clients: usize,
    pub connected_clients: usize,
    pub commands_processed: u64,
    pub uptime_seconds: u64,
    pub system: SystemStats,
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

/// Execute a command on database 0
pub async fn execute_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    debug!("HTTP command: {}", req.command);

    let args: Vec<Bytes> = req
        .command
        .split_whitespace()
        .map(|s| Bytes::from(s.to_string()))
        .collect();

    if args.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(CommandResponse {
                success: false,
                result: "Empty command".to_string(),
            }),
        );
    }

    let mut client = state.client.clone();
    let response = state.dispatcher.lock().await.dispatch_immediate(&mut client, args);

    (
        StatusCode::OK,
        Json(CommandResponse {
            success: !response.is_error(),
            result: format_resp_value(&response),
        }),
    )
}

/// Format a RESP value for display
fn format_resp_value(value: &RespValue) -> String {
    match value {
        RespValue::SimpleString(s) => s.clone(),
        RespValue::Error(e) => format!("Error: {}", e),
        RespValue::Integer(i) => format!("(integer) {}", i),
        RespValue::BulkString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        RespValue::Array(arr) if arr.is_empty() => "(empty array)".to_string(),
        RespValue::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{}) {}", i + 1, format_resp_value(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        RespValue::Null | RespValue::NullArray => "(nil)".to_string(),
    }
}

/// Server counters plus host memory and CPU
pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut sys = System::new_all();
    sys.refresh_all();

    let total = sys.total_memory();
    let available = sys.available_memory();

    let dispatcher = state.dispatcher.lock().await;
    let server = dispatcher.state();
    let db_memory: usize = server.dbs.iter().map(|db| db.memory_usage()).sum();

    let stats = StatsResponse {
        databases: server.keyspace_stats(),
        blocked_clients: server.blocking.blocked_clients(),
        connected_clients: server.connected_clients,
        commands_processed: server.commands_processed,
        uptime_seconds: server.started.elapsed().as_secs(),
        system: SystemStats {
            total_memory_mb: megabytes(total),
            used_memory_mb: megabytes(total.saturating_sub(available)),
            free_memory_mb: megabytes(available),
            cpu_usage: sys.global_cpu_usage() as f64,
            db_memory_mb: megabytes(db_memory as u64),
        },
    };

    (StatusCode::OK, Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::response::Response;

    fn state() -> AppState {
        let mut dispatcher = Dispatcher::default();
        let client = dispatcher.connect();
        AppState {
            dispatcher: Arc::new(Mutex::new(dispatcher)),
            client,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn run(state: &AppState, command: &str) -> (StatusCode, serde_json::Value) {
        let response = execute_command(
            State(state.clone()),
            Json(CommandRequest {
                command: command.to_string(),
            }),
        )
        .await
        .into_response();
        let status = response.status();
        (status, body_json(response).await)
    }

    #[tokio::test]
    async fn test_execute_command() {
        let state = state();
        let (status, body) = run(&state, "SET greeting hello").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["result"], "OK");

        let (_, body) = run(&state, "GET greeting").await;
        assert_eq!(body["result"], "hello");

        let (status, _) = run(&state, "   ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_blocking_command_rejected() {
        let state = state();
        let (_, body) = run(&state, "BLPOP queue 0").await;
        assert_eq!(body["success"], false);
        assert_eq!(state.dispatcher.lock().await.state().blocking.blocked_clients(), 0);
    }

    #[tokio::test]
    async fn test_select_does_not_stick() {
        let state = state();
        run(&state, "SELECT 3").await;
        run(&state, "SET k v").await;
        assert!(state.dispatcher.lock().await.state_mut().dbs[0].exists(b"k"));
    }

    #[tokio::test]
    async fn test_stats() {
        let state = state();
        run(&state, "SET k v").await;
        let body = body_json(stats_handler(State(state.clone())).await.into_response()).await;
        assert_eq!(body["databases"][0]["keys"], 1);
        assert_eq!(body["blocked_clients"], 0);
        assert!(body["system"]["total_memory_mb"].is_number());
    }

    #[test]
    fn test_format_resp_value() {
        let value = RespValue::Array(vec![RespValue::bulk_string("a"), RespValue::Null]);
        assert_eq!(format_resp_value(&value), "1) a\n2) (nil)");
        assert_eq!(format_resp_value(&RespValue::Integer(3)), "(integer) 3");
    }
}
