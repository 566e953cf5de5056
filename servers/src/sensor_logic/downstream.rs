use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use lib_common::{Reading, ReadingPatch, SensorError, SensorState};

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

const PUSH_EVENT: &str = "sensorData";

/// Frame pushed to every real-time client.
#[derive(Serialize)]
struct SensorPush<'a> {
    event: &'static str,
    data: &'a Reading,
}

/// Any failure while serving a request from the shared state.
struct AppError(SensorError);

impl From<SensorError> for AppError {
    fn from(e: SensorError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        log::error!("Request failed: {}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response()
    }
}

pub fn router(state: Arc<SensorState>) -> Router {
    Router::new()
        .route("/api/sensor", get(current_reading))
        .route("/api/sensor/ble", post(inject_reading))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `0.0.0.0:port` and serves until `shutdown` fires.
pub async fn run(port: u16, state: Arc<SensorState>, shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    serve(listener, state, shutdown).await
}

pub async fn serve(listener: TcpListener, state: Arc<SensorState>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    log::info!("Downstream server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("Downstream server shutting down.");
        })
        .await?;
    Ok(())
}

async fn current_reading(State(state): State<Arc<SensorState>>) -> Result<Json<Reading>, AppError> {
    Ok(Json(state.snapshot().await?))
}

async fn inject_reading(
    State(state): State<Arc<SensorState>>,
    Json(patch): Json<ReadingPatch>,
) -> Result<&'static str, AppError> {
    state.inject(patch).await?;
    Ok("Data received")
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<SensorState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn push_frame(reading: &Reading) -> serde_json::Result<String> {
    serde_json::to_string(&SensorPush {
        event: PUSH_EVENT,
        data: reading,
    })
}

async fn handle_socket(mut socket: WebSocket, state: Arc<SensorState>) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    let mut readings = match state.subscribe(client_id).await {
        Ok(rx) => rx,
        Err(e) => {
            log::error!("Client {} rejected: {}", client_id, e);
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    log::info!("Client {} connected ({} total)", client_id, state.subscriber_count());

    loop {
        tokio::select! {
            incoming = socket.next() => {
                match incoming {
                    // Clients only listen; anything they send is dropped.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            reading = readings.recv() => {
                let Some(reading) = reading else {
                    break;
                };
                match push_frame(&reading) {
                    Ok(json_str) => {
                        if socket.send(Message::Text(json_str.into())).await.is_err() {
                            break; // client disconnected
                        }
                    }
                    Err(e) => log::error!("Failed to encode reading for client {}: {}", client_id, e),
                }
            }
        }
    }

    state.unsubscribe(client_id);
    log::info!("Client {} disconnected", client_id);
}
