//! Hub HTTP API
//!
//! REST endpoints plus the /ws subscription channel for the external
//! REST/UI layer.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use super::types::{ApiResponse, InitialMessage, PriceResponse};
use super::Broadcaster;
use crate::engine::{Engine, QueryError};
use crate::types::Candle;

#[derive(Clone)]
struct HubState {
    engine: Engine,
    broadcaster: Broadcaster,
}

/// Create the API router with all endpoints
pub fn create_router(engine: Engine, broadcaster: Broadcaster) -> Router {
    Router::new()
        .route("/api/instruments", get(get_instruments))
        .route("/api/price/:instrument", get(get_price))
        .route("/api/candles/:instrument/:timeframe", get(get_candles))
        .route("/ws", get(websocket_handler))
        .with_state(HubState {
            engine,
            broadcaster,
        })
        // CORS for the excluded UI layer
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn query_error<T>(e: QueryError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = match e {
        QueryError::UnknownInstrument(_) | QueryError::UnknownTimeframe(_) => {
            StatusCode::NOT_FOUND
        }
        QueryError::PriceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

/// GET /api/instruments - tracked instrument identifiers
async fn get_instruments(State(state): State<HubState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.instruments()))
}

/// GET /api/price/:instrument - current aggregated price with raw quotes
async fn get_price(
    Path(instrument): Path<String>,
    State(state): State<HubState>,
) -> impl IntoResponse {
    match state.engine.price(&instrument).await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ApiResponse::success(PriceResponse::new(
                snapshot.asset.to_string(),
                snapshot.price.price,
                snapshot.price.updated_at,
                &snapshot.quotes,
            ))),
        ),
        Err(e) => query_error(e),
    }
}

/// GET /api/candles/:instrument/:timeframe - last N candles, same depth as
/// the broadcast snapshot
async fn get_candles(
    Path((instrument, timeframe)): Path<(String, String)>,
    State(state): State<HubState>,
) -> impl IntoResponse {
    let limit = state.engine.snapshot_limit();
    match state.engine.candles(&instrument, &timeframe, limit).await {
        Ok(candles) => (StatusCode::OK, Json(ApiResponse::<Vec<Candle>>::success(candles))),
        Err(e) => query_error(e),
    }
}

/// WebSocket upgrade handler
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<HubState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

enum OutgoingMessage {
    Text(String),
    Pong(Vec<u8>),
}

/// Handle one subscriber connection.
///
/// The subscriber gets a full snapshot before any incremental message. A
/// subscriber that lags behind the broadcast channel or whose socket send
/// fails is dropped; nothing here blocks the ingestion pipeline.
async fn handle_websocket(socket: WebSocket, state: HubState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe first so updates arriving while the snapshot is built are
    // queued rather than missed.
    let mut rx = state.broadcaster.subscribe();
    tracing::info!(subscribers = state.broadcaster.receiver_count(), "Subscriber connected");

    let initial = InitialMessage::new(state.engine.snapshot().await);
    match serde_json::to_string(&initial) {
        Ok(json) => {
            if sender.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize initial snapshot");
            return;
        }
    }

    // Per-subscriber outbound queue drained by its own send task
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<OutgoingMessage>(32);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let result = match msg {
                OutgoingMessage::Text(text) => sender.send(Message::Text(text)).await,
                OutgoingMessage::Pong(data) => sender.send(Message::Pong(data)).await,
            };
            if result.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            broadcast_msg = rx.recv() => {
                match broadcast_msg {
                    Ok(msg) => {
                        if out_tx.send(OutgoingMessage::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Subscriber too slow, dropping");
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if out_tx.send(OutgoingMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    send_task.abort();
    tracing::info!("Subscriber disconnected");
}
