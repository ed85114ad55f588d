use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{HistoryItem, MessageDraft};
use domain::{Message, MessageId, OrderId, PresenceEntry, UserId};

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws_connection::WebSocketConnection;

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    sender_id: Uuid,
    sender_name: String,
    text: Option<String>,
    image_url: Option<String>,
    document_url: Option<String>,
    document_name: Option<String>,
    audio_url: Option<String>,
    audio_duration_secs: Option<u32>,
    reply_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    before: Option<Uuid>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ReceiptPayload {
    recipient_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    order_id: Uuid,
    user_id: Uuid,
    display_name: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/orders/{order_id}/messages",
            post(send_message).get(get_history),
        )
        .route(
            "/orders/{order_id}/messages/{message_id}/thread",
            get(get_thread),
        )
        .route(
            "/orders/{order_id}/messages/{message_id}/delivered",
            post(mark_delivered),
        )
        .route(
            "/orders/{order_id}/messages/{message_id}/read",
            post(mark_read),
        )
        .route("/orders/{order_id}/roster", get(get_roster))
        .route("/ws", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn send_message(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let order_id = OrderId::from(order_id);
    let coordinator = state.registry.get_or_create(order_id).await;

    let message = coordinator
        .send(MessageDraft {
            order_id,
            sender_id: UserId::from(payload.sender_id),
            sender_name: payload.sender_name,
            text: payload.text,
            image_url: payload.image_url,
            document_url: payload.document_url,
            document_name: payload.document_name,
            audio_url: payload.audio_url,
            audio_duration_secs: payload.audio_duration_secs,
            reply_to: payload.reply_to.map(MessageId::from),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_history(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryItem>>, ApiError> {
    let limit = query.limit.unwrap_or(50).min(100);
    let coordinator = state.registry.get_or_create(OrderId::from(order_id)).await;
    let items = coordinator
        .history_view(query.before.map(MessageId::from), limit)
        .await?;
    Ok(Json(items))
}

async fn get_thread(
    State(state): State<AppState>,
    Path((order_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let coordinator = state.registry.get_or_create(OrderId::from(order_id)).await;
    let thread = coordinator
        .thread(MessageId::from(message_id))
        .await?
        .ok_or_else(|| ApiError::not_found("thread root not found"))?;
    Ok(Json(thread))
}

async fn mark_delivered(
    State(state): State<AppState>,
    Path((order_id, message_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ReceiptPayload>,
) -> Result<StatusCode, ApiError> {
    let coordinator = state.registry.get_or_create(OrderId::from(order_id)).await;
    coordinator
        .mark_delivered(MessageId::from(message_id), UserId::from(payload.recipient_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_read(
    State(state): State<AppState>,
    Path((order_id, message_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ReceiptPayload>,
) -> Result<StatusCode, ApiError> {
    let coordinator = state.registry.get_or_create(OrderId::from(order_id)).await;
    coordinator
        .mark_read(MessageId::from(message_id), UserId::from(payload.recipient_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_roster(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<PresenceEntry>>, ApiError> {
    let roster = state
        .presence
        .roster(OrderId::from(order_id))
        .await
        .map_err(application::ApplicationError::Presence)?;
    Ok(Json(roster))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    Ok(ws.on_upgrade(move |socket| {
        WebSocketConnection::new(
            state,
            OrderId::from(query.order_id),
            UserId::from(query.user_id),
            query.display_name,
        )
        .run(socket)
    }))
}
