use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use parley_types::api::{Claims, ErrorResponse, HistoryQuery, SendMessageRequest, SendMessageResponse};

use crate::auth::AppState;
use crate::gateway::{HistoryError, SendError};
use crate::validation::ValidationError;

/// POST /api/messages/send
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    match state.gateway.send_message(&claims.sub, req).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(SendMessageResponse {
                delivered: true,
                archived: true,
                id: Some(receipt.message.id),
                error: None,
            }),
        )
            .into_response(),
        Err(e) => send_error_response(e),
    }
}

/// GET /api/messages/history?with=<identity>
pub async fn get_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state.gateway.get_history(&claims.sub, &query.with).await {
        Ok(history) => Json(history).into_response(),
        Err(HistoryError::Validation(e)) => validation_response(e),
        Err(HistoryError::Storage(e)) => {
            error!("Failed to retrieve message history for {} with {}: {}", claims.sub, query.with, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to retrieve message history".into(),
                    details: vec![],
                }),
            )
                .into_response()
        }
    }
}

/// Validation -> 400, delivery -> 502 (retryable) or 422 (terminal),
/// delivered-but-not-archived -> 202.
pub fn send_error_response(e: SendError) -> Response {
    match e {
        SendError::Validation(v) => validation_response(v),
        SendError::Delivery(session) => {
            let status = if session.is_retryable() {
                StatusCode::BAD_GATEWAY
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            (
                status,
                Json(SendMessageResponse {
                    delivered: false,
                    archived: false,
                    id: None,
                    error: Some(format!("Failed to send message: {}", session)),
                }),
            )
                .into_response()
        }
        SendError::PartiallyDelivered(failure) => (
            StatusCode::ACCEPTED,
            Json(SendMessageResponse {
                delivered: true,
                archived: false,
                id: None,
                error: Some(format!("Message sent but not archived: {}", failure)),
            }),
        )
            .into_response(),
    }
}

fn validation_response(e: ValidationError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "invalid message request".into(),
            details: e.violations.iter().map(ToString::to_string).collect(),
        }),
    )
        .into_response()
}
