use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::error;

use parley_types::Identity;
use parley_types::api::{Claims, LoginRequest, LoginResponse};
use parley_xmpp::SessionBroker;

use crate::gateway::MessagingGateway;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub gateway: MessagingGateway,
    pub broker: SessionBroker,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

/// POST /api/auth/login. Checks the credentials against the messaging
/// network and issues a bearer token on success.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, Response> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST.into_response());
    }

    if !state.broker.authenticate(&req.username, &req.password).await {
        return Err((StatusCode::UNAUTHORIZED, "Error: Invalid credentials").into_response());
    }

    let jid = Identity::from_username(&req.username, state.gateway.domain())
        .map_err(|_| StatusCode::BAD_REQUEST.into_response())?;

    let token = create_token(&state.jwt_secret, state.token_ttl, &req.username, &jid).map_err(|e| {
        error!("Failed to sign token for {}: {}", req.username, e);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })?;

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer",
        jid: jid.to_string(),
    }))
}

pub fn create_token(
    secret: &str,
    ttl: chrono::Duration,
    username: &str,
    jid: &Identity,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: username.to_string(),
        jid: jid.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
