//! REST API endpoints for the wallet auth gateway.

use axum::extract::{Extension, Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::{with_auth, AuthOptions, AuthenticatedWallet, Capability, Identity};
use crate::server::AppState;

use super::{ApiError, ErrorCode};

/// Build the `/api` router.
///
/// Each group carries its own [`AuthOptions`]; the gateway in `state` is
/// shared by all of them so rate-limit counters are per wallet, not per route.
pub fn router(state: &AppState) -> Router<AppState> {
    let public = with_auth(
        Router::new().route("/v1/auth/challenge", get(get_challenge)),
        state.gateway.clone(),
        AuthOptions::public(),
    );

    let protected = AuthOptions {
        require_auth: state.require_auth,
        ..AuthOptions::default()
    }
    .rate_limit(state.rate_limit_per_minute);

    let session = with_auth(
        Router::new().route("/v1/session", get(get_session)),
        state.gateway.clone(),
        protected.clone(),
    );

    let agents = with_auth(
        Router::new().route("/v1/agents/:agent_id", get(get_agent)),
        state.gateway.clone(),
        protected
            .require_permissions([Capability::ManageAgent.as_str()])
            .require_ownership(),
    );

    Router::new().merge(public).merge(session).merge(agents)
}

#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    pub wallet: String,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub wallet_address: String,
    pub timestamp: i64,
    pub message: String,
    pub expires_in_ms: i64,
}

/// Message a wallet must sign to use the signature path
async fn get_challenge(
    State(state): State<AppState>,
    Query(query): Query<ChallengeQuery>,
) -> Json<ChallengeResponse> {
    let signatures = state.gateway.verifier().signatures();
    let timestamp = query
        .timestamp
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    Json(ChallengeResponse {
        wallet_address: crate::auth::normalize_wallet(&query.wallet),
        timestamp,
        message: signatures.challenge(&query.wallet, timestamp),
        expires_in_ms: signatures.max_age_ms(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    authenticated: bool,
    #[serde(flatten)]
    identity: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate_limit_remaining: Option<u32>,
}

/// Echo the verified identity
///
/// With `AUTH_MODE=disabled` no identity is attached and the session is anonymous.
async fn get_session(
    State(state): State<AppState>,
    wallet: Option<Extension<AuthenticatedWallet>>,
) -> Json<SessionResponse> {
    let Some(Extension(AuthenticatedWallet(identity))) = wallet else {
        return Json(SessionResponse {
            authenticated: false,
            identity: None,
            rate_limit_remaining: None,
        });
    };

    let rate_limit_remaining = state
        .gateway
        .rate_limiter()
        .remaining(&identity.wallet_address, state.rate_limit_per_minute);

    Json(SessionResponse {
        authenticated: true,
        identity: Some(identity),
        rate_limit_remaining: Some(rate_limit_remaining),
    })
}

/// Agent details for its owner
async fn get_agent(
    Path(agent_id): Path<String>,
    wallet: Option<Extension<AuthenticatedWallet>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let agent_id = agent_id.to_ascii_lowercase();

    let Some(Extension(AuthenticatedWallet(identity))) = wallet else {
        return Ok(Json(serde_json::json!({ "agentId": agent_id })));
    };

    // The middleware only sees X-Agent-Id; the path segment is authoritative here
    if !identity.owns(&agent_id) {
        return Err(
            ApiError::new(ErrorCode::OwnershipFailed, "Agent ownership verification failed")
                .with_field("agentId", serde_json::json!(agent_id)),
        );
    }

    Ok(Json(serde_json::json!({
        "agentId": agent_id,
        "owner": identity.wallet_address,
        "permissions": identity.permissions,
    })))
}
