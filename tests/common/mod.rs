//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::Router;
use http_body_util::BodyExt;

use wallet_auth_gateway::auth::{
    challenge_message, GatewayConfig, WalletAuthGateway, AGENT_ID_HEADER,
    DEFAULT_CHALLENGE_DOMAIN, TIMESTAMP_HEADER, WALLET_ADDRESS_HEADER, WALLET_SIGNATURE_HEADER,
};
use wallet_auth_gateway::server::{build_router, AppState};

/// Well-known development key (account #0 of the default test mnemonic)
pub const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// Account #1 of the same mnemonic
pub const OTHER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const OTHER_ADDRESS: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

pub const TEST_JWT_SECRET: &str = "integration-test-secret";

/// Current time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Gateway with bearer tokens enabled
pub fn test_gateway() -> Arc<WalletAuthGateway> {
    let config = GatewayConfig {
        jwt_secret: Some(TEST_JWT_SECRET.to_string()),
        ..GatewayConfig::default()
    };
    Arc::new(WalletAuthGateway::from_config(&config).unwrap())
}

/// Full application router with the given per-wallet budget
pub fn test_app(gateway: Arc<WalletAuthGateway>, rate_limit_per_minute: u32) -> Router {
    build_router(AppState {
        gateway,
        require_auth: true,
        rate_limit_per_minute,
    })
}

/// Sign the default-domain challenge for `timestamp` with `key`
pub fn sign_challenge(key: &str, wallet: &str, timestamp: i64) -> String {
    let signer: PrivateKeySigner = key.parse().unwrap();
    let message = challenge_message(DEFAULT_CHALLENGE_DOMAIN, wallet, timestamp);
    let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
    format!("0x{}", hex::encode(signature.as_bytes()))
}

/// Request builder carrying a signed challenge
pub fn signed_request(method: Method, uri: &str, key: &str, wallet: &str, timestamp: i64) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(WALLET_ADDRESS_HEADER, wallet)
        .header(WALLET_SIGNATURE_HEADER, sign_challenge(key, wallet, timestamp))
        .header(TIMESTAMP_HEADER, timestamp.to_string())
        .body(Body::empty())
        .unwrap()
}

/// Issue a token from the gateway's own verifier
pub fn issue_token(
    gateway: &WalletAuthGateway,
    wallet: &str,
    permissions: &[&str],
    ttl: chrono::Duration,
) -> String {
    let permissions: Vec<String> = permissions.iter().map(|p| p.to_string()).collect();
    gateway
        .verifier()
        .tokens()
        .unwrap()
        .issue(wallet, &permissions, None, ttl)
        .unwrap()
}

/// GET request authenticated with a bearer token
pub fn token_request(uri: &str, wallet: &str, token: &str, agent_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(WALLET_ADDRESS_HEADER, wallet)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    if let Some(agent_id) = agent_id {
        builder = builder.header(AGENT_ID_HEADER, agent_id);
    }
    builder.body(Body::empty()).unwrap()
}

/// Collect a response body as JSON
pub async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
