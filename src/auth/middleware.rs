//! Authentication middleware for Axum
//!
//! Sequences rate limiting, credential verification, permission, ownership
//! and allow-list checks in front of a handler. Any failure is answered here;
//! the wrapped handler only runs for authorized requests.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use tracing::{debug, error, info_span, warn, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{
    AuthError, CredentialVerifier, DefaultPermissionResolver, Identity, OwnershipGuard,
    RateLimiter, SignatureVerifier, TokenVerifier, WalletHeaders, DEFAULT_CHALLENGE_DOMAIN,
    DEFAULT_MAX_ENTRIES, DEFAULT_SIGNATURE_MAX_AGE_MS,
};
use crate::api::ApiError;
use crate::telemetry::{extract_context_from_headers, spans};

/// Methods advertised on CORS preflight
pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";

/// Headers advertised on CORS preflight
pub const CORS_ALLOW_HEADERS: &str =
    "Content-Type, Authorization, X-Wallet-Address, X-Wallet-Signature, X-Timestamp, X-Agent-Id";

/// Preflight cache lifetime in seconds
pub const CORS_MAX_AGE_SECS: u32 = 86_400;

/// Per-route authorization options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOptions {
    /// If false, the handler runs without any verification
    pub require_auth: bool,
    /// Capabilities the identity must all hold
    pub required_permissions: Vec<String>,
    /// If non-empty, a present `X-Agent-Id` must be one of these
    pub allowed_agents: Vec<String>,
    /// If true, a present `X-Agent-Id` must be owned by the caller
    pub require_ownership: bool,
    /// Per-wallet budget for each 60-second window
    pub rate_limit_per_minute: u32,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            require_auth: true,
            required_permissions: Vec::new(),
            allowed_agents: Vec::new(),
            require_ownership: false,
            rate_limit_per_minute: 60,
        }
    }
}

impl AuthOptions {
    /// Options for a route that skips authentication
    pub fn public() -> Self {
        Self {
            require_auth: false,
            ..Self::default()
        }
    }

    pub fn require_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.required_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_agents<I, P>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.allowed_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn require_ownership(mut self) -> Self {
        self.require_ownership = true;
        self
    }

    pub fn rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }
}

/// Gateway-wide settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// HMAC secret for bearer tokens (tokens rejected when unset)
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,
    /// Signature freshness window
    pub signature_max_age_ms: i64,
    /// Application name embedded in challenge messages
    pub challenge_domain: String,
    /// Reject reuse of a signature inside its freshness window
    pub replay_protection: bool,
    /// Grant manage/collaborate/transfer to every verified wallet
    pub grant_extended_permissions: bool,
    /// Soft cap on tracked rate-limit counters
    pub rate_limit_max_entries: usize,
    /// Budget for credential verification, including remote key lookups
    pub verify_timeout: Duration,
    /// `Access-Control-Allow-Origin` on preflight
    pub cors_allow_origin: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_issuer: None,
            jwt_audience: None,
            signature_max_age_ms: DEFAULT_SIGNATURE_MAX_AGE_MS,
            challenge_domain: DEFAULT_CHALLENGE_DOMAIN.to_string(),
            replay_protection: true,
            grant_extended_permissions: true,
            rate_limit_max_entries: DEFAULT_MAX_ENTRIES,
            verify_timeout: Duration::from_secs(5),
            cors_allow_origin: "*".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let flag = |name: &str, default: bool| {
            std::env::var(name)
                .ok()
                .map(|v| {
                    !matches!(
                        v.trim().to_ascii_lowercase().as_str(),
                        "0" | "false" | "off"
                    )
                })
                .unwrap_or(default)
        };

        Self {
            jwt_secret: std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            jwt_issuer: std::env::var("JWT_ISSUER").ok(),
            jwt_audience: std::env::var("JWT_AUDIENCE").ok(),
            signature_max_age_ms: std::env::var("SIGNATURE_MAX_AGE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &i64| *v > 0)
                .unwrap_or(defaults.signature_max_age_ms),
            challenge_domain: std::env::var("CHALLENGE_DOMAIN")
                .unwrap_or(defaults.challenge_domain),
            replay_protection: flag("SIGNATURE_REPLAY_PROTECTION", defaults.replay_protection),
            grant_extended_permissions: flag(
                "GRANT_EXTENDED_PERMISSIONS",
                defaults.grant_extended_permissions,
            ),
            rate_limit_max_entries: std::env::var("RATE_LIMIT_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_max_entries),
            verify_timeout: std::env::var("AUTH_VERIFY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.verify_timeout),
            cors_allow_origin: std::env::var("CORS_ALLOW_ORIGIN")
                .unwrap_or(defaults.cors_allow_origin),
        }
    }
}

/// Identity attached to an authorized request
#[derive(Debug, Clone)]
pub struct AuthenticatedWallet(pub Identity);

/// The wallet auth gateway: owns the rate-limit state and the verifiers
pub struct WalletAuthGateway {
    verifier: CredentialVerifier,
    rate_limiter: RateLimiter,
    verify_timeout: Duration,
    cors_allow_origin: HeaderValue,
}

impl WalletAuthGateway {
    pub fn new(verifier: CredentialVerifier, rate_limiter: RateLimiter) -> Self {
        Self {
            verifier,
            rate_limiter,
            verify_timeout: GatewayConfig::default().verify_timeout,
            cors_allow_origin: HeaderValue::from_static("*"),
        }
    }

    /// Build a gateway from configuration with the derived ownership model
    pub fn from_config(config: &GatewayConfig) -> Result<Self, AuthError> {
        Self::from_config_with_ownership(config, OwnershipGuard::default())
    }

    pub fn from_config_with_ownership(
        config: &GatewayConfig,
        ownership: OwnershipGuard,
    ) -> Result<Self, AuthError> {
        let signatures = Arc::new(SignatureVerifier::new(
            config.signature_max_age_ms,
            config.challenge_domain.clone(),
            config.replay_protection,
        ));

        let mut verifier = CredentialVerifier::new(signatures)
            .with_permissions(Arc::new(DefaultPermissionResolver::new(
                config.grant_extended_permissions,
            )))
            .with_ownership(ownership);

        if let Some(secret) = &config.jwt_secret {
            verifier = verifier.with_tokens(Arc::new(TokenVerifier::hs256(
                secret.as_bytes(),
                config.jwt_issuer.as_deref(),
                config.jwt_audience.as_deref(),
            )));
        }

        let cors_allow_origin = HeaderValue::from_str(&config.cors_allow_origin).map_err(|e| {
            AuthError::Internal(format!(
                "invalid CORS origin {:?}: {e}",
                config.cors_allow_origin
            ))
        })?;

        Ok(Self {
            verifier,
            rate_limiter: RateLimiter::with_capacity(config.rate_limit_max_entries),
            verify_timeout: config.verify_timeout,
            cors_allow_origin,
        })
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Run every check for `options` against the request headers.
    ///
    /// Returns `Ok(None)` when the route does not require authentication.
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        options: &AuthOptions,
    ) -> Result<Option<Identity>, AuthError> {
        if !options.require_auth {
            return Ok(None);
        }

        let wallet_headers = WalletHeaders::from_headers(headers);
        let wallet = wallet_headers
            .wallet_address
            .as_deref()
            .ok_or(AuthError::WalletRequired)?;

        let decision = self
            .rate_limiter
            .check_and_consume(wallet, options.rate_limit_per_minute)?;
        if !decision.allowed {
            return Err(AuthError::RateLimited {
                retry_after_secs: decision.retry_after_secs(),
            });
        }

        let identity = tokio::time::timeout(self.verify_timeout, self.verifier.verify(&wallet_headers))
            .await
            .map_err(|_| AuthError::Internal("credential verification timed out".to_string()))??;

        let missing = identity.missing_permissions(&options.required_permissions);
        if !missing.is_empty() {
            return Err(AuthError::InsufficientPermissions {
                required: options.required_permissions.clone(),
                current: identity.permissions.iter().cloned().collect(),
            });
        }

        if let Some(agent_id) = wallet_headers.agent_id.as_deref() {
            // Owned ids were fetched inside the verification budget
            if options.require_ownership && !identity.owns(agent_id) {
                return Err(AuthError::OwnershipFailed {
                    agent_id: agent_id.to_string(),
                });
            }

            if !options.allowed_agents.is_empty()
                && !options
                    .allowed_agents
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(agent_id))
            {
                return Err(AuthError::AgentNotAllowed {
                    agent_id: agent_id.to_string(),
                });
            }
        }

        Ok(Some(identity))
    }

    /// Answer a CORS preflight
    pub fn preflight_response(&self) -> Response {
        (
            StatusCode::OK,
            [
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, self.cors_allow_origin.clone()),
                (
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(CORS_ALLOW_METHODS),
                ),
                (
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static(CORS_ALLOW_HEADERS),
                ),
                (
                    header::ACCESS_CONTROL_MAX_AGE,
                    HeaderValue::from(CORS_MAX_AGE_SECS),
                ),
            ],
        )
            .into_response()
    }
}

/// Authentication middleware configuration/state.
#[derive(Clone)]
pub struct AuthLayerState {
    pub gateway: Arc<WalletAuthGateway>,
    pub options: Arc<AuthOptions>,
}

impl AuthLayerState {
    pub fn new(gateway: Arc<WalletAuthGateway>, options: AuthOptions) -> Self {
        Self {
            gateway,
            options: Arc::new(options),
        }
    }
}

/// Authentication middleware
pub async fn wallet_auth_middleware(
    State(state): State<AuthLayerState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return state.gateway.preflight_response();
    }

    let span = info_span!(
        spans::AUTH_AUTHORIZE,
        method = %request.method(),
        path = %request.uri().path(),
    );
    span.set_parent(extract_context_from_headers(request.headers()));

    match state
        .gateway
        .authorize(request.headers(), &state.options)
        .instrument(span)
        .await
    {
        Ok(Some(identity)) => {
            debug!(
                wallet = %identity.wallet_address,
                session = %identity.session_id,
                "request authorized"
            );
            request.extensions_mut().insert(AuthenticatedWallet(identity));
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(e) => auth_error_response(e, request.uri().path()),
    }
}

/// Convert auth error to HTTP response
fn auth_error_response(error: AuthError, path: &str) -> Response {
    match &error {
        AuthError::Internal(detail) => error!(path, %detail, "auth pipeline failed"),
        other => warn!(path, reason = %other, "request rejected"),
    }
    ApiError::from(error).into_response()
}

/// Wrap every route of `router` with wallet authentication
pub fn with_auth<S>(router: Router<S>, gateway: Arc<WalletAuthGateway>, options: AuthOptions) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(axum::middleware::from_fn_with_state(
        AuthLayerState::new(gateway, options),
        wallet_auth_middleware,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MockOwnershipRegistry, AGENT_ID_HEADER, WALLET_ADDRESS_HEADER};
    use chrono::Duration as ChronoDuration;

    const SECRET: &str = "gateway-test-secret";

    fn gateway() -> WalletAuthGateway {
        let config = GatewayConfig {
            jwt_secret: Some(SECRET.to_string()),
            ..GatewayConfig::default()
        };
        WalletAuthGateway::from_config(&config).unwrap()
    }

    fn token_headers(gateway: &WalletAuthGateway, wallet: &str, perms: &[&str]) -> HeaderMap {
        let perms: Vec<String> = perms.iter().map(|p| p.to_string()).collect();
        let token = gateway
            .verifier()
            .tokens()
            .unwrap()
            .issue(wallet, &perms, None, ChronoDuration::hours(1))
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(WALLET_ADDRESS_HEADER, HeaderValue::from_str(wallet).unwrap());
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_public_route_skips_everything() {
        let result = gateway()
            .authorize(&HeaderMap::new(), &AuthOptions::public())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_wallet_required() {
        let result = gateway()
            .authorize(&HeaderMap::new(), &AuthOptions::default())
            .await;
        assert!(matches!(result, Err(AuthError::WalletRequired)));
    }

    #[tokio::test]
    async fn test_rate_limit_before_verification() {
        let gateway = gateway();
        let mut headers = HeaderMap::new();
        headers.insert(WALLET_ADDRESS_HEADER, HeaderValue::from_static("0xabc"));
        let options = AuthOptions::default().rate_limit(1);

        // First request consumes the budget even though it has no credential
        assert!(matches!(
            gateway.authorize(&headers, &options).await,
            Err(AuthError::AuthFailed(_))
        ));
        assert!(matches!(
            gateway.authorize(&headers, &options).await,
            Err(AuthError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_insufficient_permissions_lists_both() {
        let gateway = gateway();
        let headers = token_headers(&gateway, "0xabc", &["read_status"]);
        let options = AuthOptions::default().require_permissions(["manage_agent"]);

        match gateway.authorize(&headers, &options).await {
            Err(AuthError::InsufficientPermissions { required, current }) => {
                assert_eq!(required, vec!["manage_agent".to_string()]);
                assert_eq!(current, vec!["read_status".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ownership_checked_only_with_agent_header() {
        let gateway = gateway();
        let options = AuthOptions::default().require_ownership();

        let headers = token_headers(&gateway, "0xDEAD", &[]);
        assert!(gateway.authorize(&headers, &options).await.unwrap().is_some());

        let mut owned = headers.clone();
        owned.insert(AGENT_ID_HEADER, HeaderValue::from_static("user-0xdead"));
        assert!(gateway.authorize(&owned, &options).await.unwrap().is_some());

        let mut foreign = headers;
        foreign.insert(AGENT_ID_HEADER, HeaderValue::from_static("user-0xbeef"));
        assert!(matches!(
            gateway.authorize(&foreign, &options).await,
            Err(AuthError::OwnershipFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_allowed_agents() {
        let gateway = gateway();
        let options = AuthOptions::default().allow_agents(["agent-1"]);

        let mut headers = token_headers(&gateway, "0xabc", &[]);
        headers.insert(AGENT_ID_HEADER, HeaderValue::from_static("agent-1"));
        assert!(gateway.authorize(&headers, &options).await.is_ok());

        headers.insert(AGENT_ID_HEADER, HeaderValue::from_static("agent-2"));
        assert!(matches!(
            gateway.authorize(&headers, &options).await,
            Err(AuthError::AgentNotAllowed { .. })
        ));
    }

    struct SlowRegistry;

    #[async_trait::async_trait]
    impl crate::auth::OwnershipRegistry for SlowRegistry {
        async fn resources_owned_by(
            &self,
            _wallet_address: &str,
        ) -> Result<std::collections::BTreeSet<String>, AuthError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Default::default())
        }
    }

    #[tokio::test]
    async fn test_slow_registry_times_out() {
        let config = GatewayConfig {
            jwt_secret: Some(SECRET.to_string()),
            ..GatewayConfig::default()
        };
        let gateway = WalletAuthGateway::from_config_with_ownership(
            &config,
            OwnershipGuard::new(Arc::new(SlowRegistry)),
        )
        .unwrap()
        .with_verify_timeout(Duration::from_millis(10));

        let headers = token_headers(&gateway, "0xabc", &[]);
        let result = gateway.authorize(&headers, &AuthOptions::default()).await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }

    #[tokio::test]
    async fn test_registry_failure_fails_closed() {
        let mut registry = MockOwnershipRegistry::new();
        registry
            .expect_resources_owned_by()
            .returning(|_| Err(AuthError::Internal("oracle unavailable".to_string())));

        let config = GatewayConfig {
            jwt_secret: Some(SECRET.to_string()),
            ..GatewayConfig::default()
        };
        let gateway = WalletAuthGateway::from_config_with_ownership(
            &config,
            OwnershipGuard::new(Arc::new(registry)),
        )
        .unwrap();

        let headers = token_headers(&gateway, "0xabc", &[]);
        let result = gateway.authorize(&headers, &AuthOptions::default()).await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }

    #[tokio::test]
    async fn test_ownership_uses_identity_without_second_lookup() {
        let mut registry = MockOwnershipRegistry::new();
        registry
            .expect_resources_owned_by()
            .times(2)
            .returning(|wallet: &str| Ok([crate::auth::owned_resource_id(wallet)].into_iter().collect()));

        let config = GatewayConfig {
            jwt_secret: Some(SECRET.to_string()),
            ..GatewayConfig::default()
        };
        let gateway = WalletAuthGateway::from_config_with_ownership(
            &config,
            OwnershipGuard::new(Arc::new(registry)),
        )
        .unwrap();
        let options = AuthOptions::default().require_ownership();

        // One lookup per request, for both the owned and the foreign agent
        let mut owned = token_headers(&gateway, "0xdead", &[]);
        owned.insert(AGENT_ID_HEADER, HeaderValue::from_static("USER-0xDEAD"));
        assert!(gateway.authorize(&owned, &options).await.unwrap().is_some());

        let mut foreign = token_headers(&gateway, "0xdead", &[]);
        foreign.insert(AGENT_ID_HEADER, HeaderValue::from_static("user-0xbeef"));
        assert!(matches!(
            gateway.authorize(&foreign, &options).await,
            Err(AuthError::OwnershipFailed { .. })
        ));
    }

    #[test]
    fn test_preflight_headers() {
        let response = gateway().preflight_response();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], CORS_ALLOW_METHODS);
        assert_eq!(headers["access-control-max-age"], "86400");
        let allowed = headers["access-control-allow-headers"].to_str().unwrap();
        for h in ["Authorization", "X-Wallet-Address", "X-Wallet-Signature", "X-Timestamp", "X-Agent-Id"] {
            assert!(allowed.contains(h), "missing {h}");
        }
    }

    #[test]
    fn test_invalid_cors_origin_rejected() {
        let config = GatewayConfig {
            cors_allow_origin: "bad\norigin".to_string(),
            ..GatewayConfig::default()
        };
        assert!(matches!(
            WalletAuthGateway::from_config(&config),
            Err(AuthError::Internal(_))
        ));
    }
}
