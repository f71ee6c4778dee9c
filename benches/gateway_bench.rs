//! Performance benchmarks for the wallet auth gateway.
//!
//! Run with: cargo bench

use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use axum::http::{header, HeaderMap, HeaderValue};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use wallet_auth_gateway::auth::{
    challenge_message, recover_signer, AuthOptions, GatewayConfig, RateLimiter, SignatureProof,
    SignatureVerifier, WalletAuthGateway, DEFAULT_CHALLENGE_DOMAIN, WALLET_ADDRESS_HEADER,
};

const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

fn signed_challenge(timestamp: i64) -> (String, String) {
    let signer: PrivateKeySigner = TEST_KEY.parse().unwrap();
    let message = challenge_message(DEFAULT_CHALLENGE_DOMAIN, TEST_ADDRESS, timestamp);
    let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
    (message, format!("0x{}", hex::encode(signature.as_bytes())))
}

/// Benchmark rate limiter admission across many wallets
fn bench_rate_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");

    for wallets in [1usize, 100, 10_000].iter() {
        let keys: Vec<String> = (0..*wallets).map(|i| format!("0x{i:040x}")).collect();
        group.throughput(Throughput::Elements(keys.len() as u64));
        group.bench_with_input(BenchmarkId::new("check_and_consume", wallets), &keys, |b, keys| {
            let limiter = RateLimiter::new();
            b.iter(|| {
                for key in keys {
                    black_box(limiter.check_and_consume(key, u32::MAX).unwrap());
                }
            });
        });
    }

    group.finish();
}

/// Benchmark EIP-191 signer recovery
fn bench_signature(c: &mut Criterion) {
    let (message, signature) = signed_challenge(1_700_000_000_000);

    c.bench_function("recover_signer", |b| {
        b.iter(|| black_box(recover_signer(black_box(&message), black_box(&signature)).unwrap()));
    });

    c.bench_function("verify_signature_proof", |b| {
        // Replay protection would reject every iteration after the first
        let verifier = SignatureVerifier::new(i64::MAX, DEFAULT_CHALLENGE_DOMAIN, false);
        let proof = SignatureProof::parse(TEST_ADDRESS, &signature, "1700000000000").unwrap();
        b.iter(|| verifier.verify(black_box(&proof), 1_700_000_000_000).unwrap());
    });
}

/// Benchmark the full bearer-token pipeline
fn bench_authorize_token(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let config = GatewayConfig {
        jwt_secret: Some("bench-secret".to_string()),
        ..GatewayConfig::default()
    };
    let gateway = Arc::new(WalletAuthGateway::from_config(&config).unwrap());
    let token = gateway
        .verifier()
        .tokens()
        .unwrap()
        .issue(TEST_ADDRESS, &["manage_agent".to_string()], None, chrono::Duration::hours(1))
        .unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(WALLET_ADDRESS_HEADER, HeaderValue::from_static(TEST_ADDRESS));
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    let options = AuthOptions::default()
        .require_permissions(["manage_agent"])
        .rate_limit(u32::MAX);

    c.bench_function("authorize_token", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(gateway.authorize(&headers, &options).await.unwrap());
        });
    });
}

criterion_group!(benches, bench_rate_limiter, bench_signature, bench_authorize_token);
criterion_main!(benches);
