use std::collections::VecDeque;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use base64::Engine as _;
use rand::RngCore;

use wallet_auth_gateway::auth::{
    challenge_message, normalize_wallet, recover_signer, TokenVerifier, DEFAULT_CHALLENGE_DOMAIN,
    TIMESTAMP_HEADER, WALLET_ADDRESS_HEADER, WALLET_SIGNATURE_HEADER,
};

fn print_help() {
    eprintln!(
        "\
wallet-auth-admin

USAGE:
  wallet-auth-admin <command> [options]

COMMANDS:
  issue-token                     Issue a bearer token for a wallet
  challenge                       Print the message a wallet must sign
  sign-challenge                  Sign a challenge with a local key (development only)
  recover                         Recover the signer of a challenge signature
  generate-secret                 Generate a random JWT_SECRET

issue-token OPTIONS:
  --wallet <address>              (required)
  --permission <name>             (repeatable) Capability to embed
  --session-id <id>               (optional) Defaults to a random id
  --ttl-secs <n>                  (default: 3600)
  --secret <secret>               (defaults to env JWT_SECRET)
  --issuer <iss>                  (defaults to env JWT_ISSUER)
  --audience <aud>                (defaults to env JWT_AUDIENCE)

challenge OPTIONS:
  --wallet <address>              (required)
  --timestamp <ms>                (default: now)
  --domain <name>                 (defaults to env CHALLENGE_DOMAIN)

sign-challenge OPTIONS:
  --private-key <hex>             (defaults to env WALLET_PRIVATE_KEY)
  --timestamp <ms>                (default: now)
  --domain <name>                 (defaults to env CHALLENGE_DOMAIN)

recover OPTIONS:
  --wallet <address>              (required)
  --timestamp <ms>                (required)
  --signature <hex>               (required) 65-byte 0x-prefixed signature
  --domain <name>                 (defaults to env CHALLENGE_DOMAIN)

generate-secret OPTIONS:
  --bytes <n>                     (default: 32)
"
    );
}

fn next_value(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<String> {
    args.pop_front()
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

fn challenge_domain(domain: Option<String>) -> String {
    domain
        .or_else(|| std::env::var("CHALLENGE_DOMAIN").ok())
        .unwrap_or_else(|| DEFAULT_CHALLENGE_DOMAIN.to_string())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    match command.as_str() {
        "issue-token" => {
            let mut wallet: Option<String> = None;
            let mut permissions: Vec<String> = Vec::new();
            let mut session_id: Option<String> = None;
            let mut ttl_secs: i64 = 3600;
            let mut secret = std::env::var("JWT_SECRET").ok();
            let mut issuer = std::env::var("JWT_ISSUER").ok();
            let mut audience = std::env::var("JWT_AUDIENCE").ok();

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--wallet" => wallet = Some(next_value(&mut args, "--wallet")?),
                    "--permission" => permissions.push(next_value(&mut args, "--permission")?),
                    "--session-id" => session_id = Some(next_value(&mut args, "--session-id")?),
                    "--ttl-secs" => ttl_secs = next_value(&mut args, "--ttl-secs")?.parse()?,
                    "--secret" => secret = Some(next_value(&mut args, "--secret")?),
                    "--issuer" => issuer = Some(next_value(&mut args, "--issuer")?),
                    "--audience" => audience = Some(next_value(&mut args, "--audience")?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let wallet = wallet.ok_or_else(|| anyhow::anyhow!("--wallet is required"))?;
            let secret = secret
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow::anyhow!("JWT_SECRET is required (or pass --secret)"))?;
            if ttl_secs <= 0 {
                anyhow::bail!("--ttl-secs must be positive");
            }

            let tokens = TokenVerifier::hs256(secret.as_bytes(), issuer.as_deref(), audience.as_deref());
            let token = tokens
                .issue(
                    &normalize_wallet(&wallet),
                    &permissions,
                    session_id.as_deref(),
                    chrono::Duration::seconds(ttl_secs),
                )
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;

            println!("{token}");
            Ok(())
        }
        "challenge" => {
            let mut wallet: Option<String> = None;
            let mut timestamp: Option<i64> = None;
            let mut domain: Option<String> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--wallet" => wallet = Some(next_value(&mut args, "--wallet")?),
                    "--timestamp" => timestamp = Some(next_value(&mut args, "--timestamp")?.parse()?),
                    "--domain" => domain = Some(next_value(&mut args, "--domain")?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let wallet = wallet.ok_or_else(|| anyhow::anyhow!("--wallet is required"))?;
            let timestamp = timestamp.unwrap_or_else(now_ms);

            println!("{}", challenge_message(&challenge_domain(domain), &wallet, timestamp));
            Ok(())
        }
        "sign-challenge" => {
            let mut private_key = std::env::var("WALLET_PRIVATE_KEY").ok();
            let mut timestamp: Option<i64> = None;
            let mut domain: Option<String> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--private-key" => private_key = Some(next_value(&mut args, "--private-key")?),
                    "--timestamp" => timestamp = Some(next_value(&mut args, "--timestamp")?.parse()?),
                    "--domain" => domain = Some(next_value(&mut args, "--domain")?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let private_key = private_key.ok_or_else(|| {
                anyhow::anyhow!("WALLET_PRIVATE_KEY is required (or pass --private-key)")
            })?;
            let signer: PrivateKeySigner = private_key
                .trim()
                .trim_start_matches("0x")
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid private key: {e}"))?;

            let wallet = normalize_wallet(&signer.address().to_string());
            let timestamp = timestamp.unwrap_or_else(now_ms);
            let message = challenge_message(&challenge_domain(domain), &wallet, timestamp);
            let signature = signer.sign_message_sync(message.as_bytes())?;

            println!("{WALLET_ADDRESS_HEADER}: {wallet}");
            println!(
                "{WALLET_SIGNATURE_HEADER}: 0x{}",
                hex::encode(signature.as_bytes())
            );
            println!("{TIMESTAMP_HEADER}: {timestamp}");
            Ok(())
        }
        "recover" => {
            let mut wallet: Option<String> = None;
            let mut timestamp: Option<i64> = None;
            let mut signature: Option<String> = None;
            let mut domain: Option<String> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--wallet" => wallet = Some(next_value(&mut args, "--wallet")?),
                    "--timestamp" => timestamp = Some(next_value(&mut args, "--timestamp")?.parse()?),
                    "--signature" => signature = Some(next_value(&mut args, "--signature")?),
                    "--domain" => domain = Some(next_value(&mut args, "--domain")?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let wallet = wallet.ok_or_else(|| anyhow::anyhow!("--wallet is required"))?;
            let timestamp = timestamp.ok_or_else(|| anyhow::anyhow!("--timestamp is required"))?;
            let signature = signature.ok_or_else(|| anyhow::anyhow!("--signature is required"))?;

            let message = challenge_message(&challenge_domain(domain), &wallet, timestamp);
            let signer = recover_signer(&message, &signature).map_err(|e| anyhow::anyhow!(e.to_string()))?;

            println!("signer: {signer}");
            if signer == normalize_wallet(&wallet) {
                println!("ok: signature matches wallet");
                Ok(())
            } else {
                anyhow::bail!("signature does not match wallet {}", normalize_wallet(&wallet))
            }
        }
        "generate-secret" => {
            let mut bytes: usize = 32;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--bytes" => bytes = next_value(&mut args, "--bytes")?.parse()?,
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            if bytes < 16 {
                anyhow::bail!("--bytes must be at least 16");
            }

            let mut secret = vec![0u8; bytes];
            rand::thread_rng().fill_bytes(&mut secret);
            println!(
                "{}",
                base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&secret)
            );
            Ok(())
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}
