#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wallet_auth_gateway::server::run().await
}
