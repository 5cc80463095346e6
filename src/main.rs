#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatehouse::server::run().await
}
