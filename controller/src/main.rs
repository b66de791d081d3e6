mod host;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
