use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = storescore_server::start_server().await {
        error!("storescore failed: {e}");
        std::process::exit(1);
    }
}
