#[tokio::main]
async fn main() {
    if let Err(err) = iv_api::run().await {
        tracing::error!(error = %err, "iv-api failed");
        std::process::exit(1);
    }
}
