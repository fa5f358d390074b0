use std::path::Path;

use sarau::chat::history::HistoryLog;
use sarau::chat::server::ChatServer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("sarau — bate-papo em grupo");

    // Bind address: configurable via SARAU_BIND, all interfaces by default.
    let bind_addr = std::env::var("SARAU_BIND").unwrap_or_else(|_| "0.0.0.0:55555".to_string());
    let history_path =
        std::env::var("SARAU_HISTORY").unwrap_or_else(|_| "chat_history.json".to_string());

    let history = HistoryLog::load_or_create(Path::new(&history_path));
    let server = ChatServer::bind(&bind_addr, history).await?;

    // Operator interrupt triggers the orderly drain in serve().
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    server.serve().await
}
