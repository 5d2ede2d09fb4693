use tokio::net::{TcpListener, UnixListener};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    // stdout stays free for whoever drives the binary
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mock_server=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Ok(path) = std::env::var("MOCK_LXD_SOCKET") {
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        tracing::info!(socket = %path, "Listening");
        return mock_server::run_unix(listener).await;
    }

    let port = std::env::var("PORT").unwrap_or_else(|_| "8443".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");
    mock_server::run(listener).await
}
