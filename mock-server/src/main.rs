use mock_server::Fixtures;
use tokio::net::TcpListener;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Fixtures from the JSON file named by `FIXTURES`, or the demo set.
fn load_fixtures() -> Result<Fixtures, std::io::Error> {
    match std::env::var("FIXTURES") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let fixtures = serde_json::from_str(&raw).map_err(std::io::Error::other)?;
            tracing::info!(%path, "loaded fixtures");
            Ok(fixtures)
        }
        Err(_) => Ok(mock_server::demo_fixtures()),
    }
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init();

    let fixtures = load_fixtures()?;
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "mock OpenStreetCam API listening");
    mock_server::run(listener, fixtures).await
}
