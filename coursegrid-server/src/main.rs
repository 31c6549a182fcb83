mod handlers;
mod server;
mod state;

use std::env;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "coursegrid_server=info,coursegrid_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_path = env::var("COURSEGRID_DATA")
        .map_err(|_| anyhow::anyhow!("COURSEGRID_DATA environment variable is required"))?;

    let state = match state::init_from_path(&data_path) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to load schedule dataset: {}", e);
            return Err(e.into());
        }
    };

    server::start_server(state).await
}
