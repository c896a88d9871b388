//! Research Assistant - HTTP Server Entry Point

use research_assistant::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "research_assistant=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        model = %config.model,
        research_file = %config.research_file_path().display(),
        "Loaded configuration"
    );
    if config.api_key.is_none() {
        info!("OPENAI_API_KEY not set; sessions must supply their own key");
    }

    api::serve(config).await
}
