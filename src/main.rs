use anyhow::Result;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use emovest::config::Settings;
use emovest::interfaces::web::ApiServer;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let settings = Settings::from_env();
    if settings.workflow.api_key.is_none() {
        warn!("DIFY_API_KEY is not set; workflow relay calls will fail until it is configured");
    }

    info!("API endpoints:");
    info!("  POST /api/chatflow");
    info!("  POST /api/workflows/execute");
    info!("  POST /api/workflows/start");
    info!("  GET  /api/workflows/status/{{jobId}}");

    ApiServer::new(settings).serve().await
}
