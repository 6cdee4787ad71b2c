mod handlers;
mod router;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tracing::info;

use crate::config::Settings;
use crate::core::workflow::{JobStore, WorkflowGateway};

/// Shared state for the relay endpoints.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) gateway: Arc<WorkflowGateway>,
    pub(crate) jobs: JobStore,
}

/// HTTP relay between the dashboard and the workflow engine. Holds the
/// in-memory job store for the process lifetime.
pub struct ApiServer {
    settings: Settings,
}

impl ApiServer {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn into_router(self) -> Router {
        let state = AppState {
            gateway: Arc::new(WorkflowGateway::new(&self.settings)),
            jobs: JobStore::new(),
        };
        router::build_router(state)
    }

    pub async fn serve(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.settings.port);
        let app = self.into_router();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("Workflow relay running at http://{addr}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
