use std::env;

const DEFAULT_BASE_URL: &str = "https://api.dify.ai";

/// One upstream engine endpoint: where to send requests and which credential
/// to present. A route without a key is configured but unusable.
#[derive(Debug, Clone)]
pub struct EngineRoute {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl EngineRoute {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
        }
    }
}

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub user_id: String,
    /// Default route for workflow runs.
    pub workflow: EngineRoute,
    /// Route for the risk-appraisal workflow, which lives in a separate
    /// engine app. Falls back to the primary key when no secondary is set.
    pub risk_workflow: EngineRoute,
    /// Route for the chatflow relay.
    pub chat: EngineRoute,
}

impl Settings {
    pub fn from_env() -> Self {
        let primary_key = non_empty_env("DIFY_API_KEY");
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            user_id: non_empty_env("USER_ID").unwrap_or_else(|| "Seeya".to_string()),
            workflow: EngineRoute::new(base_url_env("DIFY_BASE_URL"), primary_key.clone()),
            risk_workflow: EngineRoute::new(
                base_url_env("DIFY_BASE_URL_2"),
                non_empty_env("DIFY_API_KEY_2").or(primary_key),
            ),
            chat: EngineRoute::new(base_url_env("DIFY_BASE_URL_3"), non_empty_env("DIFY_API_KEY_3")),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn base_url_env(key: &str) -> String {
    non_empty_env(key).unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}
