use serde::Deserialize;
use serde_json::{json, Value};

use crate::logging;

pub const APP_ID_VAR: &str = "DASHBOARD_APP_ID";
pub const AUTH_TOKEN_VAR: &str = "DASHBOARD_AUTH_TOKEN";
pub const CONNECTION_VAR: &str = "DASHBOARD_CONNECTION";

pub const DEFAULT_APP_ID: &str = "default-app-id";

/// Connection blob handed over by the hosting environment. The field names
/// mirror the vendor console's JSON export, hence the camelCase wire names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
}

impl ConnectionConfig {
    /// Hardcoded fallback used when the environment supplies nothing usable.
    pub fn fallback() -> Self {
        Self {
            api_key: "demo-local-api-key".to_string(),
            auth_domain: "stock-dashboard-demo.example.com".to_string(),
            project_id: "stock-dashboard-demo".to_string(),
            storage_bucket: "stock-dashboard-demo.storage.example.com".to_string(),
            messaging_sender_id: "831274950216".to_string(),
            app_id: "1:831274950216:web:4f1c9d2aa07b".to_string(),
        }
    }
}

/// Startup configuration resolved from the hosting environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Scopes every document path written or watched by this client.
    pub app_id: String,
    /// Pre-issued session token, tried before the anonymous bootstrap.
    pub initial_auth_token: Option<String>,
    pub connection: ConnectionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            initial_auth_token: None,
            connection: ConnectionConfig::fallback(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_parts(
            std::env::var(APP_ID_VAR).ok(),
            std::env::var(AUTH_TOKEN_VAR).ok(),
            std::env::var(CONNECTION_VAR).ok(),
        )
    }

    /// Resolution independent of process environment so it stays testable.
    pub fn from_parts(
        app_id: Option<String>,
        auth_token: Option<String>,
        raw_connection: Option<String>,
    ) -> Self {
        let app_id = app_id
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APP_ID.to_string());
        let initial_auth_token = auth_token.filter(|value| !value.trim().is_empty());
        let connection = match raw_connection {
            Some(raw) if !raw.trim().is_empty() => parse_connection(&raw),
            _ => ConnectionConfig::fallback(),
        };

        Self {
            app_id,
            initial_auth_token,
            connection,
        }
    }
}

fn parse_connection(raw: &str) -> ConnectionConfig {
    match serde_json::from_str::<Value>(raw) {
        // An empty blob is the environment's way of saying "nothing set".
        Ok(Value::Object(map)) if map.is_empty() => ConnectionConfig::fallback(),
        Ok(value) => match serde_json::from_value::<ConnectionConfig>(value) {
            Ok(connection) => connection,
            Err(err) => {
                log_fallback(&err.to_string());
                ConnectionConfig::fallback()
            }
        },
        Err(err) => {
            log_fallback(&err.to_string());
            ConnectionConfig::fallback()
        }
    }
}

fn log_fallback(reason: &str) {
    logging::error(
        "config.fallback",
        "failed to parse environment connection config; using fallback",
        json!({ "error": reason }),
    );
}
