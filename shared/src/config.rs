use std::env;

const DEFAULT_TABLE_NAME: &str = "mp-alertify";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Cognito app client settings.
#[derive(Debug, Clone)]
pub struct CognitoConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_pool_id: String,
}

/// Runtime settings read once at cold start.
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub cognito: CognitoConfig,
    /// WebSocket management endpoint; without it nothing is pushed to dashboards.
    pub ws_api_endpoint: Option<String>,
    /// When set, dashboard actions reach `/disable_user` and `/publicize_report`
    /// over HTTP instead of in-process.
    pub admin_backend_url: Option<String>,
    /// Shared key that service callers present on the backend endpoints.
    /// Required with `admin_backend_url`.
    pub admin_backend_key: Option<String>,
    /// Trust `X-User-Id` when no authorizer identity is present. Local runs only.
    pub allow_dev_user_header: bool,
    /// Firebase service account JSON used to send push notifications.
    pub firebase_admin_json: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let admin_backend_url =
            get("ADMIN_BACKEND_URL").map(|url| url.trim_end_matches('/').to_string());
        let admin_backend_key = get("ADMIN_BACKEND_KEY");
        if admin_backend_url.is_some() && admin_backend_key.is_none() {
            return Err(ConfigError::Missing("ADMIN_BACKEND_KEY"));
        }

        Ok(Self {
            table_name: get("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            cognito: CognitoConfig {
                client_id: require("COGNITO_CLIENT_ID")?,
                client_secret: require("COGNITO_CLIENT_SECRET")?,
                user_pool_id: require("COGNITO_USER_POOL_ID")?,
            },
            ws_api_endpoint: get("WS_API_ENDPOINT"),
            admin_backend_url,
            admin_backend_key,
            allow_dev_user_header: get("ALLOW_DEV_USER_HEADER")
                .is_some_and(|v| matches!(v.trim(), "1" | "true")),
            firebase_admin_json: get("FIREBASE_ADMIN_JSON"),
        })
    }
}

/// Settings of the stream consumer, which only needs the table and the socket endpoint.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub table_name: String,
    pub ws_api_endpoint: String,
}

impl StreamConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let get = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
        Ok(Self {
            table_name: get("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            ws_api_endpoint: get("WS_API_ENDPOINT").ok_or(ConfigError::Missing("WS_API_ENDPOINT"))?,
        })
    }
}
