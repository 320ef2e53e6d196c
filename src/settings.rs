//! Environment-driven settings. A `.env` file is read when present.

use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/gateway";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    /// PostgreSQL schema qualifying every table; unqualified when unset.
    pub schema: Option<String>,
    pub max_connections: u32,
    /// JSON graph file for [`crate::config::load_from_path`].
    pub graph_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: DEFAULT_DATABASE_URL.into(),
            schema: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            graph_path: None,
        }
    }
}

impl Settings {
    /// `DATABASE_URL`, `GATEWAY_SCHEMA`, `GATEWAY_MAX_CONNECTIONS`, `GATEWAY_GRAPH`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let max_connections = match non_empty("GATEWAY_MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<u32>().ok().filter(|n| *n > 0).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "invalid GATEWAY_MAX_CONNECTIONS, using default");
                DEFAULT_MAX_CONNECTIONS
            }),
            None => DEFAULT_MAX_CONNECTIONS,
        };
        Settings {
            database_url: non_empty("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            schema: non_empty("GATEWAY_SCHEMA"),
            max_connections,
            graph_path: non_empty("GATEWAY_GRAPH").map(PathBuf::from),
        }
    }
}
