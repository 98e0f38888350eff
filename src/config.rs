use std::env;

use anyhow::anyhow;

use crate::error::{LibError, Result};

pub const DATABASE_URL_VAR: &str = "DATAROOM_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "DATAROOM_MAX_CONNECTIONS";
pub const VERIFY_INVARIANTS_VAR: &str = "DATAROOM_VERIFY_INVARIANTS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Run the full graph invariant check before every write.
    pub verify_invariants: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
            verify_invariants: cfg!(debug_assertions),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source; unset variables
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup(DATABASE_URL_VAR).filter(|value| !value.trim().is_empty()) {
            config.database_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(MAX_CONNECTIONS_VAR) {
            config.max_connections = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or_else(|| {
                    LibError::validation(
                        "Invalid connection limit",
                        anyhow!("{} must be a positive integer, got {:?}", MAX_CONNECTIONS_VAR, raw),
                    )
                })?;
        }
        if let Some(raw) = lookup(VERIFY_INVARIANTS_VAR) {
            config.verify_invariants = flag_value(&raw);
        }
        Ok(config)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

/// Reads an on/off environment variable; `1`, `true` and `yes` mean on.
pub fn env_flag(name: &str) -> bool {
    env::var(name).map(|value| flag_value(&value)).unwrap_or(false)
}

fn flag_value(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes"
}
