//! Adapter and transport configuration.
//!
//! Values come from the environment (`from_env`) or from any key lookup
//! (`from_lookup`). Unset keys keep their defaults.

use crate::error::ConfigError;
use crate::query::Query;

pub const DEFAULT_COLLECTION: &str = "tasks";
pub const DEFAULT_USER_ID: &str = "test-user";
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:3000";

/// Display order requested from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskOrder {
    /// Whatever order the backend returns.
    #[default]
    Backend,
    /// Descending by creation time.
    NewestFirst,
}

impl TaskOrder {
    pub fn query(self) -> Query {
        match self {
            TaskOrder::Backend => Query::default(),
            TaskOrder::NewestFirst => Query::newest_first(),
        }
    }
}

impl std::str::FromStr for TaskOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backend" => Ok(TaskOrder::Backend),
            "newest-first" => Ok(TaskOrder::NewestFirst),
            other => Err(ConfigError::Invalid {
                key: "TASKS_ORDER",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Collection holding the task documents.
    pub collection: String,
    /// Owner written into every new task.
    pub user_id: String,
    pub order: TaskOrder,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            order: TaskOrder::default(),
        }
    }
}

impl SyncConfig {
    /// Reads `TASKS_COLLECTION`, `TASKS_USER_ID` and `TASKS_ORDER`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(collection) = lookup("TASKS_COLLECTION") {
            config.collection = non_empty("TASKS_COLLECTION", collection)?;
        }
        if let Some(user_id) = lookup("TASKS_USER_ID") {
            config.user_id = non_empty("TASKS_USER_ID", user_id)?;
        }
        if let Some(order) = lookup("TASKS_ORDER") {
            config.order = order.trim().parse()?;
        }
        Ok(config)
    }

    pub fn query(&self) -> Query {
        self.order.query()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
        }
    }
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Reads `TASKS_BACKEND_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = match lookup("TASKS_BACKEND_URL") {
            Some(url) => non_empty("TASKS_BACKEND_URL", url)?,
            None => DEFAULT_BACKEND_URL.to_string(),
        };
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "TASKS_BACKEND_URL",
                value: base_url,
            });
        }
        Ok(Self { base_url })
    }
}

fn non_empty(key: &'static str, value: String) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Empty { key });
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.collection, "tasks");
        assert_eq!(config.user_id, "test-user");
        assert_eq!(config.query(), Query::default());

        let remote = RemoteConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(remote.base_url, DEFAULT_BACKEND_URL);
    }

    #[test]
    fn reads_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("TASKS_COLLECTION", "todo"),
            ("TASKS_USER_ID", " alice "),
            ("TASKS_ORDER", "newest-first"),
        ]))
        .unwrap();
        assert_eq!(config.collection, "todo");
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.query(), Query::newest_first());
    }

    #[test]
    fn rejects_unknown_order() {
        let err = SyncConfig::from_lookup(lookup(&[("TASKS_ORDER", "oldest")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "TASKS_ORDER",
                value: "oldest".to_string()
            }
        );
    }

    #[test]
    fn rejects_empty_collection() {
        let err = SyncConfig::from_lookup(lookup(&[("TASKS_COLLECTION", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty { key: "TASKS_COLLECTION" });
    }

    #[test]
    fn rejects_non_http_backend() {
        let err = RemoteConfig::from_lookup(lookup(&[("TASKS_BACKEND_URL", "ftp://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TASKS_BACKEND_URL", .. }));
    }
}
