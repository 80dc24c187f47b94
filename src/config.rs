//! Coordinator configuration, loaded from an optional JSON file.

use serde::Deserialize;
use std::io::Read;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoordinatorConfig {
    /// Upper bound on a single product catalog query.
    pub catalog_timeout_ms: u64,
    /// Capacity of the backend update channel.
    pub update_buffer: usize,
    /// Name of the thread all public callbacks are delivered on.
    pub delivery_thread_name: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            catalog_timeout_ms: 10_000,
            update_buffer: 64,
            delivery_thread_name: "purchase-delivery".to_string(),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_reader<R: Read>(source: R) -> serde_json::Result<Self> {
        serde_json::from_reader(source)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = CoordinatorConfig::from_reader(r#"{"catalogTimeoutMs": 250}"#.as_bytes())
            .unwrap();
        assert_eq!(config.catalog_timeout(), Duration::from_millis(250));
        assert_eq!(config.update_buffer, 64);
        assert_eq!(config.delivery_thread_name, "purchase-delivery");
    }
}
