/// Engine tuning: cache size, debounce delays, logging
use serde::{Deserialize, Serialize};

use crate::scheduler::Millis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Maximum number of cached group colors
    pub color_cache_capacity: usize,
    /// Wait for a new tab's URL to settle before grouping its window
    pub tab_created_delay_ms: Millis,
    /// Safety-net window pass after a navigation
    pub navigation_settle_delay_ms: Millis,
    pub tab_removed_delay_ms: Millis,
    /// Per-call limit for favicon color sampling
    pub color_extraction_timeout_ms: Millis,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            color_cache_capacity: 100,
            tab_created_delay_ms: 500,
            navigation_settle_delay_ms: 300,
            tab_removed_delay_ms: 100,
            color_extraction_timeout_ms: 1500,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; anything unreadable falls back to the defaults
    pub fn from_json(json: &str) -> EngineConfig {
        if json.trim().is_empty() {
            return EngineConfig::default();
        }
        serde_json::from_str(json).unwrap_or_else(|e| {
            log::warn!("Invalid engine config, using defaults: {}", e);
            EngineConfig::default()
        })
    }

    pub fn level(&self) -> log::Level {
        self.log_level.parse().unwrap_or(log::Level::Info)
    }
}
