//! Data source configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which unlock timestamps count as "earned".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarnedMode {
    /// Earliest of the softcore and hardcore unlock.
    #[default]
    Any,
    /// Hardcore unlocks only.
    HardcoreOnly,
}

/// Connection settings for the achievement data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the web API, without the endpoint file name.
    pub base_url: String,
    /// Account the API key belongs to.
    pub api_username: String,
    pub api_key: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub earned_mode: EarnedMode,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://retroachievements.org/API".to_string(),
            api_username: String::new(),
            api_key: String::new(),
            timeout_secs: 15,
            earned_mode: EarnedMode::Any,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Full URL of the per-user game progress endpoint.
    pub fn progress_url(&self) -> String {
        format!(
            "{}/API_GetGameInfoAndUserProgress.php",
            self.base_url.trim_end_matches('/')
        )
    }
}
