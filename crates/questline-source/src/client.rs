//! HTTP achievement data provider.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use questline_core::error::SourceError;
use questline_core::traits::AchievementDataProvider;
use questline_core::types::{AchievementUnlockSet, GameId};

use crate::config::SourceConfig;
use crate::normalize::normalize_json;

/// Fetches unlock data from a RetroAchievements-compatible web API.
pub struct HttpAchievementProvider {
    client: Client,
    config: SourceConfig,
}

impl HttpAchievementProvider {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }
}

/// Classify a non-success HTTP status.
pub fn status_error(status: StatusCode, game: GameId) -> SourceError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::Unauthorized,
        StatusCode::NOT_FOUND => SourceError::NotFound(format!("game {game}")),
        s if s.is_server_error() => SourceError::Upstream(s.as_u16()),
        s => SourceError::Malformed(format!("unexpected status {s}")),
    }
}

/// Map a reqwest failure without its URL, whose query carries the API key.
fn transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Transport(e.without_url().to_string())
    }
}

#[async_trait]
impl AchievementDataProvider for HttpAchievementProvider {
    async fn fetch_progress(
        &self,
        username: &str,
        game: GameId,
    ) -> Result<AchievementUnlockSet, SourceError> {
        let game_param = game.0.to_string();
        let resp = self
            .client
            .get(self.config.progress_url())
            .query(&[
                ("z", self.config.api_username.as_str()),
                ("y", self.config.api_key.as_str()),
                ("u", username),
                ("g", game_param.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(%username, %game, %status, "data source returned error status");
            return Err(status_error(status, game));
        }

        let body = resp.text().await.map_err(transport_error)?;
        normalize_json(&body, game, self.config.earned_mode)
    }
}
