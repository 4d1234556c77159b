//! Normalization of upstream game progress responses.
//!
//! The upstream service reports each achievement with optional softcore and
//! hardcore unlock dates as `YYYY-MM-DD HH:MM:SS` strings in UTC, keyed by id.
//! A game with no achievements comes back with an empty JSON array instead
//! of an object.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use questline_core::error::SourceError;
use questline_core::types::{AchievementUnlockSet, GameId};

use crate::config::EarnedMode;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Response body of the game-info-and-user-progress endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameProgressResponse {
    #[serde(rename = "ID", default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub num_achievements: Option<u32>,
    #[serde(default)]
    pub achievements: Option<WireAchievements>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireAchievements {
    ById(BTreeMap<String, WireAchievement>),
    List(Vec<WireAchievement>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireAchievement {
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(default)]
    pub date_earned: Option<String>,
    #[serde(default)]
    pub date_earned_hardcore: Option<String>,
}

/// Parse an upstream timestamp. Empty strings mean "not earned".
pub fn parse_timestamp(raw: &str) -> Result<Option<DateTime<Utc>>, SourceError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| SourceError::Malformed(format!("timestamp {raw:?}: {e}")))
}

fn parse_optional(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, SourceError> {
    match raw {
        Some(raw) => parse_timestamp(raw),
        None => Ok(None),
    }
}

impl WireAchievement {
    fn earned_at(&self, mode: EarnedMode) -> Result<Option<DateTime<Utc>>, SourceError> {
        let hardcore = parse_optional(self.date_earned_hardcore.as_deref())?;
        match mode {
            EarnedMode::HardcoreOnly => Ok(hardcore),
            EarnedMode::Any => {
                let softcore = parse_optional(self.date_earned.as_deref())?;
                Ok(match (softcore, hardcore) {
                    (Some(s), Some(h)) => Some(s.min(h)),
                    (s, h) => s.or(h),
                })
            }
        }
    }
}

/// Convert a response into the canonical unlock set for `game`.
///
/// The total is the larger of the reported count and the number of listed
/// achievements.
pub fn normalize(
    response: GameProgressResponse,
    game: GameId,
    mode: EarnedMode,
) -> Result<AchievementUnlockSet, SourceError> {
    if let Some(id) = response.id.filter(|id| *id != game.0) {
        return Err(SourceError::Malformed(format!(
            "asked for game {game}, got game {id}"
        )));
    }

    let achievements: Vec<WireAchievement> = match response.achievements {
        Some(WireAchievements::ById(map)) => map.into_values().collect(),
        Some(WireAchievements::List(list)) => list,
        None => Vec::new(),
    };

    let listed = u32::try_from(achievements.len())
        .map_err(|_| SourceError::Malformed("achievement count overflow".into()))?;
    let total = response.num_achievements.unwrap_or(0).max(listed);

    let mut set = AchievementUnlockSet::new(game, total);
    for achievement in &achievements {
        set.earned.insert(achievement.id, achievement.earned_at(mode)?);
    }
    Ok(set)
}

/// Parse a raw JSON body and normalize it.
pub fn normalize_json(
    body: &str,
    game: GameId,
    mode: EarnedMode,
) -> Result<AchievementUnlockSet, SourceError> {
    let response: GameProgressResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
    normalize(response, game, mode)
}
