//! Core domain types: month keys, tracks, tiers, challenge definitions,
//! unlock sets and progress records.
//!
//! All instants are UTC.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_MONTH_KEY_YEAR, MIN_MONTH_KEY_YEAR};
use crate::error::InputError;

/// Identifier of an achievement in the data source.
pub type AchievementId = u64;

/// Canonical `YYYY-MM` identifier of a challenge month.
///
/// Ordering is chronological.
///
/// # Examples
///
/// ```
/// use questline_core::types::MonthKey;
/// let key: MonthKey = "2025-02".parse().unwrap();
/// assert_eq!(key.year(), 2025);
/// assert_eq!(key.month(), 2);
/// assert_eq!(key.to_string(), "2025-02");
/// ```
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Build a month key from a year and a 1-based month.
    pub fn new(year: i32, month: u32) -> Result<Self, InputError> {
        if !(MIN_MONTH_KEY_YEAR..=MAX_MONTH_KEY_YEAR).contains(&year) || !(1..=12).contains(&month)
        {
            return Err(InputError::MonthOutOfRange { year, month });
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// 1-based month index.
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month before this one, or `None` below the supported range.
    pub fn previous(&self) -> Option<Self> {
        if self.month == 1 {
            Self::new(self.year - 1, 12).ok()
        } else {
            Some(Self { year: self.year, month: self.month - 1 })
        }
    }

    /// The month after this one, or `None` above the supported range.
    pub fn next(&self) -> Option<Self> {
        if self.month == 12 {
            Self::new(self.year + 1, 1).ok()
        } else {
            Some(Self { year: self.year, month: self.month + 1 })
        }
    }

    /// Month key containing the given instant.
    pub fn containing(instant: DateTime<Utc>) -> Result<Self, InputError> {
        use chrono::Datelike;
        Self::new(instant.year(), instant.month())
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || InputError::MalformedMonthKey(s.to_string());
        let bytes = s.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return Err(malformed());
        }
        let digits = |part: &[u8]| part.iter().all(u8::is_ascii_digit);
        if !digits(&bytes[..4]) || !digits(&bytes[5..]) {
            return Err(malformed());
        }
        let year: i32 = s[..4].parse().map_err(|_| malformed())?;
        let month: u32 = s[5..].parse().map_err(|_| malformed())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

/// Which of a month's two challenges a result belongs to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Main,
    /// Hidden side challenge, revealed partway through the month.
    Shadow,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Main, Track::Shadow];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Shadow => "shadow",
        }
    }

    /// Highest tier this track can award.
    pub fn max_tier(&self) -> Tier {
        match self {
            Self::Main => Tier::Mastery,
            Self::Shadow => Tier::Beaten,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Track {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Self::Main),
            "shadow" => Ok(Self::Shadow),
            other => Err(InputError::InvalidDefinition(format!("unknown track {other:?}"))),
        }
    }
}

/// Award level reached on a track. Ordered `None < Participation < Beaten < Mastery`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    None,
    Participation,
    Beaten,
    Mastery,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Participation => "participation",
            Self::Beaten => "beaten",
            Self::Mastery => "mastery",
        }
    }

    /// Clamp to the highest tier `track` can award.
    pub fn capped_for(self, track: Track) -> Tier {
        self.min(track.max_tier())
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Game identifier in the data source.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Community member identifier (the chat-platform user id).
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// A registered member and the account name the data source knows them by.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Member {
    pub id: UserId,
    pub source_username: String,
}

/// Definition of one track of a challenge.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TrackDefinition {
    pub game_id: GameId,
    /// All of these must be earned to beat the game.
    #[serde(default)]
    pub progression: BTreeSet<AchievementId>,
    /// At least one of these must be earned to beat the game, if any are listed.
    #[serde(default)]
    pub win: BTreeSet<AchievementId>,
    /// Achievement count of the game at definition time.
    #[serde(default)]
    pub total_achievements: u32,
}

impl TrackDefinition {
    pub fn validate(&self, track: Track) -> Result<(), InputError> {
        if self.game_id.0 == 0 {
            return Err(InputError::InvalidDefinition(format!(
                "{track} track has game id 0"
            )));
        }
        Ok(())
    }

    /// Progression and win ids together.
    pub fn qualifying_ids(&self) -> impl Iterator<Item = &AchievementId> {
        self.progression.iter().chain(self.win.iter())
    }
}

/// A month's challenge: the main track, an optional shadow track, and
/// whether the shadow track has been revealed.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Challenge {
    pub month: MonthKey,
    pub main: TrackDefinition,
    #[serde(default)]
    pub shadow: Option<TrackDefinition>,
    #[serde(default)]
    pub shadow_revealed: bool,
}

impl Challenge {
    /// Parse and validate a challenge definition from JSON.
    pub fn from_json(json: &str) -> Result<Self, InputError> {
        let challenge: Challenge = serde_json::from_str(json).map_err(|e| {
            if e.is_data() && e.to_string().starts_with("missing field `main`") {
                InputError::MissingField("main")
            } else {
                InputError::InvalidDefinition(e.to_string())
            }
        })?;
        challenge.validate()?;
        Ok(challenge)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        self.main.validate(Track::Main)?;
        if let Some(shadow) = &self.shadow {
            shadow.validate(Track::Shadow)?;
        }
        Ok(())
    }

    pub fn definition(&self, track: Track) -> Option<&TrackDefinition> {
        match track {
            Track::Main => Some(&self.main),
            Track::Shadow => self.shadow.as_ref(),
        }
    }
}

/// A user's unlock state for one game, normalized from the data source.
///
/// `earned` maps every known achievement id to its earn instant; `None` means
/// not earned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AchievementUnlockSet {
    pub game_id: GameId,
    pub earned: HashMap<AchievementId, Option<DateTime<Utc>>>,
    pub total_achievements: u32,
}

impl AchievementUnlockSet {
    pub fn new(game_id: GameId, total_achievements: u32) -> Self {
        Self {
            game_id,
            earned: HashMap::new(),
            total_achievements,
        }
    }

    /// Record an achievement, earned at `at` or not earned when `None`.
    pub fn with(mut self, id: AchievementId, at: Option<DateTime<Utc>>) -> Self {
        self.earned.insert(id, at);
        self
    }

    /// Ids with an earn instant, paired with that instant.
    pub fn earned_all_time(&self) -> impl Iterator<Item = (AchievementId, DateTime<Utc>)> + '_ {
        self.earned.iter().filter_map(|(id, at)| at.map(|t| (*id, t)))
    }
}

/// Key of one durable progress record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressKey {
    pub user: UserId,
    pub month: MonthKey,
    pub track: Track,
}

impl ProgressKey {
    pub fn new(user: UserId, month: MonthKey, track: Track) -> Self {
        Self { user, month, track }
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user, self.month, self.track)
    }
}

/// Best tier recorded for a key, with its points.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct ProgressRecord {
    pub tier: Tier,
    pub points: u32,
    /// Unix seconds of the last upgrade.
    pub updated_at: i64,
}

impl ProgressRecord {
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.updated_at, 0)
    }
}

/// Result of a [`merge_upsert`](crate::traits::ProgressStore::merge_upsert).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Tier stored before the merge (`None` when absent).
    pub previous: Tier,
    /// Tier stored after the merge.
    pub stored: Tier,
    /// Points of the stored tier.
    pub points: u32,
}

impl MergeOutcome {
    pub fn upgraded(&self) -> bool {
        self.stored > self.previous
    }
}
