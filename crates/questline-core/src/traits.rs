//! Trait interfaces between the engine and its collaborators.
//!
//! - [`ProgressStore`]: durable, upgrade-only progress records (questline-store implements)
//! - [`ChallengeCatalog`]: challenge definitions by month
//! - [`MemberRoster`]: registered members and their data source accounts
//! - [`AchievementDataProvider`]: per-user unlock data (questline-source implements)
//!
//! In-memory implementations of the first three live in [`crate::progress`]
//! and [`crate::catalog`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{QuestlineError, SourceError};
use crate::types::{
    AchievementUnlockSet, Challenge, GameId, Member, MergeOutcome, MonthKey, ProgressKey,
    ProgressRecord, Tier, Track, UserId,
};

/// Durable per-user, per-month, per-track progress.
///
/// Implementations must make [`merge_upsert`](Self::merge_upsert) atomic per
/// key: concurrent merges for the same key behave as compare-and-set to the
/// maximum tier, so the highest candidate wins in any order. Merges for
/// different keys must not block each other on anything but I/O.
pub trait ProgressStore: Send + Sync {
    /// Store `max(stored, candidate)` for `key` and return the result.
    ///
    /// `now` stamps the record when the tier rises. A merge that leaves the
    /// tier unchanged performs no write.
    ///
    /// # Errors
    ///
    /// - [`ProgressError::InvariantViolation`](crate::error::ProgressError::InvariantViolation)
    ///   if `candidate` is above the track's cap
    fn merge_upsert(
        &self,
        key: &ProgressKey,
        candidate: Tier,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, QuestlineError>;

    /// Stored record for `key`, if any.
    fn progress(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, QuestlineError>;

    /// All records of a user, ordered by month then track.
    fn records_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<(MonthKey, Track, ProgressRecord)>, QuestlineError>;

    /// Sum of a user's points across every recorded month and track.
    ///
    /// Default implementation folds [`records_for_user`](Self::records_for_user).
    fn total_points(&self, user: &UserId) -> Result<u32, QuestlineError> {
        Ok(self
            .records_for_user(user)?
            .iter()
            .map(|(_, _, record)| record.points)
            .sum())
    }

    /// Whether the batch driver already finished `(user, month)`.
    fn is_processed(&self, user: &UserId, month: MonthKey) -> Result<bool, QuestlineError>;

    /// Mark `(user, month)` as finished by the batch driver.
    fn mark_processed(&self, user: &UserId, month: MonthKey) -> Result<(), QuestlineError>;

    /// Clear every processed mark of `user`. Returns how many were cleared.
    fn reset_processed(&self, user: &UserId) -> Result<usize, QuestlineError>;
}

/// Challenge definitions by month.
pub trait ChallengeCatalog: Send + Sync {
    /// Challenge of `month`, or `None` when no challenge was defined.
    fn challenge(&self, month: MonthKey) -> Result<Option<Challenge>, QuestlineError>;

    /// Every month with a defined challenge, ascending.
    fn months(&self) -> Result<Vec<MonthKey>, QuestlineError>;
}

/// Registered community members.
pub trait MemberRoster: Send + Sync {
    /// Every registered member, ordered by id.
    fn members(&self) -> Result<Vec<Member>, QuestlineError>;

    fn member(&self, id: &UserId) -> Result<Option<Member>, QuestlineError>;
}

/// Source of per-user unlock data.
///
/// Implementations normalize whatever the upstream service returns into an
/// [`AchievementUnlockSet`]; callers never see upstream field names.
#[async_trait]
pub trait AchievementDataProvider: Send + Sync {
    /// Unlock state of `username` in `game`.
    async fn fetch_progress(
        &self,
        username: &str,
        game: GameId,
    ) -> Result<AchievementUnlockSet, SourceError>;
}
