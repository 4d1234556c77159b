//! Upgrade-only merge rule and the in-memory [`ProgressStore`].
//!
//! [`merge_record`] is the single definition of the merge rule; every store
//! implementation applies it under its own per-key atomicity.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{ProgressError, QuestlineError};
use crate::points::points_for;
use crate::traits::ProgressStore;
use crate::types::{MergeOutcome, MonthKey, ProgressKey, ProgressRecord, Tier, Track, UserId};

/// Apply the upgrade-only merge rule to the record currently stored for `key`.
///
/// Returns the outcome and, when the tier rises, the record to write back.
/// `None` means the stored state must be left untouched.
///
/// # Errors
///
/// [`ProgressError::InvariantViolation`] if `candidate` exceeds the track cap.
pub fn merge_record(
    key: &ProgressKey,
    existing: Option<ProgressRecord>,
    candidate: Tier,
    now: DateTime<Utc>,
) -> Result<(MergeOutcome, Option<ProgressRecord>), ProgressError> {
    if candidate > key.track.max_tier() {
        tracing::error!(%key, %candidate, "refusing tier above track cap");
        return Err(ProgressError::InvariantViolation(format!(
            "{candidate} exceeds the {} track cap for {key}",
            key.track
        )));
    }

    let previous = existing.map(|r| r.tier).unwrap_or_default();
    if candidate <= previous {
        let points = existing.map(|r| r.points).unwrap_or(0);
        if candidate < previous {
            tracing::debug!(%key, %previous, %candidate, "kept higher stored tier");
        }
        return Ok((
            MergeOutcome { previous, stored: previous, points },
            None,
        ));
    }

    let points = points_for(candidate, key.track);
    let record = ProgressRecord {
        tier: candidate,
        points,
        updated_at: now.timestamp(),
    };
    Ok((
        MergeOutcome { previous, stored: candidate, points },
        Some(record),
    ))
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<ProgressKey, ProgressRecord>,
    processed: BTreeSet<(UserId, MonthKey)>,
}

/// In-memory progress store for tests and dry runs.
///
/// A single mutex serializes all operations, which trivially makes each merge
/// atomic. Nothing is persisted.
#[derive(Default)]
pub struct MemoryProgressStore {
    inner: Mutex<Inner>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored progress records.
    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn merge_upsert(
        &self,
        key: &ProgressKey,
        candidate: Tier,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, QuestlineError> {
        let mut inner = self.inner.lock();
        let existing = inner.records.get(key).copied();
        let (outcome, write) = merge_record(key, existing, candidate, now)?;
        if let Some(record) = write {
            inner.records.insert(key.clone(), record);
        }
        Ok(outcome)
    }

    fn progress(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, QuestlineError> {
        Ok(self.inner.lock().records.get(key).copied())
    }

    fn records_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<(MonthKey, Track, ProgressRecord)>, QuestlineError> {
        Ok(self
            .inner
            .lock()
            .records
            .iter()
            .filter(|(key, _)| &key.user == user)
            .map(|(key, record)| (key.month, key.track, *record))
            .collect())
    }

    fn is_processed(&self, user: &UserId, month: MonthKey) -> Result<bool, QuestlineError> {
        Ok(self.inner.lock().processed.contains(&(user.clone(), month)))
    }

    fn mark_processed(&self, user: &UserId, month: MonthKey) -> Result<(), QuestlineError> {
        self.inner.lock().processed.insert((user.clone(), month));
        Ok(())
    }

    fn reset_processed(&self, user: &UserId) -> Result<usize, QuestlineError> {
        let mut inner = self.inner.lock();
        let before = inner.processed.len();
        inner.processed.retain(|(u, _)| u != user);
        Ok(before - inner.processed.len())
    }
}
