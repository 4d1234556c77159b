//! Recomputation driver.
//!
//! Both modes share one pipeline per `(user, month)`:
//!
//! 1. fetch the unlock set of every track's game (paced, retried)
//! 2. classify each track against the month's window
//! 3. merge each tier into the progress store
//!
//! All fetches finish before the first merge, and steps 2 and 3 contain no
//! await point. A recomputation dropped mid-flight therefore never leaves a
//! partial merge behind.
//!
//! Batch runs walk every member and every catalog month before the current
//! one, skip pairs already marked processed (unless reprocessing), and keep
//! going after per-pair failures. Cancellation is checked between pairs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use questline_core::classify::evaluate;
use questline_core::error::{InputError, ProgressError, QuestlineError, SourceError};
use questline_core::traits::{
    AchievementDataProvider, ChallengeCatalog, MemberRoster, ProgressStore,
};
use questline_core::types::{
    AchievementUnlockSet, Challenge, GameId, Member, MergeOutcome, MonthKey, ProgressKey, Tier,
    Track, UserId,
};
use questline_core::window::EligibleWindow;

use crate::config::{EngineConfig, ShadowPolicy};
use crate::error::EngineError;
use crate::pacer::Pacer;
use crate::report::{BatchProgress, BatchSummary};
use crate::retry::with_retry;

/// Result of one track of a recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackResult {
    pub track: Track,
    /// Tier computed from the current unlock data.
    pub computed: Tier,
    /// Store state after the merge.
    pub merge: MergeOutcome,
    /// Shadow track scored before its reveal.
    pub hidden: bool,
}

/// Result of a live recomputation, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveOutcome {
    pub user: UserId,
    pub month: MonthKey,
    /// `false` when no challenge is defined for the month.
    pub challenge_defined: bool,
    pub main: Option<TrackResult>,
    pub shadow: Option<TrackResult>,
}

impl LiveOutcome {
    /// Points of the tracks the user can see.
    pub fn visible_points(&self) -> u32 {
        [self.main, self.shadow]
            .into_iter()
            .flatten()
            .filter(|r| !r.hidden)
            .map(|r| r.merge.points)
            .sum()
    }
}

/// Which members a batch run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserScope {
    All,
    One(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchScope {
    pub users: UserScope,
    /// Recompute pairs already marked processed.
    pub reprocess: bool,
}

impl Default for BatchScope {
    fn default() -> Self {
        Self { users: UserScope::All, reprocess: false }
    }
}

/// Per-pair outcome inside a batch.
struct PairOutcome {
    tracks: Vec<TrackResult>,
}

impl PairOutcome {
    fn upgraded(&self) -> bool {
        self.tracks.iter().any(|t| t.merge.upgraded())
    }
}

/// Drives recomputation of challenge progress.
pub struct RecomputationDriver {
    store: Arc<dyn ProgressStore>,
    catalog: Arc<dyn ChallengeCatalog>,
    roster: Arc<dyn MemberRoster>,
    provider: Arc<dyn AchievementDataProvider>,
    config: EngineConfig,
    pacer: Pacer,
    clock: fn() -> DateTime<Utc>,
}

impl RecomputationDriver {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        catalog: Arc<dyn ChallengeCatalog>,
        roster: Arc<dyn MemberRoster>,
        provider: Arc<dyn AchievementDataProvider>,
        config: EngineConfig,
    ) -> Self {
        let pacer = Pacer::new(config.call_delay());
        Self {
            store,
            catalog,
            roster,
            provider,
            config,
            pacer,
            clock: Utc::now,
        }
    }

    /// Replace the clock used to stamp upgraded records.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Live mode
    // ------------------------------------------------------------------

    /// Recompute one user's progress for `month` and return the stored result.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Input`] for an unknown member
    /// - [`EngineError::LiveRecomputeFailed`] for any data source or store
    ///   failure; the user, game and cause are logged
    pub async fn recompute_live(
        &self,
        user: &UserId,
        month: MonthKey,
    ) -> Result<LiveOutcome, EngineError> {
        let member = self
            .roster
            .member(user)
            .map_err(|e| self.live_failure(user, month, None, &e))?
            .ok_or_else(|| InputError::UnknownMember(user.to_string()))?;

        let Some(challenge) = self
            .catalog
            .challenge(month)
            .map_err(|e| self.live_failure(user, month, None, &e))?
        else {
            tracing::debug!(%user, %month, "no challenge defined");
            return Ok(LiveOutcome {
                user: user.clone(),
                month,
                challenge_defined: false,
                main: None,
                shadow: None,
            });
        };

        let tracks = self
            .recompute_pair(&member, &challenge)
            .await
            .map_err(|(game, e)| self.live_failure(user, month, game, &e))?;

        let find = |track: Track| tracks.iter().find(|r| r.track == track).copied();
        let outcome = LiveOutcome {
            user: user.clone(),
            month,
            challenge_defined: true,
            main: find(Track::Main),
            shadow: find(Track::Shadow),
        };
        tracing::info!(
            %user,
            %month,
            main = %outcome.main.map_or(Tier::None, |r| r.merge.stored),
            shadow = %outcome.shadow.map_or(Tier::None, |r| r.merge.stored),
            points = outcome.visible_points(),
            "live recomputation complete"
        );
        Ok(outcome)
    }

    fn live_failure(
        &self,
        user: &UserId,
        month: MonthKey,
        game: Option<GameId>,
        cause: &QuestlineError,
    ) -> EngineError {
        match game {
            Some(game) => {
                tracing::error!(%user, %month, %game, error = %cause, "live recomputation failed")
            }
            None => tracing::error!(%user, %month, error = %cause, "live recomputation failed"),
        }
        EngineError::LiveRecomputeFailed
    }

    // ------------------------------------------------------------------
    // Batch mode
    // ------------------------------------------------------------------

    /// Recompute every `(user, month)` pair in scope for months before
    /// `current_month`.
    ///
    /// Publishes a [`BatchProgress`] snapshot on `progress` after every pair.
    /// Per-pair failures are counted, logged and left unprocessed. Setting
    /// `cancel` stops the run before the next pair.
    ///
    /// # Errors
    ///
    /// Only failures to enumerate the scope (unknown user, unreadable
    /// catalog or roster). Pair failures never abort the run.
    pub async fn run_batch(
        &self,
        scope: &BatchScope,
        current_month: MonthKey,
        cancel: &AtomicBool,
        progress: &watch::Sender<BatchProgress>,
    ) -> Result<BatchSummary, EngineError> {
        let members = match &scope.users {
            UserScope::All => self.roster.members()?,
            UserScope::One(id) => vec![
                self.roster
                    .member(id)?
                    .ok_or_else(|| InputError::UnknownMember(id.to_string()))?,
            ],
        };
        let months: Vec<MonthKey> = self
            .catalog
            .months()?
            .into_iter()
            .filter(|m| *m < current_month)
            .collect();

        let mut counts = BatchProgress {
            total: (members.len() * months.len()) as u64,
            ..BatchProgress::default()
        };
        progress.send_replace(counts);
        tracing::info!(
            users = members.len(),
            months = months.len(),
            total = counts.total,
            reprocess = scope.reprocess,
            "batch recomputation started"
        );

        let mut cancelled = false;
        'users: for (index, member) in members.iter().enumerate() {
            if index > 0 && !self.config.user_delay().is_zero() {
                tokio::time::sleep(self.config.user_delay()).await;
            }
            for &month in &months {
                if cancel.load(Ordering::Relaxed) {
                    cancelled = true;
                    break 'users;
                }
                self.batch_pair(member, month, scope.reprocess, &mut counts).await;
                progress.send_replace(counts);
            }
        }

        if cancelled {
            tracing::warn!(
                processed = counts.processed,
                remaining = counts.remaining(),
                "batch recomputation cancelled"
            );
        } else {
            tracing::info!(
                processed = counts.processed,
                updated = counts.updated,
                errored = counts.errored,
                skipped = counts.skipped,
                "batch recomputation finished"
            );
        }
        Ok(BatchSummary { progress: counts, cancelled })
    }

    async fn batch_pair(
        &self,
        member: &Member,
        month: MonthKey,
        reprocess: bool,
        counts: &mut BatchProgress,
    ) {
        let user = &member.id;
        if !reprocess {
            match self.store.is_processed(user, month) {
                Ok(true) => {
                    counts.skipped += 1;
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(%user, %month, error = %e, "could not read processed mark");
                    counts.errored += 1;
                    return;
                }
            }
        }

        let challenge = match self.catalog.challenge(month) {
            Ok(Some(challenge)) => challenge,
            Ok(None) => {
                tracing::warn!(%user, %month, "challenge disappeared from catalog");
                counts.errored += 1;
                return;
            }
            Err(e) => {
                tracing::warn!(%user, %month, error = %e, "could not load challenge");
                counts.errored += 1;
                return;
            }
        };

        let result = match self.recompute_pair(member, &challenge).await {
            Ok(tracks) if self.fully_scored(&challenge) => self
                .store
                .mark_processed(user, month)
                .map(|()| PairOutcome { tracks })
                .map_err(|e| (None, e)),
            Ok(tracks) => {
                tracing::debug!(%user, %month, "shadow track awaiting reveal, pair left unmarked");
                Ok(PairOutcome { tracks })
            }
            Err(failure) => Err(failure),
        };

        match result {
            Ok(outcome) => {
                counts.processed += 1;
                if outcome.upgraded() {
                    counts.updated += 1;
                }
                tracing::debug!(%user, %month, upgraded = outcome.upgraded(), "pair processed");
            }
            Err((Some(game), e)) => {
                counts.errored += 1;
                tracing::warn!(%user, %month, %game, error = %e, "pair failed, continuing");
            }
            Err((None, e)) => {
                counts.errored += 1;
                tracing::warn!(%user, %month, error = %e, "pair failed, continuing");
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared pipeline
    // ------------------------------------------------------------------

    /// Tracks of `challenge` that should be scored, with their game ids.
    fn scored_tracks(&self, challenge: &Challenge) -> Vec<(Track, GameId, bool)> {
        Track::ALL
            .into_iter()
            .filter_map(|track| {
                let definition = challenge.definition(track)?;
                let hidden = track == Track::Shadow && !challenge.shadow_revealed;
                if hidden && self.config.shadow_policy == ShadowPolicy::RevealedOnly {
                    return None;
                }
                Some((track, definition.game_id, hidden))
            })
            .collect()
    }

    /// Whether every defined track of `challenge` gets scored.
    fn fully_scored(&self, challenge: &Challenge) -> bool {
        let defined = Track::ALL
            .into_iter()
            .filter(|t| challenge.definition(*t).is_some())
            .count();
        self.scored_tracks(challenge).len() == defined
    }

    /// Fetch, classify and merge every scored track of one `(member, month)`.
    ///
    /// On failure returns the game being fetched, if the failure came from
    /// the data source, with the cause.
    async fn recompute_pair(
        &self,
        member: &Member,
        challenge: &Challenge,
    ) -> Result<Vec<TrackResult>, (Option<GameId>, QuestlineError)> {
        let window = EligibleWindow::resolve(challenge.month)
            .map_err(|e| (None, QuestlineError::from(e)))?;
        let tracks = self.scored_tracks(challenge);

        let mut fetched: Vec<(GameId, AchievementUnlockSet)> = Vec::with_capacity(tracks.len());
        for &(_, game, _) in &tracks {
            if fetched.iter().any(|(g, _)| *g == game) {
                continue;
            }
            let unlocks = self
                .fetch(&member.source_username, game)
                .await
                .map_err(|e| (Some(game), QuestlineError::Source(e)))?;
            fetched.push((game, unlocks));
        }

        // No await below: classification and merges apply together.
        let now = (self.clock)();
        let mut results = Vec::with_capacity(tracks.len());
        for (track, game, hidden) in tracks {
            let (Some(definition), Some((_, unlocks))) = (
                challenge.definition(track),
                fetched.iter().find(|(g, _)| *g == game),
            ) else {
                continue;
            };
            let facts = evaluate(unlocks, definition, &window, track);
            tracing::trace!(user = %member.id, month = %challenge.month, %track, ?facts, "classified");

            let key = ProgressKey::new(member.id.clone(), challenge.month, track);
            check_candidate(&key, facts.tier).map_err(|e| (Some(game), e))?;
            let merge = self
                .store
                .merge_upsert(&key, facts.tier, now)
                .map_err(|e| (Some(game), e))?;
            if merge.upgraded() {
                tracing::info!(%key, from = %merge.previous, to = %merge.stored, points = merge.points, "progress upgraded");
            }
            results.push(TrackResult { track, computed: facts.tier, merge, hidden });
        }
        Ok(results)
    }

    async fn fetch(&self, username: &str, game: GameId) -> Result<AchievementUnlockSet, SourceError> {
        let provider = &self.provider;
        let pacer = &self.pacer;
        with_retry(&self.config.retry, || async move {
            pacer.wait().await;
            provider.fetch_progress(username, game).await
        })
        .await
    }
}

/// Refuse to send the store a tier its track can never hold.
fn check_candidate(key: &ProgressKey, candidate: Tier) -> Result<(), QuestlineError> {
    if candidate > key.track.max_tier() {
        tracing::error!(%key, %candidate, "classifier produced a tier above the track cap");
        return Err(ProgressError::InvariantViolation(format!(
            "candidate {candidate} above {} cap for {key}",
            key.track
        ))
        .into());
    }
    Ok(())
}
