//! Shared test helpers for E2E and property tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use questline_core::error::SourceError;
use questline_core::traits::AchievementDataProvider;
use questline_core::types::{
    AchievementId, AchievementUnlockSet, Challenge, GameId, MonthKey, TrackDefinition,
};
use questline_engine::{EngineConfig, RetryPolicy};

/// Main game id used by [`challenge`].
pub const MAIN_GAME: u64 = 1446;
/// Shadow game id used by [`challenge`].
pub const SHADOW_GAME: u64 = 2750;

/// Progression achievements A and B, win achievement C.
pub const A: AchievementId = 1;
pub const B: AchievementId = 2;
pub const C: AchievementId = 3;

/// UTC instant.
pub fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

pub fn month(y: i32, m: u32) -> MonthKey {
    MonthKey::new(y, m).unwrap()
}

/// Fixed wall clock for stamping records.
pub fn fixed_now() -> DateTime<Utc> {
    ts(2025, 3, 1, 6, 0, 0)
}

/// A ten-achievement main game (progression {A, B}, win {C}) and a
/// twelve-achievement shadow game (progression {21, 22}, win {23}).
pub fn challenge(m: MonthKey, shadow_revealed: bool) -> Challenge {
    Challenge {
        month: m,
        main: TrackDefinition {
            game_id: GameId(MAIN_GAME),
            progression: [A, B].into_iter().collect(),
            win: [C].into_iter().collect(),
            total_achievements: 10,
        },
        shadow: Some(TrackDefinition {
            game_id: GameId(SHADOW_GAME),
            progression: [21, 22].into_iter().collect(),
            win: [23].into_iter().collect(),
            total_achievements: 12,
        }),
        shadow_revealed,
    }
}

/// Unlock set of `total` achievements numbered from `first`, with the
/// `earned` ids stamped and the rest unearned.
pub fn unlocks(
    game: u64,
    total: u32,
    first: AchievementId,
    earned: &[(AchievementId, DateTime<Utc>)],
) -> AchievementUnlockSet {
    let mut set = AchievementUnlockSet::new(GameId(game), total);
    for id in first..first + AchievementId::from(total) {
        set.earned.insert(id, None);
    }
    for (id, at) in earned {
        set.earned.insert(*id, Some(*at));
    }
    set
}

/// Engine config without pacing and with instant retries.
pub fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        call_delay_ms: 0,
        user_delay_ms: 0,
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
            jitter_ms: 0,
        },
        ..EngineConfig::default()
    }
}

type Script = VecDeque<Result<AchievementUnlockSet, SourceError>>;

/// Data source answering from per-(username, game) scripts.
///
/// Each call pops the next scripted answer; the last one repeats. Unscripted
/// pairs answer with an empty unlock set.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<(String, u64), Script>>,
    calls: AtomicU32,
    trip: Mutex<Option<(u32, Arc<AtomicBool>)>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an answer for `(username, game)`.
    pub fn push(&self, username: &str, game: u64, answer: Result<AchievementUnlockSet, SourceError>) {
        self.scripts
            .lock()
            .entry((username.to_string(), game))
            .or_default()
            .push_back(answer);
    }

    /// Set `flag` once `calls` calls have been served.
    pub fn trip_after(&self, calls: u32, flag: Arc<AtomicBool>) {
        *self.trip.lock() = Some((calls, flag));
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AchievementDataProvider for ScriptedProvider {
    async fn fetch_progress(
        &self,
        username: &str,
        game: GameId,
    ) -> Result<AchievementUnlockSet, SourceError> {
        let served = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, flag)) = self.trip.lock().as_ref() {
            if served >= *limit {
                flag.store(true, Ordering::SeqCst);
            }
        }

        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&(username.to_string(), game.0)) {
            Some(script) if script.len() > 1 => script
                .pop_front()
                .unwrap_or_else(|| Ok(AchievementUnlockSet::new(game, 0))),
            Some(script) => script
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(AchievementUnlockSet::new(game, 0))),
            None => Ok(AchievementUnlockSet::new(game, 0)),
        }
    }
}
