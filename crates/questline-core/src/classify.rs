//! Award classification.
//!
//! Maps a user's unlock data for one game onto a [`Tier`] for one track of a
//! challenge month:
//!
//! - nothing earned inside the window → `None`
//! - every achievement earned, at least one inside the window → `Mastery`
//! - every progression achievement and (no win achievements, or at least one
//!   win achievement) earned, with at least one of those earned inside the
//!   window → `Beaten`
//! - otherwise → `Participation`
//!
//! The shadow track is clamped to `Beaten`. A completion that happened
//! entirely before the window is never credited as `Beaten` again; it only
//! counts as `Participation` if something else was unlocked this month.

use std::collections::HashSet;

use crate::types::{AchievementId, AchievementUnlockSet, Tier, Track, TrackDefinition};
use crate::window::EligibleWindow;

/// Intermediate facts behind a classification, for logging and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub tier: Tier,
    /// Achievement count used for the mastery check.
    pub total: u32,
    pub earned_all_time: usize,
    pub earned_in_window: usize,
    pub progression_met: bool,
    pub win_met: bool,
    /// A progression or win achievement was earned inside the window.
    pub qualifying_in_window: bool,
}

/// Classify a track. Pure and deterministic.
pub fn classify(
    unlocks: &AchievementUnlockSet,
    definition: &TrackDefinition,
    window: &EligibleWindow,
    track: Track,
) -> Tier {
    evaluate(unlocks, definition, window, track).tier
}

/// Classify a track and return the facts the decision was based on.
pub fn evaluate(
    unlocks: &AchievementUnlockSet,
    definition: &TrackDefinition,
    window: &EligibleWindow,
    track: Track,
) -> Classification {
    let total = if unlocks.total_achievements > 0 {
        unlocks.total_achievements
    } else {
        definition.total_achievements
    };

    let mut earned_all_time: HashSet<AchievementId> = HashSet::new();
    let mut earned_in_window: HashSet<AchievementId> = HashSet::new();
    for (id, at) in unlocks.earned_all_time() {
        earned_all_time.insert(id);
        if window.contains(at) {
            earned_in_window.insert(id);
        }
    }

    let progression_met = definition
        .progression
        .iter()
        .all(|id| earned_all_time.contains(id));
    let win_met =
        definition.win.is_empty() || definition.win.iter().any(|id| earned_all_time.contains(id));
    let qualifying_in_window = definition
        .qualifying_ids()
        .any(|id| earned_in_window.contains(id));

    let tier = if earned_in_window.is_empty() || total == 0 {
        Tier::None
    } else if earned_all_time.len() == total as usize {
        Tier::Mastery
    } else if progression_met && win_met && qualifying_in_window {
        Tier::Beaten
    } else {
        Tier::Participation
    };

    Classification {
        tier: tier.capped_for(track),
        total,
        earned_all_time: earned_all_time.len(),
        earned_in_window: earned_in_window.len(),
        progression_met,
        win_met,
        qualifying_in_window,
    }
}
