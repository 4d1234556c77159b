//! Property tests for the award invariants.
//!
//! Unlock histories are generated around a challenge month so that
//! timestamps fall before the grace day, on it, inside the window, and after
//! the window end.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

use questline_core::classify::{classify, evaluate};
use questline_core::points::points_for;
use questline_core::progress::MemoryProgressStore;
use questline_core::traits::ProgressStore;
use questline_core::types::{
    AchievementUnlockSet, GameId, ProgressKey, Tier, Track, TrackDefinition, UserId,
};
use questline_core::window::EligibleWindow;
use questline_store::RocksStore;
use questline_tests::helpers::*;

const TOTAL: u64 = 12;

fn window() -> EligibleWindow {
    EligibleWindow::resolve(month(2025, 3)).unwrap()
}

/// Offsets in seconds from 2025-02-25, spanning well past the March window.
fn arb_unlock() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        1 => Just(None),
        3 => (0i64..45 * 86_400).prop_map(Some),
    ]
}

fn arb_unlocks() -> impl Strategy<Value = AchievementUnlockSet> {
    prop::collection::vec(arb_unlock(), TOTAL as usize).prop_map(|offsets| {
        let base = ts(2025, 2, 25, 0, 0, 0);
        let mut set = AchievementUnlockSet::new(GameId(9), TOTAL as u32);
        for (i, offset) in offsets.into_iter().enumerate() {
            set.earned.insert(i as u64 + 1, offset.map(|s| base + Duration::seconds(s)));
        }
        set
    })
}

fn arb_definition() -> impl Strategy<Value = TrackDefinition> {
    (
        prop::collection::btree_set(1..=TOTAL, 0..4),
        prop::collection::btree_set(1..=TOTAL, 0..3),
    )
        .prop_map(|(progression, win): (BTreeSet<u64>, BTreeSet<u64>)| TrackDefinition {
            game_id: GameId(9),
            progression,
            win,
            total_achievements: TOTAL as u32,
        })
}

fn arb_track() -> impl Strategy<Value = Track> {
    prop_oneof![Just(Track::Main), Just(Track::Shadow)]
}

fn arb_tier() -> impl Strategy<Value = Tier> {
    prop_oneof![
        Just(Tier::None),
        Just(Tier::Participation),
        Just(Tier::Beaten),
        Just(Tier::Mastery),
    ]
}

fn all_earned_at(at: DateTime<Utc>) -> AchievementUnlockSet {
    (1..=TOTAL).fold(AchievementUnlockSet::new(GameId(9), TOTAL as u32), |set, id| {
        set.with(id, Some(at))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn shadow_never_reaches_mastery(unlocks in arb_unlocks(), def in arb_definition()) {
        let tier = classify(&unlocks, &def, &window(), Track::Shadow);
        prop_assert!(tier <= Tier::Beaten);
        prop_assert!(points_for(tier, Track::Shadow) <= 4);
    }

    #[test]
    fn classification_is_deterministic(unlocks in arb_unlocks(), def in arb_definition(), track in arb_track()) {
        let w = window();
        prop_assert_eq!(classify(&unlocks, &def, &w, track), classify(&unlocks, &def, &w, track));
    }

    #[test]
    fn nothing_in_window_means_none(unlocks in arb_unlocks(), def in arb_definition(), track in arb_track()) {
        let w = window();
        let facts = evaluate(&unlocks, &def, &w, track);
        let any_in_window = unlocks.earned_all_time().any(|(_, at)| w.contains(at));
        prop_assert_eq!(facts.tier == Tier::None, !any_in_window);
    }

    #[test]
    fn beaten_requires_qualifying_unlock_in_window(unlocks in arb_unlocks(), def in arb_definition()) {
        let facts = evaluate(&unlocks, &def, &window(), Track::Main);
        if facts.tier == Tier::Beaten {
            prop_assert!(facts.progression_met && facts.win_met && facts.qualifying_in_window);
        }
    }

    #[test]
    fn mastery_requires_every_achievement(unlocks in arb_unlocks(), def in arb_definition()) {
        if classify(&unlocks, &def, &window(), Track::Main) == Tier::Mastery {
            prop_assert_eq!(unlocks.earned_all_time().count() as u64, TOTAL);
        }
    }

    #[test]
    fn merged_tier_is_running_maximum(tiers in prop::collection::vec(arb_tier(), 1..16), track in arb_track()) {
        let store = MemoryProgressStore::new();
        let key = ProgressKey::new(UserId::new("p"), month(2025, 3), track);
        let mut best = Tier::None;
        for tier in tiers.into_iter().map(|t| t.capped_for(track)) {
            let out = store.merge_upsert(&key, tier, fixed_now()).unwrap();
            best = best.max(tier);
            prop_assert_eq!(out.stored, best);
            prop_assert_eq!(out.points, points_for(best, track));
        }
    }

    #[test]
    fn second_identical_merge_changes_nothing(unlocks in arb_unlocks(), def in arb_definition(), track in arb_track()) {
        let store = MemoryProgressStore::new();
        let key = ProgressKey::new(UserId::new("p"), month(2025, 3), track);
        let tier = classify(&unlocks, &def, &window(), track);
        let first = store.merge_upsert(&key, tier, fixed_now()).unwrap();
        let before = store.progress(&key).unwrap();
        let second = store.merge_upsert(&key, tier, fixed_now() + Duration::hours(1)).unwrap();
        prop_assert!(!second.upgraded());
        prop_assert_eq!(first.stored, second.stored);
        prop_assert_eq!(before, store.progress(&key).unwrap());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn rocks_store_keeps_running_maximum(tiers in prop::collection::vec(arb_tier(), 1..10)) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("progress")).unwrap();
        let key = ProgressKey::new(UserId::new("p"), month(2025, 3), Track::Main);
        let mut best = Tier::None;
        for tier in tiers {
            let out = store.merge_upsert(&key, tier, fixed_now()).unwrap();
            best = best.max(tier);
            prop_assert!(out.stored >= out.previous);
            prop_assert_eq!(out.stored, best);
        }
    }
}

#[test]
fn beaten_then_participation_stays_beaten() {
    let store = MemoryProgressStore::new();
    let key = ProgressKey::new(UserId::new("u"), month(2025, 2), Track::Main);
    store.merge_upsert(&key, Tier::Beaten, fixed_now()).unwrap();
    let out = store.merge_upsert(&key, Tier::Participation, fixed_now()).unwrap();
    assert_eq!((out.stored, out.points), (Tier::Beaten, 4));
}

#[test]
fn complete_game_outside_window_is_not_mastery() {
    let def = TrackDefinition {
        game_id: GameId(9),
        progression: Default::default(),
        win: Default::default(),
        total_achievements: TOTAL as u32,
    };
    let before = all_earned_at(ts(2025, 2, 10, 12, 0, 0));
    let after = all_earned_at(ts(2025, 4, 2, 12, 0, 0));
    assert_eq!(classify(&before, &def, &window(), Track::Main), Tier::None);
    assert_eq!(classify(&after, &def, &window(), Track::Main), Tier::None);
    let inside = all_earned_at(ts(2025, 3, 10, 12, 0, 0));
    assert_eq!(classify(&inside, &def, &window(), Track::Main), Tier::Mastery);
}

#[test]
fn grace_day_boundaries() {
    let w = window();
    // Grace day for March 2025 is February 28.
    assert!(w.contains(ts(2025, 2, 28, 0, 0, 0)));
    assert!(w.contains(ts(2025, 2, 28, 23, 59, 59)));
    assert!(!w.contains(ts(2025, 2, 27, 23, 59, 59)));
    assert!(w.contains(ts(2025, 3, 31, 23, 59, 59)));
    assert!(!w.contains(ts(2025, 4, 1, 0, 0, 0)));
    assert!(!w.contains(ts(2025, 4, 1, 0, 0, 1)));
}
