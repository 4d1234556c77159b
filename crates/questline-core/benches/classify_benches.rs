//! Criterion benchmarks for the pure award pipeline.
//!
//! Covers: window resolution and classification of a large game.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use questline_core::classify::classify;
use questline_core::types::{AchievementUnlockSet, GameId, MonthKey, Track, TrackDefinition};
use questline_core::window::EligibleWindow;

fn bench_window(c: &mut Criterion) {
    let month = MonthKey::new(2025, 2).unwrap();
    c.bench_function("window_resolve", |b| {
        b.iter(|| EligibleWindow::resolve(black_box(month)))
    });
}

fn bench_classify(c: &mut Criterion) {
    let window = EligibleWindow::resolve(MonthKey::new(2025, 2).unwrap()).unwrap();
    let start = Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap();

    // 400-achievement game, three quarters earned across the month boundary.
    let mut unlocks = AchievementUnlockSet::new(GameId(1), 400);
    for id in 1..=400u64 {
        let at = (id % 4 != 0).then(|| start + Duration::hours(id as i64));
        unlocks.earned.insert(id, at);
    }
    let definition = TrackDefinition {
        game_id: GameId(1),
        progression: (1..=40).collect(),
        win: [399, 400].into_iter().collect(),
        total_achievements: 400,
    };

    c.bench_function("classify_400", |b| {
        b.iter(|| classify(black_box(&unlocks), &definition, &window, Track::Main))
    });
}

criterion_group!(benches, bench_window, bench_classify);
criterion_main!(benches);
