//! Award and pacing constants.

/// Points for a mastered track (every achievement, at least one in window).
pub const MASTERY_POINTS: u32 = 7;

/// Points for a beaten track.
pub const BEATEN_POINTS: u32 = 4;

/// Points for participating (any unlock inside the window).
pub const PARTICIPATION_POINTS: u32 = 1;

/// Highest number of points the shadow track can award.
///
/// The shadow track tops out at `Beaten`, so this equals [`BEATEN_POINTS`].
pub const SHADOW_POINTS_CAP: u32 = BEATEN_POINTS;

/// Smallest year accepted in a month key.
pub const MIN_MONTH_KEY_YEAR: i32 = 1970;

/// Largest year accepted in a month key (`YYYY` is four digits).
pub const MAX_MONTH_KEY_YEAR: i32 = 9999;

/// Default delay between two calls to the achievement data source, in milliseconds.
pub const DEFAULT_CALL_DELAY_MS: u64 = 1_500;

/// Default delay between two users in a batch run, in milliseconds.
pub const DEFAULT_USER_DELAY_MS: u64 = 2_000;

/// Default number of attempts for a data source call (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base backoff after a transient data source failure, in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;

/// Upper bound on a single backoff sleep, in milliseconds.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Upper bound on the random jitter added to a backoff sleep, in milliseconds.
pub const DEFAULT_BACKOFF_JITTER_MS: u64 = 250;
