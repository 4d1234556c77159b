//! Tier to points conversion.

use crate::constants::{BEATEN_POINTS, MASTERY_POINTS, PARTICIPATION_POINTS};
use crate::types::{Tier, Track};

/// Points awarded for reaching `tier` on `track`.
///
/// The shadow cap is structural: classification never yields a shadow tier
/// above `Beaten`, so no separate clamp is applied here.
///
/// # Examples
///
/// ```
/// use questline_core::points::points_for;
/// use questline_core::types::{Tier, Track};
/// assert_eq!(points_for(Tier::Mastery, Track::Main), 7);
/// assert_eq!(points_for(Tier::Beaten, Track::Shadow), 4);
/// ```
pub fn points_for(tier: Tier, track: Track) -> u32 {
    debug_assert!(
        tier <= track.max_tier(),
        "{tier} is above the {track} track cap"
    );
    match tier {
        Tier::Mastery => MASTERY_POINTS,
        Tier::Beaten => BEATEN_POINTS,
        Tier::Participation => PARTICIPATION_POINTS,
        Tier::None => 0,
    }
}
