//! Binary key layout for the column families.
//!
//! User-scoped keys start with a length-prefixed user id so a prefix scan
//! returns exactly one user's rows. Months encode as big-endian year then
//! month so rows iterate chronologically.
//!
//! ```text
//! progress:   u16 len | user | u16 year | u8 month | u8 track
//! processed:  u16 len | user | u16 year | u8 month
//! challenges: u16 year | u8 month
//! members:    user
//! ```

use questline_core::error::QuestlineError;
use questline_core::types::{MonthKey, Track, UserId};

const MONTH_LEN: usize = 3;

/// Length-prefixed user id, the common prefix of all of a user's rows.
pub fn user_prefix(user: &UserId) -> Result<Vec<u8>, QuestlineError> {
    let bytes = user.as_str().as_bytes();
    let len = u16::try_from(bytes.len())
        .map_err(|_| QuestlineError::Storage(format!("user id too long: {} bytes", bytes.len())))?;
    let mut key = Vec::with_capacity(2 + bytes.len() + MONTH_LEN + 1);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(bytes);
    Ok(key)
}

/// Chronologically ordered month bytes.
pub fn month_key(month: MonthKey) -> [u8; MONTH_LEN] {
    // Month keys are bounded to four-digit years, so the year fits in u16.
    let year = month.year() as u16;
    let [hi, lo] = year.to_be_bytes();
    [hi, lo, month.month() as u8]
}

pub fn decode_month(bytes: &[u8]) -> Result<MonthKey, QuestlineError> {
    let [hi, lo, m] = <[u8; MONTH_LEN]>::try_from(bytes)
        .map_err(|_| QuestlineError::Storage(format!("bad month key length {}", bytes.len())))?;
    Ok(MonthKey::new(i32::from(u16::from_be_bytes([hi, lo])), u32::from(m))?)
}

fn track_byte(track: Track) -> u8 {
    match track {
        Track::Main => 0,
        Track::Shadow => 1,
    }
}

fn decode_track(byte: u8) -> Result<Track, QuestlineError> {
    match byte {
        0 => Ok(Track::Main),
        1 => Ok(Track::Shadow),
        other => Err(QuestlineError::Storage(format!("bad track byte {other}"))),
    }
}

pub fn progress_key(user: &UserId, month: MonthKey, track: Track) -> Result<Vec<u8>, QuestlineError> {
    let mut key = user_prefix(user)?;
    key.extend_from_slice(&month_key(month));
    key.push(track_byte(track));
    Ok(key)
}

/// Split the month and track off a progress key whose user prefix has length `prefix_len`.
pub fn decode_progress_suffix(
    key: &[u8],
    prefix_len: usize,
) -> Result<(MonthKey, Track), QuestlineError> {
    if key.len() != prefix_len + MONTH_LEN + 1 {
        return Err(QuestlineError::Storage(format!(
            "bad progress key length {}",
            key.len()
        )));
    }
    let month = decode_month(&key[prefix_len..prefix_len + MONTH_LEN])?;
    let track = decode_track(key[prefix_len + MONTH_LEN])?;
    Ok((month, track))
}

pub fn processed_key(user: &UserId, month: MonthKey) -> Result<Vec<u8>, QuestlineError> {
    let mut key = user_prefix(user)?;
    key.extend_from_slice(&month_key(month));
    Ok(key)
}
