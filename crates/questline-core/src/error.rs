//! Error types for Questline.
use thiserror::Error;

/// Caller input errors. Rejected immediately, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("malformed month key {0:?}: expected YYYY-MM")] MalformedMonthKey(String),
    #[error("month key out of range: {year}-{month}")] MonthOutOfRange { year: i32, month: u32 },
    #[error("missing definition field: {0}")] MissingField(&'static str),
    #[error("invalid definition: {0}")] InvalidDefinition(String),
    #[error("challenge already defined for {0}")] ChallengeExists(String),
    #[error("no challenge defined for {0}")] UnknownChallenge(String),
    #[error("unknown member: {0}")] UnknownMember(String),
    #[error("member already registered: {0}")] MemberExists(String),
}

/// Failures reported by the achievement data source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("transport: {0}")] Transport(String),
    #[error("timeout")] Timeout,
    #[error("rate limited")] RateLimited,
    #[error("upstream status {0}")] Upstream(u16),
    #[error("not found: {0}")] NotFound(String),
    #[error("unauthorized")] Unauthorized,
    #[error("malformed response: {0}")] Malformed(String),
}

impl SourceError {
    /// Whether the failure may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout | Self::RateLimited | Self::Upstream(_)
        )
    }
}

/// Progress store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgressError {
    #[error("invariant violation: {0}")] InvariantViolation(String),
    #[error("corrupt record for {key}: {reason}")] CorruptRecord { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum QuestlineError {
    #[error(transparent)] Input(#[from] InputError),
    #[error(transparent)] Source(#[from] SourceError),
    #[error(transparent)] Progress(#[from] ProgressError),
    #[error("storage: {0}")] Storage(String),
}

impl QuestlineError {
    /// Whether the error is a transient data source failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Source(e) if e.is_transient())
    }
}
