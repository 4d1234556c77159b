//! Engine errors.
use questline_core::error::{InputError, QuestlineError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)] Input(#[from] InputError),
    /// Live recomputation failed; the cause is logged, not returned.
    #[error("could not update challenge progress right now, try again later")] LiveRecomputeFailed,
    #[error(transparent)] Questline(#[from] QuestlineError),
}
