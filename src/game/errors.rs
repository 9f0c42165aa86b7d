//! Synchronous error types.
//!
//! Two tiers of failure exist in the engine. Structural errors (joining a
//! started table, starting without enough players, casting with no hero) come
//! back synchronously as [`TableError`]. In-game rule violations never fail the
//! call; they surface as [`super::events::ErrorCode`] values on the offending
//! player's event stream.

use thiserror::Error;

/// Structural and setup errors returned directly from table operations.
#[derive(Debug, Eq, Error, PartialEq)]
pub enum TableError {
    #[error("table already started")]
    AlreadyStarted,
    #[error("table is full")]
    Full,
    #[error("not enough players")]
    NotEnoughPlayers,
    #[error("player already joined")]
    PlayerExists,
    #[error("player does not exist")]
    PlayerNotExists,
    #[error("no hero assigned this round")]
    NoHeroAssigned,
    #[error(transparent)]
    Skill(#[from] SkillError),
}

/// Failures a hero skill effect can report back to its caster.
#[derive(Debug, Eq, Error, PartialEq)]
pub enum SkillError {
    #[error("malformed skill payload")]
    MalformedPayload,
    #[error("target does not exist")]
    UnknownTarget,
    #[error("can not cast on yourself")]
    CannotTargetSelf,
}
