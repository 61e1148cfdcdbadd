use thiserror::Error;

/// Errors surfaced to a caller of this crate.
///
/// Agent-level failures (timeout, panic, malformed output) are never represented here; they
/// are always recovered locally and only show up as `tracing` events and fallback-flagged
/// [`mafia_game_lib::Event`]s. The only paths that reach a caller as `Err` are setup-time
/// configuration problems and the terminal invariant-violation abort.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid game config: {0:?}")]
    InvalidConfig { offending_keys: Vec<String> },
    #[error("not enough players: {0}")]
    NotEnoughPlayers(String),
    #[error("{player:?} is not a valid player id")]
    InvalidPlayerId { player: mafia_game_lib::PlayerId },
    #[error("game has already ended")]
    GameAlreadyEnded,
    #[error("state invariant violated: {detail}")]
    InvariantViolation { detail: String },
}
