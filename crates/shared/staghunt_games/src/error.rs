use staghunt::mind::OracleError;
use thiserror::Error;

use crate::maze::{Cell, Move};
use crate::record::StoreError;

/// Everything that can go wrong while playing a turn or a session.
///
/// Only [`GameError::InvalidMove`] is recoverable: the turn re-requests input
/// and nothing has been mutated. Every other variant ends the current episode;
/// turns committed before the failure stay recorded.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("move {attempted} is not a legal exit from {at} (legal: {legal:?})")]
    InvalidMove {
        at: Cell,
        attempted: Move,
        legal: Vec<Move>,
    },

    #[error("no path from {from} to root {root}")]
    NoPath { from: Cell, root: Cell },

    #[error("cell ({row}, {col}) is outside the {rows}x{cols} grid")]
    OutOfBounds {
        row: i64,
        col: i64,
        rows: u32,
        cols: u32,
    },

    #[error("mental model failed: {0}")]
    OracleState(#[from] OracleError),

    #[error("input closed or timed out before a move was made")]
    Cancelled,

    /// A turn was requested after the episode had already ended.
    #[error("episode is over: {0}")]
    EpisodeOver(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("episode store failed: {0}")]
    Store(#[from] StoreError),
}

impl GameError {
    /// A setting rejected before play, e.g. a bad tier or prior.
    pub fn invalid_config(err: impl std::fmt::Display) -> Self {
        GameError::InvalidConfig(err.to_string())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, GameError::InvalidMove { .. })
    }

    /// Errors after which the rest of the session cannot sensibly continue.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            GameError::Cancelled
                | GameError::OracleState(_)
                | GameError::InvalidConfig(_)
                | GameError::Store(_)
        )
    }
}
