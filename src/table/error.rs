//! Errors raised by table operations.

use crate::Status;
use derive_more::{Display, Error};
use tracing::instrument;

/// A command that is not allowed in the table's current situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, strum::IntoStaticStr)]
pub enum ValidationError {
    /// The roster is full.
    #[display("Table already has the maximum number of players")]
    ExceedsMaxPlayers,
    /// The user already has a seat.
    #[display("User is already on the roster")]
    AlreadyInvited,
    /// The user or player has no seat at this table.
    #[display("Not a player at this table")]
    NotPlayer,
    /// The player does not hold the turn.
    #[display("Not your turn")]
    NotYourTurn,
    /// Too few accepted players to start.
    #[display("Not enough accepted players to start")]
    MinPlayers,
    /// The invitation was already answered.
    #[display("Invitation already answered")]
    AlreadyResponded,
    /// The player is not an active participant.
    #[display("Player has not accepted")]
    NotAccepted,
    /// Only the owner may do this.
    #[display("Only the owner may do this")]
    MustBeOwner,
    /// The module has no automa.
    #[display("Game does not support computer players")]
    ComputerNotSupported,
    /// Abandoning would cut other players' game short.
    #[display("Table cannot be abandoned while others are still playing")]
    AbandonNotAllowed,
    /// Undo is disabled or impossible right now.
    #[display("Undo is not allowed")]
    UndoNotAllowed,
    /// Only practice tables can revert.
    #[display("Table is not in practice mode")]
    NotPracticeMode,
    /// The target cannot be kicked.
    #[display("Player cannot be kicked")]
    CannotKick,
    /// Nobody proposed to leave.
    #[display("Nobody proposed to leave")]
    NoProposalToLeave,
    /// The change does not fit the stored state.
    #[display("Change is not compatible with the table's state")]
    StateNotCompatible,
    /// The player is not a computer.
    #[display("Player is not a computer")]
    NotComputer,
    /// Only public tables can be joined without an invitation.
    #[display("Table is not public")]
    NotPublic,
}

impl std::error::Error for ValidationError {}

/// An operation attempted in the wrong lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error, derive_new::new)]
#[display("Cannot {operation} a table that is {status}")]
pub struct IllegalStateTransition {
    /// Attempted operation.
    pub operation: &'static str,
    /// Status at the time.
    pub status: Status,
}

/// Broken internal consistency, with the location that detected it.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Internal error: {} at {}:{}", message, file, line)]
pub struct InternalError {
    /// What went wrong.
    pub message: String,
    /// Line number where the error was raised.
    pub line: u32,
    /// Source file where the error was raised.
    pub file: &'static str,
}

impl InternalError {
    /// Creates an internal error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Error of a table operation, generic over the module's rule error.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum TableError<E> {
    /// Command not allowed.
    #[display("{_0}")]
    Validation(ValidationError),
    /// Wrong lifecycle status.
    #[display("{_0}")]
    IllegalState(IllegalStateTransition),
    /// The module rejected the move; passed through unchanged.
    #[display("{_0}")]
    Game(E),
    /// No retained history to step back to.
    #[display("History not available")]
    HistoryNotAvailable,
    /// Internal consistency defect.
    #[display("{_0}")]
    Internal(InternalError),
}

impl<E: std::error::Error + 'static> std::error::Error for TableError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TableError::Validation(e) => Some(e),
            TableError::IllegalState(e) => Some(e),
            TableError::Game(e) => Some(e),
            TableError::Internal(e) => Some(e),
            TableError::HistoryNotAvailable => None,
        }
    }
}

impl<E> From<ValidationError> for TableError<E> {
    fn from(err: ValidationError) -> Self {
        TableError::Validation(err)
    }
}

impl<E> From<IllegalStateTransition> for TableError<E> {
    fn from(err: IllegalStateTransition) -> Self {
        TableError::IllegalState(err)
    }
}

impl<E> From<InternalError> for TableError<E> {
    fn from(err: InternalError) -> Self {
        TableError::Internal(err)
    }
}
