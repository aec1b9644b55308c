//! Rule violations.

use crate::{MoveKind, Position};
use boardroom_game::{PlayerId, SequenceError};

/// Error raised by a tic-tac-toe move.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum TicTacToeError {
    /// The move does not fit the turn's obligations.
    #[display("{_0}")]
    Sequence(SequenceError<MoveKind>),

    /// The square is already occupied.
    #[display("Square {_0} is already occupied")]
    SquareOccupied(Position),

    /// The game is already over.
    #[display("Game is already over")]
    GameOver,

    /// The player does not hold the turn.
    #[display("It's not {_0}'s turn")]
    NotYourTurn(PlayerId),

    /// The player is not seated at this board.
    #[display("{_0} is not seated at this board")]
    UnknownPlayer(PlayerId),

    /// A mark must be placed before the turn can end.
    #[display("Turn cannot end before a mark is placed")]
    TurnNotFinished,

    /// The game needs one white and one black seat.
    #[display("Expected one white and one black seat, got {_0} seats")]
    InvalidSeating(usize),
}

impl std::error::Error for TicTacToeError {}

impl From<SequenceError<MoveKind>> for TicTacToeError {
    fn from(err: SequenceError<MoveKind>) -> Self {
        Self::Sequence(err)
    }
}
