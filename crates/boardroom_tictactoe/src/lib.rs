//! Tic-tac-toe rule module for the boardroom session engine.
//!
//! Each turn the player holding the move owes one `Place` action, declared
//! through an [`boardroom_game::ActionSequencer`]. A computer opponent plays
//! win, block, center, then a random free square.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod board;
mod error;
mod module;
pub mod rules;
mod state;

pub use board::{Board, Mark, Position, Square};
pub use error::TicTacToeError;
pub use module::{TIME_LIMIT_OPTION, TicTacToe};
pub use state::{GameStatus, MoveKind, TicTacToeAction, TicTacToeState};
