//! Game-facing API for boardroom rule modules.
//!
//! Rule modules depend on this crate only. It provides:
//!
//! - **Sequencing**: [`ActionSequencer`], a stack of [`PossibleAction`] frames
//!   declaring what a player must, may or may repeatedly do before a turn
//!   resolves.
//! - **Contract**: [`GameModule`] and [`GameState`], the fixed interface the
//!   session engine drives.
//! - **Shared types**: player identity, colors, seats and table options.
//!
//! # Example
//!
//! ```
//! use boardroom_game::{ActionSequencer, PossibleAction};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Kind { Draw, Discard }
//!
//! let mut seq = ActionSequencer::initial([
//!     PossibleAction::Mandatory(Kind::Draw),
//!     PossibleAction::repeat(0, 3, Kind::Discard),
//! ]);
//!
//! seq.perform(Kind::Draw).unwrap();
//! seq.perform(Kind::Discard).unwrap();
//! seq.skip().unwrap();
//! assert!(seq.is_empty());
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod module;
mod options;
mod player;
mod sequencer;

pub use module::{GameModule, GameState, InGameEvent, ModuleAction, ModuleError};
pub use options::Options;
pub use player::{PlayerColor, PlayerId, PlayerKind, Seat};
pub use sequencer::{ActionSequencer, PossibleAction, SequenceError};
