//! The contract every rule module satisfies.
//!
//! A [`GameModule`] is a stateless factory that knows a game's seating limits
//! and produces its initial [`GameState`]. The state value is what the
//! session engine snapshots into history, so it must be cheap to clone and
//! serializable. All randomness comes from the generator the engine hands in,
//! which keeps a replay from the same seed identical.

use crate::{Options, PlayerColor, PlayerId, Seat};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

/// Something that happened inside the game worth recording in the table log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters, derive_new::new)]
pub struct InGameEvent {
    /// Player the event is about.
    #[getter(copy)]
    player: PlayerId,
    /// Module-defined event name.
    kind: String,
    /// Free-form parameters, already rendered as strings.
    parameters: Vec<String>,
}

/// Live state of one game in progress.
pub trait GameState: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Move payload submitted by players.
    type Action: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Rule violation. Sequencing failures convert into it.
    type Error: std::error::Error + Clone + PartialEq + Send + Sync + 'static;

    /// Applies a move for `player`.
    fn perform(
        &mut self,
        player: PlayerId,
        action: Self::Action,
        rng: &mut dyn RngCore,
    ) -> Result<(), Self::Error>;

    /// Drops the player's current optional obligation.
    fn skip(&mut self, player: PlayerId, rng: &mut dyn RngCore) -> Result<(), Self::Error>;

    /// Closes the player's turn.
    fn end_turn(&mut self, player: PlayerId, rng: &mut dyn RngCore) -> Result<(), Self::Error>;

    /// Removes a player from the running game.
    fn leave(&mut self, player: PlayerId, rng: &mut dyn RngCore) -> Result<(), Self::Error>;

    /// Whether the game has reached its end.
    fn is_ended(&self) -> bool;

    /// Players whose turn it is.
    fn current_players(&self) -> Vec<PlayerId>;

    /// Score for `player`, if the game keeps one.
    fn score(&self, player: PlayerId) -> Option<i32>;

    /// Winning players. Meaningful once ended.
    fn winners(&self) -> Vec<PlayerId>;

    /// Whether stepping back from this state is allowed.
    fn can_undo(&self) -> bool;

    /// Rough completion percentage, 0 to 100.
    fn progress(&self) -> u8 {
        0
    }

    /// Takes the in-game events raised since the last drain.
    fn drain_events(&mut self) -> Vec<InGameEvent> {
        Vec::new()
    }
}

/// Move payload of a module's state.
pub type ModuleAction<M> = <<M as GameModule>::State as GameState>::Action;

/// Rule error of a module's state.
pub type ModuleError<M> = <<M as GameModule>::State as GameState>::Error;

/// A pluggable game.
pub trait GameModule: Debug + Send + Sync + 'static {
    /// State produced by [`GameModule::start`].
    type State: GameState;

    /// Catalog key, stable across releases.
    fn id(&self) -> &str;

    /// Fewest accepted players needed to start.
    fn min_players(&self) -> usize;

    /// Most players a table may seat.
    fn max_players(&self) -> usize;

    /// Colors handed out at start. Must not be shorter than `max_players`.
    fn supported_colors(&self) -> Vec<PlayerColor>;

    /// How long a player may hold the turn.
    fn time_limit(&self, options: &Options) -> Duration;

    /// Whether [`GameModule::execute_automa`] is implemented.
    fn has_automa(&self) -> bool {
        false
    }

    /// Builds the initial state for the given seats.
    fn start(
        &self,
        seats: &[Seat],
        options: &Options,
        rng: &mut dyn RngCore,
    ) -> Result<Self::State, ModuleError<Self>>;

    /// Plays the turn of a computer player.
    fn execute_automa(
        &self,
        state: &mut Self::State,
        player: PlayerId,
        rng: &mut dyn RngCore,
    ) -> Result<(), ModuleError<Self>>;
}
