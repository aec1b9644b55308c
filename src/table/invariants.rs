//! First-class invariants for tables.
//!
//! Every committed command is checked against [`SessionInvariants`] in debug
//! builds. A violation means a bug in the engine, not a bad command.

use crate::{Session, Status};
use boardroom_game::GameModule;
use std::collections::HashSet;

/// A logical property that must hold for a given state.
pub trait Invariant<S> {
    /// Checks if the invariant holds for the given state.
    fn holds(state: &S) -> bool;

    /// Human-readable description of the invariant.
    fn description() -> &'static str;
}

/// Violation of an invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub description: String,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// A set of invariants that can be checked together.
pub trait InvariantSet<S> {
    /// Checks all invariants in the set, collecting every violation.
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>>;
}

impl<S, I1, I2, I3> InvariantSet<S> for (I1, I2, I3)
where
    I1: Invariant<S>,
    I2: Invariant<S>,
    I3: Invariant<S>,
{
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>> {
        let mut violations = Vec::new();

        if !I1::holds(state) {
            violations.push(InvariantViolation::new(I1::description()));
        }

        if !I2::holds(state) {
            violations.push(InvariantViolation::new(I2::description()));
        }

        if !I3::holds(state) {
            violations.push(InvariantViolation::new(I3::description()));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

impl<S, I1, I2> InvariantSet<S> for (I1, I2)
where
    I1: Invariant<S>,
    I2: Invariant<S>,
{
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>> {
        let mut violations = Vec::new();

        if !I1::holds(state) {
            violations.push(InvariantViolation::new(I1::description()));
        }

        if !I2::holds(state) {
            violations.push(InvariantViolation::new(I2::description()));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// No color is assigned to two players.
#[derive(Debug, Clone, Copy)]
pub struct DistinctColorsInvariant;

impl<M: GameModule> Invariant<Session<M>> for DistinctColorsInvariant {
    fn holds(session: &Session<M>) -> bool {
        let mut seen = HashSet::new();
        session
            .players()
            .iter()
            .filter_map(|p| p.color())
            .all(|color| seen.insert(color))
    }

    fn description() -> &'static str {
        "Each color belongs to at most one player"
    }
}

/// A new table has no game state; a started or ended one has.
#[derive(Debug, Clone, Copy)]
pub struct StateMatchesStatusInvariant;

impl<M: GameModule> Invariant<Session<M>> for StateMatchesStatusInvariant {
    fn holds(session: &Session<M>) -> bool {
        match session.status() {
            Status::New => session.state().is_none() && session.started().is_none(),
            Status::Started => session.state().is_some() && session.started().is_some(),
            Status::Ended => session.state().is_some() && session.ended().is_some(),
            Status::Abandoned => true,
        }
    }

    fn description() -> &'static str {
        "Game state exists exactly when the game has started"
    }
}

/// Only playing players of a started table hold the turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnsOnlyWhileStartedInvariant;

impl<M: GameModule> Invariant<Session<M>> for TurnsOnlyWhileStartedInvariant {
    fn holds(session: &Session<M>) -> bool {
        session
            .players()
            .iter()
            .filter(|p| p.turn())
            .all(|p| session.status() == Status::Started && p.is_playing())
    }

    fn description() -> &'static str {
        "Turns are held only by playing players of a started table"
    }
}

/// All table invariants as a composable set.
pub type SessionInvariants = (
    DistinctColorsInvariant,
    StateMatchesStatusInvariant,
    TurnsOnlyWhileStartedInvariant,
);
