//! Seats at a table.

use crate::UserId;
use boardroom_game::{PlayerColor, PlayerId, PlayerKind};
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a player stands with respect to the table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlayerStatus {
    /// Invited, no answer yet.
    Invited,
    /// Playing.
    Accepted,
    /// Declined the invitation.
    Rejected,
    /// Left or was kicked.
    Left,
    /// Playing, and asked everyone to stop.
    ProposedToLeave,
    /// Playing, and agreed to stop.
    AgreedToLeave,
}

impl PlayerStatus {
    /// Still taking part in the game.
    pub fn is_playing(self) -> bool {
        matches!(
            self,
            PlayerStatus::Accepted | PlayerStatus::ProposedToLeave | PlayerStatus::AgreedToLeave
        )
    }
}

/// One seat in a table's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct Player {
    #[getter(copy)]
    id: PlayerId,
    user_id: Option<UserId>,
    #[getter(copy)]
    kind: PlayerKind,
    #[getter(copy)]
    status: PlayerStatus,
    #[getter(copy)]
    color: Option<PlayerColor>,
    #[getter(copy)]
    turn: bool,
    #[getter(copy)]
    turn_limit: Option<DateTime<Utc>>,
    #[getter(copy)]
    score: Option<i32>,
    #[getter(copy)]
    winner: bool,
    #[getter(copy)]
    created: DateTime<Utc>,
    #[getter(copy)]
    updated: DateTime<Utc>,
}

impl Player {
    fn seat(
        user_id: Option<UserId>,
        kind: PlayerKind,
        status: PlayerStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PlayerId::generate(),
            user_id,
            kind,
            status,
            color: None,
            turn: false,
            turn_limit: None,
            score: None,
            winner: false,
            created: now,
            updated: now,
        }
    }

    /// Human seat that already accepted, used for the owner.
    pub(crate) fn accepted(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self::seat(Some(user_id), PlayerKind::Human, PlayerStatus::Accepted, now)
    }

    /// Human seat awaiting an answer.
    pub(crate) fn invited(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self::seat(Some(user_id), PlayerKind::Human, PlayerStatus::Invited, now)
    }

    /// Computer seat.
    pub(crate) fn computer(now: DateTime<Utc>) -> Self {
        Self::seat(None, PlayerKind::Computer, PlayerStatus::Accepted, now)
    }

    /// Whether the player is still in the game.
    pub fn is_playing(&self) -> bool {
        self.status.is_playing()
    }

    /// Whether a user sits behind this seat.
    pub fn is_human(&self) -> bool {
        self.kind == PlayerKind::Human
    }

    /// Whether the module's automa plays this seat.
    pub fn is_computer(&self) -> bool {
        self.kind == PlayerKind::Computer
    }

    /// Whether this seat belongs to `user`.
    pub fn is_user(&self, user: &UserId) -> bool {
        self.user_id.as_ref() == Some(user)
    }

    /// Whether the player held the turn past its deadline.
    pub fn is_turn_limit_exceeded(&self, now: DateTime<Utc>) -> bool {
        self.turn && self.turn_limit.is_some_and(|limit| limit < now)
    }

    pub(crate) fn set_status(&mut self, status: PlayerStatus, now: DateTime<Utc>) {
        debug!(player_id = %self.id, from = %self.status, to = %status, "Player status changed");
        self.status = status;
        self.updated = now;
    }

    pub(crate) fn assign_color(&mut self, color: PlayerColor, now: DateTime<Utc>) {
        self.color = Some(color);
        self.updated = now;
    }

    pub(crate) fn begin_turn(&mut self, limit: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.turn = true;
        self.turn_limit = limit;
        self.updated = now;
    }

    pub(crate) fn end_turn(&mut self, now: DateTime<Utc>) {
        self.turn = false;
        self.turn_limit = None;
        self.updated = now;
    }

    pub(crate) fn assign_score(&mut self, score: Option<i32>, winner: bool, now: DateTime<Utc>) {
        if self.score != score || self.winner != winner {
            self.score = score;
            self.winner = winner;
            self.updated = now;
        }
    }
}
