//! Domain events raised by table operations.

use crate::{TableId, UserId};
use boardroom_game::PlayerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something observers of a table may want to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TableEvent {
    /// Table created.
    Created {
        /// Table.
        table_id: TableId,
    },
    /// User invited.
    Invited {
        /// Table.
        table_id: TableId,
        /// Invitee.
        user_id: UserId,
    },
    /// Invitation accepted.
    Accepted {
        /// Table.
        table_id: TableId,
        /// Accepting user.
        user_id: UserId,
    },
    /// Invitation rejected.
    Rejected {
        /// Table.
        table_id: TableId,
        /// Rejecting user.
        user_id: UserId,
    },
    /// User joined a public table.
    Joined {
        /// Table.
        table_id: TableId,
        /// Joining user.
        user_id: UserId,
    },
    /// Table made public or private.
    VisibilityChanged {
        /// Table.
        table_id: TableId,
    },
    /// Game started.
    Started {
        /// Table.
        table_id: TableId,
    },
    /// Game state moved on without ending.
    StateChanged {
        /// Table.
        table_id: TableId,
    },
    /// Game ended.
    Ended {
        /// Table.
        table_id: TableId,
    },
    /// User left.
    Left {
        /// Table.
        table_id: TableId,
        /// Leaving user.
        user_id: UserId,
    },
    /// Table abandoned.
    Abandoned {
        /// Table.
        table_id: TableId,
    },
    /// Player kicked.
    Kicked {
        /// Table.
        table_id: TableId,
        /// Kicked player.
        player_id: PlayerId,
    },
    /// User proposed to stop playing.
    ProposedToLeave {
        /// Table.
        table_id: TableId,
        /// Proposing user.
        user_id: UserId,
    },
    /// User agreed to stop playing.
    AgreedToLeave {
        /// Table.
        table_id: TableId,
        /// Agreeing user.
        user_id: UserId,
    },
    /// Options replaced.
    OptionsChanged {
        /// Table.
        table_id: TableId,
    },
    /// Computer seat added.
    ComputerAdded {
        /// Table.
        table_id: TableId,
        /// New computer player.
        player_id: PlayerId,
    },
    /// Ownership moved after the owner left.
    ChangedOwner {
        /// Table.
        table_id: TableId,
        /// New owner.
        user_id: UserId,
    },
    /// Player received the turn.
    TurnBegan {
        /// Table.
        table_id: TableId,
        /// Player.
        player_id: PlayerId,
        /// Turn deadline.
        limit: Option<DateTime<Utc>>,
    },
    /// Player lost the turn.
    TurnEnded {
        /// Table.
        table_id: TableId,
        /// Player.
        player_id: PlayerId,
    },
}

impl TableEvent {
    /// Table the event belongs to.
    pub fn table_id(&self) -> TableId {
        match self {
            TableEvent::Created { table_id }
            | TableEvent::Invited { table_id, .. }
            | TableEvent::Accepted { table_id, .. }
            | TableEvent::Rejected { table_id, .. }
            | TableEvent::Joined { table_id, .. }
            | TableEvent::VisibilityChanged { table_id }
            | TableEvent::Started { table_id }
            | TableEvent::StateChanged { table_id }
            | TableEvent::Ended { table_id }
            | TableEvent::Left { table_id, .. }
            | TableEvent::Abandoned { table_id }
            | TableEvent::Kicked { table_id, .. }
            | TableEvent::ProposedToLeave { table_id, .. }
            | TableEvent::AgreedToLeave { table_id, .. }
            | TableEvent::OptionsChanged { table_id }
            | TableEvent::ComputerAdded { table_id, .. }
            | TableEvent::ChangedOwner { table_id, .. }
            | TableEvent::TurnBegan { table_id, .. }
            | TableEvent::TurnEnded { table_id, .. } => *table_id,
        }
    }

    /// Variant name, for logs.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}
