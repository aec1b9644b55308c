//! Append-only table log.

use crate::UserId;
use boardroom_game::PlayerId;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// What a log entry records.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    /// Table created.
    Create,
    /// User invited; parameter is the invitee.
    Invite,
    /// Invitation accepted.
    Accept,
    /// Invitation rejected.
    Reject,
    /// User joined a public table; parameter is the user.
    Join,
    /// Game started.
    Start,
    /// Player received the turn.
    BeginTurn,
    /// Player lost the turn.
    EndTurn,
    /// Player skipped an optional obligation.
    Skip,
    /// Player left.
    Left,
    /// Player kicked; parameter is the kicked player.
    Kick,
    /// Player undid the last step.
    Undo,
    /// Owner reverted to an earlier state; parameter is the target time.
    Revert,
    /// Player proposed to stop.
    ProposedToLeave,
    /// Player agreed to stop.
    AgreedToLeave,
    /// Game ended.
    End,
    /// Module-defined event; first parameter is its kind.
    InGameEvent,
}

/// One immutable log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_new::new)]
pub struct LogEntry {
    #[getter(copy)]
    player_id: PlayerId,
    user_id: Option<UserId>,
    #[getter(copy)]
    timestamp: DateTime<Utc>,
    #[getter(copy)]
    log_type: LogType,
    parameters: Vec<String>,
}

/// Entries in strictly increasing timestamp order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Log(Vec<LogEntry>);

impl Log {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a stored log.
    pub(crate) fn from_entries(entries: Vec<LogEntry>) -> Self {
        Self(entries)
    }

    pub(crate) fn push(&mut self, entry: LogEntry) {
        debug_assert!(
            self.0
                .last()
                .is_none_or(|last| last.timestamp < entry.timestamp),
            "log timestamps must strictly increase"
        );
        self.0.push(entry);
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[LogEntry] {
        &self.0
    }

    /// Entries strictly after `since`.
    pub fn since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &LogEntry> {
        self.0.iter().filter(move |entry| entry.timestamp > since)
    }

    /// Entries of one type.
    pub fn of_type(&self, log_type: LogType) -> impl Iterator<Item = &LogEntry> {
        self.0.iter().filter(move |entry| entry.log_type == log_type)
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&LogEntry> {
        self.0.last()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
