//! Row types and their mapping to and from sessions.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use tracing::instrument;

use crate::db::schema;
use crate::{Session, StorageError};
use boardroom_game::GameModule;

/// Milliseconds since the epoch, as stored.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Stored milliseconds back to a timestamp.
#[track_caller]
pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::new(format!("Timestamp out of range: {}", millis)))
}

/// One table, everything but its states.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Getters)]
#[diesel(table_name = schema::game_tables)]
#[diesel(treat_none_as_null = true)]
pub struct TableRow {
    id: String,
    game_id: String,
    #[getter(copy)]
    version: i64,
    status: String,
    mode: String,
    table_type: String,
    visibility: String,
    owner: String,
    options: String,
    #[getter(copy)]
    created: i64,
    #[getter(copy)]
    updated: i64,
    #[getter(copy)]
    started: Option<i64>,
    #[getter(copy)]
    ended: Option<i64>,
    #[getter(copy)]
    progress: i32,
    players: String,
    log: String,
    #[getter(copy)]
    current_state: Option<i64>,
}

impl TableRow {
    /// Encodes `session` as it will be stored under `version`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if a field cannot be encoded.
    #[instrument(skip(session), fields(table_id = %session.id()))]
    pub fn from_session<M: GameModule>(
        session: &Session<M>,
        version: u64,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            id: session.id().to_string(),
            game_id: session.module().id().to_string(),
            version: i64::try_from(version)
                .map_err(|_| StorageError::new(format!("Version out of range: {}", version)))?,
            status: session.status().to_string(),
            mode: session.mode().to_string(),
            table_type: session.table_type().to_string(),
            visibility: session.visibility().to_string(),
            owner: session.owner().to_string(),
            options: serde_json::to_string(session.options())?,
            created: to_millis(session.created()),
            updated: to_millis(session.updated()),
            started: session.started().map(to_millis),
            ended: session.ended().map(to_millis),
            progress: i32::from(session.progress()),
            players: serde_json::to_string(session.players())?,
            log: serde_json::to_string(session.log())?,
            current_state: session.current_state().map(|c| to_millis(c.timestamp())),
        })
    }
}

/// Index entry letting user queries find tables without decoding rosters.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::table_players)]
pub struct PlayerIndexRow {
    table_id: String,
    user_id: String,
    active: bool,
    updated: i64,
}

/// One live or historic state.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Getters, new)]
#[diesel(table_name = schema::table_states)]
pub struct StateRow {
    table_id: String,
    #[getter(copy)]
    timestamp: i64,
    #[getter(copy)]
    previous: Option<i64>,
    state: String,
    #[getter(copy)]
    expires: i64,
}
