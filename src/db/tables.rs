//! SQLite table store.

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::db::models::{PlayerIndexRow, StateRow, TableRow, from_millis, to_millis};
use crate::db::schema::{game_tables, table_players, table_states};
use crate::table::RestoredSession;
use crate::{
    CurrentState, HISTORY_RETENTION, HistoricState, HistoryRef, Log, LogEntry, Mode,
    ModuleCatalog, Player, RepositoryError, Session, Status, StorageError, TableId, TableType,
    Tables, UserId, Visibility,
};
use boardroom_game::{GameModule, Options};

/// Schema migrations compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Tables stored in a SQLite file, one connection per call.
///
/// Historic states are not loaded with the table. Each back-pointer is a
/// lazy [`HistoryRef`] that reads its row on first access.
#[derive(Debug)]
pub struct SqliteTables<M: GameModule> {
    db_path: String,
    catalog: ModuleCatalog<M>,
}

impl<M: GameModule> Clone for SqliteTables<M> {
    fn clone(&self) -> Self {
        Self {
            db_path: self.db_path.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

impl<M: GameModule> SqliteTables<M> {
    /// Creates a store for the database at the given path.
    ///
    /// Loaded tables get their module from `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the path is empty.
    #[instrument(skip(db_path, catalog), fields(db_path = %db_path))]
    pub fn new(db_path: String, catalog: ModuleCatalog<M>) -> Result<Self, StorageError> {
        if db_path.is_empty() {
            return Err(StorageError::new("Database path is empty"));
        }
        info!(path = %db_path, "Creating SqliteTables");
        Ok(Self { db_path, catalog })
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the database cannot be opened or migrated.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StorageError::new(format!("Migrations failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(())
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, StorageError> {
        debug!(path = %self.db_path, "Establishing connection");
        SqliteConnection::establish(&self.db_path).map_err(|e| {
            StorageError::new(format!("Failed to connect to '{}': {}", self.db_path, e))
        })
    }

    fn load(&self, conn: &mut SqliteConnection, id: &str) -> Result<Session<M>, RepositoryError> {
        let row = game_tables::table
            .find(id)
            .select(TableRow::as_select())
            .first(conn)
            .optional()?;
        let Some(row) = row else {
            let table_id = id
                .parse::<TableId>()
                .map_err(|e| StorageError::new(format!("Invalid table id '{}': {}", id, e)))?;
            return Err(RepositoryError::NotFound(table_id));
        };
        self.restore(conn, row)
    }

    fn restore(
        &self,
        conn: &mut SqliteConnection,
        row: TableRow,
    ) -> Result<Session<M>, RepositoryError> {
        let module = self
            .catalog
            .get(row.game_id())
            .ok_or_else(|| RepositoryError::UnknownGame(row.game_id().clone()))?;

        let id = row
            .id()
            .parse::<TableId>()
            .map_err(|e| StorageError::new(format!("Invalid table id '{}': {}", row.id(), e)))?;
        let status = row
            .status()
            .parse::<Status>()
            .map_err(|e| StorageError::new(format!("Invalid status '{}': {}", row.status(), e)))?;
        let mode = row
            .mode()
            .parse::<Mode>()
            .map_err(|e| StorageError::new(format!("Invalid mode '{}': {}", row.mode(), e)))?;
        let table_type = row.table_type().parse::<TableType>().map_err(|e| {
            StorageError::new(format!("Invalid table type '{}': {}", row.table_type(), e))
        })?;
        let visibility = row.visibility().parse::<Visibility>().map_err(|e| {
            StorageError::new(format!("Invalid visibility '{}': {}", row.visibility(), e))
        })?;
        let version = u64::try_from(row.version())
            .map_err(|_| StorageError::new(format!("Invalid version {}", row.version())))?;
        let progress = u8::try_from(row.progress())
            .map_err(|_| StorageError::new(format!("Invalid progress {}", row.progress())))?;

        let options: Options = serde_json::from_str(row.options())?;
        let players: Vec<Player> = serde_json::from_str(row.players())?;
        let entries: Vec<LogEntry> = serde_json::from_str(row.log())?;

        let state = match row.current_state() {
            Some(ts) => {
                let state_row = table_states::table
                    .find((row.id().as_str(), ts))
                    .select(StateRow::as_select())
                    .first(conn)?;
                let value: M::State = serde_json::from_str(state_row.state())?;
                let previous = state_row
                    .previous()
                    .map(|p| lazy_history(self.db_path.clone(), row.id().clone(), p))
                    .transpose()?;
                Some(CurrentState::restored(value, from_millis(ts)?, previous))
            }
            None => None,
        };

        Ok(Session::restore(RestoredSession {
            id,
            module,
            version,
            status,
            mode,
            table_type,
            visibility,
            owner: UserId::new(row.owner().clone()),
            options,
            created: from_millis(row.created())?,
            updated: from_millis(row.updated())?,
            started: row.started().map(from_millis).transpose()?,
            ended: row.ended().map(from_millis).transpose()?,
            progress,
            log: Log::from_entries(entries),
            players,
            state,
        }))
    }

    /// Writes the live state and any in-memory history not stored yet.
    fn write_states(
        conn: &mut SqliteConnection,
        session: &Session<M>,
    ) -> Result<(), RepositoryError> {
        let Some(current) = session.current_state() else {
            return Ok(());
        };
        if !current.is_changed() {
            return Ok(());
        }

        let table_id = session.id().to_string();
        let row = StateRow::new(
            table_id.clone(),
            to_millis(current.timestamp()),
            current.previous().map(|p| to_millis(p.timestamp())),
            serde_json::to_string(current.state())?,
            to_millis(current.timestamp() + HISTORY_RETENTION),
        );
        diesel::insert_or_ignore_into(table_states::table)
            .values(&row)
            .execute(conn)?;

        let mut cursor = current.previous().cloned();
        while let Some(reference) = cursor.filter(HistoryRef::is_resolved) {
            let node = reference.get()?;
            let row = StateRow::new(
                table_id.clone(),
                to_millis(node.timestamp()),
                node.previous().map(|p| to_millis(p.timestamp())),
                serde_json::to_string(node.state())?,
                to_millis(node.expires()),
            );
            let inserted = diesel::insert_or_ignore_into(table_states::table)
                .values(&row)
                .execute(conn)?;
            if inserted == 0 {
                break;
            }
            debug!(timestamp = %node.timestamp(), "Historic state written");
            cursor = node.previous().cloned();
        }
        Ok(())
    }

    /// Rewrites the user index of one table.
    fn write_index(
        conn: &mut SqliteConnection,
        session: &Session<M>,
    ) -> Result<(), RepositoryError> {
        let table_id = session.id().to_string();
        diesel::delete(table_players::table.filter(table_players::table_id.eq(&table_id)))
            .execute(conn)?;

        let updated = to_millis(session.updated());
        let rows: Vec<PlayerIndexRow> = session
            .players()
            .iter()
            .filter_map(|p| p.user_id().as_ref())
            .map(|user| {
                PlayerIndexRow::new(
                    table_id.clone(),
                    user.to_string(),
                    session.is_active_for(user),
                    updated,
                )
            })
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        diesel::insert_into(table_players::table)
            .values(&rows)
            .execute(conn)?;
        Ok(())
    }

    fn load_all(
        &self,
        conn: &mut SqliteConnection,
        ids: Vec<String>,
    ) -> Result<Vec<Session<M>>, RepositoryError> {
        ids.iter().map(|id| self.load(conn, id)).collect()
    }
}

/// Reference to the stored state at `timestamp`, read on first access.
fn lazy_history<S: DeserializeOwned + Send + Sync + 'static>(
    db_path: String,
    table_id: String,
    millis: i64,
) -> Result<HistoryRef<S>, StorageError> {
    let at = from_millis(millis)?;
    Ok(HistoryRef::lazy(at, move || {
        load_historic(&db_path, &table_id, millis)
    }))
}

#[instrument]
fn load_historic<S: DeserializeOwned + Send + Sync + 'static>(
    db_path: &str,
    table_id: &str,
    timestamp: i64,
) -> Result<Arc<HistoricState<S>>, StorageError> {
    let mut conn = SqliteConnection::establish(db_path)?;
    let row = table_states::table
        .find((table_id, timestamp))
        .select(StateRow::as_select())
        .first(&mut conn)?;

    let state: S = serde_json::from_str(row.state())?;
    let previous = row
        .previous()
        .map(|p| lazy_history(db_path.to_string(), table_id.to_string(), p))
        .transpose()?;
    Ok(Arc::new(HistoricState::restored(
        from_millis(row.timestamp())?,
        previous,
        state,
        from_millis(row.expires())?,
    )))
}

impl<M: GameModule> Tables<M> for SqliteTables<M> {
    #[instrument(skip(self))]
    fn find_by_id(&self, id: TableId) -> Result<Session<M>, RepositoryError> {
        let mut conn = self.connection()?;
        self.load(&mut conn, &id.to_string())
    }

    #[instrument(skip(self, session), fields(table_id = %session.id()))]
    fn add(&self, session: &mut Session<M>) -> Result<(), RepositoryError> {
        let mut conn = self.connection()?;
        let row = TableRow::from_session(session, session.version())?;

        conn.transaction::<_, RepositoryError, _>(|conn| {
            diesel::insert_into(game_tables::table)
                .values(&row)
                .execute(conn)?;
            Self::write_states(conn, session)?;
            Self::write_index(conn, session)
        })?;

        session.mark_persisted(session.version());
        info!(version = session.version(), "Table added");
        Ok(())
    }

    #[instrument(skip(self, session), fields(table_id = %session.id(), version = session.version()))]
    fn update(&self, session: &mut Session<M>) -> Result<(), RepositoryError> {
        let mut conn = self.connection()?;
        let expected = session.version();
        let next = expected + 1;
        let row = TableRow::from_session(session, next)?;
        let stored_version = i64::try_from(expected)
            .map_err(|_| StorageError::new(format!("Version out of range: {}", expected)))?;

        conn.transaction::<_, RepositoryError, _>(|conn| {
            let changed = diesel::update(
                game_tables::table
                    .filter(game_tables::id.eq(row.id()))
                    .filter(game_tables::version.eq(stored_version)),
            )
            .set(&row)
            .execute(conn)?;

            if changed == 0 {
                let exists: i64 = game_tables::table
                    .filter(game_tables::id.eq(row.id()))
                    .count()
                    .get_result(conn)?;
                return Err(if exists > 0 {
                    warn!("Version conflict");
                    RepositoryError::Conflict {
                        table_id: session.id(),
                        expected,
                    }
                } else {
                    RepositoryError::NotFound(session.id())
                });
            }

            Self::write_states(conn, session)?;
            Self::write_index(conn, session)
        })?;

        session.mark_persisted(next);
        debug!(version = next, "Table updated");
        Ok(())
    }

    #[instrument(skip(self))]
    fn find_active_by_user(&self, user: &UserId) -> Result<Vec<Session<M>>, RepositoryError> {
        let mut conn = self.connection()?;
        let ids = table_players::table
            .filter(table_players::user_id.eq(user.as_str()))
            .filter(table_players::active.eq(true))
            .order(table_players::updated.desc())
            .select(table_players::table_id)
            .load::<String>(&mut conn)?;

        debug!(count = ids.len(), "Active tables found");
        self.load_all(&mut conn, ids)
    }

    #[instrument(skip(self))]
    fn find_recent_by_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<Session<M>>, RepositoryError> {
        let mut conn = self.connection()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let ids = table_players::table
            .filter(table_players::user_id.eq(user.as_str()))
            .order(table_players::updated.desc())
            .limit(limit)
            .select(table_players::table_id)
            .load::<String>(&mut conn)?;

        debug!(count = ids.len(), "Recent tables found");
        self.load_all(&mut conn, ids)
    }
}
