//! In-memory table store.

use crate::{RepositoryError, Session, StorageError, TableId, Tables, UserId};
use boardroom_game::GameModule;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

/// Tables kept in a mutex-guarded map; sessions are cloned in and out.
#[derive(Debug)]
pub struct InMemoryTables<M: GameModule> {
    tables: Mutex<HashMap<TableId, Session<M>>>,
}

impl<M: GameModule> Default for InMemoryTables<M> {
    fn default() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }
}

impl<M: GameModule> InMemoryTables<M> {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tables.
    ///
    /// # Errors
    ///
    /// Fails if the lock was poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.len())
    }

    /// True when nothing is stored.
    ///
    /// # Errors
    ///
    /// Fails if the lock was poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<TableId, Session<M>>>, StorageError> {
        self.tables
            .lock()
            .map_err(|e| StorageError::new(format!("Table store lock poisoned: {}", e)))
    }

    fn snapshot(session: &Session<M>) -> Session<M> {
        let mut stored = session.clone();
        stored.drain_events();
        stored
    }

    fn select(
        &self,
        keep: impl Fn(&Session<M>) -> bool,
    ) -> Result<Vec<Session<M>>, RepositoryError> {
        let tables = self.lock()?;
        let mut found: Vec<_> = tables.values().filter(|s| keep(s)).cloned().collect();
        found.sort_by_key(|s| std::cmp::Reverse(s.updated()));
        Ok(found)
    }
}

impl<M: GameModule> Tables<M> for InMemoryTables<M> {
    #[instrument(skip(self))]
    fn find_by_id(&self, id: TableId) -> Result<Session<M>, RepositoryError> {
        self.lock()?
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    #[instrument(skip(self, session), fields(table_id = %session.id()))]
    fn add(&self, session: &mut Session<M>) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        if tables.contains_key(&session.id()) {
            return Err(StorageError::new(format!("Table {} already exists", session.id())).into());
        }
        session.mark_persisted(session.version());
        tables.insert(session.id(), Self::snapshot(session));
        debug!("Table added");
        Ok(())
    }

    #[instrument(skip(self, session), fields(table_id = %session.id(), version = session.version()))]
    fn update(&self, session: &mut Session<M>) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        let stored = tables
            .get(&session.id())
            .ok_or(RepositoryError::NotFound(session.id()))?;
        if stored.version() != session.version() {
            warn!(stored = stored.version(), "Version conflict");
            return Err(RepositoryError::Conflict {
                table_id: session.id(),
                expected: session.version(),
            });
        }

        session.mark_persisted(session.version() + 1);
        tables.insert(session.id(), Self::snapshot(session));
        debug!(version = session.version(), "Table updated");
        Ok(())
    }

    #[instrument(skip(self))]
    fn find_active_by_user(&self, user: &UserId) -> Result<Vec<Session<M>>, RepositoryError> {
        self.select(|s| s.is_active_for(user))
    }

    #[instrument(skip(self))]
    fn find_recent_by_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<Session<M>>, RepositoryError> {
        let mut found = self.select(|s| s.player_by_user(user).is_some())?;
        found.truncate(limit);
        Ok(found)
    }
}
