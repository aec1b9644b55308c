//! Persistence boundary for tables.
//!
//! A [`Tables`] implementation stores sessions with optimistic versioning:
//! [`Tables::update`] only succeeds when the stored version still equals the
//! version the session was loaded with, and bumps it on success.

mod error;
mod memory;

pub use error::{RepositoryError, StorageError};
pub use memory::InMemoryTables;

use crate::{Session, TableId, UserId};
use boardroom_game::GameModule;
use std::sync::Arc;

/// Store of tables for one module type.
pub trait Tables<M: GameModule>: Send + Sync {
    /// Loads a table.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] for an unknown id.
    fn find_by_id(&self, id: TableId) -> Result<Session<M>, RepositoryError>;

    /// Stores a new table.
    ///
    /// # Errors
    ///
    /// Fails if the id is taken or the store fails.
    fn add(&self, session: &mut Session<M>) -> Result<(), RepositoryError>;

    /// Stores a changed table, bumping its version.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Conflict`] when another writer got there first.
    fn update(&self, session: &mut Session<M>) -> Result<(), RepositoryError>;

    /// New and started tables where `user` is invited or playing.
    ///
    /// # Errors
    ///
    /// Fails if the store fails.
    fn find_active_by_user(&self, user: &UserId) -> Result<Vec<Session<M>>, RepositoryError>;

    /// Tables `user` is seated at, most recently updated first.
    ///
    /// # Errors
    ///
    /// Fails if the store fails.
    fn find_recent_by_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<Session<M>>, RepositoryError>;
}

impl<M: GameModule, T: Tables<M> + ?Sized> Tables<M> for Arc<T> {
    fn find_by_id(&self, id: TableId) -> Result<Session<M>, RepositoryError> {
        (**self).find_by_id(id)
    }

    fn add(&self, session: &mut Session<M>) -> Result<(), RepositoryError> {
        (**self).add(session)
    }

    fn update(&self, session: &mut Session<M>) -> Result<(), RepositoryError> {
        (**self).update(session)
    }

    fn find_active_by_user(&self, user: &UserId) -> Result<Vec<Session<M>>, RepositoryError> {
        (**self).find_active_by_user(user)
    }

    fn find_recent_by_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<Session<M>>, RepositoryError> {
        (**self).find_recent_by_user(user, limit)
    }
}
