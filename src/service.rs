//! Command service: load, apply, persist with optimistic retry, publish.

use crate::{
    Clock, Mode, ModuleCatalog, Notifier, RepositoryError, Session, SystemClock, TableContext,
    TableError, TableId, TableType, Tables, UserId,
};
use boardroom_game::{GameModule, ModuleAction, ModuleError, Options, PlayerId};
use chrono::{DateTime, Utc};
use derive_more::Display;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Default number of load-apply-write attempts per command.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Default page size of recent-table queries.
pub const DEFAULT_RECENT_LIMIT: usize = 20;

const MAX_AUTOMA_STEPS: usize = 1_000;

/// Error of a service command.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum ServiceError<E> {
    /// The table refused the command.
    #[display("{_0}")]
    Table(TableError<E>),
    /// Loading or storing failed.
    #[display("{_0}")]
    Repository(RepositoryError),
    /// Every attempt lost the race against another writer.
    #[display("Table {table_id} still conflicting after {attempts} attempts")]
    ConcurrencyConflict {
        /// Table.
        table_id: TableId,
        /// Attempts made.
        attempts: usize,
    },
}

impl<E: std::error::Error + 'static> std::error::Error for ServiceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Table(e) => Some(e),
            ServiceError::Repository(e) => Some(e),
            ServiceError::ConcurrencyConflict { .. } => None,
        }
    }
}

impl<E> From<TableError<E>> for ServiceError<E> {
    fn from(err: TableError<E>) -> Self {
        ServiceError::Table(err)
    }
}

impl<E> From<RepositoryError> for ServiceError<E> {
    fn from(err: RepositoryError) -> Self {
        ServiceError::Repository(err)
    }
}

/// Result of a service command for module `M`.
pub type ServiceResult<M, T> = Result<T, ServiceError<ModuleError<M>>>;

/// Runs table commands against a repository and publishes their events.
///
/// Each command loads the table, applies the operation to the loaded copy
/// and writes it back with a version check. A lost race reloads and retries
/// the whole command, up to the configured number of attempts. Rejected
/// commands are never persisted.
pub struct TableService<M: GameModule, R, N> {
    catalog: ModuleCatalog<M>,
    tables: R,
    notifier: N,
    clock: Arc<dyn Clock>,
    rng: Mutex<ChaCha8Rng>,
    max_retries: usize,
    recent_limit: usize,
}

impl<M: GameModule, R, N> fmt::Debug for TableService<M, R, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableService")
            .field("catalog", &self.catalog)
            .field("clock", &self.clock)
            .field("max_retries", &self.max_retries)
            .field("recent_limit", &self.recent_limit)
            .finish_non_exhaustive()
    }
}

impl<M: GameModule, R: Tables<M>, N: Notifier> TableService<M, R, N> {
    /// Service on the wall clock with an entropy-seeded generator.
    pub fn new(catalog: ModuleCatalog<M>, tables: R, notifier: N) -> Self {
        Self {
            catalog,
            tables,
            notifier,
            clock: Arc::new(SystemClock),
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
            max_retries: DEFAULT_MAX_RETRIES,
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seeds the generator that forks per-command generators.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(ChaCha8Rng::seed_from_u64(seed));
        self
    }

    /// Sets the number of attempts per command; at least one is made.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Sets the page size of [`TableService::recent`].
    pub fn with_recent_limit(mut self, recent_limit: usize) -> Self {
        self.recent_limit = recent_limit;
        self
    }

    /// The repository.
    pub fn tables(&self) -> &R {
        &self.tables
    }

    /// Attempts per command.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn context(&self) -> TableContext {
        let seed = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_u64();
        TableContext::new(Arc::clone(&self.clock), ChaCha8Rng::seed_from_u64(seed))
    }

    fn publish(&self, session: &mut Session<M>) {
        for event in session.drain_events() {
            self.notifier.notify(&event);
        }
    }

    /// Load-apply-write with retry on version conflict.
    #[instrument(skip(self, op))]
    fn execute<T>(
        &self,
        table_id: TableId,
        op: impl Fn(&mut Session<M>, &mut TableContext) -> Result<T, TableError<ModuleError<M>>>,
    ) -> ServiceResult<M, (Session<M>, T)> {
        for attempt in 1..=self.max_retries {
            let mut session = self.tables.find_by_id(table_id)?;
            let mut ctx = self.context();
            let value = op(&mut session, &mut ctx)?;

            match self.tables.update(&mut session) {
                Ok(()) => {
                    debug!(attempt, version = session.version(), "Command committed");
                    self.publish(&mut session);
                    return Ok((session, value));
                }
                Err(RepositoryError::Conflict { .. }) => {
                    warn!(attempt, "Version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(attempts = self.max_retries, "Giving up after repeated conflicts");
        Err(ServiceError::ConcurrencyConflict {
            table_id,
            attempts: self.max_retries,
        })
    }

    fn run(
        &self,
        table_id: TableId,
        op: impl Fn(&mut Session<M>, &mut TableContext) -> Result<(), TableError<ModuleError<M>>>,
    ) -> ServiceResult<M, Session<M>> {
        self.execute(table_id, op).map(|(session, ())| session)
    }

    /// Opens a table of `game_id` owned by `owner`.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::UnknownGame`] if the catalog lacks the game, or a
    /// storage failure.
    #[instrument(skip(self, options))]
    pub fn create(
        &self,
        game_id: &str,
        mode: Mode,
        owner: UserId,
        options: Options,
    ) -> ServiceResult<M, Session<M>> {
        let module = self
            .catalog
            .get(game_id)
            .ok_or_else(|| RepositoryError::UnknownGame(game_id.to_string()))?;
        let mut ctx = self.context();
        let mut session = Session::create(&mut ctx, module, mode, owner, options);
        self.tables.add(&mut session)?;
        self.publish(&mut session);
        info!(table_id = %session.id(), "Table opened");
        Ok(session)
    }

    /// Loads a table.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] or a storage failure.
    pub fn find(&self, table_id: TableId) -> ServiceResult<M, Session<M>> {
        Ok(self.tables.find_by_id(table_id)?)
    }

    /// Active tables of `user`.
    ///
    /// # Errors
    ///
    /// Fails on storage failure.
    pub fn active(&self, user: &UserId) -> ServiceResult<M, Vec<Session<M>>> {
        Ok(self.tables.find_active_by_user(user)?)
    }

    /// Most recently updated tables of `user`, up to the recent limit.
    ///
    /// # Errors
    ///
    /// Fails on storage failure.
    pub fn recent(&self, user: &UserId) -> ServiceResult<M, Vec<Session<M>>> {
        Ok(self.tables.find_recent_by_user(user, self.recent_limit)?)
    }

    /// See [`Session::invite`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn invite(
        &self,
        table_id: TableId,
        actor: &UserId,
        invitee: &UserId,
    ) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.invite(ctx, actor, invitee.clone()))
    }

    /// See [`Session::accept_invite`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn accept_invite(&self, table_id: TableId, user: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.accept_invite(ctx, user))
    }

    /// See [`Session::reject_invite`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn reject_invite(&self, table_id: TableId, user: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.reject_invite(ctx, user))
    }

    /// See [`Session::join`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn join(&self, table_id: TableId, user: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.join(ctx, user))
    }

    /// See [`Session::make_public`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn make_public(&self, table_id: TableId, actor: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.make_public(ctx, actor))
    }

    /// See [`Session::make_private`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn make_private(&self, table_id: TableId, actor: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.make_private(ctx, actor))
    }

    /// See [`Session::change_type`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn change_type(
        &self,
        table_id: TableId,
        actor: &UserId,
        table_type: TableType,
    ) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.change_type(ctx, actor, table_type))
    }

    /// See [`Session::add_computer`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn add_computer(
        &self,
        table_id: TableId,
        actor: &UserId,
    ) -> ServiceResult<M, (Session<M>, PlayerId)> {
        self.execute(table_id, |s, ctx| s.add_computer(ctx, actor))
    }

    /// See [`Session::change_options`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn change_options(
        &self,
        table_id: TableId,
        actor: &UserId,
        options: &Options,
    ) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.change_options(ctx, actor, options.clone()))
    }

    /// See [`Session::start`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn start(&self, table_id: TableId, actor: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.start(ctx, actor))
    }

    /// See [`Session::perform`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn perform(
        &self,
        table_id: TableId,
        user: &UserId,
        action: &ModuleAction<M>,
    ) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.perform(ctx, user, action.clone()))
    }

    /// See [`Session::skip`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn skip(&self, table_id: TableId, user: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.skip(ctx, user))
    }

    /// See [`Session::end_turn`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn end_turn(&self, table_id: TableId, user: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.end_turn(ctx, user))
    }

    /// See [`Session::execute_automa`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn execute_automa(
        &self,
        table_id: TableId,
        player_id: PlayerId,
    ) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.execute_automa(ctx, player_id))
    }

    /// Lets computer players take turns until a human is up or the game
    /// is over, one committed command per automa step.
    ///
    /// # Errors
    ///
    /// The first failing step's error.
    #[instrument(skip(self))]
    pub fn play_automa(&self, table_id: TableId) -> ServiceResult<M, Session<M>> {
        let mut session = self.find(table_id)?;
        for _ in 0..MAX_AUTOMA_STEPS {
            let next = session
                .current_players()
                .into_iter()
                .find(|p| p.is_computer())
                .map(|p| p.id());
            match next {
                Some(player_id) => session = self.execute_automa(table_id, player_id)?,
                None => break,
            }
        }
        Ok(session)
    }

    /// See [`Session::leave`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn leave(&self, table_id: TableId, user: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.leave(ctx, user))
    }

    /// See [`Session::kick`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn kick(
        &self,
        table_id: TableId,
        actor: &UserId,
        target: PlayerId,
    ) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.kick(ctx, actor, target))
    }

    /// See [`Session::propose_to_leave`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn propose_to_leave(&self, table_id: TableId, user: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.propose_to_leave(ctx, user))
    }

    /// See [`Session::agree_to_leave`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn agree_to_leave(&self, table_id: TableId, user: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.agree_to_leave(ctx, user))
    }

    /// See [`Session::abandon`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn abandon(&self, table_id: TableId, user: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.abandon(ctx, user))
    }

    /// See [`Session::undo`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn undo(&self, table_id: TableId, user: &UserId) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.undo(ctx, user))
    }

    /// See [`Session::revert_to`].
    ///
    /// # Errors
    ///
    /// As the session operation, plus repository failures and conflicts.
    pub fn revert_to(
        &self,
        table_id: TableId,
        user: &UserId,
        timestamp: DateTime<Utc>,
    ) -> ServiceResult<M, Session<M>> {
        self.run(table_id, |s, ctx| s.revert_to(ctx, user, timestamp))
    }
}
