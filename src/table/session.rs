//! The table aggregate: roster, lifecycle, turns and history.
//!
//! Every public operation stages its changes on a clone of the session and
//! swaps the clone in only once the whole command has succeeded, so a
//! rejected command leaves no trace. Sessions perform no locking; the
//! service layer serializes writers through optimistic versioning.

use crate::table::invariants::{InvariantSet, SessionInvariants};
use crate::{
    CurrentState, HistoryRef, IllegalStateTransition, InternalError, Log, LogEntry, LogType,
    Player, PlayerStatus, TableContext, TableError, TableEvent, TableId, UserId, ValidationError,
};
use boardroom_game::{
    GameModule, GameState, ModuleAction, ModuleError, Options, PlayerId, Seat,
};
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a table.
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
pub enum Status {
    /// Gathering players.
    New,
    /// Game in progress.
    Started,
    /// Game played to its end.
    Ended,
    /// Game stopped before its end.
    Abandoned,
}

/// What a table allows beyond normal play.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum Mode {
    /// Undo allowed.
    #[default]
    Normal,
    /// No undo.
    Ranked,
    /// Undo and revert to any retained state.
    Practice,
}

impl Mode {
    /// Whether players may undo their last step.
    pub fn allows_undo(self) -> bool {
        matches!(self, Mode::Normal | Mode::Practice)
    }

    /// Whether the owner may revert to an arbitrary retained state.
    pub fn allows_revert(self) -> bool {
        self == Mode::Practice
    }
}

/// Who may take a seat without an invitation.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum Visibility {
    /// Anyone may join while the table is new.
    Public,
    /// Invitation only.
    #[default]
    Private,
}

/// How players are expected to take their turns.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum TableType {
    /// Everyone plays in one sitting.
    #[default]
    Realtime,
    /// Players come back for each turn.
    TurnBased,
}

const NEW_RETENTION: TimeDelta = TimeDelta::days(2);
const ENDED_RETENTION: TimeDelta = TimeDelta::days(5 * 365);
const ABANDONED_RETENTION: TimeDelta = TimeDelta::days(1);
const SIGNIFICANT_PROGRESS: u8 = 25;

type OpResult<M, T = ()> = Result<T, TableError<ModuleError<M>>>;

/// Stored fields a repository hands back to rebuild a session.
#[derive(Debug)]
pub(crate) struct RestoredSession<M: GameModule> {
    pub(crate) id: TableId,
    pub(crate) module: Arc<M>,
    pub(crate) version: u64,
    pub(crate) status: Status,
    pub(crate) mode: Mode,
    pub(crate) table_type: TableType,
    pub(crate) visibility: Visibility,
    pub(crate) owner: UserId,
    pub(crate) options: Options,
    pub(crate) created: DateTime<Utc>,
    pub(crate) updated: DateTime<Utc>,
    pub(crate) started: Option<DateTime<Utc>>,
    pub(crate) ended: Option<DateTime<Utc>>,
    pub(crate) progress: u8,
    pub(crate) log: Log,
    pub(crate) players: Vec<Player>,
    pub(crate) state: Option<CurrentState<M::State>>,
}

/// One table of one game.
#[derive(Debug)]
pub struct Session<M: GameModule> {
    id: TableId,
    module: Arc<M>,
    version: u64,
    status: Status,
    mode: Mode,
    table_type: TableType,
    visibility: Visibility,
    owner: UserId,
    options: Options,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    started: Option<DateTime<Utc>>,
    ended: Option<DateTime<Utc>>,
    progress: u8,
    log: Log,
    players: Vec<Player>,
    state: Option<CurrentState<M::State>>,
    events: Vec<TableEvent>,
}

impl<M: GameModule> Clone for Session<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            module: Arc::clone(&self.module),
            version: self.version,
            status: self.status,
            mode: self.mode,
            table_type: self.table_type,
            visibility: self.visibility,
            owner: self.owner.clone(),
            options: self.options.clone(),
            created: self.created,
            updated: self.updated,
            started: self.started,
            ended: self.ended,
            progress: self.progress,
            log: self.log.clone(),
            players: self.players.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
        }
    }
}

impl<M: GameModule> Session<M> {
    /// Opens a new table with `owner` as its only, accepted, player.
    #[instrument(skip(ctx, module, options), fields(game = module.id()))]
    pub fn create(
        ctx: &mut TableContext,
        module: Arc<M>,
        mode: Mode,
        owner: UserId,
        options: Options,
    ) -> Self {
        let now = ctx.now();
        let id = TableId::generate();
        let owner_player = Player::accepted(owner.clone(), now);
        let owner_id = owner_player.id();

        let mut session = Self {
            id,
            module,
            version: 1,
            status: Status::New,
            mode,
            table_type: TableType::Realtime,
            visibility: Visibility::Private,
            owner: owner.clone(),
            options,
            created: now,
            updated: now,
            started: None,
            ended: None,
            progress: 0,
            log: Log::new(),
            players: vec![owner_player],
            state: None,
            events: Vec::new(),
        };
        session.log.push(LogEntry::new(
            owner_id,
            Some(owner),
            now,
            LogType::Create,
            Vec::new(),
        ));
        session.raise(TableEvent::Created { table_id: id });

        info!(table_id = %id, "Table created");
        session
    }

    pub(crate) fn restore(parts: RestoredSession<M>) -> Self {
        Self {
            id: parts.id,
            module: parts.module,
            version: parts.version,
            status: parts.status,
            mode: parts.mode,
            table_type: parts.table_type,
            visibility: parts.visibility,
            owner: parts.owner,
            options: parts.options,
            created: parts.created,
            updated: parts.updated,
            started: parts.started,
            ended: parts.ended,
            progress: parts.progress,
            log: parts.log,
            players: parts.players,
            state: parts.state,
            events: Vec::new(),
        }
    }

    // ---- accessors ----

    /// Table id.
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Rule module.
    pub fn module(&self) -> &Arc<M> {
        &self.module
    }

    /// Version last persisted or loaded.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Lifecycle status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Table mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Realtime or turn based.
    pub fn table_type(&self) -> TableType {
        self.table_type
    }

    /// Who may join without an invitation.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Current owner.
    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    /// Table options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Creation time.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Time of the last change.
    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    /// Start time.
    pub fn started(&self) -> Option<DateTime<Utc>> {
        self.started
    }

    /// End time.
    pub fn ended(&self) -> Option<DateTime<Utc>> {
        self.ended
    }

    /// Completion percentage reported by the module.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Table log.
    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Roster in seating order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Live state with its history pointer.
    pub fn current_state(&self) -> Option<&CurrentState<M::State>> {
        self.state.as_ref()
    }

    /// Live module state.
    pub fn state(&self) -> Option<&M::State> {
        self.state.as_ref().map(CurrentState::state)
    }

    /// Seat of `user`.
    pub fn player_by_user(&self, user: &UserId) -> Option<&Player> {
        self.players.iter().find(|p| p.is_user(user))
    }

    /// Seat with `id`.
    pub fn player_by_id(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id() == id)
    }

    /// Players holding the turn.
    pub fn current_players(&self) -> Vec<&Player> {
        self.players.iter().filter(|p| p.turn()).collect()
    }

    /// When storage may drop this table, if ever.
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        match self.status {
            Status::New => Some(self.created + NEW_RETENTION),
            Status::Started => None,
            Status::Ended => Some(self.ended.unwrap_or(self.updated) + ENDED_RETENTION),
            Status::Abandoned if self.progress >= SIGNIFICANT_PROGRESS => {
                Some(self.updated + ENDED_RETENTION)
            }
            Status::Abandoned => Some(self.updated + ABANDONED_RETENTION),
        }
    }

    /// Whether enough players accepted to start.
    pub fn can_start(&self) -> bool {
        self.status == Status::New
            && self
                .players
                .iter()
                .filter(|p| p.status() == PlayerStatus::Accepted)
                .count()
                >= self.module.min_players()
    }

    /// Whether `user` could take a free seat right now.
    pub fn can_join(&self, user: &UserId) -> bool {
        self.status == Status::New
            && self.visibility == Visibility::Public
            && self.player_by_user(user).is_none()
            && self.players.len() < self.module.max_players()
    }

    /// Whether the player holding the turn could undo right now.
    pub fn can_undo(&self) -> bool {
        self.status == Status::Started
            && self.mode.allows_undo()
            && self.state.as_ref().is_some_and(|current| {
                current.previous().is_some()
                    && current.state().can_undo()
                    && current.state().current_players().len() == 1
            })
    }

    /// Whether the table is neither ended nor abandoned.
    pub fn is_active(&self) -> bool {
        matches!(self.status, Status::New | Status::Started)
    }

    /// Whether the table is active and `user` is invited to or playing it.
    pub fn is_active_for(&self, user: &UserId) -> bool {
        self.is_active()
            && self
                .player_by_user(user)
                .is_some_and(|p| p.status() == PlayerStatus::Invited || p.is_playing())
    }

    /// Events raised since the last drain.
    pub fn pending_events(&self) -> &[TableEvent] {
        &self.events
    }

    /// Takes the events raised since the last drain.
    pub fn drain_events(&mut self) -> Vec<TableEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn mark_persisted(&mut self, version: u64) {
        self.version = version;
        if let Some(current) = self.state.as_mut() {
            current.mark_persisted();
        }
    }

    // ---- roster operations ----

    /// Invites `invitee` on behalf of the owner.
    ///
    /// # Errors
    ///
    /// Fails unless the table is new and `actor` owns it, or when the roster
    /// is full or already seats `invitee`.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn invite(
        &mut self,
        ctx: &mut TableContext,
        actor: &UserId,
        invitee: UserId,
    ) -> OpResult<M> {
        self.transact(ctx, "invite", |s, ctx| {
            s.require_status("invite", &[Status::New])?;
            let owner = s.require_owner(actor)?;
            if s.players.len() >= s.module.max_players() {
                return Err(ValidationError::ExceedsMaxPlayers.into());
            }
            if s.player_by_user(&invitee).is_some() {
                return Err(ValidationError::AlreadyInvited.into());
            }

            let ts = s.tick(ctx);
            s.players.push(Player::invited(invitee.clone(), ts));
            s.record(ctx, owner, LogType::Invite, vec![invitee.to_string()]);
            info!(%invitee, "User invited");
            s.raise(TableEvent::Invited {
                table_id: s.id,
                user_id: invitee,
            });
            Ok(())
        })
    }

    /// Accepts the invitation of `user`.
    ///
    /// # Errors
    ///
    /// Fails unless the table is new and `user` has an open invitation.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn accept_invite(&mut self, ctx: &mut TableContext, user: &UserId) -> OpResult<M> {
        self.transact(ctx, "accept", |s, ctx| {
            s.require_status("accept", &[Status::New])?;
            let idx = s.require_invited(user)?;

            let ts = s.tick(ctx);
            s.players[idx].set_status(PlayerStatus::Accepted, ts);
            s.record(ctx, s.players[idx].id(), LogType::Accept, Vec::new());
            s.raise(TableEvent::Accepted {
                table_id: s.id,
                user_id: user.clone(),
            });
            Ok(())
        })
    }

    /// Declines the invitation of `user`, freeing the seat.
    ///
    /// # Errors
    ///
    /// Fails unless the table is new and `user` has an open invitation.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn reject_invite(&mut self, ctx: &mut TableContext, user: &UserId) -> OpResult<M> {
        self.transact(ctx, "reject", |s, ctx| {
            s.require_status("reject", &[Status::New])?;
            let idx = s.require_invited(user)?;

            let ts = s.tick(ctx);
            s.players[idx].set_status(PlayerStatus::Rejected, ts);
            s.record(ctx, s.players[idx].id(), LogType::Reject, Vec::new());
            s.players.remove(idx);
            s.raise(TableEvent::Rejected {
                table_id: s.id,
                user_id: user.clone(),
            });
            Ok(())
        })
    }

    /// Seats `user` at a public table without an invitation.
    ///
    /// # Errors
    ///
    /// Fails unless the table is new and public, the roster has room and
    /// `user` has no seat yet.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn join(&mut self, ctx: &mut TableContext, user: &UserId) -> OpResult<M> {
        self.transact(ctx, "join", |s, ctx| {
            s.require_status("join", &[Status::New])?;
            if s.visibility != Visibility::Public {
                return Err(ValidationError::NotPublic.into());
            }
            if s.players.len() >= s.module.max_players() {
                return Err(ValidationError::ExceedsMaxPlayers.into());
            }
            if s.player_by_user(user).is_some() {
                return Err(ValidationError::AlreadyResponded.into());
            }

            let ts = s.tick(ctx);
            let player = Player::accepted(user.clone(), ts);
            let player_id = player.id();
            s.players.push(player);
            s.record(ctx, player_id, LogType::Join, vec![user.to_string()]);
            info!(%user, "User joined");
            s.raise(TableEvent::Joined {
                table_id: s.id,
                user_id: user.clone(),
            });
            Ok(())
        })
    }

    /// Opens the table to anyone.
    ///
    /// # Errors
    ///
    /// Fails unless the table is new and `actor` owns it.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn make_public(&mut self, ctx: &mut TableContext, actor: &UserId) -> OpResult<M> {
        self.change_visibility(ctx, actor, Visibility::Public)
    }

    /// Restricts the table to invited users.
    ///
    /// # Errors
    ///
    /// Fails unless the table is new and `actor` owns it.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn make_private(&mut self, ctx: &mut TableContext, actor: &UserId) -> OpResult<M> {
        self.change_visibility(ctx, actor, Visibility::Private)
    }

    fn change_visibility(
        &mut self,
        ctx: &mut TableContext,
        actor: &UserId,
        visibility: Visibility,
    ) -> OpResult<M> {
        self.transact(ctx, "change visibility of", |s, ctx| {
            s.require_status("change visibility of", &[Status::New])?;
            s.require_owner(actor)?;

            s.tick(ctx);
            s.visibility = visibility;
            debug!(%visibility, "Visibility changed");
            s.raise(TableEvent::VisibilityChanged { table_id: s.id });
            Ok(())
        })
    }

    /// Switches between realtime and turn-based play.
    ///
    /// # Errors
    ///
    /// Fails unless the table is new and `actor` owns it.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn change_type(
        &mut self,
        ctx: &mut TableContext,
        actor: &UserId,
        table_type: TableType,
    ) -> OpResult<M> {
        self.transact(ctx, "change type of", |s, ctx| {
            s.require_status("change type of", &[Status::New])?;
            s.require_owner(actor)?;

            s.tick(ctx);
            s.table_type = table_type;
            s.raise(TableEvent::OptionsChanged { table_id: s.id });
            Ok(())
        })
    }

    /// Seats a computer player.
    ///
    /// # Errors
    ///
    /// Fails unless the table is new, `actor` owns it, the roster has room
    /// and the module ships an automa.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn add_computer(&mut self, ctx: &mut TableContext, actor: &UserId) -> OpResult<M, PlayerId> {
        self.transact(ctx, "add a computer to", |s, ctx| {
            s.require_status("add a computer to", &[Status::New])?;
            s.require_owner(actor)?;
            if s.players.len() >= s.module.max_players() {
                return Err(ValidationError::ExceedsMaxPlayers.into());
            }
            if !s.module.has_automa() {
                return Err(ValidationError::ComputerNotSupported.into());
            }

            let ts = s.tick(ctx);
            let computer = Player::computer(ts);
            let player_id = computer.id();
            s.players.push(computer);
            s.raise(TableEvent::ComputerAdded {
                table_id: s.id,
                player_id,
            });
            Ok(player_id)
        })
    }

    /// Replaces the table options.
    ///
    /// # Errors
    ///
    /// Fails unless the table is new, has no state yet and `actor` owns it.
    #[instrument(skip(self, ctx, options), fields(table_id = %self.id))]
    pub fn change_options(
        &mut self,
        ctx: &mut TableContext,
        actor: &UserId,
        options: Options,
    ) -> OpResult<M> {
        self.transact(ctx, "change options of", |s, ctx| {
            s.require_status("change options of", &[Status::New])?;
            s.require_owner(actor)?;
            if s.state.is_some() {
                return Err(ValidationError::StateNotCompatible.into());
            }

            s.tick(ctx);
            s.options = options;
            s.raise(TableEvent::OptionsChanged { table_id: s.id });
            Ok(())
        })
    }

    // ---- lifecycle ----

    /// Starts the game with every accepted player.
    ///
    /// Players who never answered are dropped. Colors are drawn without
    /// replacement from the module's palette, shuffled by the context
    /// generator.
    ///
    /// # Errors
    ///
    /// Fails unless the table is new, `actor` owns it and enough players
    /// accepted. A module error from `start` is passed through.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn start(&mut self, ctx: &mut TableContext, actor: &UserId) -> OpResult<M> {
        self.transact(ctx, "start", |s, ctx| {
            s.require_status("start", &[Status::New])?;
            let owner = s.require_owner(actor)?;
            if !s.can_start() {
                return Err(ValidationError::MinPlayers.into());
            }

            let ts = s.tick(ctx);
            s.players.retain(|p| p.status() == PlayerStatus::Accepted);

            let mut colors = s.module.supported_colors();
            if colors.len() < s.players.len() {
                return Err(InternalError::new(format!(
                    "Module {} offers {} colors for {} players",
                    s.module.id(),
                    colors.len(),
                    s.players.len()
                ))
                .into());
            }
            colors.shuffle(ctx.rng());

            let mut seats = Vec::with_capacity(s.players.len());
            for (player, color) in s.players.iter_mut().zip(colors) {
                player.assign_color(color, ts);
                seats.push(Seat::new(player.id(), color, player.kind()));
            }

            let module = Arc::clone(&s.module);
            let state = module
                .start(&seats, &s.options, ctx.rng())
                .map_err(TableError::Game)?;

            s.state = Some(CurrentState::initial(state, ts));
            s.status = Status::Started;
            s.started = Some(ts);
            s.record(ctx, owner, LogType::Start, Vec::new());
            s.raise(TableEvent::Started { table_id: s.id });
            info!(players = s.players.len(), "Game started");

            s.after_state_change(ctx)
        })
    }

    // ---- turn operations ----

    /// Submits a move for the player of `user`.
    ///
    /// # Errors
    ///
    /// Fails unless the game is running and the player holds the turn. A
    /// module rejection is returned unchanged as [`TableError::Game`].
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn perform(
        &mut self,
        ctx: &mut TableContext,
        user: &UserId,
        action: ModuleAction<M>,
    ) -> OpResult<M> {
        self.transact(ctx, "perform on", |s, ctx| {
            s.require_status("perform on", &[Status::Started])?;
            let player = s.require_turn(user)?;
            s.change_state(ctx, |state, rng| state.perform(player, action, rng))
        })
    }

    /// Skips the current optional obligation of the player of `user`.
    ///
    /// # Errors
    ///
    /// As [`Session::perform`].
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn skip(&mut self, ctx: &mut TableContext, user: &UserId) -> OpResult<M> {
        self.transact(ctx, "skip on", |s, ctx| {
            s.require_status("skip on", &[Status::Started])?;
            let player = s.require_turn(user)?;
            s.record(ctx, player, LogType::Skip, Vec::new());
            s.change_state(ctx, |state, rng| state.skip(player, rng))
        })
    }

    /// Ends the turn of the player of `user`.
    ///
    /// # Errors
    ///
    /// As [`Session::perform`].
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn end_turn(&mut self, ctx: &mut TableContext, user: &UserId) -> OpResult<M> {
        self.transact(ctx, "end turn on", |s, ctx| {
            s.require_status("end turn on", &[Status::Started])?;
            let player = s.require_turn(user)?;
            s.change_state(ctx, |state, rng| state.end_turn(player, rng))
        })
    }

    /// Lets the module's automa play the turn of computer `player_id`.
    ///
    /// # Errors
    ///
    /// Fails unless the game is running and `player_id` is a computer
    /// holding the turn. A module rejection is passed through.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn execute_automa(&mut self, ctx: &mut TableContext, player_id: PlayerId) -> OpResult<M> {
        self.transact(ctx, "run the automa on", |s, ctx| {
            s.require_status("run the automa on", &[Status::Started])?;
            let idx = s.index_of_player(player_id)?;
            if !s.players[idx].is_computer() {
                return Err(ValidationError::NotComputer.into());
            }
            if !s.players[idx].turn() {
                return Err(ValidationError::NotYourTurn.into());
            }

            let module = Arc::clone(&s.module);
            s.change_state(ctx, |state, rng| module.execute_automa(state, player_id, rng))
        })
    }

    // ---- history ----

    /// Steps back to the state before the last change.
    ///
    /// # Errors
    ///
    /// Fails unless the game is running in a mode that allows undo, the
    /// player holds the turn alone and the module allows it. Returns
    /// [`TableError::HistoryNotAvailable`] when no retained predecessor
    /// exists.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn undo(&mut self, ctx: &mut TableContext, user: &UserId) -> OpResult<M> {
        self.transact(ctx, "undo on", |s, ctx| {
            s.require_status("undo on", &[Status::Started])?;
            if !s.mode.allows_undo() {
                return Err(ValidationError::UndoNotAllowed.into());
            }
            let player = s.require_turn(user)?;

            let current = s.require_state()?;
            if !current.state().can_undo() || current.state().current_players().len() != 1 {
                return Err(ValidationError::UndoNotAllowed.into());
            }
            let node = current
                .previous()
                .ok_or(TableError::HistoryNotAvailable)?
                .get()
                .map_err(|e| InternalError::new(e.to_string()))?;
            if !node.is_retained(ctx.now()) {
                return Err(TableError::HistoryNotAvailable);
            }

            s.record(ctx, player, LogType::Undo, Vec::new());
            let ts = s.tick(ctx);
            s.state = Some(CurrentState::revert_to(&node, ts));
            info!(to = %node.timestamp(), "Undone");
            s.after_state_change(ctx)
        })
    }

    /// Jumps back to the newest retained state at or before `timestamp`.
    ///
    /// # Errors
    ///
    /// Fails unless the game is running in practice mode and `user` owns
    /// the table. Returns [`TableError::HistoryNotAvailable`] when no
    /// retained state that old exists.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn revert_to(
        &mut self,
        ctx: &mut TableContext,
        user: &UserId,
        timestamp: DateTime<Utc>,
    ) -> OpResult<M> {
        self.transact(ctx, "revert", |s, ctx| {
            s.require_status("revert", &[Status::Started])?;
            if !s.mode.allows_revert() {
                return Err(ValidationError::NotPracticeMode.into());
            }
            let owner = s.require_owner(user)?;

            let now = ctx.now();
            let mut cursor: Option<HistoryRef<M::State>> = s.require_state()?.previous().cloned();
            let node = loop {
                let Some(reference) = cursor else {
                    return Err(TableError::HistoryNotAvailable);
                };
                let node = reference
                    .get()
                    .map_err(|e| InternalError::new(e.to_string()))?;
                if node.timestamp() <= timestamp {
                    if !node.is_retained(now) {
                        return Err(TableError::HistoryNotAvailable);
                    }
                    break node;
                }
                cursor = node.previous().cloned();
            };

            s.record(ctx, owner, LogType::Revert, vec![timestamp.to_rfc3339()]);
            let ts = s.tick(ctx);
            s.state = Some(CurrentState::revert_to(&node, ts));
            info!(to = %node.timestamp(), "Reverted");
            s.after_state_change(ctx)
        })
    }

    // ---- leaving ----

    /// The player of `user` leaves the table.
    ///
    /// In a new table the seat is freed. If the owner leaves, ownership moves
    /// to another playing human or the table is abandoned. A running game
    /// goes on without the player while enough players remain.
    ///
    /// # Errors
    ///
    /// Fails once the table is over, or when `user` is not playing.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn leave(&mut self, ctx: &mut TableContext, user: &UserId) -> OpResult<M> {
        self.transact(ctx, "leave", |s, ctx| {
            s.require_status("leave", &[Status::New, Status::Started])?;
            let idx = s.index_of_user(user)?;
            if !s.players[idx].is_playing() {
                return Err(ValidationError::NotAccepted.into());
            }

            let player = s.players[idx].id();
            let ts = s.tick(ctx);
            s.players[idx].set_status(PlayerStatus::Left, ts);
            s.record(ctx, player, LogType::Left, Vec::new());
            s.raise(TableEvent::Left {
                table_id: s.id,
                user_id: user.clone(),
            });
            if s.status == Status::New {
                s.players.remove(idx);
            }
            info!(%user, "Player left");

            s.after_player_left(ctx, player, Some(user))
        })
    }

    /// Removes `target` from the table.
    ///
    /// In a new table only the owner may kick. In a running game any playing
    /// user may kick a player who held the turn past its deadline.
    ///
    /// # Errors
    ///
    /// Fails with [`ValidationError::CannotKick`] when the target is not
    /// kickable, or on the usual status and ownership checks.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn kick(&mut self, ctx: &mut TableContext, actor: &UserId, target: PlayerId) -> OpResult<M> {
        self.transact(ctx, "kick from", |s, ctx| {
            s.require_status("kick from", &[Status::New, Status::Started])?;
            let target_idx = s.index_of_player(target)?;

            let kicker = if s.status == Status::New {
                let owner = s.require_owner(actor)?;
                if owner == target {
                    return Err(ValidationError::CannotKick.into());
                }
                owner
            } else {
                let idx = s.index_of_user(actor)?;
                if !s.players[idx].is_playing() {
                    return Err(ValidationError::NotAccepted.into());
                }
                let victim = &s.players[target_idx];
                if !victim.is_playing() || !victim.is_turn_limit_exceeded(ctx.now()) {
                    return Err(ValidationError::CannotKick.into());
                }
                s.players[idx].id()
            };

            let target_user = s.players[target_idx].user_id().clone();
            let ts = s.tick(ctx);
            s.players[target_idx].set_status(PlayerStatus::Left, ts);
            s.record(ctx, kicker, LogType::Kick, vec![target.to_string()]);
            s.raise(TableEvent::Kicked {
                table_id: s.id,
                player_id: target,
            });
            warn!(%target, "Player kicked");

            if s.status == Status::New {
                s.players.remove(target_idx);
                Ok(())
            } else {
                s.after_player_left(ctx, target, target_user.as_ref())
            }
        })
    }

    /// The player of `user` asks to stop the game.
    ///
    /// # Errors
    ///
    /// Fails unless the game is running and the player is plainly accepted.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn propose_to_leave(&mut self, ctx: &mut TableContext, user: &UserId) -> OpResult<M> {
        self.transact(ctx, "propose to leave", |s, ctx| {
            s.require_status("propose to leave", &[Status::Started])?;
            let idx = s.require_accepted(user)?;

            let ts = s.tick(ctx);
            s.players[idx].set_status(PlayerStatus::ProposedToLeave, ts);
            s.record(ctx, s.players[idx].id(), LogType::ProposedToLeave, Vec::new());
            s.raise(TableEvent::ProposedToLeave {
                table_id: s.id,
                user_id: user.clone(),
            });
            s.abandon_if_all_agreed(ctx)
        })
    }

    /// The player of `user` agrees to an open proposal to stop.
    ///
    /// # Errors
    ///
    /// Fails unless the game is running, the player is plainly accepted and
    /// someone proposed to leave.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn agree_to_leave(&mut self, ctx: &mut TableContext, user: &UserId) -> OpResult<M> {
        self.transact(ctx, "agree to leave", |s, ctx| {
            s.require_status("agree to leave", &[Status::Started])?;
            let idx = s.require_accepted(user)?;
            if !s
                .players
                .iter()
                .any(|p| p.status() == PlayerStatus::ProposedToLeave)
            {
                return Err(ValidationError::NoProposalToLeave.into());
            }

            let ts = s.tick(ctx);
            s.players[idx].set_status(PlayerStatus::AgreedToLeave, ts);
            s.record(ctx, s.players[idx].id(), LogType::AgreedToLeave, Vec::new());
            s.raise(TableEvent::AgreedToLeave {
                table_id: s.id,
                user_id: user.clone(),
            });
            s.abandon_if_all_agreed(ctx)
        })
    }

    /// Abandons the table on behalf of `user`.
    ///
    /// The owner may abandon a new table, or a running one with at most one
    /// other human still playing. Anyone else may only abandon a new table
    /// they are the last human at.
    ///
    /// # Errors
    ///
    /// [`ValidationError::AbandonNotAllowed`] when the rules above refuse.
    #[instrument(skip(self, ctx), fields(table_id = %self.id))]
    pub fn abandon(&mut self, ctx: &mut TableContext, user: &UserId) -> OpResult<M> {
        self.transact(ctx, "abandon", |s, ctx| {
            s.require_status("abandon", &[Status::New, Status::Started])?;
            s.index_of_user(user)?;

            let others = s
                .players
                .iter()
                .filter(|p| p.is_human() && p.is_playing() && !p.is_user(user))
                .count();
            let allowed = if &s.owner == user {
                s.status == Status::New || others <= 1
            } else {
                s.status == Status::New && others == 0
            };
            if !allowed {
                return Err(ValidationError::AbandonNotAllowed.into());
            }

            s.abandon_now(ctx);
            Ok(())
        })
    }

    // ---- internals ----

    fn transact<T>(
        &mut self,
        ctx: &mut TableContext,
        operation: &'static str,
        op: impl FnOnce(&mut Self, &mut TableContext) -> OpResult<M, T>,
    ) -> OpResult<M, T> {
        let mut staged = self.clone();
        let value = op(&mut staged, ctx).inspect_err(|e| {
            warn!(table_id = %self.id, operation, error = %e, "Command rejected");
        })?;
        staged.check_invariants()?;
        *self = staged;
        Ok(value)
    }

    fn check_invariants(&self) -> Result<(), InternalError> {
        if cfg!(debug_assertions) {
            SessionInvariants::check_all(self).map_err(|violations| {
                let described: Vec<_> = violations.into_iter().map(|v| v.description).collect();
                InternalError::new(format!("Invariants violated: {}", described.join("; ")))
            })?;
        }
        Ok(())
    }

    /// Next unique timestamp, strictly after every earlier one.
    fn tick(&mut self, ctx: &TableContext) -> DateTime<Utc> {
        let now = ctx.now();
        let ts = if now > self.updated {
            now
        } else {
            self.updated + TimeDelta::milliseconds(1)
        };
        self.updated = ts;
        ts
    }

    fn raise(&mut self, event: TableEvent) {
        debug!(event = event.name(), "Event raised");
        self.events.push(event);
    }

    fn record(
        &mut self,
        ctx: &TableContext,
        player: PlayerId,
        log_type: LogType,
        parameters: Vec<String>,
    ) -> DateTime<Utc> {
        let ts = self.tick(ctx);
        let user = self
            .player_by_id(player)
            .and_then(|p| p.user_id().clone());
        self.log
            .push(LogEntry::new(player, user, ts, log_type, parameters));
        ts
    }

    fn require_status(
        &self,
        operation: &'static str,
        allowed: &[Status],
    ) -> Result<(), IllegalStateTransition> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(IllegalStateTransition::new(operation, self.status))
        }
    }

    /// Owner's player id, after checking `user` is the owner.
    fn require_owner(&self, user: &UserId) -> Result<PlayerId, ValidationError> {
        if &self.owner != user {
            return Err(ValidationError::MustBeOwner);
        }
        self.player_by_user(user)
            .map(Player::id)
            .ok_or(ValidationError::NotPlayer)
    }

    fn require_state(&self) -> Result<&CurrentState<M::State>, InternalError> {
        self.state.as_ref().ok_or_else(|| {
            InternalError::new(format!("Table {} is {} without a state", self.id, self.status))
        })
    }

    fn index_of_user(&self, user: &UserId) -> Result<usize, ValidationError> {
        self.players
            .iter()
            .position(|p| p.is_user(user))
            .ok_or(ValidationError::NotPlayer)
    }

    fn index_of_player(&self, id: PlayerId) -> Result<usize, ValidationError> {
        self.players
            .iter()
            .position(|p| p.id() == id)
            .ok_or(ValidationError::NotPlayer)
    }

    fn require_invited(&self, user: &UserId) -> Result<usize, ValidationError> {
        let idx = self.index_of_user(user)?;
        if self.players[idx].status() != PlayerStatus::Invited {
            return Err(ValidationError::AlreadyResponded);
        }
        Ok(idx)
    }

    fn require_accepted(&self, user: &UserId) -> Result<usize, ValidationError> {
        let idx = self.index_of_user(user)?;
        if self.players[idx].status() != PlayerStatus::Accepted {
            return Err(ValidationError::NotAccepted);
        }
        Ok(idx)
    }

    fn require_turn(&self, user: &UserId) -> Result<PlayerId, ValidationError> {
        let idx = self.index_of_user(user)?;
        let player = &self.players[idx];
        if !player.turn() {
            return Err(ValidationError::NotYourTurn);
        }
        Ok(player.id())
    }

    /// Runs `apply` on a copy of the live state and makes the copy current.
    fn change_state(
        &mut self,
        ctx: &mut TableContext,
        apply: impl FnOnce(&mut M::State, &mut dyn RngCore) -> Result<(), ModuleError<M>>,
    ) -> OpResult<M> {
        let ts = self.tick(ctx);
        let current = self.require_state()?;
        let mut next = current.state().clone();
        apply(&mut next, ctx.rng()).map_err(TableError::Game)?;

        self.state = Some(current.advance(next, ts));
        self.after_state_change(ctx)
    }

    /// Bookkeeping after the live state was replaced: log in-game events,
    /// move turns, then either end the game or publish the change.
    fn after_state_change(&mut self, ctx: &mut TableContext) -> OpResult<M> {
        let current = self
            .state
            .as_mut()
            .ok_or_else(|| InternalError::new("State change without a state"))?;
        let state = current.state_mut();
        let in_game = state.drain_events();
        let ended = state.is_ended();
        let now_current = if ended {
            Vec::new()
        } else {
            state.current_players()
        };
        let progress = state.progress();

        if let Some(stray) = now_current
            .iter()
            .find(|id| self.player_by_id(**id).is_none())
        {
            return Err(InternalError::new(format!(
                "Current player {stray} is not on the roster of table {}",
                self.id
            ))
            .into());
        }

        for event in in_game {
            let mut parameters = vec![event.kind().clone()];
            parameters.extend(event.parameters().iter().cloned());
            self.record(ctx, event.player(), LogType::InGameEvent, parameters);
        }

        let now = self.tick(ctx);
        let limit = chrono::TimeDelta::from_std(self.module.time_limit(&self.options))
            .ok()
            .and_then(|delta| now.checked_add_signed(delta));

        let losing: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| p.turn() && !now_current.contains(&p.id()))
            .map(Player::id)
            .collect();
        for player in losing {
            let idx = self.index_of_player(player)?;
            self.players[idx].end_turn(now);
            self.record(ctx, player, LogType::EndTurn, Vec::new());
            self.raise(TableEvent::TurnEnded {
                table_id: self.id,
                player_id: player,
            });
        }

        for player in now_current {
            let idx = self.index_of_player(player)?;
            if self.players[idx].turn() {
                continue;
            }
            self.players[idx].begin_turn(limit, now);
            let parameters = limit.map(|l| vec![l.to_rfc3339()]).unwrap_or_default();
            self.record(ctx, player, LogType::BeginTurn, parameters);
            self.raise(TableEvent::TurnBegan {
                table_id: self.id,
                player_id: player,
                limit,
            });
        }

        self.progress = progress;
        if ended {
            self.end(ctx)
        } else {
            self.assign_scores(now, false)?;
            self.raise(TableEvent::StateChanged { table_id: self.id });
            Ok(())
        }
    }

    fn assign_scores(&mut self, now: DateTime<Utc>, with_winners: bool) -> Result<(), InternalError> {
        let state = self.require_state()?.state();
        let scores: Vec<(Option<i32>, bool)> = self
            .players
            .iter()
            .map(|p| {
                let winner = with_winners && state.winners().contains(&p.id());
                (state.score(p.id()), winner)
            })
            .collect();
        for (player, (score, winner)) in self.players.iter_mut().zip(scores) {
            player.assign_score(score, winner, now);
        }
        Ok(())
    }

    fn end(&mut self, ctx: &mut TableContext) -> OpResult<M> {
        let ts = self.tick(ctx);
        self.status = Status::Ended;
        self.ended = Some(ts);
        self.assign_scores(ts, true)?;
        for player in self.players.iter_mut().filter(|p| p.turn()) {
            player.end_turn(ts);
        }

        let owner = self.owner_player()?;
        self.record(ctx, owner, LogType::End, Vec::new());
        self.raise(TableEvent::Ended { table_id: self.id });
        info!(table_id = %self.id, "Game ended");
        Ok(())
    }

    fn owner_player(&self) -> Result<PlayerId, InternalError> {
        self.player_by_user(&self.owner)
            .map(Player::id)
            .ok_or_else(|| InternalError::new(format!("Owner {} has no seat", self.owner)))
    }

    fn abandon_now(&mut self, ctx: &TableContext) {
        let ts = self.tick(ctx);
        self.status = Status::Abandoned;
        for player in self.players.iter_mut().filter(|p| p.turn()) {
            player.end_turn(ts);
        }
        self.raise(TableEvent::Abandoned { table_id: self.id });
        info!(table_id = %self.id, "Table abandoned");
    }

    fn abandon_if_all_agreed(&mut self, ctx: &TableContext) -> OpResult<M> {
        let all_agreed = self
            .players
            .iter()
            .filter(|p| p.is_human() && p.is_playing())
            .all(|p| {
                matches!(
                    p.status(),
                    PlayerStatus::ProposedToLeave | PlayerStatus::AgreedToLeave
                )
            });
        if all_agreed {
            info!("Every player agreed to leave");
            self.abandon_now(ctx);
        }
        Ok(())
    }

    fn after_player_left(
        &mut self,
        ctx: &mut TableContext,
        player: PlayerId,
        user: Option<&UserId>,
    ) -> OpResult<M> {
        if user == Some(&self.owner) {
            let successor = self
                .players
                .iter()
                .find(|p| p.is_human() && p.is_playing())
                .and_then(|p| p.user_id().clone());
            match successor {
                Some(next_owner) => {
                    info!(%next_owner, "Ownership transferred");
                    self.owner = next_owner.clone();
                    self.raise(TableEvent::ChangedOwner {
                        table_id: self.id,
                        user_id: next_owner,
                    });
                }
                None => {
                    self.abandon_now(ctx);
                    return Ok(());
                }
            }
        }

        if self.status != Status::Started {
            return Ok(());
        }

        let playing = self.players.iter().filter(|p| p.is_playing()).count();
        if playing >= self.module.min_players() {
            self.change_state(ctx, |state, rng| state.leave(player, rng))
        } else {
            self.abandon_now(ctx);
            Ok(())
        }
    }
}
