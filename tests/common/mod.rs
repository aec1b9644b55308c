//! Shared fixtures for table tests: a small scripted game, clocks and
//! recording collaborators.

#![allow(dead_code)]

use boardroom::{
    ManualClock, Mode, Notifier, RepositoryError, Session, TableContext, TableEvent, TableId,
    Tables, UserId,
};
use boardroom_game::{
    ActionSequencer, GameModule, GameState, InGameEvent, Options, PlayerColor, PlayerId,
    PossibleAction, Seat, SequenceError,
};
use chrono::{DateTime, TimeDelta, Utc};
use derive_more::Display;
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Turn steps of the counting game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Add,
    Bonus,
}

/// Moves of the counting game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountingAction {
    /// Adds to the mover's total; mandatory once per turn.
    Add(i32),
    /// Optional extra point after adding.
    Bonus,
    /// Hands the turn to an arbitrary player id.
    Summon(PlayerId),
    /// Gives every remaining player the turn at once.
    Huddle,
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum CountingError {
    #[display("{_0} is not current")]
    NotCurrent(PlayerId),
    #[display("{_0}")]
    Sequence(SequenceError<Step>),
}

impl std::error::Error for CountingError {}

impl From<SequenceError<Step>> for CountingError {
    fn from(err: SequenceError<Step>) -> Self {
        CountingError::Sequence(err)
    }
}

/// Players take turns adding to their totals; the first to reach the
/// target wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountingState {
    active: Vec<PlayerId>,
    turn: usize,
    totals: Vec<(PlayerId, i32)>,
    target: i32,
    undo: bool,
    /// Keeps reporting every player as current after the game ended.
    linger: bool,
    huddle: bool,
    stranger: Option<PlayerId>,
    winner: Option<PlayerId>,
    sequencer: ActionSequencer<Step>,
    #[serde(skip)]
    events: Vec<InGameEvent>,
}

fn turn_frames() -> [PossibleAction<Step>; 2] {
    [
        PossibleAction::Mandatory(Step::Add),
        PossibleAction::Optional(Step::Bonus),
    ]
}

impl CountingState {
    pub fn total(&self, player: PlayerId) -> i32 {
        self.totals
            .iter()
            .find(|(id, _)| *id == player)
            .map_or(0, |(_, total)| *total)
    }

    fn credit(&mut self, player: PlayerId, amount: i32) {
        if let Some((_, total)) = self.totals.iter_mut().find(|(id, _)| *id == player) {
            *total += amount;
            if *total >= self.target {
                self.winner = Some(player);
            }
        }
    }

    fn require_current(&self, player: PlayerId) -> Result<(), CountingError> {
        if self.current_players().contains(&player) {
            Ok(())
        } else {
            Err(CountingError::NotCurrent(player))
        }
    }
}

impl GameState for CountingState {
    type Action = CountingAction;
    type Error = CountingError;

    fn perform(
        &mut self,
        player: PlayerId,
        action: CountingAction,
        _rng: &mut dyn RngCore,
    ) -> Result<(), CountingError> {
        self.require_current(player)?;
        match action {
            CountingAction::Add(amount) => {
                self.sequencer.perform(Step::Add)?;
                self.credit(player, amount);
                self.events
                    .push(InGameEvent::new(player, "added".to_string(), vec![amount.to_string()]));
            }
            CountingAction::Bonus => {
                self.sequencer.perform(Step::Bonus)?;
                self.credit(player, 1);
            }
            CountingAction::Summon(other) => self.stranger = Some(other),
            CountingAction::Huddle => self.huddle = true,
        }
        Ok(())
    }

    fn skip(&mut self, player: PlayerId, _rng: &mut dyn RngCore) -> Result<(), CountingError> {
        self.require_current(player)?;
        Ok(self.sequencer.skip()?)
    }

    fn end_turn(&mut self, player: PlayerId, _rng: &mut dyn RngCore) -> Result<(), CountingError> {
        self.require_current(player)?;
        self.sequencer.skip_all()?;
        self.huddle = false;
        self.turn = (self.turn + 1) % self.active.len();
        self.sequencer.push_all(turn_frames());
        Ok(())
    }

    fn leave(&mut self, player: PlayerId, _rng: &mut dyn RngCore) -> Result<(), CountingError> {
        if let Some(idx) = self.active.iter().position(|id| *id == player) {
            let current = self.active[self.turn];
            self.active.remove(idx);
            if self.active.is_empty() {
                return Ok(());
            }
            if current == player {
                self.turn = idx % self.active.len();
                self.sequencer.clear();
                self.sequencer.push_all(turn_frames());
            } else {
                self.turn = self
                    .active
                    .iter()
                    .position(|id| *id == current)
                    .unwrap_or(0);
            }
        }
        if self.active.len() == 1 {
            self.winner = self.active.first().copied();
        }
        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.winner.is_some()
    }

    fn current_players(&self) -> Vec<PlayerId> {
        if self.is_ended() {
            if self.linger {
                self.active.clone()
            } else {
                Vec::new()
            }
        } else if let Some(stranger) = self.stranger {
            vec![stranger]
        } else if self.huddle {
            self.active.clone()
        } else {
            vec![self.active[self.turn]]
        }
    }

    fn score(&self, player: PlayerId) -> Option<i32> {
        Some(self.total(player))
    }

    fn winners(&self) -> Vec<PlayerId> {
        self.winner.into_iter().collect()
    }

    fn can_undo(&self) -> bool {
        self.undo
    }

    fn progress(&self) -> u8 {
        let best = self.totals.iter().map(|(_, t)| *t).max().unwrap_or(0);
        u8::try_from((best * 100 / self.target).clamp(0, 100)).unwrap_or(100)
    }

    fn drain_events(&mut self) -> Vec<InGameEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Module of the counting game.
#[derive(Debug, Clone)]
pub struct Counting {
    pub min_players: usize,
    pub max_players: usize,
    pub automa: bool,
}

impl Counting {
    pub const ID: &'static str = "counting";
    pub const TURN_LIMIT: Duration = Duration::from_secs(3600);
}

impl Default for Counting {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 4,
            automa: true,
        }
    }
}

impl GameModule for Counting {
    type State = CountingState;

    fn id(&self) -> &str {
        Self::ID
    }

    fn min_players(&self) -> usize {
        self.min_players
    }

    fn max_players(&self) -> usize {
        self.max_players
    }

    fn supported_colors(&self) -> Vec<PlayerColor> {
        vec![
            PlayerColor::White,
            PlayerColor::Black,
            PlayerColor::Red,
            PlayerColor::Blue,
        ]
    }

    fn time_limit(&self, _options: &Options) -> Duration {
        Self::TURN_LIMIT
    }

    fn has_automa(&self) -> bool {
        self.automa
    }

    fn start(
        &self,
        seats: &[Seat],
        options: &Options,
        _rng: &mut dyn RngCore,
    ) -> Result<CountingState, CountingError> {
        let target = options
            .get_u64("target")
            .and_then(|t| i32::try_from(t).ok())
            .unwrap_or(10);
        Ok(CountingState {
            active: seats.iter().map(|s| s.id()).collect(),
            turn: 0,
            totals: seats.iter().map(|s| (s.id(), 0)).collect(),
            target,
            undo: options.get_bool("undo").unwrap_or(true),
            linger: options.get_bool("linger").unwrap_or(false),
            huddle: false,
            stranger: None,
            winner: None,
            sequencer: ActionSequencer::initial(turn_frames()),
            events: Vec::new(),
        })
    }

    fn execute_automa(
        &self,
        state: &mut CountingState,
        player: PlayerId,
        rng: &mut dyn RngCore,
    ) -> Result<(), CountingError> {
        state.perform(player, CountingAction::Add(1), rng)?;
        if !state.is_ended() {
            state.end_turn(player, rng)?;
        }
        Ok(())
    }
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
}

/// Context on a manual clock, returned with the clock to move it.
pub fn manual_context(seed: u64) -> (Arc<ManualClock>, TableContext) {
    let clock = Arc::new(ManualClock::new(start_time()));
    let ctx = TableContext::new(clock.clone(), ChaCha8Rng::seed_from_u64(seed));
    (clock, ctx)
}

pub fn alice() -> UserId {
    UserId::new("alice")
}

pub fn bob() -> UserId {
    UserId::new("bob")
}

pub fn carol() -> UserId {
    UserId::new("carol")
}

/// New counting table owned by alice.
pub fn new_table(ctx: &mut TableContext, mode: Mode) -> Session<Counting> {
    new_table_with(ctx, Counting::default(), mode, Options::new())
}

pub fn new_table_with(
    ctx: &mut TableContext,
    module: Counting,
    mode: Mode,
    options: Options,
) -> Session<Counting> {
    Session::create(ctx, Arc::new(module), mode, alice(), options)
}

/// Started table with alice and bob; alice holds the first turn.
pub fn started_table(ctx: &mut TableContext, mode: Mode) -> Session<Counting> {
    started_table_with(ctx, mode, Options::new())
}

pub fn started_table_with(
    ctx: &mut TableContext,
    mode: Mode,
    options: Options,
) -> Session<Counting> {
    let mut session = new_table_with(ctx, Counting::default(), mode, options);
    session.invite(ctx, &alice(), bob()).expect("invite bob");
    session.accept_invite(ctx, &bob()).expect("bob accepts");
    session.start(ctx, &alice()).expect("start");
    session.drain_events();
    session
}

/// User holding the turn.
pub fn user_on_turn(session: &Session<Counting>) -> UserId {
    session
        .current_players()
        .first()
        .and_then(|p| p.user_id().clone())
        .expect("a human holds the turn")
}

/// Plays one full turn of `amount` for whoever is up.
pub fn play_turn(ctx: &mut TableContext, session: &mut Session<Counting>, amount: i32) {
    let user = user_on_turn(session);
    session
        .perform(ctx, &user, CountingAction::Add(amount))
        .expect("add");
    if session.is_active() {
        session.end_turn(ctx, &user).expect("end turn");
    }
}

pub fn clock_step(clock: &ManualClock) {
    clock.advance(TimeDelta::seconds(1));
}

/// Notifier remembering every event.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<TableEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<TableEvent> {
        self.events.lock().expect("lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &TableEvent) {
        self.events.lock().expect("lock").push(event.clone());
    }
}

/// Store whose updates always lose the race, counting the attempts.
#[derive(Debug)]
pub struct ConflictingTables<T> {
    pub inner: T,
    pub updates: AtomicUsize,
    /// Updates to fail before letting one through; `usize::MAX` for never.
    pub fail_first: usize,
}

impl<T> ConflictingTables<T> {
    pub fn new(inner: T, fail_first: usize) -> Self {
        Self {
            inner,
            updates: AtomicUsize::new(0),
            fail_first,
        }
    }

    pub fn attempts(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl<M: GameModule, T: Tables<M>> Tables<M> for ConflictingTables<T> {
    fn find_by_id(&self, id: TableId) -> Result<Session<M>, RepositoryError> {
        self.inner.find_by_id(id)
    }

    fn add(&self, session: &mut Session<M>) -> Result<(), RepositoryError> {
        self.inner.add(session)
    }

    fn update(&self, session: &mut Session<M>) -> Result<(), RepositoryError> {
        let attempt = self.updates.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(RepositoryError::Conflict {
                table_id: session.id(),
                expected: session.version(),
            });
        }
        self.inner.update(session)
    }

    fn find_active_by_user(&self, user: &UserId) -> Result<Vec<Session<M>>, RepositoryError> {
        self.inner.find_active_by_user(user)
    }

    fn find_recent_by_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<Session<M>>, RepositoryError> {
        self.inner.find_recent_by_user(user, limit)
    }
}
