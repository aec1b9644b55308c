//! Game state driven by the action sequencer.
//!
//! Each turn declares a single mandatory `Place` obligation. The mark goes
//! down with [`GameState::perform`]; the turn passes with
//! [`GameState::end_turn`], which refuses while the obligation is still open.

use crate::{Board, Mark, Position, TicTacToeError, rules};
use boardroom_game::{ActionSequencer, GameState, InGameEvent, PlayerId, PossibleAction};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Sequencing kind of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    /// Put a mark on a free square.
    Place,
}

/// A player's move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicTacToeAction {
    /// Place the player's mark.
    Place(Position),
}

impl TicTacToeAction {
    /// Sequencing kind of this action.
    pub fn kind(&self) -> MoveKind {
        match self {
            TicTacToeAction::Place(_) => MoveKind::Place,
        }
    }
}

/// How the game stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    /// Still being played.
    InProgress,
    /// Someone completed a line, or the other player left.
    Won(Mark),
    /// Board full without a line.
    Draw,
}

/// Live tic-tac-toe game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicTacToeState {
    board: Board,
    x: PlayerId,
    o: PlayerId,
    to_move: Mark,
    status: GameStatus,
    history: Vec<Position>,
    sequencer: ActionSequencer<MoveKind>,
    #[serde(skip)]
    events: Vec<InGameEvent>,
}

fn turn_obligations() -> ActionSequencer<MoveKind> {
    ActionSequencer::initial([PossibleAction::Mandatory(MoveKind::Place)])
}

impl TicTacToeState {
    /// New game, `x` moves first.
    pub fn new(x: PlayerId, o: PlayerId) -> Self {
        Self {
            board: Board::new(),
            x,
            o,
            to_move: Mark::X,
            status: GameStatus::InProgress,
            history: Vec::new(),
            sequencer: turn_obligations(),
            events: Vec::new(),
        }
    }

    /// The board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Current status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Positions played, in order.
    pub fn history(&self) -> &[Position] {
        &self.history
    }

    /// Mark whose turn it is.
    pub fn to_move(&self) -> Mark {
        self.to_move
    }

    /// Turn-local obligations.
    pub fn sequencer(&self) -> &ActionSequencer<MoveKind> {
        &self.sequencer
    }

    /// Player holding `mark`.
    pub fn player_for(&self, mark: Mark) -> PlayerId {
        match mark {
            Mark::X => self.x,
            Mark::O => self.o,
        }
    }

    /// Mark held by `player`.
    pub fn mark_of(&self, player: PlayerId) -> Option<Mark> {
        if player == self.x {
            Some(Mark::X)
        } else if player == self.o {
            Some(Mark::O)
        } else {
            None
        }
    }

    fn require_turn(&self, player: PlayerId) -> Result<Mark, TicTacToeError> {
        if self.status != GameStatus::InProgress {
            return Err(TicTacToeError::GameOver);
        }
        let mark = self
            .mark_of(player)
            .ok_or(TicTacToeError::UnknownPlayer(player))?;
        if mark != self.to_move {
            return Err(TicTacToeError::NotYourTurn(player));
        }
        Ok(mark)
    }

    fn finish(&mut self, status: GameStatus) {
        info!(?status, "Game over");
        self.status = status;
        self.sequencer.clear();
        match status {
            GameStatus::Won(mark) => self.events.push(InGameEvent::new(
                self.player_for(mark),
                "won".to_string(),
                vec![mark.to_string()],
            )),
            GameStatus::Draw => self.events.push(InGameEvent::new(
                self.x,
                "draw".to_string(),
                Vec::new(),
            )),
            GameStatus::InProgress => {}
        }
    }
}

impl GameState for TicTacToeState {
    type Action = TicTacToeAction;
    type Error = TicTacToeError;

    #[instrument(skip(self, _rng), fields(%player))]
    fn perform(
        &mut self,
        player: PlayerId,
        action: TicTacToeAction,
        _rng: &mut dyn RngCore,
    ) -> Result<(), TicTacToeError> {
        let mark = self.require_turn(player)?;
        let TicTacToeAction::Place(pos) = action;

        if !self.board.is_empty(pos) {
            return Err(TicTacToeError::SquareOccupied(pos));
        }
        self.sequencer.perform(action.kind())?;

        self.board.set(pos, mark);
        self.history.push(pos);
        self.events.push(InGameEvent::new(
            player,
            "placed".to_string(),
            vec![mark.to_string(), pos.to_index().to_string()],
        ));
        debug!(%pos, %mark, "Mark placed");

        if let Some(winner) = rules::winner(&self.board) {
            self.finish(GameStatus::Won(winner));
        } else if rules::is_full(&self.board) {
            self.finish(GameStatus::Draw);
        }
        Ok(())
    }

    #[instrument(skip(self, _rng), fields(%player))]
    fn skip(&mut self, player: PlayerId, _rng: &mut dyn RngCore) -> Result<(), TicTacToeError> {
        self.require_turn(player)?;
        self.sequencer.skip()?;
        Ok(())
    }

    #[instrument(skip(self, _rng), fields(%player))]
    fn end_turn(&mut self, player: PlayerId, _rng: &mut dyn RngCore) -> Result<(), TicTacToeError> {
        let mark = self.require_turn(player)?;
        if !self.sequencer.is_empty() {
            return Err(TicTacToeError::TurnNotFinished);
        }
        self.to_move = mark.opponent();
        self.sequencer = turn_obligations();
        Ok(())
    }

    #[instrument(skip(self, _rng), fields(%player))]
    fn leave(&mut self, player: PlayerId, _rng: &mut dyn RngCore) -> Result<(), TicTacToeError> {
        if self.status != GameStatus::InProgress {
            return Err(TicTacToeError::GameOver);
        }
        let mark = self
            .mark_of(player)
            .ok_or(TicTacToeError::UnknownPlayer(player))?;
        self.finish(GameStatus::Won(mark.opponent()));
        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.status != GameStatus::InProgress
    }

    fn current_players(&self) -> Vec<PlayerId> {
        match self.status {
            GameStatus::InProgress => vec![self.player_for(self.to_move)],
            _ => Vec::new(),
        }
    }

    fn score(&self, player: PlayerId) -> Option<i32> {
        let mark = self.mark_of(player)?;
        Some(match self.status {
            GameStatus::Won(winner) if winner == mark => 1,
            _ => 0,
        })
    }

    fn winners(&self) -> Vec<PlayerId> {
        match self.status {
            GameStatus::Won(mark) => vec![self.player_for(mark)],
            _ => Vec::new(),
        }
    }

    fn can_undo(&self) -> bool {
        !self.is_ended()
    }

    fn progress(&self) -> u8 {
        if self.is_ended() {
            return 100;
        }
        (self.board.marks_placed() * 100 / 9) as u8
    }

    fn drain_events(&mut self) -> Vec<InGameEvent> {
        std::mem::take(&mut self.events)
    }
}
