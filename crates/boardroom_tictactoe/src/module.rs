//! Module registration and the computer opponent.

use crate::{Position, TicTacToeAction, TicTacToeError, TicTacToeState, rules};
use boardroom_game::{GameModule, GameState, Options, PlayerColor, PlayerId, Seat};
use rand::RngCore;
use rand::seq::SliceRandom;
use std::time::Duration;
use tracing::{debug, instrument};

/// Option key overriding the per-turn time limit, in seconds.
pub const TIME_LIMIT_OPTION: &str = "time_limit_secs";

const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Tic-tac-toe as a pluggable module. White plays X and moves first.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicTacToe;

impl TicTacToe {
    /// Catalog key.
    pub const ID: &'static str = "tictactoe";

    /// Move the automa picks: win, block, center, then random.
    pub fn choose_move(state: &TicTacToeState, rng: &mut dyn RngCore) -> Option<Position> {
        let mark = state.to_move();
        let board = state.board();
        rules::completing_move(board, mark)
            .or_else(|| rules::completing_move(board, mark.opponent()))
            .or_else(|| board.is_empty(Position::Center).then_some(Position::Center))
            .or_else(|| board.valid_moves().choose(rng).copied())
    }
}

impl GameModule for TicTacToe {
    type State = TicTacToeState;

    fn id(&self) -> &str {
        Self::ID
    }

    fn min_players(&self) -> usize {
        2
    }

    fn max_players(&self) -> usize {
        2
    }

    fn supported_colors(&self) -> Vec<PlayerColor> {
        vec![PlayerColor::White, PlayerColor::Black]
    }

    fn time_limit(&self, options: &Options) -> Duration {
        options
            .get_u64(TIME_LIMIT_OPTION)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIME_LIMIT)
    }

    fn has_automa(&self) -> bool {
        true
    }

    #[instrument(skip(self, _options, _rng))]
    fn start(
        &self,
        seats: &[Seat],
        _options: &Options,
        _rng: &mut dyn RngCore,
    ) -> Result<TicTacToeState, TicTacToeError> {
        let seat_for = |color| {
            seats
                .iter()
                .find(|seat| seat.color() == color)
                .map(Seat::id)
        };

        match (seats.len(), seat_for(PlayerColor::White), seat_for(PlayerColor::Black)) {
            (2, Some(x), Some(o)) => Ok(TicTacToeState::new(x, o)),
            (n, _, _) => Err(TicTacToeError::InvalidSeating(n)),
        }
    }

    #[instrument(skip(self, state, rng), fields(%player))]
    fn execute_automa(
        &self,
        state: &mut TicTacToeState,
        player: PlayerId,
        rng: &mut dyn RngCore,
    ) -> Result<(), TicTacToeError> {
        if state.mark_of(player) != Some(state.to_move()) {
            return Err(TicTacToeError::NotYourTurn(player));
        }
        let pos = Self::choose_move(state, rng).ok_or(TicTacToeError::GameOver)?;
        debug!(%pos, "Automa move");

        state.perform(player, TicTacToeAction::Place(pos), rng)?;
        if !state.is_ended() {
            state.end_turn(player, rng)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GameStatus, Mark};
    use boardroom_game::PlayerKind;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn seats() -> (PlayerId, PlayerId, Vec<Seat>) {
        let x = PlayerId::generate();
        let o = PlayerId::generate();
        let seats = vec![
            Seat::new(o, PlayerColor::Black, PlayerKind::Computer),
            Seat::new(x, PlayerColor::White, PlayerKind::Human),
        ];
        (x, o, seats)
    }

    #[test]
    fn test_white_moves_first() {
        let (x, _, seats) = seats();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let state = TicTacToe
            .start(&seats, &Options::new(), &mut rng)
            .expect("valid seating");
        assert_eq!(state.current_players(), vec![x]);
        assert_eq!(state.mark_of(x), Some(Mark::X));
    }

    #[test]
    fn test_start_rejects_wrong_seating() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let seats = vec![Seat::new(
            PlayerId::generate(),
            PlayerColor::White,
            PlayerKind::Human,
        )];
        assert_eq!(
            TicTacToe.start(&seats, &Options::new(), &mut rng).unwrap_err(),
            TicTacToeError::InvalidSeating(1)
        );
    }

    #[test]
    fn test_time_limit_option() {
        let options = Options::new().with(TIME_LIMIT_OPTION, 90u64);
        assert_eq!(TicTacToe.time_limit(&options), Duration::from_secs(90));
        assert_eq!(TicTacToe.time_limit(&Options::new()), DEFAULT_TIME_LIMIT);
    }

    #[test]
    fn test_automa_takes_center_then_passes_turn() {
        let (x, o, seats) = seats();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut state = TicTacToe
            .start(&seats, &Options::new(), &mut rng)
            .expect("start");

        TicTacToe
            .execute_automa(&mut state, x, &mut rng)
            .expect("automa turn");
        assert_eq!(state.history(), &[Position::Center]);
        assert_eq!(state.current_players(), vec![o]);
    }

    #[test]
    fn test_automa_blocks_opponent() {
        let (x, o, seats) = seats();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut state = TicTacToe
            .start(&seats, &Options::new(), &mut rng)
            .expect("start");

        for (player, pos) in [(x, Position::TopLeft), (o, Position::Center), (x, Position::TopCenter)] {
            state
                .perform(player, TicTacToeAction::Place(pos), &mut rng)
                .expect("place");
            state.end_turn(player, &mut rng).expect("end turn");
        }

        TicTacToe
            .execute_automa(&mut state, o, &mut rng)
            .expect("automa turn");
        assert_eq!(state.history().last(), Some(&Position::TopRight));
        assert_eq!(state.status(), GameStatus::InProgress);
    }

    #[test]
    fn test_automa_rejects_wrong_player() {
        let (_, o, seats) = seats();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut state = TicTacToe
            .start(&seats, &Options::new(), &mut rng)
            .expect("start");
        assert_eq!(
            TicTacToe.execute_automa(&mut state, o, &mut rng),
            Err(TicTacToeError::NotYourTurn(o))
        );
    }
}
