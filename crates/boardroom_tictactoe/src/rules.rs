//! Win and draw detection.

use crate::{Board, Mark, Position, Square};

/// Rows, columns and diagonals.
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Mark owning a complete line, if any.
pub fn winner(board: &Board) -> Option<Mark> {
    let squares = board.squares();
    LINES.iter().find_map(|line| match line.map(|i| squares[i]) {
        [Square::Occupied(a), Square::Occupied(b), Square::Occupied(c)] if a == b && b == c => {
            Some(a)
        }
        _ => None,
    })
}

/// Whether every square is taken.
pub fn is_full(board: &Board) -> bool {
    board.squares().iter().all(|s| *s != Square::Empty)
}

/// A free position that would complete a line for `mark`.
pub fn completing_move(board: &Board, mark: Mark) -> Option<Position> {
    board.valid_moves().into_iter().find(|pos| {
        let mut trial = board.clone();
        trial.set(*pos, mark);
        winner(&trial) == Some(mark)
    })
}
