//! Core game logic - zone, pieces, scoring
//!
//! Pure, synchronous data-structure logic for one player's playfield. Nothing
//! in this crate knows about timers, channels or other players; the engine
//! crate wraps it in a mutex and drives it.

pub mod pieces;
pub mod rng;
pub mod scoring;
pub mod zone;

pub use tetris_duel_types as types;

pub use pieces::{get_shape, spawn_column, Piece, PieceShape};
pub use rng::{NextPieces, SimpleRng};
pub use scoring::{combo_bonus, score_clear, ScoreOutcome};
pub use zone::{ClearScan, Zone};
