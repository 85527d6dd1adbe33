//! Per-player game engine.
//!
//! Wraps the pure zone logic from `tetris-duel-core` in a mutex-serialized
//! [`Game`] with a supervised drop timer and bounded outbound channels.

pub mod error;
pub mod game;
pub mod message;
pub mod supervisor;

pub use tetris_duel_core as core;
pub use tetris_duel_types as types;

pub use error::EngineError;
pub use game::{Game, GameChannels, GameConfig};
pub use message::{AudioCue, GameMessage};
pub use supervisor::supervise;
