//! Tetris duel server (workspace facade crate).
//!
//! Re-exports the member crates under short names so binaries, benches and
//! integration tests can write `tetris_duel::{core, engine, table, ...}`.

pub use tetris_duel_adapter as adapter;
pub use tetris_duel_core as core;
pub use tetris_duel_engine as engine;
pub use tetris_duel_table as table;
pub use tetris_duel_types as types;
