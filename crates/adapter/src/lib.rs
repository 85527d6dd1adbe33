//! Client-facing transport.
//!
//! Length-prefixed JSON frames over TCP, the `auth`/`chat`/`switchState`/
//! `operate`/`quit`/`ping` command set, environment configuration and the
//! server loop that binds connections to the hall.

pub mod config;
pub mod framing;
pub mod protocol;
pub mod server;

pub use tetris_duel_table as table;
pub use tetris_duel_types as types;

pub use config::{ConfigError, ServerConfig};
pub use framing::{encode_frame, read_frame, write_frame, FrameError, MAX_BODY};
pub use protocol::{Command, CommandError, Request, Response};
pub use server::run_server;
