//! Table orchestration.
//!
//! Tables and their registry, the per-table event feed, the user registry,
//! the account authority boundary, and the [`Hall`] service that ties them to
//! live matches through a dispatcher and settlement.

pub mod authority;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod hall;
pub mod registry;
pub mod settlement;
pub mod table;
pub mod users;

pub use tetris_duel_core as core;
pub use tetris_duel_engine as engine;
pub use tetris_duel_types as types;

pub use authority::{
    parse_local_token, AccountMirror, Authority, AuthorityCall, Credentials, EntryMode, LocalAuthority,
};
pub use error::{AuthorityError, TableError, UserError};
pub use feed::{Feed, Poll, PollPolicy, Response};
pub use hall::{Hall, HallConfig, Session};
pub use registry::TableRegistry;
pub use settlement::{evaluate, Outcome, Settled};
pub use table::{Departure, Match, Player, ReadyOutcome, Role, Table, TableState, TableSummary};
pub use users::{UserProfile, UserRegistry, UserUpdate};
