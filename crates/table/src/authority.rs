//! Account authority boundary.
//!
//! Everything about accounts, wallets and tournament brackets lives behind the
//! [`Authority`] trait. Calls are made without any table lock held.
//!
//! [`LocalAuthority`] is an in-process implementation: it accepts plain
//! `user_id:nickname:table_id:mode` tokens, grants every request and records
//! each call. The binary uses it when no external authority is wired in and
//! tests use it to observe settlement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::error::AuthorityError;
use crate::types::{is_tournament_table, TableId, UserId, TOURNAMENT_TABLE_ID_BASE};

/// How a connecting user wants to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// Take a seat at a hall table.
    Play,
    /// Watch a table.
    Observe,
    /// Enter the tournament; the authority picks the table.
    Apply,
}

/// The authority's books for one user at redemption time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountMirror {
    pub energy: i64,
    pub balance: i64,
    pub freezed: i64,
}

/// Identity carried by a redeemed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: UserId,
    pub nickname: String,
    pub table_id: TableId,
    pub mode: EntryMode,
    pub account: AccountMirror,
}

impl Credentials {
    pub fn is_tournament(&self) -> bool {
        self.mode == EntryMode::Apply || is_tournament_table(self.table_id)
    }
}

#[async_trait::async_trait]
pub trait Authority: Send + Sync {
    /// Validate a connection token.
    async fn redeem_token(&self, token: &str) -> Result<Credentials, AuthorityError>;

    async fn join(&self, table_id: TableId, user_id: UserId, observer: bool) -> Result<(), AuthorityError>;

    async fn quit(&self, table_id: TableId, user_id: UserId, tournament: bool) -> Result<(), AuthorityError>;

    async fn switch_ready(&self, table_id: TableId, user_id: UserId) -> Result<(), AuthorityError>;

    async fn set_normal_game_result(
        &self,
        table_id: TableId,
        winner: UserId,
        loser: UserId,
    ) -> Result<(), AuthorityError>;

    /// Report a tournament game. Returns the winner's next table, `None` after
    /// the final.
    async fn set_tournament_result(
        &self,
        table_id: TableId,
        winner: UserId,
        loser: UserId,
    ) -> Result<Option<TableId>, AuthorityError>;

    /// Enter the tournament, returns the assigned table.
    async fn apply(&self, user_id: UserId) -> Result<TableId, AuthorityError>;

    async fn observe_tournament(&self, table_id: TableId, user_id: UserId) -> Result<(), AuthorityError>;
}

/// One call received by [`LocalAuthority`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityCall {
    Join {
        table_id: TableId,
        user_id: UserId,
        observer: bool,
    },
    Quit {
        table_id: TableId,
        user_id: UserId,
        tournament: bool,
    },
    SwitchReady {
        table_id: TableId,
        user_id: UserId,
    },
    NormalResult {
        table_id: TableId,
        winner: UserId,
        loser: UserId,
    },
    TournamentResult {
        table_id: TableId,
        winner: UserId,
        loser: UserId,
    },
    Apply {
        user_id: UserId,
    },
    ObserveTournament {
        table_id: TableId,
        user_id: UserId,
    },
}

impl AuthorityCall {
    pub fn is_settlement(&self) -> bool {
        matches!(
            self,
            AuthorityCall::NormalResult { .. } | AuthorityCall::TournamentResult { .. }
        )
    }
}

/// In-process authority that grants everything and records every call.
#[derive(Debug, Default)]
pub struct LocalAuthority {
    calls: Mutex<Vec<AuthorityCall>>,
    applicants: AtomicU32,
    settlement_down: AtomicBool,
    accounts: Mutex<HashMap<UserId, AccountMirror>>,
}

impl LocalAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make result reports fail as if the authority were unreachable.
    pub fn set_settlement_down(&self, down: bool) {
        self.settlement_down.store(down, Ordering::SeqCst);
    }

    /// Books reported for `user_id` on every later token redemption.
    pub fn set_account(&self, user_id: UserId, account: AccountMirror) {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, account);
    }

    pub fn calls(&self) -> Vec<AuthorityCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn settlements(&self) -> Vec<AuthorityCall> {
        self.calls().into_iter().filter(AuthorityCall::is_settlement).collect()
    }

    fn record(&self, call: AuthorityCall) {
        info!(?call, "authority call");
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn settlement_guard(&self) -> Result<(), AuthorityError> {
        if self.settlement_down.load(Ordering::SeqCst) {
            return Err(AuthorityError::Unavailable("settlement offline".into()));
        }
        Ok(())
    }
}

/// Parse `user_id:nickname:table_id:mode` where mode is `play`, `observe` or
/// `apply`.
pub fn parse_local_token(token: &str) -> Result<Credentials, AuthorityError> {
    let reject = || AuthorityError::Rejected(format!("malformed token {token:?}"));
    let mut parts = token.trim().split(':');
    let (Some(uid), Some(nickname), Some(tid), Some(mode), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(reject());
    };

    let user_id = uid.parse().map_err(|_| reject())?;
    let table_id = tid.parse().map_err(|_| reject())?;
    if nickname.is_empty() {
        return Err(reject());
    }
    let mode = match mode {
        "play" => EntryMode::Play,
        "observe" => EntryMode::Observe,
        "apply" => EntryMode::Apply,
        _ => return Err(reject()),
    };

    Ok(Credentials {
        user_id,
        nickname: nickname.to_string(),
        table_id,
        mode,
        account: AccountMirror::default(),
    })
}

#[async_trait::async_trait]
impl Authority for LocalAuthority {
    async fn redeem_token(&self, token: &str) -> Result<Credentials, AuthorityError> {
        let mut creds = parse_local_token(token)?;
        if let Some(account) = self
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&creds.user_id)
        {
            creds.account = *account;
        }
        Ok(creds)
    }

    async fn join(&self, table_id: TableId, user_id: UserId, observer: bool) -> Result<(), AuthorityError> {
        self.record(AuthorityCall::Join {
            table_id,
            user_id,
            observer,
        });
        Ok(())
    }

    async fn quit(&self, table_id: TableId, user_id: UserId, tournament: bool) -> Result<(), AuthorityError> {
        self.record(AuthorityCall::Quit {
            table_id,
            user_id,
            tournament,
        });
        Ok(())
    }

    async fn switch_ready(&self, table_id: TableId, user_id: UserId) -> Result<(), AuthorityError> {
        self.record(AuthorityCall::SwitchReady { table_id, user_id });
        Ok(())
    }

    async fn set_normal_game_result(
        &self,
        table_id: TableId,
        winner: UserId,
        loser: UserId,
    ) -> Result<(), AuthorityError> {
        self.record(AuthorityCall::NormalResult {
            table_id,
            winner,
            loser,
        });
        self.settlement_guard()
    }

    async fn set_tournament_result(
        &self,
        table_id: TableId,
        winner: UserId,
        loser: UserId,
    ) -> Result<Option<TableId>, AuthorityError> {
        self.record(AuthorityCall::TournamentResult {
            table_id,
            winner,
            loser,
        });
        self.settlement_guard()?;
        Ok(None)
    }

    async fn apply(&self, user_id: UserId) -> Result<TableId, AuthorityError> {
        self.record(AuthorityCall::Apply { user_id });
        // two applicants per table
        let n = self.applicants.fetch_add(1, Ordering::SeqCst);
        Ok(TOURNAMENT_TABLE_ID_BASE + n / 2)
    }

    async fn observe_tournament(&self, table_id: TableId, user_id: UserId) -> Result<(), AuthorityError> {
        self.record(AuthorityCall::ObserveTournament { table_id, user_id });
        Ok(())
    }
}
