//! User registry.
//!
//! Caches the minimal profile of every connected user and the busy map
//! (user -> table). Balance, energy and the freeze amount are read-only mirrors
//! of the authority's books: the core never computes them, it only copies the
//! values the authority reports when a token is redeemed (see
//! [`UserRegistry::refresh_account`]).

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::error;

use crate::authority::AccountMirror;
use crate::error::{TableError, UserError};
use crate::types::{TableId, UserId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub nickname: String,
    pub energy: i64,
    pub balance: i64,
    pub freezed: i64,
    pub wins: u32,
    pub losses: u32,
}

impl UserProfile {
    pub fn new(id: UserId, nickname: impl Into<String>) -> Self {
        Self {
            id,
            nickname: nickname.into(),
            ..Self::default()
        }
    }
}

/// The closed set of profile updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserUpdate {
    SetNickname(String),
    /// Mirror of the authority's value, applied by [`UserRegistry::refresh_account`].
    SetEnergy(i64),
    /// Mirror of the authority's value, applied by [`UserRegistry::refresh_account`].
    SetBalance(i64),
    /// Mirror of the authority's value, applied by [`UserRegistry::refresh_account`].
    SetFreezed(i64),
    RecordWin,
    RecordLoss,
}

impl UserUpdate {
    fn apply(self, profile: &mut UserProfile) -> Result<(), UserError> {
        let user_id = profile.id;
        let negative = |field, value: i64| {
            (value < 0).then_some(UserError::Negative {
                user_id,
                field,
                value,
            })
        };
        match self {
            UserUpdate::SetNickname(nickname) => profile.nickname = nickname,
            UserUpdate::SetEnergy(v) => {
                if let Some(err) = negative("energy", v) {
                    return Err(err);
                }
                profile.energy = v;
            }
            UserUpdate::SetBalance(v) => {
                if let Some(err) = negative("balance", v) {
                    return Err(err);
                }
                profile.balance = v;
            }
            UserUpdate::SetFreezed(v) => {
                if let Some(err) = negative("freezed", v) {
                    return Err(err);
                }
                profile.freezed = v;
            }
            UserUpdate::RecordWin => profile.wins += 1,
            UserUpdate::RecordLoss => profile.losses += 1,
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Users {
    profiles: HashMap<UserId, UserProfile>,
    busy: HashMap<UserId, TableId>,
}

#[derive(Debug, Default)]
pub struct UserRegistry {
    inner: RwLock<Users>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the profile, or refresh the nickname of a known one.
    pub async fn register(&self, id: UserId, nickname: &str) {
        let mut users = self.inner.write().await;
        users
            .profiles
            .entry(id)
            .and_modify(|p| {
                if p.nickname != nickname {
                    p.nickname = nickname.to_string();
                }
            })
            .or_insert_with(|| UserProfile::new(id, nickname));
    }

    pub async fn get(&self, id: UserId) -> Option<UserProfile> {
        self.inner.read().await.profiles.get(&id).cloned()
    }

    /// Apply a tagged update. Negative amounts are invariant violations.
    pub async fn update(&self, id: UserId, update: UserUpdate) -> Result<(), UserError> {
        let mut users = self.inner.write().await;
        let profile = users.profiles.get_mut(&id).ok_or(UserError::Unknown(id))?;
        update.apply(profile).inspect_err(|err| {
            error!(%err, user_id = id, "rejected profile update");
        })
    }

    /// Copy the authority's books into the cached profile. Stops at the first
    /// rejected (negative) amount.
    pub async fn refresh_account(&self, id: UserId, account: AccountMirror) -> Result<(), UserError> {
        for update in [
            UserUpdate::SetEnergy(account.energy),
            UserUpdate::SetBalance(account.balance),
            UserUpdate::SetFreezed(account.freezed),
        ] {
            self.update(id, update).await?;
        }
        Ok(())
    }

    /// Mark the user as sitting at `table_id`. Re-marking the same table is
    /// fine; any other table is an error.
    pub async fn mark_busy(&self, id: UserId, table_id: TableId) -> Result<(), TableError> {
        let mut users = self.inner.write().await;
        if let Some(&current) = users.busy.get(&id) {
            if current != table_id {
                return Err(TableError::AlreadySeated {
                    user_id: id,
                    table_id: current,
                });
            }
        }
        users.busy.insert(id, table_id);
        Ok(())
    }

    pub async fn busy_table(&self, id: UserId) -> Option<TableId> {
        self.inner.read().await.busy.get(&id).copied()
    }

    /// Clear the busy flag, but only if it still points at `table_id`.
    pub async fn release(&self, id: UserId, table_id: TableId) {
        let mut users = self.inner.write().await;
        if users.busy.get(&id) == Some(&table_id) {
            users.busy.remove(&id);
        }
    }

    /// Copy-out snapshot of every profile, sorted by id.
    pub async fn snapshot(&self) -> Vec<UserProfile> {
        let users = self.inner.read().await;
        let mut out: Vec<UserProfile> = users.profiles.values().cloned().collect();
        out.sort_by_key(|p| p.id);
        out
    }
}
