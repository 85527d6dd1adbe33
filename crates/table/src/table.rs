//! Table - two seats, observers, and the match lifecycle
//!
//! ```text
//!            both seats ready                 start()
//! Waiting ───────────────────────▶ Ready ───────────────▶ Playing
//!    ▲  ◀──────────────────────────┘                        │
//!    │        unready / seat vacated                        │ begin_settlement()
//!    │                                                      ▼
//!    └─────────────────── finish_settlement() ───────── Settling
//!
//! any state ── last occupant leaves / teardown() ──▶ Deleted
//! ```
//!
//! All seat, ready and state fields sit behind one short-lived std mutex. No
//! method awaits while holding it, and nothing here calls the authority; the
//! hall does that around these transitions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::Game;
use crate::error::TableError;
use crate::feed::Feed;
use crate::types::{is_tournament_table, Audience, Seat, TableId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableState {
    Waiting,
    Ready,
    Playing,
    Settling,
    Deleted,
}

/// Where a user sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player(Seat),
    Observer,
}

impl Role {
    /// Feed audience tag of a reader in this role.
    pub fn audience(&self) -> Audience {
        match self {
            Role::Player(seat) => seat.audience(),
            Role::Observer => Audience::Observers,
        }
    }

    pub fn is_observer(&self) -> bool {
        matches!(self, Role::Observer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub user_id: UserId,
    pub nickname: String,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observer {
    user_id: UserId,
    nickname: String,
}

/// The two engines of a live match and everything that must stop with them.
#[derive(Debug)]
pub struct Match {
    games: [Arc<Game>; 2],
    stop: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Match {
    pub fn new(games: [Arc<Game>; 2], stop: watch::Sender<bool>) -> Self {
        Self {
            games,
            stop,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn game(&self, seat: Seat) -> &Arc<Game> {
        &self.games[seat.index()]
    }

    pub fn games(&self) -> &[Arc<Game>; 2] {
        &self.games
    }

    /// Tie a helper task (the match clock) to this match's lifetime.
    pub fn attach(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Stop both engines, abort helper tasks and tell the dispatcher.
    pub fn halt(&self) {
        for game in &self.games {
            game.stop();
        }
        self.stop.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
    }
}

/// What a started settlement works with, copied out of the table.
#[derive(Debug)]
pub struct SettlementTicket {
    pub table_id: TableId,
    pub stake: u64,
    pub players: [Option<Player>; 2],
    pub game: Arc<Match>,
}

/// Result of a ready toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyOutcome {
    pub ready: bool,
    pub state: TableState,
    /// The caller must run the countdown and then call [`Table::start`].
    pub start_countdown: bool,
}

/// Result of a user leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub role: Role,
    /// Nobody is left; the table is now `Deleted`.
    pub empty: bool,
}

/// Copy-out view for hall listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub id: TableId,
    pub title: String,
    pub stake: u64,
    pub host: String,
    pub state: TableState,
    pub tournament: bool,
    pub players: [Option<Player>; 2],
    pub observers: usize,
}

#[derive(Debug)]
struct TableInner {
    title: String,
    stake: u64,
    host: String,
    seats: [Option<Player>; 2],
    observers: Vec<Observer>,
    state: TableState,
    counting_down: bool,
    current: Option<Arc<Match>>,
}

impl TableInner {
    fn seat_of(&self, user_id: UserId) -> Option<Seat> {
        [Seat::One, Seat::Two].into_iter().find(|seat| {
            self.seats[seat.index()]
                .as_ref()
                .is_some_and(|p| p.user_id == user_id)
        })
    }

    fn role_of(&self, user_id: UserId) -> Option<Role> {
        if let Some(seat) = self.seat_of(user_id) {
            return Some(Role::Player(seat));
        }
        self.observers
            .iter()
            .any(|o| o.user_id == user_id)
            .then_some(Role::Observer)
    }

    fn is_empty(&self) -> bool {
        self.seats.iter().all(Option::is_none) && self.observers.is_empty()
    }

    /// Waiting <-> Ready from the seat flags; other states are untouched.
    fn reevaluate(&mut self) {
        if !matches!(self.state, TableState::Waiting | TableState::Ready) {
            return;
        }
        let all_ready = self.seats.iter().all(|s| s.as_ref().is_some_and(|p| p.ready));
        self.state = if all_ready {
            TableState::Ready
        } else {
            TableState::Waiting
        };
    }
}

#[derive(Debug)]
pub struct Table {
    id: TableId,
    feed: Arc<Feed>,
    inner: Mutex<TableInner>,
}

impl Table {
    pub fn new(id: TableId, title: impl Into<String>, stake: u64, host: impl Into<String>) -> Self {
        Self {
            id,
            feed: Arc::new(Feed::new()),
            inner: Mutex::new(TableInner {
                title: title.into(),
                stake,
                host: host.into(),
                seats: [None, None],
                observers: Vec::new(),
                state: TableState::Waiting,
                counting_down: false,
                current: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn is_tournament(&self) -> bool {
        is_tournament_table(self.id)
    }

    pub fn feed(&self) -> &Arc<Feed> {
        &self.feed
    }

    pub fn state(&self) -> TableState {
        self.lock().state
    }

    pub fn stake(&self) -> u64 {
        self.lock().stake
    }

    pub fn summary(&self) -> TableSummary {
        let inner = self.lock();
        TableSummary {
            id: self.id,
            title: inner.title.clone(),
            stake: inner.stake,
            host: inner.host.clone(),
            state: inner.state,
            tournament: self.is_tournament(),
            players: inner.seats.clone(),
            observers: inner.observers.len(),
        }
    }

    pub fn role_of(&self, user_id: UserId) -> Option<Role> {
        self.lock().role_of(user_id)
    }

    /// Every user id at the table, seats first.
    pub fn occupants(&self) -> Vec<UserId> {
        let inner = self.lock();
        inner
            .seats
            .iter()
            .flatten()
            .map(|p| p.user_id)
            .chain(inner.observers.iter().map(|o| o.user_id))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take the first free seat, or join the observers.
    pub fn join(&self, user_id: UserId, nickname: &str, observer: bool) -> Result<Role, TableError> {
        let mut inner = self.lock();
        if inner.state == TableState::Deleted {
            return Err(TableError::NotFound(self.id));
        }
        if inner.role_of(user_id).is_some() {
            return Err(TableError::AlreadySeated {
                user_id,
                table_id: self.id,
            });
        }

        if observer {
            inner.observers.push(Observer {
                user_id,
                nickname: nickname.to_string(),
            });
            return Ok(Role::Observer);
        }

        let seat = [Seat::One, Seat::Two]
            .into_iter()
            .find(|s| inner.seats[s.index()].is_none())
            .ok_or(TableError::SeatFull(self.id))?;
        inner.seats[seat.index()] = Some(Player {
            user_id,
            nickname: nickname.to_string(),
            ready: false,
        });
        inner.reevaluate();
        Ok(Role::Player(seat))
    }

    /// Toggle a seated player's ready flag and re-evaluate the table.
    pub fn switch_ready(&self, user_id: UserId) -> Result<ReadyOutcome, TableError> {
        let mut inner = self.lock();
        if !matches!(inner.state, TableState::Waiting | TableState::Ready) {
            return Err(TableError::WrongState {
                table_id: self.id,
                state: inner.state,
                expected: TableState::Waiting,
            });
        }
        let seat = match inner.role_of(user_id) {
            Some(Role::Player(seat)) => seat,
            Some(Role::Observer) => return Err(TableError::ObserverCannotReady),
            None => return Err(TableError::NotSeated(user_id)),
        };

        let ready = match inner.seats[seat.index()].as_mut() {
            Some(player) => {
                player.ready = !player.ready;
                player.ready
            }
            None => return Err(TableError::NotSeated(user_id)),
        };
        inner.reevaluate();

        let start_countdown = inner.state == TableState::Ready && !inner.counting_down;
        if start_countdown {
            inner.counting_down = true;
        }
        Ok(ReadyOutcome {
            ready,
            state: inner.state,
            start_countdown,
        })
    }

    /// The countdown ended without a start.
    pub fn cancel_countdown(&self) {
        self.lock().counting_down = false;
    }

    /// Enter `Playing` with the given match. Only a `Ready` table starts.
    pub fn start(&self, game: Arc<Match>) -> Result<(), TableError> {
        let mut inner = self.lock();
        if inner.state != TableState::Ready {
            return Err(TableError::WrongState {
                table_id: self.id,
                state: inner.state,
                expected: TableState::Ready,
            });
        }
        inner.state = TableState::Playing;
        inner.counting_down = false;
        inner.current = Some(game);
        Ok(())
    }

    pub fn current_match(&self) -> Option<Arc<Match>> {
        self.lock().current.clone()
    }

    /// `Playing -> Settling`, handing the match to exactly one caller.
    pub fn begin_settlement(&self) -> Option<SettlementTicket> {
        let mut inner = self.lock();
        if inner.state != TableState::Playing {
            return None;
        }
        let game = inner.current.take()?;
        inner.state = TableState::Settling;
        Some(SettlementTicket {
            table_id: self.id,
            stake: inner.stake,
            players: inner.seats.clone(),
            game,
        })
    }

    /// `Settling -> Waiting` with both ready flags cleared.
    pub fn finish_settlement(&self) {
        let mut inner = self.lock();
        if inner.state != TableState::Settling {
            return;
        }
        for player in inner.seats.iter_mut().flatten() {
            player.ready = false;
        }
        inner.state = TableState::Waiting;
    }

    /// Remove the user. The last one out marks the table `Deleted`.
    pub fn leave(&self, user_id: UserId) -> Option<Departure> {
        let mut inner = self.lock();
        let role = inner.role_of(user_id)?;
        match role {
            Role::Player(seat) => inner.seats[seat.index()] = None,
            Role::Observer => inner.observers.retain(|o| o.user_id != user_id),
        }
        inner.reevaluate();

        let empty = inner.is_empty();
        if empty {
            inner.state = TableState::Deleted;
            if let Some(game) = inner.current.take() {
                game.halt();
            }
        }
        Some(Departure { role, empty })
    }

    /// Force the table into `Deleted`, stopping any match without settling it.
    /// Returns everyone who was still at the table.
    pub fn teardown(&self) -> Vec<UserId> {
        let mut inner = self.lock();
        inner.state = TableState::Deleted;
        if let Some(game) = inner.current.take() {
            game.halt();
        }
        let inner = &mut *inner;
        let users = inner
            .seats
            .iter_mut()
            .filter_map(Option::take)
            .map(|p| p.user_id)
            .chain(inner.observers.drain(..).map(|o| o.user_id))
            .collect();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GameConfig;

    fn test_match() -> Arc<Match> {
        let (g1, _) = Game::new(GameConfig::default(), 1).unwrap();
        let (g2, _) = Game::new(GameConfig::default(), 2).unwrap();
        let (stop, _) = watch::channel(false);
        Arc::new(Match::new([g1, g2], stop))
    }

    fn seated_table() -> Table {
        let table = Table::new(1, "t", 5, "127.0.0.1:7788");
        assert_eq!(table.join(10, "ann", false), Ok(Role::Player(Seat::One)));
        assert_eq!(table.join(20, "bob", false), Ok(Role::Player(Seat::Two)));
        table
    }

    #[test]
    fn seats_fill_in_order_then_reject() {
        let table = seated_table();
        assert_eq!(table.join(30, "cid", false), Err(TableError::SeatFull(1)));
        assert_eq!(table.join(30, "cid", true), Ok(Role::Observer));
        assert_eq!(
            table.join(10, "ann", true),
            Err(TableError::AlreadySeated {
                user_id: 10,
                table_id: 1
            })
        );
        assert_eq!(table.occupants(), vec![10, 20, 30]);
    }

    #[test]
    fn ready_from_both_seats_requests_one_countdown() {
        let table = seated_table();
        let first = table.switch_ready(10).unwrap();
        assert_eq!(first.state, TableState::Waiting);
        assert!(!first.start_countdown);

        let second = table.switch_ready(20).unwrap();
        assert_eq!(second.state, TableState::Ready);
        assert!(second.start_countdown);

        // unready and ready again while the countdown runs
        assert_eq!(table.switch_ready(20).unwrap().state, TableState::Waiting);
        let again = table.switch_ready(20).unwrap();
        assert_eq!(again.state, TableState::Ready);
        assert!(!again.start_countdown);
    }

    #[test]
    fn observers_and_strangers_cannot_ready() {
        let table = seated_table();
        table.join(30, "cid", true).unwrap();
        assert_eq!(table.switch_ready(30), Err(TableError::ObserverCannotReady));
        assert_eq!(table.switch_ready(99), Err(TableError::NotSeated(99)));
    }

    #[test]
    fn start_requires_ready() {
        let table = seated_table();
        let err = table.start(test_match()).unwrap_err();
        assert_eq!(
            err,
            TableError::WrongState {
                table_id: 1,
                state: TableState::Waiting,
                expected: TableState::Ready
            }
        );

        table.switch_ready(10).unwrap();
        table.switch_ready(20).unwrap();
        table.start(test_match()).unwrap();
        assert_eq!(table.state(), TableState::Playing);
        assert!(table.current_match().is_some());
        assert!(matches!(
            table.switch_ready(10),
            Err(TableError::WrongState { .. })
        ));
    }

    #[test]
    fn settlement_is_handed_out_once_and_resets_ready() {
        let table = seated_table();
        table.switch_ready(10).unwrap();
        table.switch_ready(20).unwrap();
        table.start(test_match()).unwrap();

        let ticket = table.begin_settlement().unwrap();
        assert_eq!(ticket.stake, 5);
        assert_eq!(ticket.players[1].as_ref().map(|p| p.user_id), Some(20));
        assert!(table.begin_settlement().is_none());
        assert_eq!(table.state(), TableState::Settling);

        table.finish_settlement();
        assert_eq!(table.state(), TableState::Waiting);
        let summary = table.summary();
        assert!(summary.players.iter().flatten().all(|p| !p.ready));
        assert!(table.current_match().is_none());
    }

    #[test]
    fn vacating_a_seat_drops_ready_state() {
        let table = seated_table();
        table.switch_ready(10).unwrap();
        table.switch_ready(20).unwrap();
        assert_eq!(table.state(), TableState::Ready);

        let departure = table.leave(20).unwrap();
        assert_eq!(departure.role, Role::Player(Seat::Two));
        assert!(!departure.empty);
        assert_eq!(table.state(), TableState::Waiting);
        assert!(table.leave(20).is_none());
    }

    #[test]
    fn last_occupant_leaving_deletes() {
        let table = seated_table();
        table.join(30, "cid", true).unwrap();
        assert!(!table.leave(10).unwrap().empty);
        assert!(!table.leave(30).unwrap().empty);
        assert!(table.leave(20).unwrap().empty);
        assert_eq!(table.state(), TableState::Deleted);
        assert_eq!(table.join(40, "dee", false), Err(TableError::NotFound(1)));
    }

    #[test]
    fn teardown_returns_everyone() {
        let table = seated_table();
        table.join(30, "cid", true).unwrap();
        let mut users = table.teardown();
        users.sort();
        assert_eq!(users, vec![10, 20, 30]);
        assert!(table.is_empty());
        assert_eq!(table.state(), TableState::Deleted);
    }
}
