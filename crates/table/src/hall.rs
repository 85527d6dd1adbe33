//! Hall service - the table-side entry point for every client command
//!
//! A [`Hall`] owns the table registry, the user registry and a handle to the
//! account [`Authority`]. Transports turn client commands into calls on it:
//!
//! | command | call |
//! |---------|------|
//! | auth | [`Hall::enter`] |
//! | chat | [`Hall::chat`] |
//! | switchState | [`Hall::switch_ready`] |
//! | operate | [`Hall::operate`] |
//! | quit / disconnect | [`Hall::quit`] |
//! | (poller) | [`Hall::get_data`] |
//!
//! Authority calls are always made with no table lock held. Table locks are
//! only taken inside the short synchronous [`Table`] methods.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::json;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::authority::{Authority, Credentials, EntryMode};
use crate::dispatcher::{run_countdown, run_dispatcher, run_match_clock, MatchChannels};
use crate::engine::{supervise, Game, GameConfig};
use crate::error::TableError;
use crate::feed::{Feed, Poll, PollPolicy, Response};
use crate::registry::TableRegistry;
use crate::settlement::Outcome;
use crate::table::{Match, Role, Table, TableState, TableSummary};
use crate::types::{is_tournament_table, Audience, Operation, ResponseDesc, Seat, TableId, UserId};
use crate::users::UserRegistry;

/// Default match length.
const DEFAULT_MATCH_SECS: u64 = 180;

#[derive(Debug, Clone)]
pub struct HallConfig {
    pub game: GameConfig,
    pub match_length: Duration,
    /// Interval between countdown ticks.
    pub countdown_tick: Duration,
    pub poll: PollPolicy,
    /// Host binding recorded on new tables.
    pub host: String,
}

impl Default for HallConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            match_length: Duration::from_secs(DEFAULT_MATCH_SECS),
            countdown_tick: Duration::from_secs(1),
            poll: PollPolicy::default(),
            host: "127.0.0.1:7788".to_string(),
        }
    }
}

/// A connection's binding to a table.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub nickname: String,
    pub table_id: TableId,
    pub role: Role,
    pub tournament: bool,
    feed: Arc<Feed>,
}

impl Session {
    pub fn audience(&self) -> Audience {
        self.role.audience()
    }
}

pub struct Hall {
    pub(crate) config: HallConfig,
    pub(crate) tables: TableRegistry,
    pub(crate) users: UserRegistry,
    pub(crate) authority: Arc<dyn Authority>,
}

/// Push the table summary to everyone.
pub(crate) fn publish_refresh(table: &Table) {
    let desc = if table.is_tournament() {
        ResponseDesc::RefreshTournament
    } else {
        ResponseDesc::RefreshNormal
    };
    table
        .feed()
        .push(Audience::Everyone, Response::new(desc, table.summary()));
}

fn sys_msg(table: &Table, message: String) {
    table
        .feed()
        .push(Audience::Everyone, Response::new(ResponseDesc::SysMsg, message));
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Player(Seat::One) => "1P",
        Role::Player(Seat::Two) => "2P",
        Role::Observer => "an observer",
    }
}

fn match_seed(table_id: TableId) -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
        .unwrap_or_default();
    nanos ^ table_id
}

impl Hall {
    pub fn new(config: HallConfig, authority: Arc<dyn Authority>) -> Self {
        Self {
            config,
            tables: TableRegistry::new(),
            users: UserRegistry::new(),
            authority,
        }
    }

    pub fn config(&self) -> &HallConfig {
        &self.config
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub async fn create_table(&self, title: &str, stake: u64) -> Arc<Table> {
        self.tables.create(title, stake, &self.config.host, false).await
    }

    pub async fn list_tables(&self, page: usize, per_page: usize) -> Vec<TableSummary> {
        self.tables.list(page, per_page).await
    }

    /// Cancel a table: notify everyone, stop any match without settling it and
    /// drop the table with its feed.
    pub async fn delete_table(&self, id: TableId) -> Result<(), TableError> {
        let table = self.tables.get(id).await.ok_or(TableError::NotFound(id))?;
        table
            .feed()
            .push(Audience::Everyone, Response::error("table cancelled"));
        let users = table.teardown();
        table.feed().close();
        self.tables.remove(id).await;
        for user_id in users {
            self.users.release(user_id, id).await;
        }
        info!(table_id = id, "table deleted");
        Ok(())
    }

    /// Redeem a connection token and place the user at its table.
    pub async fn enter(&self, token: &str) -> Result<Session, TableError> {
        let creds = self.authority.redeem_token(token).await?;
        self.users.register(creds.user_id, &creds.nickname).await;
        if let Err(err) = self.users.refresh_account(creds.user_id, creds.account).await {
            warn!(%err, user_id = creds.user_id, "authority reported invalid account books");
        }

        let table_id = match creds.mode {
            EntryMode::Apply => self.authority.apply(creds.user_id).await?,
            EntryMode::Play | EntryMode::Observe => creds.table_id,
        };
        self.users.mark_busy(creds.user_id, table_id).await?;

        match self.seat(&creds, table_id).await {
            Ok(session) => Ok(session),
            Err(err) => {
                self.users.release(creds.user_id, table_id).await;
                Err(err)
            }
        }
    }

    async fn seat(&self, creds: &Credentials, table_id: TableId) -> Result<Session, TableError> {
        let user_id = creds.user_id;
        let tournament = creds.is_tournament() || is_tournament_table(table_id);
        let observer = creds.mode == EntryMode::Observe;

        let table = match creds.mode {
            EntryMode::Apply => self.tables.get_or_create(table_id, &self.config.host).await,
            EntryMode::Play | EntryMode::Observe => self
                .tables
                .get(table_id)
                .await
                .ok_or(TableError::NotFound(table_id))?,
        };

        let role = table.join(user_id, &creds.nickname, observer)?;
        let reported = if observer && tournament {
            self.authority.observe_tournament(table_id, user_id).await
        } else if creds.mode == EntryMode::Apply {
            Ok(())
        } else {
            self.authority.join(table_id, user_id, observer).await
        };
        if let Err(err) = reported {
            warn!(%err, table_id, user_id, "authority refused join");
            self.vacate(&table, user_id).await;
            return Err(err.into());
        }

        info!(table_id, user_id, role = role_label(role), "user joined");
        sys_msg(&table, format!("{} joined as {}", creds.nickname, role_label(role)));
        publish_refresh(&table);

        Ok(Session {
            user_id,
            nickname: creds.nickname.clone(),
            table_id,
            role,
            tournament,
            feed: table.feed().clone(),
        })
    }

    async fn table_of(&self, session: &Session) -> Result<Arc<Table>, TableError> {
        self.tables
            .get(session.table_id)
            .await
            .ok_or(TableError::NotFound(session.table_id))
    }

    /// Observers chatting during a match only reach other observers.
    pub async fn chat(&self, session: &Session, text: &str) -> Result<(), TableError> {
        let table = self.table_of(session).await?;
        let audience = if session.role.is_observer() && table.state() == TableState::Playing {
            Audience::Observers
        } else {
            Audience::Everyone
        };
        table.feed().push(
            audience,
            Response::new(
                ResponseDesc::Chat,
                json!({ "from": session.nickname, "text": text }),
            ),
        );
        Ok(())
    }

    /// Toggle the player's ready flag. Once both seats are ready the countdown
    /// runs and the match starts.
    pub async fn switch_ready(self: &Arc<Self>, session: &Session) -> Result<(), TableError> {
        let table = self.table_of(session).await?;
        if matches!(table.state(), TableState::Playing | TableState::Settling) {
            debug!(table_id = table.id(), "ready toggle ignored while playing");
            return Ok(());
        }
        match table.role_of(session.user_id) {
            Some(Role::Player(_)) => {}
            Some(Role::Observer) => return Err(TableError::ObserverCannotReady),
            None => return Err(TableError::NotSeated(session.user_id)),
        }

        self.authority.switch_ready(table.id(), session.user_id).await?;
        let outcome = table.switch_ready(session.user_id)?;
        publish_refresh(&table);

        if outcome.start_countdown {
            let hall = self.clone();
            tokio::spawn(async move { hall.launch(table).await });
        }
        Ok(())
    }

    async fn launch(self: Arc<Self>, table: Arc<Table>) {
        run_countdown(table.feed(), self.config.countdown_tick).await;
        if let Err(err) = self.start_match(&table) {
            info!(%err, table_id = table.id(), "countdown ended without a start");
            table.cancel_countdown();
        }
    }

    /// Build both engines, enter `Playing` and spawn the clock and dispatcher.
    pub fn start_match(self: &Arc<Self>, table: &Arc<Table>) -> Result<(), TableError> {
        let seed = match_seed(table.id());
        let (one, one_rx) = Game::new(self.config.game.clone(), seed)?;
        let (two, two_rx) = Game::new(self.config.game.clone(), seed.rotate_left(16) ^ 0x9e37_79b9)?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let (clock_tx, clock_rx) = mpsc::channel(4);
        let current = Arc::new(Match::new([one, two], stop_tx));
        table.start(current.clone())?;

        for game in current.games() {
            game.start();
        }
        current.attach(tokio::spawn(run_match_clock(self.config.match_length, clock_tx)));

        let channels = Arc::new(Mutex::new(MatchChannels {
            seats: [one_rx, two_rx],
            clock: clock_rx,
            stop: stop_rx,
        }));
        let hall = self.clone();
        let table = table.clone();
        info!(table_id = table.id(), "match started");
        supervise("dispatcher", move || {
            run_dispatcher(hall.clone(), table.clone(), channels.clone())
        });
        Ok(())
    }

    /// Forward a player operation to the player's engine.
    pub async fn operate(&self, session: &Session, op: Operation) -> Result<(), TableError> {
        let table = self.table_of(session).await?;
        match table.role_of(session.user_id) {
            Some(Role::Player(seat)) => {
                if let Some(current) = table.current_match() {
                    current.game(seat).operate(op);
                }
                Ok(())
            }
            Some(Role::Observer) => {
                debug!(user_id = session.user_id, "observer operation ignored");
                Ok(())
            }
            None => Err(TableError::NotSeated(session.user_id)),
        }
    }

    /// Leave the table. A seated player leaving a live match forfeits it.
    pub async fn quit(&self, session: &Session) {
        let (table_id, user_id) = (session.table_id, session.user_id);
        if let Err(err) = self
            .authority
            .quit(table_id, user_id, session.tournament)
            .await
        {
            warn!(%err, table_id, user_id, "authority quit failed");
        }

        match self.tables.get(table_id).await {
            Some(table) => {
                if let Some(Role::Player(seat)) = table.role_of(user_id) {
                    if table.state() == TableState::Playing {
                        self.settle(&table, Outcome::Forfeit { winner: seat.opponent() })
                            .await;
                    }
                }
                self.vacate(&table, user_id).await;
            }
            None => debug!(table_id, user_id, "quit from a table that is already gone"),
        }
        self.users.release(user_id, table_id).await;
        info!(table_id, user_id, "user left");
    }

    async fn vacate(&self, table: &Arc<Table>, user_id: UserId) {
        let Some(departure) = table.leave(user_id) else {
            return;
        };
        if departure.empty {
            table.feed().close();
            self.tables.remove(table.id()).await;
            return;
        }
        let nickname = self
            .users
            .get(user_id)
            .await
            .map(|p| p.nickname)
            .unwrap_or_else(|| user_id.to_string());
        sys_msg(table, format!("{nickname} left"));
        publish_refresh(table);
    }

    /// Long-poll the session's table feed.
    pub async fn get_data(&self, session: &Session, last_index: usize) -> Poll {
        session
            .feed
            .poll(last_index, session.audience(), self.config.poll)
            .await
    }
}
