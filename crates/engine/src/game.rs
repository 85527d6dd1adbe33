//! Game engine - one player's live game
//!
//! A [`Game`] owns a [`Zone`], the active/held piece, the next-piece ring and
//! the running counters (lines sent, combo, KO credits). Every mutation, player
//! input and drop-timer tick alike, happens under one mutex, so the zone never
//! sees two operations interleave.
//!
//! # Post-mutation check
//!
//! After each operation the engine runs the same check:
//!
//! 1. lock the piece if the operation ended its fall (soft drop on the floor
//!    or hard drop), then score the clear, push the attack, spawn the next
//!    piece;
//! 2. if no row is empty any more, signal *being knocked out*, purge the
//!    stone lines and reset the combo;
//! 3. publish a fresh render of the zone.
//!
//! # Outbound channels
//!
//! | channel | capacity | carries |
//! |---------|----------|---------|
//! | messages | 1024 | [`GameMessage`] for the table feed |
//! | attacks | 1024 | lines sent, for the opponent engine |
//! | knockouts | 5 | being-knocked-out signals |
//! | game over | 1 | fired at most once per engine |
//!
//! Sends never block while the mutex is held; a full channel is logged and the
//! event dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::{score_clear, NextPieces, Piece, SimpleRng, Zone};
use crate::error::EngineError;
use crate::message::{AudioCue, GameMessage};
use crate::supervisor::supervise;
use crate::types::{
    GameDesc, Operation, DEFAULT_DROP_MS, DEFAULT_NEXT_PIECES, DEFAULT_ZONE_HEIGHT,
    DEFAULT_ZONE_WIDTH, ENGINE_CHANNEL_CAPACITY, KO_THRESHOLD, MIN_ZONE_SIDE,
};

/// Knockout channel capacity: one slot per credit up to the threshold.
const KNOCKOUT_CAPACITY: usize = KO_THRESHOLD as usize;

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub height: usize,
    pub width: usize,
    pub next_pieces: usize,
    pub drop_interval: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            height: DEFAULT_ZONE_HEIGHT,
            width: DEFAULT_ZONE_WIDTH,
            next_pieces: DEFAULT_NEXT_PIECES,
            drop_interval: Duration::from_millis(DEFAULT_DROP_MS),
        }
    }
}

/// Receiving ends of an engine's outbound channels.
#[derive(Debug)]
pub struct GameChannels {
    pub messages: mpsc::Receiver<GameMessage>,
    pub attacks: mpsc::Receiver<u32>,
    pub knockouts: mpsc::Receiver<()>,
    pub game_over: mpsc::Receiver<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Lateral move, rotation, hold or attack: nothing falls.
    Stay,
    MoveDown,
    Drop,
}

#[derive(Debug)]
struct GameState {
    zone: Zone,
    active: Piece,
    held: Option<Piece>,
    hold_used: bool,
    next: NextPieces,
    rng: SimpleRng,
    lines_sent: u32,
    combo: u32,
    ko: u32,
    running: bool,
}

impl GameState {
    fn spawn_next(&mut self) -> Piece {
        let fresh = self.rng.next_piece(self.zone.width());
        self.next.take(fresh)
    }
}

/// One player's engine.
#[derive(Debug)]
pub struct Game {
    config: GameConfig,
    state: Mutex<GameState>,
    msg_tx: mpsc::Sender<GameMessage>,
    attack_tx: mpsc::Sender<u32>,
    ko_tx: mpsc::Sender<()>,
    over_tx: mpsc::Sender<()>,
    over_fired: AtomicBool,
    timer_reset: Arc<Notify>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Game {
    /// Build an idle engine. `seed` drives piece kinds and bomb columns.
    pub fn new(config: GameConfig, seed: u32) -> Result<(Arc<Self>, GameChannels), EngineError> {
        let zone = Zone::new(config.height, config.width).ok_or(EngineError::ZoneTooSmall {
            height: config.height,
            width: config.width,
            min: MIN_ZONE_SIDE,
        })?;

        let mut rng = SimpleRng::new(seed);
        let width = zone.width();
        let next = NextPieces::new(config.next_pieces, || rng.next_piece(width));
        let active = rng.next_piece(width);

        let (msg_tx, messages) = mpsc::channel(ENGINE_CHANNEL_CAPACITY);
        let (attack_tx, attacks) = mpsc::channel(ENGINE_CHANNEL_CAPACITY);
        let (ko_tx, knockouts) = mpsc::channel(KNOCKOUT_CAPACITY);
        let (over_tx, game_over) = mpsc::channel(1);

        let game = Arc::new(Self {
            config,
            state: Mutex::new(GameState {
                zone,
                active,
                held: None,
                hold_used: false,
                next,
                rng,
                lines_sent: 0,
                combo: 0,
                ko: 0,
                running: false,
            }),
            msg_tx,
            attack_tx,
            ko_tx,
            over_tx,
            over_fired: AtomicBool::new(false),
            timer_reset: Arc::new(Notify::new()),
            timer: Mutex::new(None),
        });

        Ok((
            game,
            GameChannels {
                messages,
                attacks,
                knockouts,
                game_over,
            },
        ))
    }

    fn lock_state(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the drop timer and publish the opening state.
    pub fn start(self: &Arc<Self>) {
        {
            let mut st = self.lock_state();
            st.running = true;
            self.send(GameDesc::Audio, AudioCue::Background);
            self.send(GameDesc::NextPiece, &st.next);
            self.send(GameDesc::Zone, st.zone.render(&st.active));
        }
        self.spawn_timer();
    }

    /// Freeze the game and tell clients.
    pub fn pause(&self) {
        self.halt();
        self.send(GameDesc::Pause, true);
        self.send(GameDesc::Audio, AudioCue::Background);
    }

    /// Freeze the game silently.
    pub fn stop(&self) {
        self.halt();
    }

    /// Freeze the game, announce it is over and fire the game-over channel.
    /// Only the first call fires.
    pub fn end(&self) {
        self.halt();
        if self.over_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        self.send(GameDesc::Over, true);
        if self.over_tx.try_send(()).is_err() {
            debug!("game over receiver gone");
        }
    }

    pub fn is_over(&self) -> bool {
        self.over_fired.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().running
    }

    fn halt(&self) {
        self.lock_state().running = false;
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn spawn_timer(self: &Arc<Self>) {
        let game = Arc::downgrade(self);
        let reset = self.timer_reset.clone();
        let interval = self.config.drop_interval;
        let handle = supervise("drop-timer", move || {
            run_drop_timer(game.clone(), reset.clone(), interval)
        });

        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Apply a player operation.
    pub fn operate(&self, op: Operation) {
        match op {
            Operation::Rotate => self.rotate(),
            Operation::Left => self.move_left(),
            Operation::Right => self.move_right(),
            Operation::Down => self.move_down(),
            Operation::Drop => self.drop_down(),
            Operation::Hold => self.hold(),
        }
    }

    pub fn move_left(&self) {
        let mut st = self.lock_state();
        if !st.running {
            return;
        }
        if st.zone.can_move_left(&st.active) {
            st.active = st.active.shifted(-1, 0);
        }
        self.check(&mut st, Step::Stay);
    }

    pub fn move_right(&self) {
        let mut st = self.lock_state();
        if !st.running {
            return;
        }
        if st.zone.can_move_right(&st.active) {
            st.active = st.active.shifted(1, 0);
        }
        self.check(&mut st, Step::Stay);
    }

    /// Soft drop one row, locking the piece if it is already resting.
    pub fn move_down(&self) {
        let mut st = self.lock_state();
        if !st.running {
            return;
        }
        self.check(&mut st, Step::MoveDown);
    }

    /// Hard drop and lock.
    pub fn drop_down(&self) {
        let mut st = self.lock_state();
        if !st.running {
            return;
        }
        self.check(&mut st, Step::Drop);
    }

    pub fn rotate(&self) {
        let mut st = self.lock_state();
        if !st.running {
            return;
        }
        let (rotated, ok) = st.zone.rotate(&st.active);
        if ok {
            st.active = rotated;
        }
        self.check(&mut st, Step::Stay);
    }

    /// Swap the active piece with the held one. Allowed once per piece.
    pub fn hold(&self) {
        let mut st = self.lock_state();
        if !st.running || st.hold_used {
            return;
        }
        st.hold_used = true;

        let width = st.zone.width();
        let current = st.active.respawned(width);
        match st.held.take() {
            Some(held) => st.active = held.respawned(width),
            None => {
                st.active = st.spawn_next();
                self.send(GameDesc::NextPiece, &st.next);
            }
        }
        st.held = Some(current);
        self.send(GameDesc::HeldPiece, current);
        self.check(&mut st, Step::Stay);
    }

    /// Receive `lines` stone lines from the opponent.
    ///
    /// If the zone cannot absorb them, its stone lines are purged and a
    /// knockout signal fires instead.
    pub fn being_attacked(&self, lines: u32) {
        let mut st = self.lock_state();
        if !st.running {
            return;
        }
        let n = lines as usize;
        if st.zone.can_absorb_stone_lines(n) {
            let GameState { zone, rng, .. } = &mut *st;
            zone.add_stone_lines(n, rng);
            if !st.zone.fits(&st.active) {
                st.active = st.spawn_next();
            }
        } else {
            st.zone.purge_stone_lines();
            debug!(lines, "attack not absorbable, knocked out");
            self.signal_knockout();
        }
        self.check(&mut st, Step::Stay);
    }

    /// Credit one knockout against the opponent. Returns the new count.
    pub fn knock_out_opponent(&self) -> u32 {
        let mut st = self.lock_state();
        st.ko += 1;
        let ko = st.ko;
        self.send(GameDesc::Ko, ko);
        self.send(GameDesc::Audio, AudioCue::Ko);
        ko
    }

    pub fn ko(&self) -> u32 {
        self.lock_state().ko
    }

    /// Total lines sent to the opponent so far.
    pub fn lines_sent(&self) -> u32 {
        self.lock_state().lines_sent
    }

    pub fn combo(&self) -> u32 {
        self.lock_state().combo
    }

    pub fn active_piece(&self) -> Piece {
        self.lock_state().active
    }

    pub fn held_piece(&self) -> Option<Piece> {
        self.lock_state().held
    }

    /// Copy of the locked grid.
    pub fn zone(&self) -> Zone {
        self.lock_state().zone.clone()
    }

    fn check(&self, st: &mut GameState, step: Step) {
        let lock = match step {
            Step::Stay => false,
            Step::MoveDown => {
                if st.zone.can_move_down(&st.active) {
                    st.active = st.active.shifted(0, 1);
                    false
                } else {
                    true
                }
            }
            Step::Drop => {
                st.active = st.zone.drop(&st.active);
                true
            }
        };

        if step != Step::Stay {
            self.timer_reset.notify_one();
        }

        if lock {
            st.hold_used = false;
            st.zone.lock(&st.active);

            let sent = self.settle_clear(st);
            if sent > 0 {
                st.lines_sent += sent;
                if let Err(err) = self.attack_tx.try_send(sent) {
                    warn!(?err, sent, "attack channel rejected lines");
                }
                self.send(GameDesc::Attack, sent);
                self.send(GameDesc::Lines, st.lines_sent);
            }

            st.active = st.spawn_next();
            self.send(GameDesc::NextPiece, &st.next);
        }

        if st.zone.is_knocked_out() {
            self.signal_knockout();
            st.zone.purge_stone_lines();
            st.combo = 0;
        }

        self.send(GameDesc::Zone, st.zone.render(&st.active));
    }

    /// Clear the rows completed by the just-locked piece and score them.
    fn settle_clear(&self, st: &mut GameState) -> u32 {
        let scan = st.zone.detect_clearable_lines(&st.active);
        st.zone.clear_lines(&scan.indices);
        if scan.bombs > 0 {
            self.send(GameDesc::Audio, AudioCue::Bomb);
        }

        let outcome = score_clear(&scan, st.zone.is_zone_clear(), &mut st.combo);
        if outcome.zone_clear {
            self.send(GameDesc::Clear, true);
        }
        if outcome.combo_bonus > 0 {
            self.send(GameDesc::Combo, st.combo);
            self.send(GameDesc::Audio, AudioCue::Combo(outcome.combo_bonus));
        }
        debug!(
            lines = scan.lines,
            bombs = scan.bombs,
            sent = outcome.lines_sent,
            "piece locked"
        );
        outcome.lines_sent
    }

    fn signal_knockout(&self) {
        if let Err(err) = self.ko_tx.try_send(()) {
            warn!(?err, "knockout channel rejected signal");
        }
    }

    fn send(&self, desc: GameDesc, data: impl Serialize) {
        match self.msg_tx.try_send(GameMessage::new(desc, data)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(desc = ?msg.desc, "message channel full, dropping");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        let handle = self
            .timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

async fn run_drop_timer(game: Weak<Game>, reset: Arc<Notify>, interval: Duration) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let Some(game) = game.upgrade() else {
                    return;
                };
                game.move_down();
            }
            // any fall restarts the interval
            _ = reset.notified() => {}
        }
    }
}
