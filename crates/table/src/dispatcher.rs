//! Per-table dispatcher.
//!
//! One loop per live match selects across both engines' channels, the match
//! clock and the stop signal, and is the only place that orders game events
//! into the table feed. Cross-engine traffic goes through here too: an attack
//! from one seat is delivered to the other engine, a being-knocked-out signal
//! credits the opponent.
//!
//! The loop ends when the match is settled or halted. Two seconds without any
//! event is treated as a stalled match and settled by evaluation. The match
//! clock ticks every second, so this only fires once the clock task is gone
//! and both engines have gone quiet.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, warn};

use crate::engine::{GameChannels, GameMessage};
use crate::feed::{Feed, Response};
use crate::hall::Hall;
use crate::settlement::Outcome;
use crate::table::Table;
use crate::types::{
    Audience, GameDesc, ResponseDesc, Seat, COUNTDOWN_FROM, DISPATCHER_IDLE_MS, KO_THRESHOLD,
};

/// Receiving ends the dispatcher owns for one match.
#[derive(Debug)]
pub struct MatchChannels {
    pub seats: [GameChannels; 2],
    /// Remaining seconds, 0 on expiry.
    pub clock: mpsc::Receiver<u32>,
    pub stop: watch::Receiver<bool>,
}

#[derive(Debug)]
enum Event {
    Message(Seat, GameMessage),
    Attack(Seat, u32),
    /// The seat's zone ran out of room.
    BeingKnockedOut(Seat),
    GameOver(Seat),
    Clock(u32),
    Idle,
    Stopped,
}

/// Push the `start` ticks 3, 2, 1 one `tick` apart, then 0.
pub async fn run_countdown(feed: &Feed, tick: Duration) {
    for n in (1..=COUNTDOWN_FROM).rev() {
        feed.push(Audience::Everyone, Response::new(ResponseDesc::Start, n));
        tokio::time::sleep(tick).await;
    }
    feed.push(Audience::Everyone, Response::new(ResponseDesc::Start, 0u32));
}

/// Send the remaining whole seconds once per second, ending with 0.
pub async fn run_match_clock(length: Duration, tx: mpsc::Sender<u32>) {
    let mut remaining = u32::try_from(length.as_secs()).unwrap_or(u32::MAX);
    loop {
        if tx.send(remaining).await.is_err() || remaining == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        remaining -= 1;
    }
}

async fn next_event(channels: &mut MatchChannels) -> Event {
    let MatchChannels { seats, clock, stop } = channels;
    let [one, two] = seats;
    tokio::select! {
        // only `true` is ever sent; a dropped sender means the match is gone
        _ = stop.changed() => Event::Stopped,
        Some(msg) = one.messages.recv() => Event::Message(Seat::One, msg),
        Some(msg) = two.messages.recv() => Event::Message(Seat::Two, msg),
        Some(()) = one.knockouts.recv() => Event::BeingKnockedOut(Seat::One),
        Some(()) = two.knockouts.recv() => Event::BeingKnockedOut(Seat::Two),
        Some(lines) = one.attacks.recv() => Event::Attack(Seat::One, lines),
        Some(lines) = two.attacks.recv() => Event::Attack(Seat::Two, lines),
        Some(()) = one.game_over.recv() => Event::GameOver(Seat::One),
        Some(()) = two.game_over.recv() => Event::GameOver(Seat::Two),
        Some(remaining) = clock.recv() => Event::Clock(remaining),
        _ = tokio::time::sleep(Duration::from_millis(DISPATCHER_IDLE_MS)) => Event::Idle,
    }
}

/// Dispatcher loop for the table's current match.
///
/// The channels sit behind an async mutex so a relaunched loop picks up where
/// a panicked one left off.
pub async fn run_dispatcher(hall: Arc<Hall>, table: Arc<Table>, channels: Arc<Mutex<MatchChannels>>) {
    let mut channels = channels.lock().await;
    let table_id = table.id();
    let Some(game) = table.current_match() else {
        error!(table_id, "dispatcher started without a match");
        return;
    };
    let feed = table.feed().clone();

    loop {
        if *channels.stop.borrow() {
            debug!(table_id, "match halted, dispatcher exits");
            return;
        }
        match next_event(&mut channels).await {
            Event::Message(seat, msg) => {
                feed.push_each(msg.desc.audiences(seat), Response::new(seat.desc(), &msg));
            }
            Event::Attack(seat, lines) => {
                debug!(table_id, ?seat, lines, "attack");
                game.game(seat.opponent()).being_attacked(lines);
            }
            Event::BeingKnockedOut(seat) => {
                let ko = game.game(seat.opponent()).knock_out_opponent();
                debug!(table_id, ?seat, ko, "knocked out");
                feed.push_each(
                    &[seat.audience(), Audience::Observers],
                    Response::new(seat.desc(), GameMessage::new(GameDesc::BeingKo, ko)),
                );
                if ko >= KO_THRESHOLD {
                    game.game(seat).end();
                }
            }
            Event::GameOver(seat) => {
                hall.settle(&table, Outcome::Forfeit { winner: seat.opponent() })
                    .await;
                return;
            }
            Event::Clock(remaining) => {
                feed.push(Audience::Everyone, Response::new(ResponseDesc::Timer, remaining));
                if remaining == 0 {
                    hall.settle(&table, Outcome::Evaluate).await;
                    return;
                }
            }
            Event::Idle => {
                warn!(table_id, "no match events for {DISPATCHER_IDLE_MS}ms, ending game");
                hall.settle(&table, Outcome::Evaluate).await;
                return;
            }
            Event::Stopped => {
                debug!(table_id, "match halted, dispatcher exits");
                return;
            }
        }
    }
}
