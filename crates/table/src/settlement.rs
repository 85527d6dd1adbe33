//! Settlement: decide the winner of a finished match, report it to the
//! authority once, fan out the result and reset the table.
//!
//! Exactly one caller gets past [`Table::begin_settlement`], so a forfeit, the
//! match clock, a knockout and the dispatcher's idle timeout may all race to
//! settle the same match and only the first one reports.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::engine::Game;
use crate::feed::Response;
use crate::hall::{publish_refresh, Hall};
use crate::table::{Player, Table};
use crate::types::{Audience, ResponseDesc, Seat, TableId};
use crate::users::UserUpdate;

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Time ran out or the game stalled; compare the two engines.
    Evaluate,
    /// One side left or was knocked out; the other wins outright.
    Forfeit { winner: Seat },
}

/// What a settlement decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub table_id: TableId,
    pub winner: Seat,
    /// Tournament tables only: where the winner plays next.
    pub next_table: Option<TableId>,
}

/// More knockouts wins, then more lines sent; a full tie goes to the first seat.
pub fn evaluate(games: &[Arc<Game>; 2]) -> Seat {
    let [one, two] = games;
    let (ko1, ko2) = (one.ko(), two.ko());
    if ko1 != ko2 {
        return if ko1 > ko2 { Seat::One } else { Seat::Two };
    }
    if one.lines_sent() >= two.lines_sent() {
        Seat::One
    } else {
        Seat::Two
    }
}

fn stake_suffix(stake: u64) -> String {
    if stake > 0 {
        format!(" (stake {stake})")
    } else {
        String::new()
    }
}

fn seat_label(seat: Seat) -> &'static str {
    match seat {
        Seat::One => "1P",
        Seat::Two => "2P",
    }
}

impl Hall {
    /// Settle the table's running match. Returns `None` if it is not playing
    /// or another caller already settled it.
    pub async fn settle(&self, table: &Arc<Table>, outcome: Outcome) -> Option<Settled> {
        let Some(ticket) = table.begin_settlement() else {
            debug!(table_id = table.id(), ?outcome, "nothing to settle");
            return None;
        };
        ticket.game.halt();

        let winner = match outcome {
            Outcome::Evaluate => evaluate(ticket.game.games()),
            Outcome::Forfeit { winner } => winner,
        };
        let loser = winner.opponent();
        info!(
            table_id = ticket.table_id,
            winner = seat_label(winner),
            ?outcome,
            "match over"
        );

        let mut next_table = None;
        match (&ticket.players[winner.index()], &ticket.players[loser.index()]) {
            (Some(w), Some(l)) => {
                next_table = self.report(ticket.table_id, table.is_tournament(), w, l).await;
                for (user, update) in [(w, UserUpdate::RecordWin), (l, UserUpdate::RecordLoss)] {
                    if let Err(err) = self.users.update(user.user_id, update).await {
                        warn!(%err, user_id = user.user_id, "could not record result");
                    }
                }
            }
            _ => error!(
                table_id = ticket.table_id,
                "settling a match without both players seated"
            ),
        }

        let feed = table.feed();
        let suffix = stake_suffix(ticket.stake);
        feed.push(
            winner.audience(),
            Response::new(ResponseDesc::Win, format!("You win{suffix}")),
        );
        feed.push(
            loser.audience(),
            Response::new(ResponseDesc::Lose, format!("You lose{suffix}")),
        );
        feed.push(
            Audience::Observers,
            Response::new(
                ResponseDesc::Result,
                format!("{} wins{suffix}", seat_label(winner)),
            ),
        );
        if let Some(next) = next_table {
            feed.push(
                winner.audience(),
                Response::new(
                    ResponseDesc::SysMsg,
                    json!({ "nextTable": next, "message": format!("next round at table {next}") }),
                ),
            );
        }

        table.finish_settlement();
        publish_refresh(table);

        Some(Settled {
            table_id: ticket.table_id,
            winner,
            next_table,
        })
    }

    /// One result report. Failures are logged and not retried.
    async fn report(
        &self,
        table_id: TableId,
        tournament: bool,
        winner: &Player,
        loser: &Player,
    ) -> Option<TableId> {
        if tournament {
            match self
                .authority
                .set_tournament_result(table_id, winner.user_id, loser.user_id)
                .await
            {
                Ok(next) => next,
                Err(err) => {
                    warn!(%err, table_id, "can not set tournament result");
                    None
                }
            }
        } else {
            if let Err(err) = self
                .authority
                .set_normal_game_result(table_id, winner.user_id, loser.user_id)
                .await
            {
                warn!(%err, table_id, "can not set game result");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GameConfig;

    fn pair() -> [Arc<Game>; 2] {
        let (a, _) = Game::new(GameConfig::default(), 1).unwrap();
        let (b, _) = Game::new(GameConfig::default(), 2).unwrap();
        [a, b]
    }

    #[test]
    fn knockouts_decide_first() {
        let games = pair();
        games[1].knock_out_opponent();
        assert_eq!(evaluate(&games), Seat::Two);
        games[0].knock_out_opponent();
        games[0].knock_out_opponent();
        assert_eq!(evaluate(&games), Seat::One);
    }

    #[test]
    fn full_tie_goes_to_first_seat() {
        assert_eq!(evaluate(&pair()), Seat::One);
    }

    #[test]
    fn stake_is_mentioned_only_when_positive() {
        assert_eq!(stake_suffix(0), "");
        assert_eq!(stake_suffix(25), " (stake 25)");
    }
}
