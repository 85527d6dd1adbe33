//! Scoring module - converts a line clear into lines sent to the opponent
//!
//! Lines sent = ordinary lines (minus one for 2 and 3 line clears) + bomb
//! rows + combo bonus. Emptying the whole zone overrides everything with a
//! flat [`ZONE_CLEAR_BONUS`].
//!
//! # Combo bonus
//!
//! | combo | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8+ |
//! |-------|---|---|---|---|---|---|---|----|
//! | bonus | 0 | 1 | 1 | 2 | 2 | 3 | 3 | 4  |

use crate::types::ZONE_CLEAR_BONUS;
use crate::zone::ClearScan;

/// Result of scoring one lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// Lines to send to the opponent.
    pub lines_sent: u32,
    /// The clear emptied the zone.
    pub zone_clear: bool,
    /// Combo bonus included in `lines_sent`, 0 when none.
    pub combo_bonus: u32,
}

/// Bonus attack lines for the current combo counter.
pub fn combo_bonus(combo: u32) -> u32 {
    match combo.saturating_sub(1) {
        0 => 0,
        1..=2 => 1,
        3..=4 => 2,
        5..=6 => 3,
        _ => 4,
    }
}

/// Score a lock whose clear scan is `scan`, updating `combo` in place.
///
/// `zone_clear` is whether the zone was empty after the rows were removed.
pub fn score_clear(scan: &ClearScan, zone_clear: bool, combo: &mut u32) -> ScoreOutcome {
    if zone_clear {
        return ScoreOutcome {
            lines_sent: ZONE_CLEAR_BONUS,
            zone_clear: true,
            combo_bonus: 0,
        };
    }

    let total = scan.total();
    if total == 0 {
        *combo = 0;
        return ScoreOutcome::default();
    }

    *combo += 1;
    let bonus = combo_bonus(*combo);
    if bonus == 0 && total <= 1 {
        return ScoreOutcome::default();
    }

    let mut lines = scan.lines;
    if 0 < lines && lines < 4 {
        lines -= 1;
    }

    ScoreOutcome {
        lines_sent: bonus + lines + scan.bombs,
        zone_clear: false,
        combo_bonus: bonus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(lines: u32, bombs: u32) -> ClearScan {
        ClearScan {
            indices: (0..(lines + bombs) as usize).collect(),
            lines,
            bombs,
        }
    }

    #[test]
    fn combo_table() {
        let bonuses: Vec<u32> = (1..=8).map(combo_bonus).collect();
        assert_eq!(bonuses, vec![0, 1, 1, 2, 2, 3, 3, 4]);
        assert_eq!(combo_bonus(0), 0);
        assert_eq!(combo_bonus(20), 4);
    }

    #[test]
    fn zone_clear_is_flat_ten_and_keeps_combo() {
        let mut combo = 6;
        let out = score_clear(&scan(4, 0), true, &mut combo);
        assert_eq!(out.lines_sent, 10);
        assert!(out.zone_clear);
        assert_eq!(combo, 6);
    }

    #[test]
    fn no_clear_resets_combo() {
        let mut combo = 3;
        let out = score_clear(&scan(0, 0), false, &mut combo);
        assert_eq!(out.lines_sent, 0);
        assert_eq!(combo, 0);
    }

    #[test]
    fn single_line_without_combo_sends_nothing() {
        let mut combo = 0;
        let out = score_clear(&scan(1, 0), false, &mut combo);
        assert_eq!(out.lines_sent, 0);
        assert_eq!(combo, 1);
    }

    #[test]
    fn multi_line_clears_are_discounted_below_four() {
        let mut combo = 0;
        assert_eq!(score_clear(&scan(2, 0), false, &mut combo).lines_sent, 1);
        combo = 0;
        assert_eq!(score_clear(&scan(3, 0), false, &mut combo).lines_sent, 2);
        combo = 0;
        assert_eq!(score_clear(&scan(4, 0), false, &mut combo).lines_sent, 4);
    }

    #[test]
    fn bombs_count_in_full() {
        let mut combo = 0;
        let out = score_clear(&scan(0, 3), false, &mut combo);
        assert_eq!(out.lines_sent, 3);
    }

    #[test]
    fn combo_bonus_adds_on_top() {
        // second consecutive clear: bonus 1, single line discounted to 0
        let mut combo = 1;
        let out = score_clear(&scan(1, 0), false, &mut combo);
        assert_eq!(combo, 2);
        assert_eq!(out.combo_bonus, 1);
        assert_eq!(out.lines_sent, 1);
    }
}
