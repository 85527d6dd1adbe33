//! Zone module - one player's playfield
//!
//! The zone is a `height x width` grid of [`Color`] stored as a flat row-major
//! vector. Row 0 is the top. Only locked dots live in the grid: the active
//! piece is carried by the engine and merged in by [`Zone::lock`] or, for
//! display only, by [`Zone::render`].
//!
//! # Rows
//!
//! - A *nothing line* holds only empty dots.
//! - A *stone line* is attack debris: one bomb dot, every other dot stone.
//!   Stone lines enter from the bottom through [`Zone::add_stone_lines`] and
//!   leave only through a bomb hit or [`Zone::purge_stone_lines`].
//! - Any other row is cleared once every dot holds an active color.
//!
//! # Line clear scan
//!
//! [`Zone::detect_clearable_lines`] scans top to bottom, skipping nothing
//! lines and marking full active rows. The first stone line ends the scan. If
//! the just-locked piece sits right above that row's bomb, the row and every
//! following stone line with its bomb in the same column are marked too.

use crate::pieces::Piece;
use crate::rng::SimpleRng;
use crate::types::{Color, MIN_ZONE_SIDE};

/// Rows chosen by a line clear scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearScan {
    /// Row indices to clear, ascending.
    pub indices: Vec<usize>,
    /// Ordinary full rows among `indices`.
    pub lines: u32,
    /// Stone lines removed by a bomb hit.
    pub bombs: u32,
}

impl ClearScan {
    pub fn total(&self) -> u32 {
        self.lines + self.bombs
    }
}

/// Playfield grid
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    height: usize,
    width: usize,
    cells: Vec<Color>,
}

impl Zone {
    /// Empty zone, or `None` when a side is below [`MIN_ZONE_SIDE`].
    pub fn new(height: usize, width: usize) -> Option<Self> {
        if height < MIN_ZONE_SIDE || width < MIN_ZONE_SIDE {
            return None;
        }
        Some(Self {
            height,
            width,
            cells: vec![Color::Empty; height * width],
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    #[inline(always)]
    fn index(&self, x: i16, y: i16) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    /// Get dot at position (x, y)
    /// Returns None if out of bounds
    pub fn get(&self, x: i16, y: i16) -> Option<Color> {
        self.index(x, y).map(|idx| self.cells[idx])
    }

    /// Set dot at position (x, y)
    /// Returns false if out of bounds
    pub fn set(&mut self, x: i16, y: i16, color: Color) -> bool {
        match self.index(x, y) {
            Some(idx) => {
                self.cells[idx] = color;
                true
            }
            None => false,
        }
    }

    pub fn row(&self, y: usize) -> &[Color] {
        let start = y * self.width;
        &self.cells[start..start + self.width]
    }

    fn row_mut(&mut self, y: usize) -> &mut [Color] {
        let start = y * self.width;
        &mut self.cells[start..start + self.width]
    }

    /// In bounds and empty
    fn is_free(&self, x: i16, y: i16) -> bool {
        matches!(self.get(x, y), Some(Color::Empty))
    }

    pub fn is_nothing_line(&self, y: usize) -> bool {
        self.row(y).iter().all(Color::is_empty)
    }

    pub fn is_stone_line(&self, y: usize) -> bool {
        self.row(y).iter().any(Color::is_debris)
    }

    fn is_active_line(&self, y: usize) -> bool {
        self.row(y).iter().all(Color::is_active)
    }

    /// Column of the bomb on row `y`, if any.
    pub fn bomb_column(&self, y: usize) -> Option<usize> {
        self.row(y).iter().position(|c| matches!(c, Color::Bomb))
    }

    /// Every dot of `piece` is inside the zone and on an empty dot.
    pub fn fits(&self, piece: &Piece) -> bool {
        piece.dots().iter().all(|&(x, y)| self.is_free(x, y))
    }

    pub fn can_move_down(&self, piece: &Piece) -> bool {
        piece.dots().iter().all(|&(x, y)| self.is_free(x, y + 1))
    }

    pub fn can_move_left(&self, piece: &Piece) -> bool {
        piece.dots().iter().all(|&(x, y)| self.is_free(x - 1, y))
    }

    pub fn can_move_right(&self, piece: &Piece) -> bool {
        piece.dots().iter().all(|&(x, y)| self.is_free(x + 1, y))
    }

    /// Rotate clockwise in place, shift the result back inside the zone,
    /// then report whether it lands on empty dots only. No wall kicks.
    pub fn rotate(&self, piece: &Piece) -> (Piece, bool) {
        let mut p = piece.rotated();
        let (w, h) = (self.width as i16, self.height as i16);

        let min_y = p.dots().iter().map(|d| d.1).min().unwrap_or(0);
        if min_y < 0 {
            p = p.shifted(0, -min_y);
        }
        let max_y = p.dots().iter().map(|d| d.1).max().unwrap_or(0);
        if max_y > h - 1 {
            p = p.shifted(0, h - 1 - max_y);
        }
        let min_x = p.dots().iter().map(|d| d.0).min().unwrap_or(0);
        if min_x < 0 {
            p = p.shifted(-min_x, 0);
        }
        let max_x = p.dots().iter().map(|d| d.0).max().unwrap_or(0);
        if max_x > w - 1 {
            p = p.shifted(w - 1 - max_x, 0);
        }

        let ok = self.fits(&p);
        (p, ok)
    }

    /// Lowest position reachable by moving straight down.
    pub fn drop(&self, piece: &Piece) -> Piece {
        let mut p = *piece;
        while self.can_move_down(&p) {
            p = p.shifted(0, 1);
        }
        p
    }

    /// Write the piece into the grid. Dots that are already occupied (or out
    /// of bounds) are left untouched.
    pub fn lock(&mut self, piece: &Piece) {
        let color = piece.color();
        for (x, y) in piece.dots() {
            if self.is_free(x, y) {
                self.set(x, y, color);
            }
        }
    }

    /// Rows to clear after `piece` has been locked.
    pub fn detect_clearable_lines(&self, piece: &Piece) -> ClearScan {
        let mut scan = ClearScan::default();
        let dots = piece.dots();

        for y in 0..self.height {
            if self.is_nothing_line(y) {
                continue;
            }

            if self.is_stone_line(y) {
                let Some(bomb_x) = self.bomb_column(y) else {
                    break;
                };
                let hit = dots
                    .iter()
                    .any(|&(x, dy)| dy == y as i16 - 1 && x == bomb_x as i16);
                if hit {
                    for chain in y..self.height {
                        if self.bomb_column(chain) != Some(bomb_x) {
                            break;
                        }
                        scan.indices.push(chain);
                        scan.bombs += 1;
                    }
                }
                break;
            }

            if self.is_active_line(y) {
                scan.indices.push(y);
                scan.lines += 1;
            }
        }

        scan
    }

    /// Remove the given rows (ascending). Every row above a removed one moves
    /// down by one and the top row refills empty.
    pub fn clear_lines(&mut self, indices: &[usize]) {
        let width = self.width;
        for &y in indices {
            if y >= self.height {
                continue;
            }
            // copy_within handles the overlapping shift
            self.cells.copy_within(0..y * width, width);
            self.row_mut(0).fill(Color::Empty);
        }
    }

    /// Push `n` stone lines in from the bottom, each with one bomb at a random
    /// column. Rows shifted past the top are discarded, so callers check
    /// [`Zone::can_absorb_stone_lines`] first.
    pub fn add_stone_lines(&mut self, n: usize, rng: &mut SimpleRng) {
        let width = self.width;
        let last = self.height - 1;
        for _ in 0..n {
            self.cells.copy_within(width.., 0);
            let bomb_x = rng.next_range(width as u32) as usize;
            for (x, dot) in self.row_mut(last).iter_mut().enumerate() {
                *dot = if x == bomb_x { Color::Bomb } else { Color::Stone };
            }
        }
    }

    /// At least `n` rows are nothing lines.
    pub fn can_absorb_stone_lines(&self, n: usize) -> bool {
        (0..self.height).filter(|&y| self.is_nothing_line(y)).count() >= n
    }

    /// No row is a nothing line: the zone cannot take a single stone line.
    pub fn is_knocked_out(&self) -> bool {
        !self.can_absorb_stone_lines(1)
    }

    pub fn is_zone_clear(&self) -> bool {
        self.cells.iter().all(Color::is_empty)
    }

    /// Remove every stone line.
    pub fn purge_stone_lines(&mut self) {
        let stones: Vec<usize> = (0..self.height).filter(|&y| self.is_stone_line(y)).collect();
        self.clear_lines(&stones);
    }

    /// Copy of the grid with the drop projection of `piece` drawn as
    /// transparent dots and the piece itself on top.
    pub fn render(&self, piece: &Piece) -> Vec<Vec<Color>> {
        let mut rows: Vec<Vec<Color>> = (0..self.height).map(|y| self.row(y).to_vec()).collect();

        let mut paint = |(x, y): (i16, i16), color: Color| {
            if x >= 0 && y >= 0 {
                if let Some(dot) = rows
                    .get_mut(y as usize)
                    .and_then(|row| row.get_mut(x as usize))
                {
                    *dot = color;
                }
            }
        };

        for d in self.drop(piece).dots() {
            paint(d, Color::Transparent);
        }
        for d in piece.dots() {
            paint(d, piece.color());
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PieceKind, Rotation};

    fn fill_row(zone: &mut Zone, y: usize, color: Color) {
        for x in 0..zone.width() {
            zone.set(x as i16, y as i16, color);
        }
    }

    fn stone_row(zone: &mut Zone, y: usize, bomb_x: usize) {
        for x in 0..zone.width() {
            let c = if x == bomb_x { Color::Bomb } else { Color::Stone };
            zone.set(x as i16, y as i16, c);
        }
    }

    /// Vertical I piece (East rotation) whose lowest dot sits on row `bottom`
    /// in column `col`.
    fn vertical_i(col: i16, bottom: i16) -> Piece {
        Piece {
            kind: PieceKind::I,
            rotation: Rotation::East,
            x: col - 2,
            y: bottom - 3,
        }
    }

    #[test]
    fn rejects_tiny_zones() {
        assert!(Zone::new(3, 10).is_none());
        assert!(Zone::new(20, 3).is_none());
        assert!(Zone::new(4, 4).is_some());
    }

    #[test]
    fn movement_respects_walls_and_floor() {
        let zone = Zone::new(20, 10).unwrap();
        let p = Piece::spawn(PieceKind::O, 10);
        assert!(zone.can_move_down(&p));
        assert!(zone.can_move_left(&p));

        let dropped = zone.drop(&p);
        assert!(!zone.can_move_down(&dropped));
        assert_eq!(dropped.dots().iter().map(|d| d.1).max(), Some(19));

        let mut left = p;
        while zone.can_move_left(&left) {
            left = left.shifted(-1, 0);
        }
        assert_eq!(left.dots().iter().map(|d| d.0).min(), Some(0));
    }

    #[test]
    fn rotate_shifts_back_inside_bounds() {
        let zone = Zone::new(20, 10).unwrap();
        // vertical I hugging the right wall; rotating to South would poke out
        let p = Piece {
            kind: PieceKind::I,
            rotation: Rotation::East,
            x: 7,
            y: 5,
        };
        let (rotated, ok) = zone.rotate(&p);
        assert!(ok);
        assert_eq!(rotated.rotation, Rotation::South);
        assert!(rotated.dots().iter().all(|&(x, _)| (0..10).contains(&x)));
    }

    #[test]
    fn rotate_reports_collision() {
        let mut zone = Zone::new(20, 10).unwrap();
        let p = Piece::spawn(PieceKind::T, 10).shifted(0, 5);
        // East adds the dot at (origin + 1, origin + 2)
        zone.set(p.x + 1, p.y + 2, Color::Tint(1));
        let (_, ok) = zone.rotate(&p);
        assert!(!ok);
    }

    #[test]
    fn lock_skips_occupied_dots() {
        let mut zone = Zone::new(20, 10).unwrap();
        let p = zone.drop(&Piece::spawn(PieceKind::O, 10));
        let (x, y) = p.dots()[0];
        zone.set(x, y, Color::Stone);
        zone.lock(&p);
        assert_eq!(zone.get(x, y), Some(Color::Stone));
        assert_eq!(zone.get(p.dots()[1].0, p.dots()[1].1), Some(Color::Tint(2)));
    }

    #[test]
    fn full_active_rows_are_detected_and_cleared() {
        let mut zone = Zone::new(8, 4).unwrap();
        zone.set(0, 5, Color::Tint(3));
        fill_row(&mut zone, 6, Color::Tint(1));
        fill_row(&mut zone, 7, Color::Tint(2));

        let piece = Piece::spawn(PieceKind::O, 4).shifted(0, 3);
        let scan = zone.detect_clearable_lines(&piece);
        assert_eq!(scan.indices, vec![6, 7]);
        assert_eq!(scan.lines, 2);
        assert_eq!(scan.bombs, 0);

        zone.clear_lines(&scan.indices);
        assert_eq!(zone.get(0, 7), Some(Color::Tint(3)));
        for y in 0..8 {
            assert!(!zone.row(y).iter().all(Color::is_active));
        }
        assert_eq!(zone.row(0).iter().filter(|c| !c.is_empty()).count(), 0);
    }

    #[test]
    fn scan_stops_at_first_stone_line_without_hit() {
        let mut zone = Zone::new(8, 4).unwrap();
        stone_row(&mut zone, 6, 1);
        fill_row(&mut zone, 7, Color::Tint(4));
        let piece = vertical_i(3, 5);
        zone.lock(&piece);

        let scan = zone.detect_clearable_lines(&piece);
        assert!(scan.indices.is_empty());
        assert_eq!(scan.total(), 0);
    }

    #[test]
    fn bomb_hit_clears_chain_sharing_the_bomb_column() {
        let mut zone = Zone::new(10, 6).unwrap();
        stone_row(&mut zone, 6, 2);
        stone_row(&mut zone, 7, 2);
        stone_row(&mut zone, 8, 2);
        stone_row(&mut zone, 9, 4);

        let piece = vertical_i(2, 5);
        zone.lock(&piece);
        let scan = zone.detect_clearable_lines(&piece);
        assert_eq!(scan.indices, vec![6, 7, 8]);
        assert_eq!(scan.bombs, 3);
        assert_eq!(scan.lines, 0);
        assert_eq!(scan.total(), 3);

        zone.clear_lines(&scan.indices);
        assert!(zone.is_stone_line(9));
        assert_eq!(zone.bomb_column(9), Some(4));
        for y in 0..9 {
            assert!(!zone.is_stone_line(y));
        }
    }

    #[test]
    fn add_stone_lines_places_one_bomb_per_row() {
        let mut zone = Zone::new(10, 6).unwrap();
        let mut rng = SimpleRng::new(3);
        zone.set(0, 9, Color::Tint(1));
        assert!(zone.can_absorb_stone_lines(3));
        zone.add_stone_lines(3, &mut rng);

        assert_eq!(zone.get(0, 6), Some(Color::Tint(1)));
        for y in 7..10 {
            assert!(zone.is_stone_line(y));
            let bombs = zone.row(y).iter().filter(|c| matches!(c, Color::Bomb)).count();
            let stones = zone.row(y).iter().filter(|c| matches!(c, Color::Stone)).count();
            assert_eq!((bombs, stones), (1, 5));
        }
    }

    #[test]
    fn absorb_and_knockout_follow_empty_row_count() {
        let mut zone = Zone::new(6, 4).unwrap();
        for y in 1..6 {
            fill_row(&mut zone, y, Color::Stone);
        }
        assert!(zone.can_absorb_stone_lines(1));
        assert!(!zone.can_absorb_stone_lines(2));
        assert!(!zone.is_knocked_out());

        zone.set(0, 0, Color::Tint(1));
        assert!(zone.is_knocked_out());
    }

    #[test]
    fn purge_removes_only_stone_lines() {
        let mut zone = Zone::new(6, 4).unwrap();
        zone.set(1, 2, Color::Tint(6));
        stone_row(&mut zone, 3, 0);
        stone_row(&mut zone, 5, 3);
        zone.set(2, 4, Color::Tint(5));

        zone.purge_stone_lines();
        for y in 0..6 {
            assert!(!zone.is_stone_line(y));
        }
        assert_eq!(zone.get(1, 4), Some(Color::Tint(6)));
        assert_eq!(zone.get(2, 5), Some(Color::Tint(5)));
    }

    #[test]
    fn zone_clear_detection() {
        let mut zone = Zone::new(4, 4).unwrap();
        assert!(zone.is_zone_clear());
        fill_row(&mut zone, 3, Color::Tint(1));
        assert!(!zone.is_zone_clear());
        zone.clear_lines(&[3]);
        assert!(zone.is_zone_clear());
    }

    #[test]
    fn render_overlays_projection_and_piece_without_touching_grid() {
        let zone = Zone::new(20, 10).unwrap();
        let piece = Piece::spawn(PieceKind::O, 10);
        let rows = zone.render(&piece);

        assert_eq!(rows.len(), 20);
        assert_eq!(rows[0][4], Color::Tint(2));
        assert_eq!(rows[19][4], Color::Transparent);
        assert!(zone.is_zone_clear());
    }
}
