//! Pieces module - tetromino shapes and the falling piece
//!
//! Shapes are described as four dot offsets inside a 4x4 box whose top-left
//! corner is the piece origin. Rotation swaps the shape for the next clockwise
//! state in place; there are no wall kicks, the zone shifts a rotated piece
//! back inside its bounds instead (see [`crate::zone::Zone::rotate`]).

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::types::{Color, PieceKind, Rotation};

/// Offset of a single dot relative to the piece origin
pub type DotOffset = (i16, i16);

/// Shape of a piece - 4 dot offsets from the piece origin
pub type PieceShape = [DotOffset; 4];

/// Get the shape (dot offsets) for a piece kind and rotation
pub fn get_shape(kind: PieceKind, rotation: Rotation) -> PieceShape {
    match kind {
        PieceKind::I => match rotation {
            Rotation::North => [(0, 1), (1, 1), (2, 1), (3, 1)],
            Rotation::East => [(2, 0), (2, 1), (2, 2), (2, 3)],
            Rotation::South => [(0, 2), (1, 2), (2, 2), (3, 2)],
            Rotation::West => [(1, 0), (1, 1), (1, 2), (1, 3)],
        },
        PieceKind::O => [(1, 0), (2, 0), (1, 1), (2, 1)],
        PieceKind::T => match rotation {
            Rotation::North => [(1, 0), (0, 1), (1, 1), (2, 1)],
            Rotation::East => [(1, 0), (1, 1), (2, 1), (1, 2)],
            Rotation::South => [(0, 1), (1, 1), (2, 1), (1, 2)],
            Rotation::West => [(1, 0), (0, 1), (1, 1), (1, 2)],
        },
        PieceKind::S => match rotation {
            Rotation::North => [(1, 0), (2, 0), (0, 1), (1, 1)],
            Rotation::East => [(1, 0), (1, 1), (2, 1), (2, 2)],
            Rotation::South => [(1, 1), (2, 1), (0, 2), (1, 2)],
            Rotation::West => [(0, 0), (0, 1), (1, 1), (1, 2)],
        },
        PieceKind::Z => match rotation {
            Rotation::North => [(0, 0), (1, 0), (1, 1), (2, 1)],
            Rotation::East => [(2, 0), (1, 1), (2, 1), (1, 2)],
            Rotation::South => [(0, 1), (1, 1), (1, 2), (2, 2)],
            Rotation::West => [(1, 0), (0, 1), (1, 1), (0, 2)],
        },
        PieceKind::J => match rotation {
            Rotation::North => [(0, 0), (0, 1), (1, 1), (2, 1)],
            Rotation::East => [(1, 0), (2, 0), (1, 1), (1, 2)],
            Rotation::South => [(0, 1), (1, 1), (2, 1), (2, 2)],
            Rotation::West => [(1, 0), (1, 1), (0, 2), (1, 2)],
        },
        PieceKind::L => match rotation {
            Rotation::North => [(2, 0), (0, 1), (1, 1), (2, 1)],
            Rotation::East => [(1, 0), (1, 1), (1, 2), (2, 2)],
            Rotation::South => [(0, 1), (1, 1), (2, 1), (0, 2)],
            Rotation::West => [(0, 0), (1, 0), (1, 1), (1, 2)],
        },
    }
}

/// Column where new pieces appear for a zone of the given width.
pub fn spawn_column(zone_width: usize) -> i16 {
    (zone_width / 2) as i16 - 2
}

/// A piece: kind, rotation state and origin inside the zone.
///
/// Pieces are small `Copy` values; every movement returns a new piece and the
/// zone decides whether the result is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub rotation: Rotation,
    pub x: i16,
    pub y: i16,
}

impl Piece {
    /// New piece at the spawn position of a zone `zone_width` wide.
    pub fn spawn(kind: PieceKind, zone_width: usize) -> Self {
        Self {
            kind,
            rotation: Rotation::North,
            x: spawn_column(zone_width),
            y: 0,
        }
    }

    /// Same kind, back at the spawn position (used when a held piece returns).
    pub fn respawned(&self, zone_width: usize) -> Self {
        Self::spawn(self.kind, zone_width)
    }

    pub fn color(&self) -> Color {
        self.kind.color()
    }

    /// Absolute `(x, y)` coordinates of the four dots.
    pub fn dots(&self) -> [DotOffset; 4] {
        let shape = get_shape(self.kind, self.rotation);
        shape.map(|(dx, dy)| (self.x + dx, self.y + dy))
    }

    pub fn shifted(&self, dx: i16, dy: i16) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Clockwise rotation around the same origin, bounds unchecked.
    pub fn rotated(&self) -> Self {
        Self {
            rotation: self.rotation.rotate_cw(),
            ..*self
        }
    }
}

impl Serialize for Piece {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Piece", 4)?;
        state.serialize_field("kind", self.kind.as_str())?;
        state.serialize_field("rotation", self.rotation.as_str())?;
        state.serialize_field("color", &self.color())?;
        state.serialize_field("dots", &get_shape(self.kind, self.rotation))?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_uses_center_minus_two() {
        let p = Piece::spawn(PieceKind::T, 10);
        assert_eq!(p.x, 3);
        assert_eq!(p.y, 0);
        assert_eq!(p.rotation, Rotation::North);
        assert_eq!(Piece::spawn(PieceKind::O, 4).x, 0);
    }

    #[test]
    fn dots_are_offset_by_origin() {
        let p = Piece::spawn(PieceKind::I, 10).shifted(0, 5);
        assert_eq!(p.dots(), [(3, 6), (4, 6), (5, 6), (6, 6)]);
    }

    #[test]
    fn every_shape_has_four_distinct_dots_in_box() {
        for kind in PieceKind::ALL {
            let mut rotation = Rotation::North;
            for _ in 0..4 {
                let shape = get_shape(kind, rotation);
                for (i, a) in shape.iter().enumerate() {
                    assert!((0..4).contains(&a.0) && (0..4).contains(&a.1));
                    for b in &shape[i + 1..] {
                        assert_ne!(a, b, "{:?} {:?}", kind, rotation);
                    }
                }
                rotation = rotation.rotate_cw();
            }
        }
    }

    #[test]
    fn respawn_resets_rotation_and_position() {
        let p = Piece::spawn(PieceKind::L, 10).rotated().shifted(2, 7);
        let back = p.respawned(10);
        assert_eq!(back, Piece::spawn(PieceKind::L, 10));
    }

    #[test]
    fn serializes_with_wire_color() {
        let v = serde_json::to_value(Piece::spawn(PieceKind::Z, 10)).unwrap();
        assert_eq!(v["kind"], "z");
        assert_eq!(v["color"], 5);
        assert_eq!(v["dots"].as_array().unwrap().len(), 4);
    }
}
