//! RNG module - piece and bomb randomness, next-piece ring
//!
//! A small LCG drives every random choice of one engine: the kind of each new
//! piece and the bomb column of each stone line. Seeding it explicitly keeps
//! whole games reproducible in tests.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use crate::pieces::Piece;
use crate::types::PieceKind;

/// Simple LCG (Linear Congruential Generator) RNG
/// Uses constants from Numerical Recipes
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u32,
}

impl SimpleRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u32) -> Self {
        // 0 would be a fixed point of the multiply step
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u32
    pub fn next_u32(&mut self) -> u32 {
        // a=1664525, c=1013904223, m=2^32
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state
    }

    /// Generate random value in range [0, max)
    pub fn next_range(&mut self, max: u32) -> u32 {
        // high bits of an LCG are far less periodic than the low ones
        (self.next_u32() >> 16) % max.max(1)
    }

    /// Uniformly chosen piece kind
    pub fn next_kind(&mut self) -> PieceKind {
        PieceKind::ALL[self.next_range(PieceKind::ALL.len() as u32) as usize]
    }

    /// Fresh piece at the spawn position of a zone `zone_width` wide
    pub fn next_piece(&mut self, zone_width: usize) -> Piece {
        Piece::spawn(self.next_kind(), zone_width)
    }
}

/// Fixed-capacity ring of upcoming pieces.
///
/// The slot under the cursor is the oldest entry. [`NextPieces::take`] hands
/// it out, stores the replacement in the same slot and advances, so the
/// preview never grows or shrinks.
#[derive(Debug, Clone)]
pub struct NextPieces {
    slots: Box<[Piece]>,
    cursor: usize,
}

impl NextPieces {
    /// Ring of `capacity` pieces (at least one) filled by `fill`.
    pub fn new(capacity: usize, mut fill: impl FnMut() -> Piece) -> Self {
        let slots: Vec<Piece> = (0..capacity.max(1)).map(|_| fill()).collect();
        Self {
            slots: slots.into_boxed_slice(),
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Overwrite the oldest entry and advance.
    pub fn push(&mut self, piece: Piece) {
        self.slots[self.cursor] = piece;
        self.advance();
    }

    /// Oldest entry, the one the next [`NextPieces::take`] returns.
    pub fn peek(&self) -> &Piece {
        &self.slots[self.cursor]
    }

    /// Remove the oldest entry, storing `replacement` in its place.
    pub fn take(&mut self, replacement: Piece) -> Piece {
        let out = std::mem::replace(&mut self.slots[self.cursor], replacement);
        self.advance();
        out
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Piece> + '_ {
        let (tail, head) = self.slots.split_at(self.cursor);
        head.iter().chain(tail.iter())
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.slots.len();
    }
}

impl Serialize for NextPieces {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.slots.len()))?;
        for piece in self.iter() {
            seq.serialize_element(piece)?;
        }
        seq.end()
    }
}
