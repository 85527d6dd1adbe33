//! Outbound engine messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::types::GameDesc;

/// One event produced by a game engine, fanned out as a `1p`/`2p` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMessage {
    pub desc: GameDesc,
    pub data: Value,
}

impl GameMessage {
    pub fn new(desc: GameDesc, data: impl Serialize) -> Self {
        let data = serde_json::to_value(data).unwrap_or_else(|err| {
            warn!(?err, ?desc, "game message payload did not serialize");
            Value::Null
        });
        Self { desc, data }
    }
}

/// Sound cue names understood by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCue {
    Background,
    Ko,
    Bomb,
    /// Combo bonus level, 1 through 4
    Combo(u32),
}

impl AudioCue {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCue::Background => "background",
            AudioCue::Ko => "ko",
            AudioCue::Bomb => "bomb",
            AudioCue::Combo(0 | 1) => "combo1",
            AudioCue::Combo(2) => "combo2",
            AudioCue::Combo(3) => "combo3",
            AudioCue::Combo(_) => "combo4",
        }
    }
}

impl Serialize for AudioCue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_desc_and_data() {
        let msg = GameMessage::new(GameDesc::Attack, 3u32);
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["desc"], "attack");
        assert_eq!(v["data"], 3);
    }

    #[test]
    fn audio_cues_clamp_combo_level() {
        assert_eq!(AudioCue::Combo(1).as_str(), "combo1");
        assert_eq!(AudioCue::Combo(4).as_str(), "combo4");
        assert_eq!(AudioCue::Combo(9).as_str(), "combo4");
        let v = serde_json::to_value(GameMessage::new(GameDesc::Audio, AudioCue::Bomb)).unwrap();
        assert_eq!(v["data"], "bomb");
    }
}
