use rtrb::{Consumer, Producer};

use crate::player::{PlayerMessage, RepeatMode, ShuffleOrder, Timeline};

/// Instructions from the application side to the playback loop.
pub enum PlayerCommand {
    Prepare,
    SetPlayWhenReady(bool),
    Seek {
        media_item_index: usize,
        position_ms: u64,
    },
    Stop,
    SetRepeatMode(RepeatMode),
    /// `None` turns shuffling off
    SetShuffleOrder(Option<ShuffleOrder>),
    SetPlaybackSpeed(f32),
    UpdatePlaylist {
        timeline: Timeline,
        media_item_index: usize,
        /// `Some` restarts playback at that position, `None` keeps going
        position_ms: Option<u64>,
        ended: bool,
    },
    SendMessage(PlayerMessage),
    Release,
}

impl PlayerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Prepare => "Prepare",
            Self::SetPlayWhenReady(_) => "SetPlayWhenReady",
            Self::Seek { .. } => "Seek",
            Self::Stop => "Stop",
            Self::SetRepeatMode(_) => "SetRepeatMode",
            Self::SetShuffleOrder(_) => "SetShuffleOrder",
            Self::SetPlaybackSpeed(_) => "SetPlaybackSpeed",
            Self::UpdatePlaylist { .. } => "UpdatePlaylist",
            Self::SendMessage(_) => "SendMessage",
            Self::Release => "Release",
        }
    }
}

pub type PlayerCommandProducer = Producer<PlayerCommand>;
pub type PlayerCommandConsumer = Consumer<PlayerCommand>;
