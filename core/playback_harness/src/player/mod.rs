use std::sync::Arc;

use transport::{clock::Clock, looper::Looper};
use uuid::Uuid;

use crate::error::{PlaybackError, PlayerError};

pub mod listener;
pub mod message;
#[cfg(test)]
pub(crate) mod stub;
pub mod timeline;

pub use message::{MessagePayload, MessageSignal, MessageTarget, PlayerMessage};
pub use timeline::{MediaItem, MediaItemId, ShuffleOrder, Timeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    Idle,
    Buffering,
    Ready,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscontinuityReason {
    AutoTransition,
    Seek,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimelineChangeReason {
    PlaylistChanged,
    SourceUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaItemTransitionReason {
    Repeat,
    Auto,
    Seek,
    PlaylistChanged,
}

/// A position within the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PositionInfo {
    pub media_item_index: usize,
    pub position_ms: u64,
}

impl PositionInfo {
    pub fn new(media_item_index: usize, position_ms: u64) -> Self {
        Self {
            media_item_index,
            position_ms,
        }
    }
}

/// Where playback starts after the playlist is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// first item, position zero
    #[default]
    Reset,
    /// current item and position, clamped to the new playlist
    Keep,
    At {
        media_item_index: usize,
        position_ms: u64,
    },
}

/// Opaque rendering target handed to the player.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Surface(String);

impl Surface {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives player events on the application thread.
pub trait PlayerListener
where
    Self: Send + Sync,
{
    fn on_playback_state_changed(&self, _state: PlaybackState) {}
    fn on_play_when_ready_changed(&self, _play_when_ready: bool) {}
    fn on_is_loading_changed(&self, _is_loading: bool) {}
    fn on_timeline_changed(&self, _timeline: &Timeline, _reason: TimelineChangeReason) {}
    fn on_position_discontinuity(
        &self,
        _old: PositionInfo,
        _new: PositionInfo,
        _reason: DiscontinuityReason,
    ) {
    }
    fn on_media_item_transition(
        &self,
        _media_item: Option<&MediaItem>,
        _media_item_index: usize,
        _reason: MediaItemTransitionReason,
    ) {
    }
    fn on_repeat_mode_changed(&self, _repeat_mode: RepeatMode) {}
    fn on_shuffle_mode_enabled_changed(&self, _enabled: bool) {}
    fn on_player_error(&self, _error: &PlaybackError) {}
}

/// One listener callback as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    PlaybackStateChanged(PlaybackState),
    PlayWhenReadyChanged(bool),
    IsLoadingChanged(bool),
    TimelineChanged {
        timeline: Timeline,
        reason: TimelineChangeReason,
    },
    PositionDiscontinuity {
        old: PositionInfo,
        new: PositionInfo,
        reason: DiscontinuityReason,
    },
    MediaItemTransition {
        media_item: Option<MediaItem>,
        media_item_index: usize,
        reason: MediaItemTransitionReason,
    },
    RepeatModeChanged(RepeatMode),
    ShuffleModeEnabledChanged(bool),
    PlayerError(PlaybackError),
}

impl PlayerEvent {
    pub fn dispatch_to(&self, listener: &dyn PlayerListener) {
        match self {
            Self::PlaybackStateChanged(state) => listener.on_playback_state_changed(*state),
            Self::PlayWhenReadyChanged(play_when_ready) => {
                listener.on_play_when_ready_changed(*play_when_ready);
            }
            Self::IsLoadingChanged(is_loading) => listener.on_is_loading_changed(*is_loading),
            Self::TimelineChanged { timeline, reason } => {
                listener.on_timeline_changed(timeline, *reason);
            }
            Self::PositionDiscontinuity { old, new, reason } => {
                listener.on_position_discontinuity(*old, *new, *reason);
            }
            Self::MediaItemTransition {
                media_item,
                media_item_index,
                reason,
            } => listener.on_media_item_transition(media_item.as_ref(), *media_item_index, *reason),
            Self::RepeatModeChanged(mode) => listener.on_repeat_mode_changed(*mode),
            Self::ShuffleModeEnabledChanged(enabled) => {
                listener.on_shuffle_mode_enabled_changed(*enabled);
            }
            Self::PlayerError(error) => listener.on_player_error(error),
        }
    }
}

/// The player under test.
///
/// Every method is called on the application looper. Listener callbacks are
/// delivered there too.
pub trait Player
where
    Self: Send + Sync,
{
    fn application_looper(&self) -> &Looper;
    fn clock(&self) -> &Arc<dyn Clock>;

    fn playback_state(&self) -> PlaybackState;
    fn play_when_ready(&self) -> bool;
    fn is_loading(&self) -> bool;
    fn player_error(&self) -> Option<PlaybackError>;
    fn timeline(&self) -> Timeline;
    fn current_media_item_index(&self) -> usize;
    fn current_position_ms(&self) -> u64;
    fn repeat_mode(&self) -> RepeatMode;
    fn shuffle_mode_enabled(&self) -> bool;
    fn playback_speed(&self) -> f32;
    fn video_surface(&self) -> Option<Surface>;

    fn prepare(&self);
    fn set_play_when_ready(&self, play_when_ready: bool);
    fn seek_to(&self, media_item_index: usize, position_ms: u64) -> Result<(), PlayerError>;
    fn stop(&self);
    fn set_repeat_mode(&self, repeat_mode: RepeatMode);
    fn set_shuffle_mode_enabled(&self, enabled: bool);
    fn set_shuffle_order(&self, order: ShuffleOrder) -> Result<(), PlayerError>;
    fn set_playback_speed(&self, speed: f32);
    fn set_media_items(
        &self,
        items: Vec<MediaItem>,
        start: StartPosition,
    ) -> Result<(), PlayerError>;
    /// Inserts `items` before `index`, or appends them for `None`.
    fn add_media_items(&self, index: Option<usize>, items: Vec<MediaItem>)
    -> Result<(), PlayerError>;
    /// Moves the items in `from..to` so the first of them lands at `new_index`.
    fn move_media_items(&self, from: usize, to: usize, new_index: usize)
    -> Result<(), PlayerError>;
    fn remove_media_items(&self, from: usize, to: usize) -> Result<(), PlayerError>;
    fn set_video_surface(&self, surface: Option<Surface>);
    fn send_message(&self, message: PlayerMessage) -> Result<(), PlayerError>;
    fn add_listener(&self, listener: Arc<dyn PlayerListener>) -> ListenerId;
    fn remove_listener(&self, id: ListenerId) -> bool;
    fn release(&self);

    fn play(&self) {
        self.set_play_when_ready(true);
    }

    fn pause(&self) {
        self.set_play_when_ready(false);
    }

    fn seek_to_position(&self, position_ms: u64) -> Result<(), PlayerError> {
        self.seek_to(self.current_media_item_index(), position_ms)
    }

    fn clear_media_items(&self) -> Result<(), PlayerError> {
        let len = self.timeline().len();
        self.remove_media_items(0, len)
    }

    fn position_info(&self) -> PositionInfo {
        PositionInfo::new(self.current_media_item_index(), self.current_position_ms())
    }
}
