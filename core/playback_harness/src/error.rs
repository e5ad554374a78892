use thiserror::Error;

/// Failures reported synchronously by a [`crate::player::Player`] call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error("illegal seek position: media item {media_item_index} at {position_ms}ms")]
    IllegalSeekPosition {
        media_item_index: usize,
        position_ms: u64,
    },

    #[error("index {index} out of bounds for {len} media items")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("invalid range {from}..{to} for {len} media items")]
    InvalidRange { from: usize, to: usize, len: usize },

    #[error("invalid shuffle order: {0}")]
    InvalidShuffleOrder(String),

    #[error("player has been released")]
    Released,
}

/// An error raised on the playback thread.
///
/// It reaches the application side through `on_player_error` and leaves the
/// player in `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("playback error: {message}")]
pub struct PlaybackError {
    pub message: String,
}

impl PlaybackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error(transparent)]
    Player(#[from] PlayerError),

    #[error("completion node must be the last node of the schedule")]
    CompletionNotTerminal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("repeat interval of '{description}' must be positive")]
    ZeroRepeatInterval { description: String },

    #[error("{tag}: action '{description}' failed: {source}")]
    Action {
        tag: String,
        description: String,
        source: ActionError,
    },

    #[error("schedule was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    #[error("timed out after {timeout_ms}ms waiting for {condition}")]
    Timeout { timeout_ms: u64, condition: String },

    #[error("must be called on the player's application thread")]
    WrongThread,

    #[error("failed to start playback thread: {0}")]
    PlaybackThread(String),

    #[error(transparent)]
    Player(#[from] PlayerError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}
