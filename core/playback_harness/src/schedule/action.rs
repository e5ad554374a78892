use std::{fmt, sync::Arc};

use crate::{
    constants::SCHEDULE_LOG_TARGET,
    error::{ActionError, PlaybackError, PlayerError},
    player::{
        DiscontinuityReason, MediaItem, MessageSignal, PlaybackState, PlayerMessage, RepeatMode,
        ShuffleOrder, StartPosition, Timeline, TimelineChangeReason,
    },
    schedule::{ActionContext, run::Next, wait},
};

/// Arbitrary code run as a schedule step.
pub type Runnable = Arc<dyn Fn(&ActionContext) + Send + Sync>;

/// What an [`Action`] does.
///
/// Variants up to `ExecuteRunnable` finish within the call. The `WaitFor*`
/// variants and `PlayUntilPosition` hold back the rest of the schedule until
/// their condition is observed.
#[derive(Clone)]
pub enum ActionKind {
    /// head of every schedule
    Root,
    /// tail of every schedule, reports completion
    Finish,
    Seek {
        /// `None` seeks within the current item
        media_item_index: Option<usize>,
        position_ms: u64,
        catch_illegal_seek: bool,
    },
    Stop,
    SetPlayWhenReady(bool),
    SetRendererDisabled {
        renderer_index: usize,
        disabled: bool,
    },
    SetVideoSurface,
    ClearVideoSurface,
    Prepare,
    SetMediaItems {
        items: Vec<MediaItem>,
        start: StartPosition,
    },
    AddMediaItems {
        index: Option<usize>,
        items: Vec<MediaItem>,
    },
    MoveMediaItem {
        current_index: usize,
        new_index: usize,
    },
    RemoveMediaItems {
        from: usize,
        to: usize,
    },
    ClearMediaItems,
    SetRepeatMode(RepeatMode),
    SetShuffleModeEnabled(bool),
    SetShuffleOrder(ShuffleOrder),
    SetPlaybackSpeed(f32),
    SendMessage(PlayerMessage),
    /// fails on the playback thread with the given error
    ThrowPlaybackError(PlaybackError),
    ExecuteRunnable(Runnable),

    WaitForPlaybackState(PlaybackState),
    WaitForPlayWhenReady(bool),
    WaitForIsLoading(bool),
    /// `expected: None` waits for any timeline other than the current one
    WaitForTimelineChanged {
        expected: Option<Timeline>,
        reason: Option<TimelineChangeReason>,
    },
    WaitForPositionDiscontinuity(Option<DiscontinuityReason>),
    WaitForMessage(Arc<MessageSignal>),
    WaitForPendingPlayerCommands,
    PlayUntilPosition {
        media_item_index: usize,
        position_ms: u64,
    },
}

impl ActionKind {
    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            Self::WaitForPlaybackState(_)
                | Self::WaitForPlayWhenReady(_)
                | Self::WaitForIsLoading(_)
                | Self::WaitForTimelineChanged { .. }
                | Self::WaitForPositionDiscontinuity(_)
                | Self::WaitForMessage(_)
                | Self::WaitForPendingPlayerCommands
                | Self::PlayUntilPosition { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::Finish => "Finish",
            Self::Seek { .. } => "Seek",
            Self::Stop => "Stop",
            Self::SetPlayWhenReady(_) => "SetPlayWhenReady",
            Self::SetRendererDisabled { .. } => "SetRendererDisabled",
            Self::SetVideoSurface => "SetVideoSurface",
            Self::ClearVideoSurface => "ClearVideoSurface",
            Self::Prepare => "Prepare",
            Self::SetMediaItems { .. } => "SetMediaItems",
            Self::AddMediaItems { .. } => "AddMediaItems",
            Self::MoveMediaItem { .. } => "MoveMediaItem",
            Self::RemoveMediaItems { .. } => "RemoveMediaItems",
            Self::ClearMediaItems => "ClearMediaItems",
            Self::SetRepeatMode(_) => "SetRepeatMode",
            Self::SetShuffleModeEnabled(_) => "SetShuffleModeEnabled",
            Self::SetShuffleOrder(_) => "SetShuffleOrder",
            Self::SetPlaybackSpeed(_) => "SetPlaybackSpeed",
            Self::SendMessage(_) => "SendMessage",
            Self::ThrowPlaybackError(_) => "ThrowPlaybackError",
            Self::ExecuteRunnable(_) => "ExecuteRunnable",
            Self::WaitForPlaybackState(_) => "WaitForPlaybackState",
            Self::WaitForPlayWhenReady(_) => "WaitForPlayWhenReady",
            Self::WaitForIsLoading(_) => "WaitForIsLoading",
            Self::WaitForTimelineChanged { .. } => "WaitForTimelineChanged",
            Self::WaitForPositionDiscontinuity(_) => "WaitForPositionDiscontinuity",
            Self::WaitForMessage(_) => "WaitForMessage",
            Self::WaitForPendingPlayerCommands => "WaitForPendingPlayerCommands",
            Self::PlayUntilPosition { .. } => "PlayUntilPosition",
        }
    }

    fn describe(&self) -> String {
        let name = self.name();
        match self {
            Self::Seek {
                media_item_index: Some(index),
                position_ms,
                ..
            } => format!("{name}:{index}:{position_ms}"),
            Self::Seek { position_ms, .. } => format!("{name}:{position_ms}"),
            Self::SetPlayWhenReady(flag)
            | Self::SetShuffleModeEnabled(flag)
            | Self::WaitForPlayWhenReady(flag)
            | Self::WaitForIsLoading(flag) => format!("{name}:{flag}"),
            Self::SetRendererDisabled {
                renderer_index,
                disabled,
            } => format!("{name}:{renderer_index}:{disabled}"),
            Self::SetMediaItems { items, .. } | Self::AddMediaItems { items, .. } => {
                format!("{name}:{}", items.len())
            }
            Self::MoveMediaItem {
                current_index,
                new_index,
            } => format!("{name}:{current_index}:{new_index}"),
            Self::RemoveMediaItems { from, to } => format!("{name}:{from}:{to}"),
            Self::SetRepeatMode(mode) => format!("{name}:{mode:?}"),
            Self::SetPlaybackSpeed(speed) => format!("{name}:{speed}"),
            Self::WaitForPlaybackState(state) => format!("{name}:{state:?}"),
            Self::WaitForPositionDiscontinuity(Some(reason)) => format!("{name}:{reason:?}"),
            Self::PlayUntilPosition {
                media_item_index,
                position_ms,
            } => format!("{name}:{media_item_index}:{position_ms}"),
            _ => name.to_owned(),
        }
    }
}

impl fmt::Debug for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// One step of an action schedule.
#[derive(Debug, Clone)]
pub struct Action {
    tag: String,
    description: Option<String>,
    kind: ActionKind,
}

impl Action {
    pub fn new(tag: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            tag: tag.into(),
            description: None,
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The explicit description, or one derived from the kind.
    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.kind.describe())
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub(crate) fn is_completion(&self) -> bool {
        matches!(self.kind, ActionKind::Finish)
    }

    /// Runs the action and hands control to `next`.
    ///
    /// Immediate actions schedule `next` once their effect is done. Deferred
    /// actions keep `next` until their condition holds and do nothing when
    /// there is no `next`.
    pub(crate) fn execute_and_schedule_next(
        &self,
        context: &ActionContext,
        next: Option<Next>,
    ) -> Result<(), ActionError> {
        log::info!(target: SCHEDULE_LOG_TARGET, "{}: {}", self.tag, self.description());

        let Some(next) = next else {
            if !self.kind.is_deferred() {
                self.execute(context)?;
            }
            return Ok(());
        };
        if self.is_completion() {
            return Err(ActionError::CompletionNotTerminal);
        }
        if self.kind.is_deferred() {
            return wait::defer(&self.kind, context, next);
        }
        self.execute(context)?;
        next.schedule();
        Ok(())
    }

    fn execute(&self, context: &ActionContext) -> Result<(), ActionError> {
        let player = context.player();
        match &self.kind {
            ActionKind::Root | ActionKind::Finish => {}
            ActionKind::Seek {
                media_item_index,
                position_ms,
                catch_illegal_seek,
            } => {
                let seeked = match media_item_index {
                    Some(index) => player.seek_to(*index, *position_ms),
                    None => player.seek_to_position(*position_ms),
                };
                match seeked {
                    Err(error @ PlayerError::IllegalSeekPosition { .. }) if *catch_illegal_seek => {
                        log::warn!(target: SCHEDULE_LOG_TARGET, "{}: ignoring {error}", self.tag);
                    }
                    result => result?,
                }
            }
            ActionKind::Stop => player.stop(),
            ActionKind::SetPlayWhenReady(play_when_ready) => {
                player.set_play_when_ready(*play_when_ready);
            }
            ActionKind::SetRendererDisabled {
                renderer_index,
                disabled,
            } => match context.track_selector() {
                Some(selector) => selector.set_renderer_disabled(*renderer_index, *disabled),
                None => log::warn!(
                    target: SCHEDULE_LOG_TARGET,
                    "{}: no track selector, renderer {renderer_index} left as is",
                    self.tag
                ),
            },
            ActionKind::SetVideoSurface => player.set_video_surface(context.surface().cloned()),
            ActionKind::ClearVideoSurface => player.set_video_surface(None),
            ActionKind::Prepare => player.prepare(),
            ActionKind::SetMediaItems { items, start } => {
                player.set_media_items(items.clone(), *start)?;
            }
            ActionKind::AddMediaItems { index, items } => {
                player.add_media_items(*index, items.clone())?;
            }
            ActionKind::MoveMediaItem {
                current_index,
                new_index,
            } => player.move_media_items(*current_index, current_index + 1, *new_index)?,
            ActionKind::RemoveMediaItems { from, to } => player.remove_media_items(*from, *to)?,
            ActionKind::ClearMediaItems => player.clear_media_items()?,
            ActionKind::SetRepeatMode(mode) => player.set_repeat_mode(*mode),
            ActionKind::SetShuffleModeEnabled(enabled) => player.set_shuffle_mode_enabled(*enabled),
            ActionKind::SetShuffleOrder(order) => player.set_shuffle_order(order.clone())?,
            ActionKind::SetPlaybackSpeed(speed) => player.set_playback_speed(*speed),
            ActionKind::SendMessage(message) => player.send_message(message.clone())?,
            ActionKind::ThrowPlaybackError(error) => {
                let error = error.clone();
                player.send_message(PlayerMessage::from_fn(move |_, _| Err(error.clone())))?;
            }
            ActionKind::ExecuteRunnable(runnable) => runnable(context),
            ActionKind::WaitForPlaybackState(_)
            | ActionKind::WaitForPlayWhenReady(_)
            | ActionKind::WaitForIsLoading(_)
            | ActionKind::WaitForTimelineChanged { .. }
            | ActionKind::WaitForPositionDiscontinuity(_)
            | ActionKind::WaitForMessage(_)
            | ActionKind::WaitForPendingPlayerCommands
            | ActionKind::PlayUntilPosition { .. } => {}
        }
        Ok(())
    }
}
