use parking_lot::Mutex;

use crate::{
    error::PlaybackError,
    player::{
        DiscontinuityReason, MediaItem, MediaItemTransitionReason, PlaybackState, PlayerEvent,
        PlayerListener, PositionInfo, RepeatMode, Timeline, TimelineChangeReason,
    },
};

/// Player listener that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<PlayerEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: PlayerEvent) {
        log::trace!("recorded {event:?}");
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<PlayerEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn collect<T>(&self, select: impl Fn(&PlayerEvent) -> Option<T>) -> Vec<T> {
        self.events.lock().iter().filter_map(select).collect()
    }

    pub fn playback_states(&self) -> Vec<PlaybackState> {
        self.collect(|event| match event {
            PlayerEvent::PlaybackStateChanged(state) => Some(*state),
            _ => None,
        })
    }

    pub fn timelines(&self) -> Vec<Timeline> {
        self.collect(|event| match event {
            PlayerEvent::TimelineChanged { timeline, .. } => Some(timeline.clone()),
            _ => None,
        })
    }

    pub fn timeline_change_reasons(&self) -> Vec<TimelineChangeReason> {
        self.collect(|event| match event {
            PlayerEvent::TimelineChanged { reason, .. } => Some(*reason),
            _ => None,
        })
    }

    pub fn discontinuity_reasons(&self) -> Vec<DiscontinuityReason> {
        self.collect(|event| match event {
            PlayerEvent::PositionDiscontinuity { reason, .. } => Some(*reason),
            _ => None,
        })
    }

    /// Item index of every media item transition, in order.
    pub fn played_media_item_indices(&self) -> Vec<usize> {
        self.collect(|event| match event {
            PlayerEvent::MediaItemTransition {
                media_item_index, ..
            } => Some(*media_item_index),
            _ => None,
        })
    }

    pub fn media_item_transition_reasons(&self) -> Vec<MediaItemTransitionReason> {
        self.collect(|event| match event {
            PlayerEvent::MediaItemTransition { reason, .. } => Some(*reason),
            _ => None,
        })
    }

    pub fn errors(&self) -> Vec<PlaybackError> {
        self.collect(|event| match event {
            PlayerEvent::PlayerError(error) => Some(error.clone()),
            _ => None,
        })
    }

    pub fn assert_playback_states_equal(&self, expected: &[PlaybackState]) {
        assert_eq!(self.playback_states(), expected, "playback states");
    }

    pub fn assert_timelines_equal(&self, expected: &[Timeline]) {
        assert_eq!(self.timelines(), expected, "timelines");
    }

    pub fn assert_timeline_change_reasons_equal(&self, expected: &[TimelineChangeReason]) {
        assert_eq!(
            self.timeline_change_reasons(),
            expected,
            "timeline change reasons"
        );
    }

    pub fn assert_position_discontinuity_reasons_equal(&self, expected: &[DiscontinuityReason]) {
        assert_eq!(
            self.discontinuity_reasons(),
            expected,
            "position discontinuity reasons"
        );
    }

    pub fn assert_played_media_item_indices(&self, expected: &[usize]) {
        assert_eq!(
            self.played_media_item_indices(),
            expected,
            "played media item indices"
        );
    }

    pub fn assert_no_errors(&self) {
        assert_eq!(self.errors(), Vec::new(), "player errors");
    }
}

impl PlayerListener for EventRecorder {
    fn on_playback_state_changed(&self, state: PlaybackState) {
        self.record(PlayerEvent::PlaybackStateChanged(state));
    }

    fn on_play_when_ready_changed(&self, play_when_ready: bool) {
        self.record(PlayerEvent::PlayWhenReadyChanged(play_when_ready));
    }

    fn on_is_loading_changed(&self, is_loading: bool) {
        self.record(PlayerEvent::IsLoadingChanged(is_loading));
    }

    fn on_timeline_changed(&self, timeline: &Timeline, reason: TimelineChangeReason) {
        self.record(PlayerEvent::TimelineChanged {
            timeline: timeline.clone(),
            reason,
        });
    }

    fn on_position_discontinuity(
        &self,
        old: PositionInfo,
        new: PositionInfo,
        reason: DiscontinuityReason,
    ) {
        self.record(PlayerEvent::PositionDiscontinuity { old, new, reason });
    }

    fn on_media_item_transition(
        &self,
        media_item: Option<&MediaItem>,
        media_item_index: usize,
        reason: MediaItemTransitionReason,
    ) {
        self.record(PlayerEvent::MediaItemTransition {
            media_item: media_item.cloned(),
            media_item_index,
            reason,
        });
    }

    fn on_repeat_mode_changed(&self, repeat_mode: RepeatMode) {
        self.record(PlayerEvent::RepeatModeChanged(repeat_mode));
    }

    fn on_shuffle_mode_enabled_changed(&self, enabled: bool) {
        self.record(PlayerEvent::ShuffleModeEnabledChanged(enabled));
    }

    fn on_player_error(&self, error: &PlaybackError) {
        self.record(PlayerEvent::PlayerError(error.clone()));
    }
}
