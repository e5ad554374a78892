use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use parking_lot::Mutex;

use crate::{
    error::PlaybackError,
    player::{
        DiscontinuityReason, ListenerId, MediaItem, MediaItemTransitionReason, PlaybackState,
        Player, PlayerEvent, PlayerListener, PositionInfo, RepeatMode, Timeline,
        TimelineChangeReason,
    },
};

/// Listener that forwards every callback to a closure as a [`PlayerEvent`].
pub struct EventCallback<F> {
    on_event: F,
}

impl<F> EventCallback<F>
where
    F: Fn(&PlayerEvent) + Send + Sync,
{
    pub fn new(on_event: F) -> Self {
        Self { on_event }
    }

    fn emit(&self, event: &PlayerEvent) {
        (self.on_event)(event);
    }
}

impl<F> fmt::Debug for EventCallback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCallback").finish_non_exhaustive()
    }
}

impl<F> PlayerListener for EventCallback<F>
where
    F: Fn(&PlayerEvent) + Send + Sync,
{
    fn on_playback_state_changed(&self, state: PlaybackState) {
        self.emit(&PlayerEvent::PlaybackStateChanged(state));
    }

    fn on_play_when_ready_changed(&self, play_when_ready: bool) {
        self.emit(&PlayerEvent::PlayWhenReadyChanged(play_when_ready));
    }

    fn on_is_loading_changed(&self, is_loading: bool) {
        self.emit(&PlayerEvent::IsLoadingChanged(is_loading));
    }

    fn on_timeline_changed(&self, timeline: &Timeline, reason: TimelineChangeReason) {
        self.emit(&PlayerEvent::TimelineChanged {
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
        self.emit(&PlayerEvent::PositionDiscontinuity { old, new, reason });
    }

    fn on_media_item_transition(
        &self,
        media_item: Option<&MediaItem>,
        media_item_index: usize,
        reason: MediaItemTransitionReason,
    ) {
        self.emit(&PlayerEvent::MediaItemTransition {
            media_item: media_item.cloned(),
            media_item_index,
            reason,
        });
    }

    fn on_repeat_mode_changed(&self, repeat_mode: RepeatMode) {
        self.emit(&PlayerEvent::RepeatModeChanged(repeat_mode));
    }

    fn on_shuffle_mode_enabled_changed(&self, enabled: bool) {
        self.emit(&PlayerEvent::ShuffleModeEnabledChanged(enabled));
    }

    fn on_player_error(&self, error: &PlaybackError) {
        self.emit(&PlayerEvent::PlayerError(error.clone()));
    }
}

pub fn on_event<F>(on_event: F) -> Arc<dyn PlayerListener>
where
    F: Fn(&PlayerEvent) + Send + Sync + 'static,
{
    Arc::new(EventCallback::new(on_event))
}

struct OneShot {
    id: OnceLock<ListenerId>,
    on_match: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// Registers a listener that fires `on_match` for the first event accepted by
/// `predicate`, then removes itself from `player`.
pub fn register_one_shot<P, M>(player: &Arc<dyn Player>, predicate: P, on_match: M) -> ListenerId
where
    P: Fn(&PlayerEvent) -> bool + Send + Sync + 'static,
    M: FnOnce() + Send + 'static,
{
    let slot = Arc::new(OneShot {
        id: OnceLock::new(),
        on_match: Mutex::new(Some(Box::new(on_match))),
    });
    let weak_player = Arc::downgrade(player);
    let listener_slot = Arc::clone(&slot);

    let id = player.add_listener(on_event(move |event| {
        if !predicate(event) {
            return;
        }
        let Some(on_match) = listener_slot.on_match.lock().take() else {
            return;
        };
        if let (Some(player), Some(id)) = (weak_player.upgrade(), listener_slot.id.get()) {
            player.remove_listener(*id);
        }
        on_match();
    }));
    // only this call fills the slot, so the set cannot fail
    let _ = slot.id.set(id);
    id
}
