//! Scriptable player for unit tests. Records every call and never plays.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use transport::{clock::Clock, looper::Looper};

use crate::{
    error::{PlaybackError, PlayerError},
    player::{
        ListenerId, MediaItem, PlaybackState, Player, PlayerEvent, PlayerListener, PlayerMessage,
        RepeatMode, ShuffleOrder, StartPosition, Surface, Timeline,
    },
};

struct StubState {
    playback_state: PlaybackState,
    play_when_ready: bool,
    is_loading: bool,
    error: Option<PlaybackError>,
    timeline: Timeline,
    media_item_index: usize,
    position_ms: u64,
    repeat_mode: RepeatMode,
    shuffle_mode_enabled: bool,
    speed: f32,
    surface: Option<Surface>,
}

pub(crate) struct StubPlayer {
    looper: Looper,
    clock: Arc<dyn Clock>,
    state: Mutex<StubState>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn PlayerListener>)>>,
    listeners_added: AtomicUsize,
    calls: Mutex<Vec<String>>,
    messages: Mutex<Vec<PlayerMessage>>,
}

impl StubPlayer {
    pub(crate) fn new(looper: Looper, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            looper,
            clock,
            state: Mutex::new(StubState {
                playback_state: PlaybackState::Idle,
                play_when_ready: false,
                is_loading: false,
                error: None,
                timeline: Timeline::empty(),
                media_item_index: 0,
                position_ms: 0,
                repeat_mode: RepeatMode::Off,
                shuffle_mode_enabled: false,
                speed: 1.0,
                surface: None,
            }),
            listeners: Mutex::new(Vec::new()),
            listeners_added: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn listeners_added(&self) -> usize {
        self.listeners_added.load(Ordering::SeqCst)
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub(crate) fn sent_messages(&self) -> Vec<PlayerMessage> {
        self.messages.lock().clone()
    }

    pub(crate) fn emit(&self, event: &PlayerEvent) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            event.dispatch_to(listener.as_ref());
        }
    }

    pub(crate) fn set_playback_state(&self, state: PlaybackState) {
        self.state.lock().playback_state = state;
        self.emit(&PlayerEvent::PlaybackStateChanged(state));
    }

    pub(crate) fn set_is_loading(&self, is_loading: bool) {
        self.state.lock().is_loading = is_loading;
        self.emit(&PlayerEvent::IsLoadingChanged(is_loading));
    }

    pub(crate) fn set_timeline(&self, timeline: Timeline) {
        self.state.lock().timeline = timeline;
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl Player for StubPlayer {
    fn application_looper(&self) -> &Looper {
        &self.looper
    }

    fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn playback_state(&self) -> PlaybackState {
        self.state.lock().playback_state
    }

    fn play_when_ready(&self) -> bool {
        self.state.lock().play_when_ready
    }

    fn is_loading(&self) -> bool {
        self.state.lock().is_loading
    }

    fn player_error(&self) -> Option<PlaybackError> {
        self.state.lock().error.clone()
    }

    fn timeline(&self) -> Timeline {
        self.state.lock().timeline.clone()
    }

    fn current_media_item_index(&self) -> usize {
        self.state.lock().media_item_index
    }

    fn current_position_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    fn repeat_mode(&self) -> RepeatMode {
        self.state.lock().repeat_mode
    }

    fn shuffle_mode_enabled(&self) -> bool {
        self.state.lock().shuffle_mode_enabled
    }

    fn playback_speed(&self) -> f32 {
        self.state.lock().speed
    }

    fn video_surface(&self) -> Option<Surface> {
        self.state.lock().surface.clone()
    }

    fn prepare(&self) {
        self.record("prepare".to_owned());
    }

    fn set_play_when_ready(&self, play_when_ready: bool) {
        self.record(format!("set_play_when_ready({play_when_ready})"));
        let changed = {
            let mut state = self.state.lock();
            let changed = state.play_when_ready != play_when_ready;
            state.play_when_ready = play_when_ready;
            changed
        };
        if changed {
            self.emit(&PlayerEvent::PlayWhenReadyChanged(play_when_ready));
        }
    }

    fn seek_to(&self, media_item_index: usize, position_ms: u64) -> Result<(), PlayerError> {
        self.record(format!("seek_to({media_item_index}, {position_ms})"));
        let mut state = self.state.lock();
        if !state.timeline.is_empty() && media_item_index >= state.timeline.len() {
            return Err(PlayerError::IllegalSeekPosition {
                media_item_index,
                position_ms,
            });
        }
        state.media_item_index = media_item_index;
        state.position_ms = position_ms;
        Ok(())
    }

    fn stop(&self) {
        self.record("stop".to_owned());
    }

    fn set_repeat_mode(&self, repeat_mode: RepeatMode) {
        self.record(format!("set_repeat_mode({repeat_mode:?})"));
        self.state.lock().repeat_mode = repeat_mode;
    }

    fn set_shuffle_mode_enabled(&self, enabled: bool) {
        self.record(format!("set_shuffle_mode_enabled({enabled})"));
        self.state.lock().shuffle_mode_enabled = enabled;
    }

    fn set_shuffle_order(&self, order: ShuffleOrder) -> Result<(), PlayerError> {
        self.record(format!("set_shuffle_order({})", order.len()));
        Ok(())
    }

    fn set_playback_speed(&self, speed: f32) {
        self.record(format!("set_playback_speed({speed})"));
        self.state.lock().speed = speed;
    }

    fn set_media_items(
        &self,
        items: Vec<MediaItem>,
        _start: StartPosition,
    ) -> Result<(), PlayerError> {
        self.record(format!("set_media_items({})", items.len()));
        self.state.lock().timeline = Timeline::new(items);
        Ok(())
    }

    fn add_media_items(
        &self,
        index: Option<usize>,
        items: Vec<MediaItem>,
    ) -> Result<(), PlayerError> {
        self.record(format!("add_media_items({index:?}, {})", items.len()));
        Ok(())
    }

    fn move_media_items(&self, from: usize, to: usize, new_index: usize) -> Result<(), PlayerError> {
        self.record(format!("move_media_items({from}, {to}, {new_index})"));
        Ok(())
    }

    fn remove_media_items(&self, from: usize, to: usize) -> Result<(), PlayerError> {
        self.record(format!("remove_media_items({from}, {to})"));
        Ok(())
    }

    fn set_video_surface(&self, surface: Option<Surface>) {
        self.record(format!(
            "set_video_surface({:?})",
            surface.as_ref().map(Surface::name)
        ));
        self.state.lock().surface = surface;
    }

    fn send_message(&self, message: PlayerMessage) -> Result<(), PlayerError> {
        self.record(format!("send_message({})", message.message_type()));
        self.messages.lock().push(message);
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn PlayerListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.lock().push((id, listener));
        self.listeners_added.fetch_add(1, Ordering::SeqCst);
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(candidate, _)| *candidate != id);
        before != listeners.len()
    }

    fn release(&self) {
        self.record("release".to_owned());
    }
}
