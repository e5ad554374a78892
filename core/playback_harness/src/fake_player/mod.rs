//! A deterministic, clock-driven [`Player`].
//!
//! The application side keeps a masked copy of the player state so queries
//! reflect every call right away. Calls become [`PlayerCommand`]s pushed
//! through a ring buffer to the playback loop, which runs on the playback
//! looper, moves the position along with the clock and posts what happened
//! back to the application looper.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use rtrb::RingBuffer;
use transport::{clock::Clock, handler::Handler, looper::Looper};

use crate::{
    constants::{
        DEFAULT_COMMAND_CAPACITY, DEFAULT_PLAYBACK_SPEED, DEFAULT_WORK_INTERVAL_MS,
    },
    error::{PlaybackError, PlayerError},
    fake_player::{
        command::{PlayerCommand, PlayerCommandProducer},
        playback::{PlaybackCore, PlaybackUpdate, Step, scaled_ms},
    },
    player::{
        DiscontinuityReason, ListenerId, MediaItem, MediaItemTransitionReason, PlaybackState,
        Player, PlayerEvent, PlayerListener, PlayerMessage, PositionInfo, RepeatMode,
        ShuffleOrder, StartPosition, Surface, Timeline, TimelineChangeReason,
    },
};

pub mod command;
mod playback;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakePlayerConfig {
    /// clock time between two steps while playing or buffering
    pub work_interval_ms: u64,
    pub prepare_duration_ms: u64,
    /// buffering after a seek or a playlist jump
    pub seek_buffering_ms: u64,
    pub command_capacity: usize,
}

impl Default for FakePlayerConfig {
    fn default() -> Self {
        Self {
            work_interval_ms: DEFAULT_WORK_INTERVAL_MS,
            prepare_duration_ms: 0,
            seek_buffering_ms: 0,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

impl FakePlayerConfig {
    pub fn with_work_interval_ms(mut self, work_interval_ms: u64) -> Self {
        self.work_interval_ms = work_interval_ms;
        self
    }

    pub fn with_prepare_duration_ms(mut self, prepare_duration_ms: u64) -> Self {
        self.prepare_duration_ms = prepare_duration_ms;
        self
    }

    pub fn with_seek_buffering_ms(mut self, seek_buffering_ms: u64) -> Self {
        self.seek_buffering_ms = seek_buffering_ms;
        self
    }

    pub fn with_command_capacity(mut self, command_capacity: usize) -> Self {
        self.command_capacity = command_capacity;
        self
    }
}

pub struct FakePlayerBuilder {
    app_looper: Looper,
    playback_looper: Option<Looper>,
    clock: Arc<dyn Clock>,
    config: FakePlayerConfig,
}

impl FakePlayerBuilder {
    /// Runs the playback loop on `looper` instead of the application looper.
    pub fn playback_looper(mut self, looper: Looper) -> Self {
        self.playback_looper = Some(looper);
        self
    }

    pub fn config(mut self, config: FakePlayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Arc<FakePlayer> {
        let Self {
            app_looper,
            playback_looper,
            clock,
            config,
        } = self;
        let (producer, consumer) = RingBuffer::new(config.command_capacity.max(1));
        let now = clock.elapsed_since_boot_ms();
        let playback_looper = playback_looper.unwrap_or_else(|| app_looper.clone());

        Arc::new_cyclic(|this| FakePlayer {
            this: this.clone(),
            config,
            app_handler: Handler::new(app_looper, Arc::clone(&clock)),
            work_handler: Handler::new(playback_looper, Arc::clone(&clock)),
            state: Mutex::new(AppState::new(now)),
            listeners: Mutex::new(Vec::new()),
            commands: Mutex::new(producer),
            core: Mutex::new(PlaybackCore::new(consumer, config, now)),
        })
    }
}

/// Application side view of the player.
struct AppState {
    playback_state: PlaybackState,
    play_when_ready: bool,
    is_loading: bool,
    error: Option<PlaybackError>,
    timeline: Timeline,
    media_item_index: usize,
    position_ms: u64,
    /// clock time at which `position_ms` was accurate
    updated_at_ms: u64,
    repeat_mode: RepeatMode,
    shuffle_mode_enabled: bool,
    shuffle_order: ShuffleOrder,
    speed: f32,
    surface: Option<Surface>,
    /// commands the playback loop has not reported back on yet
    pending_acks: usize,
    released: bool,
}

impl AppState {
    fn new(now: u64) -> Self {
        Self {
            playback_state: PlaybackState::Idle,
            play_when_ready: false,
            is_loading: false,
            error: None,
            timeline: Timeline::empty(),
            media_item_index: 0,
            position_ms: 0,
            updated_at_ms: now,
            repeat_mode: RepeatMode::Off,
            shuffle_mode_enabled: false,
            shuffle_order: ShuffleOrder::reversed(0),
            speed: DEFAULT_PLAYBACK_SPEED,
            surface: None,
            pending_acks: 0,
            released: false,
        }
    }

    fn position_info(&self) -> PositionInfo {
        PositionInfo::new(self.media_item_index, self.position_ms)
    }

    fn set_playback_state(&mut self, state: PlaybackState, events: &mut Vec<PlayerEvent>) {
        if self.playback_state != state {
            self.playback_state = state;
            events.push(PlayerEvent::PlaybackStateChanged(state));
        }
    }

    fn set_position(&mut self, media_item_index: usize, position_ms: u64, now: u64) {
        self.media_item_index = media_item_index;
        self.position_ms = position_ms;
        self.updated_at_ms = now;
    }

    fn active_shuffle_order(&self) -> Option<ShuffleOrder> {
        self.shuffle_mode_enabled.then(|| self.shuffle_order.clone())
    }

    /// Installs `timeline` and returns the command that tells the playback
    /// loop about it.
    fn replace_timeline(
        &mut self,
        timeline: Timeline,
        restart_at: Option<u64>,
        events: &mut Vec<PlayerEvent>,
    ) -> PlayerCommand {
        let ended = self.playback_state != PlaybackState::Idle
            && (timeline.is_empty() || self.media_item_index >= timeline.len());
        if self.shuffle_order.len() != timeline.len() {
            self.shuffle_order = ShuffleOrder::reversed(timeline.len());
        }
        self.timeline = timeline.clone();
        events.push(PlayerEvent::TimelineChanged {
            timeline: timeline.clone(),
            reason: TimelineChangeReason::PlaylistChanged,
        });
        if ended {
            self.set_playback_state(PlaybackState::Ended, events);
        } else if restart_at.is_some() && self.playback_state != PlaybackState::Idle {
            self.set_playback_state(PlaybackState::Buffering, events);
        }
        PlayerCommand::UpdatePlaylist {
            timeline,
            media_item_index: self.media_item_index,
            position_ms: restart_at,
            ended,
        }
    }
}

/// Clock-driven fake player for tests.
///
/// Must be used from the application looper it was built with.
pub struct FakePlayer {
    this: Weak<FakePlayer>,
    config: FakePlayerConfig,
    app_handler: Handler,
    work_handler: Handler,
    state: Mutex<AppState>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn PlayerListener>)>>,
    commands: Mutex<PlayerCommandProducer>,
    core: Mutex<PlaybackCore>,
}

impl fmt::Debug for FakePlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakePlayer")
            .field("playback_state", &state.playback_state)
            .field("play_when_ready", &state.play_when_ready)
            .field("media_item_index", &state.media_item_index)
            .field("pending_acks", &state.pending_acks)
            .field("released", &state.released)
            .finish_non_exhaustive()
    }
}

impl FakePlayer {
    pub fn builder(app_looper: Looper, clock: Arc<dyn Clock>) -> FakePlayerBuilder {
        FakePlayerBuilder {
            app_looper,
            playback_looper: None,
            clock,
            config: FakePlayerConfig::default(),
        }
    }

    pub fn config(&self) -> FakePlayerConfig {
        self.config
    }

    pub fn playback_looper(&self) -> &Looper {
        self.work_handler.looper()
    }

    /// Whether the playback loop has not yet reported back on every command.
    pub fn has_pending_commands(&self) -> bool {
        self.state.lock().pending_acks > 0
    }

    fn now(&self) -> u64 {
        self.app_handler.clock().elapsed_since_boot_ms()
    }

    fn notify(&self, events: &[PlayerEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for event in events {
            for listener in &listeners {
                event.dispatch_to(listener.as_ref());
            }
        }
    }

    /// Pushes `command` to the playback loop and wakes it up.
    fn send_command(&self, state: &mut AppState, command: PlayerCommand) {
        if state.released {
            return;
        }
        let name = command.name();
        if self.commands.lock().push(command).is_err() {
            log::error!("command buffer full, dropping {name}");
            return;
        }
        state.pending_acks += 1;
        self.post_work(false);
    }

    fn post_work(&self, tick: bool) {
        let player = self.this.clone();
        let work = move || {
            if let Some(player) = player.upgrade() {
                player.do_work(tick);
            }
        };
        if tick {
            let now = self.now();
            let delay = self.core.lock().next_tick_delay_ms(now);
            if let Some(delay) = delay {
                self.work_handler.post_delayed(work, delay);
            }
        } else {
            self.work_handler.post(work);
        }
    }

    /// One step of the playback loop.
    fn do_work(&self, tick: bool) {
        let now = self.now();
        let immediate = {
            let mut core = self.core.lock();
            if tick {
                core.tick_scheduled = false;
            }
            if core.is_released() {
                return;
            }
            let immediate = core.drain_commands(now);
            if core.is_released() {
                self.work_handler.remove_all_callbacks();
                return;
            }
            immediate
        };
        self.deliver_all(immediate);

        loop {
            let now = self.now();
            let due = match self.core.lock().step(now) {
                Step::Deliver(message) => message,
                Step::Idle | Step::Done => break,
            };
            let result = self.deliver(due);
            let immediate = {
                let mut core = self.core.lock();
                if let Err(error) = result {
                    core.fail(error);
                }
                core.drain_commands(now)
            };
            self.deliver_all(immediate);
        }

        let (update, arm_tick) = {
            let mut core = self.core.lock();
            let arm_tick = !core.tick_scheduled && core.next_tick_delay_ms(now).is_some();
            if arm_tick {
                core.tick_scheduled = true;
            }
            (core.take_update(), arm_tick)
        };
        if arm_tick {
            self.post_work(true);
        }
        let player = self.this.clone();
        self.app_handler.post(move || {
            if let Some(player) = player.upgrade() {
                player.apply_update(update);
            }
        });
    }

    fn deliver_all(&self, messages: Vec<PlayerMessage>) {
        for message in messages {
            if let Err(error) = self.deliver(message) {
                self.core.lock().fail(error);
            }
        }
    }

    /// Delivers `message` here, or posts it to its own looper.
    fn deliver(&self, message: PlayerMessage) -> Result<(), PlaybackError> {
        match message.looper().cloned() {
            Some(looper) if !looper.is_current() => {
                let player = self.this.clone();
                looper.post(move || {
                    if let Err(error) = message.deliver()
                        && let Some(player) = player.upgrade()
                    {
                        player.fail_from_elsewhere(error);
                    }
                });
                Ok(())
            }
            _ => message.deliver(),
        }
    }

    /// Reports an error raised by a message delivered on another looper.
    fn fail_from_elsewhere(&self, error: PlaybackError) {
        let player = self.this.clone();
        self.work_handler.post(move || {
            if let Some(player) = player.upgrade() {
                player.core.lock().fail(error);
                player.do_work(false);
            }
        });
    }

    /// Folds a playback update into the application state.
    ///
    /// While commands are still in flight the masked state wins, only errors
    /// get through.
    fn apply_update(&self, update: PlaybackUpdate) {
        let events = {
            let mut state = self.state.lock();
            if state.released {
                return;
            }
            state.pending_acks = state.pending_acks.saturating_sub(update.acks);
            let mut events = Vec::new();

            if let Some(error) = update.error {
                state.is_loading = false;
                state.set_playback_state(PlaybackState::Idle, &mut events);
                state.error = Some(error.clone());
                events.push(PlayerEvent::PlayerError(error));
            }
            if state.pending_acks == 0 {
                for (old, new, reason) in update.discontinuities {
                    events.push(PlayerEvent::PositionDiscontinuity { old, new, reason });
                }
                for (media_item_index, reason) in update.transitions {
                    events.push(PlayerEvent::MediaItemTransition {
                        media_item: state.timeline.item(media_item_index).cloned(),
                        media_item_index,
                        reason,
                    });
                }
                state.set_position(
                    update.media_item_index,
                    update.position_ms,
                    update.updated_at_ms,
                );
                state.set_playback_state(update.state, &mut events);
                if state.is_loading != update.is_loading {
                    state.is_loading = update.is_loading;
                    events.push(PlayerEvent::IsLoadingChanged(update.is_loading));
                }
            }
            events
        };
        self.notify(&events);
    }

    /// Runs a mutation under the state lock and then notifies listeners.
    fn mutate<T>(&self, f: impl FnOnce(&mut AppState, &mut Vec<PlayerEvent>) -> T) -> T {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            f(&mut state, &mut events)
        };
        self.notify(&events);
        result
    }
}

impl Player for FakePlayer {
    fn application_looper(&self) -> &Looper {
        self.app_handler.looper()
    }

    fn clock(&self) -> &Arc<dyn Clock> {
        self.app_handler.clock()
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

    /// Extrapolated from the last playback update while playing.
    fn current_position_ms(&self) -> u64 {
        let now = self.now();
        let state = self.state.lock();
        let playing = state.playback_state == PlaybackState::Ready
            && state.play_when_ready
            && state.pending_acks == 0;
        if !playing {
            return state.position_ms;
        }
        let position = state.position_ms
            + scaled_ms(now.saturating_sub(state.updated_at_ms), state.speed);
        state
            .timeline
            .duration_ms(state.media_item_index)
            .map_or(position, |duration| position.min(duration))
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
        self.mutate(|state, events| {
            if state.released || state.playback_state != PlaybackState::Idle {
                return;
            }
            state.error = None;
            let next = if state.timeline.is_empty() {
                PlaybackState::Ended
            } else {
                PlaybackState::Buffering
            };
            state.set_playback_state(next, events);
            self.send_command(state, PlayerCommand::Prepare);
        });
    }

    fn set_play_when_ready(&self, play_when_ready: bool) {
        let position_ms = self.current_position_ms();
        let now = self.now();
        self.mutate(|state, events| {
            if state.play_when_ready == play_when_ready {
                return;
            }
            // freeze the extrapolated position at the moment of the change
            let index = state.media_item_index;
            state.set_position(index, position_ms, now);
            state.play_when_ready = play_when_ready;
            events.push(PlayerEvent::PlayWhenReadyChanged(play_when_ready));
            self.send_command(state, PlayerCommand::SetPlayWhenReady(play_when_ready));
        });
    }

    fn seek_to(&self, media_item_index: usize, position_ms: u64) -> Result<(), PlayerError> {
        let now = self.now();
        self.mutate(|state, events| {
            if state.released {
                return Err(PlayerError::Released);
            }
            let len = state.timeline.len();
            if len > 0 && media_item_index >= len {
                return Err(PlayerError::IllegalSeekPosition {
                    media_item_index,
                    position_ms,
                });
            }
            let old = state.position_info();
            state.set_position(media_item_index, position_ms, now);
            events.push(PlayerEvent::PositionDiscontinuity {
                old,
                new: state.position_info(),
                reason: DiscontinuityReason::Seek,
            });
            if old.media_item_index != media_item_index {
                events.push(PlayerEvent::MediaItemTransition {
                    media_item: state.timeline.item(media_item_index).cloned(),
                    media_item_index,
                    reason: MediaItemTransitionReason::Seek,
                });
            }
            if state.playback_state != PlaybackState::Idle && len > 0 {
                state.set_playback_state(PlaybackState::Buffering, events);
            }
            self.send_command(
                state,
                PlayerCommand::Seek {
                    media_item_index,
                    position_ms,
                },
            );
            Ok(())
        })
    }

    fn stop(&self) {
        let position_ms = self.current_position_ms();
        let now = self.now();
        self.mutate(|state, events| {
            let index = state.media_item_index;
            state.set_position(index, position_ms, now);
            state.set_playback_state(PlaybackState::Idle, events);
            if state.is_loading {
                state.is_loading = false;
                events.push(PlayerEvent::IsLoadingChanged(false));
            }
            self.send_command(state, PlayerCommand::Stop);
        });
    }

    fn set_repeat_mode(&self, repeat_mode: RepeatMode) {
        self.mutate(|state, events| {
            if state.repeat_mode == repeat_mode {
                return;
            }
            state.repeat_mode = repeat_mode;
            events.push(PlayerEvent::RepeatModeChanged(repeat_mode));
            self.send_command(state, PlayerCommand::SetRepeatMode(repeat_mode));
        });
    }

    fn set_shuffle_mode_enabled(&self, enabled: bool) {
        self.mutate(|state, events| {
            if state.shuffle_mode_enabled == enabled {
                return;
            }
            state.shuffle_mode_enabled = enabled;
            events.push(PlayerEvent::ShuffleModeEnabledChanged(enabled));
            let order = state.active_shuffle_order();
            self.send_command(state, PlayerCommand::SetShuffleOrder(order));
        });
    }

    fn set_shuffle_order(&self, order: ShuffleOrder) -> Result<(), PlayerError> {
        self.mutate(|state, _| {
            let len = state.timeline.len();
            if order.len() != len {
                return Err(PlayerError::InvalidShuffleOrder(format!(
                    "order of length {} for {len} media items",
                    order.len()
                )));
            }
            state.shuffle_order = order;
            if state.shuffle_mode_enabled {
                let order = state.active_shuffle_order();
                self.send_command(state, PlayerCommand::SetShuffleOrder(order));
            }
            Ok(())
        })
    }

    fn set_playback_speed(&self, speed: f32) {
        let position_ms = self.current_position_ms();
        let now = self.now();
        self.mutate(|state, _| {
            let index = state.media_item_index;
            state.set_position(index, position_ms, now);
            state.speed = speed;
            self.send_command(state, PlayerCommand::SetPlaybackSpeed(speed));
        });
    }

    fn set_media_items(
        &self,
        items: Vec<MediaItem>,
        start: StartPosition,
    ) -> Result<(), PlayerError> {
        let position_ms = self.current_position_ms();
        let now = self.now();
        self.mutate(|state, events| {
            if state.released {
                return Err(PlayerError::Released);
            }
            let len = items.len();
            let (index, position) = match start {
                StartPosition::Reset => (0, 0),
                StartPosition::Keep if len == 0 => (0, 0),
                StartPosition::Keep => (state.media_item_index.min(len - 1), position_ms),
                StartPosition::At {
                    media_item_index,
                    position_ms,
                } => {
                    if len > 0 && media_item_index >= len {
                        return Err(PlayerError::IllegalSeekPosition {
                            media_item_index,
                            position_ms,
                        });
                    }
                    (media_item_index, position_ms)
                }
            };
            let old_item = state.timeline.item(state.media_item_index).cloned();
            let new_item = items.get(index).cloned();
            state.set_position(index, position, now);
            let command = state.replace_timeline(Timeline::new(items), Some(position), events);
            if old_item != new_item {
                events.push(PlayerEvent::MediaItemTransition {
                    media_item: new_item,
                    media_item_index: index,
                    reason: MediaItemTransitionReason::PlaylistChanged,
                });
            }
            self.send_command(state, command);
            Ok(())
        })
    }

    fn add_media_items(
        &self,
        index: Option<usize>,
        items: Vec<MediaItem>,
    ) -> Result<(), PlayerError> {
        let now = self.now();
        self.mutate(|state, events| {
            if state.released {
                return Err(PlayerError::Released);
            }
            let len = state.timeline.len();
            let insert_at = index.unwrap_or(len);
            if insert_at > len {
                return Err(PlayerError::IndexOutOfBounds {
                    index: insert_at,
                    len,
                });
            }
            if items.is_empty() {
                return Ok(());
            }
            let was_empty = len == 0;
            let added = items.len();
            let mut all = state.timeline.items().to_vec();
            all.splice(insert_at..insert_at, items);

            let restart_at = if was_empty {
                state.set_position(0, 0, now);
                if state.playback_state == PlaybackState::Ended {
                    state.set_playback_state(PlaybackState::Buffering, events);
                }
                Some(0)
            } else {
                if state.media_item_index >= insert_at {
                    state.media_item_index += added;
                }
                None
            };
            let command = state.replace_timeline(Timeline::new(all), restart_at, events);
            if was_empty {
                events.push(PlayerEvent::MediaItemTransition {
                    media_item: state.timeline.item(0).cloned(),
                    media_item_index: 0,
                    reason: MediaItemTransitionReason::PlaylistChanged,
                });
            }
            self.send_command(state, command);
            Ok(())
        })
    }

    fn move_media_items(&self, from: usize, to: usize, new_index: usize) -> Result<(), PlayerError> {
        self.mutate(|state, events| {
            if state.released {
                return Err(PlayerError::Released);
            }
            let len = state.timeline.len();
            if from > to || to > len || new_index + (to - from) > len {
                return Err(PlayerError::InvalidRange { from, to, len });
            }
            if from == to || from == new_index {
                return Ok(());
            }
            let mut items = state.timeline.items().to_vec();
            let mut indices: Vec<usize> = (0..len).collect();
            let moved: Vec<_> = items.drain(from..to).collect();
            let moved_indices: Vec<_> = indices.drain(from..to).collect();
            items.splice(new_index..new_index, moved);
            indices.splice(new_index..new_index, moved_indices);

            let current = state.media_item_index;
            state.media_item_index = indices
                .iter()
                .position(|&index| index == current)
                .unwrap_or(current);
            let command = state.replace_timeline(Timeline::new(items), None, events);
            self.send_command(state, command);
            Ok(())
        })
    }

    fn remove_media_items(&self, from: usize, to: usize) -> Result<(), PlayerError> {
        let position_ms = self.current_position_ms();
        let now = self.now();
        self.mutate(|state, events| {
            if state.released {
                return Err(PlayerError::Released);
            }
            let len = state.timeline.len();
            if from > to || to > len {
                return Err(PlayerError::InvalidRange { from, to, len });
            }
            if from == to {
                return Ok(());
            }
            let mut items = state.timeline.items().to_vec();
            items.drain(from..to);
            let remaining = items.len();
            let current = state.media_item_index;

            let removed_current = (from..to).contains(&current);
            let restart_at = if removed_current {
                let old = PositionInfo::new(current, position_ms);
                let index = from.min(remaining.saturating_sub(1));
                state.set_position(index, 0, now);
                events.push(PlayerEvent::PositionDiscontinuity {
                    old,
                    new: state.position_info(),
                    reason: DiscontinuityReason::Remove,
                });
                Some(0)
            } else {
                if current >= to {
                    state.media_item_index = current - (to - from);
                }
                None
            };

            let past_end = removed_current && from >= remaining;
            let command = if past_end {
                // removing the playing tail item ends playback
                let ended = state.playback_state != PlaybackState::Idle;
                state.timeline = Timeline::new(items);
                if state.shuffle_order.len() != remaining {
                    state.shuffle_order = ShuffleOrder::reversed(remaining);
                }
                events.push(PlayerEvent::TimelineChanged {
                    timeline: state.timeline.clone(),
                    reason: TimelineChangeReason::PlaylistChanged,
                });
                if ended {
                    state.set_playback_state(PlaybackState::Ended, events);
                }
                PlayerCommand::UpdatePlaylist {
                    timeline: state.timeline.clone(),
                    media_item_index: state.media_item_index,
                    position_ms: Some(0),
                    ended,
                }
            } else {
                state.replace_timeline(Timeline::new(items), restart_at, events)
            };
            if removed_current {
                let index = state.media_item_index;
                events.push(PlayerEvent::MediaItemTransition {
                    media_item: state.timeline.item(index).cloned(),
                    media_item_index: index,
                    reason: MediaItemTransitionReason::PlaylistChanged,
                });
            }
            self.send_command(state, command);
            Ok(())
        })
    }

    fn set_video_surface(&self, surface: Option<Surface>) {
        self.state.lock().surface = surface;
    }

    fn send_message(&self, message: PlayerMessage) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(PlayerError::Released);
        }
        self.send_command(&mut state, PlayerCommand::SendMessage(message));
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn PlayerListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(candidate, _)| *candidate != id);
        listeners.len() != before
    }

    fn release(&self) {
        {
            let mut state = self.state.lock();
            if state.released {
                return;
            }
            self.send_command(&mut state, PlayerCommand::Release);
            state.released = true;
            state.playback_state = PlaybackState::Idle;
        }
        self.listeners.lock().clear();
        self.app_handler.remove_all_callbacks();
        log::debug!("player released");
    }
}
