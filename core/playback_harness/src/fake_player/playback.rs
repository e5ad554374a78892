//! Playback loop state. Lives on the playback looper and is only touched from
//! there.

use std::mem;

use crate::{
    constants::DEFAULT_PLAYBACK_SPEED,
    error::PlaybackError,
    fake_player::{
        FakePlayerConfig,
        command::{PlayerCommand, PlayerCommandConsumer},
    },
    player::{
        DiscontinuityReason, MediaItemTransitionReason, PlaybackState, PlayerMessage,
        PositionInfo, RepeatMode, ShuffleOrder, Timeline,
    },
};

/// Milliseconds of media played in `elapsed_ms` of clock time.
pub(crate) fn scaled_ms(elapsed_ms: u64, speed: f32) -> u64 {
    (elapsed_ms as f64 * f64::from(speed)).round().max(0.0) as u64
}

struct PendingMessage {
    message: PlayerMessage,
    /// segment in which a kept message was last delivered
    delivered_in: Option<u64>,
}

/// What the playback loop reports back to the application side after a step.
#[derive(Debug, Clone)]
pub(crate) struct PlaybackUpdate {
    pub(crate) state: PlaybackState,
    pub(crate) is_loading: bool,
    pub(crate) media_item_index: usize,
    pub(crate) position_ms: u64,
    pub(crate) updated_at_ms: u64,
    pub(crate) error: Option<PlaybackError>,
    pub(crate) discontinuities: Vec<(PositionInfo, PositionInfo, DiscontinuityReason)>,
    pub(crate) transitions: Vec<(usize, MediaItemTransitionReason)>,
    /// commands consumed since the previous update
    pub(crate) acks: usize,
}

pub(crate) enum Step {
    /// nothing plays
    Idle,
    /// position stopped at a message that must be delivered before going on
    Deliver(PlayerMessage),
    Done,
}

pub(crate) struct PlaybackCore {
    commands: PlayerCommandConsumer,
    config: FakePlayerConfig,
    state: PlaybackState,
    play_when_ready: bool,
    is_loading: bool,
    timeline: Timeline,
    media_item_index: usize,
    position_ms: u64,
    repeat_mode: RepeatMode,
    shuffle: Option<ShuffleOrder>,
    speed: f32,
    buffering_until_ms: Option<u64>,
    last_step_ms: u64,
    /// media time left over after stopping at a message
    carry_ms: u64,
    segment_from_ms: u64,
    /// whether messages exactly at `segment_from_ms` are still due
    include_segment_start: bool,
    /// bumped every time playback jumps
    segment: u64,
    messages: Vec<PendingMessage>,
    new_error: Option<PlaybackError>,
    acks: usize,
    discontinuities: Vec<(PositionInfo, PositionInfo, DiscontinuityReason)>,
    transitions: Vec<(usize, MediaItemTransitionReason)>,
    released: bool,
    pub(crate) tick_scheduled: bool,
}

impl PlaybackCore {
    pub(crate) fn new(commands: PlayerCommandConsumer, config: FakePlayerConfig, now: u64) -> Self {
        Self {
            commands,
            config,
            state: PlaybackState::Idle,
            play_when_ready: false,
            is_loading: false,
            timeline: Timeline::empty(),
            media_item_index: 0,
            position_ms: 0,
            repeat_mode: RepeatMode::Off,
            shuffle: None,
            speed: DEFAULT_PLAYBACK_SPEED,
            buffering_until_ms: None,
            last_step_ms: now,
            carry_ms: 0,
            segment_from_ms: 0,
            include_segment_start: true,
            segment: 0,
            messages: Vec::new(),
            new_error: None,
            acks: 0,
            discontinuities: Vec::new(),
            transitions: Vec::new(),
            released: false,
            tick_scheduled: false,
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.state
    }

    /// Applies every queued command. Returns messages without a position,
    /// which are due right away.
    pub(crate) fn drain_commands(&mut self, now: u64) -> Vec<PlayerMessage> {
        let mut immediate = Vec::new();
        while let Ok(command) = self.commands.pop() {
            self.acks += 1;
            log::trace!("playback: {}", command.name());
            self.apply(command, now, &mut immediate);
        }
        immediate
    }

    fn apply(&mut self, command: PlayerCommand, now: u64, immediate: &mut Vec<PlayerMessage>) {
        match command {
            PlayerCommand::Prepare => {
                if self.state != PlaybackState::Idle {
                    return;
                }
                if self.timeline.is_empty() {
                    self.state = PlaybackState::Ended;
                } else {
                    self.start_segment();
                    self.start_buffering(now, self.config.prepare_duration_ms);
                }
            }
            PlayerCommand::SetPlayWhenReady(play_when_ready) => {
                self.play_when_ready = play_when_ready;
                self.carry_ms = 0;
            }
            PlayerCommand::Seek {
                media_item_index,
                position_ms,
            } => {
                self.media_item_index = media_item_index;
                self.position_ms = position_ms;
                self.start_segment();
                if self.state != PlaybackState::Idle && !self.timeline.is_empty() {
                    self.start_buffering(now, self.config.seek_buffering_ms);
                }
            }
            PlayerCommand::Stop => {
                self.state = PlaybackState::Idle;
                self.is_loading = false;
                self.buffering_until_ms = None;
            }
            PlayerCommand::SetRepeatMode(repeat_mode) => self.repeat_mode = repeat_mode,
            PlayerCommand::SetShuffleOrder(shuffle) => self.shuffle = shuffle,
            PlayerCommand::SetPlaybackSpeed(speed) => self.speed = speed,
            PlayerCommand::UpdatePlaylist {
                timeline,
                media_item_index,
                position_ms,
                ended,
            } => {
                self.timeline = timeline;
                self.media_item_index = media_item_index;
                if let Some(position_ms) = position_ms {
                    self.position_ms = position_ms;
                    self.start_segment();
                }
                if self.state != PlaybackState::Idle {
                    if ended {
                        self.state = PlaybackState::Ended;
                        self.is_loading = false;
                        self.buffering_until_ms = None;
                    } else if position_ms.is_some() {
                        self.start_buffering(now, self.config.seek_buffering_ms);
                    }
                }
            }
            PlayerCommand::SendMessage(message) => {
                if message.position().is_some() {
                    self.messages.push(PendingMessage {
                        message,
                        delivered_in: None,
                    });
                } else {
                    immediate.push(message);
                }
            }
            PlayerCommand::Release => {
                self.released = true;
                self.state = PlaybackState::Idle;
                self.messages.clear();
            }
        }
    }

    fn start_buffering(&mut self, now: u64, duration_ms: u64) {
        self.state = PlaybackState::Buffering;
        self.is_loading = true;
        self.buffering_until_ms = Some(now.saturating_add(duration_ms));
    }

    fn start_segment(&mut self) {
        self.segment_from_ms = self.position_ms;
        self.include_segment_start = true;
        self.segment += 1;
        self.carry_ms = 0;
    }

    /// Moves playback forward to `now`.
    ///
    /// Stops early at the first due message so it can be delivered before
    /// anything past its position happens. Call again after delivery.
    pub(crate) fn step(&mut self, now: u64) -> Step {
        let elapsed_ms = now.saturating_sub(self.last_step_ms);
        self.last_step_ms = now;
        let playing = self.state == PlaybackState::Ready && self.play_when_ready;

        if self.state == PlaybackState::Buffering
            && self.buffering_until_ms.is_some_and(|until| now >= until)
        {
            self.state = PlaybackState::Ready;
            self.is_loading = false;
            self.buffering_until_ms = None;
            log::debug!(
                "playback ready at {}:{}",
                self.media_item_index,
                self.position_ms
            );
        }
        if !matches!(self.state, PlaybackState::Buffering | PlaybackState::Ready) {
            return Step::Idle;
        }
        let Some(duration_ms) = self.timeline.duration_ms(self.media_item_index) else {
            return Step::Idle;
        };

        let target_ms = if playing {
            (self.position_ms + self.carry_ms + scaled_ms(elapsed_ms, self.speed)).min(duration_ms)
        } else {
            self.position_ms
        };
        self.carry_ms = 0;
        if let Some(message) = self.take_due_message(target_ms) {
            return Step::Deliver(message);
        }

        self.position_ms = target_ms;
        self.segment_from_ms = target_ms;
        self.include_segment_start = false;
        if playing && target_ms >= duration_ms {
            self.finish_item(duration_ms);
        }
        Step::Done
    }

    fn take_due_message(&mut self, target_ms: u64) -> Option<PlayerMessage> {
        let index = self.media_item_index;
        let from = self.segment_from_ms;
        let include_from = self.include_segment_start;
        let segment = self.segment;

        let (slot, position_ms) = self
            .messages
            .iter()
            .enumerate()
            .filter_map(|(slot, pending)| {
                let position = pending.message.position()?;
                let due = position.media_item_index == index
                    && pending.delivered_in != Some(segment)
                    && position.position_ms <= target_ms
                    && (position.position_ms > from
                        || (include_from && position.position_ms == from));
                due.then_some((slot, position.position_ms))
            })
            .min_by_key(|&(slot, position_ms)| (position_ms, slot))?;

        self.carry_ms = target_ms - position_ms;
        self.position_ms = position_ms;
        self.segment_from_ms = position_ms;
        // other messages at the same position are still due
        self.include_segment_start = true;

        if self.messages[slot].message.deletes_after_delivery() {
            Some(self.messages.remove(slot).message)
        } else {
            let pending = &mut self.messages[slot];
            pending.delivered_in = Some(segment);
            Some(pending.message.clone())
        }
    }

    fn finish_item(&mut self, duration_ms: u64) {
        let index = self.media_item_index;
        match self
            .timeline
            .next_index(index, self.repeat_mode, self.shuffle.as_ref())
        {
            Some(next) => {
                let reason = if next == index {
                    MediaItemTransitionReason::Repeat
                } else {
                    MediaItemTransitionReason::Auto
                };
                self.discontinuities.push((
                    PositionInfo::new(index, duration_ms),
                    PositionInfo::new(next, 0),
                    DiscontinuityReason::AutoTransition,
                ));
                self.transitions.push((next, reason));
                self.media_item_index = next;
                self.position_ms = 0;
                self.start_segment();
                log::debug!("auto transition {index} -> {next} ({reason:?})");
            }
            None => {
                self.state = PlaybackState::Ended;
                self.is_loading = false;
                log::debug!("playback ended on item {index}");
            }
        }
    }

    pub(crate) fn fail(&mut self, error: PlaybackError) {
        log::error!("playback failed: {error}");
        self.state = PlaybackState::Idle;
        self.is_loading = false;
        self.buffering_until_ms = None;
        self.new_error = Some(error);
    }

    /// Clock time until the next step is needed, if any.
    pub(crate) fn next_tick_delay_ms(&self, now: u64) -> Option<u64> {
        if self.released {
            return None;
        }
        let interval = self.config.work_interval_ms.max(1);
        match self.state {
            PlaybackState::Buffering => Some(
                self.buffering_until_ms
                    .map_or(interval, |until| until.saturating_sub(now).clamp(1, interval)),
            ),
            PlaybackState::Ready if self.play_when_ready => Some(interval),
            _ => None,
        }
    }

    pub(crate) fn take_update(&mut self) -> PlaybackUpdate {
        PlaybackUpdate {
            state: self.state,
            is_loading: self.is_loading,
            media_item_index: self.media_item_index,
            position_ms: self.position_ms,
            updated_at_ms: self.last_step_ms,
            error: self.new_error.take(),
            discontinuities: mem::take(&mut self.discontinuities),
            transitions: mem::take(&mut self.transitions),
            acks: mem::take(&mut self.acks),
        }
    }
}

#[cfg(test)]
mod tests {
    use rtrb::{Producer, RingBuffer};

    use super::*;
    use crate::player::{MediaItem, MessageSignal};

    fn create_core_with_channel() -> (PlaybackCore, Producer<PlayerCommand>) {
        let (producer, consumer) = RingBuffer::new(32);
        let core = PlaybackCore::new(consumer, FakePlayerConfig::default(), 0);
        (core, producer)
    }

    fn prepared(items: usize, duration_ms: u64) -> (PlaybackCore, Producer<PlayerCommand>) {
        let (mut core, mut producer) = create_core_with_channel();
        let timeline = Timeline::new(MediaItem::many(items, duration_ms));
        for command in [
            PlayerCommand::UpdatePlaylist {
                timeline,
                media_item_index: 0,
                position_ms: Some(0),
                ended: false,
            },
            PlayerCommand::Prepare,
            PlayerCommand::SetPlayWhenReady(true),
        ] {
            assert!(producer.push(command).is_ok());
        }
        assert!(core.drain_commands(0).is_empty());
        assert!(matches!(core.step(0), Step::Done));
        (core, producer)
    }

    fn at_position(signal: &std::sync::Arc<MessageSignal>, index: usize, position: u64) -> PlayerCommand {
        PlayerCommand::SendMessage(
            PlayerMessage::new(signal.clone()).at_position(index, position),
        )
    }

    #[test]
    fn test_scaled_ms_applies_speed() {
        assert_eq!(scaled_ms(100, 1.0), 100);
        assert_eq!(scaled_ms(100, 2.0), 200);
        assert_eq!(scaled_ms(100, 0.5), 50);
    }

    #[test]
    fn test_prepare_without_items_ends() {
        let (mut core, mut producer) = create_core_with_channel();
        assert!(producer.push(PlayerCommand::Prepare).is_ok());
        core.drain_commands(0);

        assert_eq!(core.state(), PlaybackState::Ended);
        assert!(matches!(core.step(0), Step::Idle));
        assert_eq!(core.take_update().acks, 1);
    }

    #[test]
    fn test_prepare_buffers_for_configured_duration() {
        let (mut producer, consumer) = RingBuffer::new(4);
        let config = FakePlayerConfig::default().with_prepare_duration_ms(30);
        let mut core = PlaybackCore::new(consumer, config, 0);
        assert!(
            producer
                .push(PlayerCommand::UpdatePlaylist {
                    timeline: Timeline::new(MediaItem::many(1, 1_000)),
                    media_item_index: 0,
                    position_ms: Some(0),
                    ended: false,
                })
                .is_ok()
        );
        assert!(producer.push(PlayerCommand::Prepare).is_ok());
        core.drain_commands(0);

        core.step(10);
        assert_eq!(core.state(), PlaybackState::Buffering);
        assert_eq!(core.next_tick_delay_ms(10), Some(10));
        core.step(30);
        let update = core.take_update();
        assert_eq!(update.state, PlaybackState::Ready);
        assert!(!update.is_loading);
        assert_eq!(update.position_ms, 0);
    }

    #[test]
    fn test_position_advances_with_speed() {
        let (mut core, mut producer) = prepared(1, 1_000);
        core.step(100);
        assert_eq!(core.take_update().position_ms, 100);

        assert!(producer.push(PlayerCommand::SetPlaybackSpeed(2.0)).is_ok());
        core.drain_commands(100);
        core.step(150);
        assert_eq!(core.take_update().position_ms, 200);
    }

    #[test]
    fn test_end_of_item_transitions_then_ends() {
        let (mut core, _producer) = prepared(2, 100);
        core.step(100);
        let update = core.take_update();
        assert_eq!(update.media_item_index, 1);
        assert_eq!(update.position_ms, 0);
        assert_eq!(
            update.discontinuities,
            vec![(
                PositionInfo::new(0, 100),
                PositionInfo::new(1, 0),
                DiscontinuityReason::AutoTransition
            )]
        );
        assert_eq!(update.transitions, vec![(1, MediaItemTransitionReason::Auto)]);

        core.step(250);
        let update = core.take_update();
        assert_eq!(update.state, PlaybackState::Ended);
        assert_eq!(update.position_ms, 100);
        assert_eq!(core.next_tick_delay_ms(250), None);
    }

    #[test]
    fn test_repeat_one_reports_repeat_transition() {
        let (mut core, mut producer) = prepared(2, 100);
        assert!(producer.push(PlayerCommand::SetRepeatMode(RepeatMode::One)).is_ok());
        core.drain_commands(0);

        core.step(100);
        let update = core.take_update();
        assert_eq!(update.media_item_index, 0);
        assert_eq!(update.transitions, vec![(0, MediaItemTransitionReason::Repeat)]);
    }

    #[test]
    fn test_shuffle_order_picks_next_item() {
        let (mut core, mut producer) = prepared(3, 100);
        let order = ShuffleOrder::new(vec![0, 2, 1]).unwrap();
        assert!(producer.push(PlayerCommand::SetShuffleOrder(Some(order))).is_ok());
        core.drain_commands(0);

        core.step(100);
        assert_eq!(core.take_update().media_item_index, 2);
    }

    #[test]
    fn test_step_stops_at_message_position() {
        let (mut core, mut producer) = prepared(1, 1_000);
        let signal = MessageSignal::new();
        assert!(producer.push(at_position(&signal, 0, 40)).is_ok());
        assert!(producer.push(at_position(&signal, 0, 40)).is_ok());
        core.drain_commands(0);

        assert!(matches!(core.step(100), Step::Deliver(_)));
        assert_eq!(core.take_update().position_ms, 40);
        assert!(matches!(core.step(100), Step::Deliver(_)));
        assert!(matches!(core.step(100), Step::Done));
        assert_eq!(core.take_update().position_ms, 100);
    }

    #[test]
    fn test_message_at_segment_start_is_delivered_while_paused() {
        let (mut core, mut producer) = prepared(2, 1_000);
        let signal = MessageSignal::new();
        assert!(producer.push(PlayerCommand::SetPlayWhenReady(false)).is_ok());
        assert!(
            producer
                .push(PlayerCommand::Seek {
                    media_item_index: 1,
                    position_ms: 0,
                })
                .is_ok()
        );
        assert!(producer.push(at_position(&signal, 1, 0)).is_ok());
        core.drain_commands(0);

        assert!(matches!(core.step(0), Step::Deliver(_)));
        assert!(matches!(core.step(0), Step::Done));
        assert!(matches!(core.step(10), Step::Done));
    }

    #[test]
    fn test_kept_message_is_redelivered_after_seeking_back() {
        let (mut core, mut producer) = prepared(1, 1_000);
        let signal = MessageSignal::new();
        let message = PlayerMessage::new(signal)
            .at_position(0, 50)
            .delete_after_delivery(false);
        assert!(producer.push(PlayerCommand::SendMessage(message)).is_ok());
        core.drain_commands(0);

        assert!(matches!(core.step(100), Step::Deliver(_)));
        assert!(matches!(core.step(100), Step::Done));
        assert!(
            producer
                .push(PlayerCommand::Seek {
                    media_item_index: 0,
                    position_ms: 0,
                })
                .is_ok()
        );
        core.drain_commands(100);
        core.step(100);
        assert!(matches!(core.step(200), Step::Deliver(_)));
    }

    #[test]
    fn test_failure_goes_idle_and_reports_once() {
        let (mut core, _producer) = prepared(1, 1_000);
        core.fail(PlaybackError::new("boom"));

        assert!(matches!(core.step(10), Step::Idle));
        assert_eq!(core.take_update().error, Some(PlaybackError::new("boom")));
        assert_eq!(core.take_update().error, None);
        assert_eq!(core.next_tick_delay_ms(10), None);
    }
}
