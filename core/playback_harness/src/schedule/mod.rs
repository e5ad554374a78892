//! Scripted sequences of player operations.
//!
//! A schedule is an immutable arena of [`ActionNode`]s built by
//! [`ActionScheduleBuilder`]. Every call to [`ActionSchedule::start`] creates an
//! independent run that walks the chain on the context's looper: each node
//! waits for its delay, runs its action, and hands over to its successor once
//! the action is done (right away, or when a deferred condition is observed).

use std::{fmt, sync::Arc};

use transport::handler::Handler;

use crate::{
    error::{PlaybackError, ScheduleError},
    player::{
        DiscontinuityReason, MediaItem, MessageSignal, PlaybackState, Player, PlayerMessage,
        RepeatMode, ShuffleOrder, StartPosition, Surface, Timeline, TimelineChangeReason,
    },
    track_selector::TrackSelector,
};

pub mod action;
pub mod gate;
pub mod node;
mod run;
mod wait;

pub use action::{Action, ActionKind, Runnable};
pub use node::{ActionNode, NodeState};
pub use run::{FinishedCallback, Next, ScheduleHandle};

/// Everything an action may act on.
#[derive(Clone)]
pub struct ActionContext {
    player: Arc<dyn Player>,
    track_selector: Option<Arc<dyn TrackSelector>>,
    surface: Option<Surface>,
    handler: Handler,
}

impl ActionContext {
    pub fn new(player: Arc<dyn Player>, handler: Handler) -> Self {
        Self {
            player,
            track_selector: None,
            surface: None,
            handler,
        }
    }

    pub fn with_track_selector(mut self, track_selector: Arc<dyn TrackSelector>) -> Self {
        self.track_selector = Some(track_selector);
        self
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn player(&self) -> &Arc<dyn Player> {
        &self.player
    }

    pub fn track_selector(&self) -> Option<&Arc<dyn TrackSelector>> {
        self.track_selector.as_ref()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("has_track_selector", &self.track_selector.is_some())
            .field("surface", &self.surface)
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

/// An immutable chain of actions that can be started any number of times.
#[derive(Debug, Clone)]
pub struct ActionSchedule {
    tag: String,
    nodes: Arc<[ActionNode]>,
}

impl ActionSchedule {
    pub fn builder(tag: impl Into<String>) -> ActionScheduleBuilder {
        ActionScheduleBuilder::new(tag)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// All nodes, root first and completion node last.
    pub fn nodes(&self) -> &[ActionNode] {
        &self.nodes
    }

    /// Starts a run on the context's looper. The root runs inline when called
    /// on that looper.
    ///
    /// The run posts through its own handler so cancelling it never drops
    /// tasks that others posted through `context.handler`.
    pub fn start(
        &self,
        context: ActionContext,
        on_finished: Option<FinishedCallback>,
    ) -> ScheduleHandle {
        let handler = Handler::new(
            context.handler.looper().clone(),
            Arc::clone(context.handler.clock()),
        );
        let context = ActionContext { handler, ..context };
        run::ScheduleRun::start(
            self.tag.clone(),
            Arc::clone(&self.nodes),
            context,
            on_finished,
        )
    }
}

/// Fluent builder for [`ActionSchedule`].
///
/// `delay` adds up until the next appended action takes it over.
#[derive(Debug)]
pub struct ActionScheduleBuilder {
    tag: String,
    /// `(action, delay_ms, repeat_interval_ms)` in chain order
    steps: Vec<(Action, u64, Option<u64>)>,
    current_delay_ms: u64,
}

impl ActionScheduleBuilder {
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            steps: vec![(Action::new(tag.clone(), ActionKind::Root), 0, None)],
            tag,
            current_delay_ms: 0,
        }
    }

    pub fn delay(mut self, delay_ms: u64) -> Self {
        self.current_delay_ms = self.current_delay_ms.saturating_add(delay_ms);
        self
    }

    pub fn apply(self, action: Action) -> Self {
        self.append(action, None)
    }

    /// Appends `action` and, after its first run, repeats it every
    /// `interval_ms` outside the chain.
    pub fn repeat(self, action: Action, interval_ms: u64) -> Self {
        self.append(action, Some(interval_ms))
    }

    fn append(mut self, action: Action, repeat_interval_ms: Option<u64>) -> Self {
        let delay_ms = std::mem::take(&mut self.current_delay_ms);
        self.steps.push((action, delay_ms, repeat_interval_ms));
        self
    }

    fn kind(self, kind: ActionKind) -> Self {
        let action = Action::new(self.tag.clone(), kind);
        self.apply(action)
    }

    pub fn seek(self, position_ms: u64) -> Self {
        self.kind(ActionKind::Seek {
            media_item_index: None,
            position_ms,
            catch_illegal_seek: false,
        })
    }

    pub fn seek_to(self, media_item_index: usize, position_ms: u64) -> Self {
        self.kind(ActionKind::Seek {
            media_item_index: Some(media_item_index),
            position_ms,
            catch_illegal_seek: false,
        })
    }

    /// Seek that logs and ignores an illegal seek position.
    pub fn seek_to_catching(self, media_item_index: usize, position_ms: u64) -> Self {
        self.kind(ActionKind::Seek {
            media_item_index: Some(media_item_index),
            position_ms,
            catch_illegal_seek: true,
        })
    }

    /// Seeks and waits until the player is ready again.
    pub fn seek_and_wait(self, position_ms: u64) -> Self {
        self.seek(position_ms)
            .wait_for_playback_state(PlaybackState::Ready)
    }

    pub fn stop(self) -> Self {
        self.kind(ActionKind::Stop)
    }

    pub fn play(self) -> Self {
        self.kind(ActionKind::SetPlayWhenReady(true))
    }

    pub fn pause(self) -> Self {
        self.kind(ActionKind::SetPlayWhenReady(false))
    }

    pub fn disable_renderer(self, renderer_index: usize) -> Self {
        self.kind(ActionKind::SetRendererDisabled {
            renderer_index,
            disabled: true,
        })
    }

    pub fn enable_renderer(self, renderer_index: usize) -> Self {
        self.kind(ActionKind::SetRendererDisabled {
            renderer_index,
            disabled: false,
        })
    }

    pub fn set_video_surface(self) -> Self {
        self.kind(ActionKind::SetVideoSurface)
    }

    pub fn clear_video_surface(self) -> Self {
        self.kind(ActionKind::ClearVideoSurface)
    }

    pub fn prepare(self) -> Self {
        self.kind(ActionKind::Prepare)
    }

    pub fn set_media_items(self, items: Vec<MediaItem>, start: StartPosition) -> Self {
        self.kind(ActionKind::SetMediaItems { items, start })
    }

    pub fn add_media_items(self, items: Vec<MediaItem>) -> Self {
        self.kind(ActionKind::AddMediaItems { index: None, items })
    }

    pub fn insert_media_items(self, index: usize, items: Vec<MediaItem>) -> Self {
        self.kind(ActionKind::AddMediaItems {
            index: Some(index),
            items,
        })
    }

    pub fn move_media_item(self, current_index: usize, new_index: usize) -> Self {
        self.kind(ActionKind::MoveMediaItem {
            current_index,
            new_index,
        })
    }

    pub fn remove_media_item(self, index: usize) -> Self {
        self.remove_media_items(index, index.saturating_add(1))
    }

    pub fn remove_media_items(self, from: usize, to: usize) -> Self {
        self.kind(ActionKind::RemoveMediaItems { from, to })
    }

    pub fn clear_media_items(self) -> Self {
        self.kind(ActionKind::ClearMediaItems)
    }

    pub fn set_repeat_mode(self, repeat_mode: RepeatMode) -> Self {
        self.kind(ActionKind::SetRepeatMode(repeat_mode))
    }

    pub fn set_shuffle_mode_enabled(self, enabled: bool) -> Self {
        self.kind(ActionKind::SetShuffleModeEnabled(enabled))
    }

    pub fn set_shuffle_order(self, order: ShuffleOrder) -> Self {
        self.kind(ActionKind::SetShuffleOrder(order))
    }

    pub fn set_playback_speed(self, speed: f32) -> Self {
        self.kind(ActionKind::SetPlaybackSpeed(speed))
    }

    pub fn send_message(self, message: PlayerMessage) -> Self {
        self.kind(ActionKind::SendMessage(message))
    }

    pub fn throw_playback_error(self, error: PlaybackError) -> Self {
        self.kind(ActionKind::ThrowPlaybackError(error))
    }

    pub fn execute_runnable<F>(self, runnable: F) -> Self
    where
        F: Fn(&ActionContext) + Send + Sync + 'static,
    {
        self.kind(ActionKind::ExecuteRunnable(Arc::new(runnable)))
    }

    pub fn wait_for_playback_state(self, state: PlaybackState) -> Self {
        self.kind(ActionKind::WaitForPlaybackState(state))
    }

    pub fn wait_for_play_when_ready(self, play_when_ready: bool) -> Self {
        self.kind(ActionKind::WaitForPlayWhenReady(play_when_ready))
    }

    pub fn wait_for_is_loading(self, is_loading: bool) -> Self {
        self.kind(ActionKind::WaitForIsLoading(is_loading))
    }

    /// Waits until the timeline differs from the one current when this step runs.
    pub fn wait_for_timeline_changed(self) -> Self {
        self.kind(ActionKind::WaitForTimelineChanged {
            expected: None,
            reason: None,
        })
    }

    pub fn wait_for_timeline(
        self,
        expected: Timeline,
        reason: Option<TimelineChangeReason>,
    ) -> Self {
        self.kind(ActionKind::WaitForTimelineChanged {
            expected: Some(expected),
            reason,
        })
    }

    pub fn wait_for_position_discontinuity(self) -> Self {
        self.kind(ActionKind::WaitForPositionDiscontinuity(None))
    }

    pub fn wait_for_position_discontinuity_reason(self, reason: DiscontinuityReason) -> Self {
        self.kind(ActionKind::WaitForPositionDiscontinuity(Some(reason)))
    }

    pub fn wait_for_message(self, signal: Arc<MessageSignal>) -> Self {
        self.kind(ActionKind::WaitForMessage(signal))
    }

    pub fn wait_for_pending_player_commands(self) -> Self {
        self.kind(ActionKind::WaitForPendingPlayerCommands)
    }

    pub fn play_until_position(self, media_item_index: usize, position_ms: u64) -> Self {
        self.kind(ActionKind::PlayUntilPosition {
            media_item_index,
            position_ms,
        })
    }

    pub fn play_until_start_of_media_item(self, media_item_index: usize) -> Self {
        let action = Action::new(
            self.tag.clone(),
            ActionKind::PlayUntilPosition {
                media_item_index,
                position_ms: 0,
            },
        )
        .with_description(format!("PlayUntilStartOfMediaItem:{media_item_index}"));
        self.apply(action)
    }

    /// Appends the completion node and links the chain.
    pub fn build(self) -> Result<ActionSchedule, ScheduleError> {
        if let Some((action, ..)) = self
            .steps
            .iter()
            .find(|(_, _, repeat)| *repeat == Some(0))
        {
            return Err(ScheduleError::ZeroRepeatInterval {
                description: action.description(),
            });
        }

        let Self {
            tag,
            mut steps,
            current_delay_ms,
        } = self;
        steps.push((
            Action::new(tag.clone(), ActionKind::Finish),
            current_delay_ms,
            None,
        ));

        let len = steps.len();
        let nodes: Arc<[ActionNode]> = steps
            .into_iter()
            .enumerate()
            .map(|(index, (action, delay_ms, repeat_interval_ms))| ActionNode {
                action,
                delay_ms,
                repeat_interval_ms,
                next: (index + 1 < len).then_some(index + 1),
            })
            .collect();
        Ok(ActionSchedule { tag, nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ActionError, PlayerError},
        player::{MessageTarget, PlayerEvent, PositionInfo, stub::StubPlayer},
        track_selector::FakeTrackSelector,
    };
    use parking_lot::Mutex;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::{Duration, Instant},
    };
    use transport::{
        clock::FakeClock,
        looper::{Looper, PendingTaskRunner},
    };

    type Log = Arc<Mutex<Vec<(&'static str, u64)>>>;

    fn setup() -> (Arc<FakeClock>, Arc<StubPlayer>, ActionContext) {
        crate::init_test_logging();
        let clock = Arc::new(FakeClock::new(0));
        let handler = Handler::for_current_thread("app", clock.clone());
        let player = StubPlayer::new(handler.looper().clone(), clock.clone());
        let context = ActionContext::new(player.clone(), handler);
        (clock, player, context)
    }

    fn stamp(log: &Log, label: &'static str) -> impl Fn(&ActionContext) + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |context| {
            let now = context.player().clock().elapsed_since_boot_ms();
            log.lock().push((label, now));
        }
    }

    fn counter(count: &Arc<AtomicUsize>) -> Action {
        let count = Arc::clone(count);
        Action::new(
            "test",
            ActionKind::ExecuteRunnable(Arc::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })),
        )
    }

    #[test]
    fn test_builder_hands_accumulated_delay_to_next_action() {
        let schedule = ActionSchedule::builder("test")
            .delay(30)
            .delay(20)
            .play()
            .pause()
            .delay(70)
            .build()
            .unwrap();

        let nodes = schedule.nodes();
        assert_eq!(nodes.len(), 4);
        assert!(matches!(nodes[0].action().kind(), ActionKind::Root));
        assert_eq!(nodes[1].delay_ms(), 50);
        assert_eq!(nodes[2].delay_ms(), 0);
        assert!(matches!(nodes[3].action().kind(), ActionKind::Finish));
        assert_eq!(nodes[3].delay_ms(), 70);
        let links: Vec<_> = nodes.iter().map(ActionNode::next).collect();
        assert_eq!(links, vec![Some(1), Some(2), Some(3), None]);
    }

    #[test]
    fn test_convenience_methods_expand_to_their_actions() {
        let (_clock, player, context) = setup();
        player.set_timeline(Timeline::new(MediaItem::many(3, 1_000)));
        player.set_playback_state(PlaybackState::Ready);
        let schedule = ActionSchedule::builder("test")
            .seek_and_wait(300)
            .insert_media_items(1, MediaItem::many(2, 500))
            .remove_media_item(usize::MAX)
            .delay(u64::MAX)
            .delay(1)
            .play_until_start_of_media_item(2)
            .build()
            .unwrap();

        let descriptions: Vec<_> = schedule
            .nodes()
            .iter()
            .map(|node| node.action().description())
            .collect();
        assert_eq!(descriptions[2], "WaitForPlaybackState:Ready");
        assert_eq!(descriptions[5], "PlayUntilStartOfMediaItem:2");
        assert_eq!(schedule.nodes()[5].delay_ms(), u64::MAX);
        assert!(matches!(
            schedule.nodes()[4].action().kind(),
            ActionKind::RemoveMediaItems {
                from: usize::MAX,
                to: usize::MAX
            }
        ));

        let handle = schedule.start(context, None);

        assert_eq!(handle.result(), None);
        assert_eq!(
            player.calls(),
            vec![
                "seek_to(0, 300)",
                "add_media_items(Some(1), 2)",
                "remove_media_items(18446744073709551615, 18446744073709551615)",
            ]
        );
    }

    #[test]
    fn test_wait_until_finished_times_out_then_sees_completion() {
        crate::init_test_logging();
        let clock = Arc::new(FakeClock::new(0));
        let thread = Looper::spawn("schedule").unwrap();
        let handler = Handler::new(thread.looper().clone(), clock.clone());
        let player = StubPlayer::new(thread.looper().clone(), clock.clone());
        let schedule = ActionSchedule::builder("test").delay(50).play().build().unwrap();

        let handle = schedule.start(ActionContext::new(player.clone(), handler), None);
        let deadline = Instant::now() + Duration::from_secs(5);
        while clock.pending_count() == 0 && Instant::now() < deadline {
            thread::yield_now();
        }

        assert_eq!(handle.wait_until_finished(Duration::from_millis(10)), None);
        assert!(player.calls().is_empty());

        clock.advance_time(50);

        assert_eq!(
            handle.wait_until_finished(Duration::from_secs(5)),
            Some(Ok(()))
        );
        assert_eq!(player.calls(), vec!["set_play_when_ready(true)"]);
        thread.quit_and_join();
    }

    #[test]
    fn test_zero_repeat_interval_is_rejected() {
        let result = ActionSchedule::builder("test")
            .repeat(Action::new("test", ActionKind::Stop), 0)
            .build();

        assert!(matches!(
            result,
            Err(ScheduleError::ZeroRepeatInterval { ref description }) if description == "Stop"
        ));
    }

    #[test]
    fn test_chain_waits_for_delay_then_runs_zero_delay_successor() {
        let (clock, _player, context) = setup();
        let log = Log::default();
        let schedule = ActionSchedule::builder("test")
            .execute_runnable(stamp(&log, "A"))
            .delay(100)
            .execute_runnable(stamp(&log, "B"))
            .execute_runnable(stamp(&log, "C"))
            .build()
            .unwrap();

        let handle = schedule.start(context, None);
        assert_eq!(*log.lock(), vec![("A", 0)]);
        assert!(!handle.is_finished());

        clock.advance_time(99);
        assert_eq!(log.lock().len(), 1);

        clock.advance_time(1);
        assert_eq!(*log.lock(), vec![("A", 0), ("B", 100), ("C", 100)]);
        assert!(handle.is_finished());
        assert_eq!(handle.result(), Some(Ok(())));
        assert!(
            handle
                .node_states()
                .iter()
                .all(|state| *state == NodeState::Completed)
        );
    }

    #[test]
    fn test_wait_for_state_that_already_holds_adds_no_listener() {
        let (_clock, player, context) = setup();
        player.set_playback_state(PlaybackState::Ready);
        let log = Log::default();
        let schedule = ActionSchedule::builder("test")
            .wait_for_playback_state(PlaybackState::Ready)
            .execute_runnable(stamp(&log, "after"))
            .build()
            .unwrap();

        let handle = schedule.start(context, None);

        assert_eq!(*log.lock(), vec![("after", 0)]);
        assert_eq!(player.listeners_added(), 0);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_wait_for_state_continues_once_on_matching_event() {
        let (_clock, player, context) = setup();
        player.set_playback_state(PlaybackState::Buffering);
        let log = Log::default();
        let schedule = ActionSchedule::builder("test")
            .wait_for_playback_state(PlaybackState::Ready)
            .execute_runnable(stamp(&log, "after"))
            .build()
            .unwrap();

        let handle = schedule.start(context, None);
        assert!(log.lock().is_empty());
        assert_eq!(player.listener_count(), 1);
        assert_eq!(handle.node_states()[1], NodeState::Running);

        player.set_playback_state(PlaybackState::Ended);
        assert!(log.lock().is_empty());

        player.set_playback_state(PlaybackState::Ready);
        player.set_playback_state(PlaybackState::Ready);
        assert_eq!(*log.lock(), vec![("after", 0)]);
        assert_eq!(player.listener_count(), 0);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_other_state_waits_check_before_listening() {
        let (_clock, player, context) = setup();
        player.set_is_loading(true);
        let log = Log::default();
        let schedule = ActionSchedule::builder("test")
            .wait_for_play_when_ready(false)
            .wait_for_is_loading(true)
            .wait_for_is_loading(false)
            .execute_runnable(stamp(&log, "after"))
            .build()
            .unwrap();

        schedule.start(context, None);
        assert!(log.lock().is_empty());
        assert_eq!(player.listeners_added(), 1);

        player.set_is_loading(false);
        assert_eq!(*log.lock(), vec![("after", 0)]);
    }

    #[test]
    fn test_repeat_runs_every_interval_without_rerunning_the_chain() {
        let (clock, _player, context) = setup();
        let looper = context.handler().looper().clone();
        let count = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let schedule = ActionSchedule::builder("test")
            .repeat(counter(&count), 50)
            .build()
            .unwrap();

        let finished_count = Arc::clone(&finished);
        let handle = schedule.start(
            context,
            Some(Box::new(move || {
                finished_count.fetch_add(1, Ordering::SeqCst);
            })),
        );
        for _ in 0..22 {
            clock.advance_time(10);
        }
        looper.run_until_idle();

        // t=0, then 50, 100, 150 and 200
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
        assert_eq!(clock.next_pending_time_ms(), Some(250));
    }

    #[test]
    fn test_cancel_stops_repeats_and_pending_nodes() {
        let (clock, player, context) = setup();
        let count = Arc::new(AtomicUsize::new(0));
        let schedule = ActionSchedule::builder("test")
            .repeat(counter(&count), 50)
            .delay(1_000)
            .play()
            .build()
            .unwrap();

        let handle = schedule.start(context, None);
        clock.advance_time(120);
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.cancel();
        clock.advance_time(2_000);

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(handle.error(), Some(ScheduleError::Cancelled));
        assert!(!handle.is_finished());
        assert!(player.calls().is_empty());
        assert_eq!(clock.pending_count(), 0);
    }

    #[test]
    fn test_finished_callback_is_posted_not_run_inline() {
        let (_clock, _player, context) = setup();
        let looper = context.handler().looper().clone();
        let finished = Arc::new(AtomicUsize::new(0));
        let schedule = ActionSchedule::builder("test").play().build().unwrap();

        let finished_count = Arc::clone(&finished);
        let handle = schedule.start(
            context,
            Some(Box::new(move || {
                finished_count.fetch_add(1, Ordering::SeqCst);
            })),
        );

        assert!(handle.is_finished());
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        looper.run_until_idle();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_player_error_fails_the_run_and_stops_the_chain() {
        let (_clock, player, context) = setup();
        player.set_timeline(Timeline::new(MediaItem::many(2, 1_000)));
        let schedule = ActionSchedule::builder("test")
            .seek_to(5, 0)
            .play()
            .build()
            .unwrap();

        let handle = schedule.start(context, None);

        assert!(matches!(
            handle.error(),
            Some(ScheduleError::Action {
                source: ActionError::Player(PlayerError::IllegalSeekPosition {
                    media_item_index: 5,
                    position_ms: 0,
                }),
                ..
            })
        ));
        assert_eq!(
            handle.node_states(),
            vec![
                NodeState::Completed,
                NodeState::Failed,
                NodeState::Pending,
                NodeState::Pending
            ]
        );
        assert_eq!(player.calls(), vec!["seek_to(5, 0)"]);
    }

    #[test]
    fn test_catching_seek_ignores_illegal_position() {
        let (_clock, player, context) = setup();
        player.set_timeline(Timeline::new(MediaItem::many(2, 1_000)));
        let schedule = ActionSchedule::builder("test")
            .seek_to_catching(5, 0)
            .play()
            .build()
            .unwrap();

        let handle = schedule.start(context, None);

        assert_eq!(handle.result(), Some(Ok(())));
        assert_eq!(player.calls(), vec!["seek_to(5, 0)", "set_play_when_ready(true)"]);
    }

    #[test]
    fn test_completion_node_with_successor_is_rejected() {
        let (_clock, _player, context) = setup();
        let schedule = ActionSchedule {
            tag: "bad".to_owned(),
            nodes: Arc::from(vec![
                ActionNode {
                    action: Action::new("bad", ActionKind::Finish),
                    delay_ms: 0,
                    repeat_interval_ms: None,
                    next: Some(1),
                },
                ActionNode {
                    action: Action::new("bad", ActionKind::Root),
                    delay_ms: 0,
                    repeat_interval_ms: None,
                    next: None,
                },
            ]),
        };

        let handle = schedule.start(context, None);

        assert!(matches!(
            handle.error(),
            Some(ScheduleError::Action {
                source: ActionError::CompletionNotTerminal,
                ..
            })
        ));
        assert!(!handle.is_finished());
    }

    #[test]
    fn test_immediate_actions_reach_player_and_track_selector() {
        let (_clock, player, context) = setup();
        let selector = Arc::new(FakeTrackSelector::new());
        let context = context
            .with_track_selector(selector.clone())
            .with_surface(Surface::new("main"));
        let schedule = ActionSchedule::builder("test")
            .prepare()
            .set_repeat_mode(RepeatMode::All)
            .set_video_surface()
            .disable_renderer(1)
            .set_playback_speed(2.0)
            .clear_video_surface()
            .enable_renderer(1)
            .stop()
            .build()
            .unwrap();

        let handle = schedule.start(context, None);

        assert!(handle.is_finished());
        assert_eq!(
            player.calls(),
            vec![
                "prepare",
                "set_repeat_mode(All)",
                "set_video_surface(Some(\"main\"))",
                "set_playback_speed(2)",
                "set_video_surface(None)",
                "stop",
            ]
        );
        assert_eq!(selector.changes(), vec![(1, true), (1, false)]);
    }

    #[test]
    fn test_wait_for_any_timeline_change_ignores_same_timeline() {
        let (_clock, player, context) = setup();
        let first = Timeline::new(MediaItem::many(1, 1_000));
        let second = Timeline::new(MediaItem::many(2, 1_000));
        player.set_timeline(first.clone());
        let log = Log::default();
        let schedule = ActionSchedule::builder("test")
            .wait_for_timeline_changed()
            .execute_runnable(stamp(&log, "after"))
            .build()
            .unwrap();

        schedule.start(context, None);
        player.emit(&PlayerEvent::TimelineChanged {
            timeline: first,
            reason: TimelineChangeReason::SourceUpdate,
        });
        assert!(log.lock().is_empty());

        player.emit(&PlayerEvent::TimelineChanged {
            timeline: second,
            reason: TimelineChangeReason::PlaylistChanged,
        });
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_wait_for_expected_timeline_checks_current_first() {
        let (_clock, player, context) = setup();
        let timeline = Timeline::new(MediaItem::many(1, 1_000));
        player.set_timeline(timeline.clone());
        let log = Log::default();
        let schedule = ActionSchedule::builder("test")
            .wait_for_timeline(timeline, None)
            .execute_runnable(stamp(&log, "after"))
            .build()
            .unwrap();

        schedule.start(context, None);

        assert_eq!(log.lock().len(), 1);
        assert_eq!(player.listeners_added(), 0);
    }

    #[test]
    fn test_wait_for_discontinuity_filters_by_reason() {
        let (_clock, player, context) = setup();
        let log = Log::default();
        let schedule = ActionSchedule::builder("test")
            .wait_for_position_discontinuity_reason(DiscontinuityReason::AutoTransition)
            .execute_runnable(stamp(&log, "after"))
            .build()
            .unwrap();

        schedule.start(context, None);
        let discontinuity = |reason| PlayerEvent::PositionDiscontinuity {
            old: PositionInfo::new(0, 900),
            new: PositionInfo::new(1, 0),
            reason,
        };
        player.emit(&discontinuity(DiscontinuityReason::Seek));
        assert!(log.lock().is_empty());
        player.emit(&discontinuity(DiscontinuityReason::AutoTransition));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_wait_for_message_resumes_on_the_schedule_looper() {
        let (_clock, _player, context) = setup();
        let looper = context.handler().looper().clone();
        let signal = MessageSignal::new();
        let ran_on = Arc::new(Mutex::new(None));
        let schedule = ActionSchedule::builder("test")
            .wait_for_message(Arc::clone(&signal))
            .execute_runnable({
                let ran_on = Arc::clone(&ran_on);
                move |context| {
                    *ran_on.lock() = Some(context.handler().is_current_thread());
                }
            })
            .build()
            .unwrap();

        let handle = schedule.start(context, None);
        let remote_signal = Arc::clone(&signal);
        thread::spawn(move || {
            remote_signal.handle_message(3, None).unwrap();
        })
        .join()
        .unwrap();

        assert!(ran_on.lock().is_none());
        looper.run_until_idle();
        assert_eq!(*ran_on.lock(), Some(true));
        assert!(handle.is_finished());
    }

    #[test]
    fn test_wait_for_pending_commands_sends_message_back_to_app_looper() {
        let (_clock, player, context) = setup();
        let looper = context.handler().looper().clone();
        let schedule = ActionSchedule::builder("test")
            .wait_for_pending_player_commands()
            .play()
            .build()
            .unwrap();

        let handle = schedule.start(context, None);
        let mut messages = player.sent_messages();
        assert_eq!(messages.len(), 1);
        let message = messages.remove(0);
        assert!(message.looper().is_some_and(|target| target.same_as(&looper)));
        assert!(!handle.is_finished());

        message.deliver().unwrap();
        looper.run_until_idle();
        assert!(handle.is_finished());
        assert_eq!(player.calls(), vec!["send_message(0)", "set_play_when_ready(true)"]);
    }

    #[test]
    fn test_play_until_position_pauses_before_next_action() {
        let (_clock, player, context) = setup();
        let app_looper = context.handler().looper().clone();
        let schedule = ActionSchedule::builder("test")
            .play_until_position(0, 500)
            .seek_to(0, 0)
            .build()
            .unwrap();

        let handle = schedule.start(context, None);
        let messages = player.sent_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].position(), Some(PositionInfo::new(0, 500)));
        assert!(messages[0].looper().is_none());
        assert_eq!(messages[1].position(), Some(PositionInfo::new(0, 500)));

        // act as the playback thread reaching the position
        let playback = Looper::spawn("playback").unwrap();
        playback.looper().post(move || {
            for message in messages {
                if let Some(looper) = message.looper().cloned() {
                    looper.post(move || message.deliver().unwrap());
                } else {
                    message.deliver().unwrap();
                }
            }
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && Instant::now() < deadline {
            app_looper.wait_for_pending_task(Duration::from_millis(10));
            app_looper.run_until_idle();
        }

        assert!(handle.is_finished());
        assert_eq!(
            player.calls(),
            vec![
                "send_message(0)",
                "send_message(0)",
                "set_play_when_ready(true)",
                "set_play_when_ready(false)",
                "seek_to(0, 0)",
            ]
        );
        playback.quit_and_join();
    }

    #[test]
    fn test_play_until_position_on_app_thread_pauses_inline() {
        let (_clock, player, context) = setup();
        let app_looper = context.handler().looper().clone();
        let schedule = ActionSchedule::builder("test")
            .play_until_start_of_media_item(1)
            .stop()
            .build()
            .unwrap();

        let handle = schedule.start(context, None);
        for message in player.sent_messages() {
            message.deliver().unwrap();
        }
        app_looper.run_until_idle();

        assert!(handle.is_finished());
        assert_eq!(
            player.calls()[2..],
            ["set_play_when_ready(true)", "set_play_when_ready(false)", "stop"]
        );
    }
}
