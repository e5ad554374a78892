//! End-to-end harness: a fake player on an auto-advancing clock, an event
//! recorder and an optional action schedule, all driven from the calling
//! thread.

use std::sync::Arc;

use transport::{
    clock::FakeClock,
    handler::Handler,
    looper::{Looper, LooperThread},
};

use crate::{
    constants::DEFAULT_TIMEOUT_MS,
    error::RunnerError,
    fake_player::{FakePlayer, FakePlayerConfig},
    player::{MediaItem, PlaybackState, Player, StartPosition, Surface},
    recorder::EventRecorder,
    runner,
    schedule::{ActionContext, ActionSchedule, ScheduleHandle},
    track_selector::FakeTrackSelector,
};

#[derive(Debug)]
pub struct PlayerTestRunnerBuilder {
    media_items: Vec<MediaItem>,
    schedule: Option<ActionSchedule>,
    autoplay: bool,
    threaded_playback: bool,
    config: FakePlayerConfig,
    timeout_ms: u64,
    surface: Option<Surface>,
}

impl Default for PlayerTestRunnerBuilder {
    fn default() -> Self {
        Self {
            media_items: MediaItem::many(1, 10_000),
            schedule: None,
            autoplay: true,
            threaded_playback: false,
            config: FakePlayerConfig::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            surface: None,
        }
    }
}

impl PlayerTestRunnerBuilder {
    pub fn media_items(mut self, media_items: Vec<MediaItem>) -> Self {
        self.media_items = media_items;
        self
    }

    pub fn schedule(mut self, schedule: ActionSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    /// Runs the playback loop on its own thread.
    pub fn threaded_playback(mut self, threaded_playback: bool) -> Self {
        self.threaded_playback = threaded_playback;
        self
    }

    pub fn config(mut self, config: FakePlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Real-time budget of the blocking calls.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Builds the runner on the calling thread, which becomes the
    /// application thread.
    pub fn build(self) -> Result<PlayerTestRunner, RunnerError> {
        let clock = Arc::new(FakeClock::builder().auto_advance(true).build());
        let app_looper = Looper::for_current_thread("app");
        let playback_thread = if self.threaded_playback {
            let thread = Looper::spawn("playback")
                .map_err(|error| RunnerError::PlaybackThread(error.to_string()))?;
            Some(thread)
        } else {
            None
        };

        let mut builder = FakePlayer::builder(app_looper.clone(), clock.clone()).config(self.config);
        if let Some(thread) = &playback_thread {
            builder = builder.playback_looper(thread.looper().clone());
        }

        Ok(PlayerTestRunner {
            clock,
            app_looper,
            player: builder.build(),
            playback_thread,
            recorder: Arc::new(EventRecorder::new()),
            track_selector: Arc::new(FakeTrackSelector::new()),
            media_items: self.media_items,
            schedule: self.schedule,
            schedule_handle: None,
            autoplay: self.autoplay,
            timeout_ms: self.timeout_ms,
            surface: self.surface,
        })
    }
}

#[derive(Debug)]
pub struct PlayerTestRunner {
    clock: Arc<FakeClock>,
    app_looper: Looper,
    player: Arc<FakePlayer>,
    // declared after `player` so the player is released before the thread joins
    playback_thread: Option<LooperThread>,
    recorder: Arc<EventRecorder>,
    track_selector: Arc<FakeTrackSelector>,
    media_items: Vec<MediaItem>,
    schedule: Option<ActionSchedule>,
    schedule_handle: Option<ScheduleHandle>,
    autoplay: bool,
    timeout_ms: u64,
    surface: Option<Surface>,
}

impl PlayerTestRunner {
    pub fn builder() -> PlayerTestRunnerBuilder {
        PlayerTestRunnerBuilder::default()
    }

    pub fn player(&self) -> &Arc<FakePlayer> {
        &self.player
    }

    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    pub fn clock(&self) -> &Arc<FakeClock> {
        &self.clock
    }

    pub fn track_selector(&self) -> &FakeTrackSelector {
        &self.track_selector
    }

    pub fn schedule_handle(&self) -> Option<&ScheduleHandle> {
        self.schedule_handle.as_ref()
    }

    /// Sets the playlist, starts the schedule, prepares and (with autoplay)
    /// plays.
    ///
    /// Leading schedule actions without delay run inside this call, before
    /// `prepare`. Without autoplay the player is left paused unless the
    /// schedule plays it.
    pub fn start(&mut self) -> Result<&mut Self, RunnerError> {
        runner::verify_app_thread(self.player.as_ref())?;
        self.player.add_listener(self.recorder.clone());
        self.player
            .set_media_items(self.media_items.clone(), StartPosition::Reset)?;

        if let Some(schedule) = &self.schedule {
            let handler = Handler::new(self.app_looper.clone(), self.clock.clone());
            let mut context = ActionContext::new(self.player.clone(), handler)
                .with_track_selector(self.track_selector.clone());
            if let Some(surface) = &self.surface {
                context = context.with_surface(surface.clone());
            }
            self.schedule_handle = Some(schedule.start(context, None));
        }

        self.player.prepare();
        if self.autoplay {
            self.player.play();
        }
        Ok(self)
    }

    /// Blocks until the action schedule finished. Fails with the schedule's
    /// error if one of its actions failed.
    pub fn block_until_action_schedule_finished(&mut self) -> Result<&mut Self, RunnerError> {
        if let Some(handle) = &self.schedule_handle {
            runner::run_until_schedule_finished(self.player.as_ref(), handle, self.timeout_ms)?;
        }
        Ok(self)
    }

    /// Blocks until playback ended. Fails with the player's error if it
    /// stopped on one.
    pub fn block_until_ended(&mut self) -> Result<&mut Self, RunnerError> {
        let player = self.player.as_ref();
        runner::run_until(player, self.timeout_ms, "playback ended", || {
            player.playback_state() == PlaybackState::Ended || player.player_error().is_some()
        })?;
        match player.player_error() {
            Some(error) => Err(error.into()),
            None => Ok(self),
        }
    }
}

impl Drop for PlayerTestRunner {
    fn drop(&mut self) {
        if let Some(handle) = &self.schedule_handle
            && handle.result().is_none()
        {
            handle.cancel();
        }
        self.player.release();
    }
}
