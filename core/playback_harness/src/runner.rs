//! Helpers that run the application looper until the player gets somewhere.
//!
//! All of them must be called on the player's application thread. They check
//! their condition first, then keep running looper tasks (and nudging the
//! clock while idle) until it holds or the real-time budget runs out.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use transport::{handler::Handler, looper::PendingTaskRunner};

use crate::{
    constants::{DEFAULT_TIMEOUT_MS, RUN_UNTIL_POLL_INTERVAL_MS},
    error::{PlaybackError, RunnerError},
    player::{
        DiscontinuityReason, PlaybackState, Player, PlayerEvent, PlayerMessage, Timeline,
        listener::on_event,
    },
    schedule::{ScheduleHandle, gate::rendezvous},
};

pub fn verify_app_thread(player: &dyn Player) -> Result<(), RunnerError> {
    if player.application_looper().is_current() {
        Ok(())
    } else {
        Err(RunnerError::WrongThread)
    }
}

/// Runs the application looper until `condition` holds.
pub fn run_until<F>(
    player: &dyn Player,
    timeout_ms: u64,
    description: &str,
    mut condition: F,
) -> Result<(), RunnerError>
where
    F: FnMut() -> bool,
{
    verify_app_thread(player)?;
    let looper = player.application_looper();
    let clock = player.clock();
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let poll = Duration::from_millis(RUN_UNTIL_POLL_INTERVAL_MS);

    loop {
        if condition() {
            return Ok(());
        }
        if looper.run_one_pending_task() {
            continue;
        }
        if Instant::now() >= deadline {
            log::warn!("gave up waiting for {description} after {timeout_ms}ms");
            return Err(RunnerError::Timeout {
                timeout_ms,
                condition: description.to_owned(),
            });
        }
        let before = clock.elapsed_since_boot_ms();
        clock.on_thread_blocked();
        if clock.elapsed_since_boot_ms() == before {
            looper.wait_for_pending_task(poll);
        }
    }
}

/// Listens for the first event mapped to `Some` and runs until it arrives.
fn run_until_event<T, F>(
    player: &dyn Player,
    description: &str,
    select: F,
) -> Result<T, RunnerError>
where
    T: Send + 'static,
    F: Fn(&PlayerEvent) -> Option<T> + Send + Sync + 'static,
{
    verify_app_thread(player)?;
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    let id = player.add_listener(on_event(move |event| {
        let mut slot = sink.lock();
        if slot.is_none() {
            *slot = select(event);
        }
    }));
    let result = run_until(player, DEFAULT_TIMEOUT_MS, description, || {
        slot.lock().is_some()
    });
    player.remove_listener(id);
    result?;
    slot.lock().take().ok_or_else(|| RunnerError::Timeout {
        timeout_ms: DEFAULT_TIMEOUT_MS,
        condition: description.to_owned(),
    })
}

pub fn run_until_playback_state(
    player: &dyn Player,
    state: PlaybackState,
) -> Result<(), RunnerError> {
    verify_app_thread(player)?;
    if player.playback_state() == state {
        return Ok(());
    }
    run_until_event(player, &format!("playback state {state:?}"), move |event| {
        (*event == PlayerEvent::PlaybackStateChanged(state)).then_some(())
    })
}

pub fn run_until_play_when_ready(
    player: &dyn Player,
    play_when_ready: bool,
) -> Result<(), RunnerError> {
    verify_app_thread(player)?;
    if player.play_when_ready() == play_when_ready {
        return Ok(());
    }
    run_until_event(
        player,
        &format!("play when ready {play_when_ready}"),
        move |event| (*event == PlayerEvent::PlayWhenReadyChanged(play_when_ready)).then_some(()),
    )
}

pub fn run_until_timeline(player: &dyn Player, expected: &Timeline) -> Result<(), RunnerError> {
    verify_app_thread(player)?;
    if player.timeline() == *expected {
        return Ok(());
    }
    let expected = expected.clone();
    run_until_event(player, "expected timeline", move |event| {
        matches!(event, PlayerEvent::TimelineChanged { timeline, .. } if *timeline == expected)
            .then_some(())
    })
}

/// Runs until the next timeline change and returns the new timeline.
pub fn run_until_timeline_changed(player: &dyn Player) -> Result<Timeline, RunnerError> {
    run_until_event(player, "timeline change", |event| match event {
        PlayerEvent::TimelineChanged { timeline, .. } => Some(timeline.clone()),
        _ => None,
    })
}

pub fn run_until_position_discontinuity(
    player: &dyn Player,
    reason: DiscontinuityReason,
) -> Result<(), RunnerError> {
    run_until_event(
        player,
        &format!("position discontinuity {reason:?}"),
        move |event| {
            matches!(event, PlayerEvent::PositionDiscontinuity { reason: got, .. } if *got == reason)
                .then_some(())
        },
    )
}

/// Runs until the player reports an error and returns it.
pub fn run_until_error(player: &dyn Player) -> Result<PlaybackError, RunnerError> {
    verify_app_thread(player)?;
    if let Some(error) = player.player_error() {
        return Ok(error);
    }
    run_until_event(player, "player error", |event| match event {
        PlayerEvent::PlayerError(error) => Some(error.clone()),
        _ => None,
    })
}

/// Plays until the given position and pauses exactly there.
///
/// A message at the position holds the playback thread until the pause was
/// issued on the application thread, so playback cannot run past it.
pub fn play_until_position(
    player: &Arc<dyn Player>,
    media_item_index: usize,
    position_ms: u64,
) -> Result<(), RunnerError> {
    verify_app_thread(player.as_ref())?;
    let paused = Arc::new(AtomicBool::new(false));
    let app_handler = Handler::new(
        player.application_looper().clone(),
        Arc::clone(player.clock()),
    );

    let weak_player = Arc::downgrade(player);
    let flag = Arc::clone(&paused);
    let message = PlayerMessage::from_fn(move |_, _| {
        let Some(player) = weak_player.upgrade() else {
            return Ok(());
        };
        if app_handler.is_current_thread() {
            player.pause();
            flag.store(true, Ordering::SeqCst);
            return Ok(());
        }
        let (opener, gate) = rendezvous();
        let flag = Arc::clone(&flag);
        app_handler.post(move || {
            player.pause();
            flag.store(true, Ordering::SeqCst);
            opener.open();
        });
        if !gate.pass() {
            log::warn!("application looper went away before pausing");
        }
        Ok(())
    })
    .at_position(media_item_index, position_ms);

    player.send_message(message)?;
    player.play();
    run_until(
        player.as_ref(),
        DEFAULT_TIMEOUT_MS,
        &format!("position {media_item_index}:{position_ms}"),
        || paused.load(Ordering::SeqCst),
    )?;
    run_until_pending_commands_are_fully_handled(player.as_ref())
}

pub fn play_until_start_of_media_item(
    player: &Arc<dyn Player>,
    media_item_index: usize,
) -> Result<(), RunnerError> {
    play_until_position(player, media_item_index, 0)
}

/// Runs until every command issued so far went through the playback loop
/// and its effects reached the application thread.
pub fn run_until_pending_commands_are_fully_handled(player: &dyn Player) -> Result<(), RunnerError> {
    verify_app_thread(player)?;
    let handled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&handled);
    let message = PlayerMessage::from_fn(move |_, _| {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    })
    .on_looper(player.application_looper().clone());
    player.send_message(message)?;
    run_until(player, DEFAULT_TIMEOUT_MS, "pending commands", || {
        handled.load(Ordering::SeqCst)
    })?;
    // let the update that carries the acknowledgements land
    while player.application_looper().run_one_pending_task() {}
    Ok(())
}

/// Runs until the schedule finished or failed.
pub fn run_until_schedule_finished(
    player: &dyn Player,
    handle: &ScheduleHandle,
    timeout_ms: u64,
) -> Result<(), RunnerError> {
    run_until(player, timeout_ms, "action schedule", || {
        handle.result().is_some()
    })?;
    match handle.result() {
        Some(Err(error)) => Err(error.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{
        fake_player::FakePlayer,
        player::{MediaItem, StartPosition},
    };
    use transport::{
        clock::{Clock, FakeClock},
        looper::Looper,
    };

    fn create_player(items: usize, duration_ms: u64) -> Arc<dyn Player> {
        crate::init_test_logging();
        let clock = Arc::new(FakeClock::builder().auto_advance(true).build());
        let looper = Looper::for_current_thread("app");
        let player: Arc<dyn Player> = FakePlayer::builder(looper, clock).build();
        player
            .set_media_items(MediaItem::many(items, duration_ms), StartPosition::Reset)
            .unwrap();
        player
    }

    #[test]
    fn test_run_until_returns_at_once_when_condition_holds() {
        let player = create_player(1, 1_000);
        run_until(player.as_ref(), 0, "nothing", || true).unwrap();
    }

    #[test]
    fn test_run_until_times_out() {
        let player = create_player(1, 1_000);
        let result = run_until(player.as_ref(), 20, "never", || false);

        assert_eq!(
            result,
            Err(RunnerError::Timeout {
                timeout_ms: 20,
                condition: "never".to_owned(),
            })
        );
    }

    #[test]
    fn test_helpers_refuse_other_threads() {
        let player = create_player(1, 1_000);
        let result = thread::spawn(move || run_until_playback_state(player.as_ref(), PlaybackState::Ready))
            .join()
            .unwrap();

        assert_eq!(result, Err(RunnerError::WrongThread));
    }

    #[test]
    fn test_run_until_playback_state_drives_auto_advancing_clock() {
        let player = create_player(2, 100);
        player.prepare();
        player.play();

        run_until_playback_state(player.as_ref(), PlaybackState::Ended).unwrap();

        assert_eq!(player.current_media_item_index(), 1);
        assert!(player.clock().elapsed_since_boot_ms() >= 200);
    }

    #[test]
    fn test_threaded_playback_ends_at_the_same_virtual_time() {
        crate::init_test_logging();
        let app = Looper::for_current_thread("app");
        for _ in 0..5 {
            let clock = Arc::new(FakeClock::builder().auto_advance(true).build());
            let playback = Looper::spawn("playback").unwrap();
            let player: Arc<dyn Player> = FakePlayer::builder(app.clone(), clock.clone())
                .playback_looper(playback.looper().clone())
                .build();
            Handler::new(app.clone(), clock.clone()).post_delayed(|| {}, 100_000);
            player
                .set_media_items(MediaItem::many(2, 100), StartPosition::Reset)
                .unwrap();
            player.prepare();
            player.play();

            run_until_playback_state(player.as_ref(), PlaybackState::Ended).unwrap();

            assert_eq!(clock.elapsed_since_boot_ms(), 200);
            player.release();
            playback.quit_and_join();
        }
    }

    #[test]
    fn test_play_until_position_pauses_exactly_there() {
        let player = create_player(2, 1_000);
        player.prepare();

        play_until_position(&player, 1, 250).unwrap();

        assert!(!player.play_when_ready());
        assert_eq!(player.playback_state(), PlaybackState::Ready);
        assert_eq!(player.current_media_item_index(), 1);
        assert_eq!(player.current_position_ms(), 250);
    }

    #[test]
    fn test_run_until_error_returns_the_error() {
        let player = create_player(1, 1_000);
        player.prepare();
        player
            .send_message(PlayerMessage::from_fn(|_, _| Err(PlaybackError::new("bad frame"))))
            .unwrap();

        assert_eq!(
            run_until_error(player.as_ref()),
            Ok(PlaybackError::new("bad frame"))
        );
        assert_eq!(player.playback_state(), PlaybackState::Idle);
    }

    #[test]
    fn test_run_until_timeline_changed_returns_new_timeline() {
        let player = create_player(1, 1_000);
        let weak_player = Arc::downgrade(&player);
        let grow = PlayerMessage::from_fn(move |_, _| {
            if let Some(player) = weak_player.upgrade() {
                player.add_media_items(None, MediaItem::many(1, 500)).unwrap();
            }
            Ok(())
        })
        .on_looper(player.application_looper().clone());
        player.send_message(grow).unwrap();

        let timeline = run_until_timeline_changed(player.as_ref()).unwrap();

        assert_eq!(timeline.len(), 2);
        run_until_timeline(player.as_ref(), &timeline).unwrap();
    }

    #[test]
    fn test_run_until_discontinuity_sees_auto_transition() {
        let player = create_player(2, 100);
        player.prepare();
        player.play();

        run_until_position_discontinuity(player.as_ref(), DiscontinuityReason::AutoTransition)
            .unwrap();

        assert_eq!(player.current_media_item_index(), 1);
    }

    #[test]
    fn test_pending_commands_are_fully_handled() {
        let player = create_player(1, 1_000);
        player.prepare();
        run_until_play_when_ready(player.as_ref(), false).unwrap();

        run_until_pending_commands_are_fully_handled(player.as_ref()).unwrap();

        assert_eq!(player.playback_state(), PlaybackState::Ready);
    }
}
