use playback_harness::{
    error::RunnerError,
    player::{MediaItem, PlaybackState, Player, RepeatMode},
    schedule::ActionSchedule,
    test_runner::PlayerTestRunner,
};

fn main() -> Result<(), RunnerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let schedule = ActionSchedule::builder("demo")
        .play_until_position(0, 2_000)
        .seek_to(2, 1_000)
        .wait_for_playback_state(PlaybackState::Ready)
        .set_repeat_mode(RepeatMode::Off)
        .delay(500)
        .set_playback_speed(2.0)
        .play()
        .build()?;

    let mut runner = PlayerTestRunner::builder()
        .media_items(MediaItem::many(3, 5_000))
        .schedule(schedule)
        .autoplay(false)
        .build()?;

    runner
        .start()?
        .block_until_action_schedule_finished()?
        .block_until_ended()?;

    let recorder = runner.recorder();
    log::info!("playback states: {:?}", recorder.playback_states());
    log::info!("discontinuities: {:?}", recorder.discontinuity_reasons());
    log::info!("played items: {:?}", recorder.played_media_item_indices());
    log::info!(
        "ended at item {} after {}ms",
        runner.player().current_media_item_index(),
        runner.player().clock().elapsed_since_boot_ms()
    );
    Ok(())
}
