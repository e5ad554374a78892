//! Deferred actions. Each one checks its condition first and only registers
//! for player events when the condition does not hold yet.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    error::ActionError,
    player::{Player, PlayerEvent, PlayerMessage, listener::register_one_shot},
    schedule::{ActionContext, action::ActionKind, gate::rendezvous, run::Next},
};

pub(crate) fn defer(
    kind: &ActionKind,
    context: &ActionContext,
    next: Next,
) -> Result<(), ActionError> {
    let player = context.player();
    match kind {
        ActionKind::WaitForPlaybackState(target) => {
            let target = *target;
            until(
                player,
                next,
                |player| player.playback_state() == target,
                move |event| *event == PlayerEvent::PlaybackStateChanged(target),
            );
        }
        ActionKind::WaitForPlayWhenReady(target) => {
            let target = *target;
            until(
                player,
                next,
                |player| player.play_when_ready() == target,
                move |event| *event == PlayerEvent::PlayWhenReadyChanged(target),
            );
        }
        ActionKind::WaitForIsLoading(target) => {
            let target = *target;
            until(
                player,
                next,
                |player| player.is_loading() == target,
                move |event| *event == PlayerEvent::IsLoadingChanged(target),
            );
        }
        ActionKind::WaitForTimelineChanged { expected, reason } => {
            let reason = *reason;
            match expected.clone() {
                Some(expected) => {
                    let already = reason.is_none() && player.timeline() == expected;
                    until(
                        player,
                        next,
                        |_| already,
                        move |event| {
                            matches!(event, PlayerEvent::TimelineChanged { timeline, reason: got }
                                if *timeline == expected && reason.is_none_or(|reason| reason == *got))
                        },
                    );
                }
                None => {
                    let current = player.timeline();
                    register_one_shot(
                        player,
                        move |event| {
                            matches!(event, PlayerEvent::TimelineChanged { timeline, reason: got }
                                if *timeline != current && reason.is_none_or(|reason| reason == *got))
                        },
                        move || next.schedule(),
                    );
                }
            }
        }
        ActionKind::WaitForPositionDiscontinuity(reason) => {
            let reason = *reason;
            register_one_shot(
                player,
                move |event| {
                    matches!(event, PlayerEvent::PositionDiscontinuity { reason: got, .. }
                        if reason.is_none_or(|reason| reason == *got))
                },
                move || next.schedule(),
            );
        }
        ActionKind::WaitForMessage(signal) => signal.on_next_message(move || next.schedule()),
        ActionKind::WaitForPendingPlayerCommands => {
            // queued behind every earlier command, delivered back on our looper
            let next = Mutex::new(Some(next));
            let message = PlayerMessage::from_fn(move |_, _| {
                if let Some(next) = next.lock().take() {
                    next.schedule();
                }
                Ok(())
            })
            .on_looper(context.handler().looper().clone());
            player.send_message(message)?;
        }
        ActionKind::PlayUntilPosition {
            media_item_index,
            position_ms,
        } => play_until_position(context, next, *media_item_index, *position_ms)?,
        _ => next.schedule(),
    }
    Ok(())
}

/// Continues at once if `holds` is already true, otherwise on the first event
/// accepted by `matches`.
fn until<H, M>(player: &Arc<dyn Player>, next: Next, holds: H, matches: M)
where
    H: FnOnce(&dyn Player) -> bool,
    M: Fn(&PlayerEvent) -> bool + Send + Sync + 'static,
{
    if holds(player.as_ref()) {
        next.schedule();
    } else {
        register_one_shot(player, matches, move || next.schedule());
    }
}

/// Plays until the given position, pauses there and continues once the pause
/// was issued.
///
/// The first message blocks the playback thread on a gate until `pause()` ran
/// on the application looper. The second one, at the same position and
/// delivered on the application looper, continues the schedule.
fn play_until_position(
    context: &ActionContext,
    next: Next,
    media_item_index: usize,
    position_ms: u64,
) -> Result<(), ActionError> {
    let player = context.player();
    let handler = context.handler().clone();

    let weak_player = Arc::downgrade(player);
    let app_handler = handler.clone();
    let pause = PlayerMessage::from_fn(move |_, _| {
        let Some(player) = weak_player.upgrade() else {
            return Ok(());
        };
        if app_handler.is_current_thread() {
            player.pause();
            return Ok(());
        }
        let (opener, gate) = rendezvous();
        app_handler.post(move || {
            player.pause();
            opener.open();
        });
        if !gate.pass() {
            log::warn!("application looper went away before pausing");
        }
        Ok(())
    })
    .at_position(media_item_index, position_ms);

    let next = Mutex::new(Some(next));
    let resume = PlayerMessage::from_fn(move |_, _| {
        if let Some(next) = next.lock().take() {
            next.schedule();
        }
        Ok(())
    })
    .at_position(media_item_index, position_ms)
    .on_looper(handler.looper().clone());

    player.send_message(pause)?;
    player.send_message(resume)?;
    player.play();
    Ok(())
}
