/// Real-time budget for the run-until helpers.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// How long a blocked helper waits for new tasks before nudging the clock again.
pub const RUN_UNTIL_POLL_INTERVAL_MS: u64 = 5;

/// Clock time between two steps of the fake playback loop.
pub const DEFAULT_WORK_INTERVAL_MS: u64 = 10;

/// Slots in the command ring buffer between the application and playback sides.
pub const DEFAULT_COMMAND_CAPACITY: usize = 1024;

pub const DEFAULT_PLAYBACK_SPEED: f32 = 1.0;

/// Log target of the action schedule.
pub const SCHEDULE_LOG_TARGET: &str = "playback_harness::schedule";
