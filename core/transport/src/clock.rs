use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    callback_queue::DelayedCallbackQueue,
    handler::HandlerId,
    looper::{Looper, Task},
};

/// A task bound for a looper, tagged with the handler that posted it.
pub struct Dispatch {
    pub looper: Looper,
    pub owner: HandlerId,
    pub task: Task,
}

impl Dispatch {
    fn deliver(self) {
        self.looper.enqueue(Some(self.owner), self.task);
    }
}

/// Source of time and deferred execution.
pub trait Clock: Send + Sync {
    /// Wall-clock time in milliseconds.
    fn current_time_ms(&self) -> u64;

    /// Milliseconds since boot. This is the time base of [`Clock::post_at`].
    fn elapsed_since_boot_ms(&self) -> u64;

    /// Blocks the calling thread for `duration_ms` of this clock's time.
    fn sleep(&self, duration_ms: i64);

    /// Enqueues `dispatch` on its looper once time since boot reaches
    /// `fire_at_ms`, or right away if that time has passed.
    fn post_at(&self, dispatch: Dispatch, fire_at_ms: u64);

    /// Drops not-yet-due tasks posted by `owner`. Returns how many.
    fn remove_pending(&self, owner: HandlerId) -> usize;

    /// Called by a thread right before it blocks waiting on another thread.
    fn on_thread_blocked(&self) {}

    /// Announces a looper that tasks timed by this clock may run on.
    fn watch_looper(&self, _looper: &Looper) {}
}

#[derive(Debug, Default)]
struct FakeClockState {
    time_since_boot_ms: u64,
    /// wake-up times of threads blocked in `sleep`
    wake_up_times: Vec<u64>,
    pending: DelayedCallbackQueue<Dispatch>,
}

/// Manually advanced clock for deterministic tests.
///
/// Time only moves through [`FakeClock::advance_time`], or through
/// `on_thread_blocked` and `sleep` when auto-advance is enabled.
///
/// A blocked thread only moves time once every other watched looper is idle,
/// so work still running elsewhere gets to post its next entry first.
#[derive(Debug)]
pub struct FakeClock {
    boot_time_ms: u64,
    auto_advance: bool,
    state: Mutex<FakeClockState>,
    wake: Condvar,
    /// held while due entries are handed to their loopers
    dispatching: Mutex<()>,
    loopers: Mutex<Vec<Looper>>,
}

impl FakeClock {
    /// Clock with boot time 0, starting at `initial_time_ms` since boot.
    pub fn new(initial_time_ms: u64) -> Self {
        Self::builder().initial_time_ms(initial_time_ms).build()
    }

    pub fn builder() -> FakeClockBuilder {
        FakeClockBuilder::default()
    }

    pub fn boot_time_ms(&self) -> u64 {
        self.boot_time_ms
    }

    /// Moves time forward by `delta_ms` and dispatches everything now due,
    /// earliest first.
    pub fn advance_time(&self, delta_ms: u64) {
        let current = Looper::current();
        let reached_current = {
            let _dispatching = self.dispatching.lock();
            let due = {
                let mut state = self.state.lock();
                state.time_since_boot_ms = state.time_since_boot_ms.saturating_add(delta_ms);
                let now = state.time_since_boot_ms;
                if state.wake_up_times.iter().any(|&wake_at| wake_at <= now) {
                    self.wake.notify_all();
                }
                state.pending.drain_due(now)
            };
            deliver_in_order(due, current.as_ref())
        };

        if reached_current && let Some(current) = current {
            let ran = current.run_until_idle();
            log::trace!("drained {ran} tasks on '{}'", current.name());
        }
    }

    /// Advances to the earliest pending fire time. Returns false if nothing is
    /// pending.
    pub fn advance_to_next_pending(&self) -> bool {
        let delta = {
            let state = self.state.lock();
            let next = state
                .pending
                .next_fire_time()
                .into_iter()
                .chain(state.wake_up_times.iter().copied())
                .min();
            match next {
                Some(next) => next.saturating_sub(state.time_since_boot_ms),
                None => return false,
            }
        };
        self.advance_time(delta);
        true
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn next_pending_time_ms(&self) -> Option<u64> {
        self.state.lock().pending.next_fire_time()
    }

    /// Whether a watched looper other than the caller's still has work.
    fn is_busy_elsewhere(&self) -> bool {
        self.loopers
            .lock()
            .iter()
            .any(|looper| !looper.is_current() && !looper.is_idle())
    }
}

/// Hands `due` to the loopers in order. Returns whether one of the entries
/// went to `current`.
///
/// Callers hold `FakeClock::dispatching`, so batches from concurrent callers
/// never interleave.
fn deliver_in_order(due: Vec<Dispatch>, current: Option<&Looper>) -> bool {
    let mut reached_current = false;
    for dispatch in due {
        reached_current |= current.is_some_and(|current| dispatch.looper.same_as(current));
        dispatch.deliver();
    }
    reached_current
}

impl Clock for FakeClock {
    fn current_time_ms(&self) -> u64 {
        self.boot_time_ms
            .saturating_add(self.state.lock().time_since_boot_ms)
    }

    fn elapsed_since_boot_ms(&self) -> u64 {
        self.state.lock().time_since_boot_ms
    }

    fn sleep(&self, duration_ms: i64) {
        if duration_ms <= 0 {
            return;
        }
        let mut state = self.state.lock();
        let wake_at = state.time_since_boot_ms.saturating_add(duration_ms as u64);
        state.wake_up_times.push(wake_at);

        while state.time_since_boot_ms < wake_at {
            if self.auto_advance {
                let now = state.time_since_boot_ms;
                let target = state
                    .pending
                    .next_fire_time()
                    .map_or(wake_at, |next| next.clamp(now, wake_at));
                drop(state);
                self.advance_time(target - now);
                state = self.state.lock();
            } else {
                self.wake.wait(&mut state);
            }
        }

        if let Some(index) = state.wake_up_times.iter().position(|&t| t == wake_at) {
            state.wake_up_times.swap_remove(index);
        }
    }

    fn post_at(&self, dispatch: Dispatch, fire_at_ms: u64) {
        self.watch_looper(&dispatch.looper);
        let due = {
            let mut state = self.state.lock();
            state.pending.push(fire_at_ms, dispatch);
            fire_at_ms <= state.time_since_boot_ms
        };
        // already due entries queue up behind earlier ones still being delivered
        if due {
            let _dispatching = self.dispatching.lock();
            let due = {
                let mut state = self.state.lock();
                let now = state.time_since_boot_ms;
                state.pending.drain_due(now)
            };
            deliver_in_order(due, None);
        }
    }

    fn remove_pending(&self, owner: HandlerId) -> usize {
        self.state
            .lock()
            .pending
            .retain(|dispatch| dispatch.owner != owner)
    }

    fn on_thread_blocked(&self) {
        if self.auto_advance && !self.is_busy_elsewhere() {
            self.advance_to_next_pending();
        }
    }

    fn watch_looper(&self, looper: &Looper) {
        let mut loopers = self.loopers.lock();
        loopers.retain(|watched| !watched.has_quit());
        if !loopers.iter().any(|watched| watched.same_as(looper)) {
            loopers.push(looper.clone());
        }
    }
}

/// Settings for a [`FakeClock`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeClockBuilder {
    boot_time_ms: u64,
    initial_time_ms: u64,
    auto_advance: bool,
}

impl FakeClockBuilder {
    pub fn boot_time_ms(mut self, boot_time_ms: u64) -> Self {
        self.boot_time_ms = boot_time_ms;
        self
    }

    pub fn initial_time_ms(mut self, initial_time_ms: u64) -> Self {
        self.initial_time_ms = initial_time_ms;
        self
    }

    /// Lets blocked threads move time to the next pending event.
    pub fn auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }

    pub fn build(self) -> FakeClock {
        FakeClock {
            boot_time_ms: self.boot_time_ms,
            auto_advance: self.auto_advance,
            state: Mutex::new(FakeClockState {
                time_since_boot_ms: self.initial_time_ms,
                ..FakeClockState::default()
            }),
            wake: Condvar::new(),
            dispatching: Mutex::new(()),
            loopers: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Debug, Default)]
struct TimerState {
    pending: DelayedCallbackQueue<Dispatch>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Timer {
    state: Mutex<TimerState>,
    changed: Condvar,
}

/// Real-time clock. Delayed tasks are released by one timer thread.
#[derive(Debug)]
pub struct SystemClock {
    boot: Instant,
    timer: Arc<Timer>,
}

impl SystemClock {
    pub fn new() -> std::io::Result<Self> {
        let boot = Instant::now();
        let timer = Arc::new(Timer::default());
        let thread_timer = Arc::clone(&timer);
        thread::Builder::new()
            .name("system-clock-timer".to_owned())
            .spawn(move || run_timer(&thread_timer, boot))?;
        Ok(Self { boot, timer })
    }
}

fn run_timer(timer: &Timer, boot: Instant) {
    let mut state = timer.state.lock();
    loop {
        if state.shutdown {
            return;
        }
        let now = boot.elapsed().as_millis() as u64;
        let due = state.pending.drain_due(now);
        if !due.is_empty() {
            drop(state);
            due.into_iter().for_each(Dispatch::deliver);
            state = timer.state.lock();
            continue;
        }
        match state.pending.next_fire_time() {
            Some(next) => {
                timer
                    .changed
                    .wait_for(&mut state, Duration::from_millis(next - now));
            }
            None => timer.changed.wait(&mut state),
        }
    }
}

impl Drop for SystemClock {
    fn drop(&mut self) {
        self.timer.state.lock().shutdown = true;
        self.timer.changed.notify_all();
    }
}

impl Clock for SystemClock {
    fn current_time_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since_epoch| since_epoch.as_millis() as u64)
    }

    fn elapsed_since_boot_ms(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration_ms: i64) {
        if duration_ms > 0 {
            thread::sleep(Duration::from_millis(duration_ms as u64));
        }
    }

    fn post_at(&self, dispatch: Dispatch, fire_at_ms: u64) {
        if fire_at_ms <= self.elapsed_since_boot_ms() {
            dispatch.deliver();
            return;
        }
        self.timer.state.lock().pending.push(fire_at_ms, dispatch);
        self.timer.changed.notify_all();
    }

    fn remove_pending(&self, owner: HandlerId) -> usize {
        self.timer
            .state
            .lock()
            .pending
            .retain(|dispatch| dispatch.owner != owner)
    }
}
