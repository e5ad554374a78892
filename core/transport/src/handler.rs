use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    clock::{Clock, Dispatch},
    looper::Looper,
};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the handler that posted a task, so its tasks can be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Posts tasks onto a looper, delaying them through a clock.
///
/// Clones share the same id and therefore the same set of removable tasks.
#[derive(Clone)]
pub struct Handler {
    id: HandlerId,
    looper: Looper,
    clock: Arc<dyn Clock>,
}

impl Handler {
    pub fn new(looper: Looper, clock: Arc<dyn Clock>) -> Self {
        clock.watch_looper(&looper);
        Self {
            id: HandlerId::next(),
            looper,
            clock,
        }
    }

    /// Handler on the calling thread's looper.
    pub fn for_current_thread(name: &str, clock: Arc<dyn Clock>) -> Self {
        Self::new(Looper::for_current_thread(name), clock)
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn looper(&self) -> &Looper {
        &self.looper
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn is_current_thread(&self) -> bool {
        self.looper.is_current()
    }

    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.looper.enqueue(Some(self.id), Box::new(task))
    }

    pub fn post_delayed<F>(&self, task: F, delay_ms: u64) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if delay_ms == 0 {
            return self.post(task);
        }
        let fire_at_ms = self.clock.elapsed_since_boot_ms().saturating_add(delay_ms);
        self.post_at_time(task, fire_at_ms)
    }

    /// Posts `task` to run once the clock's time since boot reaches
    /// `uptime_ms`.
    pub fn post_at_time<F>(&self, task: F, uptime_ms: u64) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.looper.has_quit() {
            return false;
        }
        self.clock.post_at(
            Dispatch {
                looper: self.looper.clone(),
                owner: self.id,
                task: Box::new(task),
            },
            uptime_ms,
        );
        true
    }

    /// Drops every task this handler posted that has not run yet, whether
    /// still waiting in the clock or already queued on the looper.
    pub fn remove_all_callbacks(&self) {
        let pending = self.clock.remove_pending(self.id);
        let queued = self.looper.remove_tasks(self.id);
        log::trace!("handler {:?} removed {pending} pending, {queued} queued", self.id);
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("looper", &self.looper)
            .finish_non_exhaustive()
    }
}
