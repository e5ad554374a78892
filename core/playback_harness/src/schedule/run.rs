use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    constants::SCHEDULE_LOG_TARGET,
    error::{ActionError, ScheduleError},
    schedule::{
        ActionContext,
        node::{ActionNode, NodeState},
    },
};

/// Called once on the schedule's looper after the last node ran.
pub type FinishedCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Default)]
struct Outcome {
    finished: bool,
    error: Option<ScheduleError>,
}

/// State of one started schedule.
pub(crate) struct ScheduleRun {
    tag: String,
    nodes: Arc<[ActionNode]>,
    context: ActionContext,
    states: Mutex<Vec<NodeState>>,
    outcome: Mutex<Outcome>,
    settled: Condvar,
    cancelled: AtomicBool,
    on_finished: Mutex<Option<FinishedCallback>>,
}

impl ScheduleRun {
    pub(crate) fn start(
        tag: String,
        nodes: Arc<[ActionNode]>,
        context: ActionContext,
        on_finished: Option<FinishedCallback>,
    ) -> ScheduleHandle {
        let run = Arc::new(Self {
            tag,
            states: Mutex::new(vec![NodeState::Pending; nodes.len()]),
            nodes,
            context,
            outcome: Mutex::new(Outcome::default()),
            settled: Condvar::new(),
            cancelled: AtomicBool::new(false),
            on_finished: Mutex::new(on_finished),
        });
        log::debug!(target: SCHEDULE_LOG_TARGET, "{}: starting schedule", run.tag);
        run.schedule_node(0);
        ScheduleHandle { run }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_state(&self, index: usize, state: NodeState) {
        if let Some(slot) = self.states.lock().get_mut(index) {
            *slot = state;
        }
    }

    /// Runs the node inline when it has no delay and we already are on the
    /// handler's looper. Posts it otherwise.
    fn schedule_node(self: &Arc<Self>, index: usize) {
        if self.is_cancelled() {
            return;
        }
        let Some(node) = self.nodes.get(index) else {
            return;
        };
        self.set_state(index, NodeState::Scheduled);
        let handler = &self.context.handler;
        if node.delay_ms == 0 && handler.is_current_thread() {
            self.run_node(index);
        } else {
            let run = Arc::clone(self);
            handler.post_delayed(move || run.run_node(index), node.delay_ms);
        }
    }

    fn run_node(self: &Arc<Self>, index: usize) {
        if self.is_cancelled() {
            return;
        }
        let Some(node) = self.nodes.get(index) else {
            return;
        };
        self.set_state(index, NodeState::Running);

        let next = node.next.map(|next| Next {
            run: Arc::clone(self),
            from: index,
            index: next,
        });
        if let Err(error) = node.action.execute_and_schedule_next(&self.context, next) {
            self.fail(index, error);
            return;
        }

        if node.action.is_completion() {
            self.finish(index);
        } else if let Some(interval) = node.repeat_interval_ms {
            self.arm_repeat(index, interval);
        }
    }

    fn arm_repeat(self: &Arc<Self>, index: usize, interval_ms: u64) {
        let run = Arc::clone(self);
        self.context
            .handler
            .post_delayed(move || run.repeat(index, interval_ms), interval_ms);
    }

    /// Re-runs a repeating node outside the chain.
    fn repeat(self: &Arc<Self>, index: usize, interval_ms: u64) {
        if self.is_cancelled() {
            return;
        }
        let Some(node) = self.nodes.get(index) else {
            return;
        };
        if let Err(error) = node.action.execute_and_schedule_next(&self.context, None) {
            self.fail(index, error);
            return;
        }
        self.arm_repeat(index, interval_ms);
    }

    fn finish(&self, index: usize) {
        self.set_state(index, NodeState::Completed);
        {
            let mut outcome = self.outcome.lock();
            outcome.finished = true;
            self.settled.notify_all();
        }
        log::info!(target: SCHEDULE_LOG_TARGET, "{}: schedule finished", self.tag);
        if let Some(on_finished) = self.on_finished.lock().take() {
            self.context.handler.post(on_finished);
        }
    }

    fn fail(&self, index: usize, error: ActionError) {
        self.set_state(index, NodeState::Failed);
        self.cancelled.store(true, Ordering::SeqCst);
        let (tag, description) = self
            .nodes
            .get(index)
            .map(|node| (node.action.tag().to_owned(), node.action.description()))
            .unwrap_or_default();
        log::error!(target: SCHEDULE_LOG_TARGET, "{tag}: '{description}' failed: {error}");

        let mut outcome = self.outcome.lock();
        if outcome.error.is_none() {
            outcome.error = Some(ScheduleError::Action {
                tag,
                description,
                source: error,
            });
        }
        self.settled.notify_all();
    }
}

/// Continuation that schedules the successor of a node.
///
/// It can only be used once. Deferred actions move it into their callback.
pub struct Next {
    run: Arc<ScheduleRun>,
    from: usize,
    index: usize,
}

impl Next {
    /// Marks the current node completed and schedules its successor. Safe to
    /// call from any thread.
    pub fn schedule(self) {
        if self.run.is_cancelled() {
            return;
        }
        self.run.set_state(self.from, NodeState::Completed);
        self.run.schedule_node(self.index);
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("from", &self.from)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Observes and controls a started schedule.
#[derive(Clone)]
pub struct ScheduleHandle {
    run: Arc<ScheduleRun>,
}

impl ScheduleHandle {
    pub fn is_finished(&self) -> bool {
        self.run.outcome.lock().finished
    }

    pub fn error(&self) -> Option<ScheduleError> {
        self.run.outcome.lock().error.clone()
    }

    /// `None` while the run is still going.
    pub fn result(&self) -> Option<Result<(), ScheduleError>> {
        let outcome = self.run.outcome.lock();
        match (&outcome.error, outcome.finished) {
            (Some(error), _) => Some(Err(error.clone())),
            (None, true) => Some(Ok(())),
            (None, false) => None,
        }
    }

    pub fn node_states(&self) -> Vec<NodeState> {
        self.run.states.lock().clone()
    }

    /// Stops the run, including repeating nodes. Pending tasks of the run are
    /// dropped.
    pub fn cancel(&self) {
        if self.run.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.run.context.handler.remove_all_callbacks();
        let mut outcome = self.run.outcome.lock();
        if !outcome.finished && outcome.error.is_none() {
            outcome.error = Some(ScheduleError::Cancelled);
        }
        self.run.settled.notify_all();
        log::debug!(target: SCHEDULE_LOG_TARGET, "{}: schedule cancelled", self.run.tag);
    }

    /// Blocks until the run finishes or fails. Returns `None` on timeout.
    ///
    /// Only useful when the schedule's looper runs on another thread.
    pub fn wait_until_finished(&self, timeout: Duration) -> Option<Result<(), ScheduleError>> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.run.outcome.lock();
        while !outcome.finished && outcome.error.is_none() {
            if self.run.settled.wait_until(&mut outcome, deadline).timed_out() {
                break;
            }
        }
        match (&outcome.error, outcome.finished) {
            (Some(error), _) => Some(Err(error.clone())),
            (None, true) => Some(Ok(())),
            (None, false) => None,
        }
    }
}

impl fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("tag", &self.run.tag)
            .field("outcome", &*self.run.outcome.lock())
            .field("states", &*self.run.states.lock())
            .finish()
    }
}
