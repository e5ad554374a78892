use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt, io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};

use crate::handler::HandlerId;

/// A unit of work run on a looper.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

static NEXT_LOOPER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<Looper>> = const { RefCell::new(None) };
}

/// Capability to drive pending work of an execution context from the outside.
///
/// Whoever embeds a schedule supplies this so waits can make progress without
/// knowing how the host runs its tasks.
pub trait PendingTaskRunner {
    /// Runs the oldest pending task, if any. Returns whether a task ran.
    fn run_one_pending_task(&self) -> bool;

    /// Waits up to `timeout` for a task to become pending.
    fn wait_for_pending_task(&self, timeout: Duration) -> bool {
        thread::sleep(timeout);
        false
    }
}

struct QueuedTask {
    owner: Option<HandlerId>,
    task: Task,
}

#[derive(Default)]
struct Queue {
    tasks: VecDeque<QueuedTask>,
    /// tasks popped but not yet returned; nested drains count twice
    running: usize,
    quit: bool,
}

/// Marks a popped task as running until dropped.
struct Running<'a>(&'a Looper);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        let mut queue = self.0.inner.queue.lock();
        queue.running = queue.running.saturating_sub(1);
    }
}

struct Inner {
    id: u64,
    name: String,
    thread: Mutex<Option<ThreadId>>,
    queue: Mutex<Queue>,
    available: Condvar,
}

/// Single-threaded FIFO task queue bound to one thread.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct Looper {
    inner: Arc<Inner>,
}

impl Looper {
    fn unbound(name: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_LOOPER_ID.fetch_add(1, Ordering::Relaxed),
                name: name.to_owned(),
                thread: Mutex::new(None),
                queue: Mutex::new(Queue::default()),
                available: Condvar::new(),
            }),
        }
    }

    fn bind_to_current_thread(&self) {
        *self.inner.thread.lock() = Some(thread::current().id());
        CURRENT.with(|current| *current.borrow_mut() = Some(self.clone()));
    }

    /// Returns the looper of the calling thread, creating and binding one
    /// named `name` if the thread has none yet.
    pub fn for_current_thread(name: &str) -> Self {
        if let Some(existing) = Self::current() {
            return existing;
        }
        let looper = Self::unbound(name);
        looper.bind_to_current_thread();
        log::trace!("looper '{name}' bound to {:?}", thread::current().id());
        looper
    }

    pub fn current() -> Option<Self> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Starts a dedicated thread that runs a new looper until it quits.
    pub fn spawn(name: &str) -> io::Result<LooperThread> {
        let looper = Self::unbound(name);
        let ready = Arc::new((Mutex::new(false), Condvar::new()));

        let thread_looper = looper.clone();
        let thread_ready = Arc::clone(&ready);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                thread_looper.bind_to_current_thread();
                {
                    let (bound, cvar) = &*thread_ready;
                    *bound.lock() = true;
                    cvar.notify_all();
                }
                thread_looper.loop_until_quit();
            })?;

        let (bound, cvar) = &*ready;
        let mut bound = bound.lock();
        while !*bound {
            cvar.wait(&mut bound);
        }

        Ok(LooperThread {
            looper,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_current(&self) -> bool {
        *self.inner.thread.lock() == Some(thread::current().id())
    }

    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Appends `task` to the queue. Tasks posted after `quit` are dropped.
    pub fn enqueue(&self, owner: Option<HandlerId>, task: Task) -> bool {
        let mut queue = self.inner.queue.lock();
        if queue.quit {
            log::debug!("looper '{}' has quit, dropping task", self.inner.name);
            return false;
        }
        queue.tasks.push_back(QueuedTask { owner, task });
        self.inner.available.notify_all();
        true
    }

    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(None, Box::new(task))
    }

    fn pop(&self) -> Option<(Task, Running<'_>)> {
        let mut queue = self.inner.queue.lock();
        let queued = queue.tasks.pop_front()?;
        queue.running += 1;
        Some((queued.task, Running(self)))
    }

    /// Runs pending tasks, including ones posted while draining, until the
    /// queue is empty. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Some((task, _running)) = self.pop() {
            task();
            ran += 1;
        }
        ran
    }

    /// True when nothing is queued and no task is running, or the looper quit.
    pub fn is_idle(&self) -> bool {
        let queue = self.inner.queue.lock();
        queue.quit || (queue.tasks.is_empty() && queue.running == 0)
    }

    /// Drops queued tasks posted by `owner`.
    pub fn remove_tasks(&self, owner: HandlerId) -> usize {
        let mut queue = self.inner.queue.lock();
        let before = queue.tasks.len();
        queue.tasks.retain(|queued| queued.owner != Some(owner));
        before - queue.tasks.len()
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.queue.lock().tasks.len()
    }

    /// Stops the loop. Pending tasks are discarded.
    pub fn quit(&self) {
        let mut queue = self.inner.queue.lock();
        queue.quit = true;
        queue.tasks.clear();
        self.inner.available.notify_all();
    }

    pub fn has_quit(&self) -> bool {
        self.inner.queue.lock().quit
    }

    fn loop_until_quit(&self) {
        loop {
            let (task, _running) = {
                let mut queue = self.inner.queue.lock();
                loop {
                    if queue.quit {
                        return;
                    }
                    if let Some(queued) = queue.tasks.pop_front() {
                        queue.running += 1;
                        break (queued.task, Running(self));
                    }
                    self.inner.available.wait(&mut queue);
                }
            };
            task();
        }
    }
}

impl PendingTaskRunner for Looper {
    fn run_one_pending_task(&self) -> bool {
        match self.pop() {
            Some((task, _running)) => {
                task();
                true
            }
            None => false,
        }
    }

    fn wait_for_pending_task(&self, timeout: Duration) -> bool {
        let mut queue = self.inner.queue.lock();
        if queue.tasks.is_empty() && !queue.quit {
            self.inner.available.wait_for(&mut queue, timeout);
        }
        !queue.tasks.is_empty()
    }
}

impl fmt::Debug for Looper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Looper")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("pending", &self.pending_tasks())
            .finish()
    }
}

/// A thread running a looper. Dropping it quits the looper and joins.
#[derive(Debug)]
pub struct LooperThread {
    looper: Looper,
    handle: Option<JoinHandle<()>>,
}

impl LooperThread {
    pub fn looper(&self) -> &Looper {
        &self.looper
    }

    pub fn quit_and_join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.looper.quit();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("looper thread '{}' panicked", self.looper.name());
        }
    }
}

impl Drop for LooperThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
