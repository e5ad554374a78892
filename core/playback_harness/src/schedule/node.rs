use crate::schedule::action::Action;

/// One link of a schedule: an action, the delay before it runs, and an
/// optional repeat interval.
///
/// `next` indexes the schedule's node arena and is fixed once the schedule is
/// built.
#[derive(Debug, Clone)]
pub struct ActionNode {
    pub(crate) action: Action,
    pub(crate) delay_ms: u64,
    pub(crate) repeat_interval_ms: Option<u64>,
    pub(crate) next: Option<usize>,
}

impl ActionNode {
    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn repeat_interval_ms(&self) -> Option<u64> {
        self.repeat_interval_ms
    }

    pub fn next(&self) -> Option<usize> {
        self.next
    }
}

/// Progress of one node within a started run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Pending,
    /// delay timer armed
    Scheduled,
    /// action invoked, possibly waiting for its condition
    Running,
    Completed,
    Failed,
}
