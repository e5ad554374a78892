//! Time and task plumbing: loopers, handlers and the clocks that drive them.

pub mod callback_queue;
pub mod clock;
pub mod handler;
pub mod looper;

pub use clock::{Clock, FakeClock, FakeClockBuilder, SystemClock};
pub use handler::{Handler, HandlerId};
pub use looper::{Looper, LooperThread, PendingTaskRunner, Task};
