use std::{any::Any, collections::VecDeque, fmt, sync::Arc};

use parking_lot::Mutex;
use transport::looper::Looper;

use crate::{error::PlaybackError, player::PositionInfo};

pub type MessagePayload = Arc<dyn Any + Send + Sync>;

/// Receiver of a [`PlayerMessage`].
///
/// An error returned while the message is handled on the playback thread
/// becomes a playback error of the player.
pub trait MessageTarget
where
    Self: Send + Sync,
{
    fn handle_message(
        &self,
        message_type: i32,
        payload: Option<&MessagePayload>,
    ) -> Result<(), PlaybackError>;
}

struct FnTarget<F>(F);

impl<F> MessageTarget for FnTarget<F>
where
    F: Fn(i32, Option<&MessagePayload>) -> Result<(), PlaybackError> + Send + Sync,
{
    fn handle_message(
        &self,
        message_type: i32,
        payload: Option<&MessagePayload>,
    ) -> Result<(), PlaybackError> {
        (self.0)(message_type, payload)
    }
}

/// A message the player delivers to its target, either as soon as possible or
/// once playback reaches a position.
#[derive(Clone)]
pub struct PlayerMessage {
    target: Arc<dyn MessageTarget>,
    message_type: i32,
    payload: Option<MessagePayload>,
    position: Option<PositionInfo>,
    /// `None` delivers on the playback looper
    looper: Option<Looper>,
    delete_after_delivery: bool,
}

impl PlayerMessage {
    pub fn new(target: Arc<dyn MessageTarget>) -> Self {
        Self {
            target,
            message_type: 0,
            payload: None,
            position: None,
            looper: None,
            delete_after_delivery: true,
        }
    }

    pub fn from_fn<F>(handle: F) -> Self
    where
        F: Fn(i32, Option<&MessagePayload>) -> Result<(), PlaybackError> + Send + Sync + 'static,
    {
        Self::new(Arc::new(FnTarget(handle)))
    }

    pub fn with_type(mut self, message_type: i32) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_payload(mut self, payload: MessagePayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn at_position(mut self, media_item_index: usize, position_ms: u64) -> Self {
        self.position = Some(PositionInfo::new(media_item_index, position_ms));
        self
    }

    /// Delivers on `looper` instead of the playback looper.
    pub fn on_looper(mut self, looper: Looper) -> Self {
        self.looper = Some(looper);
        self
    }

    /// With `false` the message stays pending and fires again whenever
    /// playback passes its position.
    pub fn delete_after_delivery(mut self, delete: bool) -> Self {
        self.delete_after_delivery = delete;
        self
    }

    pub fn message_type(&self) -> i32 {
        self.message_type
    }

    pub fn position(&self) -> Option<PositionInfo> {
        self.position
    }

    pub fn looper(&self) -> Option<&Looper> {
        self.looper.as_ref()
    }

    pub fn deletes_after_delivery(&self) -> bool {
        self.delete_after_delivery
    }

    pub fn deliver(&self) -> Result<(), PlaybackError> {
        self.target
            .handle_message(self.message_type, self.payload.as_ref())
    }
}

impl fmt::Debug for PlayerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerMessage")
            .field("message_type", &self.message_type)
            .field("position", &self.position)
            .field("looper", &self.looper.as_ref().map(Looper::name))
            .field("delete_after_delivery", &self.delete_after_delivery)
            .finish_non_exhaustive()
    }
}

type Waiter = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct SignalState {
    received: Vec<i32>,
    /// arrivals nobody has waited for yet
    unconsumed: usize,
    waiters: VecDeque<Waiter>,
}

/// Message target that lets a schedule wait for message arrival.
///
/// Every arrival is consumed by at most one waiter. Arrivals with nobody
/// waiting are kept for the next waiter.
#[derive(Default)]
pub struct MessageSignal {
    state: Mutex<SignalState>,
}

impl MessageSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn received_count(&self) -> usize {
        self.state.lock().received.len()
    }

    /// Types of all messages received so far.
    pub fn received_types(&self) -> Vec<i32> {
        self.state.lock().received.clone()
    }

    /// Runs `on_message` for the next unconsumed arrival, right away if one is
    /// already there.
    pub fn on_next_message<F>(&self, on_message: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.unconsumed > 0 {
            state.unconsumed -= 1;
            drop(state);
            on_message();
        } else {
            state.waiters.push_back(Box::new(on_message));
        }
    }
}

impl MessageTarget for MessageSignal {
    fn handle_message(
        &self,
        message_type: i32,
        _payload: Option<&MessagePayload>,
    ) -> Result<(), PlaybackError> {
        let waiter = {
            let mut state = self.state.lock();
            state.received.push(message_type);
            let waiter = state.waiters.pop_front();
            if waiter.is_none() {
                state.unconsumed += 1;
            }
            waiter
        };
        if let Some(waiter) = waiter {
            waiter();
        }
        Ok(())
    }
}

impl fmt::Debug for MessageSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MessageSignal")
            .field("received", &state.received)
            .field("unconsumed", &state.unconsumed)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}
