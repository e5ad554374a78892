use std::collections::BTreeSet;

use parking_lot::Mutex;

/// Enables or disables whole renderers of the player.
pub trait TrackSelector
where
    Self: Send + Sync,
{
    fn set_renderer_disabled(&self, renderer_index: usize, disabled: bool);
    fn is_renderer_disabled(&self, renderer_index: usize) -> bool;
}

/// Track selector that only remembers the flags it was given.
#[derive(Debug, Default)]
pub struct FakeTrackSelector {
    disabled: Mutex<BTreeSet<usize>>,
    changes: Mutex<Vec<(usize, bool)>>,
}

impl FakeTrackSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(renderer_index, disabled)` call in order.
    pub fn changes(&self) -> Vec<(usize, bool)> {
        self.changes.lock().clone()
    }

    pub fn disabled_renderers(&self) -> Vec<usize> {
        self.disabled.lock().iter().copied().collect()
    }
}

impl TrackSelector for FakeTrackSelector {
    fn set_renderer_disabled(&self, renderer_index: usize, disabled: bool) {
        {
            let mut set = self.disabled.lock();
            if disabled {
                set.insert(renderer_index);
            } else {
                set.remove(&renderer_index);
            }
        }
        self.changes.lock().push((renderer_index, disabled));
        log::debug!("renderer {renderer_index} disabled={disabled}");
    }

    fn is_renderer_disabled(&self, renderer_index: usize) -> bool {
        self.disabled.lock().contains(&renderer_index)
    }
}
