use uuid::Uuid;

use crate::{error::PlayerError, player::RepeatMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaItemId(Uuid);

impl MediaItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MediaItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MediaItemId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// A playable item of known duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: MediaItemId,
    pub duration_ms: u64,
}

impl MediaItem {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            id: MediaItemId::new(),
            duration_ms,
        }
    }

    /// `count` items of the same duration.
    pub fn many(count: usize, duration_ms: u64) -> Vec<Self> {
        (0..count).map(|_| Self::new(duration_ms)).collect()
    }
}

/// Snapshot of the playlist as seen by the player.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Timeline {
    items: Vec<MediaItem>,
}

impl Timeline {
    pub fn new(items: Vec<MediaItem>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&MediaItem> {
        self.items.get(index)
    }

    pub fn duration_ms(&self, index: usize) -> Option<u64> {
        self.item(index).map(|item| item.duration_ms)
    }

    pub fn first_index(&self, shuffle: Option<&ShuffleOrder>) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        match shuffle {
            Some(order) => order.first(),
            None => Some(0),
        }
    }

    fn last_index(&self, shuffle: Option<&ShuffleOrder>) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        match shuffle {
            Some(order) => order.last(),
            None => Some(self.len() - 1),
        }
    }

    /// Item that follows `index` when playback runs off its end.
    pub fn next_index(
        &self,
        index: usize,
        repeat_mode: RepeatMode,
        shuffle: Option<&ShuffleOrder>,
    ) -> Option<usize> {
        if index >= self.len() {
            return None;
        }
        if repeat_mode == RepeatMode::One {
            return Some(index);
        }
        let next = match shuffle {
            Some(order) => order.next(index),
            None => (index + 1 < self.len()).then_some(index + 1),
        };
        match (next, repeat_mode) {
            (Some(next), _) => Some(next),
            (None, RepeatMode::All) => self.first_index(shuffle),
            (None, _) => None,
        }
    }

    pub fn previous_index(
        &self,
        index: usize,
        repeat_mode: RepeatMode,
        shuffle: Option<&ShuffleOrder>,
    ) -> Option<usize> {
        if index >= self.len() {
            return None;
        }
        if repeat_mode == RepeatMode::One {
            return Some(index);
        }
        let previous = match shuffle {
            Some(order) => order.previous(index),
            None => index.checked_sub(1),
        };
        match (previous, repeat_mode) {
            (Some(previous), _) => Some(previous),
            (None, RepeatMode::All) => self.last_index(shuffle),
            (None, _) => None,
        }
    }
}

/// Play order of item indices while shuffle mode is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffleOrder {
    /// item index at each shuffled position
    order: Vec<usize>,
}

impl ShuffleOrder {
    /// Fails unless `order` is a permutation of `0..order.len()`.
    pub fn new(order: Vec<usize>) -> Result<Self, PlayerError> {
        let mut seen = vec![false; order.len()];
        for &index in &order {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(PlayerError::InvalidShuffleOrder(format!(
                        "index {index} appears twice"
                    )));
                }
                None => {
                    return Err(PlayerError::InvalidShuffleOrder(format!(
                        "index {index} out of range for length {}",
                        order.len()
                    )));
                }
            }
        }
        Ok(Self { order })
    }

    pub fn identity(len: usize) -> Self {
        Self {
            order: (0..len).collect(),
        }
    }

    /// Last item first. Deterministic default for fakes.
    pub fn reversed(len: usize) -> Self {
        Self {
            order: (0..len).rev().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn first(&self) -> Option<usize> {
        self.order.first().copied()
    }

    pub fn last(&self) -> Option<usize> {
        self.order.last().copied()
    }

    pub fn next(&self, index: usize) -> Option<usize> {
        let position = self.position_of(index)?;
        self.order.get(position + 1).copied()
    }

    pub fn previous(&self, index: usize) -> Option<usize> {
        let position = self.position_of(index)?;
        position
            .checked_sub(1)
            .and_then(|previous| self.order.get(previous).copied())
    }

    fn position_of(&self, index: usize) -> Option<usize> {
        self.order.iter().position(|&candidate| candidate == index)
    }
}
