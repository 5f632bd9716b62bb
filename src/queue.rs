use std::collections::VecDeque;
use tracing::warn;
use crate::{
    error::{PlayerError, PlayerResult},
    model::{locator::Locator, playback::LoopMode},
};

/// FIFO queue of pending track locators with a fixed capacity bound.
/// Insertion order is play order; there is no priority or preemption.
pub struct TrackQueue {
    items: VecDeque<Locator>,
    limit: usize,
}

impl TrackQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            items: VecDeque::new(),
            limit,
        }
    }

    /// Appends a locator, returning its 1-based queue position. A full queue
    /// rejects the locator and is left unchanged.
    pub fn enqueue(&mut self, locator: Locator) -> PlayerResult<usize> {
        if self.items.len() >= self.limit {
            return Err(PlayerError::QueueFull(self.limit));
        }

        self.items.push_back(locator);

        Ok(self.items.len())
    }

    /// Pops the head of the queue.
    pub fn dequeue_next(&mut self) -> Option<Locator> {
        self.items.pop_front()
    }

    /// Reinserts a finished track according to the loop mode. Called exactly
    /// once per completed track, before the next dequeue.
    pub fn requeue_on_completion(&mut self, finished: Locator, mode: LoopMode) {
        match mode {
            LoopMode::Off => {}
            LoopMode::RepeatTrack => {
                if self.items.len() >= self.limit {
                    warn!("Queue full, dropping repeat of {}", finished.as_str());
                } else {
                    self.items.push_front(finished);
                }
            }
            LoopMode::RepeatQueue => {
                if self.items.len() >= self.limit {
                    warn!("Queue full, dropping requeue of {}", finished.as_str());
                } else {
                    self.items.push_back(finished);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
