//! Bounded, non-blocking event queue.
//!
//! Producers never block. At capacity only Progress events are sacrificed:
//! an incoming Progress replaces a trailing Progress or evicts the oldest
//! queued one, and anything else evicts the oldest Progress or grows the
//! queue past capacity.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::event::Event;

/// FIFO of events for one controller
#[derive(Debug)]
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    capacity: usize,
    coalesced: AtomicU64,
}

impl EventQueue {
    /// Create a queue that starts coalescing at `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
            coalesced: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event. Never blocks on the consumer.
    pub fn push(&self, event: Event) {
        let mut events = self.lock();
        if events.len() < self.capacity {
            events.push_back(event);
            return;
        }

        if event.is_progress() {
            if let Some(last) = events.back_mut() {
                if last.is_progress() {
                    *last = event;
                    self.note_coalesced();
                    return;
                }
            }
            match events.iter().position(Event::is_progress) {
                Some(oldest) => {
                    events.remove(oldest);
                    events.push_back(event);
                }
                None => trace!("Dropping progress event, queue full"),
            }
            self.note_coalesced();
        } else {
            if let Some(oldest) = events.iter().position(Event::is_progress) {
                events.remove(oldest);
                self.note_coalesced();
            }
            events.push_back(event);
        }
    }

    fn note_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the oldest event
    pub fn poll(&self) -> Option<Event> {
        self.lock().pop_front()
    }

    /// Queued events
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Progress events replaced or dropped so far
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;

    fn progress(n: u64) -> Event {
        Event {
            timestamp_ms: n,
            payload: EventPayload::Progress {
                bytes_transferred: n,
                total_bytes: 100,
            },
        }
    }

    fn connecting(n: u64) -> Event {
        Event {
            timestamp_ms: n,
            payload: EventPayload::PeerConnecting {
                target: format!("peer {n}"),
            },
        }
    }

    fn drain(queue: &EventQueue) -> Vec<Event> {
        std::iter::from_fn(|| queue.poll()).collect()
    }

    #[test]
    fn test_fifo_under_capacity() {
        let queue = EventQueue::new(8);
        queue.push(connecting(1));
        queue.push(progress(2));
        queue.push(connecting(3));
        assert_eq!(queue.len(), 3);
        assert_eq!(drain(&queue), vec![connecting(1), progress(2), connecting(3)]);
        assert!(queue.poll().is_none());
    }

    #[test]
    fn test_progress_replaces_trailing_progress() {
        let queue = EventQueue::new(2);
        queue.push(connecting(1));
        queue.push(progress(2));
        queue.push(progress(3));
        assert_eq!(drain(&queue), vec![connecting(1), progress(3)]);
        assert_eq!(queue.coalesced(), 1);
    }

    #[test]
    fn test_progress_evicts_oldest_progress() {
        let queue = EventQueue::new(3);
        queue.push(progress(1));
        queue.push(connecting(2));
        queue.push(connecting(3));
        queue.push(progress(4));
        assert_eq!(drain(&queue), vec![connecting(2), connecting(3), progress(4)]);
    }

    #[test]
    fn test_progress_dropped_when_no_progress_queued() {
        let queue = EventQueue::new(2);
        queue.push(connecting(1));
        queue.push(connecting(2));
        queue.push(progress(3));
        assert_eq!(drain(&queue), vec![connecting(1), connecting(2)]);
    }

    #[test]
    fn test_critical_event_never_dropped() {
        let queue = EventQueue::new(2);
        queue.push(progress(1));
        queue.push(connecting(2));
        queue.push(connecting(3));
        queue.push(connecting(4));
        assert_eq!(queue.len(), 3);
        assert_eq!(
            drain(&queue),
            vec![connecting(2), connecting(3), connecting(4)]
        );
    }
}
