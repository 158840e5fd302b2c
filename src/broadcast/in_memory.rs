//! In-process broadcast channel. Clones share the same event history, so one
//! clone per simulated node gives a cluster in a single process.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use super::{BroadcastChannel, BroadcastEvent};
use crate::error::TransportError;

/// Events kept before the oldest is dropped.
const DEFAULT_CAPACITY: usize = 256;

struct State {
    events: VecDeque<BroadcastEvent>,
    /// Starts at 1 and moves on every fire.
    index: u64,
    closed: bool,
}

struct Shared {
    capacity: usize,
    state: Mutex<State>,
    changed: Condvar,
}

#[derive(Clone)]
pub struct InMemoryBroadcast {
    shared: Arc<Shared>,
}

impl Default for InMemoryBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroadcast {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Keep at most `capacity` events (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                capacity: capacity.max(1),
                state: Mutex::new(State {
                    events: VecDeque::new(),
                    index: 1,
                    closed: false,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn index(&self) -> u64 {
        self.shared.state.lock().index
    }

    /// Number of events currently retained, across all names.
    pub fn len(&self) -> usize {
        self.shared.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl BroadcastChannel for InMemoryBroadcast {
    fn fire(&self, name: &str, payload: String) -> Result<String, TransportError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }

        let id = Uuid::new_v4().to_string();
        state.events.push_back(BroadcastEvent {
            id: id.clone(),
            name: name.to_string(),
            payload,
        });
        while state.events.len() > self.shared.capacity {
            state.events.pop_front();
        }
        state.index += 1;
        self.shared.changed.notify_all();
        Ok(id)
    }

    fn list(
        &self,
        name: &str,
        wait_index: u64,
        wait: Duration,
    ) -> Result<(Vec<BroadcastEvent>, u64), TransportError> {
        let deadline = Instant::now().checked_add(wait);
        let mut state = self.shared.state.lock();

        loop {
            if state.closed {
                return Err(TransportError::Closed);
            }
            let expired = deadline.is_some_and(|at| Instant::now() >= at);
            if wait_index == 0 || state.index > wait_index || expired {
                let events = state
                    .events
                    .iter()
                    .filter(|event| event.name == name)
                    .cloned()
                    .collect();
                return Ok((events, state.index));
            }

            match deadline {
                Some(at) => {
                    self.shared.changed.wait_until(&mut state, at);
                }
                None => self.shared.changed.wait(&mut state),
            }
        }
    }

    fn close(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        self.shared.changed.notify_all();
    }
}
