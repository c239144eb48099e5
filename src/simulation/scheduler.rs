//! Discrete-event scheduler.
//!
//! A single-threaded, time-ordered queue of deferred actions:
//! - Events are ordered by `(time, insertion sequence)`, so equal-time events run FIFO
//! - Cancellation marks a tombstone in O(1); tombstones are skipped on pop and purged in bulk
//! - Every action receives the scheduler itself and a mutable simulation context
//!
//! Simulated time only moves forward, one event at a time, inside `run_until`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::types::SimTime;
use crate::error::SimError;

/// Deferred call executed when its event fires.
pub type Action<C> = Box<dyn FnOnce(&mut Scheduler<C>, &mut C) -> Result<(), SimError>>;

/// Purge tombstones once they outnumber live events and exceed this count.
const TOMBSTONE_PURGE_THRESHOLD: usize = 1024;

/// Opaque handle returned by `schedule`, used to cancel or query an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    sequence: u64,
    time: SimTime,
}

impl EventHandle {
    /// Time the event is (or was) scheduled to fire at.
    pub fn time(&self) -> SimTime {
        self.time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    time: SimTime,
    sequence: u64,
}

struct PendingEvent<C> {
    action: Option<Action<C>>,
    cancelled: bool,
}

/// Event queue and simulated clock.
pub struct Scheduler<C> {
    now: SimTime,
    next_sequence: u64,
    queue: BinaryHeap<Reverse<EventKey>>,
    events: HashMap<u64, PendingEvent<C>>,
    cancelled_in_queue: usize,
    executed: u64,
    stopped: bool,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Scheduler {
            now: SimTime::ZERO,
            next_sequence: 0,
            queue: BinaryHeap::new(),
            events: HashMap::new(),
            cancelled_in_queue: 0,
            executed: 0,
            stopped: false,
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule `action` to run `delay` after the current time.
    ///
    /// # Parameters
    ///
    /// * `delay` - Non-negative offset from `now()`. Zero runs at the current time,
    ///   after every event already queued for that time.
    /// * `action` - Deferred call receiving the scheduler and the simulation context
    ///
    /// # Returns
    ///
    /// A handle for `cancel`/`is_pending`, or `InvalidArgument` for a negative delay.
    pub fn schedule<F>(&mut self, delay: SimTime, action: F) -> Result<EventHandle, SimError>
    where
        F: FnOnce(&mut Scheduler<C>, &mut C) -> Result<(), SimError> + 'static,
    {
        if delay.is_negative() {
            return Err(SimError::invalid_argument(format!("negative event delay {}", delay)));
        }
        Ok(self.insert(self.now + delay, Box::new(action)))
    }

    /// Schedule `action` at an absolute time not earlier than `now()`.
    pub fn schedule_at<F>(&mut self, time: SimTime, action: F) -> Result<EventHandle, SimError>
    where
        F: FnOnce(&mut Scheduler<C>, &mut C) -> Result<(), SimError> + 'static,
    {
        if time < self.now {
            return Err(SimError::invalid_argument(format!("event time {} is before current time {}", time, self.now)));
        }
        Ok(self.insert(time, Box::new(action)))
    }

    /// Schedule `action` at the current time.
    pub fn schedule_now<F>(&mut self, action: F) -> EventHandle
    where
        F: FnOnce(&mut Scheduler<C>, &mut C) -> Result<(), SimError> + 'static,
    {
        self.insert(self.now, Box::new(action))
    }

    fn insert(&mut self, time: SimTime, action: Action<C>) -> EventHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(Reverse(EventKey { time, sequence }));
        self.events.insert(
            sequence,
            PendingEvent {
                action: Some(action),
                cancelled: false,
            },
        );
        EventHandle { sequence, time }
    }

    /// Cancel a pending event. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        let Some(event) = self.events.get_mut(&handle.sequence) else {
            return false;
        };
        if event.cancelled {
            return false;
        }
        event.cancelled = true;
        event.action = None;
        self.cancelled_in_queue += 1;
        self.purge_tombstones_if_needed();
        true
    }

    fn purge_tombstones_if_needed(&mut self) {
        let live = self.queue.len() - self.cancelled_in_queue;
        if self.cancelled_in_queue < TOMBSTONE_PURGE_THRESHOLD || self.cancelled_in_queue <= live {
            return;
        }
        let events = &mut self.events;
        events.retain(|_, event| !event.cancelled);
        self.queue.retain(|Reverse(key)| events.contains_key(&key.sequence));
        log::debug!("Purged {} cancelled events, {} remain queued", self.cancelled_in_queue, self.queue.len());
        self.cancelled_in_queue = 0;
    }

    /// True while the event is queued and not cancelled.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.events.get(&handle.sequence).is_some_and(|event| !event.cancelled)
    }

    /// Number of live (not cancelled) events in the queue.
    pub fn pending_count(&self) -> usize {
        self.queue.len() - self.cancelled_in_queue
    }

    /// Number of actions executed so far.
    pub fn executed_count(&self) -> u64 {
        self.executed
    }

    /// Time of the earliest live event, if any.
    pub fn next_event_time(&mut self) -> Option<SimTime> {
        self.skip_cancelled_head();
        self.queue.peek().map(|Reverse(key)| key.time)
    }

    fn skip_cancelled_head(&mut self) {
        while let Some(Reverse(key)) = self.queue.peek() {
            let cancelled = self.events.get(&key.sequence).is_none_or(|event| event.cancelled);
            if !cancelled {
                break;
            }
            let sequence = key.sequence;
            self.queue.pop();
            if self.events.remove(&sequence).is_some() {
                self.cancelled_in_queue -= 1;
            }
        }
    }

    /// Ask the running loop to return after the current action.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Run events in `(time, sequence)` order until the queue drains, the next
    /// event is later than `end`, or an action calls `stop()`.
    ///
    /// When the run ends because of `end`, the clock is advanced to `end`.
    /// An action error halts the run and is returned unchanged.
    pub fn run_until(&mut self, ctx: &mut C, end: SimTime) -> Result<(), SimError> {
        self.stopped = false;
        loop {
            if self.stopped {
                log::debug!("Scheduler stopped at {}", self.now);
                return Ok(());
            }
            self.skip_cancelled_head();
            let Some(Reverse(key)) = self.queue.peek().copied() else {
                break;
            };
            if key.time > end {
                break;
            }
            self.queue.pop();
            let action = self.events.remove(&key.sequence).and_then(|event| event.action);
            self.now = key.time;
            if let Some(action) = action {
                self.executed += 1;
                action(self, ctx)?;
            }
        }
        if end != SimTime::MAX && self.now < end {
            self.now = end;
        }
        Ok(())
    }
}
