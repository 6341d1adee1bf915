/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/sync_queue.rs
 *
 * A small synchronized FIFO used for all inter-thread message handoff in the
 * gateway: the multi-producer event queue into the event handler, and the
 * single-producer queue of commands destined for the hardware front-end.
 *
 * The queue deliberately keeps blocking and dequeuing separate:
 * `wait_for_data` blocks with a bounded timeout, `pop` is non-blocking.
 * Consumers loop over `wait_for_data` + `pop` and check their stop flag in
 * between, which is how cooperative cancellation works everywhere in this
 * codebase. `wait_for_data` returning `true` guarantees a message is present
 * at that instant; with a single consumer (the only configuration used here)
 * the following `pop` returns it.
 *
 * Dependencies:
 *   - parking_lot: Mutex/Condvar without poisoning semantics.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Synchronized multi-producer FIFO with bounded blocking waits.
#[derive(Debug, Default)]
pub struct SynchronizedQueue<T> {
    inner: Mutex<VecDeque<T>>,
    data_ready: Condvar,
}

impl<T> SynchronizedQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            data_ready: Condvar::new(),
        }
    }

    /// Appends a message and wakes every blocked consumer.
    pub fn push(&self, item: T) {
        let mut queue = self.inner.lock();
        queue.push_back(item);
        self.data_ready.notify_all();
    }

    /// Non-blocking dequeue.
    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Discards all queued messages.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Blocks until a message is available or `timeout` has elapsed.
    ///
    /// Returns `true` if the queue was non-empty when the call returned.
    /// Returns on deadline expiry regardless of readiness, so callers can
    /// poll their stop flag at a bounded interval.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.lock();
        while queue.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            // Condvar waits can wake spuriously; re-check against the deadline.
            let result = self.data_ready.wait_for(&mut queue, deadline - now);
            if result.timed_out() && queue.is_empty() {
                return false;
            }
        }
        true
    }
}
