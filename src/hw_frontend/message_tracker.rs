/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/hw_frontend/message_tracker.rs
 *
 * Bookkeeping for packets awaiting acknowledgement. Each transmitted frame
 * is logged under its UUID; an incoming ack removes the entry. Entries older
 * than the ack timeout are handed back for retransmission until the retry
 * budget is spent, after which they are expired and surfaced as a timeout
 * error. The set therefore only ever contains packets transmitted within
 * the last timeout window.
 *
 * The tracker itself is not thread-safe; the front-end wraps it in a mutex
 * shared between its ingest and transmit threads.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;

use super::protocol::SenseiFrame;

#[derive(Debug)]
struct TrackedEntry {
    frame: SenseiFrame,
    sent_at: Instant,
    retries: u32,
}

/// Outstanding-ack set with retry/timeout discipline.
#[derive(Debug)]
pub struct MessageTracker {
    entries: HashMap<u64, TrackedEntry>,
    ack_timeout: Duration,
    max_retries: u32,
}

impl MessageTracker {
    pub fn new(ack_timeout: Duration, max_retries: u32) -> Self {
        Self {
            entries: HashMap::new(),
            ack_timeout,
            max_retries,
        }
    }

    /// Records a transmission (or retransmission) at `now`.
    pub fn log_transmission(&mut self, frame: &SenseiFrame, now: Instant) {
        self.entries.insert(
            frame.uuid(),
            TrackedEntry {
                frame: frame.clone(),
                sent_at: now,
                retries: 0,
            },
        );
    }

    /// Removes the matching entry. Returns `false` for unsolicited acks.
    pub fn acknowledge(&mut self, uuid: u64) -> bool {
        let known = self.entries.remove(&uuid).is_some();
        if !known {
            debug!("Ack for unknown uuid {:#x}", uuid);
        }
        known
    }

    /// Splits entries older than the timeout into frames to retransmit (and
    /// re-arms them) and frames whose retry budget is spent (removed).
    pub fn timed_out(&mut self, now: Instant) -> (Vec<SenseiFrame>, Vec<SenseiFrame>) {
        let mut retransmit = Vec::new();
        let mut expired = Vec::new();
        let ack_timeout = self.ack_timeout;
        let max_retries = self.max_retries;

        self.entries.retain(|_, entry| {
            if now.duration_since(entry.sent_at) < ack_timeout {
                return true;
            }
            if entry.retries < max_retries {
                entry.retries += 1;
                entry.sent_at = now;
                retransmit.push(entry.frame.clone());
                true
            } else {
                expired.push(entry.frame.clone());
                false
            }
        });
        (retransmit, expired)
    }

    pub fn outstanding(&self) -> usize {
        self.entries.len()
    }
}
