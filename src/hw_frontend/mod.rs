/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/hw_frontend/mod.rs
 *
 * The hardware front-end: everything between the duplex link to the
 * controller board and the internal message queues. The submodules split
 * the work the way the wire does — frame layout (`protocol`), command
 * serialization (`packet_factory`), ack bookkeeping (`message_tracker`),
 * link management (`transport`) and the two-thread state machine gluing
 * them together (`serial_frontend`).
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::time::Duration;

pub mod message_tracker;
pub mod packet_factory;
pub mod protocol;
pub mod serial_frontend;
pub mod transport;

pub use serial_frontend::SerialFrontend;

/// Bound on every blocking transport read and queue wait inside the
/// front-end, so stop requests are observed promptly.
pub const READ_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Tunables of the front-end. The retry discipline defaults are a
/// compromise between board reboot time and command latency; both are
/// exposed through the daemon configuration.
#[derive(Debug, Clone)]
pub struct HwFrontendConfig {
    pub ack_timeout: Duration,
    pub max_retries: u32,
    pub verify_acks: bool,
    pub read_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for HwFrontendConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            verify_acks: true,
            read_timeout: READ_WRITE_TIMEOUT,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(3200),
        }
    }
}

/// Lifecycle of the front-end's worker threads, polled between suspension
/// points for cooperative cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
}

impl ThreadState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Observable state of the link to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Stopping = 3,
    Stopped = 4,
}

impl ConnectionState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// The front-end contract the event handler drives.
pub trait HwFrontend: Send {
    /// True while the link to the board is up.
    fn connected(&self) -> bool;

    /// Starts the ingest and transmit threads.
    fn run(&mut self);

    /// Stops both threads and joins them.
    fn stop(&mut self);

    /// Silently drops verified incoming frames. Decoding still happens, so
    /// counters keep advancing while muted.
    fn mute(&mut self, enabled: bool);

    /// Toggles the ack tracking and retransmission discipline.
    fn verify_acks(&mut self, enabled: bool);

    fn connection_state(&self) -> ConnectionState;

    /// Count of discarded corrupt or unintelligible frames.
    fn frame_errors(&self) -> u64;
}
