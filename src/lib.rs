/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/lib.rs
 *
 * This file is the library entry point for the sensei crate, the sensor
 * gateway daemon bridging a GPIO/IMU controller board with musical control
 * software. It declares the subsystem modules and aggregates their error
 * types into the crate-level `SenseiError`.
 *
 * The architecture is message-driven: the hardware front-end decodes framed
 * packets from the board into typed messages, the event handler drains the
 * shared queue and routes values through the per-pin mapping processor into
 * an output back-end, while configuration commands flow the opposite way,
 * from the config file and the user front-end down to the board.
 *
 * Dependencies:
 *   - log: structured logging facade used by every subsystem.
 *   - thiserror: ergonomic error handling.
 *   - parking_lot, crossbeam-channel: inter-thread plumbing.
 *   - nalgebra: quaternion math for the IMU path.
 *   - serialport: the serial transport at the hardware boundary.
 *   - serde, serde_json: the declarative configuration model.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

// === TOC ===
// 1. Crate-level Documentation & Attributes
// 2. Module Declarations
// 3. Crate Error Type
// 4. Public Prelude
// =============

#![deny(unsafe_code)]

//! # Sensei
//!
//! Sensei ingests raw sensor packets from a microcontroller or FPGA board,
//! applies per-pin signal conditioning (scaling, inversion, filtering,
//! quaternion-to-Euler conversion, sending-mode gating) and forwards the
//! normalized values to an output back-end. Configuration commands from a
//! file or a control surface are applied host-side and relayed down to the
//! hardware over the same framed duplex link the values arrive on.
//!
//! ## Architecture
//!
//! Three threads cooperate through two synchronized queues: the hardware
//! front-end's ingest thread produces decoded messages into the event
//! queue, the event-handler thread drains it and dispatches by message
//! kind, and the front-end's transmit thread drains the to-frontend queue
//! of accepted hardware commands. Mapper state is only ever touched by the
//! event-handler thread, so the mapping layer is lock-free.

use thiserror::Error;

// --- Module Declarations ---

/// Configuration back-end: JSON file to command stream.
pub mod config_backend;
/// The central dispatcher owning all collaborators.
pub mod event_handler;
/// Framed duplex link to the controller board.
pub mod hw_frontend;
/// Per-pin signal conditioning state machines.
pub mod mapping;
/// The internal message taxonomy and its factory.
pub mod message;
/// Downstream value sink contract.
pub mod output_backend;
/// Synchronized FIFO used for all inter-thread handoff.
pub mod sync_queue;
/// User-facing control surface contract.
pub mod user_frontend;

// --- Crate Error Type ---

/// Aggregate of the fatal initialization errors a caller can see.
#[derive(Debug, Error)]
pub enum SenseiError {
    #[error("Configuration error: {0}")]
    Config(#[from] config_backend::ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] hw_frontend::transport::TransportError),
}

// --- Public Prelude ---

pub mod prelude {
    //! A "prelude" for convenient imports of the crate's main types.
    pub use super::event_handler::EventHandler;
    pub use super::hw_frontend::{HwFrontend, HwFrontendConfig, SerialFrontend};
    pub use super::mapping::MappingProcessor;
    pub use super::message::{Command, Message, MessageFactory, Value};
    pub use super::output_backend::OutputBackend;
    pub use super::sync_queue::SynchronizedQueue;
    pub use super::user_frontend::{LoggingUserFrontend, UserFrontend};
    pub use super::SenseiError;
}
