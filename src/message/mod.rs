/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/message/mod.rs
 *
 * This file defines the internal message taxonomy of the gateway. Every piece
 * of information that moves between the hardware front-end, the mapping
 * processor, the configuration back-end and the user front-end is one of
 * three message kinds: a sensor `Value`, a configuration `Command`, or an
 * `ErrorMessage`. Messages are plain owned values; ownership transfers
 * through the queues and the receiver consumes and discards them.
 *
 * Dispatch is done by exhaustive pattern matching on the variant tags. No
 * runtime type queries are needed beyond the `MessageType` discriminator.
 *
 * Dependencies:
 *   - nalgebra: Quaternion type for IMU value payloads.
 *   - crate::hw_frontend::protocol: status codes reported by the board.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use nalgebra::Quaternion;

use crate::hw_frontend::protocol::StatusCode;

pub mod factory;

pub use factory::MessageFactory;

/// Sensor index used by commands that apply to the whole board rather than
/// a single pin.
pub const GLOBAL_SENSOR_INDEX: i32 = -1;

/// Top-level message discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Value,
    Command,
    Error,
}

/// The hardware pin classes a mapper slot can be configured as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinType {
    DigitalInput,
    AnalogInput,
    ImuInput,
    /// Clears the slot; values arriving for it are dropped.
    Disabled,
}

/// Per-pin policy deciding when a processed value is emitted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendingMode {
    Off,
    Continuous,
    OnValueChanged,
    OnPress,
    OnRelease,
    Toggle,
}

/// The three virtual channels an IMU slot can route to output indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuAxis {
    Yaw,
    Pitch,
    Roll,
}

/// A raw or mapped sensor reading. Raw values enter at hardware precision;
/// mappers emit values at their declared semantic range.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Digital {
        index: i32,
        value: bool,
        timestamp: u64,
    },
    Analog {
        index: i32,
        value: i32,
        timestamp: u64,
    },
    Continuous {
        index: i32,
        value: f32,
        timestamp: u64,
    },
    /// A full orientation sample from the IMU, arriving in one packet. The
    /// IMU mapper fans this out into per-axis continuous values.
    Imu {
        index: i32,
        orientation: Quaternion<f32>,
        timestamp: u64,
    },
}

impl Value {
    pub fn index(&self) -> i32 {
        match self {
            Value::Digital { index, .. }
            | Value::Analog { index, .. }
            | Value::Continuous { index, .. }
            | Value::Imu { index, .. } => *index,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Value::Digital { timestamp, .. }
            | Value::Analog { timestamp, .. }
            | Value::Continuous { timestamp, .. }
            | Value::Imu { timestamp, .. } => *timestamp,
        }
    }
}

/// Where a command has to be applied once accepted.
///
/// `Internal` commands only mutate host-side mapper state, `HardwareFrontend`
/// commands are pure board parameters, and `Both` commands configure the
/// mapper and are then re-serialized for the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDestination {
    Internal,
    HardwareFrontend,
    Both,
}

impl CommandDestination {
    pub fn includes_hardware(&self) -> bool {
        matches!(self, CommandDestination::HardwareFrontend | CommandDestination::Both)
    }

    pub fn includes_internal(&self) -> bool {
        matches!(self, CommandDestination::Internal | CommandDestination::Both)
    }
}

/// The typed payload of a configuration command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    /// Establishes which mapper occupies a slot, replacing any prior one.
    SetPinType(PinType),
    SetPinEnabled(bool),
    SetSendingMode(SendingMode),
    /// Sample-rate decimation: one value accepted per `delta_ticks` samples.
    SetSendingDeltaTicks(u16),
    SetAdcBitResolution(u8),
    SetLowpassFilterOrder(u8),
    /// Cutoff in Hz, relative to the pin's effective sample rate.
    SetLowpassCutoff(f32),
    SetSliderThreshold(u16),
    SetInputScaleRange { min: i32, max: i32 },
    /// Semantic range of the values the mapper emits downstream.
    SetOutputScaleRange { min: f32, max: f32 },
    SetInputInverted(bool),
    /// Routes one IMU axis of this slot to a distinct output index.
    SetImuAxisOutput { axis: ImuAxis, output_index: i32 },
    /// Drives a digital output pin on the board.
    SendDigitalPinValue(bool),
    /// Global: board sampling rate in Hz.
    SetSamplingRate(f32),
    /// Global: master switch for value packets from the board.
    EnableSendingPackets(bool),
}

impl CommandPayload {
    /// The forwarding policy for this payload, applied by the event handler
    /// after a successful `apply_command`.
    pub fn destination(&self) -> CommandDestination {
        use CommandPayload::*;
        match self {
            SetPinType(_)
            | SetPinEnabled(_)
            | SetSendingMode(_)
            | SetSendingDeltaTicks(_)
            | SetAdcBitResolution(_)
            | SetLowpassFilterOrder(_)
            | SetLowpassCutoff(_)
            | SetSliderThreshold(_)
            | SetSamplingRate(_) => CommandDestination::Both,
            SetInputScaleRange { .. }
            | SetOutputScaleRange { .. }
            | SetInputInverted(_)
            | SetImuAxisOutput { .. } => CommandDestination::Internal,
            SendDigitalPinValue(_) | EnableSendingPackets(_) => {
                CommandDestination::HardwareFrontend
            }
        }
    }
}

/// A configuration command, scoped to one pin or global.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    sensor_index: i32,
    timestamp: u64,
    payload: CommandPayload,
}

impl Command {
    pub fn new(sensor_index: i32, timestamp: u64, payload: CommandPayload) -> Self {
        Self {
            sensor_index,
            timestamp,
            payload,
        }
    }

    pub fn index(&self) -> i32 {
        self.sensor_index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn payload(&self) -> &CommandPayload {
        &self.payload
    }

    pub fn destination(&self) -> CommandDestination {
        self.payload.destination()
    }

    /// True for commands that address the board as a whole.
    pub fn is_global(&self) -> bool {
        matches!(
            self.payload,
            CommandPayload::SetSamplingRate(_) | CommandPayload::EnableSendingPackets(_)
        )
    }
}

/// Result of applying a command to the mapping processor or a single mapper.
///
/// Errors are returned synchronously as enum values, never as panics; the
/// event handler turns them into `ErrorMessage`s for the user front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorCode {
    Ok,
    InvalidPinIndex,
    UninitializedPin,
    InvalidValue,
    UnhandledCommandForSensorType,
    InvalidSamplingRate,
}

impl CommandErrorCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, CommandErrorCode::Ok)
    }
}

/// The error classes surfaced to the event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidPinIndex,
    UninitializedPin,
    InvalidValue,
    UnhandledCommandForSensorType,
    TransportFraming,
    CrcMismatch,
    AckTimeout,
    TransportDisconnected,
    /// An error code reported by the board itself in an ack packet.
    HardwareReported(StatusCode),
}

impl ErrorKind {
    /// Hardware-origin errors at warning severity or above are forwarded to
    /// the user front-end instead of only being logged.
    pub fn is_warning_or_worse(&self) -> bool {
        !matches!(self, ErrorKind::HardwareReported(StatusCode::Ok))
    }
}

/// An error event, scoped to the pin it relates to (or global).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    sensor_index: i32,
    timestamp: u64,
    kind: ErrorKind,
}

impl ErrorMessage {
    pub fn new(sensor_index: i32, timestamp: u64, kind: ErrorKind) -> Self {
        Self {
            sensor_index,
            timestamp,
            kind,
        }
    }

    pub fn index(&self) -> i32 {
        self.sensor_index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// The tagged union moving through the event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Value(Value),
    Command(Command),
    Error(ErrorMessage),
}

impl Message {
    pub fn base_type(&self) -> MessageType {
        match self {
            Message::Value(_) => MessageType::Value,
            Message::Command(_) => MessageType::Command,
            Message::Error(_) => MessageType::Error,
        }
    }

    pub fn sensor_index(&self) -> i32 {
        match self {
            Message::Value(v) => v.index(),
            Message::Command(c) => c.index(),
            Message::Error(e) => e.index(),
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Message::Value(v) => v.timestamp(),
            Message::Command(c) => c.timestamp(),
            Message::Error(e) => e.timestamp(),
        }
    }
}
