/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/message/factory.rs
 *
 * Typed constructors for every message variant. All collaborators mint
 * messages through a `MessageFactory` instance instead of spelling out enum
 * literals, which keeps call sites uniform and gives the taxonomy a single
 * place to grow (a new variant means a new `make_*` method, and call sites
 * that need it fail to compile until they are updated).
 *
 * The factory is stateless; constructors return owned values that are then
 * handed over to a queue.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use nalgebra::Quaternion;

use super::{
    Command, CommandPayload, ErrorKind, ErrorMessage, ImuAxis, Message, PinType, SendingMode,
    GLOBAL_SENSOR_INDEX,
};

/// Mints value, command and error messages.
#[derive(Debug, Default)]
pub struct MessageFactory;

impl MessageFactory {
    pub fn new() -> Self {
        Self
    }

    // --- Values ---

    pub fn make_digital_value(&self, index: i32, value: bool, timestamp: u64) -> Message {
        Message::Value(super::Value::Digital {
            index,
            value,
            timestamp,
        })
    }

    pub fn make_analog_value(&self, index: i32, value: i32, timestamp: u64) -> Message {
        Message::Value(super::Value::Analog {
            index,
            value,
            timestamp,
        })
    }

    pub fn make_continuous_value(&self, index: i32, value: f32, timestamp: u64) -> Message {
        Message::Value(super::Value::Continuous {
            index,
            value,
            timestamp,
        })
    }

    pub fn make_imu_value(
        &self,
        index: i32,
        orientation: Quaternion<f32>,
        timestamp: u64,
    ) -> Message {
        Message::Value(super::Value::Imu {
            index,
            orientation,
            timestamp,
        })
    }

    // --- Pin-scoped commands ---

    pub fn make_set_pin_type_command(&self, index: i32, t: PinType, timestamp: u64) -> Command {
        Command::new(index, timestamp, CommandPayload::SetPinType(t))
    }

    pub fn make_set_pin_enabled_command(
        &self,
        index: i32,
        enabled: bool,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SetPinEnabled(enabled))
    }

    pub fn make_set_sending_mode_command(
        &self,
        index: i32,
        mode: SendingMode,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SetSendingMode(mode))
    }

    pub fn make_set_sending_delta_ticks_command(
        &self,
        index: i32,
        ticks: u16,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SetSendingDeltaTicks(ticks))
    }

    pub fn make_set_adc_bit_resolution_command(
        &self,
        index: i32,
        bits: u8,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SetAdcBitResolution(bits))
    }

    pub fn make_set_lowpass_filter_order_command(
        &self,
        index: i32,
        order: u8,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SetLowpassFilterOrder(order))
    }

    pub fn make_set_lowpass_cutoff_command(
        &self,
        index: i32,
        cutoff_hz: f32,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SetLowpassCutoff(cutoff_hz))
    }

    pub fn make_set_slider_threshold_command(
        &self,
        index: i32,
        threshold: u16,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SetSliderThreshold(threshold))
    }

    pub fn make_set_input_scale_range_command(
        &self,
        index: i32,
        min: i32,
        max: i32,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SetInputScaleRange { min, max })
    }

    pub fn make_set_output_scale_range_command(
        &self,
        index: i32,
        min: f32,
        max: f32,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SetOutputScaleRange { min, max })
    }

    pub fn make_set_input_inverted_command(
        &self,
        index: i32,
        inverted: bool,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SetInputInverted(inverted))
    }

    pub fn make_set_imu_axis_output_command(
        &self,
        index: i32,
        axis: ImuAxis,
        output_index: i32,
        timestamp: u64,
    ) -> Command {
        Command::new(
            index,
            timestamp,
            CommandPayload::SetImuAxisOutput { axis, output_index },
        )
    }

    pub fn make_send_digital_pin_value_command(
        &self,
        index: i32,
        value: bool,
        timestamp: u64,
    ) -> Command {
        Command::new(index, timestamp, CommandPayload::SendDigitalPinValue(value))
    }

    // --- Global commands ---

    pub fn make_set_sampling_rate_command(&self, rate_hz: f32, timestamp: u64) -> Command {
        Command::new(
            GLOBAL_SENSOR_INDEX,
            timestamp,
            CommandPayload::SetSamplingRate(rate_hz),
        )
    }

    pub fn make_enable_sending_packets_command(&self, enabled: bool, timestamp: u64) -> Command {
        Command::new(
            GLOBAL_SENSOR_INDEX,
            timestamp,
            CommandPayload::EnableSendingPackets(enabled),
        )
    }

    // --- Errors ---

    pub fn make_error(&self, index: i32, kind: ErrorKind, timestamp: u64) -> Message {
        Message::Error(ErrorMessage::new(index, timestamp, kind))
    }
}
