/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/hw_frontend/packet_factory.rs
 *
 * Serializes accepted configuration commands into wire frames. The factory
 * owns the outgoing sequence counter: every produced frame gets the next
 * sequence number as its wire timestamp, which makes the frame UUID
 * (timestamp | cmd | sub_cmd) unique for the lifetime of an outstanding
 * transmission and lets the ack tracker pair responses.
 *
 * Commands whose destination is purely host-internal (scale ranges,
 * inversion, IMU routing) produce no frames.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use crate::message::{Command, CommandPayload, PinType, SendingMode};

use super::protocol::{
    ConfigParameter, PinConfigurationPayload, SenseiCmd, SenseiFrame, ValuePayload,
};

// --- Wire encodings of the enum parameters ---

pub fn wire_pin_type(pin_type: PinType) -> u8 {
    match pin_type {
        PinType::Disabled => 0,
        PinType::DigitalInput => 1,
        PinType::AnalogInput => 2,
        PinType::ImuInput => 3,
    }
}

pub fn wire_sending_mode(mode: SendingMode) -> u8 {
    match mode {
        SendingMode::Off => 0,
        SendingMode::Continuous => 1,
        SendingMode::OnValueChanged => 2,
        SendingMode::OnPress => 3,
        SendingMode::OnRelease => 4,
        SendingMode::Toggle => 5,
    }
}

/// Builds wire frames out of commands, stamping each with a fresh sequence
/// number.
#[derive(Debug)]
pub struct PacketFactory {
    sequence: u32,
}

impl PacketFactory {
    pub fn new() -> Self {
        Self { sequence: 0 }
    }

    fn next_sequence(&mut self) -> u32 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    /// Serializes one command into its wire frames. Host-internal commands
    /// yield an empty vector. All current payloads fit a single frame; the
    /// continuation mechanism exists for payloads that do not.
    pub fn make_frames(&mut self, cmd: &Command) -> Vec<SenseiFrame> {
        let index = cmd.index();
        match *cmd.payload() {
            CommandPayload::SetPinType(pin_type) => {
                vec![self.configure_pin_frame(index, ConfigParameter::PinType, |p| {
                    p.pin_type = wire_pin_type(pin_type);
                })]
            }
            CommandPayload::SetPinEnabled(enabled) => {
                vec![self.configure_pin_frame(index, ConfigParameter::PinEnabled, |p| {
                    p.pin_enabled = enabled as u8;
                })]
            }
            CommandPayload::SetSendingMode(mode) => {
                vec![self.configure_pin_frame(index, ConfigParameter::SendingMode, |p| {
                    p.sending_mode = wire_sending_mode(mode);
                })]
            }
            CommandPayload::SetSendingDeltaTicks(ticks) => {
                vec![self.configure_pin_frame(index, ConfigParameter::DeltaTicks, |p| {
                    p.delta_ticks = ticks;
                })]
            }
            CommandPayload::SetAdcBitResolution(bits) => {
                vec![self.configure_pin_frame(index, ConfigParameter::AdcBitResolution, |p| {
                    p.adc_bits = bits;
                })]
            }
            CommandPayload::SetLowpassFilterOrder(order) => {
                vec![self.configure_pin_frame(index, ConfigParameter::LowpassFilterOrder, |p| {
                    p.filter_order = order;
                })]
            }
            CommandPayload::SetLowpassCutoff(cutoff_hz) => {
                vec![self.configure_pin_frame(index, ConfigParameter::LowpassCutoff, |p| {
                    p.lowpass_cutoff = cutoff_hz;
                })]
            }
            CommandPayload::SetSliderThreshold(threshold) => {
                vec![self.configure_pin_frame(index, ConfigParameter::SliderThreshold, |p| {
                    p.slider_threshold = threshold;
                })]
            }
            CommandPayload::SendDigitalPinValue(value) => {
                let mut frame = SenseiFrame::new(
                    SenseiCmd::SetDigitalOutput as u8,
                    0,
                    self.next_sequence(),
                );
                ValuePayload {
                    pin_id: index as u16,
                    value: value as u16,
                    pin_type: wire_pin_type(PinType::DigitalInput),
                }
                .write_to(&mut frame.payload);
                vec![frame]
            }
            CommandPayload::SetSamplingRate(rate_hz) => {
                let mut frame =
                    SenseiFrame::new(SenseiCmd::SetSamplingRate as u8, 0, self.next_sequence());
                frame.payload[0..4].copy_from_slice(&rate_hz.to_le_bytes());
                vec![frame]
            }
            CommandPayload::EnableSendingPackets(enabled) => {
                let mut frame = SenseiFrame::new(
                    SenseiCmd::EnableSendingPackets as u8,
                    0,
                    self.next_sequence(),
                );
                frame.payload[0] = enabled as u8;
                vec![frame]
            }
            CommandPayload::SetInputScaleRange { .. }
            | CommandPayload::SetOutputScaleRange { .. }
            | CommandPayload::SetInputInverted(_)
            | CommandPayload::SetImuAxisOutput { .. } => Vec::new(),
        }
    }

    /// Query frame asking the board to push the current value of every pin,
    /// sent after every (re)connection.
    pub fn make_get_all_values_frame(&mut self) -> SenseiFrame {
        SenseiFrame::new(SenseiCmd::GetAllValues as u8, 0, self.next_sequence())
    }

    fn configure_pin_frame<F>(
        &mut self,
        index: i32,
        parameter: ConfigParameter,
        fill: F,
    ) -> SenseiFrame
    where
        F: FnOnce(&mut PinConfigurationPayload),
    {
        let mut config = PinConfigurationPayload {
            pin_index: index as u16,
            ..Default::default()
        };
        fill(&mut config);
        let mut frame = SenseiFrame::new(
            SenseiCmd::ConfigurePin as u8,
            parameter as u8,
            self.next_sequence(),
        );
        config.write_to(&mut frame.payload);
        frame
    }
}

impl Default for PacketFactory {
    fn default() -> Self {
        Self::new()
    }
}
