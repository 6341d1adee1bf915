/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/mapping/mod.rs
 *
 * Per-pin signal conditioning. Every configured pin owns one sensor mapper,
 * a small state machine that consumes raw hardware values and decides what,
 * if anything, to emit to the output back-end. The three mapper kinds
 * (digital, analog, IMU) share a common parameter block and a common
 * capability set expressed as the `SensorMapper` trait; the
 * `MappingProcessor` owns the indexed registry of mapper slots.
 *
 * Mappers are only ever touched from the event-handler thread, so none of
 * this module takes locks.
 *
 * Dependencies:
 *   - log: error/debug reporting on dropped values.
 *   - crate::message: command and value taxonomy.
 *   - crate::output_backend: the sink mappers emit into.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use crate::message::{Command, CommandErrorCode, CommandPayload, PinType, SendingMode, Value};
use crate::output_backend::OutputBackend;

pub mod analog_mapper;
pub mod digital_mapper;
pub mod imu_mapper;
pub mod processor;

pub use analog_mapper::AnalogSensorMapper;
pub use digital_mapper::DigitalSensorMapper;
pub use imu_mapper::ImuMapper;
pub use processor::MappingProcessor;

/// Capability set shared by all mapper kinds.
pub trait SensorMapper: Send {
    /// Mutates configuration. Never panics; rejected commands are reported
    /// through the returned error code and leave the mapper untouched.
    fn apply_command(&mut self, cmd: &Command) -> CommandErrorCode;

    /// Consumes one raw value, emitting zero or more mapped values into
    /// `backend` depending on sending-mode gating and decimation.
    fn process(&mut self, value: &Value, backend: &mut dyn OutputBackend);

    /// Re-emits the current configuration as a command sequence. Replaying
    /// the sequence onto a fresh processor reproduces this mapper.
    fn put_config_commands_into(&self, out: &mut Vec<Command>);

    fn pin_type(&self) -> PinType;
}

/// Configuration shared by every mapper kind.
///
/// `invalid` marks a mapper whose parameter combination cannot currently be
/// realized (e.g. a low-pass cutoff at or above the effective Nyquist rate);
/// such a mapper consumes values without emitting until reconfigured.
#[derive(Debug, Clone)]
pub struct MapperParameters {
    pub sensor_index: i32,
    pub enabled: bool,
    pub sending_mode: SendingMode,
    pub delta_ticks: u16,
    pub inverted: bool,
    pub invalid: bool,
    decimation_counter: u16,
}

impl MapperParameters {
    pub fn new(sensor_index: i32) -> Self {
        Self {
            sensor_index,
            enabled: true,
            sending_mode: SendingMode::OnValueChanged,
            delta_ticks: 1,
            inverted: false,
            invalid: false,
            decimation_counter: 0,
        }
    }

    /// Handles the commands every mapper understands. Returns `None` when the
    /// payload is not a common parameter and the caller has to dispatch it.
    pub fn apply_common_command(&mut self, cmd: &Command) -> Option<CommandErrorCode> {
        match cmd.payload() {
            CommandPayload::SetPinEnabled(enabled) => {
                self.enabled = *enabled;
                Some(CommandErrorCode::Ok)
            }
            CommandPayload::SetSendingMode(mode) => {
                self.sending_mode = *mode;
                Some(CommandErrorCode::Ok)
            }
            CommandPayload::SetSendingDeltaTicks(ticks) => {
                if *ticks == 0 {
                    return Some(CommandErrorCode::InvalidValue);
                }
                self.delta_ticks = *ticks;
                self.decimation_counter = 0;
                Some(CommandErrorCode::Ok)
            }
            CommandPayload::SetInputInverted(inverted) => {
                self.inverted = *inverted;
                Some(CommandErrorCode::Ok)
            }
            _ => None,
        }
    }

    /// Decimation gate for `Continuous` mode: accepts every `delta_ticks`-th
    /// sample. Edge- and threshold-triggered modes bypass this and see every
    /// sample.
    pub fn accept_continuous_sample(&mut self) -> bool {
        self.decimation_counter += 1;
        if self.decimation_counter >= self.delta_ticks {
            self.decimation_counter = 0;
            true
        } else {
            false
        }
    }

    /// True when the mapper should consume values without emitting.
    pub fn gated_off(&self) -> bool {
        !self.enabled || self.invalid || self.sending_mode == SendingMode::Off
    }

    /// Emits the common parameters (everything except the pin type, which the
    /// concrete mapper emits first).
    pub fn put_config_commands_into(&self, out: &mut Vec<Command>) {
        use crate::message::MessageFactory;
        let factory = MessageFactory::new();
        out.push(factory.make_set_pin_enabled_command(self.sensor_index, self.enabled, 0));
        out.push(factory.make_set_sending_mode_command(self.sensor_index, self.sending_mode, 0));
        out.push(factory.make_set_sending_delta_ticks_command(
            self.sensor_index,
            self.delta_ticks,
            0,
        ));
        out.push(factory.make_set_input_inverted_command(self.sensor_index, self.inverted, 0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageFactory;

    #[test]
    fn test_common_commands_are_recognized() {
        let factory = MessageFactory::new();
        let mut params = MapperParameters::new(4);

        let cmd = factory.make_set_sending_mode_command(4, SendingMode::Continuous, 0);
        assert_eq!(params.apply_common_command(&cmd), Some(CommandErrorCode::Ok));
        assert_eq!(params.sending_mode, SendingMode::Continuous);

        let cmd = factory.make_set_pin_enabled_command(4, false, 0);
        assert_eq!(params.apply_common_command(&cmd), Some(CommandErrorCode::Ok));
        assert!(!params.enabled);

        let cmd = factory.make_set_lowpass_cutoff_command(4, 100.0, 0);
        assert_eq!(params.apply_common_command(&cmd), None);
    }

    #[test]
    fn test_zero_delta_ticks_is_rejected() {
        let factory = MessageFactory::new();
        let mut params = MapperParameters::new(0);
        let cmd = factory.make_set_sending_delta_ticks_command(0, 0, 0);
        assert_eq!(
            params.apply_common_command(&cmd),
            Some(CommandErrorCode::InvalidValue)
        );
        assert_eq!(params.delta_ticks, 1);
    }

    #[test]
    fn test_decimation_accepts_every_nth_sample() {
        let mut params = MapperParameters::new(0);
        params.delta_ticks = 3;
        let accepted: Vec<bool> = (0..9).map(|_| params.accept_continuous_sample()).collect();
        assert_eq!(
            accepted,
            vec![false, false, true, false, false, true, false, false, true]
        );
    }
}
