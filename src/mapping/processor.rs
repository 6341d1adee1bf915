/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/mapping/processor.rs
 *
 * The indexed registry of mapper slots. A slot is empty until a `SetPinType`
 * command constructs a mapper in it; replacing the pin type discards all
 * prior per-pin configuration, and `Disabled` empties the slot again.
 *
 * The processor is driven exclusively from the event-handler thread, which
 * serializes command application against value processing; no locking
 * happens here. Global commands (sampling rate, packet enable) bypass slot
 * validation: the sampling rate is retained and forwarded to every occupied
 * slot because the analog filter coefficients are derived from it.
 *
 * Dependencies:
 *   - log: dropped-value and rejected-command reporting.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use log::{debug, error, info};

use crate::message::{Command, CommandErrorCode, CommandPayload, PinType, Value};
use crate::output_backend::OutputBackend;

use super::{AnalogSensorMapper, DigitalSensorMapper, ImuMapper, SensorMapper};

pub const DEFAULT_SAMPLING_RATE_HZ: f32 = 1000.0;

pub struct MappingProcessor {
    mappers: Vec<Option<Box<dyn SensorMapper>>>,
    max_digital_out_pins: usize,
    sampling_rate_hz: f32,
    sending_enabled: bool,
}

impl MappingProcessor {
    pub fn new(max_pins: usize, max_digital_out_pins: usize) -> Self {
        let mut mappers = Vec::with_capacity(max_pins);
        mappers.resize_with(max_pins, || None);
        Self {
            mappers,
            max_digital_out_pins,
            sampling_rate_hz: DEFAULT_SAMPLING_RATE_HZ,
            sending_enabled: true,
        }
    }

    /// Validates and applies one command. `SetPinType` (re)constructs the
    /// slot, global commands bypass slots, everything else is delegated to
    /// the mapper occupying the slot.
    pub fn apply_command(&mut self, cmd: &Command) -> CommandErrorCode {
        if cmd.is_global() {
            return self.apply_global_command(cmd);
        }

        let index = cmd.index();
        // Digital output pins live in their own, separately sized range.
        if let CommandPayload::SendDigitalPinValue(_) = cmd.payload() {
            if index < 0 || index as usize >= self.max_digital_out_pins {
                return CommandErrorCode::InvalidPinIndex;
            }
            // Board-only command; nothing to change host-side.
            return CommandErrorCode::Ok;
        }
        if index < 0 || index as usize >= self.mappers.len() {
            return CommandErrorCode::InvalidPinIndex;
        }
        let slot = index as usize;

        if let CommandPayload::SetPinType(pin_type) = cmd.payload() {
            info!("Setting pin {} type to {:?}", index, pin_type);
            self.mappers[slot] = match pin_type {
                PinType::DigitalInput => Some(Box::new(DigitalSensorMapper::new(index))),
                PinType::AnalogInput => {
                    Some(Box::new(AnalogSensorMapper::new(index, self.sampling_rate_hz)))
                }
                PinType::ImuInput => Some(Box::new(ImuMapper::new(index))),
                PinType::Disabled => None,
            };
            return CommandErrorCode::Ok;
        }

        match self.mappers[slot].as_mut() {
            Some(mapper) => mapper.apply_command(cmd),
            None => CommandErrorCode::UninitializedPin,
        }
    }

    fn apply_global_command(&mut self, cmd: &Command) -> CommandErrorCode {
        match *cmd.payload() {
            CommandPayload::SetSamplingRate(rate_hz) => {
                if rate_hz <= 0.0 || !rate_hz.is_finite() {
                    return CommandErrorCode::InvalidSamplingRate;
                }
                self.sampling_rate_hz = rate_hz;
                for mapper in self.mappers.iter_mut().flatten() {
                    mapper.apply_command(cmd);
                }
                CommandErrorCode::Ok
            }
            CommandPayload::EnableSendingPackets(enabled) => {
                self.sending_enabled = enabled;
                CommandErrorCode::Ok
            }
            _ => CommandErrorCode::InvalidValue,
        }
    }

    /// Routes one raw value to the mapper occupying its slot. Values for
    /// empty or out-of-range slots are dropped with an error log; they never
    /// abort the dispatch loop.
    pub fn process(&mut self, value: &Value, backend: &mut dyn OutputBackend) {
        let index = value.index();
        if index < 0 || index as usize >= self.mappers.len() {
            error!("Got value for out-of-range pin {}", index);
            return;
        }
        match self.mappers[index as usize].as_mut() {
            Some(mapper) => {
                debug!("Processing value for pin {}", index);
                mapper.process(value, backend);
            }
            None => error!("Got value for uninitialized pin {}", index),
        }
    }

    /// Serializes the configuration of every occupied slot, for bootstrap
    /// hand-off and hot reload.
    pub fn put_config_commands_into(&self, out: &mut Vec<Command>) {
        for mapper in self.mappers.iter().flatten() {
            mapper.put_config_commands_into(out);
        }
    }

    pub fn pin_type_of(&self, index: usize) -> Option<PinType> {
        self.mappers
            .get(index)
            .and_then(|slot| slot.as_ref().map(|m| m.pin_type()))
    }

    pub fn sampling_rate_hz(&self) -> f32 {
        self.sampling_rate_hz
    }

    pub fn sending_enabled(&self) -> bool {
        self.sending_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageFactory, SendingMode};
    use crate::output_backend::RecordingBackend;

    const MAX_PINS: usize = 16;
    const MAX_DIGITAL_OUT: usize = 8;

    fn processor() -> MappingProcessor {
        MappingProcessor::new(MAX_PINS, MAX_DIGITAL_OUT)
    }

    #[test]
    fn test_out_of_range_index_is_rejected_without_mutation() {
        let factory = MessageFactory::new();
        let mut processor = processor();
        for index in [-1, MAX_PINS as i32, 1000] {
            let cmd = factory.make_set_pin_type_command(index, PinType::AnalogInput, 0);
            assert_eq!(processor.apply_command(&cmd), CommandErrorCode::InvalidPinIndex);
        }
        for i in 0..MAX_PINS {
            assert_eq!(processor.pin_type_of(i), None);
        }
    }

    #[test]
    fn test_commands_on_uninitialized_pin() {
        let factory = MessageFactory::new();
        let mut processor = processor();
        let cmd = factory.make_set_sending_mode_command(2, SendingMode::Continuous, 0);
        assert_eq!(processor.apply_command(&cmd), CommandErrorCode::UninitializedPin);
    }

    #[test]
    fn test_set_pin_type_replaces_prior_configuration() {
        let factory = MessageFactory::new();
        let mut processor = processor();
        let cmd = factory.make_set_pin_type_command(4, PinType::AnalogInput, 0);
        assert!(processor.apply_command(&cmd).is_ok());
        assert_eq!(processor.pin_type_of(4), Some(PinType::AnalogInput));

        let cmd = factory.make_set_pin_type_command(4, PinType::DigitalInput, 0);
        assert!(processor.apply_command(&cmd).is_ok());
        assert_eq!(processor.pin_type_of(4), Some(PinType::DigitalInput));

        // The analog-only parameter no longer applies after replacement.
        let cmd = factory.make_set_adc_bit_resolution_command(4, 10, 0);
        assert_eq!(
            processor.apply_command(&cmd),
            CommandErrorCode::UnhandledCommandForSensorType
        );
    }

    #[test]
    fn test_disabled_empties_the_slot() {
        let factory = MessageFactory::new();
        let mut processor = processor();
        assert!(processor
            .apply_command(&factory.make_set_pin_type_command(1, PinType::DigitalInput, 0))
            .is_ok());
        assert!(processor
            .apply_command(&factory.make_set_pin_type_command(1, PinType::Disabled, 0))
            .is_ok());
        assert_eq!(processor.pin_type_of(1), None);
        let cmd = factory.make_set_sending_mode_command(1, SendingMode::OnPress, 0);
        assert_eq!(processor.apply_command(&cmd), CommandErrorCode::UninitializedPin);
    }

    #[test]
    fn test_global_commands_bypass_slots() {
        let factory = MessageFactory::new();
        let mut processor = processor();
        assert!(processor
            .apply_command(&factory.make_set_sampling_rate_command(500.0, 0))
            .is_ok());
        assert_eq!(processor.sampling_rate_hz(), 500.0);
        assert!(processor
            .apply_command(&factory.make_enable_sending_packets_command(false, 0))
            .is_ok());
        assert!(!processor.sending_enabled());

        assert_eq!(
            processor.apply_command(&factory.make_set_sampling_rate_command(-1.0, 0)),
            CommandErrorCode::InvalidSamplingRate
        );
        assert_eq!(processor.sampling_rate_hz(), 500.0);
    }

    #[test]
    fn test_digital_out_validated_against_its_own_range() {
        let factory = MessageFactory::new();
        let mut processor = processor();
        let ok = factory.make_send_digital_pin_value_command(MAX_DIGITAL_OUT as i32 - 1, true, 0);
        assert!(processor.apply_command(&ok).is_ok());
        let bad = factory.make_send_digital_pin_value_command(MAX_DIGITAL_OUT as i32, true, 0);
        assert_eq!(processor.apply_command(&bad), CommandErrorCode::InvalidPinIndex);
    }

    #[test]
    fn test_values_for_empty_slots_are_dropped() {
        let factory = MessageFactory::new();
        let mut processor = processor();
        let mut backend = RecordingBackend::new();
        match factory.make_analog_value(3, 100, 0) {
            crate::message::Message::Value(v) => processor.process(&v, &mut backend),
            _ => unreachable!(),
        }
        assert_eq!(backend.total_emissions(), 0);
    }

    #[test]
    fn test_end_to_end_analog_processing() {
        let factory = MessageFactory::new();
        let mut processor = processor();
        for cmd in [
            factory.make_set_pin_type_command(3, PinType::AnalogInput, 0),
            factory.make_set_adc_bit_resolution_command(3, 12, 0),
            factory.make_set_input_scale_range_command(3, 0, 4095, 0),
            factory.make_set_sending_mode_command(3, SendingMode::Continuous, 0),
            factory.make_set_sending_delta_ticks_command(3, 1, 0),
        ] {
            assert!(processor.apply_command(&cmd).is_ok());
        }

        let mut backend = RecordingBackend::new();
        for (i, raw) in [0, 2048, 4095].into_iter().enumerate() {
            match factory.make_analog_value(3, raw, i as u64) {
                crate::message::Message::Value(v) => processor.process(&v, &mut backend),
                _ => unreachable!(),
            }
        }
        assert_eq!(backend.analog.len(), 3);
        assert!((backend.analog[0].1 - 0.0).abs() < 1e-4);
        assert!((backend.analog[1].1 - 0.5).abs() < 1e-3);
        assert!((backend.analog[2].1 - 1.0).abs() < 1e-4);
    }

    /// Replaying an emitted configuration onto a fresh processor yields an
    /// equivalent configuration (it re-emits the same command sequence).
    #[test]
    fn test_config_round_trip_over_all_slots() {
        let factory = MessageFactory::new();
        let mut processor = processor();
        for cmd in [
            factory.make_set_pin_type_command(0, PinType::AnalogInput, 0),
            factory.make_set_slider_threshold_command(0, 25, 0),
            factory.make_set_pin_type_command(5, PinType::DigitalInput, 0),
            factory.make_set_sending_mode_command(5, SendingMode::Toggle, 0),
            factory.make_set_pin_type_command(9, PinType::ImuInput, 0),
            factory.make_set_imu_axis_output_command(9, crate::message::ImuAxis::Roll, 12, 0),
        ] {
            assert!(processor.apply_command(&cmd).is_ok());
        }

        let mut emitted = Vec::new();
        processor.put_config_commands_into(&mut emitted);

        let mut replayed = MappingProcessor::new(MAX_PINS, MAX_DIGITAL_OUT);
        for cmd in &emitted {
            assert!(replayed.apply_command(cmd).is_ok(), "rejected: {:?}", cmd);
        }
        let mut re_emitted = Vec::new();
        replayed.put_config_commands_into(&mut re_emitted);
        assert_eq!(emitted, re_emitted);
    }
}
