/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/mapping/digital_mapper.rs
 *
 * Mapper for digital input pins. Keeps the last seen level and implements
 * the edge-triggered sending modes: `OnPress` and `OnRelease` emit a trigger
 * on the respective edge, `Toggle` maintains an internal on/off state flipped
 * on every press edge, `OnValueChanged` emits on any level change and
 * `Continuous` forwards every (decimated) sample. Inversion is applied
 * before edge detection, so an inverted pin presses on the falling wire
 * level.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use log::debug;

use crate::message::{
    Command, CommandErrorCode, CommandPayload, MessageFactory, PinType, SendingMode, Value,
};
use crate::output_backend::OutputBackend;

use super::{MapperParameters, SensorMapper};

pub struct DigitalSensorMapper {
    params: MapperParameters,
    previous_value: bool,
    toggle_state: bool,
}

impl DigitalSensorMapper {
    pub fn new(sensor_index: i32) -> Self {
        Self {
            params: MapperParameters::new(sensor_index),
            previous_value: false,
            toggle_state: false,
        }
    }
}

impl SensorMapper for DigitalSensorMapper {
    fn apply_command(&mut self, cmd: &Command) -> CommandErrorCode {
        if let Some(code) = self.params.apply_common_command(cmd) {
            return code;
        }
        match cmd.payload() {
            // The global rate is forwarded to every slot; nothing here
            // depends on it.
            CommandPayload::SetSamplingRate(_) => CommandErrorCode::Ok,
            _ => CommandErrorCode::UnhandledCommandForSensorType,
        }
    }

    fn process(&mut self, value: &Value, backend: &mut dyn OutputBackend) {
        let raw = match value {
            Value::Digital { value, .. } => *value,
            other => {
                debug!(
                    "Digital mapper on pin {} ignoring non-digital value {:?}",
                    self.params.sensor_index, other
                );
                return;
            }
        };
        if self.params.gated_off() {
            return;
        }

        let current = raw != self.params.inverted;
        let index = self.params.sensor_index;
        match self.params.sending_mode {
            SendingMode::Continuous => {
                if self.params.accept_continuous_sample() {
                    backend.send_digital(index, current);
                }
            }
            SendingMode::OnValueChanged => {
                if current != self.previous_value {
                    backend.send_digital(index, current);
                }
            }
            SendingMode::OnPress => {
                if current && !self.previous_value {
                    backend.send_digital(index, true);
                }
            }
            SendingMode::OnRelease => {
                if !current && self.previous_value {
                    backend.send_digital(index, true);
                }
            }
            SendingMode::Toggle => {
                if current && !self.previous_value {
                    self.toggle_state = !self.toggle_state;
                    backend.send_digital(index, self.toggle_state);
                }
            }
            SendingMode::Off => {}
        }
        self.previous_value = current;
    }

    fn put_config_commands_into(&self, out: &mut Vec<Command>) {
        let factory = MessageFactory::new();
        out.push(factory.make_set_pin_type_command(
            self.params.sensor_index,
            PinType::DigitalInput,
            0,
        ));
        self.params.put_config_commands_into(out);
    }

    fn pin_type(&self) -> PinType {
        PinType::DigitalInput
    }
}
