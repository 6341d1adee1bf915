/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/mapping/analog_mapper.rs
 *
 * Mapper for analog input pins. Each sample runs through a fixed pipeline:
 * clamp to the configured input range, invert against the ADC full scale,
 * normalize to [0, 1], low-pass filter, scale to the output range.
 *
 * The low-pass filter is a cascade of identical one-pole sections
 * (y += a * (x - y) per section, a = 1 - e^(-2*pi*fc/fs)). The effective
 * sample rate fs is the board's global rate divided by the pin's decimation
 * factor, so the filter coefficient depends on three separately configured
 * parameters; any change to bits, order, cutoff, decimation or the global
 * rate resets the filter state and recomputes the coefficient. The filter
 * stays inactive until a positive cutoff has been configured.
 *
 * `OnValueChanged` gating compares raw ADC units, not normalized output:
 * the slider threshold is specified in counts, and the comparison baseline
 * is the raw value at the previous emission. The first accepted sample only
 * primes that baseline.
 *
 * Dependencies:
 *   - log: dropped-value reporting.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::f32::consts::PI;

use log::{debug, warn};

use crate::message::{
    Command, CommandErrorCode, CommandPayload, MessageFactory, PinType, SendingMode, Value,
};
use crate::output_backend::OutputBackend;

use super::{MapperParameters, SensorMapper};

pub const MIN_ADC_BITS: u8 = 3;
pub const MAX_ADC_BITS: u8 = 16;
pub const MIN_FILTER_ORDER: u8 = 1;
pub const MAX_FILTER_ORDER: u8 = 8;

const DEFAULT_ADC_BITS: u8 = 12;
const DEFAULT_FILTER_ORDER: u8 = 4;

/// Cascade of identical one-pole low-pass sections.
///
/// The state primes itself on the first sample after a reset so a freshly
/// configured filter passes its first input through unchanged instead of
/// ramping up from zero.
#[derive(Debug, Clone)]
struct LowPassFilter {
    coefficient: f32,
    stages: Vec<f32>,
    primed: bool,
}

impl LowPassFilter {
    fn new() -> Self {
        Self {
            coefficient: 0.0,
            stages: Vec::new(),
            primed: false,
        }
    }

    fn configure(&mut self, order: u8, cutoff_hz: f32, effective_rate_hz: f32) {
        self.coefficient = 1.0 - (-2.0 * PI * cutoff_hz / effective_rate_hz).exp();
        self.stages = vec![0.0; order as usize];
        self.primed = false;
    }

    fn apply(&mut self, input: f32) -> f32 {
        if !self.primed {
            for stage in &mut self.stages {
                *stage = input;
            }
            self.primed = true;
            return input;
        }
        let mut x = input;
        for stage in &mut self.stages {
            *stage += self.coefficient * (x - *stage);
            x = *stage;
        }
        x
    }
}

pub struct AnalogSensorMapper {
    params: MapperParameters,
    adc_bits: u8,
    input_min: i32,
    input_max: i32,
    output_min: f32,
    output_max: f32,
    slider_threshold: u16,
    filter_order: u8,
    cutoff_hz: Option<f32>,
    filter: LowPassFilter,
    sampling_rate_hz: f32,
    last_emitted_raw: Option<i32>,
}

impl AnalogSensorMapper {
    pub fn new(sensor_index: i32, sampling_rate_hz: f32) -> Self {
        let mut mapper = Self {
            params: MapperParameters::new(sensor_index),
            adc_bits: DEFAULT_ADC_BITS,
            input_min: 0,
            input_max: 0,
            output_min: 0.0,
            output_max: 1.0,
            slider_threshold: 0,
            filter_order: DEFAULT_FILTER_ORDER,
            cutoff_hz: None,
            filter: LowPassFilter::new(),
            sampling_rate_hz,
            last_emitted_raw: None,
        };
        mapper.input_max = mapper.max_raw_value();
        mapper
    }

    fn max_raw_value(&self) -> i32 {
        (1i32 << self.adc_bits) - 1
    }

    fn effective_rate_hz(&self) -> f32 {
        self.sampling_rate_hz / self.params.delta_ticks as f32
    }

    /// Recomputes coefficients and resets filter state after any parameter
    /// affecting the filter changed. A cutoff at or above the effective
    /// Nyquist rate cannot be realized; the mapper is marked invalid until
    /// reconfigured.
    fn update_filter(&mut self) {
        let Some(cutoff) = self.cutoff_hz else {
            self.params.invalid = false;
            return;
        };
        let nyquist = self.effective_rate_hz() / 2.0;
        if cutoff >= nyquist {
            if !self.params.invalid {
                warn!(
                    "Pin {}: low-pass cutoff {} Hz at or above Nyquist ({} Hz), pin marked invalid",
                    self.params.sensor_index, cutoff, nyquist
                );
            }
            self.params.invalid = true;
            return;
        }
        self.params.invalid = false;
        self.filter
            .configure(self.filter_order, cutoff, self.effective_rate_hz());
    }
}

impl SensorMapper for AnalogSensorMapper {
    fn apply_command(&mut self, cmd: &Command) -> CommandErrorCode {
        if let Some(code) = self.params.apply_common_command(cmd) {
            // Decimation changes the effective sample rate the filter runs at.
            if code.is_ok() && matches!(cmd.payload(), CommandPayload::SetSendingDeltaTicks(_)) {
                self.update_filter();
            }
            return code;
        }
        match *cmd.payload() {
            CommandPayload::SetAdcBitResolution(bits) => {
                if !(MIN_ADC_BITS..=MAX_ADC_BITS).contains(&bits) {
                    return CommandErrorCode::InvalidValue;
                }
                self.adc_bits = bits;
                self.input_min = self.input_min.clamp(0, self.max_raw_value());
                self.input_max = self.input_max.clamp(0, self.max_raw_value());
                if self.input_min == self.input_max {
                    self.input_min = 0;
                    self.input_max = self.max_raw_value();
                }
                self.update_filter();
                CommandErrorCode::Ok
            }
            CommandPayload::SetLowpassFilterOrder(order) => {
                if !(MIN_FILTER_ORDER..=MAX_FILTER_ORDER).contains(&order) {
                    return CommandErrorCode::InvalidValue;
                }
                self.filter_order = order;
                self.update_filter();
                CommandErrorCode::Ok
            }
            CommandPayload::SetLowpassCutoff(cutoff_hz) => {
                if cutoff_hz <= 0.0 || !cutoff_hz.is_finite() {
                    return CommandErrorCode::InvalidValue;
                }
                self.cutoff_hz = Some(cutoff_hz);
                self.update_filter();
                CommandErrorCode::Ok
            }
            CommandPayload::SetSliderThreshold(threshold) => {
                self.slider_threshold = threshold;
                CommandErrorCode::Ok
            }
            CommandPayload::SetInputScaleRange { min, max } => {
                if min >= max {
                    return CommandErrorCode::InvalidValue;
                }
                self.input_min = min.clamp(0, self.max_raw_value());
                self.input_max = max.clamp(0, self.max_raw_value());
                if self.input_min == self.input_max {
                    return CommandErrorCode::InvalidValue;
                }
                CommandErrorCode::Ok
            }
            CommandPayload::SetOutputScaleRange { min, max } => {
                if min >= max || !min.is_finite() || !max.is_finite() {
                    return CommandErrorCode::InvalidValue;
                }
                self.output_min = min;
                self.output_max = max;
                CommandErrorCode::Ok
            }
            CommandPayload::SetSamplingRate(rate_hz) => {
                if rate_hz <= 0.0 {
                    return CommandErrorCode::InvalidSamplingRate;
                }
                self.sampling_rate_hz = rate_hz;
                self.update_filter();
                CommandErrorCode::Ok
            }
            _ => CommandErrorCode::UnhandledCommandForSensorType,
        }
    }

    fn process(&mut self, value: &Value, backend: &mut dyn OutputBackend) {
        let raw = match value {
            Value::Analog { value, .. } => *value,
            other => {
                debug!(
                    "Analog mapper on pin {} ignoring non-analog value {:?}",
                    self.params.sensor_index, other
                );
                return;
            }
        };
        if self.params.gated_off() {
            return;
        }
        if self.params.sending_mode == SendingMode::Continuous
            && !self.params.accept_continuous_sample()
        {
            return;
        }

        // clamp -> invert -> normalize -> filter -> scale
        let mut clamped = raw.clamp(self.input_min, self.input_max);
        if self.params.inverted {
            clamped = self.max_raw_value() - clamped;
        }
        let span = (self.input_max - self.input_min) as f32;
        let normalized = ((clamped - self.input_min) as f32 / span).clamp(0.0, 1.0);
        let filtered = if self.cutoff_hz.is_some() {
            self.filter.apply(normalized)
        } else {
            normalized
        };
        let scaled = self.output_min + filtered * (self.output_max - self.output_min);

        let index = self.params.sensor_index;
        match self.params.sending_mode {
            SendingMode::Continuous => backend.send_analog(index, scaled),
            SendingMode::OnValueChanged => match self.last_emitted_raw {
                None => {
                    // First sample only establishes the comparison baseline.
                    self.last_emitted_raw = Some(clamped);
                }
                Some(last) => {
                    let threshold = i32::from(self.slider_threshold).max(1);
                    if (clamped - last).abs() >= threshold {
                        backend.send_analog(index, scaled);
                        self.last_emitted_raw = Some(clamped);
                    }
                }
            },
            // Edge-triggered modes have no meaning for an analog pin.
            _ => {}
        }
    }

    fn put_config_commands_into(&self, out: &mut Vec<Command>) {
        let factory = MessageFactory::new();
        let index = self.params.sensor_index;
        out.push(factory.make_set_pin_type_command(index, PinType::AnalogInput, 0));
        self.params.put_config_commands_into(out);
        out.push(factory.make_set_adc_bit_resolution_command(index, self.adc_bits, 0));
        out.push(factory.make_set_input_scale_range_command(
            index,
            self.input_min,
            self.input_max,
            0,
        ));
        out.push(factory.make_set_output_scale_range_command(
            index,
            self.output_min,
            self.output_max,
            0,
        ));
        out.push(factory.make_set_slider_threshold_command(index, self.slider_threshold, 0));
        out.push(factory.make_set_lowpass_filter_order_command(index, self.filter_order, 0));
        if let Some(cutoff) = self.cutoff_hz {
            out.push(factory.make_set_lowpass_cutoff_command(index, cutoff, 0));
        }
    }

    fn pin_type(&self) -> PinType {
        PinType::AnalogInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output_backend::RecordingBackend;

    const RATE: f32 = 1000.0;

    fn apply(mapper: &mut AnalogSensorMapper, cmd: Command) -> CommandErrorCode {
        mapper.apply_command(&cmd)
    }

    fn feed(mapper: &mut AnalogSensorMapper, backend: &mut RecordingBackend, samples: &[i32]) {
        for (i, &s) in samples.iter().enumerate() {
            let value = Value::Analog {
                index: mapper.params.sensor_index,
                value: s,
                timestamp: i as u64,
            };
            mapper.process(&value, backend);
        }
    }

    /// Full-range passthrough: 12-bit input mapped onto [0, 1].
    #[test]
    fn test_continuous_passthrough_scaling() {
        let factory = MessageFactory::new();
        let mut mapper = AnalogSensorMapper::new(3, RATE);
        assert!(apply(&mut mapper, factory.make_set_adc_bit_resolution_command(3, 12, 0)).is_ok());
        assert!(apply(
            &mut mapper,
            factory.make_set_input_scale_range_command(3, 0, 4095, 0)
        )
        .is_ok());
        assert!(apply(
            &mut mapper,
            factory.make_set_sending_mode_command(3, SendingMode::Continuous, 0)
        )
        .is_ok());
        assert!(apply(&mut mapper, factory.make_set_sending_delta_ticks_command(3, 1, 0)).is_ok());

        let mut backend = RecordingBackend::new();
        feed(&mut mapper, &mut backend, &[0, 2048, 4095]);

        assert_eq!(backend.analog.len(), 3);
        assert!((backend.analog[0].1 - 0.0).abs() < 1e-4);
        assert!((backend.analog[1].1 - 0.5).abs() < 1e-3);
        assert!((backend.analog[2].1 - 1.0).abs() < 1e-4);
    }

    /// The slider threshold gates OnValueChanged in raw ADC units, with the
    /// first sample only priming the baseline.
    #[test]
    fn test_slider_threshold_gating() {
        let factory = MessageFactory::new();
        let mut mapper = AnalogSensorMapper::new(0, RATE);
        assert!(apply(&mut mapper, factory.make_set_slider_threshold_command(0, 50, 0)).is_ok());

        let mut backend = RecordingBackend::new();
        feed(&mut mapper, &mut backend, &[100, 120, 155, 155, 205]);

        assert_eq!(backend.analog.len(), 2);
        let expected_155 = 155.0 / 4095.0;
        let expected_205 = 205.0 / 4095.0;
        assert!((backend.analog[0].1 - expected_155).abs() < 1e-4);
        assert!((backend.analog[1].1 - expected_205).abs() < 1e-4);
    }

    #[test]
    fn test_inversion_against_full_scale() {
        let factory = MessageFactory::new();
        let mut mapper = AnalogSensorMapper::new(1, RATE);
        assert!(apply(
            &mut mapper,
            factory.make_set_sending_mode_command(1, SendingMode::Continuous, 0)
        )
        .is_ok());
        assert!(apply(&mut mapper, factory.make_set_input_inverted_command(1, true, 0)).is_ok());

        let mut backend = RecordingBackend::new();
        feed(&mut mapper, &mut backend, &[0, 4095]);
        assert!((backend.analog[0].1 - 1.0).abs() < 1e-4);
        assert!((backend.analog[1].1 - 0.0).abs() < 1e-4);
    }

    #[test]
    fn test_output_range_scaling() {
        let factory = MessageFactory::new();
        let mut mapper = AnalogSensorMapper::new(2, RATE);
        assert!(apply(
            &mut mapper,
            factory.make_set_sending_mode_command(2, SendingMode::Continuous, 0)
        )
        .is_ok());
        assert!(apply(
            &mut mapper,
            factory.make_set_output_scale_range_command(2, -1.0, 1.0, 0)
        )
        .is_ok());

        let mut backend = RecordingBackend::new();
        feed(&mut mapper, &mut backend, &[0, 4095]);
        assert!((backend.analog[0].1 - -1.0).abs() < 1e-4);
        assert!((backend.analog[1].1 - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_parameter_validation() {
        let factory = MessageFactory::new();
        let mut mapper = AnalogSensorMapper::new(0, RATE);
        assert_eq!(
            apply(&mut mapper, factory.make_set_adc_bit_resolution_command(0, 2, 0)),
            CommandErrorCode::InvalidValue
        );
        assert_eq!(
            apply(&mut mapper, factory.make_set_adc_bit_resolution_command(0, 17, 0)),
            CommandErrorCode::InvalidValue
        );
        assert_eq!(
            apply(&mut mapper, factory.make_set_lowpass_filter_order_command(0, 0, 0)),
            CommandErrorCode::InvalidValue
        );
        assert_eq!(
            apply(&mut mapper, factory.make_set_lowpass_filter_order_command(0, 9, 0)),
            CommandErrorCode::InvalidValue
        );
        assert_eq!(
            apply(&mut mapper, factory.make_set_lowpass_cutoff_command(0, -5.0, 0)),
            CommandErrorCode::InvalidValue
        );
        assert_eq!(
            apply(&mut mapper, factory.make_set_input_scale_range_command(0, 100, 100, 0)),
            CommandErrorCode::InvalidValue
        );
        assert_eq!(
            apply(
                &mut mapper,
                factory.make_set_imu_axis_output_command(0, crate::message::ImuAxis::Yaw, 1, 0)
            ),
            CommandErrorCode::UnhandledCommandForSensorType
        );
    }

    /// A first filtered sample primes the cascade, so even with a filter the
    /// first emission matches the input exactly.
    #[test]
    fn test_filter_primes_on_first_sample() {
        let factory = MessageFactory::new();
        let mut mapper = AnalogSensorMapper::new(0, RATE);
        assert!(apply(
            &mut mapper,
            factory.make_set_sending_mode_command(0, SendingMode::Continuous, 0)
        )
        .is_ok());
        assert!(apply(&mut mapper, factory.make_set_lowpass_cutoff_command(0, 10.0, 0)).is_ok());

        let mut backend = RecordingBackend::new();
        feed(&mut mapper, &mut backend, &[2048, 4095, 4095]);
        assert!((backend.analog[0].1 - 2048.0 / 4095.0).abs() < 1e-4);
        // A 10 Hz cutoff at 1 kHz smooths the step towards full scale.
        assert!(backend.analog[1].1 < 1.0);
        assert!(backend.analog[2].1 > backend.analog[1].1);
    }

    #[test]
    fn test_cutoff_above_nyquist_marks_invalid() {
        let factory = MessageFactory::new();
        let mut mapper = AnalogSensorMapper::new(0, RATE);
        assert!(apply(
            &mut mapper,
            factory.make_set_sending_mode_command(0, SendingMode::Continuous, 0)
        )
        .is_ok());
        assert!(apply(&mut mapper, factory.make_set_lowpass_cutoff_command(0, 600.0, 0)).is_ok());
        assert!(mapper.params.invalid);

        let mut backend = RecordingBackend::new();
        feed(&mut mapper, &mut backend, &[1000]);
        assert_eq!(backend.total_emissions(), 0);

        // Lowering the cutoff below Nyquist recovers the pin.
        assert!(apply(&mut mapper, factory.make_set_lowpass_cutoff_command(0, 100.0, 0)).is_ok());
        assert!(!mapper.params.invalid);
        feed(&mut mapper, &mut backend, &[1000]);
        assert_eq!(backend.analog.len(), 1);
    }

    #[test]
    fn test_decimation_raises_invalid_cutoff() {
        let factory = MessageFactory::new();
        let mut mapper = AnalogSensorMapper::new(0, RATE);
        assert!(apply(&mut mapper, factory.make_set_lowpass_cutoff_command(0, 100.0, 0)).is_ok());
        assert!(!mapper.params.invalid);
        // Decimating by 8 drops the effective rate to 125 Hz; 100 Hz cutoff
        // is now above the 62.5 Hz Nyquist limit.
        assert!(apply(&mut mapper, factory.make_set_sending_delta_ticks_command(0, 8, 0)).is_ok());
        assert!(mapper.params.invalid);
    }

    #[test]
    fn test_config_round_trip() {
        let factory = MessageFactory::new();
        let mut mapper = AnalogSensorMapper::new(7, RATE);
        assert!(apply(&mut mapper, factory.make_set_adc_bit_resolution_command(7, 10, 0)).is_ok());
        assert!(apply(&mut mapper, factory.make_set_slider_threshold_command(7, 9, 0)).is_ok());
        assert!(apply(&mut mapper, factory.make_set_lowpass_cutoff_command(7, 25.0, 0)).is_ok());

        let mut commands = Vec::new();
        mapper.put_config_commands_into(&mut commands);
        assert_eq!(
            *commands[0].payload(),
            CommandPayload::SetPinType(PinType::AnalogInput)
        );

        let mut replayed = AnalogSensorMapper::new(7, RATE);
        for cmd in commands.iter().skip(1) {
            assert!(replayed.apply_command(cmd).is_ok(), "rejected: {:?}", cmd);
        }
        assert_eq!(replayed.adc_bits, 10);
        assert_eq!(replayed.slider_threshold, 9);
        assert_eq!(replayed.cutoff_hz, Some(25.0));
    }
}
