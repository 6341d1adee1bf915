/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/config_backend/mod.rs
 *
 * The configuration back-end: reads the declarative JSON description of the
 * board (global rate and per-pin type, sending mode, scaling, filtering and
 * IMU axis routing) and turns it into the same command stream the user
 * front-end produces. Everything downstream — the mapping processor and the
 * hardware front-end — is configured exclusively through that stream, so
 * hot-reloading is just reading the file again.
 *
 * The front-end tunables (ack timeout, retry budget) also live in the file
 * and are extracted separately before the front-end is constructed.
 *
 * Dependencies:
 *   - serde, serde_json: declarative config file model.
 *   - thiserror: typed error chain for parse failures.
 *   - log: reload diagnostics.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use crate::hw_frontend::HwFrontendConfig;
use crate::message::{ImuAxis, Message, MessageFactory, PinType, SendingMode};
use crate::sync_queue::SynchronizedQueue;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

// --- File model ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PinTypeConfig {
    DigitalInput,
    AnalogInput,
    ImuInput,
    Disabled,
}

impl From<PinTypeConfig> for PinType {
    fn from(value: PinTypeConfig) -> Self {
        match value {
            PinTypeConfig::DigitalInput => PinType::DigitalInput,
            PinTypeConfig::AnalogInput => PinType::AnalogInput,
            PinTypeConfig::ImuInput => PinType::ImuInput,
            PinTypeConfig::Disabled => PinType::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SendingModeConfig {
    Off,
    Continuous,
    OnValueChanged,
    OnPress,
    OnRelease,
    Toggle,
}

impl From<SendingModeConfig> for SendingMode {
    fn from(value: SendingModeConfig) -> Self {
        match value {
            SendingModeConfig::Off => SendingMode::Off,
            SendingModeConfig::Continuous => SendingMode::Continuous,
            SendingModeConfig::OnValueChanged => SendingMode::OnValueChanged,
            SendingModeConfig::OnPress => SendingMode::OnPress,
            SendingModeConfig::OnRelease => SendingMode::OnRelease,
            SendingModeConfig::Toggle => SendingMode::Toggle,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RangeConfig<T> {
    min: T,
    max: T,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct ImuAxesConfig {
    yaw: Option<i32>,
    pitch: Option<i32>,
    roll: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct PinConfig {
    index: i32,
    pin_type: PinTypeConfig,
    enabled: Option<bool>,
    sending_mode: Option<SendingModeConfig>,
    delta_ticks: Option<u16>,
    inverted: Option<bool>,
    adc_bits: Option<u8>,
    filter_order: Option<u8>,
    lowpass_cutoff: Option<f32>,
    slider_threshold: Option<u16>,
    input_range: Option<RangeConfig<i32>>,
    output_range: Option<RangeConfig<f32>>,
    imu_axes: Option<ImuAxesConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
struct FrontendSection {
    ack_timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    verify_acks: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct SenseiConfigFile {
    sampling_rate_hz: Option<f32>,
    enable_sending_packets: Option<bool>,
    #[serde(default)]
    frontend: FrontendSection,
    #[serde(default)]
    pins: Vec<PinConfig>,
}

/// Reads the configuration file and re-emits it as a command burst.
pub struct ConfigBackend {
    path: PathBuf,
    factory: MessageFactory,
}

impl ConfigBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            factory: MessageFactory::new(),
        }
    }

    fn parse(&self) -> Result<SenseiConfigFile, ConfigError> {
        let text = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Extracts the hardware front-end tunables; called once before the
    /// front-end is constructed.
    pub fn frontend_config(&self) -> Result<HwFrontendConfig, ConfigError> {
        let file = self.parse()?;
        let mut config = HwFrontendConfig::default();
        if let Some(ms) = file.frontend.ack_timeout_ms {
            config.ack_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = file.frontend.max_retries {
            config.max_retries = retries;
        }
        if let Some(verify) = file.frontend.verify_acks {
            config.verify_acks = verify;
        }
        Ok(config)
    }

    /// Re-reads the file and enqueues one command per configured parameter.
    /// Returns the number of commands emitted.
    pub fn read(&self, queue: &SynchronizedQueue<Message>) -> Result<usize, ConfigError> {
        let file = self.parse()?;
        let mut count = 0;
        let mut emit = |cmd| {
            queue.push(Message::Command(cmd));
            count += 1;
        };

        if let Some(rate) = file.sampling_rate_hz {
            emit(self.factory.make_set_sampling_rate_command(rate, 0));
        }
        if let Some(enabled) = file.enable_sending_packets {
            emit(self.factory.make_enable_sending_packets_command(enabled, 0));
        }

        for pin in &file.pins {
            let index = pin.index;
            emit(self
                .factory
                .make_set_pin_type_command(index, pin.pin_type.into(), 0));
            if pin.pin_type == PinTypeConfig::Disabled {
                continue;
            }
            if let Some(enabled) = pin.enabled {
                emit(self.factory.make_set_pin_enabled_command(index, enabled, 0));
            }
            if let Some(mode) = pin.sending_mode {
                emit(self
                    .factory
                    .make_set_sending_mode_command(index, mode.into(), 0));
            }
            if let Some(ticks) = pin.delta_ticks {
                emit(self
                    .factory
                    .make_set_sending_delta_ticks_command(index, ticks, 0));
            }
            if let Some(inverted) = pin.inverted {
                emit(self
                    .factory
                    .make_set_input_inverted_command(index, inverted, 0));
            }
            if let Some(bits) = pin.adc_bits {
                emit(self
                    .factory
                    .make_set_adc_bit_resolution_command(index, bits, 0));
            }
            if let Some(range) = pin.input_range {
                emit(self.factory.make_set_input_scale_range_command(
                    index, range.min, range.max, 0,
                ));
            }
            if let Some(range) = pin.output_range {
                emit(self.factory.make_set_output_scale_range_command(
                    index, range.min, range.max, 0,
                ));
            }
            if let Some(threshold) = pin.slider_threshold {
                emit(self
                    .factory
                    .make_set_slider_threshold_command(index, threshold, 0));
            }
            if let Some(order) = pin.filter_order {
                emit(self
                    .factory
                    .make_set_lowpass_filter_order_command(index, order, 0));
            }
            if let Some(cutoff) = pin.lowpass_cutoff {
                emit(self
                    .factory
                    .make_set_lowpass_cutoff_command(index, cutoff, 0));
            }
            if let Some(axes) = pin.imu_axes {
                for (axis, output) in [
                    (ImuAxis::Yaw, axes.yaw),
                    (ImuAxis::Pitch, axes.pitch),
                    (ImuAxis::Roll, axes.roll),
                ] {
                    if let Some(output_index) = output {
                        emit(self.factory.make_set_imu_axis_output_command(
                            index,
                            axis,
                            output_index,
                            0,
                        ));
                    }
                }
            }
            debug!("Emitted configuration for pin {}", index);
        }

        info!(
            "Configuration {} produced {} commands",
            self.path.display(),
            count
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Command, CommandPayload};
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    const SAMPLE_CONFIG: &str = r#"{
        "sampling_rate_hz": 1000.0,
        "enable_sending_packets": true,
        "frontend": { "ack_timeout_ms": 250, "max_retries": 5 },
        "pins": [
            {
                "index": 3,
                "pin_type": "analog_input",
                "sending_mode": "continuous",
                "delta_ticks": 1,
                "adc_bits": 12,
                "input_range": { "min": 0, "max": 4095 },
                "slider_threshold": 10
            },
            {
                "index": 5,
                "pin_type": "digital_input",
                "sending_mode": "on_press"
            },
            {
                "index": 0,
                "pin_type": "imu_input",
                "imu_axes": { "yaw": 10, "pitch": 11, "roll": 12 }
            }
        ]
    }"#;

    fn write_config(content: &str) -> (TempDir, ConfigBackend) {
        let dir = TempDir::new().unwrap();
        let file = dir.child("sensei.json");
        file.write_str(content).unwrap();
        let backend = ConfigBackend::new(file.path());
        (dir, backend)
    }

    fn drain_commands(queue: &SynchronizedQueue<Message>) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Some(message) = queue.pop() {
            match message {
                Message::Command(cmd) => commands.push(cmd),
                other => panic!("unexpected message: {:?}", other),
            }
        }
        commands
    }

    #[test]
    fn test_command_burst_from_file() {
        let (_dir, backend) = write_config(SAMPLE_CONFIG);
        let queue = SynchronizedQueue::new();
        let count = backend.read(&queue).unwrap();
        let commands = drain_commands(&queue);
        assert_eq!(commands.len(), count);

        // Globals first.
        assert_eq!(*commands[0].payload(), CommandPayload::SetSamplingRate(1000.0));
        assert_eq!(
            *commands[1].payload(),
            CommandPayload::EnableSendingPackets(true)
        );
        // Every pin starts with its type.
        let type_commands: Vec<_> = commands
            .iter()
            .filter(|c| matches!(c.payload(), CommandPayload::SetPinType(_)))
            .collect();
        assert_eq!(type_commands.len(), 3);
        // IMU routing is present for all three axes.
        let routing = commands
            .iter()
            .filter(|c| matches!(c.payload(), CommandPayload::SetImuAxisOutput { .. }))
            .count();
        assert_eq!(routing, 3);
    }

    #[test]
    fn test_pin_type_precedes_parameters() {
        let (_dir, backend) = write_config(SAMPLE_CONFIG);
        let queue = SynchronizedQueue::new();
        backend.read(&queue).unwrap();
        let commands = drain_commands(&queue);

        let type_position = commands
            .iter()
            .position(|c| c.index() == 3 && matches!(c.payload(), CommandPayload::SetPinType(_)))
            .unwrap();
        let first_parameter = commands
            .iter()
            .position(|c| c.index() == 3 && !matches!(c.payload(), CommandPayload::SetPinType(_)))
            .unwrap();
        assert!(type_position < first_parameter);
    }

    #[test]
    fn test_frontend_section_overrides_defaults() {
        let (_dir, backend) = write_config(SAMPLE_CONFIG);
        let config = backend.frontend_config().unwrap();
        assert_eq!(config.ack_timeout, Duration::from_millis(250));
        assert_eq!(config.max_retries, 5);
        assert!(config.verify_acks);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let (_dir, backend) = write_config("{ not json");
        let queue = SynchronizedQueue::new();
        assert!(matches!(backend.read(&queue), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let backend = ConfigBackend::new("/nonexistent/sensei.json");
        let queue = SynchronizedQueue::new();
        assert!(matches!(backend.read(&queue), Err(ConfigError::FileRead(_))));
    }

    #[test]
    fn test_reload_emits_fresh_burst() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("sensei.json");
        file.write_str(r#"{ "pins": [ { "index": 1, "pin_type": "digital_input" } ] }"#)
            .unwrap();
        let backend = ConfigBackend::new(file.path());
        let queue = SynchronizedQueue::new();
        assert_eq!(backend.read(&queue).unwrap(), 1);
        queue.clear();

        file.write_str(
            r#"{ "pins": [ { "index": 1, "pin_type": "analog_input", "adc_bits": 10 } ] }"#,
        )
        .unwrap();
        assert_eq!(backend.read(&queue).unwrap(), 2);
        let commands = drain_commands(&queue);
        assert_eq!(
            *commands[0].payload(),
            CommandPayload::SetPinType(crate::message::PinType::AnalogInput)
        );
        assert_eq!(*commands[1].payload(), CommandPayload::SetAdcBitResolution(10));
    }
}
