/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/output_backend/mod.rs
 *
 * The downstream side of the gateway. Mappers hand their processed values to
 * an `OutputBackend`; what happens next (OSC, MIDI, a socket, a log) is the
 * back-end's concern. Implementations must not block the mapping thread:
 * buffering and rate-limiting belong behind this trait.
 *
 * The OSC driver lives out of tree; the in-tree `StreamBackend` writes one
 * line per value to any `io::Write` sink, which is what the daemon uses when
 * started without an output destination and what the examples in the
 * documentation use.
 *
 * Dependencies:
 *   - log: write-failure reporting.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::io::Write;

use log::{error, warn};

/// Receives typed values from the mapping processor and forwards them
/// downstream. Calls must return promptly.
pub trait OutputBackend: Send {
    fn send_digital(&mut self, index: i32, value: bool);
    fn send_analog(&mut self, index: i32, value: f32);
    fn send_continuous(&mut self, index: i32, value: f32);
    /// Declares the semantic range of values emitted for `index`.
    fn set_output_range(&mut self, index: i32, min: f32, max: f32);
    fn set_output_enabled(&mut self, index: i32, enabled: bool);
}

/// Line-oriented back-end over any writer, one value per line.
pub struct StreamBackend<W: Write + Send> {
    sink: W,
    failed_writes: u64,
}

impl<W: Write + Send> StreamBackend<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            failed_writes: 0,
        }
    }

    fn write_line(&mut self, line: std::fmt::Arguments) {
        if let Err(e) = self.sink.write_fmt(line) {
            self.failed_writes += 1;
            if self.failed_writes == 1 {
                error!("Output backend write failed: {}", e);
            }
        }
    }
}

impl<W: Write + Send> OutputBackend for StreamBackend<W> {
    fn send_digital(&mut self, index: i32, value: bool) {
        self.write_line(format_args!("digital {} {}\n", index, value as u8));
    }

    fn send_analog(&mut self, index: i32, value: f32) {
        self.write_line(format_args!("analog {} {}\n", index, value));
    }

    fn send_continuous(&mut self, index: i32, value: f32) {
        self.write_line(format_args!("continuous {} {}\n", index, value));
    }

    fn set_output_range(&mut self, index: i32, min: f32, max: f32) {
        self.write_line(format_args!("range {} {} {}\n", index, min, max));
    }

    fn set_output_enabled(&mut self, index: i32, enabled: bool) {
        if !enabled {
            warn!("Output {} disabled", index);
        }
        self.write_line(format_args!("enabled {} {}\n", index, enabled as u8));
    }
}

/// Recording back-end used by mapper and processor tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub digital: Vec<(i32, bool)>,
    pub analog: Vec<(i32, f32)>,
    pub continuous: Vec<(i32, f32)>,
}

#[cfg(test)]
impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_emissions(&self) -> usize {
        self.digital.len() + self.analog.len() + self.continuous.len()
    }
}

#[cfg(test)]
impl OutputBackend for RecordingBackend {
    fn send_digital(&mut self, index: i32, value: bool) {
        self.digital.push((index, value));
    }

    fn send_analog(&mut self, index: i32, value: f32) {
        self.analog.push((index, value));
    }

    fn send_continuous(&mut self, index: i32, value: f32) {
        self.continuous.push((index, value));
    }

    fn set_output_range(&mut self, _index: i32, _min: f32, _max: f32) {}

    fn set_output_enabled(&mut self, _index: i32, _enabled: bool) {}
}

/// Handle to a `RecordingBackend` that can be observed from outside while
/// the event handler owns the backend box.
#[cfg(test)]
#[derive(Clone)]
pub struct SharedRecordingBackend(
    pub std::sync::Arc<parking_lot::Mutex<RecordingBackend>>,
);

#[cfg(test)]
impl SharedRecordingBackend {
    pub fn new() -> Self {
        Self(std::sync::Arc::new(parking_lot::Mutex::new(
            RecordingBackend::new(),
        )))
    }
}

#[cfg(test)]
impl OutputBackend for SharedRecordingBackend {
    fn send_digital(&mut self, index: i32, value: bool) {
        self.0.lock().send_digital(index, value);
    }

    fn send_analog(&mut self, index: i32, value: f32) {
        self.0.lock().send_analog(index, value);
    }

    fn send_continuous(&mut self, index: i32, value: f32) {
        self.0.lock().send_continuous(index, value);
    }

    fn set_output_range(&mut self, index: i32, min: f32, max: f32) {
        self.0.lock().set_output_range(index, min, max);
    }

    fn set_output_enabled(&mut self, index: i32, enabled: bool) {
        self.0.lock().set_output_enabled(index, enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_backend_formats_lines() {
        let mut backend = StreamBackend::new(Vec::new());
        backend.send_digital(5, true);
        backend.send_analog(3, 0.25);
        backend.send_continuous(10, -1.5);
        let text = String::from_utf8(backend.sink).unwrap();
        assert_eq!(text, "digital 5 1\nanalog 3 0.25\ncontinuous 10 -1.5\n");
    }
}
