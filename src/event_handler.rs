/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/event_handler.rs
 *
 * The heart of the gateway: a single-threaded dispatcher that owns every
 * collaborator and the two queues between them. The hardware front-end's
 * ingest thread, the config back-end and the user front-end all produce
 * into the event queue; the handler drains it and routes by message kind.
 * Values flow through the mapping processor into the output back-end.
 * Commands are applied to the processor and, when they configure board
 * parameters, re-serialized onto the to-frontend queue. Errors are logged
 * and surfaced to the user front-end.
 *
 * Because command application and value processing happen on this one
 * thread, mapper state needs no locking anywhere.
 *
 * Startup order: construct collaborators, start the hardware front-end,
 * apply the initial configuration burst, enter the dispatch loop. `deinit`
 * releases in reverse order and runs on every init failure path too.
 *
 * Dependencies:
 *   - log: dispatch diagnostics.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::config_backend::ConfigBackend;
use crate::hw_frontend::serial_frontend::SerialFrontend;
use crate::hw_frontend::transport::TransportConnector;
use crate::hw_frontend::HwFrontend;
use crate::mapping::MappingProcessor;
use crate::message::{
    Command, CommandErrorCode, ErrorKind, ErrorMessage, Message, Value,
};
use crate::output_backend::OutputBackend;
use crate::sync_queue::SynchronizedQueue;
use crate::user_frontend::UserFrontend;
use crate::SenseiError;

pub struct EventHandler {
    event_queue: Arc<SynchronizedQueue<Message>>,
    to_frontend_queue: Arc<SynchronizedQueue<Command>>,
    processor: MappingProcessor,
    hw_frontend: Box<dyn HwFrontend>,
    output_backend: Box<dyn OutputBackend>,
    config_backend: ConfigBackend,
    user_frontend: Box<dyn UserFrontend>,
}

impl EventHandler {
    /// Builds the full component graph, starts the hardware front-end and
    /// applies the initial configuration. A missing or malformed
    /// configuration file is fatal here (and only here; reloads just log).
    ///
    /// The user front-end is built through a factory so it can share the
    /// event queue this constructor creates.
    pub fn new<F>(
        connector: Box<dyn TransportConnector>,
        output_backend: Box<dyn OutputBackend>,
        make_user_frontend: F,
        config_path: impl Into<PathBuf>,
        max_pins: usize,
        max_digital_out_pins: usize,
    ) -> Result<Self, SenseiError>
    where
        F: FnOnce(Arc<SynchronizedQueue<Message>>) -> Box<dyn UserFrontend>,
    {
        let config_backend = ConfigBackend::new(config_path);
        let hw_config = config_backend.frontend_config()?;

        let event_queue = Arc::new(SynchronizedQueue::new());
        let to_frontend_queue = Arc::new(SynchronizedQueue::new());
        let user_frontend = make_user_frontend(Arc::clone(&event_queue));
        let processor = MappingProcessor::new(max_pins, max_digital_out_pins);
        let mut hw_frontend: Box<dyn HwFrontend> = Box::new(SerialFrontend::new(
            connector,
            Arc::clone(&to_frontend_queue),
            Arc::clone(&event_queue),
            hw_config,
        ));

        hw_frontend.run();
        if let Err(e) = config_backend.read(&event_queue) {
            hw_frontend.stop();
            return Err(e.into());
        }

        info!(
            "Event handler initialized with {} input pins, {} digital outputs",
            max_pins, max_digital_out_pins
        );
        Ok(Self {
            event_queue,
            to_frontend_queue,
            processor,
            hw_frontend,
            output_backend,
            config_backend,
            user_frontend,
        })
    }

    /// Blocks on the event queue up to `wait_period`, then drains and
    /// dispatches everything available. Returns the number of messages
    /// handled.
    pub fn handle_events(&mut self, wait_period: Duration) -> usize {
        if !self.event_queue.wait_for_data(wait_period) {
            return 0;
        }
        let mut handled = 0;
        while let Some(message) = self.event_queue.pop() {
            match message {
                Message::Value(value) => self.handle_value(&value),
                Message::Command(cmd) => self.handle_command(cmd),
                Message::Error(error) => self.handle_error(&error),
            }
            handled += 1;
        }
        handled
    }

    /// Stops the front-end and clears both queues; safe to call twice.
    pub fn deinit(&mut self) {
        self.hw_frontend.stop();
        self.to_frontend_queue.clear();
        self.event_queue.clear();
    }

    /// Re-reads the configuration file and enqueues the resulting command
    /// burst. Failures are logged, never fatal at this point.
    pub fn reload_config(&mut self) {
        match self.config_backend.read(&self.event_queue) {
            Ok(count) => info!("Configuration reload queued {} commands", count),
            Err(e) => error!("Configuration reload failed: {}", e),
        }
    }

    pub fn connected(&self) -> bool {
        self.hw_frontend.connected()
    }

    /// The shared event queue, for wiring additional command sources.
    pub fn event_queue(&self) -> Arc<SynchronizedQueue<Message>> {
        Arc::clone(&self.event_queue)
    }

    fn handle_value(&mut self, value: &Value) {
        self.processor.process(value, self.output_backend.as_mut());
    }

    fn handle_command(&mut self, cmd: Command) {
        let code = self.processor.apply_command(&cmd);
        if code.is_ok() {
            if cmd.destination().includes_hardware() {
                self.to_frontend_queue.push(cmd);
            }
            return;
        }
        warn!(
            "Command for pin {} rejected with {:?}: {:?}",
            cmd.index(),
            code,
            cmd.payload()
        );
        let kind = match code {
            CommandErrorCode::InvalidPinIndex => ErrorKind::InvalidPinIndex,
            CommandErrorCode::UninitializedPin => ErrorKind::UninitializedPin,
            CommandErrorCode::UnhandledCommandForSensorType => {
                ErrorKind::UnhandledCommandForSensorType
            }
            // `Ok` cannot reach this arm; it is grouped here so the match
            // stays exhaustive without a panic path.
            CommandErrorCode::Ok
            | CommandErrorCode::InvalidValue
            | CommandErrorCode::InvalidSamplingRate => ErrorKind::InvalidValue,
        };
        self.user_frontend
            .notify_error(&ErrorMessage::new(cmd.index(), cmd.timestamp(), kind));
    }

    fn handle_error(&mut self, error: &ErrorMessage) {
        error!(
            "Hardware error on pin {}: {:?}",
            error.index(),
            error.kind()
        );
        if error.kind().is_warning_or_worse() {
            self.user_frontend.notify_error(error);
        }
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        self.deinit();
    }
}
