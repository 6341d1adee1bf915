/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/user_frontend/mod.rs
 *
 * The user-facing control surface contract. A user front-end is a source of
 * commands (it pushes them onto the shared event queue like the config
 * back-end does) and the sink for the errors those commands provoke. The
 * interactive terminal surface lives out of tree; the in-tree
 * `LoggingUserFrontend` surfaces errors through the log so a headless
 * daemon still reports rejected commands somewhere visible.
 *
 * Dependencies:
 *   - log: error surfacing.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::sync::Arc;

use log::warn;

use crate::message::{Command, ErrorMessage, Message};
use crate::sync_queue::SynchronizedQueue;

/// Command source and error sink for the user-facing control surface.
pub trait UserFrontend: Send {
    /// Delivers an error provoked by a command this front-end (or the
    /// hardware) produced.
    fn notify_error(&mut self, error: &ErrorMessage);
}

/// Headless front-end: errors go to the log, commands can be injected
/// programmatically.
pub struct LoggingUserFrontend {
    event_queue: Arc<SynchronizedQueue<Message>>,
}

impl LoggingUserFrontend {
    pub fn new(event_queue: Arc<SynchronizedQueue<Message>>) -> Self {
        Self { event_queue }
    }

    /// Submits a command into the gateway as if typed on a control surface.
    pub fn inject_command(&self, cmd: Command) {
        self.event_queue.push(Message::Command(cmd));
    }
}

impl UserFrontend for LoggingUserFrontend {
    fn notify_error(&mut self, error: &ErrorMessage) {
        warn!(
            "Command error on pin {}: {:?}",
            error.index(),
            error.kind()
        );
    }
}

/// Recording front-end for event-handler tests.
#[cfg(test)]
pub struct RecordingUserFrontend {
    pub errors: Arc<parking_lot::Mutex<Vec<ErrorMessage>>>,
}

#[cfg(test)]
impl RecordingUserFrontend {
    pub fn new() -> (Self, Arc<parking_lot::Mutex<Vec<ErrorMessage>>>) {
        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
        (
            Self {
                errors: Arc::clone(&errors),
            },
            errors,
        )
    }
}

#[cfg(test)]
impl UserFrontend for RecordingUserFrontend {
    fn notify_error(&mut self, error: &ErrorMessage) {
        self.errors.lock().push(error.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageFactory;

    #[test]
    fn test_injected_commands_land_on_the_event_queue() {
        let queue = Arc::new(SynchronizedQueue::new());
        let frontend = LoggingUserFrontend::new(Arc::clone(&queue));
        let factory = MessageFactory::new();
        frontend.inject_command(factory.make_set_pin_enabled_command(2, false, 1));
        match queue.pop() {
            Some(Message::Command(cmd)) => assert_eq!(cmd.index(), 2),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
