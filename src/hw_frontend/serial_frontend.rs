/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/hw_frontend/serial_frontend.rs
 *
 * The duplex protocol state machine of the hardware front-end, built out of
 * two worker threads sharing a small block of atomics plus the mutex-guarded
 * ack tracker.
 *
 * The transmit thread owns the connection: it (re)opens the link with a
 * capped exponential back-off, hands every fresh reader half to the ingest
 * thread over a channel, drains the to-frontend command queue, serializes
 * commands through the packet factory and enforces the retransmission
 * discipline. The ingest thread blocks on the link with a bounded timeout,
 * verifies and decodes frames, reassembles two-part payloads and pushes the
 * resulting messages onto the event queue. Either thread can lose the link:
 * a write error drops the writer half directly, a read error raises the
 * reconnect flag the transmit thread polls.
 *
 * Both threads poll the shared thread-state between suspension points; all
 * blocking calls are bounded, so `stop` completes within one timeout.
 *
 * Dependencies:
 *   - crossbeam-channel: hand-off of reconnected reader halves.
 *   - parking_lot: mutex around the ack tracker.
 *   - nalgebra: quaternion assembly from IMU payloads.
 *   - log: connection and frame diagnostics.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use nalgebra::Quaternion;
use parking_lot::Mutex;

use crate::message::{Command, ErrorKind, Message, MessageFactory, GLOBAL_SENSOR_INDEX};
use crate::sync_queue::SynchronizedQueue;

use super::message_tracker::MessageTracker;
use super::packet_factory::PacketFactory;
use super::protocol::{
    AckPayload, ImuValuePayload, MessageConcatenator, SenseiCmd, SenseiFrame, StatusCode,
    ValuePayload, PACKET_LENGTH, WIRE_PIN_ANALOG_INPUT, WIRE_PIN_DIGITAL_INPUT,
};
use super::transport::{LinkReader, LinkWriter, TransportConnector, TransportError};
use super::{ConnectionState, HwFrontend, HwFrontendConfig, ThreadState};

/// State shared between the two worker threads and the owning handle.
struct FrontendShared {
    thread_state: AtomicU8,
    connection_state: AtomicU8,
    connected: AtomicBool,
    muted: AtomicBool,
    verify_acks: AtomicBool,
    /// Raised by the ingest thread on read failure; the transmit thread
    /// owns reconnection and polls this.
    reconnect_requested: AtomicBool,
    frame_errors: AtomicU64,
    tracker: Mutex<MessageTracker>,
}

impl FrontendShared {
    fn thread_state(&self) -> ThreadState {
        ThreadState::from_u8(self.thread_state.load(Ordering::Relaxed))
    }

    fn set_thread_state(&self, state: ThreadState) {
        self.thread_state.store(state as u8, Ordering::Relaxed);
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection_state.load(Ordering::Relaxed))
    }

    fn set_connection_state(&self, state: ConnectionState) {
        self.connection_state.store(state as u8, Ordering::Relaxed);
    }

    fn count_frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct SerialFrontend {
    shared: Arc<FrontendShared>,
    config: HwFrontendConfig,
    connector: Option<Box<dyn TransportConnector>>,
    in_queue: Arc<SynchronizedQueue<Command>>,
    out_queue: Arc<SynchronizedQueue<Message>>,
    ingest_thread: Option<JoinHandle<()>>,
    transmit_thread: Option<JoinHandle<()>>,
}

impl SerialFrontend {
    /// Builds the front-end over `connector`. `in_queue` carries commands to
    /// be transmitted to the board, `out_queue` receives decoded messages.
    pub fn new(
        connector: Box<dyn TransportConnector>,
        in_queue: Arc<SynchronizedQueue<Command>>,
        out_queue: Arc<SynchronizedQueue<Message>>,
        config: HwFrontendConfig,
    ) -> Self {
        let shared = Arc::new(FrontendShared {
            thread_state: AtomicU8::new(ThreadState::Stopped as u8),
            connection_state: AtomicU8::new(ConnectionState::Disconnected as u8),
            connected: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            verify_acks: AtomicBool::new(config.verify_acks),
            reconnect_requested: AtomicBool::new(false),
            frame_errors: AtomicU64::new(0),
            tracker: Mutex::new(MessageTracker::new(config.ack_timeout, config.max_retries)),
        });
        Self {
            shared,
            config,
            connector: Some(connector),
            in_queue,
            out_queue,
            ingest_thread: None,
            transmit_thread: None,
        }
    }

    pub fn outstanding_acks(&self) -> usize {
        self.shared.tracker.lock().outstanding()
    }

    /// Sleeps in small slices so a stop request interrupts the back-off.
    fn interruptible_sleep(shared: &FrontendShared, duration: Duration) {
        let deadline = Instant::now() + duration;
        while shared.thread_state() == ThreadState::Running {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
    }

    /// Writes one encoded frame; a failure drops the writer half so the
    /// connection loop re-opens the link.
    fn send_frame(
        writer: &mut Option<Box<dyn LinkWriter>>,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        match writer.as_mut() {
            Some(w) => match w.write_packet(bytes) {
                Ok(()) => Ok(()),
                Err(e) => {
                    *writer = None;
                    Err(e)
                }
            },
            None => Err(TransportError::Closed),
        }
    }

    fn transmit_loop(
        mut connector: Box<dyn TransportConnector>,
        in_queue: Arc<SynchronizedQueue<Command>>,
        out_queue: Arc<SynchronizedQueue<Message>>,
        shared: Arc<FrontendShared>,
        reader_tx: Sender<Box<dyn LinkReader>>,
        config: HwFrontendConfig,
    ) {
        let factory = MessageFactory::new();
        let mut packet_factory = PacketFactory::new();
        let mut writer: Option<Box<dyn LinkWriter>> = None;
        let mut backoff = config.initial_backoff;
        // Retransmissions must not wait for the next command, so the queue
        // wait is bounded by the ack timeout as well.
        let wait_period = config.read_timeout.min(config.ack_timeout);

        while shared.thread_state() == ThreadState::Running {
            if shared.reconnect_requested.swap(false, Ordering::Relaxed) {
                writer = None;
            }

            if writer.is_none() {
                shared.connected.store(false, Ordering::Relaxed);
                shared.set_connection_state(ConnectionState::Connecting);
                match connector.connect() {
                    Ok((reader, new_writer)) => {
                        info!("Connected to {}", connector.describe());
                        if reader_tx.send(reader).is_err() {
                            break;
                        }
                        writer = Some(new_writer);
                        shared.connected.store(true, Ordering::Relaxed);
                        shared.set_connection_state(ConnectionState::Connected);
                        backoff = config.initial_backoff;
                        // Ask the board to push every current value so the
                        // mappers start from fresh state.
                        let refresh = packet_factory.make_get_all_values_frame();
                        let _ = Self::send_frame(&mut writer, &refresh.encode());
                    }
                    Err(e) => {
                        debug!("Connecting to {} failed: {}", connector.describe(), e);
                        shared.set_connection_state(ConnectionState::Disconnected);
                        Self::interruptible_sleep(&shared, backoff);
                        backoff = (backoff * 2).min(config.max_backoff);
                    }
                }
                continue;
            }

            in_queue.wait_for_data(wait_period);
            let mut link_lost = false;

            while let Some(cmd) = in_queue.pop() {
                for frame in packet_factory.make_frames(&cmd) {
                    if shared.verify_acks.load(Ordering::Relaxed) {
                        shared.tracker.lock().log_transmission(&frame, Instant::now());
                    }
                    if let Err(e) = Self::send_frame(&mut writer, &frame.encode()) {
                        warn!("Write to board failed: {}", e);
                        link_lost = true;
                        break;
                    }
                }
                if link_lost {
                    break;
                }
            }

            if !link_lost && shared.verify_acks.load(Ordering::Relaxed) {
                let (retransmit, expired) = shared.tracker.lock().timed_out(Instant::now());
                for frame in retransmit {
                    debug!("Retransmitting packet {:#x}", frame.uuid());
                    if let Err(e) = Self::send_frame(&mut writer, &frame.encode()) {
                        warn!("Retransmission failed: {}", e);
                        link_lost = true;
                        break;
                    }
                }
                for frame in expired {
                    warn!("No ack for packet {:#x}, giving up", frame.uuid());
                    out_queue.push(factory.make_error(
                        GLOBAL_SENSOR_INDEX,
                        ErrorKind::AckTimeout,
                        u64::from(frame.timestamp),
                    ));
                }
            }

            if link_lost {
                shared.connected.store(false, Ordering::Relaxed);
                shared.set_connection_state(ConnectionState::Disconnected);
                out_queue.push(factory.make_error(
                    GLOBAL_SENSOR_INDEX,
                    ErrorKind::TransportDisconnected,
                    0,
                ));
            }
        }
        shared.set_thread_state(ThreadState::Stopped);
    }

    fn ingest_loop(
        reader_rx: Receiver<Box<dyn LinkReader>>,
        out_queue: Arc<SynchronizedQueue<Message>>,
        shared: Arc<FrontendShared>,
        config: HwFrontendConfig,
    ) {
        let factory = MessageFactory::new();
        let mut concatenator = MessageConcatenator::new();
        let mut reader: Option<Box<dyn LinkReader>> = None;
        let mut buf = [0u8; 2 * PACKET_LENGTH];

        while shared.thread_state() == ThreadState::Running {
            // Always pick up the freshest reader after a reconnect.
            while let Ok(new_reader) = reader_rx.try_recv() {
                reader = Some(new_reader);
            }
            let Some(r) = reader.as_mut() else {
                match reader_rx.recv_timeout(config.read_timeout) {
                    Ok(new_reader) => reader = Some(new_reader),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                continue;
            };

            match r.read_packet(&mut buf) {
                Ok(n) if n >= PACKET_LENGTH => {
                    match SenseiFrame::parse(&buf[..PACKET_LENGTH]) {
                        Ok(frame) => Self::handle_frame(
                            &frame,
                            &factory,
                            &mut concatenator,
                            &out_queue,
                            &shared,
                        ),
                        Err(e) => {
                            shared.count_frame_error();
                            debug!("Discarding corrupt frame: {}", e);
                        }
                    }
                }
                Ok(n) => {
                    shared.count_frame_error();
                    debug!("Discarding runt read of {} bytes", n);
                }
                Err(TransportError::Timeout) => {}
                Err(e) => {
                    warn!("Read from board failed: {}", e);
                    reader = None;
                    shared.connected.store(false, Ordering::Relaxed);
                    shared.reconnect_requested.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    /// Decodes one verified frame. Decoding always runs so the counters
    /// advance; a muted front-end only skips the upstream push.
    fn handle_frame(
        frame: &SenseiFrame,
        factory: &MessageFactory,
        concatenator: &mut MessageConcatenator,
        out_queue: &SynchronizedQueue<Message>,
        shared: &FrontendShared,
    ) {
        let muted = shared.muted.load(Ordering::Relaxed);
        match SenseiCmd::from_u8(frame.cmd) {
            Some(SenseiCmd::Ack) => {
                let ack = AckPayload::read_from(&frame.payload);
                shared.tracker.lock().acknowledge(ack.acked_uuid(frame.timestamp));
                match ack.status {
                    StatusCode::Ok | StatusCode::NoExternalProcessingNecessary => {}
                    status => {
                        warn!("Board reported {:?} for command {}", status, ack.cmd);
                        if !muted {
                            out_queue.push(factory.make_error(
                                GLOBAL_SENSOR_INDEX,
                                ErrorKind::HardwareReported(status),
                                u64::from(frame.timestamp),
                            ));
                        }
                    }
                }
            }
            Some(SenseiCmd::Value) => {
                let Some(payload) = concatenator.add(frame) else {
                    return;
                };
                let value = ValuePayload::read_from(&payload);
                let message = match value.pin_type {
                    WIRE_PIN_DIGITAL_INPUT => factory.make_digital_value(
                        i32::from(value.pin_id),
                        value.value != 0,
                        u64::from(frame.timestamp),
                    ),
                    WIRE_PIN_ANALOG_INPUT => factory.make_analog_value(
                        i32::from(value.pin_id),
                        i32::from(value.value),
                        u64::from(frame.timestamp),
                    ),
                    other => {
                        shared.count_frame_error();
                        debug!("Value frame with unknown pin type {}", other);
                        return;
                    }
                };
                if !muted {
                    out_queue.push(message);
                }
            }
            Some(SenseiCmd::ValueImu) => {
                let Some(payload) = concatenator.add(frame) else {
                    return;
                };
                let imu = ImuValuePayload::read_from(&payload);
                let orientation = Quaternion::new(imu.qw, imu.qx, imu.qy, imu.qz);
                if !muted {
                    out_queue.push(factory.make_imu_value(
                        i32::from(imu.pin_id),
                        orientation,
                        u64::from(frame.timestamp),
                    ));
                }
            }
            Some(other) => debug!("Ignoring frame with command {:?}", other),
            None => {
                shared.count_frame_error();
                debug!("Frame with unknown command {}", frame.cmd);
            }
        }
    }
}

impl HwFrontend for SerialFrontend {
    fn connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    fn run(&mut self) {
        if self.ingest_thread.is_some() || self.transmit_thread.is_some() {
            return;
        }
        let Some(connector) = self.connector.take() else {
            warn!("Frontend cannot be restarted after stop");
            return;
        };
        self.shared.set_thread_state(ThreadState::Running);
        let (reader_tx, reader_rx) = unbounded();

        let shared = Arc::clone(&self.shared);
        let out_queue = Arc::clone(&self.out_queue);
        let config = self.config.clone();
        self.ingest_thread = Some(thread::spawn(move || {
            Self::ingest_loop(reader_rx, out_queue, shared, config);
        }));

        let shared = Arc::clone(&self.shared);
        let in_queue = Arc::clone(&self.in_queue);
        let out_queue = Arc::clone(&self.out_queue);
        let config = self.config.clone();
        self.transmit_thread = Some(thread::spawn(move || {
            Self::transmit_loop(connector, in_queue, out_queue, shared, reader_tx, config);
        }));
    }

    fn stop(&mut self) {
        if self.ingest_thread.is_none() && self.transmit_thread.is_none() {
            return;
        }
        self.shared.set_thread_state(ThreadState::Stopping);
        self.shared.set_connection_state(ConnectionState::Stopping);
        if let Some(handle) = self.transmit_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.ingest_thread.take() {
            let _ = handle.join();
        }
        self.shared.set_thread_state(ThreadState::Stopped);
        self.shared.set_connection_state(ConnectionState::Stopped);
        self.shared.connected.store(false, Ordering::Relaxed);
    }

    fn mute(&mut self, enabled: bool) {
        self.shared.muted.store(enabled, Ordering::Relaxed);
    }

    fn verify_acks(&mut self, enabled: bool) {
        self.shared.verify_acks.store(enabled, Ordering::Relaxed);
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    fn frame_errors(&self) -> u64 {
        self.shared.frame_errors.load(Ordering::Relaxed)
    }
}

impl Drop for SerialFrontend {
    fn drop(&mut self) {
        self.stop();
    }
}
