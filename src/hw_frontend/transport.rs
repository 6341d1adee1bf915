/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/hw_frontend/transport.rs
 *
 * The transport seam of the hardware front-end. A `TransportConnector`
 * produces a connected reader/writer pair; the front-end's ingest thread
 * owns the reader, the transmit thread owns the writer, and reconnection
 * means asking the connector for a fresh pair. Keeping the two halves
 * separate mirrors the duplex links the gateway actually runs over: a
 * serial device (cloned handle per direction) or a unix datagram socket
 * pair shared with the GPIO process.
 *
 * Tests inject a `FakeConnector` whose link is a scripted in-memory board,
 * which is how the protocol state machine is exercised without hardware.
 *
 * Dependencies:
 *   - serialport: userland serial port access.
 *   - thiserror: transport error type.
 *   - log: connection diagnostics.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::io::{Read, Write};
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// No data arrived within the read timeout; the caller just retries.
    #[error("Read timed out")]
    Timeout,

    /// The link is gone; the caller should trigger reconnection.
    #[error("Transport link closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Receiving half of a duplex link. `read_packet` blocks up to the link's
/// configured timeout.
pub trait LinkReader: Send {
    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Transmitting half of a duplex link.
pub trait LinkWriter: Send {
    fn write_packet(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Opens (and re-opens) the duplex link to the board.
pub trait TransportConnector: Send {
    fn connect(&mut self) -> Result<(Box<dyn LinkReader>, Box<dyn LinkWriter>), TransportError>;

    /// Human-readable endpoint description for logging.
    fn describe(&self) -> String;
}

fn map_read_error(e: std::io::Error) -> TransportError {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => TransportError::Timeout,
        _ => TransportError::Io(e),
    }
}

// --- Serial port transport ---

pub struct SerialConnector {
    port_name: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    pub fn new(port_name: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout,
        }
    }
}

impl TransportConnector for SerialConnector {
    fn connect(&mut self) -> Result<(Box<dyn LinkReader>, Box<dyn LinkWriter>), TransportError> {
        let reader_port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.read_timeout)
            .open()?;
        let writer_port = reader_port.try_clone()?;
        info!("Opened serial port {}", self.port_name);
        Ok((
            Box::new(SerialReader { port: reader_port }),
            Box::new(SerialWriter { port: writer_port }),
        ))
    }

    fn describe(&self) -> String {
        format!("serial port {}", self.port_name)
    }
}

struct SerialReader {
    port: Box<dyn serialport::SerialPort>,
}

impl LinkReader for SerialReader {
    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.port.read(buf).map_err(map_read_error)
    }
}

struct SerialWriter {
    port: Box<dyn serialport::SerialPort>,
}

impl LinkWriter for SerialWriter {
    fn write_packet(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

// --- Unix datagram socket transport ---

/// Connects to the GPIO hardware process over a pair of datagram sockets:
/// ours is bound for receiving, the remote one belongs to the GPIO process.
/// Datagram framing means one packet per read, no re-sync scanning.
pub struct SocketConnector {
    local_path: PathBuf,
    remote_path: PathBuf,
    read_timeout: Duration,
}

impl SocketConnector {
    pub fn new(
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<PathBuf>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            read_timeout,
        }
    }
}

impl TransportConnector for SocketConnector {
    fn connect(&mut self) -> Result<(Box<dyn LinkReader>, Box<dyn LinkWriter>), TransportError> {
        // A stale socket file from a previous run would make bind fail.
        let _ = std::fs::remove_file(&self.local_path);
        let socket = UnixDatagram::bind(&self.local_path)?;
        socket.connect(&self.remote_path)?;
        socket.set_read_timeout(Some(self.read_timeout))?;
        let writer_socket = socket.try_clone()?;
        info!(
            "Connected socket {} to {}",
            self.local_path.display(),
            self.remote_path.display()
        );
        Ok((
            Box::new(SocketReader { socket }),
            Box::new(SocketWriter {
                socket: writer_socket,
            }),
        ))
    }

    fn describe(&self) -> String {
        format!("unix socket {}", self.remote_path.display())
    }
}

struct SocketReader {
    socket: UnixDatagram,
}

impl LinkReader for SocketReader {
    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.socket.recv(buf).map_err(map_read_error)
    }
}

struct SocketWriter {
    socket: UnixDatagram,
}

impl LinkWriter for SocketWriter {
    fn write_packet(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let sent = self.socket.send(bytes)?;
        if sent != bytes.len() {
            debug!("Short datagram write: {} of {} bytes", sent, bytes.len());
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

// --- In-memory fake for tests ---

/// Scripted in-memory board: frames queued on it appear on the reader,
/// frames written to it are recorded, and the whole link can be switched
/// open or closed to drive the reconnection state machine.
#[cfg(test)]
pub mod fake {
    use super::*;
    use crate::hw_frontend::protocol::{AckPayload, SenseiCmd, SenseiFrame, StatusCode};
    use parking_lot::{Condvar, Mutex};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Instant;

    #[derive(Default)]
    struct BoardState {
        open: bool,
        incoming: VecDeque<Vec<u8>>,
        written: Vec<Vec<u8>>,
        /// When set, every accepted write is answered with an ack frame of
        /// this status.
        auto_ack: Option<StatusCode>,
    }

    pub struct FakeBoard {
        state: Mutex<BoardState>,
        data_ready: Condvar,
    }

    impl FakeBoard {
        pub fn new(open: bool) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(BoardState {
                    open,
                    ..Default::default()
                }),
                data_ready: Condvar::new(),
            })
        }

        pub fn set_open(&self, open: bool) {
            self.state.lock().open = open;
            self.data_ready.notify_all();
        }

        pub fn set_auto_ack(&self, status: Option<StatusCode>) {
            self.state.lock().auto_ack = status;
        }

        pub fn queue_frame(&self, frame: &SenseiFrame) {
            self.queue_bytes(frame.encode().to_vec());
        }

        pub fn queue_bytes(&self, bytes: Vec<u8>) {
            self.state.lock().incoming.push_back(bytes);
            self.data_ready.notify_all();
        }

        pub fn written_count(&self) -> usize {
            self.state.lock().written.len()
        }

        pub fn written_frames(&self) -> Vec<SenseiFrame> {
            self.state
                .lock()
                .written
                .iter()
                .filter_map(|bytes| SenseiFrame::parse(bytes).ok())
                .collect()
        }
    }

    pub struct FakeConnector {
        board: Arc<FakeBoard>,
        read_timeout: Duration,
    }

    impl FakeConnector {
        pub fn new(board: Arc<FakeBoard>, read_timeout: Duration) -> Self {
            Self {
                board,
                read_timeout,
            }
        }
    }

    impl TransportConnector for FakeConnector {
        fn connect(
            &mut self,
        ) -> Result<(Box<dyn LinkReader>, Box<dyn LinkWriter>), TransportError> {
            if !self.board.state.lock().open {
                // A real connect attempt takes time to fail; modelling that
                // keeps the Connecting state observable for tests.
                std::thread::sleep(Duration::from_millis(10));
                return Err(TransportError::Closed);
            }
            Ok((
                Box::new(FakeReader {
                    board: Arc::clone(&self.board),
                    read_timeout: self.read_timeout,
                }),
                Box::new(FakeWriter {
                    board: Arc::clone(&self.board),
                }),
            ))
        }

        fn describe(&self) -> String {
            "fake board".to_string()
        }
    }

    struct FakeReader {
        board: Arc<FakeBoard>,
        read_timeout: Duration,
    }

    impl LinkReader for FakeReader {
        fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let deadline = Instant::now() + self.read_timeout;
            let mut state = self.board.state.lock();
            loop {
                if !state.open {
                    return Err(TransportError::Closed);
                }
                if let Some(bytes) = state.incoming.pop_front() {
                    let len = bytes.len().min(buf.len());
                    buf[..len].copy_from_slice(&bytes[..len]);
                    return Ok(len);
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(TransportError::Timeout);
                }
                self.board.data_ready.wait_for(&mut state, deadline - now);
            }
        }
    }

    struct FakeWriter {
        board: Arc<FakeBoard>,
    }

    impl LinkWriter for FakeWriter {
        fn write_packet(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            let mut state = self.board.state.lock();
            if !state.open {
                return Err(TransportError::Closed);
            }
            state.written.push(bytes.to_vec());
            if let Some(status) = state.auto_ack {
                if let Ok(frame) = SenseiFrame::parse(bytes) {
                    let mut ack = SenseiFrame::new(SenseiCmd::Ack as u8, 0, frame.timestamp);
                    AckPayload {
                        status,
                        cmd: frame.cmd,
                        sub_cmd: frame.sub_cmd,
                    }
                    .write_to(&mut ack.payload);
                    state.incoming.push_back(ack.encode().to_vec());
                    self.board.data_ready.notify_all();
                }
            }
            Ok(())
        }
    }
}
