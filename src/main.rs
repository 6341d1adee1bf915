/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/main.rs
 *
 * The sensei daemon entry point. Parses the command line, initializes
 * logging, installs the signal handlers, wires the event handler over the
 * selected transport (serial port or unix socket pair) and runs the
 * dispatch loop until terminated. SIGHUP triggers a configuration reload
 * without restarting, SIGINT/SIGTERM shut the daemon down cleanly.
 *
 * Dependencies:
 *   - clap: command-line parsing.
 *   - env_logger: logging backend for the `log` facade.
 *   - libc: signal installation.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use sensei::event_handler::EventHandler;
use sensei::hw_frontend::transport::{SerialConnector, SocketConnector, TransportConnector};
use sensei::hw_frontend::READ_WRITE_TIMEOUT;
use sensei::output_backend::StreamBackend;
use sensei::user_frontend::LoggingUserFrontend;

const EVENT_WAIT_PERIOD: Duration = Duration::from_millis(500);

static RUNNING: AtomicBool = AtomicBool::new(true);
static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Sensor gateway daemon bridging a GPIO/IMU controller board with
/// musical control software.
#[derive(Debug, Parser)]
#[command(name = "sensei", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "sensei.json")]
    config: PathBuf,

    /// Serial port device of the controller board (e.g. /dev/ttyACM0).
    #[arg(short, long, conflicts_with = "socket")]
    port: Option<String>,

    /// Unix socket of the GPIO hardware process.
    #[arg(short, long, default_value = "/tmp/sensei_gpio.sock")]
    socket: PathBuf,

    /// Local socket path bound for receiving, when using the socket
    /// transport.
    #[arg(long, default_value = "/tmp/sensei.sock")]
    local_socket: PathBuf,

    /// Serial baud rate.
    #[arg(long, default_value_t = 115_200)]
    baud_rate: u32,

    /// Number of addressable input pins.
    #[arg(long, default_value_t = 64)]
    max_pins: usize,

    /// Number of addressable digital output pins.
    #[arg(long, default_value_t = 32)]
    max_digital_out: usize,
}

extern "C" fn handle_termination(_signal: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

extern "C" fn handle_reload(_signal: libc::c_int) {
    RELOAD_REQUESTED.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    let terminate = handle_termination as extern "C" fn(libc::c_int);
    let reload = handle_reload as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, terminate as libc::sighandler_t);
        libc::signal(libc::SIGTERM, terminate as libc::sighandler_t);
        libc::signal(libc::SIGHUP, reload as libc::sighandler_t);
    }
}

fn build_connector(cli: &Cli) -> Box<dyn TransportConnector> {
    match &cli.port {
        Some(port) => Box::new(SerialConnector::new(
            port.clone(),
            cli.baud_rate,
            READ_WRITE_TIMEOUT,
        )),
        None => Box::new(SocketConnector::new(
            cli.local_socket.clone(),
            cli.socket.clone(),
            READ_WRITE_TIMEOUT,
        )),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    install_signal_handlers();

    let connector = build_connector(&cli);
    let output_backend = StreamBackend::new(std::io::stdout());

    let mut handler = match EventHandler::new(
        connector,
        Box::new(output_backend),
        |queue| Box::new(LoggingUserFrontend::new(queue)),
        &cli.config,
        cli.max_pins,
        cli.max_digital_out,
    ) {
        Ok(handler) => handler,
        Err(e) => {
            error!("Initialization failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Sensei up, dispatching events");
    while RUNNING.load(Ordering::Relaxed) {
        if RELOAD_REQUESTED.swap(false, Ordering::Relaxed) {
            info!("Reloading configuration");
            handler.reload_config();
        }
        handler.handle_events(EVENT_WAIT_PERIOD);
    }

    info!("Shutting down");
    handler.deinit();
    ExitCode::SUCCESS
}
