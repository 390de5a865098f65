//! Air monitor daemon - SGP30 air-quality monitoring with baseline calibration.
//!
//! Samples TVOC/eCO2 once per second (or synthesizes them when no sensor is
//! attached), persists the sensor's IAQ baseline once clean air has held
//! for ten minutes and on a 12 h safety-net, and renders rolling graphs.
//! Operator commands arrive over a Unix socket.

mod calibration;
mod clock;
mod config;
mod demo;
mod display;
mod error;
mod graph;
mod ipc_server;
mod logging;
mod monitor;
mod sensor;
mod stability;
mod store;
mod ui;

use clock::MonotonicClock;
use config::ConfigManager;
use display::FrameBuffer;
use error::{DaemonError, IpcError};
use graph::Visualizer;
use ipc_server::{CommandRequest, CommandSender};
use monitor::Monitor;
use sensor::HostSgp30;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use store::JsonFileStore;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// How long the "sensor not found" notice stays up at start-up.
const SENSOR_ERROR_PAUSE_MS: u64 = 2000;

/// Delay before rebinding the IPC socket after a failure.
const IPC_RETRY_INTERVAL_SECS: u64 = 5;

/// Graceful shutdown timeout in seconds.
const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

type DaemonMonitor = Monitor<HostSgp30, JsonFileStore, FrameBuffer>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = logging::init_logging().map_err(|e| {
        eprintln!("Failed to initialize logging: {}", e);
        e
    })?;

    info!("Air monitor daemon starting...");

    let result = run_daemon().await;

    match &result {
        Ok(()) => info!("Air monitor daemon shut down gracefully"),
        Err(e) => error!("Air monitor daemon error: {}", e),
    }

    result?;
    Ok(())
}

async fn run_daemon() -> Result<(), DaemonError> {
    let config_path = ConfigManager::default_path();
    let config_manager = ConfigManager::load_or_default(&config_path)?;
    if config_manager.save_if_missing()? {
        info!("Wrote default configuration to {:?}", config_manager.path());
    }
    let config = config_manager.get();
    info!("Configuration loaded from {:?}", config_path);

    let store = JsonFileStore::open_or_empty(&config.store_path);
    info!("Baseline store at {:?}", store.path());

    let sensor = match HostSgp30::open(&config.i2c_device) {
        Ok(sensor) => {
            info!(device = %config.i2c_device, "SGP30 detected");
            Some(sensor)
        }
        Err(e) => {
            warn!("Gas sensor unavailable: {}", e);
            None
        }
    };

    let clock = MonotonicClock::new();
    let mut monitor: DaemonMonitor = Monitor::new(
        sensor,
        store,
        FrameBuffer::default(),
        Visualizer::with_default_scales(clock.now())?,
        config.warmup_secs,
        clock.now(),
    );

    monitor.start();
    if monitor.is_demo() {
        tokio::time::sleep(Duration::from_millis(SENSOR_ERROR_PAUSE_MS)).await;
        monitor.dismiss_sensor_error();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(forward_shutdown(shutdown_signal(), shutdown_tx.clone()));

    let (commands, command_rx) = CommandSender::channel();
    let ipc_handle = tokio::spawn(run_ipc_server_with_restart(
        config.socket_path.clone(),
        commands,
        shutdown_rx.clone(),
    ));

    info!(
        demo = monitor.is_demo(),
        tick_ms = config.tick_interval_ms,
        "Air monitor initialized and running"
    );

    run_tick_loop(
        &mut monitor,
        &clock,
        Duration::from_millis(config.tick_interval_ms),
        command_rx,
        shutdown_rx,
    )
    .await;

    let shutdown_timeout = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
    let _ = tokio::time::timeout(shutdown_timeout, ipc_handle).await;

    drop(shutdown_tx);
    info!("All tasks stopped");
    Ok(())
}

/// Drive the monitor at a fixed cadence and apply queued commands between
/// ticks. A panic inside one tick or command is logged and the loop keeps
/// going.
async fn run_tick_loop(
    monitor: &mut DaemonMonitor,
    clock: &MonotonicClock,
    period: Duration,
    mut commands: mpsc::Receiver<CommandRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Tick loop shutting down");
                    break;
                }
            }
            Some((command, reply)) = commands.recv() => {
                let now = clock.now();
                let response = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    monitor.handle_command(command, now)
                }))
                .unwrap_or_else(|_| {
                    error!(?command, "Panic while handling command, continuing operation");
                    serde_json::json!({ "success": false, "error": "internal error" })
                });
                info!(?command, "Command handled");
                let _ = reply.send(response);
            }
            _ = ticker.tick() => {
                let now = clock.now();
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| monitor.tick(now)));
                if result.is_err() {
                    error!("Panic during tick, continuing operation");
                }
            }
        }
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C on other platforms) and name it.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = terminate.recv() => Ok("SIGTERM"),
            _ = interrupt.recv() => Ok("SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl+C")
    }
}

/// Flip the shutdown flag once `signal` names a received signal. A failure
/// to install the listener is logged and leaves the daemon running.
async fn forward_shutdown<F>(signal: F, shutdown_tx: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<&'static str>>,
{
    match signal.await {
        Ok(name) => {
            info!(signal = name, "Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
        Err(e) => error!("Cannot listen for shutdown signals: {}", e),
    }
}

/// Keep the IPC server up until shutdown, rebinding after failures.
async fn run_ipc_server_with_restart(
    socket_path: String,
    commands: CommandSender,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("IPC server shutting down");
                    break;
                }
            }
            result = run_ipc_server_inner(&socket_path, commands.clone()) => {
                match result {
                    Ok(()) => break,
                    Err(e) => {
                        error!(
                            "IPC server error: {}, restarting in {} seconds",
                            e, IPC_RETRY_INTERVAL_SECS
                        );
                        tokio::time::sleep(Duration::from_secs(IPC_RETRY_INTERVAL_SECS)).await;
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
async fn run_ipc_server_inner(socket_path: &str, commands: CommandSender) -> Result<(), IpcError> {
    let server = ipc_server::IpcServer::new(socket_path).await?;
    info!("IPC server listening on {:?}", server.socket_path());
    server.run(commands).await
}

/// Stub IPC server for non-Unix platforms.
#[cfg(not(unix))]
async fn run_ipc_server_inner(_socket_path: &str, _commands: CommandSender) -> Result<(), IpcError> {
    warn!("IPC server not available on this platform");
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_received_signal_requests_shutdown() {
        let (tx, rx) = watch::channel(false);
        forward_shutdown(async { Ok("SIGTERM") }, tx).await;
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_listener_failure_keeps_running() {
        let (tx, rx) = watch::channel(false);
        let failed = async { Err(std::io::Error::from(std::io::ErrorKind::Unsupported)) };
        forward_shutdown(failed, tx).await;
        assert!(!*rx.borrow());
    }
}
