#![warn(clippy::pedantic)]
mod error;
mod health;
mod monitor;
mod player;
mod source;

use crate::error::MainError;
use crate::health::{PollStatus, run_health_server};
use crate::monitor::{Monitor, RunSummary};
use crate::player::Player;
use crate::source::HttpAlertSource;
use alert_core::error::InitializationError;
use alert_core::machine::AlertStateMachine;
use alert_core::store::JsonFileStore;
use alert_core::{init_tracing, load_config, shutdown_listener};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), MainError> {
    // Tracing needs the log settings, so configuration errors surface through
    // main's return value.
    let config = load_config().map_err(InitializationError::from)?;
    init_tracing(&config.log, config.time_zone)?;
    info!(
        name: "config.loaded",
        api_url = %config.api_url,
        poll_interval = ?config.poll_interval,
        repeat_interval_min = config.repeat_interval.map(|i| i.minutes()),
        time_zone = %config.time_zone,
        state_path = %config.state_path.display(),
        "config loaded"
    );

    let monitor = Monitor::new(
        HttpAlertSource::new(&config)?,
        Player::from_config(config.player.as_ref()),
        JsonFileStore::new(&config.state_path),
        config.sounds.clone(),
        AlertStateMachine::new(config.repeat_interval),
        config.time_zone,
    );
    let status = PollStatus::default();

    // Cancellation token shared across tasks; listener cancels on SIGINT/SIGTERM.
    let shutdown_token = CancellationToken::new();
    let mut signal_handle = tokio::spawn(shutdown_listener(Some(shutdown_token.clone())));

    let mut health_handle = tokio::spawn(run_health_server(
        config.health_addr,
        status.clone(),
        config.poll_interval,
        shutdown_token.clone(),
    ));

    let mut monitor_handle = tokio::spawn(monitor.run(
        status,
        config.poll_interval,
        shutdown_token.clone(),
    ));

    let mut first_err: Option<MainError> = None;
    let mut health_done = false;
    let mut monitor_done = false;

    tokio::select! {
        res = &mut health_handle => {
            info!(name: "health.completed", "health task finished first, stopping the monitor");
            health_done = true;
            shutdown_token.cancel();
            record_health_outcome(res, &mut first_err);
        }
        res = &mut monitor_handle => {
            info!(name: "monitor.completed", "monitor task finished first, stopping the health server");
            monitor_done = true;
            shutdown_token.cancel();
            record_monitor_outcome(res, &mut first_err);
        }
        res = &mut signal_handle => {
            shutdown_token.cancel();
            if let Err(join) = res {
                warn!(name: "listener.completed", error = ?join, "SIGINT/SIGTERM listener failed");
                first_err.get_or_insert(join.into());
            }
        }
    }

    if !monitor_done {
        info!(name: "monitor.completion.awaiting", "waiting for the current poll cycle to finish");
        record_monitor_outcome(monitor_handle.await, &mut first_err);
    }
    if !health_done {
        record_health_outcome(health_handle.await, &mut first_err);
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn record_health_outcome(
    res: Result<Result<(), std::io::Error>, JoinError>,
    first_err: &mut Option<MainError>,
) {
    match res {
        Ok(Ok(())) => info!(name: "health.completed", "health server stopped"),
        Ok(Err(e)) => {
            warn!(name: "health.completed", error = %e, "health server failed");
            first_err.get_or_insert(e.into());
        }
        Err(join) => {
            warn!(name: "health.completed", error = ?join, "health task panicked or was cancelled");
            first_err.get_or_insert(join.into());
        }
    }
}

fn record_monitor_outcome(res: Result<RunSummary, JoinError>, first_err: &mut Option<MainError>) {
    match res {
        Ok(summary) => info!(
            name: "monitor.completed",
            cycles = summary.cycles,
            failed_cycles = summary.failed_cycles,
            notifications = summary.notifications,
            "monitor stopped"
        ),
        Err(join) => {
            warn!(name: "monitor.completed", error = ?join, "monitor task panicked or was cancelled");
            first_err.get_or_insert(join.into());
        }
    }
}
