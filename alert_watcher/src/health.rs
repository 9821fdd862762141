use crate::error::CycleError;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Polls older than this many intervals mark the monitor unhealthy.
const STALE_AFTER_INTERVALS: i32 = 4;

#[derive(Clone, Default)]
pub struct PollStatus {
    pub last_attempted_poll: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_successful_poll: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_error: Arc<RwLock<Option<CycleError>>>,
}

#[derive(Clone)]
struct AxumState {
    status: PollStatus,
    stale_after: TimeDelta,
}

/// Serves `GET /health` until shutdown. Without an address there is nothing
/// to serve and the task only waits for shutdown.
pub async fn run_health_server(
    addr: Option<SocketAddr>,
    status: PollStatus,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let Some(addr) = addr else {
        shutdown.cancelled().await;
        return Ok(());
    };

    info!(name: "health.server.starting", addr = %addr, "starting axum health server");
    let stale_after = TimeDelta::from_std(poll_interval)
        .unwrap_or(TimeDelta::MAX)
        .checked_mul(STALE_AFTER_INTERVALS)
        .unwrap_or(TimeDelta::MAX);
    let app = Router::new()
        .route("/health", get(health_check))
        .with_state(AxumState {
            status,
            stale_after,
        });
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await?;
    Ok(())
}

async fn health_check(State(state): State<AxumState>) -> impl IntoResponse {
    health_report(&state.status, state.stale_after, Utc::now())
}

fn health_report(
    status: &PollStatus,
    stale_after: TimeDelta,
    now: DateTime<Utc>,
) -> (StatusCode, String) {
    let last_attempted_poll = *status.last_attempted_poll.read();
    let last_successful_poll = *status.last_successful_poll.read();
    let last_error = match status.last_error.read().as_ref() {
        Some(e) => e.to_string(),
        None => "none".to_string(),
    };

    let Some(last_successful_poll) = last_successful_poll else {
        return match last_attempted_poll {
            Some(last_attempted_poll) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "No successful alert poll yet. Last attempted poll: {last_attempted_poll}. Last error: {last_error}"
                ),
            ),
            None => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "No attempted or successful alert polls".to_string(),
            ),
        };
    };

    if now - last_successful_poll > stale_after {
        let last_attempted_poll = last_attempted_poll
            .map_or_else(|| "never".to_string(), |t| t.to_string());
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "Alerts not polled successfully since {last_successful_poll}. Last attempted poll: {last_attempted_poll}. Last error: {last_error}"
            ),
        )
    } else {
        (
            StatusCode::OK,
            format!("Alerts last successfully polled: {last_successful_poll}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn unhealthy_before_first_success() {
        let status = PollStatus::default();
        let (code, body) = health_report(&status, TimeDelta::minutes(2), at("2024-01-01T10:00:00Z"));
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("No attempted"));

        *status.last_attempted_poll.write() = Some(at("2024-01-01T10:00:00Z"));
        *status.last_error.write() = Some(CycleError::EmptySource);
        let (code, body) = health_report(&status, TimeDelta::minutes(2), at("2024-01-01T10:00:00Z"));
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("no records"));
    }

    #[test]
    fn healthy_while_recent_then_stale() {
        let status = PollStatus::default();
        *status.last_attempted_poll.write() = Some(at("2024-01-01T10:00:00Z"));
        *status.last_successful_poll.write() = Some(at("2024-01-01T10:00:00Z"));

        let (code, _) = health_report(&status, TimeDelta::minutes(2), at("2024-01-01T10:01:00Z"));
        assert_eq!(code, StatusCode::OK);

        let (code, body) =
            health_report(&status, TimeDelta::minutes(2), at("2024-01-01T10:05:00Z"));
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("not polled successfully"));
    }
}
