use crate::error::CycleError;
use crate::health::PollStatus;
use crate::player::Notifier;
use crate::source::AlertSource;
use alert_core::machine::{AlertStateMachine, Notification, NotificationKind, Trigger};
use alert_core::observation::Observation;
use alert_core::sound::SoundBook;
use alert_core::store::{AlertStates, PersistenceError, StateStore};
use alert_core::time::display_in_zone;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Result of one completed poll cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub observation: Observation,
    pub notification: Option<Notification>,
}

/// Totals of one `Monitor::run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub notifications: u64,
}

/// Owns everything one poll cycle needs. Cycles never overlap.
pub struct Monitor<S, N, St> {
    source: S,
    notifier: N,
    store: St,
    sounds: SoundBook,
    machine: AlertStateMachine,
    time_zone: Tz,
    /// Records as of the end of the previous cycle.
    cached: Option<AlertStates>,
    /// The cached records are newer than the store because a save failed.
    dirty: bool,
    announced: bool,
}

impl<S, N, St> Monitor<S, N, St>
where
    S: AlertSource,
    N: Notifier,
    St: StateStore,
{
    pub fn new(
        source: S,
        notifier: N,
        store: St,
        sounds: SoundBook,
        machine: AlertStateMachine,
        time_zone: Tz,
    ) -> Self {
        Self {
            source,
            notifier,
            store,
            sounds,
            machine,
            time_zone,
            cached: None,
            dirty: false,
            announced: false,
        }
    }

    /// Runs the first cycle immediately and then one every `interval` until
    /// `shutdown` is cancelled. A cycle in flight is always finished.
    pub async fn run(
        mut self,
        status: PollStatus,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> RunSummary {
        info!(name: "monitor.loop.initialized", "initialized alert monitor");
        let mut summary = RunSummary::default();
        let mut initial_loop = true;
        loop {
            if initial_loop {
                initial_loop = false;
            } else {
                tokio::select! {
                    _ = sleep(interval) => {},
                    _ = shutdown.cancelled() => {
                        info!(name: "monitor.shutdown.requested", "shutdown requested, exiting monitor loop");
                        break;
                    }
                }
            }

            let now = Utc::now();
            *status.last_attempted_poll.write() = Some(now);
            summary.cycles += 1;
            match self.run_cycle(now).await {
                Ok(report) => {
                    debug!(
                        name: "monitor.cycle.completed",
                        is_active = report.observation.is_active,
                        notified = report.notification.is_some(),
                        "poll cycle completed"
                    );
                    if report.notification.is_some() {
                        summary.notifications += 1;
                    }
                    *status.last_successful_poll.write() = Some(now);
                }
                Err(e) => {
                    match &e {
                        CycleError::EmptySource => {
                            info!(name: "monitor.cycle.skipped", "alert source returned no records, skipping cycle");
                        }
                        _ => {
                            warn!(name: "monitor.cycle.failed", error = %e, "poll cycle failed, retrying next interval");
                        }
                    }
                    summary.failed_cycles += 1;
                    *status.last_error.write() = Some(e);
                }
            }

            if shutdown.is_cancelled() {
                info!(name: "monitor.shutdown.requested", "shutdown requested, monitor loop exiting after current cycle");
                break;
            }
        }

        summary
    }

    /// fetch -> observe -> decide -> play -> persist
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let records = self.source.fetch().await?;
        let observation = Observation::from_records(&records)?;
        debug!(
            name: "monitor.observation",
            is_active = observation.is_active,
            event_last_update = %display_in_zone(&observation.event_timestamp, self.time_zone),
            region = %observation.region_label(),
            event_type = %observation.event_type,
            "observed alert status"
        );

        let mut states = self.current_states()?;
        let notification = self.machine.evaluate(&mut states, &observation, now);
        if let Some(notification) = &notification {
            self.announce(notification).await;
        }

        if !self.announced {
            self.announced = true;
            info!(
                name: "monitor.started",
                region = %observation.display_name(),
                state = if observation.is_active { "active" } else { "inactive" },
                "monitoring alerts for region"
            );
        }

        self.persist(states)?;

        Ok(CycleReport {
            observation,
            notification,
        })
    }

    fn current_states(&mut self) -> Result<AlertStates, PersistenceError> {
        if self.dirty
            && let Some(cached) = &self.cached
        {
            return Ok(cached.clone());
        }

        match self.store.load() {
            Ok(states) => Ok(states),
            Err(e) => match &self.cached {
                Some(cached) => {
                    warn!(name: "monitor.store.load_failed", error = %e, "could not read alert state, continuing with in-memory copy");
                    Ok(cached.clone())
                }
                None => Err(e),
            },
        }
    }

    fn persist(&mut self, states: AlertStates) -> Result<(), PersistenceError> {
        let saved = self.store.save(&states);
        self.dirty = saved.is_err();
        self.cached = Some(states);
        saved
    }

    async fn announce(&self, notification: &Notification) {
        let message = match (notification.kind, notification.trigger) {
            (NotificationKind::AlertStart, Trigger::Unacknowledged) => "alert is still active",
            (NotificationKind::AlertStart, _) => "alert started",
            (NotificationKind::AlertEnd, _) => "alert ended",
            (NotificationKind::Repeat, _) => "alert is still active (reminder)",
        };
        info!(
            name: "monitor.notification",
            region = %notification.region_name,
            event_type = %notification.event_type,
            kind = ?notification.kind,
            trigger = ?notification.trigger,
            "{message}"
        );

        let Some(path) = self.sounds.resolve(&notification.sound) else {
            debug!(sound = %notification.sound, "no sound configured, skipping playback");
            return;
        };

        if let Err(e) = self.notifier.play(path).await {
            warn!(name: "monitor.playback.failed", error = %e, path = %path.display(), "failed to play sound");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, PlaybackError};
    use alert_core::api::{ActiveAlert, RegionAlerts};
    use alert_core::repeat::RepeatInterval;
    use alert_core::store::JsonFileStore;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::tempdir;

    type Poll = Result<Vec<RegionAlerts>, FetchError>;

    struct ScriptedSource {
        polls: Mutex<VecDeque<Poll>>,
    }

    impl ScriptedSource {
        fn new(polls: impl IntoIterator<Item = Poll>) -> Self {
            Self {
                polls: Mutex::new(polls.into_iter().collect()),
            }
        }
    }

    impl AlertSource for ScriptedSource {
        async fn fetch(&self) -> Poll {
            self.polls.lock().pop_front().unwrap_or_else(|| Ok(vec![]))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        played: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl Notifier for RecordingNotifier {
        async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
            self.played.lock().push(path.to_path_buf());
            Ok(())
        }
    }

    /// Store whose reads and writes can be made to fail.
    #[derive(Clone, Default)]
    struct FlakyStore {
        saved: Arc<Mutex<Option<AlertStates>>>,
        fail_load: Arc<Mutex<bool>>,
        fail_save: Arc<Mutex<bool>>,
    }

    fn io_failure() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only")
    }

    impl StateStore for FlakyStore {
        fn load(&self) -> Result<AlertStates, PersistenceError> {
            if *self.fail_load.lock() {
                return Err(PersistenceError::Read {
                    path: PathBuf::from("state.json"),
                    source: io_failure(),
                });
            }
            Ok(self.saved.lock().clone().unwrap_or_default())
        }

        fn save(&self, states: &AlertStates) -> Result<(), PersistenceError> {
            if *self.fail_save.lock() {
                return Err(PersistenceError::Write {
                    path: PathBuf::from("state.json"),
                    source: io_failure(),
                });
            }
            *self.saved.lock() = Some(states.clone());
            Ok(())
        }
    }

    fn records(alerts: &[(&str, &str)]) -> Vec<RegionAlerts> {
        vec![RegionAlerts {
            region_id: "31".to_string(),
            region_type: "State".to_string(),
            region_name: "м. Київ".to_string(),
            region_eng_name: "Kyiv City".to_string(),
            last_update: "2024-01-01T09:00:00Z".to_string(),
            active_alerts: alerts
                .iter()
                .map(|(alert_type, last_update)| ActiveAlert {
                    region_id: "31".to_string(),
                    region_type: "State".to_string(),
                    alert_type: alert_type.to_string(),
                    last_update: last_update.to_string(),
                })
                .collect(),
        }]
    }

    fn active() -> Poll {
        Ok(records(&[("AIR", "2024-01-01T10:00:00Z")]))
    }

    fn quiet() -> Poll {
        Ok(records(&[]))
    }

    fn sounds() -> SoundBook {
        let files = HashMap::from([("AIR".to_string(), PathBuf::from("air.mp3"))]);
        SoundBook::new(
            &files,
            Some(PathBuf::from("clear.mp3")),
            Some(PathBuf::from("repeat.mp3")),
        )
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn monitor<St: StateStore>(
        polls: impl IntoIterator<Item = Poll>,
        store: St,
        repeat_minutes: Option<i64>,
    ) -> (Monitor<ScriptedSource, RecordingNotifier, St>, RecordingNotifier) {
        let notifier = RecordingNotifier::default();
        let machine = AlertStateMachine::new(repeat_minutes.and_then(RepeatInterval::from_minutes));
        let monitor = Monitor::new(
            ScriptedSource::new(polls),
            notifier.clone(),
            store,
            sounds(),
            machine,
            chrono_tz::UTC,
        );
        (monitor, notifier)
    }

    #[tokio::test]
    async fn plays_start_end_and_reminders() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        let (mut monitor, notifier) = monitor(
            [quiet(), active(), active(), active(), quiet()],
            store.clone(),
            Some(15),
        );

        for now in [
            "2024-01-01T09:59:00Z",
            "2024-01-01T10:00:30Z",
            "2024-01-01T10:15:10Z",
            "2024-01-01T10:15:40Z",
            "2024-01-01T10:20:00Z",
        ] {
            monitor.run_cycle(at(now)).await.unwrap();
        }

        assert_eq!(
            *notifier.played.lock(),
            vec![
                PathBuf::from("air.mp3"),
                PathBuf::from("repeat.mp3"),
                PathBuf::from("clear.mp3")
            ]
        );
        let persisted = store.load().unwrap();
        assert!(!persisted.get("31").unwrap().is_active);
    }

    #[tokio::test]
    async fn source_failures_skip_the_cycle() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        let bad_json = serde_json::from_str::<Vec<RegionAlerts>>("<html>").unwrap_err();
        let (mut monitor, notifier) =
            monitor([Err(FetchError::from(bad_json)), Ok(vec![])], store.clone(), None);

        let now = at("2024-01-01T10:00:00Z");
        assert!(matches!(
            monitor.run_cycle(now).await,
            Err(CycleError::SourceUnavailable(_))
        ));
        assert!(matches!(
            monitor.run_cycle(now).await,
            Err(CycleError::EmptySource)
        ));
        assert!(notifier.played.lock().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn restart_does_not_replay_start() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        let now = at("2024-01-01T10:01:00Z");

        let (mut first, first_notifier) = monitor([active()], store.clone(), None);
        let report = first.run_cycle(now).await.unwrap();
        assert_eq!(
            report.notification.map(|n| n.kind),
            Some(NotificationKind::AlertStart)
        );
        assert_eq!(first_notifier.played.lock().len(), 1);

        let (mut second, second_notifier) = monitor([active()], store, None);
        let report = second.run_cycle(now).await.unwrap();
        assert!(report.notification.is_none());
        assert!(second_notifier.played.lock().is_empty());
    }

    #[tokio::test]
    async fn load_failure_without_cache_drops_observation() {
        let store = FlakyStore::default();
        *store.fail_load.lock() = true;
        let (mut monitor, notifier) = monitor([active()], store, None);

        let result = monitor.run_cycle(at("2024-01-01T10:00:00Z")).await;
        assert!(matches!(result, Err(CycleError::Persistence(_))));
        assert!(notifier.played.lock().is_empty());
    }

    #[tokio::test]
    async fn load_failure_falls_back_to_cached_records() {
        let store = FlakyStore::default();
        let (mut monitor, notifier) = monitor([active(), active()], store.clone(), None);
        let now = at("2024-01-01T10:00:00Z");

        monitor.run_cycle(now).await.unwrap();
        *store.fail_load.lock() = true;
        let report = monitor.run_cycle(now).await.unwrap();

        assert!(report.notification.is_none());
        assert_eq!(notifier.played.lock().len(), 1);
    }

    #[tokio::test]
    async fn unsaved_records_win_over_stale_store() {
        let store = FlakyStore::default();
        let (mut monitor, notifier) = monitor([quiet(), active(), active()], store.clone(), None);
        let now = at("2024-01-01T10:00:00Z");

        monitor.run_cycle(now).await.unwrap();
        *store.fail_save.lock() = true;
        let result = monitor.run_cycle(now).await;
        assert!(matches!(result, Err(CycleError::Persistence(_))));
        assert_eq!(notifier.played.lock().len(), 1);

        // The store still says inactive; the start must not be replayed.
        *store.fail_save.lock() = false;
        let report = monitor.run_cycle(now).await.unwrap();
        assert!(report.notification.is_none());
        assert_eq!(notifier.played.lock().len(), 1);
        assert!(store.load().unwrap().get("31").unwrap().is_active);
    }

    #[tokio::test]
    async fn unmapped_sound_is_silent() {
        let store = FlakyStore::default();
        let (mut monitor, notifier) = monitor(
            [Ok(records(&[("NUCLEAR", "2024-01-01T10:00:00Z")]))],
            store,
            None,
        );

        let report = monitor.run_cycle(at("2024-01-01T10:00:00Z")).await.unwrap();
        assert_eq!(
            report.notification.map(|n| n.kind),
            Some(NotificationKind::AlertStart)
        );
        assert!(notifier.played.lock().is_empty());
    }

    #[tokio::test]
    async fn loop_finishes_cycle_then_honours_shutdown() {
        let store = FlakyStore::default();
        let (monitor, notifier) = monitor([active()], store.clone(), None);
        let status = PollStatus::default();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let summary = monitor
            .run(status.clone(), Duration::from_secs(3600), shutdown)
            .await;

        assert_eq!(
            summary,
            RunSummary {
                cycles: 1,
                failed_cycles: 0,
                notifications: 1
            }
        );
        assert_eq!(notifier.played.lock().len(), 1);
        assert!(status.last_successful_poll.read().is_some());
        assert!(status.last_error.read().is_none());
        assert!(store.load().unwrap().get("31").is_some());
    }

    #[tokio::test]
    async fn loop_counts_failed_cycles() {
        let (monitor, notifier) = monitor([Ok(vec![])], FlakyStore::default(), None);
        let status = PollStatus::default();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let summary = monitor
            .run(status.clone(), Duration::from_secs(3600), shutdown)
            .await;

        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.failed_cycles, 1);
        assert_eq!(summary.notifications, 0);
        assert!(notifier.played.lock().is_empty());
        assert!(matches!(
            *status.last_error.read(),
            Some(CycleError::EmptySource)
        ));
        assert!(status.last_successful_poll.read().is_none());
    }
}
