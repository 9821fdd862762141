use crate::observation::Observation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read state file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode state file {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode alert state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write state file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Last known alert status of one region.
///
/// Field names on disk are kept compatible with state files written by
/// earlier versions of the monitor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegionAlertState {
    #[serde(rename = "eventRegion")]
    pub region_id: String,
    pub is_active: bool,
    #[serde(default)]
    pub event_last_update: String,
    #[serde(default)]
    pub active_event_type: String,
    /// Set once a notification went out for the current active/inactive status.
    #[serde(rename = "alarmed")]
    pub notified_for_current_transition: bool,
}

impl RegionAlertState {
    pub fn first_sight(observation: &Observation) -> Self {
        Self {
            region_id: observation.region_id.clone(),
            is_active: observation.is_active,
            event_last_update: observation.event_timestamp.clone(),
            active_event_type: observation.event_type.clone(),
            notified_for_current_transition: true,
        }
    }
}

/// Every region ever observed, in first-seen order. Records are never removed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct AlertStates(Vec<RegionAlertState>);

impl AlertStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, region_id: &str) -> Option<&RegionAlertState> {
        self.0.iter().find(|s| s.region_id == region_id)
    }

    pub fn get_mut(&mut self, region_id: &str) -> Option<&mut RegionAlertState> {
        self.0.iter_mut().find(|s| s.region_id == region_id)
    }

    /// Moves the record stored under `from` to `to`. Returns `false` and
    /// leaves the records alone when `from` is unknown or `to` is taken.
    pub fn rekey(&mut self, from: &str, to: &str) -> bool {
        if self.get(to).is_some() {
            return false;
        }
        match self.get_mut(from) {
            Some(state) => {
                state.region_id = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn push(&mut self, state: RegionAlertState) {
        self.0.push(state);
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionAlertState> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<RegionAlertState>> for AlertStates {
    fn from(states: Vec<RegionAlertState>) -> Self {
        Self(states)
    }
}

pub trait StateStore {
    fn load(&self) -> Result<AlertStates, PersistenceError>;
    fn save(&self, states: &AlertStates) -> Result<(), PersistenceError>;
}

/// JSON array on disk. A missing or blank file is an empty store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<AlertStates, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file yet, starting empty");
                return Ok(AlertStates::new());
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(AlertStates::new());
        }

        let states: Option<AlertStates> =
            serde_json::from_str(&content).map_err(|source| PersistenceError::Decode {
                path: self.path.clone(),
                source,
            })?;
        Ok(states.unwrap_or_default())
    }

    fn save(&self, states: &AlertStates) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_string_pretty(states)?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, encoded).map_err(|source| PersistenceError::Write {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &self.path).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
