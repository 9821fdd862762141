use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ALL_CLEAR_KEY: &str = "alertOnEmpty";
pub const REPEAT_KEY: &str = "repeatAudio";

/// Logical sound a notification asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sound {
    /// Per-type alert sound, keyed by the API event type (`AIR`, `ARTILLERY`, ...).
    EventType(String),
    AllClear,
    Repeat,
}

impl Sound {
    pub fn key(&self) -> &str {
        match self {
            Sound::EventType(event_type) => event_type,
            Sound::AllClear => ALL_CLEAR_KEY,
            Sound::Repeat => REPEAT_KEY,
        }
    }
}

impl Display for Sound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Resolves logical sounds to files.
///
/// Event types are matched case-insensitively since environment overrides
/// arrive lowercased.
#[derive(Debug, Clone, Default)]
pub struct SoundBook {
    by_event_type: HashMap<String, PathBuf>,
    all_clear: Option<PathBuf>,
    repeat: Option<PathBuf>,
}

impl SoundBook {
    pub fn new(
        by_event_type: &HashMap<String, PathBuf>,
        all_clear: Option<PathBuf>,
        repeat: Option<PathBuf>,
    ) -> Self {
        Self {
            by_event_type: by_event_type
                .iter()
                .map(|(event_type, path)| (event_type.to_lowercase(), path.clone()))
                .collect(),
            all_clear,
            repeat,
        }
    }

    /// `None` for unmapped or empty entries; callers treat that as silence.
    pub fn resolve(&self, sound: &Sound) -> Option<&Path> {
        let path = match sound {
            Sound::EventType(event_type) if event_type.is_empty() => None,
            Sound::EventType(event_type) => self.by_event_type.get(&event_type.to_lowercase()),
            Sound::AllClear => self.all_clear.as_ref(),
            Sound::Repeat => self.repeat.as_ref(),
        }?;
        (!path.as_os_str().is_empty()).then_some(path.as_path())
    }
}
