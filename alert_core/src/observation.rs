use crate::api::{ActiveAlert, RegionAlerts};
use crate::time::{is_before, parse_timestamp};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObservationError {
    #[error("alert source returned no records")]
    EmptySource,
}

/// What one poll tells us about the monitored area.
///
/// `region_id` is the key of the persisted record and always comes from the
/// top-level record, so the start and the end of an alert update the same
/// entry. `event_region_id` is the region of the representative sub-event
/// and is informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub is_active: bool,
    pub event_timestamp: String,
    pub region_id: String,
    pub event_region_id: String,
    pub region_display_name: String,
    pub region_english_name: String,
    pub event_type: String,
}

impl Observation {
    /// Derives the observation from the first record of a poll. When several
    /// sub-events are active the earliest one represents the area; the first
    /// in source order wins on equal timestamps.
    pub fn from_records(records: &[RegionAlerts]) -> Result<Self, ObservationError> {
        let record = records.first().ok_or(ObservationError::EmptySource)?;

        let Some(representative) = earliest_alert(&record.active_alerts) else {
            return Ok(Self {
                is_active: false,
                event_timestamp: record.last_update.clone(),
                region_id: record.region_id.clone(),
                event_region_id: record.region_id.clone(),
                region_display_name: record.region_name.clone(),
                region_english_name: record.region_eng_name.clone(),
                event_type: String::new(),
            });
        };

        Ok(Self {
            is_active: true,
            event_timestamp: representative.last_update.clone(),
            region_id: record.region_id.clone(),
            event_region_id: representative.region_id.clone(),
            region_display_name: record.region_name.clone(),
            region_english_name: record.region_eng_name.clone(),
            event_type: representative.alert_type.clone(),
        })
    }

    /// `id (english name)`, or just the id when no english name is known.
    pub fn region_label(&self) -> String {
        if self.region_english_name.is_empty() {
            self.region_id.clone()
        } else {
            format!("{} ({})", self.region_id, self.region_english_name)
        }
    }

    /// Human-facing name, falling back through english name and id.
    pub fn display_name(&self) -> &str {
        [
            &self.region_display_name,
            &self.region_english_name,
            &self.region_id,
        ]
        .into_iter()
        .find(|name| !name.is_empty())
        .map_or("", String::as_str)
    }
}

fn earliest_alert(alerts: &[ActiveAlert]) -> Option<&ActiveAlert> {
    let (first, rest) = alerts.split_first()?;

    for alert in alerts {
        if parse_timestamp(&alert.last_update).is_none() {
            warn!(
                name: "observation.timestamp.malformed",
                region = %alert.region_id,
                alert_type = %alert.alert_type,
                last_update = %alert.last_update,
                "active alert has an unparseable timestamp, it will not be picked as earliest"
            );
        }
    }

    Some(rest.iter().fold(first, |earliest, alert| {
        if is_before(&alert.last_update, &earliest.last_update) {
            alert
        } else {
            earliest
        }
    }))
}
