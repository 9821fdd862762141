use crate::store::RegionAlertState;
use crate::time::{floor_to_minute, minute_key, parse_timestamp};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Reminder cadence. Only positive whole minutes can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatInterval(TimeDelta);

impl RepeatInterval {
    pub fn from_minutes(minutes: i64) -> Option<Self> {
        if minutes <= 0 {
            return None;
        }
        TimeDelta::try_minutes(minutes).map(Self)
    }

    pub fn minutes(&self) -> i64 {
        self.0.num_minutes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatEvent {
    pub region_id: String,
    pub slot: DateTime<Utc>,
}

impl RepeatEvent {
    pub fn minute_key(&self) -> String {
        minute_key(self.slot)
    }
}

/// Minute slots that already produced a reminder, per region.
#[derive(Debug, Default)]
pub struct RepeatLedger {
    played: HashMap<String, HashSet<String>>,
}

impl RepeatLedger {
    /// Returns `false` when the slot was already recorded.
    fn record(&mut self, region_id: &str, minute_key: String) -> bool {
        self.played
            .entry(region_id.to_string())
            .or_default()
            .insert(minute_key)
    }

    fn forget(&mut self, region_id: &str) {
        self.played.remove(region_id);
    }

    pub fn contains(&self, region_id: &str, minute_key: &str) -> bool {
        self.played
            .get(region_id)
            .is_some_and(|keys| keys.contains(minute_key))
    }

    pub fn slots(&self, region_id: &str) -> usize {
        self.played.get(region_id).map_or(0, HashSet::len)
    }
}

/// The slot due at `now`, if `now` lands exactly on `anchor + k * interval`
/// for some `k >= 1`. Both instants are compared at minute granularity.
/// Past slots are never backfilled.
pub fn due_slot(
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
    interval: RepeatInterval,
) -> Option<DateTime<Utc>> {
    let anchor = floor_to_minute(anchor);
    let now = floor_to_minute(now);
    let elapsed = (now - anchor).num_minutes();
    let step = interval.minutes();

    (elapsed >= step && elapsed % step == 0).then_some(now)
}

/// Decides periodic "still active" reminders for continuously active alerts.
#[derive(Debug)]
pub struct RepeatScheduler {
    interval: RepeatInterval,
    ledger: RepeatLedger,
}

impl RepeatScheduler {
    pub fn new(interval: RepeatInterval) -> Self {
        Self {
            interval,
            ledger: RepeatLedger::default(),
        }
    }

    pub fn ledger(&self) -> &RepeatLedger {
        &self.ledger
    }

    /// Anchored on the record's `event_last_update`. Fires at most once per
    /// slot no matter how many times it is asked within that minute.
    pub fn maybe_repeat(
        &mut self,
        state: &RegionAlertState,
        now: DateTime<Utc>,
    ) -> Option<RepeatEvent> {
        let Some(anchor) = parse_timestamp(&state.event_last_update) else {
            debug!(
                name: "repeat.anchor.malformed",
                region = %state.region_id,
                event_last_update = %state.event_last_update,
                "cannot anchor reminders on an unparseable timestamp, skipping"
            );
            return None;
        };

        let slot = due_slot(anchor, now, self.interval)?;
        if !self.ledger.record(&state.region_id, minute_key(slot)) {
            trace!(region = %state.region_id, slot = %slot, "reminder already played for this slot");
            return None;
        }

        Some(RepeatEvent {
            region_id: state.region_id.clone(),
            slot,
        })
    }

    /// Drops the remembered slots of a region. Called whenever the region's
    /// alert starts or ends, since the next alert has a different anchor.
    pub fn reset(&mut self, region_id: &str) {
        self.ledger.forget(region_id);
    }
}
