//! Alert state machine: turns one observation into at most one notification
//! and keeps the per-region records current.

use crate::observation::Observation;
use crate::repeat::{RepeatEvent, RepeatInterval, RepeatScheduler};
use crate::sound::Sound;
use crate::store::{AlertStates, RegionAlertState};
use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    AlertStart,
    AlertEnd,
    Repeat,
}

/// Why a notification was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The region had no record and is active on first sight.
    FirstSight,
    StatusChanged,
    /// Status did not change but no notification was recorded for it yet.
    Unacknowledged,
    Reminder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub trigger: Trigger,
    pub region_id: String,
    pub region_name: String,
    pub event_type: String,
    pub sound: Sound,
}

impl Notification {
    fn for_status(observation: &Observation, trigger: Trigger) -> Self {
        let (kind, sound) = if observation.is_active {
            (
                NotificationKind::AlertStart,
                Sound::EventType(observation.event_type.clone()),
            )
        } else {
            (NotificationKind::AlertEnd, Sound::AllClear)
        };

        Self {
            kind,
            trigger,
            region_id: observation.region_id.clone(),
            region_name: observation.display_name().to_string(),
            event_type: observation.event_type.clone(),
            sound,
        }
    }

    fn reminder(observation: &Observation, event: RepeatEvent) -> Self {
        Self {
            kind: NotificationKind::Repeat,
            trigger: Trigger::Reminder,
            region_id: event.region_id,
            region_name: observation.display_name().to_string(),
            event_type: observation.event_type.clone(),
            sound: Sound::Repeat,
        }
    }
}

/// Outcome of the pure transition step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Notify(Notification),
    /// Alert still active and already announced; a reminder may be due.
    CheckRepeat,
    Idle,
}

/// Applies one observation to the records.
///
/// The matching record always ends up with the observation's timestamp and
/// event type, whichever branch is taken, so reminders anchor on the freshest
/// data.
pub fn apply(states: &mut AlertStates, observation: &Observation) -> Decision {
    // Older state files keyed active records by the sub-event's region.
    if observation.event_region_id != observation.region_id
        && states.get(&observation.region_id).is_none()
        && states.rekey(&observation.event_region_id, &observation.region_id)
    {
        debug!(
            name: "machine.record.rekeyed",
            from = %observation.event_region_id,
            to = %observation.region_id,
            "moved record stored under the sub-event region"
        );
    }

    let Some(state) = states.get_mut(&observation.region_id) else {
        states.push(RegionAlertState::first_sight(observation));
        // An inactive first sight is recorded as announced so the next poll
        // does not report the end of an alert nobody saw start.
        return if observation.is_active {
            Decision::Notify(Notification::for_status(observation, Trigger::FirstSight))
        } else {
            Decision::Idle
        };
    };

    state.event_last_update = observation.event_timestamp.clone();
    state.active_event_type = observation.event_type.clone();

    if state.is_active != observation.is_active {
        state.is_active = observation.is_active;
        state.notified_for_current_transition = true;
        return Decision::Notify(Notification::for_status(
            observation,
            Trigger::StatusChanged,
        ));
    }

    if !state.notified_for_current_transition {
        state.notified_for_current_transition = true;
        return Decision::Notify(Notification::for_status(
            observation,
            Trigger::Unacknowledged,
        ));
    }

    if observation.is_active {
        Decision::CheckRepeat
    } else {
        Decision::Idle
    }
}

/// Transition step plus the optional reminder scheduler.
#[derive(Debug)]
pub struct AlertStateMachine {
    scheduler: Option<RepeatScheduler>,
}

impl AlertStateMachine {
    /// `None` disables reminders.
    pub fn new(repeat_interval: Option<RepeatInterval>) -> Self {
        Self {
            scheduler: repeat_interval.map(RepeatScheduler::new),
        }
    }

    pub fn scheduler(&self) -> Option<&RepeatScheduler> {
        self.scheduler.as_ref()
    }

    pub fn evaluate(
        &mut self,
        states: &mut AlertStates,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        match apply(states, observation) {
            Decision::Notify(notification) => {
                if let Some(scheduler) = self.scheduler.as_mut() {
                    scheduler.reset(&notification.region_id);
                }
                Some(notification)
            }
            Decision::CheckRepeat => {
                let scheduler = self.scheduler.as_mut()?;
                let state = states.get(&observation.region_id)?;
                scheduler
                    .maybe_repeat(state, now)
                    .map(|event| Notification::reminder(observation, event))
            }
            Decision::Idle => None,
        }
    }
}
