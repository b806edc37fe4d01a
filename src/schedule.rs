//! Schedule compilation: mapping "now + reminder set" to armed-timer specs.
//!
//! [`compile`] is a pure function of its inputs, which keeps it trivially
//! testable against a synthetic clock. It intentionally looks at *today
//! only*: a slot whose time-of-day has already passed is omitted for this
//! cycle rather than rolled over to tomorrow. The resynchronization loop
//! re-runs the compiler after midnight, at which point the same slot is in
//! the future again and gets armed. Rescheduling for "the next valid
//! occurrence" here instead would need fired-today bookkeeping to avoid
//! double-firing on repeated compiles within one day.

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::warn;

use crate::model::{ReminderRecord, parse_time_slot};

/// Identity of one pending timer: one slot of one reminder.
///
/// Used for deduplication and cancellation by the timer engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerKey {
    pub reminder_id: i64,
    pub slot_index: usize,
}

/// One countdown the timer engine should have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedSpec {
    pub key: TimerKey,
    /// Milliseconds from `now` (at compile time) to the slot's wall-clock
    /// time today. Never negative; zero means due immediately.
    pub delay_ms: u64,
}

/// Compile the reminder set into the timers that should be armed right now.
///
/// Rules, in order:
///
/// 1. Reminders with notifications disabled contribute nothing.
/// 2. A reminder whose active date range excludes today's calendar date
///    contributes nothing. The range is inclusive on both ends and compared
///    at day granularity, ignoring time-of-day.
/// 3. Each remaining slot is armed with the delay until its time-of-day
///    today; slots already in the past are omitted (no rollover, see the
///    module docs). A delay of exactly zero is kept.
///
/// A malformed reminder (inverted date range) is skipped whole, and a
/// malformed slot is skipped individually, each with a warning. One bad
/// record never prevents the rest of the set from being scheduled.
///
/// Output order is stable: reminder order, then slot order.
pub fn compile(now: NaiveDateTime, reminders: &[ReminderRecord]) -> Vec<ArmedSpec> {
    let today = now.date();
    let mut specs = Vec::new();

    for reminder in reminders {
        if !reminder.notification_enabled {
            continue;
        }

        if let Some(end) = reminder.end_date {
            if reminder.start_date > end {
                warn!(
                    reminder_id = reminder.id,
                    "Skipping reminder with inverted date range"
                );
                continue;
            }
            if today > end {
                continue;
            }
        }
        if today < reminder.start_date {
            continue;
        }

        for (slot_index, slot) in reminder.time_slots.iter().enumerate() {
            let Some(time_of_day) = parse_time_slot(slot) else {
                warn!(
                    reminder_id = reminder.id,
                    slot_index,
                    slot = %slot,
                    "Skipping malformed time slot"
                );
                continue;
            };

            let fire_at = today.and_time(time_of_day);
            let delay_ms = (fire_at - now).num_milliseconds();
            if delay_ms < 0 {
                // Already passed today; tomorrow's compile picks it up again
                continue;
            }

            specs.push(ArmedSpec {
                key: TimerKey {
                    reminder_id: reminder.id,
                    slot_index,
                },
                delay_ms: delay_ms as u64,
            });
        }
    }

    specs
}

/// The minute a wall-clock instant falls in, used as the resync watermark.
pub fn minute_of(now: NaiveDateTime) -> (chrono::NaiveDate, u32, u32) {
    (now.date(), now.hour(), now.minute())
}
