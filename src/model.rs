//! Data models for Pillbox.
//!
//! # Local-first
//!
//! Every type here is persisted only in the local SQLite file, namespaced by
//! an owner identity (typically an account email). There is no server-side
//! counterpart: removing a record from the store is permanent destruction.
//!
//! The JSON field names match the record shape the companion UI has always
//! written (`medication_name`, `time_slots`, `start_date`, ...), so an
//! existing store remains readable.

use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A recurring medication reminder owned by a single user.
///
/// The authoritative schedule is `time_slots`; `frequency` is an advisory
/// hint for display. A reminder fires on every day inside
/// `[start_date, end_date]` (both inclusive), once per slot, while
/// `notification_enabled` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRecord {
    /// Unique within the owner's record set, assigned at creation, immutable.
    pub id: i64,

    /// The identity that owns this record; all repository operations are
    /// scoped by this key.
    pub owner_id: String,

    /// Display name of the medication. Non-empty.
    pub medication_name: String,

    /// Free-form dose description, e.g. "200mg".
    #[serde(default)]
    pub dosage: Option<String>,

    /// Advisory frequency tag. The schedule is driven by `time_slots`.
    #[serde(default)]
    pub frequency: Frequency,

    /// Times of day to fire, as `"HH:MM"` 24-hour strings, in slot order.
    /// Non-empty. Parse-validated on create/update and re-checked with
    /// skip-and-continue semantics when the schedule is compiled.
    pub time_slots: Vec<String>,

    /// First day (inclusive) the reminder may fire.
    pub start_date: NaiveDate,

    /// Last day (inclusive) the reminder may fire; `None` means no expiry.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    /// When false the record is retained but produces no timers.
    pub notification_enabled: bool,

    /// Shown inside the notification body.
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReminderRecord {
    /// Check the data-model invariants before the record is persisted.
    ///
    /// The first violated invariant is reported with its field name so the
    /// API layer can surface a field-level message.
    pub fn validate(&self) -> Result<(), Error> {
        if self.medication_name.trim().is_empty() {
            return Err(Error::validation(
                "medication_name",
                "medication name must not be empty",
            ));
        }

        if self.time_slots.is_empty() {
            return Err(Error::validation(
                "time_slots",
                "at least one time slot is required",
            ));
        }

        for slot in &self.time_slots {
            if parse_time_slot(slot).is_none() {
                return Err(Error::validation(
                    "time_slots",
                    format!("'{slot}' is not a valid 24-hour HH:MM time"),
                ));
            }
        }

        if let Some(end) = self.end_date {
            if self.start_date > end {
                return Err(Error::validation(
                    "end_date",
                    "end date must not be before start date",
                ));
            }
        }

        Ok(())
    }

    /// Title line for the platform notification.
    pub fn notification_title(&self) -> String {
        format!("Medication Reminder - {}", self.medication_name)
    }

    /// Body text for the platform notification: the dose, then any notes on
    /// a second line.
    pub fn notification_body(&self) -> String {
        let dose = self.dosage.as_deref().unwrap_or(&self.medication_name);
        match self.notes.as_deref() {
            Some(notes) if !notes.is_empty() => format!("Time to take {dose}\n{notes}"),
            _ => format!("Time to take {dose}"),
        }
    }
}

/// Parse a `"HH:MM"` 24-hour time-of-day string.
///
/// Returns `None` rather than an error so the schedule compiler can skip bad
/// slots without aborting a compile cycle.
pub fn parse_time_slot(slot: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(slot, "%H:%M").ok()
}

/// Advisory frequency categories offered by the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    OnceDaily,
    TwiceDaily,
    ThreeTimesDaily,
    Every4Hours,
    Every6Hours,
    AsNeeded,
}

impl Frequency {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Frequency::OnceDaily => "Once daily",
            Frequency::TwiceDaily => "Twice daily",
            Frequency::ThreeTimesDaily => "Three times daily",
            Frequency::Every4Hours => "Every 4 hours",
            Frequency::Every6Hours => "Every 6 hours",
            Frequency::AsNeeded => "As needed",
        }
    }
}

/// Request body for creating a reminder. The server assigns `id` and
/// `owner_id`; everything else comes from the client, with the same defaults
/// the UI form uses.
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderDraft {
    pub medication_name: String,

    #[serde(default)]
    pub dosage: Option<String>,

    #[serde(default)]
    pub frequency: Frequency,

    pub time_slots: Vec<String>,

    /// Defaults to today when omitted.
    #[serde(default = "today")]
    pub start_date: NaiveDate,

    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    #[serde(default = "default_enabled")]
    pub notification_enabled: bool,

    #[serde(default)]
    pub notes: Option<String>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn default_enabled() -> bool {
    true
}

/// Partial update for an existing reminder. Absent fields are left unchanged;
/// there is no way to clear an optional field back to unset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReminderPatch {
    pub medication_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<Frequency>,
    pub time_slots: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notification_enabled: Option<bool>,
    pub notes: Option<String>,
}

impl ReminderPatch {
    /// Merge the provided fields into `record`, leaving the rest untouched.
    /// `id` and `owner_id` are immutable and never merged.
    pub fn apply_to(&self, record: &mut ReminderRecord) {
        if let Some(name) = &self.medication_name {
            record.medication_name = name.clone();
        }
        if let Some(dosage) = &self.dosage {
            record.dosage = Some(dosage.clone());
        }
        if let Some(frequency) = self.frequency {
            record.frequency = frequency;
        }
        if let Some(slots) = &self.time_slots {
            record.time_slots = slots.clone();
        }
        if let Some(start) = self.start_date {
            record.start_date = start;
        }
        if let Some(end) = self.end_date {
            record.end_date = Some(end);
        }
        if let Some(enabled) = self.notification_enabled {
            record.notification_enabled = enabled;
        }
        if let Some(notes) = &self.notes {
            record.notes = Some(notes.clone());
        }
    }
}
