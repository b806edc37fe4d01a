//! The resynchronization loop: keeping armed timers in step with the clock
//! and the reminder set.
//!
//! One [`Scheduler`] exists per mounted owner session. Its loop polls every
//! ten seconds against a last-synced-minute watermark, so a compile cycle
//! runs at least once per wall-clock minute, and an explicit kick (sent by
//! the API layer after any reminder mutation) forces a cycle immediately.
//! Session lifecycle: `Idle -> Syncing -> Armed -> ... -> Torn-down`;
//! teardown cancels every pending timer.
//!
//! A failed or partial compile cycle is logged and absorbed: the next tick
//! recovers, and a malformed reminder never stops the rest of the set from
//! being scheduled (see `schedule::compile`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::TimerEngine;
use crate::model::ReminderRecord;
use crate::notify::{Notifier, PermissionGate, PermissionState};
use crate::repository::ReminderRepository;
use crate::schedule::{TimerKey, compile, minute_of};

/// Seconds between watermark checks. Short enough to catch every minute
/// boundary.
const RESYNC_POLL_SECS: u64 = 10;

/// One owner's scheduling session.
pub struct Scheduler {
    owner_id: String,
    reminders: ReminderRepository,
    engine: Arc<TimerEngine>,
    gate: Arc<PermissionGate>,
    notifier: Arc<dyn Notifier>,
}

impl Scheduler {
    pub fn new(
        owner_id: impl Into<String>,
        reminders: ReminderRepository,
        gate: Arc<PermissionGate>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            reminders,
            engine: Arc::new(TimerEngine::new()),
            gate,
            notifier,
        }
    }

    /// The engine backing this session, for status inspection.
    pub fn engine(&self) -> Arc<TimerEngine> {
        Arc::clone(&self.engine)
    }

    /// Run one compile cycle: list, compile, reconcile timers.
    ///
    /// Each armed timer captures the reminder snapshot taken here, so a fire
    /// reads the record as it was when the timer was armed.
    pub async fn resync(&self, now: NaiveDateTime) {
        let records = self.reminders.list(&self.owner_id).await;
        let specs = compile(now, &records);

        let snapshot: Arc<Vec<ReminderRecord>> = Arc::new(records);
        let gate = Arc::clone(&self.gate);
        let notifier = Arc::clone(&self.notifier);

        self.engine.sync(now, &specs, move |key| {
            fire(&snapshot, &gate, notifier.as_ref(), key);
        });

        debug!(
            owner = %self.owner_id,
            compiled = specs.len(),
            pending = self.engine.pending_len(),
            "Schedule synchronized"
        );
    }

    /// Start the session loop, consuming the scheduler.
    pub fn spawn(self) -> SchedulerHandle {
        let kick = Arc::new(Notify::new());
        let engine = self.engine();
        let owner_id = self.owner_id.clone();

        let task = tokio::spawn(self.run(Arc::clone(&kick)));
        info!(owner = %owner_id, "Scheduler session started");

        SchedulerHandle { kick, engine, task }
    }

    async fn run(self, kick: Arc<Notify>) {
        let mut tick = tokio::time::interval(Duration::from_secs(RESYNC_POLL_SECS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_synced: Option<(chrono::NaiveDate, u32, u32)> = None;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now = Local::now().naive_local();
                    // Resync only when the clock has entered a new minute
                    if last_synced != Some(minute_of(now)) {
                        self.resync(now).await;
                        last_synced = Some(minute_of(now));
                    }
                }
                _ = kick.notified() => {
                    let now = Local::now().naive_local();
                    self.resync(now).await;
                    last_synced = Some(minute_of(now));
                }
            }
        }
    }
}

/// Deliver one elapsed timer, best effort.
///
/// Permission is checked here, at fire time, because it can change between
/// arming and firing. The enabled flag is re-checked against the snapshot
/// the timer was armed from.
fn fire(
    reminders: &[ReminderRecord],
    gate: &PermissionGate,
    notifier: &dyn Notifier,
    key: TimerKey,
) {
    if gate.current() != PermissionState::Granted {
        debug!(?key, "Notification suppressed: permission not granted");
        return;
    }

    let Some(reminder) = reminders.iter().find(|r| r.id == key.reminder_id) else {
        return;
    };
    if !reminder.notification_enabled {
        return;
    }

    notifier.notify(
        &reminder.notification_title(),
        &reminder.notification_body(),
    );
    info!(
        reminder_id = key.reminder_id,
        slot_index = key.slot_index,
        medication = %reminder.medication_name,
        "Reminder fired"
    );
}

/// Control handle for a running scheduler session.
pub struct SchedulerHandle {
    kick: Arc<Notify>,
    engine: Arc<TimerEngine>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask the loop to resync now (after a reminder mutation).
    pub fn kick(&self) {
        self.kick.notify_one();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn pending_keys(&self) -> Vec<TimerKey> {
        self.engine.pending_keys()
    }

    /// Tear the session down: stop the loop and cancel every pending timer,
    /// so nothing keeps firing for an unmounted session.
    pub fn shutdown(self) {
        self.task.abort();
        self.engine.cancel_all();
    }
}

/// Registry of running sessions, one per owner.
///
/// Mounting an owner twice reuses the existing session rather than starting
/// a competing loop.
#[derive(Clone, Default)]
pub struct SchedulerSet {
    sessions: Arc<Mutex<HashMap<String, SchedulerHandle>>>,
}

impl SchedulerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for the owner, or keep the existing one.
    ///
    /// Returns true when a new session was started. The provided scheduler
    /// is dropped unused when the owner already has a live session.
    pub fn start(&self, owner_id: &str, scheduler: Scheduler) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(existing) = sessions.get(owner_id) {
            if existing.is_running() {
                return false;
            }
        }
        sessions.insert(owner_id.to_string(), scheduler.spawn());
        true
    }

    /// Stop and tear down the owner's session. Idempotent; returns true when
    /// a session was actually torn down.
    pub fn stop(&self, owner_id: &str) -> bool {
        let handle = self.sessions.lock().unwrap().remove(owner_id);
        match handle {
            Some(handle) => {
                handle.shutdown();
                info!(owner = %owner_id, "Scheduler session torn down");
                true
            }
            None => false,
        }
    }

    /// Kick the owner's loop if one is running; a no-op otherwise.
    pub fn kick(&self, owner_id: &str) {
        if let Some(handle) = self.sessions.lock().unwrap().get(owner_id) {
            handle.kick();
        }
    }

    /// Whether the owner has a live session, and its pending timer keys.
    pub fn status(&self, owner_id: &str) -> (bool, Vec<TimerKey>) {
        match self.sessions.lock().unwrap().get(owner_id) {
            Some(handle) if handle.is_running() => (true, handle.pending_keys()),
            _ => (false, Vec::new()),
        }
    }
}
