//! Timer arming and deduplication.
//!
//! [`TimerEngine`] owns the live map of pending one-shot timers, keyed by
//! `(reminder, slot)`. All mutation funnels through [`TimerEngine::sync`]
//! and [`TimerEngine::cancel_all`], so tests can assert on the pending set
//! deterministically. The engine never re-arms a fired timer; the next
//! compile cycle decides whether the key should exist again (for a daily
//! reminder, that is tomorrow).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::schedule::{ArmedSpec, TimerKey};

/// One in-flight countdown.
struct ArmedTimer {
    /// The absolute wall-clock time the timer is due.
    fire_at: NaiveDateTime,
    handle: JoinHandle<()>,
}

/// Owns every pending platform timer for one scheduler session.
pub struct TimerEngine {
    // Shared with the spawned countdown tasks, which remove their own entry
    // on elapse.
    timers: Arc<Mutex<HashMap<TimerKey, ArmedTimer>>>,
    armed_total: AtomicU64,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            armed_total: AtomicU64::new(0),
        }
    }

    /// Reconcile the pending timer set against freshly compiled `specs`.
    ///
    /// - Pending timers whose key is absent from `specs` are stale (reminder
    ///   deleted, disabled, or out of date range) and are cancelled.
    /// - A spec whose key already has a pending timer is left untouched, so
    ///   a rapid resync never restarts an in-flight countdown.
    /// - Remaining specs get a new one-shot timer; on elapse the timer drops
    ///   its own map entry and then invokes `on_fire(key)` exactly once.
    ///
    /// The map lock is held for the whole reconciliation, so a timer firing
    /// mid-`sync` observes either the state before or after, never a partial
    /// one.
    pub fn sync<F>(&self, now: NaiveDateTime, specs: &[ArmedSpec], on_fire: F)
    where
        F: Fn(TimerKey) + Send + Sync + 'static,
    {
        let on_fire = Arc::new(on_fire);
        let wanted: HashSet<TimerKey> = specs.iter().map(|s| s.key).collect();

        let mut timers = self.timers.lock().unwrap();

        timers.retain(|key, timer| {
            if wanted.contains(key) {
                true
            } else {
                timer.handle.abort();
                debug!(?key, "Cancelled stale timer");
                false
            }
        });

        for spec in specs {
            if timers.contains_key(&spec.key) {
                continue;
            }

            let key = spec.key;
            let delay = Duration::from_millis(spec.delay_ms);
            let map = Arc::clone(&self.timers);
            let callback = Arc::clone(&on_fire);

            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // Entry out of the map before the callback runs: pending
                // never includes an already-elapsed timer.
                map.lock().unwrap().remove(&key);
                callback(key);
            });

            timers.insert(
                key,
                ArmedTimer {
                    fire_at: now + chrono::Duration::milliseconds(spec.delay_ms as i64),
                    handle,
                },
            );
            self.armed_total.fetch_add(1, Ordering::Relaxed);
            debug!(?key, delay_ms = spec.delay_ms, "Armed timer");
        }
    }

    /// Cancel every pending timer. Used on session teardown.
    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock().unwrap();
        for timer in timers.values() {
            timer.handle.abort();
        }
        let cancelled = timers.len();
        timers.clear();
        if cancelled > 0 {
            debug!(cancelled, "Cancelled all pending timers");
        }
    }

    /// Keys of all pending timers, sorted for reproducible assertions.
    pub fn pending_keys(&self) -> Vec<TimerKey> {
        let mut keys: Vec<TimerKey> = self.timers.lock().unwrap().keys().copied().collect();
        keys.sort();
        keys
    }

    /// Number of pending timers.
    pub fn pending_len(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    /// Earliest due time among pending timers, if any.
    pub fn next_fire_at(&self) -> Option<NaiveDateTime> {
        self.timers.lock().unwrap().values().map(|t| t.fire_at).min()
    }

    /// Total timers armed over the engine's lifetime. A `sync` that changes
    /// nothing leaves this unchanged, which makes idempotence observable.
    pub fn armed_total(&self) -> u64 {
        self.armed_total.load(Ordering::Relaxed)
    }
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn spec(reminder_id: i64, slot_index: usize, delay_ms: u64) -> ArmedSpec {
        ArmedSpec {
            key: TimerKey {
                reminder_id,
                slot_index,
            },
            delay_ms,
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(TimerKey) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&count);
        (count, move |_key| {
            captured.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_exactly_once() {
        let engine = TimerEngine::new();
        let (fired, on_fire) = counter();

        engine.sync(now(), &[spec(1, 0, 1_000)], on_fire);
        assert_eq!(engine.pending_len(), 1);

        tokio::time::sleep(Duration::from_millis(5_000)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // The fired timer removed its own entry and was not re-armed
        assert_eq!(engine.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_is_idempotent() {
        let engine = TimerEngine::new();
        let specs = vec![spec(1, 0, 60_000), spec(1, 1, 120_000)];

        let (_, on_fire) = counter();
        engine.sync(now(), &specs, on_fire);
        let (_, on_fire) = counter();
        engine.sync(now(), &specs, on_fire);

        // Second sync armed nothing new and cancelled nothing
        assert_eq!(engine.armed_total(), 2);
        assert_eq!(
            engine.pending_keys(),
            vec![
                TimerKey { reminder_id: 1, slot_index: 0 },
                TimerKey { reminder_id: 1, slot_index: 1 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_does_not_restart_inflight_countdown() {
        let engine = TimerEngine::new();
        let (fired, on_fire) = counter();

        engine.sync(now(), &[spec(1, 0, 1_000)], on_fire);
        tokio::time::sleep(Duration::from_millis(600)).await;

        // Resync with the same key; the 400ms-remaining timer must be kept,
        // not replaced by a fresh 1000ms one
        let (_, on_fire) = counter();
        engine.sync(now(), &[spec(1, 0, 1_000)], on_fire);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timers_cancelled_others_untouched() {
        let engine = TimerEngine::new();
        let (fired, on_fire) = counter();

        engine.sync(
            now(),
            &[spec(1, 0, 1_000), spec(1, 1, 1_000), spec(2, 0, 1_000)],
            on_fire,
        );
        assert_eq!(engine.pending_len(), 3);

        // Reminder 1 deleted: only its keys go
        let (kept_fired, on_fire) = counter();
        engine.sync(now(), &[spec(2, 0, 1_000)], on_fire);
        assert_eq!(
            engine.pending_keys(),
            vec![TimerKey { reminder_id: 2, slot_index: 0 }]
        );

        tokio::time::sleep(Duration::from_millis(2_000)).await;

        // The cancelled timers never fired; the survivor fired through its
        // original callback
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(kept_fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let engine = TimerEngine::new();
        let (fired, on_fire) = counter();

        engine.sync(now(), &[spec(1, 0, 500), spec(2, 0, 500)], on_fire);
        engine.cancel_all();

        assert_eq!(engine.pending_len(), 0);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_fires() {
        let engine = TimerEngine::new();
        let (fired, on_fire) = counter();

        engine.sync(now(), &[spec(1, 0, 0)], on_fire);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_fire_at_tracks_earliest() {
        let engine = TimerEngine::new();
        let (_, on_fire) = counter();

        engine.sync(now(), &[spec(1, 0, 120_000), spec(1, 1, 60_000)], on_fire);

        assert_eq!(
            engine.next_fire_at(),
            Some(now() + chrono::Duration::milliseconds(60_000))
        );
    }
}
