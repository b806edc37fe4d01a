//! Notification permission gate and dispatch.
//!
//! Permission is tri-state, matching the browser notification model the
//! companion UI exposes: `default` (never asked), `granted`, `denied`.
//! Denial is an expected user choice, not an error: the fire path checks the
//! gate *at fire time* (permission can change between arming and firing) and
//! quietly does nothing when it is not granted.

use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Tri-state notification authorization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Permission has never been requested.
    #[default]
    Default,
    /// The user allowed notifications.
    Granted,
    /// The user refused notifications.
    Denied,
}

impl FromStr for PermissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionState::Default),
            "granted" => Ok(PermissionState::Granted),
            "denied" => Ok(PermissionState::Denied),
            other => Err(format!("unknown permission state '{other}'")),
        }
    }
}

/// Process-wide permission gate.
///
/// In the browser this is a user-paced prompt; headless, a `request` from
/// the unasked state grants, while an explicit denial (set at startup or via
/// [`PermissionGate::deny`]) is sticky until re-requested through `reset`.
pub struct PermissionGate {
    state: Mutex<PermissionState>,
}

impl PermissionGate {
    pub fn new(initial: PermissionState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    /// The current authorization state.
    pub fn current(&self) -> PermissionState {
        *self.state.lock().unwrap()
    }

    /// Request authorization and return the resulting state.
    ///
    /// Only the unasked state transitions; `granted` and `denied` are
    /// returned unchanged.
    pub fn request(&self) -> PermissionState {
        let mut state = self.state.lock().unwrap();
        if *state == PermissionState::Default {
            *state = PermissionState::Granted;
            info!("Notification permission granted");
        }
        *state
    }

    /// Mark notifications as refused.
    pub fn deny(&self) {
        *self.state.lock().unwrap() = PermissionState::Denied;
    }

    /// Return to the unasked state.
    pub fn reset(&self) {
        *self.state.lock().unwrap() = PermissionState::Default;
    }
}

/// Best-effort delivery of a user-visible notification.
///
/// The engine owns *when* to fire; implementations own *how* the text
/// reaches the user. Delivery is fire-and-forget with no receipt.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Notifier that writes the notification to the structured log.
///
/// Stands in for an OS-level notification surface; a desktop integration
/// would swap in its own `Notifier` without touching the scheduler.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title = %title, body = %body, "Notification delivered");
    }
}
