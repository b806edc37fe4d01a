//! HTTP API handlers for Pillbox.
//!
//! Routes are scoped by owner id, mirroring how the key-value store
//! namespaces record sets. Reminder mutations kick the owner's scheduler
//! session (if one is mounted) so armed timers track the record set without
//! waiting for the next poll.
//!
//! Error mapping: validation failures are `422` with a field-level message,
//! unknown ids are `404`, storage problems are `500`. The assistant endpoint
//! is always `200`; its failures travel inside the reply string.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::assistant::AssistantClient;
use crate::error::Error;
use crate::model::{ReminderDraft, ReminderPatch, ReminderRecord};
use crate::notify::{Notifier, PermissionGate, PermissionState};
use crate::repository::ReminderRepository;
use crate::resync::{Scheduler, SchedulerSet};
use crate::schedule::TimerKey;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub reminders: ReminderRepository,
    pub schedulers: SchedulerSet,
    pub gate: Arc<PermissionGate>,
    pub notifier: Arc<dyn Notifier>,
    pub assistant: AssistantClient,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/owners/:owner/reminders",
            get(list_reminders).post(create_reminder),
        )
        .route(
            "/owners/:owner/reminders/:id",
            patch(update_reminder).delete(delete_reminder),
        )
        .route("/owners/:owner/scheduler/start", post(start_scheduler))
        .route("/owners/:owner/scheduler/stop", post(stop_scheduler))
        .route("/owners/:owner/scheduler/status", get(scheduler_status))
        .route("/notifications/permission", get(get_permission))
        .route(
            "/notifications/permission/request",
            post(request_permission),
        )
        .route("/assistant", post(ask_assistant))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Storage(_) | Error::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self, "Request failed against the backing store");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /owners/:owner/reminders - List the owner's reminders.
///
/// Never fails: absent or unreadable storage reads as an empty list.
#[instrument(skip(state))]
pub async fn list_reminders(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Json<Vec<ReminderRecord>> {
    let records = state.reminders.list(&owner).await;
    info!(owner = %owner, count = records.len(), "Reminders listed");
    Json(records)
}

/// POST /owners/:owner/reminders - Create a reminder.
///
/// # Response
///
/// `201 Created` with the stored record, including its assigned id.
/// `422` with a field-level message when validation fails; nothing is
/// persisted in that case.
#[instrument(skip(state, draft))]
pub async fn create_reminder(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(draft): Json<ReminderDraft>,
) -> Result<(StatusCode, Json<ReminderRecord>), Error> {
    let record = state.reminders.create(&owner, draft).await?;
    info!(
        owner = %owner,
        reminder_id = record.id,
        slots = record.time_slots.len(),
        "Reminder created"
    );
    state.schedulers.kick(&owner);
    Ok((StatusCode::CREATED, Json(record)))
}

/// PATCH /owners/:owner/reminders/:id - Merge fields into a reminder.
///
/// `404` when the id does not exist for this owner.
#[instrument(skip(state, patch))]
pub async fn update_reminder(
    State(state): State<AppState>,
    Path((owner, id)): Path<(String, i64)>,
    Json(patch): Json<ReminderPatch>,
) -> Result<Json<ReminderRecord>, Error> {
    let record = state.reminders.update(&owner, id, &patch).await?;
    info!(owner = %owner, reminder_id = id, "Reminder updated");
    state.schedulers.kick(&owner);
    Ok(Json(record))
}

/// DELETE /owners/:owner/reminders/:id - Remove a reminder.
///
/// Idempotent: deleting an absent id is still `204`.
#[instrument(skip(state))]
pub async fn delete_reminder(
    State(state): State<AppState>,
    Path((owner, id)): Path<(String, i64)>,
) -> Result<StatusCode, Error> {
    state.reminders.remove(&owner, id).await?;
    info!(owner = %owner, reminder_id = id, "Reminder deleted");
    state.schedulers.kick(&owner);
    Ok(StatusCode::NO_CONTENT)
}

/// Status of one owner's scheduler session.
#[derive(Debug, Serialize)]
pub struct SchedulerStatusResponse {
    pub running: bool,
    pub pending: Vec<TimerKey>,
}

/// POST /owners/:owner/scheduler/start - Mount the owner's scheduler.
///
/// Spawns the resynchronization loop for this owner, or keeps the existing
/// one; an immediate compile cycle arms timers for today's remaining slots.
#[instrument(skip(state))]
pub async fn start_scheduler(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> (StatusCode, Json<SchedulerStatusResponse>) {
    let scheduler = Scheduler::new(
        owner.clone(),
        state.reminders.clone(),
        Arc::clone(&state.gate),
        Arc::clone(&state.notifier),
    );
    let started = state.schedulers.start(&owner, scheduler);
    info!(owner = %owner, started, "Scheduler start requested");

    let (running, pending) = state.schedulers.status(&owner);
    (
        StatusCode::ACCEPTED,
        Json(SchedulerStatusResponse { running, pending }),
    )
}

/// POST /owners/:owner/scheduler/stop - Tear the owner's scheduler down.
///
/// Cancels every pending timer for the session. Idempotent.
#[instrument(skip(state))]
pub async fn stop_scheduler(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> StatusCode {
    state.schedulers.stop(&owner);
    StatusCode::NO_CONTENT
}

/// GET /owners/:owner/scheduler/status - Session liveness and pending timers.
#[instrument(skip(state))]
pub async fn scheduler_status(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Json<SchedulerStatusResponse> {
    let (running, pending) = state.schedulers.status(&owner);
    Json(SchedulerStatusResponse { running, pending })
}

/// Current notification permission.
#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub state: PermissionState,
}

/// GET /notifications/permission - Current tri-state permission.
pub async fn get_permission(State(state): State<AppState>) -> Json<PermissionResponse> {
    Json(PermissionResponse {
        state: state.gate.current(),
    })
}

/// POST /notifications/permission/request - Request notification permission.
///
/// Returns the resulting state; a previous denial stays denied.
#[instrument(skip(state))]
pub async fn request_permission(State(state): State<AppState>) -> Json<PermissionResponse> {
    let new_state = state.gate.request();
    info!(state = ?new_state, "Permission requested");
    Json(PermissionResponse { state: new_state })
}

/// Request body for POST /assistant.
#[derive(Debug, Deserialize)]
pub struct AssistantRequest {
    pub prompt: String,
}

/// Response for POST /assistant.
#[derive(Debug, Serialize)]
pub struct AssistantResponse {
    pub reply: String,
}

/// POST /assistant - Forward a prompt to the chat-completion provider.
///
/// Always `200`; failures are encoded in the reply string with an
/// `"Error:"` or `"API Error:"` prefix. The prompt is never logged.
#[instrument(skip(state, request))]
pub async fn ask_assistant(
    State(state): State<AppState>,
    Json(request): Json<AssistantRequest>,
) -> Json<AssistantResponse> {
    let reply = state.assistant.generate_content(&request.prompt).await;
    info!(reply_len = reply.len(), "Assistant replied");
    Json(AssistantResponse { reply })
}
