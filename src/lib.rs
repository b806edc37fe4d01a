//! Pillbox - a local-first medication reminder service.
//!
//! # Overview
//!
//! Pillbox persists recurring medication reminders as JSON record sets in a
//! local SQLite file and runs a scheduling engine over them: each compile
//! cycle works out which time slots are still due *today*, arms one-shot
//! timers, and fires a notification when a timer elapses. The engine
//! resynchronizes at least once per wall-clock minute and immediately after
//! any reminder mutation.
//!
//! # Local-first
//!
//! Reminder data never leaves the machine. The one exception is the
//! assistant endpoint, which forwards a user prompt to an external
//! chat-completion API; nothing from the reminder store is attached to it.
//!
//! # API Endpoints
//!
//! - `GET/POST /owners/:owner/reminders` - List / create reminders
//! - `PATCH/DELETE /owners/:owner/reminders/:id` - Update / delete
//! - `POST /owners/:owner/scheduler/{start,stop}` - Mount / unmount the
//!   owner's scheduling session
//! - `GET /owners/:owner/scheduler/status` - Pending timers
//! - `GET/POST /notifications/permission[/request]` - Permission gate
//! - `POST /assistant` - Chat-completion passthrough
//! - `GET /health` - Health check
//!
//! # Modules
//!
//! - [`model`]: Reminder records, drafts, patches, and validation
//! - [`storage`]: SQLite-backed key-value record store
//! - [`repository`]: Generic per-owner record repositories
//! - [`schedule`]: Pure compilation of "now + reminders" into timer specs
//! - [`engine`]: Timer arming, deduplication, and cancellation
//! - [`resync`]: The per-owner resynchronization loop
//! - [`notify`]: Permission gate and notification dispatch
//! - [`assistant`]: Chat-completion client
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod assistant;
pub mod engine;
pub mod error;
pub mod model;
pub mod notify;
pub mod repository;
pub mod resync;
pub mod schedule;
pub mod storage;
