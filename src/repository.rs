//! Record repositories over the key-value store.
//!
//! [`Repository`] is a single generic accessor parameterized by record type;
//! the store key is derived from [`Record::STORE_NAME`] plus the owner id.
//! Per-feature record types (reminders, tasks, ...) all share this shape
//! rather than growing near-duplicate accessors per type.
//!
//! Read and write paths have deliberately different failure behavior:
//!
//! - `list` never fails. Absent or unreadable storage is an empty set, and a
//!   record that fails to decode individually is skipped with a warning so
//!   one malformed record never hides the rest.
//! - Mutations (`create`/`update`/`remove`) fail loudly. They re-read the
//!   full set strictly before rewriting it, because rewriting a set we could
//!   not fully decode would silently destroy records.

use std::marker::PhantomData;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::Error;
use crate::model::{ReminderDraft, ReminderPatch, ReminderRecord};
use crate::storage::{Storage, store_key};

/// A JSON-persistable record type with a stable store name and an id.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Plural record-type name used in the store key, e.g.
    /// `medicationReminders`.
    const STORE_NAME: &'static str;

    /// The record's unique id within one owner's set.
    fn id(&self) -> i64;
}

impl Record for ReminderRecord {
    const STORE_NAME: &'static str = "medicationReminders";

    fn id(&self) -> i64 {
        self.id
    }
}

/// Generic CRUD access to one record type in the key-value store.
#[derive(Clone)]
pub struct Repository<T: Record> {
    storage: Storage,
    _record: PhantomData<T>,
}

impl<T: Record> Repository<T> {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            _record: PhantomData,
        }
    }

    /// List all records for the owner, in insertion order.
    ///
    /// Never fails: storage errors, a missing key, and undecodable JSON all
    /// yield an empty (or partial) set with a warning.
    pub async fn list(&self, owner_id: &str) -> Vec<T> {
        let key = store_key(T::STORE_NAME, owner_id);

        let raw = match self.storage.read_key(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read record set, treating as empty");
                return Vec::new();
            }
        };

        let items: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(items) => items,
            Err(e) => {
                warn!(key = %key, error = %e, "Record set is not a JSON array, treating as empty");
                return Vec::new();
            }
        };

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<T>(item) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping undecodable record");
                }
            }
        }
        records
    }

    /// Load the full set strictly, for mutation paths.
    ///
    /// Unlike `list`, any decode failure is an error: see the module docs.
    async fn load_strict(&self, owner_id: &str) -> Result<Vec<T>, Error> {
        let key = store_key(T::STORE_NAME, owner_id);
        match self.storage.read_key(&key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Rewrite the owner's entire record set.
    async fn save_all(&self, owner_id: &str, records: &[T]) -> Result<(), Error> {
        let key = store_key(T::STORE_NAME, owner_id);
        let raw = serde_json::to_string(records)?;
        self.storage.write_key(&key, &raw).await
    }

    /// Remove the record with `id`. Idempotent: removing an id that does not
    /// exist is a no-op, not an error.
    pub async fn remove(&self, owner_id: &str, id: i64) -> Result<(), Error> {
        let mut records = self.load_strict(owner_id).await?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() != before {
            self.save_all(owner_id, &records).await?;
        }
        Ok(())
    }
}

/// Reminder CRUD with validation and id assignment layered on top of the
/// generic repository.
#[derive(Clone)]
pub struct ReminderRepository {
    inner: Repository<ReminderRecord>,
}

impl ReminderRepository {
    pub fn new(storage: Storage) -> Self {
        Self {
            inner: Repository::new(storage),
        }
    }

    /// List all reminders for the owner. Never fails.
    pub async fn list(&self, owner_id: &str) -> Vec<ReminderRecord> {
        self.inner.list(owner_id).await
    }

    /// Validate and persist a new reminder, returning the stored record with
    /// its assigned id. Nothing is written when validation fails.
    pub async fn create(
        &self,
        owner_id: &str,
        draft: ReminderDraft,
    ) -> Result<ReminderRecord, Error> {
        let mut records = self.inner.load_strict(owner_id).await?;

        let record = ReminderRecord {
            id: next_id(&records),
            owner_id: owner_id.to_string(),
            medication_name: draft.medication_name,
            dosage: draft.dosage,
            frequency: draft.frequency,
            time_slots: draft.time_slots,
            start_date: draft.start_date,
            end_date: draft.end_date,
            notification_enabled: draft.notification_enabled,
            notes: draft.notes,
        };
        record.validate()?;

        records.push(record.clone());
        self.inner.save_all(owner_id, &records).await?;
        Ok(record)
    }

    /// Merge `patch` into the record with `id` and persist the full set.
    /// The merged record is re-validated before anything is written.
    pub async fn update(
        &self,
        owner_id: &str,
        id: i64,
        patch: &ReminderPatch,
    ) -> Result<ReminderRecord, Error> {
        let mut records = self.inner.load_strict(owner_id).await?;

        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(Error::NotFound(id))?;

        patch.apply_to(record);
        record.validate()?;
        let updated = record.clone();

        self.inner.save_all(owner_id, &records).await?;
        Ok(updated)
    }

    /// Remove the reminder with `id`. Idempotent.
    pub async fn remove(&self, owner_id: &str, id: i64) -> Result<(), Error> {
        self.inner.remove(owner_id, id).await
    }
}

/// Assign the next record id: the current millisecond timestamp, bumped past
/// any collision with an existing id. Ids stay unique within the owner's set
/// even when records are created inside the same millisecond.
fn next_id<T: Record>(existing: &[T]) -> i64 {
    let mut id = Utc::now().timestamp_millis();
    while existing.iter().any(|r| r.id() == id) {
        id += 1;
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Frequency;
    use chrono::NaiveDate;

    async fn setup() -> (Storage, ReminderRepository) {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let repo = ReminderRepository::new(storage.clone());
        (storage, repo)
    }

    fn draft(name: &str) -> ReminderDraft {
        ReminderDraft {
            medication_name: name.to_string(),
            dosage: Some("1 tablet".to_string()),
            frequency: Frequency::OnceDaily,
            time_slots: vec!["09:00".to_string()],
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: None,
            notification_enabled: true,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_list_empty_owner() {
        let (_, repo) = setup().await;
        assert!(repo.list("nobody@example.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_create_then_list_roundtrip() {
        let (_, repo) = setup().await;

        let created = repo.create("a@example.com", draft("Aspirin")).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.owner_id, "a@example.com");

        let listed = repo.list("a@example.com").await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].medication_name, "Aspirin");
        assert_eq!(listed[0].dosage.as_deref(), Some("1 tablet"));
        assert_eq!(listed[0].time_slots, vec!["09:00"]);
    }

    #[tokio::test]
    async fn test_create_preserves_insertion_order() {
        let (_, repo) = setup().await;

        repo.create("a@example.com", draft("First")).await.unwrap();
        repo.create("a@example.com", draft("Second")).await.unwrap();
        repo.create("a@example.com", draft("Third")).await.unwrap();

        let names: Vec<String> = repo
            .list("a@example.com")
            .await
            .into_iter()
            .map(|r| r.medication_name)
            .collect();
        assert_eq!(names, vec!["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn test_ids_unique_within_owner() {
        let (_, repo) = setup().await;

        // Created back-to-back, likely within the same millisecond
        let a = repo.create("a@example.com", draft("A")).await.unwrap();
        let b = repo.create("a@example.com", draft("B")).await.unwrap();
        let c = repo.create("a@example.com", draft("C")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_owners_are_isolated() {
        let (_, repo) = setup().await;

        repo.create("a@example.com", draft("Mine")).await.unwrap();

        assert!(repo.list("b@example.com").await.is_empty());
        assert_eq!(repo.list("a@example.com").await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_create_writes_nothing() {
        let (_, repo) = setup().await;

        let mut bad = draft("Aspirin");
        bad.time_slots.clear();

        let err = repo.create("a@example.com", bad).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        // The failed create must not have persisted anything
        assert!(repo.list("a@example.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let (_, repo) = setup().await;

        let created = repo.create("a@example.com", draft("Aspirin")).await.unwrap();

        let patch = ReminderPatch {
            notification_enabled: Some(false),
            notes: Some("after breakfast".to_string()),
            ..ReminderPatch::default()
        };
        let updated = repo
            .update("a@example.com", created.id, &patch)
            .await
            .unwrap();

        assert!(!updated.notification_enabled);
        assert_eq!(updated.notes.as_deref(), Some("after breakfast"));
        // Unspecified fields unchanged
        assert_eq!(updated.medication_name, "Aspirin");
        assert_eq!(updated.time_slots, vec!["09:00"]);

        let listed = repo.list("a@example.com").await;
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].notification_enabled);
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let (_, repo) = setup().await;

        let err = repo
            .update("a@example.com", 12345, &ReminderPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(12345)));
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_merge() {
        let (_, repo) = setup().await;

        let created = repo.create("a@example.com", draft("Aspirin")).await.unwrap();

        let patch = ReminderPatch {
            time_slots: Some(vec!["99:99".to_string()]),
            ..ReminderPatch::default()
        };
        let err = repo
            .update("a@example.com", created.id, &patch)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        // The stored record kept its old slots
        let listed = repo.list("a@example.com").await;
        assert_eq!(listed[0].time_slots, vec!["09:00"]);
    }

    #[tokio::test]
    async fn test_remove_decrements_by_one() {
        let (_, repo) = setup().await;

        let first = repo.create("a@example.com", draft("First")).await.unwrap();
        repo.create("a@example.com", draft("Second")).await.unwrap();

        repo.remove("a@example.com", first.id).await.unwrap();

        let listed = repo.list("a@example.com").await;
        assert_eq!(listed.len(), 1);
        assert!(listed.iter().all(|r| r.id != first.id));
    }

    #[tokio::test]
    async fn test_remove_nonexistent_is_noop() {
        let (_, repo) = setup().await;

        repo.create("a@example.com", draft("Aspirin")).await.unwrap();
        repo.remove("a@example.com", 99999).await.unwrap();

        assert_eq!(repo.list("a@example.com").await.len(), 1);
    }

    #[tokio::test]
    async fn test_list_tolerates_garbage_value() {
        let (storage, repo) = setup().await;

        storage
            .write_key("medicationReminders_a@example.com", "not json at all")
            .await
            .unwrap();

        assert!(repo.list("a@example.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_only_undecodable_records() {
        let (storage, repo) = setup().await;

        let good = repo.create("a@example.com", draft("Good")).await.unwrap();

        // Splice a malformed record into the stored array by hand
        let raw = storage
            .read_key("medicationReminders_a@example.com")
            .await
            .unwrap()
            .unwrap();
        let mut items: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        items.push(serde_json::json!({"id": "not-a-number", "bogus": true}));
        storage
            .write_key(
                "medicationReminders_a@example.com",
                &serde_json::to_string(&items).unwrap(),
            )
            .await
            .unwrap();

        let listed = repo.list("a@example.com").await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, good.id);
    }
}
