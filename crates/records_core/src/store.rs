//! Seams between the coordinator and the two independently-failable stores.
//!
//! The relational side ([`ReferenceStore`], [`HistoryLedger`]) and the
//! document side ([`DocumentStore`]) never share a transaction.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::schema::{AchievementDocument, AchievementReference, FileMeta, HistoryEntry, NewDocument};

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn insert(&self, reference: &AchievementReference) -> Result<(), StoreError>;

    async fn find(&self, id: &str) -> Result<Option<AchievementReference>, StoreError>;

    /// Newest first. `None` lists every student.
    async fn list(&self, student_id: Option<&str>) -> Result<Vec<AchievementReference>, StoreError>;

    /// Writes the workflow columns of `next` if the stored revision still
    /// equals `expected_revision`.
    async fn update_status(
        &self,
        next: &AchievementReference,
        expected_revision: i64,
    ) -> Result<(), StoreError>;

    async fn update_document_ref(
        &self,
        id: &str,
        document_ref: &str,
        updated_at: OffsetDateTime,
        expected_revision: i64,
    ) -> Result<(), StoreError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Append-only transition log; entries are never updated or deleted.
#[async_trait]
pub trait HistoryLedger: Send + Sync {
    async fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError>;

    /// Newest first.
    async fn entries(&self, achievement_ref_id: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores a new document and returns it with its generated id. An
    /// insert that reports failure leaves no document behind.
    async fn insert(&self, document: NewDocument) -> Result<AchievementDocument, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<AchievementDocument>, StoreError>;

    /// Appends to `files` without touching existing entries. Returns false
    /// when the document does not exist.
    async fn push_file(&self, id: &str, file: FileMeta) -> Result<bool, StoreError>;

    /// Idempotent; returns whether a document was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}
