#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use records_core::clock;
use records_core::db::SqliteStore;
use records_core::error::StoreError;
use records_core::schema::{
    AchievementDocument, AchievementReference, FileMeta, HistoryEntry, NewDocument, Principal,
};
use records_core::store::{DocumentStore, HistoryLedger, ReferenceStore};
use records_core::Coordinator;

/// In-process document store keyed by a counter-derived id.
#[derive(Default)]
pub struct MemoryDocuments {
    docs: Mutex<BTreeMap<String, AchievementDocument>>,
    next_id: AtomicUsize,
}

impl MemoryDocuments {
    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn document(&self, id: &str) -> Option<AchievementDocument> {
        self.docs.lock().unwrap().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.lock().unwrap().contains_key(id)
    }

    pub fn remove(&self, id: &str) {
        self.docs.lock().unwrap().remove(id);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn insert(&self, document: NewDocument) -> Result<AchievementDocument, StoreError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let doc = AchievementDocument {
            id: format!("{n:024x}"),
            student_id: document.student_id,
            title: document.title,
            description: document.description,
            files: Vec::new(),
            extra: document.extra,
            created_at: clock::now(),
            updated_at: None,
        };
        self.docs.lock().unwrap().insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    async fn get(&self, id: &str) -> Result<Option<AchievementDocument>, StoreError> {
        Ok(self.docs.lock().unwrap().get(id).cloned())
    }

    async fn push_file(&self, id: &str, file: FileMeta) -> Result<bool, StoreError> {
        let mut docs = self.docs.lock().unwrap();
        match docs.get_mut(id) {
            Some(doc) => {
                doc.files.push(file);
                doc.updated_at = Some(clock::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.docs.lock().unwrap().remove(id).is_some())
    }
}

/// Delegates to a real store but refuses every insert.
pub struct RejectingInserts(pub Arc<SqliteStore>);

#[async_trait]
impl ReferenceStore for RejectingInserts {
    async fn insert(&self, _reference: &AchievementReference) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("reference store offline".into()))
    }

    async fn find(&self, id: &str) -> Result<Option<AchievementReference>, StoreError> {
        self.0.find(id).await
    }

    async fn list(&self, student_id: Option<&str>) -> Result<Vec<AchievementReference>, StoreError> {
        self.0.list(student_id).await
    }

    async fn update_status(
        &self,
        next: &AchievementReference,
        expected_revision: i64,
    ) -> Result<(), StoreError> {
        self.0.update_status(next, expected_revision).await
    }

    async fn update_document_ref(
        &self,
        id: &str,
        document_ref: &str,
        updated_at: time::OffsetDateTime,
        expected_revision: i64,
    ) -> Result<(), StoreError> {
        self.0
            .update_document_ref(id, document_ref, updated_at, expected_revision)
            .await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.0.delete(id).await
    }
}

/// Ledger whose reads and/or writes are switched off.
pub struct BrokenLedger {
    pub inner: Arc<SqliteStore>,
    pub fail_append: bool,
    pub fail_entries: bool,
}

#[async_trait]
impl HistoryLedger for BrokenLedger {
    async fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        if self.fail_append {
            return Err(StoreError::Unavailable("ledger offline".into()));
        }
        self.inner.append(entry).await
    }

    async fn entries(&self, achievement_ref_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        if self.fail_entries {
            return Err(StoreError::Unavailable("ledger offline".into()));
        }
        self.inner.entries(achievement_ref_id).await
    }
}

pub struct Harness {
    pub sql: Arc<SqliteStore>,
    pub documents: Arc<MemoryDocuments>,
    pub coordinator: Coordinator,
}

pub fn harness() -> Harness {
    let sql = Arc::new(SqliteStore::in_memory().unwrap());
    let documents = Arc::new(MemoryDocuments::default());
    let coordinator = Coordinator::new(sql.clone(), sql.clone(), documents.clone());
    Harness {
        sql,
        documents,
        coordinator,
    }
}

pub fn student(id: &str) -> Principal {
    Principal::new(id, "Mahasiswa")
}

pub fn lecturer(id: &str) -> Principal {
    Principal::new(id, "Dosen Wali")
}

pub fn admin() -> Principal {
    Principal::new("U0", "Admin")
}
