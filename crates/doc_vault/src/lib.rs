//! File-backed document store: one pretty-printed JSON file per achievement
//! document under `<root>/achievements/`.

pub mod vault;

use async_trait::async_trait;
use records_core::clock;
use records_core::error::StoreError;
use records_core::schema::{AchievementDocument, FileMeta, NewDocument};
use records_core::store::DocumentStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use vault::VaultPaths;

pub struct VaultDocumentStore {
    paths: Arc<VaultPaths>,
    timeout: Duration,
    // Serializes file mutations. Guards are moved into the blocking task so a
    // timed-out call keeps the lock until its work is actually done.
    write_lock: Arc<Mutex<()>>,
}

impl VaultDocumentStore {
    /// Creates the vault directories if missing.
    pub fn open(root: impl Into<PathBuf>, timeout: Duration) -> Result<Self, StoreError> {
        let paths = VaultPaths::new(root);
        paths.ensure()?;
        Ok(Self {
            paths: Arc::new(paths),
            timeout,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&VaultPaths) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let paths = Arc::clone(&self.paths);
        let task = tokio::task::spawn_blocking(move || f(&paths));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Runs `f` on the blocking pool while holding the write lock.
    async fn call_locked<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&VaultPaths) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        self.call(move |paths| {
            let _guard = guard;
            f(paths)
        })
        .await
    }
}

#[async_trait]
impl DocumentStore for VaultDocumentStore {
    /// A timed-out insert is undone once the pending write finishes, so the
    /// caller never has to compensate for a document it was not told about.
    async fn insert(&self, document: NewDocument) -> Result<AchievementDocument, StoreError> {
        let created_at = clock::now();
        let doc = AchievementDocument {
            id: vault::new_document_id(created_at.unix_timestamp()),
            student_id: document.student_id,
            title: document.title,
            description: document.description,
            files: Vec::new(),
            extra: document.extra,
            created_at,
            updated_at: None,
        };
        let path = self
            .paths
            .document_path(&doc.id)
            .ok_or(StoreError::UnknownId)?;

        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let stored = doc.clone();
        let target = path.clone();
        let mut task = tokio::task::spawn_blocking(move || vault::write_document(&target, &stored));

        let outcome = tokio::time::timeout(self.timeout, &mut task).await;
        match outcome {
            Ok(joined) => {
                drop(guard);
                joined??;
                debug!(document_id = %doc.id, "document written");
                Ok(doc)
            }
            Err(_) => {
                warn!(
                    document_id = %doc.id,
                    timeout = ?self.timeout,
                    "document insert timed out, removing it once the write settles"
                );
                let document_id = doc.id;
                tokio::spawn(async move {
                    let _guard = guard;
                    if let Ok(Ok(())) = task.await {
                        let removed =
                            tokio::task::spawn_blocking(move || vault::remove_document(&path)).await;
                        if !matches!(removed, Ok(Ok(_))) {
                            warn!(document_id = %document_id, "late document write could not be removed");
                        }
                    }
                });
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<AchievementDocument>, StoreError> {
        let id = id.to_string();
        self.call(move |paths| match paths.document_path(&id) {
            Some(path) => vault::read_document(&path),
            None => Ok(None),
        })
        .await
    }

    async fn push_file(&self, id: &str, file: FileMeta) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.call_locked(move |paths| {
            let Some(path) = paths.document_path(&id) else {
                return Ok(false);
            };
            let Some(mut doc) = vault::read_document(&path)? else {
                return Ok(false);
            };
            doc.files.push(file);
            doc.updated_at = Some(clock::now());
            vault::write_document(&path, &doc)?;
            Ok(true)
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.call_locked(move |paths| match paths.document_path(&id) {
            Some(path) => vault::remove_document(&path),
            None => Ok(false),
        })
        .await
    }
}
