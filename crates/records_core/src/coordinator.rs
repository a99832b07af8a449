//! Orchestrates achievement operations across the reference store, the
//! document store and the history ledger.
//!
//! The reference row is authoritative. Document reads and history writes are
//! best-effort; document writes made before a reference insert are undone by
//! compensation rather than by a shared transaction.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attachments::AttachmentHandler;
use crate::best_effort;
use crate::clock;
use crate::error::{RecordsError, Result, StoreError};
use crate::saga::{Compensation, Saga};
use crate::schema::{
    AchievementReference, AchievementView, CreateAchievementRequest, CreatedAchievement,
    DocumentView, History, NewDocument, Principal,
};
use crate::store::{DocumentStore, HistoryLedger, ReferenceStore};
use crate::workflow::{self, Transition};

pub const DEFAULT_ADMIN_ROLE: &str = "Admin";

pub struct Coordinator {
    references: Arc<dyn ReferenceStore>,
    ledger: Arc<dyn HistoryLedger>,
    documents: Arc<dyn DocumentStore>,
    admin_role: String,
}

impl Coordinator {
    pub fn new(
        references: Arc<dyn ReferenceStore>,
        ledger: Arc<dyn HistoryLedger>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            references,
            ledger,
            documents,
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
        }
    }

    pub fn with_admin_role(mut self, role: impl Into<String>) -> Self {
        self.admin_role = role.into();
        self
    }

    pub fn attachments(&self) -> AttachmentHandler {
        AttachmentHandler::new(Arc::clone(&self.references), Arc::clone(&self.documents))
    }

    /// Writes the document, then the draft reference pointing at it. A failed
    /// reference insert deletes the just-written document before the error
    /// is returned.
    pub async fn create(
        &self,
        principal: Option<&Principal>,
        request: CreateAchievementRequest,
    ) -> Result<CreatedAchievement> {
        let student_id = request.student_id.trim();
        if student_id.is_empty() {
            return Err(RecordsError::validation("student_id required"));
        }
        let student_id = student_id.to_string();

        let documents = &self.documents;
        let mut saga = Saga::new("achievement.create");
        let document = saga
            .step(
                "document insert",
                documents.insert(NewDocument {
                    student_id: student_id.clone(),
                    title: non_blank(request.title),
                    description: non_blank(request.description),
                    extra: request.doc,
                }),
                |doc| {
                    let id = doc.id.clone();
                    let undo: Compensation<'_> =
                        Box::pin(async move { documents.delete(&id).await.map(|_| ()) });
                    undo
                },
            )
            .await
            .map_err(RecordsError::persistence("document insert"))?;

        let reference = AchievementReference::new_draft(
            Uuid::new_v4().to_string(),
            student_id,
            Some(document.id.clone()),
            clock::now(),
        );
        saga.finish("reference insert", self.references.insert(&reference))
            .await
            .map_err(RecordsError::persistence("reference insert"))?;

        info!(
            reference_id = %reference.id,
            document_id = %document.id,
            student_id = %reference.student_id,
            actor = principal.and_then(Principal::actor).unwrap_or("-"),
            "achievement created"
        );
        Ok(CreatedAchievement {
            reference_id: reference.id,
            document_id: document.id,
        })
    }

    /// The reference is always returned; the document is merged in only if
    /// it can be read.
    pub async fn get(&self, id: &str) -> Result<AchievementView> {
        let reference = self.load(id).await?;
        Ok(self.merge(reference).await)
    }

    /// Administrators may list everything; everyone else must name a student.
    pub async fn list(
        &self,
        principal: Option<&Principal>,
        student_id: Option<&str>,
    ) -> Result<Vec<AchievementView>> {
        let filter = student_id.map(str::trim).filter(|s| !s.is_empty());
        let is_admin = principal.is_some_and(|p| p.has_role(&self.admin_role));
        if !is_admin && filter.is_none() {
            return Err(RecordsError::validation("student_id required"));
        }

        let rows = self
            .references
            .list(filter)
            .await
            .map_err(RecordsError::persistence("reference list"))?;

        let mut out = Vec::with_capacity(rows.len());
        for reference in rows {
            out.push(self.merge(reference).await);
        }
        Ok(out)
    }

    /// Repoints the reference at another document. The target is not checked
    /// for existence; a dangling link only degrades later reads.
    pub async fn update_document_link(
        &self,
        principal: Option<&Principal>,
        id: &str,
        document_ref: &str,
    ) -> Result<AchievementReference> {
        let document_ref = document_ref.trim();
        if document_ref.is_empty() {
            return Err(RecordsError::validation("document_ref must not be empty"));
        }

        let mut reference = self.load(id).await?;
        let now = clock::now();
        self.references
            .update_document_ref(id, document_ref, now, reference.revision)
            .await
            .map_err(|err| write_failed("document link update", id, err))?;

        reference.document_ref = Some(document_ref.to_string());
        reference.updated_at = Some(now);
        reference.revision += 1;

        info!(
            reference_id = %id,
            document_id = %document_ref,
            actor = principal.and_then(Principal::actor).unwrap_or("-"),
            "achievement document link updated"
        );
        Ok(reference)
    }

    /// Removes the linked document (best-effort), then the reference.
    pub async fn delete(&self, principal: Option<&Principal>, id: &str) -> Result<()> {
        let reference = self.load(id).await?;

        if let Some(doc_id) = linked_document(&reference) {
            best_effort::absorb("document delete", self.documents.delete(doc_id)).await;
        }

        let removed = self
            .references
            .delete(id)
            .await
            .map_err(RecordsError::persistence("reference delete"))?;
        if !removed {
            return Err(RecordsError::not_found("achievement", id));
        }

        info!(
            reference_id = %id,
            actor = principal.and_then(Principal::actor).unwrap_or("-"),
            "achievement deleted"
        );
        Ok(())
    }

    pub async fn submit(
        &self,
        principal: Option<&Principal>,
        id: &str,
    ) -> Result<AchievementReference> {
        let actor = principal.and_then(Principal::actor).map(str::to_string);
        self.transition(id, Transition::Submit { actor }).await
    }

    pub async fn verify(
        &self,
        principal: Option<&Principal>,
        id: &str,
    ) -> Result<AchievementReference> {
        let actor = require_actor(principal, "verify")?;
        self.transition(id, Transition::Verify { actor }).await
    }

    pub async fn reject(
        &self,
        principal: Option<&Principal>,
        id: &str,
        note: &str,
    ) -> Result<AchievementReference> {
        let actor = require_actor(principal, "reject")?;
        let note = note.trim();
        if note.is_empty() {
            return Err(RecordsError::validation("note required"));
        }
        self.transition(
            id,
            Transition::Reject {
                actor,
                note: note.to_string(),
            },
        )
        .await
    }

    /// Ledger entries newest first. When the ledger cannot be read the
    /// current reference is returned as a one-element history instead.
    pub async fn history(&self, id: &str) -> Result<History> {
        match self.ledger.entries(id).await {
            Ok(entries) => Ok(History::Ledger(entries)),
            Err(err) => {
                warn!(
                    reference_id = %id,
                    error = %err,
                    "history ledger unreadable, falling back to current reference"
                );
                let current = self.load(id).await?;
                Ok(History::Current(vec![current]))
            }
        }
    }

    async fn transition(&self, id: &str, transition: Transition) -> Result<AchievementReference> {
        let current = self.load(id).await?;
        let now = clock::now();
        let next = workflow::apply(&current, &transition, now)?;

        self.references
            .update_status(&next, current.revision)
            .await
            .map_err(|err| write_failed("status update", id, err))?;

        let entry = workflow::history_entry(&current, &transition, now);
        best_effort::absorb("history append", self.ledger.append(&entry)).await;

        info!(
            reference_id = %id,
            from = %current.status,
            to = %next.status,
            actor = transition.actor().unwrap_or("-"),
            "achievement status changed"
        );
        Ok(next)
    }

    async fn load(&self, id: &str) -> Result<AchievementReference> {
        self.references
            .find(id)
            .await
            .map_err(RecordsError::persistence("reference lookup"))?
            .ok_or_else(|| RecordsError::not_found("achievement", id))
    }

    async fn merge(&self, reference: AchievementReference) -> AchievementView {
        let doc = match linked_document(&reference) {
            Some(doc_id) => {
                let doc = best_effort::absorb("document merge", self.documents.get(doc_id))
                    .await
                    .flatten();
                if doc.is_none() {
                    debug!(
                        reference_id = %reference.id,
                        document_id = %doc_id,
                        "document unavailable, returning reference only"
                    );
                }
                doc.map(DocumentView::from)
            }
            None => None,
        };

        AchievementView { reference, doc }
    }
}

fn linked_document(reference: &AchievementReference) -> Option<&str> {
    reference
        .document_ref
        .as_deref()
        .filter(|id| !id.trim().is_empty())
}

fn require_actor(principal: Option<&Principal>, operation: &str) -> Result<String> {
    principal
        .and_then(Principal::actor)
        .map(str::to_string)
        .ok_or_else(|| RecordsError::Forbidden(format!("{operation} requires an authenticated principal")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn write_failed(context: &'static str, id: &str, err: StoreError) -> RecordsError {
    match err {
        StoreError::RevisionMismatch { expected, actual } => RecordsError::Conflict(format!(
            "achievement {id} was modified concurrently (revision {expected}, now {actual})"
        )),
        StoreError::UnknownId => RecordsError::not_found("achievement", id),
        other => RecordsError::persistence(context)(other),
    }
}
