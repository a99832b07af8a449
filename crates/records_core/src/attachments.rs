use std::sync::Arc;

use tracing::info;

use crate::clock;
use crate::error::{RecordsError, Result};
use crate::schema::FileMeta;
use crate::store::{DocumentStore, ReferenceStore};

/// What the caller knows about an uploaded file. The upload time is stamped
/// by the handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub file_size: u64,
    pub content_type: Option<String>,
    pub file_url: Option<String>,
}

/// Appends attachment metadata to the document linked from a reference.
#[derive(Clone)]
pub struct AttachmentHandler {
    references: Arc<dyn ReferenceStore>,
    documents: Arc<dyn DocumentStore>,
}

impl AttachmentHandler {
    pub fn new(references: Arc<dyn ReferenceStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            references,
            documents,
        }
    }

    pub async fn add_attachment(&self, reference_id: &str, upload: AttachmentUpload) -> Result<FileMeta> {
        let file_name = upload.file_name.trim();
        if file_name.is_empty() {
            return Err(RecordsError::validation("file name required"));
        }

        let reference = self
            .references
            .find(reference_id)
            .await
            .map_err(RecordsError::persistence("reference lookup"))?
            .ok_or_else(|| RecordsError::not_found("achievement", reference_id))?;

        let Some(document_id) = reference.document_ref.filter(|id| !id.trim().is_empty()) else {
            return Err(RecordsError::validation(format!(
                "achievement {reference_id} has no linked document"
            )));
        };

        let meta = FileMeta {
            file_name: file_name.to_string(),
            file_size: upload.file_size,
            content_type: upload.content_type.filter(|ct| !ct.trim().is_empty()),
            uploaded_at: clock::now(),
            file_url: upload.file_url.filter(|url| !url.trim().is_empty()),
        };

        let appended = self
            .documents
            .push_file(&document_id, meta.clone())
            .await
            .map_err(RecordsError::persistence("attachment append"))?;
        if !appended {
            return Err(RecordsError::not_found("document", document_id));
        }

        info!(
            reference_id = %reference_id,
            document_id = %document_id,
            file_name = %meta.file_name,
            file_size = meta.file_size,
            "attachment recorded"
        );
        Ok(meta)
    }
}
