use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::OffsetDateTime;

/// Schema-less submitter payload. Insertion order is preserved on round trips.
pub type Payload = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AchievementStatus {
    Draft,
    Submitted,
    Verified,
    Rejected,
}

impl AchievementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown achievement status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for AchievementStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Relational row that owns an achievement's identity and workflow state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AchievementReference {
    pub id: String,
    pub student_id: String,
    #[serde(alias = "mongo_achievement_id")]
    pub document_ref: Option<String>,
    pub status: AchievementStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schemars(with = "Option<String>")]
    pub submitted_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schemars(with = "Option<String>")]
    pub verified_at: Option<OffsetDateTime>,
    pub verified_by: Option<String>,
    pub rejection_note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schemars(with = "Option<String>")]
    pub updated_at: Option<OffsetDateTime>,
    /// Bumped on every mutating write; updates are conditional on it.
    pub revision: i64,
}

impl AchievementReference {
    pub fn new_draft(
        id: String,
        student_id: String,
        document_ref: Option<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            student_id,
            document_ref,
            status: AchievementStatus::Draft,
            submitted_at: None,
            verified_at: None,
            verified_by: None,
            rejection_note: None,
            created_at,
            updated_at: None,
            revision: 0,
        }
    }
}

/// Attachment metadata. File bytes live in an external object store;
/// `file_url` carries its locator when the caller has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileMeta {
    pub file_name: String,
    pub file_size: u64,
    pub content_type: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub uploaded_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AchievementDocument {
    pub id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<FileMeta>,
    #[serde(default)]
    pub extra: Payload,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schemars(with = "Option<String>")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Fields the submitter controls when a document is first written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDocument {
    pub student_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub extra: Payload,
}

/// Projection of a document merged into reference reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentView {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub files: Vec<FileMeta>,
    pub extra: Payload,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schemars(with = "Option<String>")]
    pub updated_at: Option<OffsetDateTime>,
}

impl From<AchievementDocument> for DocumentView {
    fn from(doc: AchievementDocument) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            description: doc.description,
            files: doc.files,
            extra: doc.extra,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

/// Reference plus whatever of its document could be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AchievementView {
    #[serde(flatten)]
    pub reference: AchievementReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<DocumentView>,
}

/// One ledger row per successful status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistoryEntry {
    pub id: String,
    pub achievement_ref_id: String,
    pub old_status: AchievementStatus,
    pub new_status: AchievementStatus,
    pub changed_by: Option<String>,
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub changed_at: OffsetDateTime,
}

/// Result of a history read. `Current` is the degraded answer used when the
/// ledger cannot be read; both serialize as a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum History {
    Ledger(Vec<HistoryEntry>),
    Current(Vec<AchievementReference>),
}

impl History {
    pub fn len(&self) -> usize {
        match self {
            Self::Ledger(entries) => entries.len(),
            Self::Current(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Authenticated caller as handed over by the auth layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Principal {
    pub user_id: String,
    pub role_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role_id: role_id.into(),
            permissions: Vec::new(),
        }
    }

    /// A principal with a blank user id carries no identity.
    pub fn actor(&self) -> Option<&str> {
        let id = self.user_id.trim();
        (!id.is_empty()).then_some(id)
    }

    pub fn has_role(&self, role_id: &str) -> bool {
        self.role_id == role_id
    }
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CreateAchievementRequest {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub doc: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreatedAchievement {
    pub reference_id: String,
    #[serde(rename = "mongo_id", alias = "document_id")]
    pub document_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct UpdateAchievementRequest {
    #[serde(default, alias = "mongo_achievement_id")]
    pub document_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct RejectRequest {
    #[serde(default)]
    pub note: String,
}
