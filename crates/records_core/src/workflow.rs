//! Achievement approval state machine.
//!
//! ```text
//! draft ──submit──▶ submitted ──verify──▶ verified
//!   │                   │
//!   └──────reject───────┴──reject──▶ rejected
//! ```
//!
//! Submit is accepted from every state, so verified and rejected records
//! can re-enter review. Resubmission leaves earlier verify/reject fields in
//! place; readers must tolerate them next to a newer `submitted_at`.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::RecordsError;
use crate::schema::{AchievementReference, AchievementStatus, HistoryEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Submit { actor: Option<String> },
    Verify { actor: String },
    Reject { actor: String, note: String },
}

impl Transition {
    pub fn target(&self) -> AchievementStatus {
        match self {
            Self::Submit { .. } => AchievementStatus::Submitted,
            Self::Verify { .. } => AchievementStatus::Verified,
            Self::Reject { .. } => AchievementStatus::Rejected,
        }
    }

    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::Submit { actor } => actor.as_deref(),
            Self::Verify { actor } | Self::Reject { actor, .. } => Some(actor),
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Reject { note, .. } => Some(note),
            _ => None,
        }
    }

    pub fn allowed_from(&self, from: AchievementStatus) -> bool {
        use AchievementStatus::*;
        match self {
            Self::Submit { .. } => true,
            Self::Verify { .. } => from == Submitted,
            Self::Reject { .. } => matches!(from, Draft | Submitted),
        }
    }
}

/// Computes the row that results from applying `transition` to `current`.
///
/// The returned row carries `current.revision + 1`, matching what the store
/// writes when the conditional update succeeds.
pub fn apply(
    current: &AchievementReference,
    transition: &Transition,
    now: OffsetDateTime,
) -> Result<AchievementReference, RecordsError> {
    if !transition.allowed_from(current.status) {
        return Err(RecordsError::Conflict(format!(
            "cannot move achievement {} from {} to {}",
            current.id,
            current.status,
            transition.target()
        )));
    }

    let mut next = current.clone();
    next.status = transition.target();
    next.updated_at = Some(now);
    next.revision = current.revision + 1;

    match transition {
        Transition::Submit { .. } => {
            // Never let a skewed clock move submitted_at backwards.
            let at = current.submitted_at.map_or(now, |prev| prev.max(now));
            next.submitted_at = Some(at);
        }
        Transition::Verify { actor } => {
            next.verified_at = Some(now);
            next.verified_by = Some(actor.clone());
        }
        Transition::Reject { actor, note } => {
            next.verified_by = Some(actor.clone());
            next.rejection_note = Some(note.clone());
        }
    }

    Ok(next)
}

pub fn history_entry(
    before: &AchievementReference,
    transition: &Transition,
    changed_at: OffsetDateTime,
) -> HistoryEntry {
    HistoryEntry {
        id: Uuid::new_v4().to_string(),
        achievement_ref_id: before.id.clone(),
        old_status: before.status,
        new_status: transition.target(),
        changed_by: transition.actor().map(str::to_string),
        note: transition.note().map(str::to_string),
        changed_at,
    }
}
