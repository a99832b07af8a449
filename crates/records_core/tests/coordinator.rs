mod common;

use std::sync::Arc;

use common::{admin, harness, lecturer, student, BrokenLedger, MemoryDocuments, RejectingInserts};
use records_core::db::SqliteStore;
use records_core::schema::{
    AchievementStatus, CreateAchievementRequest, CreatedAchievement, History, Principal,
};
use records_core::store::{HistoryLedger, ReferenceStore};
use records_core::{Coordinator, RecordsError};
use serde_json::json;

fn request(student_id: &str) -> CreateAchievementRequest {
    let doc = json!({"category": "competition", "level": {"scope": "national", "rank": 2}});
    CreateAchievementRequest {
        student_id: student_id.to_string(),
        title: Some("Hackathon".into()),
        description: Some("Regional round".into()),
        doc: doc.as_object().cloned().unwrap(),
    }
}

async fn create(coordinator: &Coordinator, student_id: &str) -> CreatedAchievement {
    coordinator
        .create(Some(&student(student_id)), request(student_id))
        .await
        .unwrap()
}

#[tokio::test]
async fn create_writes_draft_reference_and_document() {
    let h = harness();
    let created = create(&h.coordinator, "S1").await;

    let view = h.coordinator.get(&created.reference_id).await.unwrap();
    assert_eq!(view.reference.status, AchievementStatus::Draft);
    assert_eq!(view.reference.student_id, "S1");
    assert_eq!(view.reference.document_ref.as_deref(), Some(created.document_id.as_str()));
    assert_eq!(view.reference.submitted_at, None);

    let doc = view.doc.expect("document merged");
    assert_eq!(doc.id, created.document_id);
    assert_eq!(doc.title.as_deref(), Some("Hackathon"));
    assert_eq!(doc.extra["level"]["rank"], 2);
    assert!(doc.files.is_empty());

    let stored = h.documents.document(&created.document_id).expect("document stored");
    assert_eq!(stored.student_id, view.reference.student_id);
}

#[tokio::test]
async fn create_requires_student_id() {
    let h = harness();
    let err = h
        .coordinator
        .create(None, request("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, RecordsError::Validation(_)));
    assert_eq!(h.documents.len(), 0);
}

#[tokio::test]
async fn failed_reference_insert_removes_the_document() {
    let sql = Arc::new(SqliteStore::in_memory().unwrap());
    let documents = Arc::new(MemoryDocuments::default());
    let coordinator = Coordinator::new(
        Arc::new(RejectingInserts(sql.clone())),
        sql.clone(),
        documents.clone(),
    );

    let err = coordinator
        .create(Some(&student("S1")), request("S1"))
        .await
        .unwrap_err();

    assert!(matches!(err, RecordsError::Persistence { context: "reference insert", .. }));
    assert_eq!(documents.len(), 0, "document left behind");
    assert!(sql.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn verify_by_lecturer_records_actor_and_history() {
    let h = harness();
    let id = create(&h.coordinator, "S1").await.reference_id;

    let submitted = h.coordinator.submit(Some(&student("S1")), &id).await.unwrap();
    assert_eq!(submitted.status, AchievementStatus::Submitted);
    assert!(submitted.submitted_at.is_some());

    let verified = h.coordinator.verify(Some(&lecturer("U9")), &id).await.unwrap();
    assert_eq!(verified.status, AchievementStatus::Verified);
    assert_eq!(verified.verified_by.as_deref(), Some("U9"));
    assert!(verified.verified_at.is_some());

    let History::Ledger(entries) = h.coordinator.history(&id).await.unwrap() else {
        panic!("expected ledger history");
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].old_status, AchievementStatus::Submitted);
    assert_eq!(entries[0].new_status, AchievementStatus::Verified);
    assert_eq!(entries[0].changed_by.as_deref(), Some("U9"));
    assert_eq!(entries[1].old_status, AchievementStatus::Draft);
    assert_eq!(entries[1].new_status, AchievementStatus::Submitted);
    assert_eq!(entries[1].changed_by.as_deref(), Some("S1"));
}

#[tokio::test]
async fn reject_from_draft_keeps_note() {
    let h = harness();
    let id = create(&h.coordinator, "S1").await.reference_id;

    let rejected = h
        .coordinator
        .reject(Some(&lecturer("U9")), &id, "  incomplete ")
        .await
        .unwrap();
    assert_eq!(rejected.status, AchievementStatus::Rejected);
    assert_eq!(rejected.rejection_note.as_deref(), Some("incomplete"));
    assert_eq!(rejected.verified_by.as_deref(), Some("U9"));
    assert_eq!(rejected.verified_at, None);

    let entries = h.sql.entries(&id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].old_status, AchievementStatus::Draft);
    assert_eq!(entries[0].note.as_deref(), Some("incomplete"));
}

#[tokio::test]
async fn reject_without_note_changes_nothing() {
    let h = harness();
    let id = create(&h.coordinator, "S1").await.reference_id;
    h.coordinator.submit(None, &id).await.unwrap();
    let before = h.sql.find(&id).await.unwrap().unwrap();

    let err = h
        .coordinator
        .reject(Some(&lecturer("U9")), &id, " ")
        .await
        .unwrap_err();
    assert!(matches!(err, RecordsError::Validation(_)));

    assert_eq!(h.sql.find(&id).await.unwrap().unwrap(), before);
    assert_eq!(h.sql.entries(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn verify_and_reject_need_a_principal() {
    let h = harness();
    let id = create(&h.coordinator, "S1").await.reference_id;
    h.coordinator.submit(None, &id).await.unwrap();

    let err = h.coordinator.verify(None, &id).await.unwrap_err();
    assert!(matches!(err, RecordsError::Forbidden(_)));

    let anonymous = Principal::new("", "Dosen Wali");
    let err = h
        .coordinator
        .reject(Some(&anonymous), &id, "")
        .await
        .unwrap_err();
    assert!(matches!(err, RecordsError::Forbidden(_)));

    let current = h.sql.find(&id).await.unwrap().unwrap();
    assert_eq!(current.status, AchievementStatus::Submitted);
    assert_eq!(current.verified_by, None);
}

#[tokio::test]
async fn verify_from_draft_is_a_conflict() {
    let h = harness();
    let id = create(&h.coordinator, "S1").await.reference_id;

    let err = h.coordinator.verify(Some(&lecturer("U9")), &id).await.unwrap_err();
    assert!(matches!(err, RecordsError::Conflict(_)));
    assert!(h.sql.entries(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_submit_never_moves_submitted_at_back() {
    let h = harness();
    let id = create(&h.coordinator, "S1").await.reference_id;

    let first = h.coordinator.submit(None, &id).await.unwrap();
    let second = h.coordinator.submit(None, &id).await.unwrap();
    assert!(second.submitted_at >= first.submitted_at);
    assert_eq!(second.revision, first.revision + 1);

    let entries = h.sql.entries(&id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].old_status, AchievementStatus::Submitted);
}

#[tokio::test]
async fn transition_on_unknown_id_is_not_found() {
    let h = harness();
    let err = h.coordinator.submit(None, "missing").await.unwrap_err();
    assert!(matches!(err, RecordsError::NotFound { entity: "achievement", .. }));
}

#[tokio::test]
async fn ledger_failure_does_not_undo_transition() {
    let sql = Arc::new(SqliteStore::in_memory().unwrap());
    let ledger = Arc::new(BrokenLedger {
        inner: sql.clone(),
        fail_append: true,
        fail_entries: false,
    });
    let coordinator = Coordinator::new(sql.clone(), ledger, Arc::new(MemoryDocuments::default()));
    let id = create(&coordinator, "S1").await.reference_id;

    let submitted = coordinator.submit(None, &id).await.unwrap();
    assert_eq!(submitted.status, AchievementStatus::Submitted);
    assert_eq!(
        sql.find(&id).await.unwrap().unwrap().status,
        AchievementStatus::Submitted
    );
    assert!(sql.entries(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn history_falls_back_to_current_reference() {
    let sql = Arc::new(SqliteStore::in_memory().unwrap());
    let ledger = Arc::new(BrokenLedger {
        inner: sql.clone(),
        fail_append: false,
        fail_entries: true,
    });
    let coordinator = Coordinator::new(sql.clone(), ledger, Arc::new(MemoryDocuments::default()));
    let id = create(&coordinator, "S1").await.reference_id;
    coordinator.submit(None, &id).await.unwrap();

    match coordinator.history(&id).await.unwrap() {
        History::Current(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].id, id);
            assert_eq!(rows[0].status, AchievementStatus::Submitted);
        }
        other => panic!("expected fallback, got {other:?}"),
    }

    let err = coordinator.history("missing").await.unwrap_err();
    assert!(matches!(err, RecordsError::NotFound { .. }));
}

#[tokio::test]
async fn history_of_untouched_reference_is_empty() {
    let h = harness();
    let id = create(&h.coordinator, "S1").await.reference_id;
    assert!(h.coordinator.history(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn get_survives_a_dangling_document_link() {
    let h = harness();
    let created = create(&h.coordinator, "S1").await;
    h.documents.remove(&created.document_id);

    let view = h.coordinator.get(&created.reference_id).await.unwrap();
    assert_eq!(view.reference.id, created.reference_id);
    assert!(view.doc.is_none());
}

#[tokio::test]
async fn get_unknown_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.coordinator.get("nope").await.unwrap_err(),
        RecordsError::NotFound { .. }
    ));
}

#[tokio::test]
async fn list_scopes_by_role() {
    let h = harness();
    let a = create(&h.coordinator, "S1").await.reference_id;
    let b = create(&h.coordinator, "S2").await.reference_id;
    let c = create(&h.coordinator, "S1").await.reference_id;

    let all = h.coordinator.list(Some(&admin()), None).await.unwrap();
    assert_eq!(all.len(), 3);

    let mine = h.coordinator.list(Some(&student("S1")), Some("S1")).await.unwrap();
    let ids: Vec<&str> = mine.iter().map(|v| v.reference.id.as_str()).collect();
    assert_eq!(ids, [c.as_str(), a.as_str()]);
    assert!(mine.iter().all(|v| v.doc.is_some()));

    let err = h.coordinator.list(Some(&student("S1")), None).await.unwrap_err();
    assert!(matches!(err, RecordsError::Validation(_)));
    let err = h.coordinator.list(None, Some("  ")).await.unwrap_err();
    assert!(matches!(err, RecordsError::Validation(_)));

    let admin_filtered = h.coordinator.list(Some(&admin()), Some("S2")).await.unwrap();
    assert_eq!(admin_filtered.len(), 1);
    assert_eq!(admin_filtered[0].reference.id, b);
}

#[tokio::test]
async fn admin_role_is_configurable() {
    let h = harness();
    let coordinator = Coordinator::new(h.sql.clone(), h.sql.clone(), h.documents.clone())
        .with_admin_role("Superuser");
    create(&coordinator, "S1").await;

    assert!(coordinator.list(Some(&admin()), None).await.is_err());
    let root = Principal::new("U1", "Superuser");
    assert_eq!(coordinator.list(Some(&root), None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_link_repoints_without_checking_target() {
    let h = harness();
    let created = create(&h.coordinator, "S1").await;

    let updated = h
        .coordinator
        .update_document_link(None, &created.reference_id, "ffffffffffffffffffffffff")
        .await
        .unwrap();
    assert_eq!(updated.document_ref.as_deref(), Some("ffffffffffffffffffffffff"));
    assert!(updated.updated_at.is_some());

    let view = h.coordinator.get(&created.reference_id).await.unwrap();
    assert_eq!(view.reference, updated);
    assert!(view.doc.is_none());
    assert!(h.documents.contains(&created.document_id));

    let err = h
        .coordinator
        .update_document_link(None, &created.reference_id, " ")
        .await
        .unwrap_err();
    assert!(matches!(err, RecordsError::Validation(_)));
}

#[tokio::test]
async fn delete_removes_reference_and_document() {
    let h = harness();
    let created = create(&h.coordinator, "S1").await;
    h.coordinator.submit(None, &created.reference_id).await.unwrap();

    h.coordinator
        .delete(Some(&admin()), &created.reference_id)
        .await
        .unwrap();

    assert!(h.sql.find(&created.reference_id).await.unwrap().is_none());
    assert!(!h.documents.contains(&created.document_id));
    assert_eq!(h.sql.entries(&created.reference_id).await.unwrap().len(), 1);

    let err = h
        .coordinator
        .delete(Some(&admin()), &created.reference_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RecordsError::NotFound { .. }));
}

#[tokio::test]
async fn delete_tolerates_missing_document() {
    let h = harness();
    let created = create(&h.coordinator, "S1").await;
    h.documents.remove(&created.document_id);

    h.coordinator.delete(None, &created.reference_id).await.unwrap();
    assert!(h.sql.find(&created.reference_id).await.unwrap().is_none());
}
