use std::sync::Arc;

use serde::Serialize;
use time::PrimitiveDateTime;

use crate::db::models::Profile;
use crate::db::types::Role;
use crate::services::access::{self, AccessStatus};
use crate::services::store::{ExamWithGrants, PortalStore, StoreError, StudentScope};

/// Why a start attempt was refused. Expected, user-facing outcomes; none of
/// these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RefusalReason {
    Blocked,
    ExamUnavailable,
    AlreadyCompleted,
    NotYetOpen,
    Unavailable,
}

impl RefusalReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::ExamUnavailable => "exam_unavailable",
            Self::AlreadyCompleted => "already_completed",
            Self::NotYetOpen => "not_yet_open",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug)]
pub(crate) enum StartDecision {
    Proceed { profile: Profile, exam: ExamWithGrants },
    Refuse(RefusalReason),
}

/// Decides whether `user_id` may start `exam_id` right now.
///
/// Everything is re-fetched from the store; whatever status the caller saw
/// in a list view is advisory and ignored. The fetched snapshots live only
/// for the duration of this call.
pub(crate) async fn request_start(
    store: &Arc<dyn PortalStore>,
    exam_id: &str,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Result<StartDecision, StoreError> {
    let profile = store.fetch_profile(user_id).await?.ok_or(StoreError::NotFound)?;

    if profile.is_blocked && profile.role != Role::Admin {
        return Ok(StartDecision::Refuse(RefusalReason::Blocked));
    }

    let scope = StudentScope::for_profile(&profile);
    let exams = store.fetch_exams(&scope).await?;
    let Some(exam) = exams.into_iter().find(|candidate| candidate.exam.id == exam_id) else {
        return Ok(StartDecision::Refuse(RefusalReason::ExamUnavailable));
    };

    let submitted = store.fetch_submitted_exam_ids(user_id).await?;
    let status = access::evaluate(&exam, &profile, &submitted, now);

    let decision = match status {
        AccessStatus::Completed => StartDecision::Refuse(RefusalReason::AlreadyCompleted),
        AccessStatus::LockedTime => StartDecision::Refuse(RefusalReason::NotYetOpen),
        AccessStatus::LockedPermission | AccessStatus::Expired => {
            StartDecision::Refuse(RefusalReason::Unavailable)
        }
        AccessStatus::Available => StartDecision::Proceed { profile, exam },
    };

    if let StartDecision::Refuse(reason) = &decision {
        tracing::info!(exam_id, user_id, reason = reason.as_str(), "Start attempt refused");
        metrics::counter!("exam_start_refusals_total", "reason" => reason.as_str()).increment(1);
    }

    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ExamAccess;
    use crate::test_support::{exam_with_grants, student_profile, MemoryStore};
    use time::macros::datetime;

    fn open_exam(id: &str) -> ExamWithGrants {
        exam_with_grants(id, ExamAccess::OpenToAll, &[])
            .window(datetime!(2025-06-01 08:00), datetime!(2025-06-01 10:00))
    }

    #[tokio::test]
    async fn available_exam_proceeds() {
        let store = MemoryStore::new()
            .with_profile(student_profile("stu-1", "9A"))
            .with_exam(open_exam("exam-1"));
        let store: Arc<dyn PortalStore> = Arc::new(store);

        let decision = request_start(&store, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("guard");
        assert!(matches!(decision, StartDecision::Proceed { .. }));
    }

    #[tokio::test]
    async fn blocked_student_is_refused_before_anything_else() {
        let mut profile = student_profile("stu-1", "9A");
        profile.is_blocked = true;
        let store = MemoryStore::new()
            .with_profile(profile)
            .with_exam(open_exam("exam-1"))
            .with_submission("exam-1", "stu-1");
        let store: Arc<dyn PortalStore> = Arc::new(store);

        // The block check runs ahead of the evaluator, so a blocked student
        // sees `blocked` even for an exam they already completed.
        let decision = request_start(&store, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("guard");
        assert!(matches!(decision, StartDecision::Refuse(RefusalReason::Blocked)));
    }

    #[tokio::test]
    async fn blocked_admin_still_proceeds() {
        let mut admin = student_profile("adm-1", "9A");
        admin.role = Role::Admin;
        admin.is_blocked = true;
        let store =
            MemoryStore::new().with_profile(admin).with_exam(open_exam("exam-1"));
        let store: Arc<dyn PortalStore> = Arc::new(store);

        let decision = request_start(&store, "exam-1", "adm-1", datetime!(2025-06-01 09:00))
            .await
            .expect("guard");
        assert!(matches!(decision, StartDecision::Proceed { .. }));
    }

    #[tokio::test]
    async fn missing_exam_is_exam_unavailable() {
        let store = MemoryStore::new().with_profile(student_profile("stu-1", "9A"));
        let store: Arc<dyn PortalStore> = Arc::new(store);

        let decision = request_start(&store, "exam-9", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("guard");
        assert!(matches!(decision, StartDecision::Refuse(RefusalReason::ExamUnavailable)));
    }

    #[tokio::test]
    async fn exam_outside_student_scope_is_exam_unavailable() {
        let store = MemoryStore::new()
            .with_profile(student_profile("stu-1", "9A"))
            .with_exam(open_exam("exam-1").class("7C"));
        let store: Arc<dyn PortalStore> = Arc::new(store);

        let decision = request_start(&store, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("guard");
        assert!(matches!(decision, StartDecision::Refuse(RefusalReason::ExamUnavailable)));
    }

    #[tokio::test]
    async fn fresh_submission_beats_stale_listing() {
        // Another device submitted after the caller's last list refresh.
        // The guard's own fetch must see it.
        let store = MemoryStore::new()
            .with_profile(student_profile("stu-1", "9A"))
            .with_exam(open_exam("exam-1"));

        store.insert_submission("exam-1", "stu-1");
        let store: Arc<dyn PortalStore> = Arc::new(store);

        let decision = request_start(&store, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("guard");
        assert!(matches!(decision, StartDecision::Refuse(RefusalReason::AlreadyCompleted)));
    }

    #[tokio::test]
    async fn locked_time_maps_to_not_yet_open() {
        let store = MemoryStore::new()
            .with_profile(student_profile("stu-1", "9A"))
            .with_exam(open_exam("exam-1"));
        let store: Arc<dyn PortalStore> = Arc::new(store);

        let decision = request_start(&store, "exam-1", "stu-1", datetime!(2025-06-01 07:00))
            .await
            .expect("guard");
        assert!(matches!(decision, StartDecision::Refuse(RefusalReason::NotYetOpen)));
    }

    #[tokio::test]
    async fn expired_and_locked_permission_map_to_unavailable() {
        let store = MemoryStore::new()
            .with_profile(student_profile("stu-1", "9A"))
            .with_exam(open_exam("exam-1"))
            .with_exam(
                exam_with_grants("exam-2", ExamAccess::Closed, &[])
                    .window(datetime!(2025-06-01 08:00), datetime!(2025-06-01 10:00)),
            );
        let store: Arc<dyn PortalStore> = Arc::new(store);

        let expired = request_start(&store, "exam-1", "stu-1", datetime!(2025-06-01 11:00))
            .await
            .expect("guard");
        assert!(matches!(expired, StartDecision::Refuse(RefusalReason::Unavailable)));

        let closed = request_start(&store, "exam-2", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("guard");
        assert!(matches!(closed, StartDecision::Refuse(RefusalReason::Unavailable)));
    }

    #[tokio::test]
    async fn store_outage_propagates_as_error() {
        let store = MemoryStore::new()
            .with_profile(student_profile("stu-1", "9A"))
            .with_exam(open_exam("exam-1"));
        store.fail_next_fetch();
        let store: Arc<dyn PortalStore> = Arc::new(store);

        let result = request_start(&store, "exam-1", "stu-1", datetime!(2025-06-01 09:00)).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
