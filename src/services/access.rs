use std::collections::HashSet;

use serde::Serialize;
use time::PrimitiveDateTime;

use crate::db::models::Profile;
use crate::db::types::{ExamAccess, Role};
use crate::services::store::ExamWithGrants;

/// Derived access state of one exam for one student. Recomputed on every
/// evaluation, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AccessStatus {
    Completed,
    Expired,
    LockedPermission,
    LockedTime,
    Available,
}

impl AccessStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::LockedPermission => "locked_permission",
            Self::LockedTime => "locked_time",
            Self::Available => "available",
        }
    }
}

/// Computes the access status of `exam` for `profile` at `now`.
///
/// Total and side-effect-free. The rules are checked strictly in this
/// order, and the order is load-bearing:
///
/// 1. a recorded submission wins over everything, including expiry and
///    revoked permission;
/// 2. an exam past its window is gone even for individually granted
///    students;
/// 3. permission (admin role, open_to_all, or an individual grant);
/// 4. window not yet open;
/// 5. otherwise available.
pub(crate) fn evaluate(
    exam: &ExamWithGrants,
    profile: &Profile,
    submitted_exam_ids: &HashSet<String>,
    now: PrimitiveDateTime,
) -> AccessStatus {
    if submitted_exam_ids.contains(&exam.exam.id) {
        return AccessStatus::Completed;
    }

    if now > exam.exam.ends_at {
        return AccessStatus::Expired;
    }

    if !has_permission(exam, profile) {
        return AccessStatus::LockedPermission;
    }

    if now < exam.exam.starts_at {
        return AccessStatus::LockedTime;
    }

    AccessStatus::Available
}

/// Only `admin` bypasses the permission gate. Professors are deliberately
/// subject to the same open_to_all/grant rules as students.
fn has_permission(exam: &ExamWithGrants, profile: &Profile) -> bool {
    match profile.role {
        Role::Admin => true,
        Role::Student | Role::Professor => {
            exam.exam.access == ExamAccess::OpenToAll
                || exam.granted_student_ids.contains(&profile.id)
        }
    }
}
