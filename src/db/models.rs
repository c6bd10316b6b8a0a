use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{ExamAccess, Role};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Profile {
    pub(crate) id: String,
    pub(crate) email: String,
    #[serde(skip_serializing)]
    pub(crate) hashed_password: String,
    pub(crate) role: Role,
    pub(crate) full_name: Option<String>,
    pub(crate) enrollment_id: Option<String>,
    pub(crate) class_tag: Option<String>,
    pub(crate) is_blocked: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Profile {
    /// Students need the registration trio filled in before they can sit an
    /// exam. Staff accounts are always considered complete.
    pub(crate) fn is_complete(&self) -> bool {
        if self.role.is_staff() {
            return true;
        }
        let filled = |field: &Option<String>| {
            field
                .as_deref()
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false)
        };
        filled(&self.full_name) && filled(&self.enrollment_id) && filled(&self.class_tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) class_tag: String,
    pub(crate) subject: String,
    pub(crate) starts_at: PrimitiveDateTime,
    pub(crate) ends_at: PrimitiveDateTime,
    pub(crate) access: ExamAccess,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) position: i32,
    pub(crate) discipline: String,
    pub(crate) statement: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Alternative {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) letter: String,
    pub(crate) statement: String,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) answers: Json<HashMap<String, String>>,
    pub(crate) created_at: PrimitiveDateTime,
}
