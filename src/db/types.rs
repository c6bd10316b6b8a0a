use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum Role {
    Student,
    Professor,
    Admin,
}

impl Role {
    pub(crate) fn is_staff(self) -> bool {
        matches!(self, Role::Professor | Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "examaccess", rename_all = "snake_case")]
pub(crate) enum ExamAccess {
    Closed,
    OpenToAll,
}
