use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Profile;
use crate::db::types::Role;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SignUpRequest {
    #[validate(email(message = "email must be a valid address"))]
    pub(crate) email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters long"))]
    pub(crate) password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    pub(crate) email: String,
    pub(crate) password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RegistrationUpdate {
    #[serde(default)]
    #[serde(alias = "fullName")]
    #[validate(length(min = 1, message = "full_name must not be empty"))]
    pub(crate) full_name: Option<String>,
    #[serde(default)]
    #[serde(alias = "enrollmentId")]
    #[validate(length(min = 1, message = "enrollment_id must not be empty"))]
    pub(crate) enrollment_id: Option<String>,
    #[serde(default)]
    #[serde(alias = "classTag")]
    #[validate(length(min = 1, message = "class_tag must not be empty"))]
    pub(crate) class_tag: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProfileResponse {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) role: Role,
    pub(crate) full_name: Option<String>,
    pub(crate) enrollment_id: Option<String>,
    pub(crate) class_tag: Option<String>,
    pub(crate) is_blocked: bool,
    pub(crate) is_complete: bool,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl ProfileResponse {
    pub(crate) fn from_db(profile: Profile) -> Self {
        let is_complete = profile.is_complete();
        Self {
            id: profile.id,
            email: profile.email,
            role: profile.role,
            full_name: profile.full_name,
            enrollment_id: profile.enrollment_id,
            class_tag: profile.class_tag,
            is_blocked: profile.is_blocked,
            is_complete,
            created_at: format_primitive(profile.created_at),
            updated_at: format_primitive(profile.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_update_accepts_camel_case_aliases() {
        let payload = serde_json::json!({
            "fullName": "Ana Souza",
            "enrollmentId": "2025-0414",
            "classTag": "9A"
        });
        let update: RegistrationUpdate = serde_json::from_value(payload).expect("deserialize");
        assert_eq!(update.full_name.as_deref(), Some("Ana Souza"));
        assert_eq!(update.enrollment_id.as_deref(), Some("2025-0414"));
        assert_eq!(update.class_tag.as_deref(), Some("9A"));
    }

    #[test]
    fn profile_response_reports_completion() {
        let profile = crate::test_support::student_profile("stu-1", "9A");
        let response = ProfileResponse::from_db(profile);
        assert!(response.is_complete);

        let mut bare = crate::test_support::student_profile("stu-2", "9A");
        bare.full_name = None;
        let response = ProfileResponse::from_db(bare);
        assert!(!response.is_complete);

        // Staff accounts never go through the completion flow.
        let mut professor = crate::test_support::student_profile("prof-1", "9A");
        professor.role = Role::Professor;
        professor.full_name = None;
        let response = ProfileResponse::from_db(professor);
        assert!(response.is_complete);
    }
}
