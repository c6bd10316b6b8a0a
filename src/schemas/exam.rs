use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Alternative, Exam, Question};
use crate::db::types::ExamAccess;
use crate::services::access::AccessStatus;
use crate::services::scoring::ScoreSummary;

#[derive(Debug, Deserialize, Serialize, Validate)]
pub(crate) struct AlternativeCreate {
    #[validate(length(min = 1, max = 1, message = "letter must be a single character"))]
    pub(crate) letter: String,
    #[validate(length(min = 1, message = "statement must not be empty"))]
    pub(crate) statement: String,
    #[serde(default)]
    #[serde(alias = "isCorrect")]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[validate(length(min = 1, message = "discipline must not be empty"))]
    pub(crate) discipline: String,
    #[validate(length(min = 1, message = "statement must not be empty"))]
    pub(crate) statement: String,
    #[validate(nested)]
    #[validate(length(min = 2, message = "a question needs at least two alternatives"))]
    pub(crate) alternatives: Vec<AlternativeCreate>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(alias = "classTag")]
    #[validate(length(min = 1, message = "class_tag must not be empty"))]
    pub(crate) class_tag: String,
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub(crate) subject: String,
    #[serde(alias = "startsAt", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) starts_at: OffsetDateTime,
    #[serde(alias = "endsAt", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) ends_at: OffsetDateTime,
    #[serde(default = "default_access")]
    pub(crate) access: ExamAccess,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Vec<QuestionCreate>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    #[serde(alias = "classTag")]
    #[validate(length(min = 1, message = "class_tag must not be empty"))]
    pub(crate) class_tag: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub(crate) subject: Option<String>,
    #[serde(
        default,
        alias = "startsAt",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) starts_at: Option<OffsetDateTime>,
    #[serde(
        default,
        alias = "endsAt",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) ends_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub(crate) access: Option<ExamAccess>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) class_tag: String,
    pub(crate) subject: String,
    pub(crate) starts_at: String,
    pub(crate) ends_at: String,
    pub(crate) access: ExamAccess,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) question_count: i64,
}

impl ExamResponse {
    pub(crate) fn from_db(exam: Exam, question_count: i64) -> Self {
        Self {
            id: exam.id,
            title: exam.title,
            class_tag: exam.class_tag,
            subject: exam.subject,
            starts_at: format_primitive(exam.starts_at),
            ends_at: format_primitive(exam.ends_at),
            access: exam.access,
            created_by: exam.created_by,
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
            question_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AlternativeResponse {
    pub(crate) letter: String,
    pub(crate) statement: String,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) position: i32,
    pub(crate) discipline: String,
    pub(crate) statement: String,
    pub(crate) alternatives: Vec<AlternativeResponse>,
}

impl QuestionResponse {
    pub(crate) fn from_db(question: Question, alternatives: Vec<Alternative>) -> Self {
        Self {
            id: question.id,
            position: question.position,
            discipline: question.discipline,
            statement: question.statement,
            alternatives: alternatives
                .into_iter()
                .map(|alternative| AlternativeResponse {
                    letter: alternative.letter,
                    statement: alternative.statement,
                    is_correct: alternative.is_correct,
                })
                .collect(),
        }
    }
}

/// Staff view of one exam: full window, access mode, grants and the
/// question sheet with correct letters.
#[derive(Debug, Serialize)]
pub(crate) struct ExamDetailResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) class_tag: String,
    pub(crate) subject: String,
    pub(crate) starts_at: String,
    pub(crate) ends_at: String,
    pub(crate) access: ExamAccess,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) granted_student_ids: Vec<String>,
    pub(crate) questions: Vec<QuestionResponse>,
}

/// Student listing entry: the advisory status is computed at response
/// time and may already be stale when the student acts on it.
#[derive(Debug, Serialize)]
pub(crate) struct StudentExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) class_tag: String,
    pub(crate) subject: String,
    pub(crate) starts_at: String,
    pub(crate) ends_at: String,
    pub(crate) status: AccessStatus,
}

impl StudentExamResponse {
    pub(crate) fn from_db(exam: &Exam, status: AccessStatus) -> Self {
        Self {
            id: exam.id.clone(),
            title: exam.title.clone(),
            class_tag: exam.class_tag.clone(),
            subject: exam.subject.clone(),
            starts_at: format_primitive(exam.starts_at),
            ends_at: format_primitive(exam.ends_at),
            status,
        }
    }
}

/// One row of a staff results listing.
#[derive(Debug, Serialize)]
pub(crate) struct ExamResultResponse {
    pub(crate) student_id: String,
    pub(crate) full_name: Option<String>,
    pub(crate) enrollment_id: Option<String>,
    pub(crate) submitted_at: String,
    pub(crate) score: ScoreSummary,
}

/// A student's own scored result for a completed exam.
#[derive(Debug, Serialize)]
pub(crate) struct StudentResultResponse {
    pub(crate) exam_id: String,
    pub(crate) exam_title: String,
    pub(crate) submitted_at: String,
    pub(crate) score: ScoreSummary,
}

fn default_access() -> ExamAccess {
    ExamAccess::Closed
}

fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // Frontend's datetime-local widget sends values without a timezone;
    // treat those as UTC.
    if let Ok(value) = time::PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ) {
        return Some(value.assume_utc());
    }
    if let Ok(value) = time::PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_offset_datetime_flexible<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_offset_datetime_flexible(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

fn deserialize_option_offset_datetime_flexible<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_offset_datetime_flexible(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exam_create_accepts_datetime_local_values() {
        let payload = serde_json::json!({
            "title": "Midterm Algebra",
            "classTag": "9A",
            "subject": "math",
            "startsAt": "2025-06-01T08:00",
            "endsAt": "2025-06-01T10:00:00",
        });
        let create: ExamCreate = serde_json::from_value(payload).expect("deserialize");
        assert_eq!(create.access, ExamAccess::Closed);
        assert_eq!(create.starts_at.hour(), 8);
        assert_eq!(create.ends_at.hour(), 10);
    }

    #[test]
    fn exam_create_rejects_garbage_datetime() {
        let payload = serde_json::json!({
            "title": "Midterm Algebra",
            "classTag": "9A",
            "subject": "math",
            "startsAt": "yesterday",
            "endsAt": "2025-06-01T10:00:00Z",
        });
        assert!(serde_json::from_value::<ExamCreate>(payload).is_err());
    }

    #[test]
    fn question_create_requires_two_alternatives() {
        let payload = serde_json::json!({
            "discipline": "math",
            "statement": "2 + 2 = ?",
            "alternatives": [
                { "letter": "a", "statement": "4", "isCorrect": true }
            ]
        });
        let question: QuestionCreate = serde_json::from_value(payload).expect("deserialize");
        assert!(question.validate().is_err());
    }
}
