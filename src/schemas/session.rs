use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::services::guard::RefusalReason;
use crate::services::scoring::ScoreSummary;
use crate::services::session::{AbortReason, ExamSession, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum StartRefusal {
    ProfileIncomplete,
    Blocked,
    ExamUnavailable,
    AlreadyCompleted,
    NotYetOpen,
    Unavailable,
}

impl From<RefusalReason> for StartRefusal {
    fn from(reason: RefusalReason) -> Self {
        match reason {
            RefusalReason::Blocked => Self::Blocked,
            RefusalReason::ExamUnavailable => Self::ExamUnavailable,
            RefusalReason::AlreadyCompleted => Self::AlreadyCompleted,
            RefusalReason::NotYetOpen => Self::NotYetOpen,
            RefusalReason::Unavailable => Self::Unavailable,
        }
    }
}

/// Start is always 200: a refusal is a domain outcome, not a transport
/// failure.
#[derive(Debug, Serialize)]
pub(crate) struct StartExamResponse {
    pub(crate) proceed: bool,
    pub(crate) reason: Option<StartRefusal>,
    pub(crate) session: Option<SessionResponse>,
}

impl StartExamResponse {
    pub(crate) fn started(session: &ExamSession) -> Self {
        Self { proceed: true, reason: None, session: Some(SessionResponse::from_session(session)) }
    }

    pub(crate) fn refused(reason: StartRefusal) -> Self {
        Self { proceed: false, reason: Some(reason), session: None }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) exam_title: String,
    pub(crate) state: SessionState,
    pub(crate) started_at: String,
    pub(crate) deadline: String,
    pub(crate) answers: HashMap<String, String>,
    pub(crate) abort_reason: Option<AbortReason>,
    pub(crate) questions: Vec<SessionQuestion>,
}

/// Student-facing question view. Correctness flags never leave the server
/// while an attempt is open.
#[derive(Debug, Serialize)]
pub(crate) struct SessionQuestion {
    pub(crate) id: String,
    pub(crate) position: i32,
    pub(crate) discipline: String,
    pub(crate) statement: String,
    pub(crate) alternatives: Vec<SessionAlternative>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionAlternative {
    pub(crate) letter: String,
    pub(crate) statement: String,
}

impl SessionResponse {
    pub(crate) fn from_session(session: &ExamSession) -> Self {
        let questions = session
            .paper
            .as_ref()
            .map(|paper| {
                paper
                    .questions
                    .iter()
                    .map(|question| SessionQuestion {
                        id: question.id.clone(),
                        position: question.position,
                        discipline: question.discipline.clone(),
                        statement: question.statement.clone(),
                        alternatives: question
                            .alternatives
                            .iter()
                            .map(|alternative| SessionAlternative {
                                letter: alternative.letter.clone(),
                                statement: alternative.statement.clone(),
                            })
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: session.id.clone(),
            exam_id: session.exam_id.clone(),
            exam_title: session.exam_title.clone(),
            state: session.state,
            started_at: format_primitive(session.started_at),
            deadline: format_primitive(session.deadline),
            answers: session.answers.clone(),
            abort_reason: session.abort_reason,
            questions,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswersUpdate {
    pub(crate) answers: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FinalizeResponse {
    pub(crate) session: SessionResponse,
    pub(crate) score: ScoreSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ExamAccess;
    use crate::test_support::{exam_with_grants, paper_with_questions};
    use time::macros::datetime;

    #[test]
    fn session_response_never_leaks_correct_letters() {
        let exam = exam_with_grants("exam-1", ExamAccess::OpenToAll, &[])
            .window(datetime!(2025-06-01 08:00), datetime!(2025-06-01 10:00));
        let mut session = ExamSession::new(&exam, "stu-1", datetime!(2025-06-01 09:00));
        session
            .attach_paper(paper_with_questions(
                "exam-1",
                &[("q1", "math", "b"), ("q2", "history", "a")],
            ))
            .expect("attach");

        let response = SessionResponse::from_session(&session);
        let json = serde_json::to_string(&response).expect("serialize");

        assert!(!json.contains("is_correct"));
        assert!(!json.contains("isCorrect"));
        assert_eq!(response.questions.len(), 2);
        assert!(!response.questions[0].alternatives.is_empty());
    }

    #[test]
    fn refusal_reasons_serialize_snake_case() {
        let response = StartExamResponse::refused(StartRefusal::ProfileIncomplete);
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["proceed"], false);
        assert_eq!(json["reason"], "profile_incomplete");
        assert!(json["session"].is_null());
    }
}
