use std::fmt::Write;

use crate::core::time::format_primitive;
use crate::db::models::Profile;
use crate::services::scoring::ScoreSummary;
use crate::services::session::ExamSession;

pub(crate) struct Transcript {
    pub(crate) key: String,
    pub(crate) body: String,
}

pub(crate) fn object_key(exam_id: &str, student_id: &str) -> String {
    format!("transcripts/{exam_id}/{student_id}.txt")
}

/// Renders a plain-text completion record for a finalized session. Stored
/// as a staff-facing artifact, so it may name correct letters.
pub(crate) fn build(
    student: &Profile,
    session: &ExamSession,
    summary: &ScoreSummary,
) -> Transcript {
    let mut body = String::new();

    let student_name = student.full_name.as_deref().unwrap_or(&student.id);
    let enrollment = student.enrollment_id.as_deref().unwrap_or("-");
    let class_tag = student.class_tag.as_deref().unwrap_or("-");

    let _ = writeln!(body, "Exam transcript");
    let _ = writeln!(body, "===============");
    let _ = writeln!(body);
    let _ = writeln!(body, "Exam:       {} ({})", session.exam_title, session.exam_id);
    let _ = writeln!(body, "Student:    {student_name} ({enrollment})");
    let _ = writeln!(body, "Class:      {class_tag}");
    let _ = writeln!(body, "Started:    {}", format_primitive(session.started_at));
    let _ = writeln!(body);
    let _ = writeln!(body, "Score: {}/{}", summary.correct, summary.total);
    for bucket in &summary.by_discipline {
        let _ = writeln!(body, "  {:<12} {}/{}", bucket.discipline, bucket.correct, bucket.total);
    }

    if let Some(paper) = &session.paper {
        let _ = writeln!(body);
        let _ = writeln!(body, "Answers:");
        for question in &paper.questions {
            let expected = question.correct_letter().unwrap_or("-");
            let line = match session.answers.get(&question.id) {
                Some(answer) if Some(answer.as_str()) == question.correct_letter() => {
                    format!("{:>4}. {} (correct)", question.position, answer)
                }
                Some(answer) => {
                    format!("{:>4}. {} (wrong, expected {expected})", question.position, answer)
                }
                None => format!("{:>4}. - (unanswered, expected {expected})", question.position),
            };
            let _ = writeln!(body, "{line}");
        }
    }

    Transcript { key: object_key(&session.exam_id, &session.student_id), body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ExamAccess;
    use crate::services::scoring;
    use crate::test_support::{exam_with_grants, paper_with_questions, student_profile};
    use time::macros::datetime;

    #[test]
    fn transcript_names_exam_student_and_score() {
        let exam = exam_with_grants("exam-1", ExamAccess::OpenToAll, &[])
            .window(datetime!(2025-06-01 08:00), datetime!(2025-06-01 10:00));
        let mut session = ExamSession::new(&exam, "stu-1", datetime!(2025-06-01 09:00));
        session
            .attach_paper(paper_with_questions(
                "exam-1",
                &[("q1", "math", "b"), ("q2", "history", "a")],
            ))
            .expect("attach");
        session
            .record_answers(
                &[("q1".to_string(), "b".to_string())].into_iter().collect(),
            )
            .expect("record");

        let student = student_profile("stu-1", "9A");
        let paper = session.paper.clone().expect("paper");
        let summary = scoring::grade(&paper, &session.answers);

        let transcript = build(&student, &session, &summary);
        assert_eq!(transcript.key, "transcripts/exam-1/stu-1.txt");
        assert!(transcript.body.contains("Score: 1/2"));
        assert!(transcript.body.contains("(correct)"));
        assert!(transcript.body.contains("unanswered"));
        assert!(transcript.body.contains("2025-06-01T09:00:00Z"));
    }
}
