use std::collections::HashMap;

use serde::Serialize;

use crate::services::store::ExamPaper;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScoreSummary {
    pub(crate) correct: usize,
    pub(crate) total: usize,
    pub(crate) by_discipline: Vec<DisciplineScore>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DisciplineScore {
    pub(crate) discipline: String,
    pub(crate) correct: usize,
    pub(crate) total: usize,
}

/// Grades an answer map against a paper.
///
/// Every question counts toward the total whether or not it was answered,
/// so an abandoned half-filled attempt scores exactly what was answered
/// correctly. Discipline buckets come out in paper order.
pub(crate) fn grade(paper: &ExamPaper, answers: &HashMap<String, String>) -> ScoreSummary {
    let mut by_discipline: Vec<DisciplineScore> = Vec::new();
    let mut correct = 0;

    for question in &paper.questions {
        let is_correct = match (answers.get(&question.id), question.correct_letter()) {
            (Some(answer), Some(expected)) => answer == expected,
            _ => false,
        };
        if is_correct {
            correct += 1;
        }

        match by_discipline
            .iter_mut()
            .find(|bucket| bucket.discipline == question.discipline)
        {
            Some(bucket) => {
                bucket.total += 1;
                if is_correct {
                    bucket.correct += 1;
                }
            }
            None => by_discipline.push(DisciplineScore {
                discipline: question.discipline.clone(),
                correct: usize::from(is_correct),
                total: 1,
            }),
        }
    }

    ScoreSummary { correct, total: paper.questions.len(), by_discipline }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::paper_with_questions;

    fn answers(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn unanswered_questions_count_toward_total() {
        let paper = paper_with_questions(
            "exam-1",
            &[("q1", "math", "a"), ("q2", "math", "b"), ("q3", "history", "c")],
        );

        let summary = grade(&paper, &answers(&[("q1", "a")]));
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn disciplines_keep_paper_order() {
        let paper = paper_with_questions(
            "exam-1",
            &[
                ("q1", "history", "a"),
                ("q2", "math", "b"),
                ("q3", "history", "c"),
                ("q4", "math", "d"),
            ],
        );

        let summary = grade(&paper, &answers(&[("q1", "a"), ("q2", "b"), ("q3", "b")]));
        assert_eq!(summary.correct, 2);

        let names: Vec<&str> =
            summary.by_discipline.iter().map(|bucket| bucket.discipline.as_str()).collect();
        assert_eq!(names, vec!["history", "math"]);

        assert_eq!(summary.by_discipline[0].correct, 1);
        assert_eq!(summary.by_discipline[0].total, 2);
        assert_eq!(summary.by_discipline[1].correct, 1);
        assert_eq!(summary.by_discipline[1].total, 2);
    }

    #[test]
    fn empty_paper_scores_zero() {
        let paper = paper_with_questions("exam-1", &[]);
        let summary = grade(&paper, &HashMap::new());
        assert_eq!(summary.correct, 0);
        assert_eq!(summary.total, 0);
        assert!(summary.by_discipline.is_empty());
    }
}
