use std::collections::HashSet;

use time::PrimitiveDateTime;

use crate::api::errors::ApiError;
use crate::schemas::exam::QuestionCreate;

const LETTERS: [&str; 5] = ["a", "b", "c", "d", "e"];

/// A window that can never open is a data-entry mistake, not a closed exam.
pub(crate) fn validate_exam_window(
    starts_at: PrimitiveDateTime,
    ends_at: PrimitiveDateTime,
) -> Result<(), ApiError> {
    if ends_at > starts_at {
        Ok(())
    } else {
        Err(ApiError::BadRequest("ends_at must be after starts_at".to_string()))
    }
}

pub(crate) fn validate_questions(questions: &[QuestionCreate]) -> Result<(), ApiError> {
    for (index, question) in questions.iter().enumerate() {
        let number = index + 1;
        let mut seen = HashSet::new();
        let mut correct_count = 0;

        for alternative in &question.alternatives {
            if !LETTERS.contains(&alternative.letter.as_str()) {
                return Err(ApiError::BadRequest(format!(
                    "question {number}: letter '{}' must be one of a-e",
                    alternative.letter
                )));
            }
            if !seen.insert(alternative.letter.as_str()) {
                return Err(ApiError::BadRequest(format!(
                    "question {number}: duplicate letter '{}'",
                    alternative.letter
                )));
            }
            if alternative.is_correct {
                correct_count += 1;
            }
        }

        if correct_count != 1 {
            return Err(ApiError::BadRequest(format!(
                "question {number} must have exactly one correct alternative"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::exam::AlternativeCreate;
    use time::macros::datetime;

    fn question(letters: &[(&str, bool)]) -> QuestionCreate {
        QuestionCreate {
            discipline: "math".to_string(),
            statement: "Pick one".to_string(),
            alternatives: letters
                .iter()
                .map(|(letter, is_correct)| AlternativeCreate {
                    letter: letter.to_string(),
                    statement: format!("option {letter}"),
                    is_correct: *is_correct,
                })
                .collect(),
        }
    }

    #[test]
    fn degenerate_window_is_rejected() {
        let start = datetime!(2025-06-01 10:00);
        assert!(validate_exam_window(start, datetime!(2025-06-01 08:00)).is_err());
        assert!(validate_exam_window(start, start).is_err());
        assert!(validate_exam_window(start, datetime!(2025-06-01 12:00)).is_ok());
    }

    #[test]
    fn question_needs_exactly_one_correct_alternative() {
        assert!(validate_questions(&[question(&[("a", true), ("b", false)])]).is_ok());
        assert!(validate_questions(&[question(&[("a", false), ("b", false)])]).is_err());
        assert!(validate_questions(&[question(&[("a", true), ("b", true)])]).is_err());
    }

    #[test]
    fn letters_outside_a_to_e_are_rejected() {
        assert!(validate_questions(&[question(&[("a", true), ("f", false)])]).is_err());
        assert!(validate_questions(&[question(&[("A", true), ("b", false)])]).is_err());
        assert!(validate_questions(&[question(&[("a", true), ("a", false)])]).is_err());
    }
}
