use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::db::models::{Exam, Profile};
use crate::repositories;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Which slice of the exam collection a caller sees. Students see their
/// cohort; staff see everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StudentScope {
    ClassTag(String),
    All,
}

impl StudentScope {
    pub(crate) fn for_profile(profile: &Profile) -> Self {
        if profile.role.is_staff() {
            return Self::All;
        }
        Self::ClassTag(profile.class_tag.clone().unwrap_or_default())
    }
}

/// An exam together with its individual-access grant set. Access decisions
/// need both, so they are always fetched as a unit.
#[derive(Debug, Clone)]
pub(crate) struct ExamWithGrants {
    pub(crate) exam: Exam,
    pub(crate) granted_student_ids: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmissionOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone)]
pub(crate) struct ExamPaper {
    pub(crate) exam_id: String,
    pub(crate) questions: Vec<PaperQuestion>,
}

#[derive(Debug, Clone)]
pub(crate) struct PaperQuestion {
    pub(crate) id: String,
    pub(crate) position: i32,
    pub(crate) discipline: String,
    pub(crate) statement: String,
    pub(crate) alternatives: Vec<PaperAlternative>,
}

impl PaperQuestion {
    pub(crate) fn has_alternative(&self, letter: &str) -> bool {
        self.alternatives.iter().any(|alternative| alternative.letter == letter)
    }

    pub(crate) fn correct_letter(&self) -> Option<&str> {
        self.alternatives
            .iter()
            .find(|alternative| alternative.is_correct)
            .map(|alternative| alternative.letter.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PaperAlternative {
    pub(crate) letter: String,
    pub(crate) statement: String,
    pub(crate) is_correct: bool,
}

/// Read/write contract between the exam-access machinery and the backing
/// store. Everything the evaluator, guard and session controller touch goes
/// through this trait; handlers outside that path use the repositories
/// directly.
#[async_trait]
pub(crate) trait PortalStore: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError>;

    /// Exams visible within a scope, each with its grant set attached.
    async fn fetch_exams(&self, scope: &StudentScope) -> Result<Vec<ExamWithGrants>, StoreError>;

    async fn fetch_submitted_exam_ids(
        &self,
        student_id: &str,
    ) -> Result<HashSet<String>, StoreError>;

    /// Idempotent: a second call for the same (exam, student) pair reports
    /// `AlreadyExists` and leaves the stored record untouched.
    async fn create_submission(
        &self,
        exam_id: &str,
        student_id: &str,
        answers: &HashMap<String, String>,
    ) -> Result<SubmissionOutcome, StoreError>;

    /// Full question/alternative content, correctness markers included.
    /// Callers are responsible for stripping markers before anything
    /// student-facing sees the paper.
    async fn fetch_paper(&self, exam_id: &str) -> Result<ExamPaper, StoreError>;
}

pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PortalStore for PgStore {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        repositories::profiles::find_by_id(&self.pool, user_id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn fetch_exams(&self, scope: &StudentScope) -> Result<Vec<ExamWithGrants>, StoreError> {
        let exams = match scope {
            StudentScope::ClassTag(class_tag) => {
                repositories::exams::list_by_class_tag(&self.pool, class_tag)
                    .await
                    .map_err(StoreError::from_sqlx)?
            }
            StudentScope::All => {
                repositories::exams::list_all(&self.pool).await.map_err(StoreError::from_sqlx)?
            }
        };

        attach_grants(&self.pool, exams).await
    }

    async fn fetch_submitted_exam_ids(
        &self,
        student_id: &str,
    ) -> Result<HashSet<String>, StoreError> {
        let ids = repositories::submissions::list_exam_ids_by_student(&self.pool, student_id)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(ids.into_iter().collect())
    }

    async fn create_submission(
        &self,
        exam_id: &str,
        student_id: &str,
        answers: &HashMap<String, String>,
    ) -> Result<SubmissionOutcome, StoreError> {
        let inserted = repositories::submissions::create_if_absent(
            &self.pool,
            exam_id,
            student_id,
            answers,
            crate::core::time::primitive_now_utc(),
        )
        .await
        .map_err(StoreError::from_sqlx)?;

        if inserted {
            Ok(SubmissionOutcome::Created)
        } else {
            Ok(SubmissionOutcome::AlreadyExists)
        }
    }

    async fn fetch_paper(&self, exam_id: &str) -> Result<ExamPaper, StoreError> {
        let exam = repositories::exams::find_by_id(&self.pool, exam_id)
            .await
            .map_err(StoreError::from_sqlx)?;
        if exam.is_none() {
            return Err(StoreError::NotFound);
        }

        let questions = repositories::questions::list_by_exam(&self.pool, exam_id)
            .await
            .map_err(StoreError::from_sqlx)?;
        let alternatives = repositories::questions::list_alternatives_by_exam(&self.pool, exam_id)
            .await
            .map_err(StoreError::from_sqlx)?;

        let mut by_question: HashMap<String, Vec<PaperAlternative>> = HashMap::new();
        for alternative in alternatives {
            by_question.entry(alternative.question_id.clone()).or_default().push(
                PaperAlternative {
                    letter: alternative.letter,
                    statement: alternative.statement,
                    is_correct: alternative.is_correct,
                },
            );
        }

        let questions = questions
            .into_iter()
            .map(|question| {
                let alternatives = by_question.remove(&question.id).unwrap_or_default();
                PaperQuestion {
                    id: question.id,
                    position: question.position,
                    discipline: question.discipline,
                    statement: question.statement,
                    alternatives,
                }
            })
            .collect();

        Ok(ExamPaper { exam_id: exam_id.to_string(), questions })
    }
}

async fn attach_grants(
    pool: &PgPool,
    exams: Vec<Exam>,
) -> Result<Vec<ExamWithGrants>, StoreError> {
    let exam_ids: Vec<String> = exams.iter().map(|exam| exam.id.clone()).collect();
    let pairs = repositories::grants::list_for_exams(pool, &exam_ids)
        .await
        .map_err(StoreError::from_sqlx)?;

    let mut grants: HashMap<String, HashSet<String>> = HashMap::new();
    for (exam_id, student_id) in pairs {
        grants.entry(exam_id).or_default().insert(student_id);
    }

    Ok(exams
        .into_iter()
        .map(|exam| {
            let granted_student_ids = grants.remove(&exam.id).unwrap_or_default();
            ExamWithGrants { exam, granted_student_ids }
        })
        .collect())
}
