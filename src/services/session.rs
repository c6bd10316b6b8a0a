use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::services::guard::{self, RefusalReason, StartDecision};
use crate::services::scoring::{self, ScoreSummary};
use crate::services::storage::StorageService;
use crate::services::store::{ExamPaper, ExamWithGrants, PortalStore, StoreError};
use crate::services::transcript;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SessionState {
    Loading,
    InProgress,
    Submitting,
    Finalized,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AbortReason {
    Lockout,
    SubmittedElsewhere,
    ContentUnavailable,
    Abandoned,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum SessionError {
    #[error("no active session")]
    NotFound,
    #[error("session is {0:?}")]
    InvalidState(SessionState),
    #[error("unknown question {0}")]
    UnknownQuestion(String),
    #[error("question {question} has no alternative {letter}")]
    UnknownAlternative { question: String, letter: String },
}

/// One in-memory exam attempt. Nothing here is persisted; the submission
/// written at finalization is the only durable trace of a session.
#[derive(Debug, Clone)]
pub(crate) struct ExamSession {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) exam_title: String,
    pub(crate) student_id: String,
    pub(crate) state: SessionState,
    pub(crate) answers: HashMap<String, String>,
    pub(crate) paper: Option<ExamPaper>,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) deadline: PrimitiveDateTime,
    pub(crate) abort_reason: Option<AbortReason>,
}

impl ExamSession {
    pub(crate) fn new(exam: &ExamWithGrants, student_id: &str, now: PrimitiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            exam_id: exam.exam.id.clone(),
            exam_title: exam.exam.title.clone(),
            student_id: student_id.to_string(),
            state: SessionState::Loading,
            answers: HashMap::new(),
            paper: None,
            started_at: now,
            deadline: exam.exam.ends_at,
            abort_reason: None,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        matches!(
            self.state,
            SessionState::Loading | SessionState::InProgress | SessionState::Submitting
        )
    }

    pub(crate) fn deadline_passed(&self, now: PrimitiveDateTime) -> bool {
        now > self.deadline
    }

    pub(crate) fn attach_paper(&mut self, paper: ExamPaper) -> Result<(), SessionError> {
        if self.state != SessionState::Loading {
            return Err(SessionError::InvalidState(self.state));
        }
        self.paper = Some(paper);
        self.state = SessionState::InProgress;
        Ok(())
    }

    /// Validates the whole batch against the paper before applying any of
    /// it, so a rejected batch leaves the answer map untouched.
    pub(crate) fn record_answers(
        &mut self,
        entries: &HashMap<String, String>,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::InProgress {
            return Err(SessionError::InvalidState(self.state));
        }
        let Some(paper) = &self.paper else {
            return Err(SessionError::InvalidState(self.state));
        };

        for (question_id, letter) in entries {
            let question = paper
                .questions
                .iter()
                .find(|question| &question.id == question_id)
                .ok_or_else(|| SessionError::UnknownQuestion(question_id.clone()))?;
            if !question.has_alternative(letter) {
                return Err(SessionError::UnknownAlternative {
                    question: question_id.clone(),
                    letter: letter.clone(),
                });
            }
        }

        for (question_id, letter) in entries {
            self.answers.insert(question_id.clone(), letter.clone());
        }
        Ok(())
    }

    pub(crate) fn begin_submit(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::InProgress | SessionState::Submitting => {
                self.state = SessionState::Submitting;
                Ok(())
            }
            other => Err(SessionError::InvalidState(other)),
        }
    }

    pub(crate) fn complete(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Submitting {
            return Err(SessionError::InvalidState(self.state));
        }
        self.state = SessionState::Finalized;
        Ok(())
    }

    /// A transient persist failure drops the session back to `InProgress`
    /// with the answer map intact, so the student can retry.
    pub(crate) fn submit_failed(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Submitting {
            return Err(SessionError::InvalidState(self.state));
        }
        self.state = SessionState::InProgress;
        Ok(())
    }

    /// Aborting is idempotent and never undoes a finalized session.
    pub(crate) fn abort(&mut self, reason: AbortReason) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = SessionState::Aborted;
        self.abort_reason = Some(reason);
        true
    }
}

/// All live attempts, keyed by student id: a student has at most one
/// active session at a time.
#[derive(Clone, Default)]
pub(crate) struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, ExamSession>>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ExamSession>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs `session` as the student's active attempt.
    ///
    /// An existing attempt for the same exam that already has its paper is
    /// resumed instead (double navigation must not wipe answers). A stuck
    /// `Loading` attempt or an attempt for a different exam is discarded,
    /// matching the rule that navigating away abandons the attempt.
    pub(crate) fn begin(&self, session: ExamSession) -> (ExamSession, bool) {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(&session.student_id) {
            let resumable = existing.is_active()
                && existing.exam_id == session.exam_id
                && existing.state != SessionState::Loading;
            if resumable {
                return (existing.clone(), true);
            }
        }

        let snapshot = session.clone();
        sessions.insert(session.student_id.clone(), session);
        (snapshot, false)
    }

    pub(crate) fn find(&self, student_id: &str, session_id: &str) -> Option<ExamSession> {
        let sessions = self.lock();
        sessions
            .get(student_id)
            .filter(|session| session.id == session_id)
            .cloned()
    }

    pub(crate) fn update<R>(
        &self,
        student_id: &str,
        session_id: &str,
        apply: impl FnOnce(&mut ExamSession) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(student_id)
            .filter(|session| session.id == session_id)
            .ok_or(SessionError::NotFound)?;
        apply(session)
    }

    pub(crate) fn remove(&self, student_id: &str, session_id: &str) -> Option<ExamSession> {
        let mut sessions = self.lock();
        match sessions.get(student_id) {
            Some(session) if session.id == session_id => sessions.remove(student_id),
            _ => None,
        }
    }

    pub(crate) fn snapshot_active(&self) -> Vec<ExamSession> {
        let sessions = self.lock();
        sessions.values().filter(|session| session.is_active()).cloned().collect()
    }

    /// Aborts every active session the predicate condemns; returns how many
    /// were aborted.
    pub(crate) fn abort_matching(
        &self,
        condemn: impl Fn(&ExamSession) -> Option<AbortReason>,
    ) -> usize {
        let mut sessions = self.lock();
        let mut aborted = 0;
        for session in sessions.values_mut() {
            if !session.is_active() {
                continue;
            }
            if let Some(reason) = condemn(session) {
                if session.abort(reason) {
                    aborted += 1;
                }
            }
        }
        aborted
    }
}

#[derive(Debug, Error)]
pub(crate) enum ControllerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub(crate) enum StartOutcome {
    Started(ExamSession),
    Refused(RefusalReason),
}

/// Runs the guard and, on approval, moves a fresh session through
/// `Loading` into `InProgress`.
pub(crate) async fn start(
    store: &Arc<dyn PortalStore>,
    registry: &SessionRegistry,
    exam_id: &str,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Result<StartOutcome, ControllerError> {
    let decision = guard::request_start(store, exam_id, user_id, now).await?;
    let (profile, exam) = match decision {
        StartDecision::Refuse(reason) => return Ok(StartOutcome::Refused(reason)),
        StartDecision::Proceed { profile, exam } => (profile, exam),
    };

    let (active, resumed) = registry.begin(ExamSession::new(&exam, &profile.id, now));
    if resumed {
        tracing::debug!(exam_id, user_id, session_id = %active.id, "Resumed active session");
        return Ok(StartOutcome::Started(active));
    }

    match store.fetch_paper(exam_id).await {
        Ok(paper) if paper.questions.is_empty() => {
            tracing::error!(exam_id, "Exam has no questions after guard approval");
            let aborted = registry.update(&profile.id, &active.id, |session| {
                session.abort(AbortReason::ContentUnavailable);
                Ok(session.clone())
            })?;
            Ok(StartOutcome::Started(aborted))
        }
        Ok(paper) => {
            let started = registry.update(&profile.id, &active.id, |session| {
                session.attach_paper(paper)?;
                Ok(session.clone())
            })?;
            metrics::counter!("exam_sessions_started_total").increment(1);
            Ok(StartOutcome::Started(started))
        }
        Err(err) => {
            let _ = registry.update(&profile.id, &active.id, |session| {
                session.abort(AbortReason::ContentUnavailable);
                Ok(())
            });
            Err(err.into())
        }
    }
}

pub(crate) fn record_answers(
    registry: &SessionRegistry,
    user_id: &str,
    session_id: &str,
    entries: &HashMap<String, String>,
) -> Result<ExamSession, SessionError> {
    registry.update(user_id, session_id, |session| {
        session.record_answers(entries)?;
        Ok(session.clone())
    })
}

#[derive(Debug)]
pub(crate) struct FinalizeResult {
    pub(crate) session: ExamSession,
    pub(crate) summary: ScoreSummary,
}

enum FinalizePhase {
    AlreadyDone(ExamSession),
    Run(ExamSession),
}

/// Persists the answer map as the student's submission and finalizes the
/// session.
///
/// Safe to call repeatedly: a duplicate submission reported by the store is
/// success-equivalent, and a finalize on an already-finalized session just
/// returns the recorded result again.
pub(crate) async fn finalize(
    store: &Arc<dyn PortalStore>,
    registry: &SessionRegistry,
    storage: Option<StorageService>,
    user_id: &str,
    session_id: &str,
) -> Result<FinalizeResult, ControllerError> {
    let phase = registry.update(user_id, session_id, |session| match session.state {
        SessionState::Finalized => Ok(FinalizePhase::AlreadyDone(session.clone())),
        SessionState::InProgress | SessionState::Submitting => {
            session.begin_submit()?;
            Ok(FinalizePhase::Run(session.clone()))
        }
        other => Err(SessionError::InvalidState(other)),
    })?;

    let snapshot = match phase {
        FinalizePhase::AlreadyDone(session) => {
            let summary = grade_session(&session)?;
            return Ok(FinalizeResult { session, summary });
        }
        FinalizePhase::Run(session) => session,
    };

    if let Err(err) = store
        .create_submission(&snapshot.exam_id, &snapshot.student_id, &snapshot.answers)
        .await
    {
        let _ = registry.update(user_id, session_id, |session| {
            session.submit_failed()?;
            Ok(())
        });
        return Err(err.into());
    }

    let finalized = registry.update(user_id, session_id, |session| {
        session.complete()?;
        Ok(session.clone())
    })?;
    metrics::counter!("exam_sessions_finalized_total").increment(1);

    let summary = grade_session(&finalized)?;
    spawn_transcript_upload(store, storage, &finalized, &summary);

    Ok(FinalizeResult { session: finalized, summary })
}

fn grade_session(session: &ExamSession) -> Result<ScoreSummary, SessionError> {
    let Some(paper) = &session.paper else {
        return Err(SessionError::InvalidState(session.state));
    };
    Ok(scoring::grade(paper, &session.answers))
}

/// Fire-and-forget: the submission is already persisted, so a failed
/// transcript upload must never surface to the student.
fn spawn_transcript_upload(
    store: &Arc<dyn PortalStore>,
    storage: Option<StorageService>,
    session: &ExamSession,
    summary: &ScoreSummary,
) {
    let Some(storage) = storage else {
        return;
    };

    let store = Arc::clone(store);
    let session = session.clone();
    let summary = summary.clone();

    tokio::spawn(async move {
        let student = match store.fetch_profile(&session.student_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!(
                    student_id = %session.student_id,
                    "Profile vanished before transcript upload"
                );
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Transcript upload skipped: profile fetch failed");
                return;
            }
        };

        let artifact = transcript::build(&student, &session, &summary);
        match storage
            .upload_bytes(&artifact.key, "text/plain; charset=utf-8", artifact.body.into_bytes())
            .await
        {
            Ok((size, digest)) => {
                tracing::info!(
                    key = %artifact.key,
                    size,
                    digest = %digest,
                    "Transcript uploaded"
                );
                metrics::counter!("transcripts_uploaded_total").increment(1);
            }
            Err(err) => {
                tracing::error!(error = %err, key = %artifact.key, "Transcript upload failed");
            }
        }
    });
}

pub(crate) fn abandon(
    registry: &SessionRegistry,
    user_id: &str,
    session_id: &str,
) -> Result<ExamSession, SessionError> {
    let mut removed = registry.remove(user_id, session_id).ok_or(SessionError::NotFound)?;
    removed.abort(AbortReason::Abandoned);
    Ok(removed)
}

/// Re-checks every active session against fresh store state. Called by the
/// watcher whenever an invalidation signal lands.
pub(crate) async fn revalidate_active(
    store: &Arc<dyn PortalStore>,
    registry: &SessionRegistry,
    now: PrimitiveDateTime,
) -> Result<usize, StoreError> {
    use crate::db::types::Role;
    use crate::services::access::{self, AccessStatus};
    use crate::services::store::StudentScope;

    let mut aborted = 0;

    for session in registry.snapshot_active() {
        let profile = match store.fetch_profile(&session.student_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                aborted += abort_session(registry, &session, AbortReason::Lockout);
                continue;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Revalidation skipped: profile fetch failed");
                continue;
            }
        };

        if profile.is_blocked && profile.role != Role::Admin {
            aborted += abort_session(registry, &session, AbortReason::Lockout);
            continue;
        }

        let exams = store.fetch_exams(&StudentScope::for_profile(&profile)).await?;
        let Some(exam) = exams.into_iter().find(|candidate| candidate.exam.id == session.exam_id)
        else {
            aborted += abort_session(registry, &session, AbortReason::Lockout);
            continue;
        };

        let submitted = store.fetch_submitted_exam_ids(&session.student_id).await?;
        match access::evaluate(&exam, &profile, &submitted, now) {
            AccessStatus::Available => {}
            AccessStatus::Completed => {
                aborted += abort_session(registry, &session, AbortReason::SubmittedElsewhere);
            }
            AccessStatus::Expired
            | AccessStatus::LockedPermission
            | AccessStatus::LockedTime => {
                aborted += abort_session(registry, &session, AbortReason::Lockout);
            }
        }
    }

    Ok(aborted)
}

fn abort_session(registry: &SessionRegistry, session: &ExamSession, reason: AbortReason) -> usize {
    let result = registry.update(&session.student_id, &session.id, |live| {
        // A finalize may have won the race; abort() refuses terminal states.
        Ok(live.abort(reason))
    });
    match result {
        Ok(true) => {
            tracing::info!(
                session_id = %session.id,
                exam_id = %session.exam_id,
                student_id = %session.student_id,
                reason = ?reason,
                "Session aborted"
            );
            metrics::counter!("exam_sessions_aborted_total").increment(1);
            1
        }
        _ => 0,
    }
}

/// Aborts sessions whose exam window has closed. Returns the number swept.
pub(crate) fn sweep_expired(registry: &SessionRegistry, now: PrimitiveDateTime) -> usize {
    let swept = registry.abort_matching(|session| {
        session.deadline_passed(now).then_some(AbortReason::Lockout)
    });
    if swept > 0 {
        metrics::counter!("exam_sessions_aborted_total").increment(swept as u64);
    }
    swept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ExamAccess;
    use crate::test_support::{
        exam_with_grants, paper_with_questions, student_profile, MemoryStore,
    };
    use time::macros::datetime;

    fn open_exam(id: &str) -> ExamWithGrants {
        exam_with_grants(id, ExamAccess::OpenToAll, &[])
            .window(datetime!(2025-06-01 08:00), datetime!(2025-06-01 10:00))
    }

    fn answers(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn seeded_store() -> MemoryStore {
        MemoryStore::new()
            .with_profile(student_profile("stu-1", "9A"))
            .with_exam(open_exam("exam-1"))
            .with_paper(paper_with_questions(
                "exam-1",
                &[("q1", "math", "b"), ("q2", "math", "a"), ("q3", "history", "c")],
            ))
    }

    #[test]
    fn paper_attaches_only_while_loading() {
        let exam = open_exam("exam-1");
        let mut session = ExamSession::new(&exam, "stu-1", datetime!(2025-06-01 09:00));
        assert_eq!(session.state, SessionState::Loading);

        let paper = paper_with_questions("exam-1", &[("q1", "math", "a")]);
        session.attach_paper(paper.clone()).expect("attach");
        assert_eq!(session.state, SessionState::InProgress);

        let err = session.attach_paper(paper).unwrap_err();
        assert_eq!(err, SessionError::InvalidState(SessionState::InProgress));
    }

    #[test]
    fn rejected_answer_batch_leaves_map_untouched() {
        let exam = open_exam("exam-1");
        let mut session = ExamSession::new(&exam, "stu-1", datetime!(2025-06-01 09:00));
        session
            .attach_paper(paper_with_questions("exam-1", &[("q1", "math", "a")]))
            .expect("attach");

        session.record_answers(&answers(&[("q1", "a")])).expect("record");

        let err = session.record_answers(&answers(&[("q1", "b"), ("q9", "a")])).unwrap_err();
        assert_eq!(err, SessionError::UnknownQuestion("q9".to_string()));
        assert_eq!(session.answers.get("q1").map(String::as_str), Some("a"));
    }

    #[test]
    fn unknown_letter_is_rejected() {
        let exam = open_exam("exam-1");
        let mut session = ExamSession::new(&exam, "stu-1", datetime!(2025-06-01 09:00));
        session
            .attach_paper(paper_with_questions("exam-1", &[("q1", "math", "a")]))
            .expect("attach");

        let err = session.record_answers(&answers(&[("q1", "z")])).unwrap_err();
        assert_eq!(
            err,
            SessionError::UnknownAlternative { question: "q1".to_string(), letter: "z".to_string() }
        );
    }

    #[test]
    fn abort_never_undoes_finalized() {
        let exam = open_exam("exam-1");
        let mut session = ExamSession::new(&exam, "stu-1", datetime!(2025-06-01 09:00));
        session
            .attach_paper(paper_with_questions("exam-1", &[("q1", "math", "a")]))
            .expect("attach");
        session.begin_submit().expect("submit");
        session.complete().expect("complete");

        assert!(!session.abort(AbortReason::Lockout));
        assert_eq!(session.state, SessionState::Finalized);
    }

    #[test]
    fn submit_failure_returns_to_in_progress() {
        let exam = open_exam("exam-1");
        let mut session = ExamSession::new(&exam, "stu-1", datetime!(2025-06-01 09:00));
        session
            .attach_paper(paper_with_questions("exam-1", &[("q1", "math", "a")]))
            .expect("attach");
        session.record_answers(&answers(&[("q1", "a")])).expect("record");
        session.begin_submit().expect("submit");

        session.submit_failed().expect("rollback");
        assert_eq!(session.state, SessionState::InProgress);
        assert_eq!(session.answers.len(), 1);
    }

    #[test]
    fn registry_keeps_one_session_per_student() {
        let registry = SessionRegistry::new();
        let exam_a = open_exam("exam-1");
        let exam_b = open_exam("exam-2");

        let mut first = ExamSession::new(&exam_a, "stu-1", datetime!(2025-06-01 09:00));
        first
            .attach_paper(paper_with_questions("exam-1", &[("q1", "math", "a")]))
            .expect("attach");
        let first_id = first.id.clone();
        registry.begin(first);

        // Same exam, paper already loaded: resumed.
        let (resumed, was_resumed) =
            registry.begin(ExamSession::new(&exam_a, "stu-1", datetime!(2025-06-01 09:05)));
        assert!(was_resumed);
        assert_eq!(resumed.id, first_id);

        // Different exam: the old attempt is discarded.
        let (fresh, was_resumed) =
            registry.begin(ExamSession::new(&exam_b, "stu-1", datetime!(2025-06-01 09:10)));
        assert!(!was_resumed);
        assert_eq!(fresh.exam_id, "exam-2");
        assert!(registry.find("stu-1", &first_id).is_none());
    }

    #[tokio::test]
    async fn start_moves_session_into_in_progress() {
        let store: Arc<dyn PortalStore> = Arc::new(seeded_store());
        let registry = SessionRegistry::new();

        let outcome = start(&store, &registry, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("start");
        let StartOutcome::Started(session) = outcome else {
            panic!("expected a started session");
        };
        assert_eq!(session.state, SessionState::InProgress);
        assert_eq!(session.paper.as_ref().map(|paper| paper.questions.len()), Some(3));
    }

    #[tokio::test]
    async fn start_refusal_creates_no_session() {
        let store: Arc<dyn PortalStore> = Arc::new(seeded_store());
        let registry = SessionRegistry::new();

        let outcome = start(&store, &registry, "exam-1", "stu-1", datetime!(2025-06-01 07:00))
            .await
            .expect("start");
        assert!(matches!(outcome, StartOutcome::Refused(RefusalReason::NotYetOpen)));
        assert!(registry.snapshot_active().is_empty());
    }

    #[tokio::test]
    async fn empty_paper_aborts_the_session() {
        let store: Arc<dyn PortalStore> = Arc::new(
            MemoryStore::new()
                .with_profile(student_profile("stu-1", "9A"))
                .with_exam(open_exam("exam-1")),
        );
        let registry = SessionRegistry::new();

        let outcome = start(&store, &registry, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("start");
        let StartOutcome::Started(session) = outcome else {
            panic!("expected a session");
        };
        assert_eq!(session.state, SessionState::Aborted);
        assert_eq!(session.abort_reason, Some(AbortReason::ContentUnavailable));
    }

    #[tokio::test]
    async fn finalize_persists_once_and_is_idempotent() {
        let store: Arc<dyn PortalStore> = Arc::new(seeded_store());
        let registry = SessionRegistry::new();

        let outcome = start(&store, &registry, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("start");
        let StartOutcome::Started(session) = outcome else {
            panic!("expected a session");
        };

        record_answers(
            &registry,
            "stu-1",
            &session.id,
            &answers(&[("q1", "b"), ("q2", "a"), ("q3", "a")]),
        )
        .expect("record");

        let first = finalize(&store, &registry, None, "stu-1", &session.id)
            .await
            .expect("finalize");
        assert_eq!(first.session.state, SessionState::Finalized);
        assert_eq!(first.summary.correct, 2);
        assert_eq!(first.summary.total, 3);

        let second = finalize(&store, &registry, None, "stu-1", &session.id)
            .await
            .expect("finalize again");
        assert_eq!(second.session.state, SessionState::Finalized);
        assert_eq!(second.summary.correct, 2);
    }

    #[tokio::test]
    async fn duplicate_submission_is_success_equivalent() {
        let memory = Arc::new(seeded_store());
        let store: Arc<dyn PortalStore> = memory.clone();
        let registry = SessionRegistry::new();

        let outcome = start(&store, &registry, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("start");
        let StartOutcome::Started(session) = outcome else {
            panic!("expected a session");
        };
        record_answers(&registry, "stu-1", &session.id, &answers(&[("q1", "b")]))
            .expect("record");

        // Another device commits the submission first; this finalize hits
        // the store's already-exists path and must still succeed.
        memory.insert_submission("exam-1", "stu-1");

        let result = finalize(&store, &registry, None, "stu-1", &session.id)
            .await
            .expect("finalize");
        assert_eq!(result.session.state, SessionState::Finalized);
    }

    #[tokio::test]
    async fn failed_persist_keeps_answers_for_retry() {
        let memory = Arc::new(seeded_store());
        let store: Arc<dyn PortalStore> = memory.clone();
        let registry = SessionRegistry::new();

        let outcome = start(&store, &registry, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("start");
        let StartOutcome::Started(session) = outcome else {
            panic!("expected a session");
        };
        record_answers(&registry, "stu-1", &session.id, &answers(&[("q1", "b")]))
            .expect("record");

        memory.fail_next_fetch();

        let err = finalize(&store, &registry, None, "stu-1", &session.id).await.unwrap_err();
        assert!(matches!(err, ControllerError::Store(StoreError::Unavailable(_))));

        let live = registry.find("stu-1", &session.id).expect("session kept");
        assert_eq!(live.state, SessionState::InProgress);
        assert_eq!(live.answers.len(), 1);

        let retried = finalize(&store, &registry, None, "stu-1", &session.id)
            .await
            .expect("retry succeeds");
        assert_eq!(retried.session.state, SessionState::Finalized);
    }

    #[tokio::test]
    async fn revalidation_aborts_blocked_student_mid_session() {
        let memory = Arc::new(seeded_store());
        let store: Arc<dyn PortalStore> = memory.clone();
        let registry = SessionRegistry::new();

        let outcome = start(&store, &registry, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("start");
        let StartOutcome::Started(session) = outcome else {
            panic!("expected a session");
        };
        assert_eq!(session.state, SessionState::InProgress);

        memory.block_profile("stu-1");

        let aborted = revalidate_active(&store, &registry, datetime!(2025-06-01 09:05))
            .await
            .expect("revalidate");
        assert_eq!(aborted, 1);

        let live = registry.find("stu-1", &session.id).expect("session still present");
        assert_eq!(live.state, SessionState::Aborted);
        assert_eq!(live.abort_reason, Some(AbortReason::Lockout));
    }

    #[tokio::test]
    async fn revalidation_flags_submission_from_another_device() {
        let memory = Arc::new(seeded_store());
        let store: Arc<dyn PortalStore> = memory.clone();
        let registry = SessionRegistry::new();

        let outcome = start(&store, &registry, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("start");
        let StartOutcome::Started(session) = outcome else {
            panic!("expected a session");
        };

        memory.insert_submission("exam-1", "stu-1");

        let aborted = revalidate_active(&store, &registry, datetime!(2025-06-01 09:05))
            .await
            .expect("revalidate");
        assert_eq!(aborted, 1);

        let live = registry.find("stu-1", &session.id).expect("session present");
        assert_eq!(live.abort_reason, Some(AbortReason::SubmittedElsewhere));
    }

    #[test]
    fn sweep_aborts_past_deadline_sessions() {
        let registry = SessionRegistry::new();
        let exam = open_exam("exam-1");
        let mut session = ExamSession::new(&exam, "stu-1", datetime!(2025-06-01 09:00));
        session
            .attach_paper(paper_with_questions("exam-1", &[("q1", "math", "a")]))
            .expect("attach");
        registry.begin(session);

        assert_eq!(sweep_expired(&registry, datetime!(2025-06-01 09:59)), 0);
        assert_eq!(sweep_expired(&registry, datetime!(2025-06-01 10:01)), 1);

        let snapshot = registry.snapshot_active();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn abandon_drops_the_session() {
        let store: Arc<dyn PortalStore> = Arc::new(seeded_store());
        let registry = SessionRegistry::new();

        let outcome = start(&store, &registry, "exam-1", "stu-1", datetime!(2025-06-01 09:00))
            .await
            .expect("start");
        let StartOutcome::Started(session) = outcome else {
            panic!("expected a session");
        };

        let removed = abandon(&registry, "stu-1", &session.id).expect("abandon");
        assert_eq!(removed.state, SessionState::Aborted);
        assert_eq!(removed.abort_reason, Some(AbortReason::Abandoned));
        assert!(registry.find("stu-1", &session.id).is_none());

        assert!(matches!(
            abandon(&registry, "stu-1", &session.id),
            Err(SessionError::NotFound)
        ));
    }
}
