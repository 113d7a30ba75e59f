use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use exam_core::model::{
    Answers, AttemptId, ExamDefinition, Question, QuestionId, SessionStatus, SubmitReason,
    Submission, SubmissionReceipt, SubmissionSummary, UserId,
};

use super::progress::SessionProgress;
use crate::error::SessionError;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Result of asking a session to submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// This call moved the session from `Active` to `Submitted`.
    Submitted(SubmissionSummary),
    /// The session was already submitted; carries the frozen summary.
    AlreadySubmitted(SubmissionSummary),
}

impl Transition {
    #[must_use]
    pub fn summary(&self) -> SubmissionSummary {
        match self {
            Transition::Submitted(s) | Transition::AlreadySubmitted(s) => *s,
        }
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Transition::Submitted(_))
    }
}

/// Result of a single timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Time remains on the clock.
    Running { remaining_seconds: u32 },
    /// This tick ran the clock out and submitted the session.
    Expired(SubmissionSummary),
    /// The session was already submitted; nothing changed.
    Idle,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One student's attempt at an exam.
///
/// Holds the navigation position, recorded answers and countdown. Every path
/// into `Submitted` (explicit submit or the clock running out) goes through
/// `finalize`, which is the only place the status changes.
pub struct ExamSession {
    attempt_id: AttemptId,
    user_id: UserId,
    definition: Arc<ExamDefinition>,
    answers: Answers,
    current: usize,
    remaining_seconds: u32,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    summary: Option<SubmissionSummary>,
    receipt: Option<SubmissionReceipt>,
}

impl ExamSession {
    /// Start a fresh attempt with the full exam duration on the clock.
    #[must_use]
    pub fn new(
        attempt_id: AttemptId,
        user_id: UserId,
        definition: Arc<ExamDefinition>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let remaining_seconds = definition.duration_seconds();
        Self {
            attempt_id,
            user_id,
            definition,
            answers: Answers::new(),
            current: 0,
            remaining_seconds,
            started_at,
            submitted_at: None,
            summary: None,
            receipt: None,
        }
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn definition(&self) -> &ExamDefinition {
        &self.definition
    }

    #[must_use]
    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, question_id: QuestionId) -> Option<&str> {
        self.answers.get(&question_id).map(String::as_str)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        if self.summary.is_some() {
            SessionStatus::Submitted
        } else {
            SessionStatus::Active
        }
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.summary.is_some()
    }

    /// Frozen summary, once submitted.
    #[must_use]
    pub fn summary(&self) -> Option<SubmissionSummary> {
        self.summary
    }

    /// Receipt from the submission sink, once delivered.
    #[must_use]
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.definition.question_count()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_answered(&self, index: usize) -> bool {
        self.definition
            .question(index)
            .is_some_and(|q| self.answers.contains_key(&q.id()))
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        // `current` is kept in range by `go_to`, and exams are never empty.
        &self.definition.questions()[self.current]
    }

    #[must_use]
    pub fn is_first(&self) -> bool {
        self.current == 0
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.current + 1 == self.total_questions()
    }

    /// `100 * (current_index + 1) / total_questions`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self) -> f64 {
        100.0 * (self.current + 1) as f64 / self.total_questions() as f64
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            position: self.current + 1,
            total: self.total_questions(),
            answered: self.answered_count(),
            remaining_seconds: self.remaining_seconds,
            percent: self.progress_percent(),
            is_submitted: self.is_submitted(),
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.is_submitted() {
            return Err(SessionError::InvalidState);
        }
        Ok(())
    }

    /// Record or overwrite the answer for a question. Values are not checked
    /// against the question's choices.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` after submission and
    /// `SessionError::UnknownQuestion` for ids outside this exam.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.ensure_active()?;
        if !self.definition.contains_question(question_id) {
            return Err(SessionError::UnknownQuestion(question_id));
        }
        self.answers.insert(question_id, value.into());
        Ok(())
    }

    /// Record an answer for the question currently shown.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` after submission.
    pub fn answer_current(&mut self, value: impl Into<String>) -> Result<(), SessionError> {
        let id = self.current_question().id();
        self.record_answer(id, value)
    }

    /// Jump to a question by zero-based index.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` after submission and
    /// `SessionError::OutOfRange` if `index` is past the last question.
    pub fn go_to(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_active()?;
        let len = self.total_questions();
        if index >= len {
            return Err(SessionError::OutOfRange { index, len });
        }
        self.current = index;
        Ok(())
    }

    /// Advance one question; stays put on the last one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` after submission.
    pub fn next(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        if !self.is_last() {
            self.current += 1;
        }
        Ok(())
    }

    /// Go back one question; stays put on the first one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` after submission.
    pub fn previous(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.current = self.current.saturating_sub(1);
        Ok(())
    }

    /// Count down one second. Reaching zero submits with `TimeExpired`.
    pub fn tick(&mut self, at: DateTime<Utc>) -> TickOutcome {
        if self.is_submitted() {
            return TickOutcome::Idle;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds > 0 {
            return TickOutcome::Running {
                remaining_seconds: self.remaining_seconds,
            };
        }

        match self.finalize(SubmitReason::TimeExpired, at) {
            Transition::Submitted(summary) => TickOutcome::Expired(summary),
            Transition::AlreadySubmitted(_) => TickOutcome::Idle,
        }
    }

    /// Submit the attempt. Repeated calls return the same frozen summary.
    pub fn submit(&mut self, reason: SubmitReason, at: DateTime<Utc>) -> Transition {
        self.finalize(reason, at)
    }

    fn finalize(&mut self, reason: SubmitReason, at: DateTime<Utc>) -> Transition {
        if let Some(summary) = self.summary {
            return Transition::AlreadySubmitted(summary);
        }

        let summary = SubmissionSummary {
            answered_count: self.answered_count(),
            total_count: self.total_questions(),
            reason,
        };
        self.summary = Some(summary);
        self.submitted_at = Some(at);
        Transition::Submitted(summary)
    }

    /// Payload for the submission sink, available once submitted.
    #[must_use]
    pub fn to_submission(&self) -> Option<Submission> {
        let summary = self.summary?;
        let submitted_at = self.submitted_at?;
        Some(Submission {
            attempt_id: self.attempt_id,
            exam_id: self.definition.id(),
            user_id: self.user_id,
            answers: self.answers.clone(),
            reason: summary.reason,
            submitted_at,
            total_questions: summary.total_count,
        })
    }

    pub(crate) fn set_receipt(&mut self, receipt: SubmissionReceipt) {
        self.receipt = Some(receipt);
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("attempt_id", &self.attempt_id)
            .field("exam_id", &self.definition.id())
            .field("questions_len", &self.total_questions())
            .field("current", &self.current)
            .field("answers_len", &self.answers.len())
            .field("remaining_seconds", &self.remaining_seconds)
            .field("status", &self.status())
            .field("receipt", &self.receipt.as_ref().map(|r| r.id))
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::ExamId;
    use exam_core::time::fixed_now;

    fn build_exam(questions: u64, minutes: u32) -> Arc<ExamDefinition> {
        let questions = (1..=questions)
            .map(|id| {
                Question::single_choice(
                    QuestionId::new(id),
                    format!("Q{id}"),
                    vec!["A".into(), "B".into(), "C".into()],
                )
                .unwrap()
            })
            .collect();
        Arc::new(ExamDefinition::new(ExamId::new(1), "Quiz", "Math", minutes, questions).unwrap())
    }

    fn build_session(questions: u64, minutes: u32) -> ExamSession {
        ExamSession::new(
            AttemptId::generate(),
            UserId::new(3),
            build_exam(questions, minutes),
            fixed_now(),
        )
    }

    #[test]
    fn new_session_starts_at_first_question_with_full_clock() {
        let session = build_session(3, 60);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.remaining_seconds(), 3600);
        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.answers().is_empty());
    }

    #[test]
    fn answers_are_last_write_wins() {
        let mut session = build_session(3, 10);
        let writes = [(1, "A"), (2, "B"), (1, "C"), (3, "A"), (2, "free text is fine")];
        for (id, value) in writes {
            session.record_answer(QuestionId::new(id), value).unwrap();
        }

        assert_eq!(session.answer(QuestionId::new(1)), Some("C"));
        assert_eq!(session.answer(QuestionId::new(2)), Some("free text is fine"));
        assert_eq!(session.answer(QuestionId::new(3)), Some("A"));
        assert!(session.answered_count() <= session.total_questions());
    }

    #[test]
    fn unknown_question_is_rejected() {
        let mut session = build_session(2, 10);
        let err = session.record_answer(QuestionId::new(99), "A").unwrap_err();
        assert!(matches!(err, SessionError::UnknownQuestion(id) if id == QuestionId::new(99)));
        assert!(session.answers().is_empty());
    }

    #[test]
    fn go_to_out_of_range_leaves_index_unchanged() {
        let mut session = build_session(3, 10);
        session.go_to(1).unwrap();

        let err = session.go_to(3).unwrap_err();
        assert!(matches!(err, SessionError::OutOfRange { index: 3, len: 3 }));
        assert!(session.go_to(usize::MAX).is_err());
        assert_eq!(session.current_index(), 1);
    }

    #[test]
    fn next_and_previous_stop_at_boundaries() {
        let mut session = build_session(2, 10);
        session.previous().unwrap();
        assert_eq!(session.current_index(), 0);

        session.next().unwrap();
        session.next().unwrap();
        assert_eq!(session.current_index(), 1);
        assert!(session.is_last());

        session.previous().unwrap();
        assert!(session.is_first());
    }

    #[test]
    fn progress_percent_tracks_position() {
        let mut session = build_session(4, 10);
        assert!((session.progress_percent() - 25.0).abs() < f64::EPSILON);
        session.go_to(3).unwrap();
        assert!((session.progress_percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ticking_full_duration_expires_session() {
        let mut session = build_session(2, 2);
        session.record_answer(QuestionId::new(2), "B").unwrap();

        let ticks = 2 * 60;
        for _ in 0..ticks - 1 {
            assert!(matches!(session.tick(fixed_now()), TickOutcome::Running { .. }));
        }
        let last = session.tick(fixed_now());

        assert_eq!(
            last,
            TickOutcome::Expired(SubmissionSummary {
                answered_count: 1,
                total_count: 2,
                reason: SubmitReason::TimeExpired,
            })
        );
        assert_eq!(session.status(), SessionStatus::Submitted);
        assert_eq!(session.remaining_seconds(), 0);
        assert_eq!(session.tick(fixed_now()), TickOutcome::Idle);
        assert_eq!(session.remaining_seconds(), 0);
    }

    #[test]
    fn submit_twice_returns_identical_summary() {
        let mut session = build_session(3, 10);
        session.record_answer(QuestionId::new(1), "A").unwrap();

        let first = session.submit(SubmitReason::UserRequested, fixed_now());
        let second = session.submit(SubmitReason::TimeExpired, fixed_now());

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.summary(), second.summary());
        assert_eq!(second.summary().reason, SubmitReason::UserRequested);
    }

    #[test]
    fn submitted_session_rejects_mutation() {
        let mut session = build_session(3, 10);
        session.go_to(1).unwrap();
        session.record_answer(QuestionId::new(1), "A").unwrap();
        session.submit(SubmitReason::UserRequested, fixed_now());

        assert!(matches!(
            session.record_answer(QuestionId::new(2), "B"),
            Err(SessionError::InvalidState)
        ));
        assert!(matches!(session.go_to(0), Err(SessionError::InvalidState)));
        assert!(matches!(session.next(), Err(SessionError::InvalidState)));
        assert!(matches!(session.previous(), Err(SessionError::InvalidState)));

        assert_eq!(session.current_index(), 1);
        assert_eq!(session.answered_count(), 1);
        assert_eq!(session.remaining_seconds(), 600);
    }

    #[test]
    fn single_question_scenario() {
        let mut session = build_session(1, 1);
        session.record_answer(QuestionId::new(1), "A").unwrap();

        let transition = session.submit(SubmitReason::UserRequested, fixed_now());
        assert_eq!(
            transition,
            Transition::Submitted(SubmissionSummary {
                answered_count: 1,
                total_count: 1,
                reason: SubmitReason::UserRequested,
            })
        );

        for _ in 0..120 {
            assert_eq!(session.tick(fixed_now()), TickOutcome::Idle);
        }
        assert_eq!(session.remaining_seconds(), 60);
    }

    #[test]
    fn submission_payload_reflects_frozen_state() {
        let mut session = build_session(2, 10);
        assert!(session.to_submission().is_none());

        session.answer_current("C").unwrap();
        session.submit(SubmitReason::UserRequested, fixed_now());

        let submission = session.to_submission().unwrap();
        assert_eq!(submission.attempt_id, session.attempt_id());
        assert_eq!(submission.answers.get(&QuestionId::new(1)).unwrap(), "C");
        assert_eq!(submission.submitted_at, fixed_now());
        assert_eq!(submission.summary(), session.summary().unwrap());
    }
}
