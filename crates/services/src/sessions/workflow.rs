use std::sync::Arc;

use exam_core::model::{
    AttemptId, ExamId, SubmitReason, SubmissionReceipt, SubmissionSummary, User,
};
use storage::repository::{ExamCatalog, StorageError, SubmissionSink};
use tracing::{debug, info, warn};

use super::service::{ExamSession, TickOutcome, Transition};
use crate::Clock;
use crate::error::SessionError;

/// Result of a submit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub summary: SubmissionSummary,
    /// Sink receipt; `None` only if delivery has not succeeded yet.
    pub receipt: Option<SubmissionReceipt>,
    /// Whether this call performed the transition.
    pub newly_submitted: bool,
}

/// Orchestrates exam start, timer ticks and submission delivery.
#[derive(Clone)]
pub struct ExamLoopService {
    clock: Clock,
    catalog: Arc<dyn ExamCatalog>,
    sink: Arc<dyn SubmissionSink>,
}

impl ExamLoopService {
    #[must_use]
    pub fn new(clock: Clock, catalog: Arc<dyn ExamCatalog>, sink: Arc<dyn SubmissionSink>) -> Self {
        Self {
            clock,
            catalog,
            sink,
        }
    }

    /// Start a new attempt for `user` on the given exam.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Forbidden` for non-students,
    /// `SessionError::NotFound` for unknown exams, or `SessionError::Storage`.
    pub async fn start_session(
        &self,
        user: &User,
        exam_id: ExamId,
    ) -> Result<ExamSession, SessionError> {
        if !user.role().can_take_exams() {
            return Err(SessionError::Forbidden { role: user.role() });
        }

        let definition = match self.catalog.fetch_exam_definition(exam_id).await {
            Ok(definition) => definition,
            Err(StorageError::NotFound) => return Err(SessionError::NotFound(exam_id)),
            Err(e) => return Err(e.into()),
        };

        let session = ExamSession::new(
            AttemptId::generate(),
            user.id(),
            Arc::new(definition),
            self.clock.now(),
        );
        info!(
            attempt_id = %session.attempt_id(),
            exam_id = %exam_id,
            user_id = %user.id(),
            questions = session.total_questions(),
            remaining_seconds = session.remaining_seconds(),
            "exam session started"
        );
        Ok(session)
    }

    /// Submit the attempt and deliver it to the sink.
    ///
    /// The sink is called only by the call that performs the transition;
    /// repeat calls return the frozen summary and whatever receipt exists.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Sink` if delivery fails. The session stays
    /// submitted; use `finalize_submission` to retry.
    pub async fn submit(
        &self,
        session: &mut ExamSession,
        reason: SubmitReason,
    ) -> Result<SubmitOutcome, SessionError> {
        match session.submit(reason, self.clock.now()) {
            Transition::AlreadySubmitted(summary) => {
                debug!(attempt_id = %session.attempt_id(), "submit ignored, already submitted");
                Ok(SubmitOutcome {
                    summary,
                    receipt: session.receipt().cloned(),
                    newly_submitted: false,
                })
            }
            Transition::Submitted(summary) => {
                info!(
                    attempt_id = %session.attempt_id(),
                    reason = %summary.reason,
                    answered = summary.answered_count,
                    total = summary.total_count,
                    "exam submitted"
                );
                let receipt = self.deliver(session).await?;
                Ok(SubmitOutcome {
                    summary,
                    receipt: Some(receipt),
                    newly_submitted: true,
                })
            }
        }
    }

    /// Advance the countdown by one second, delivering on expiry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Sink` if the expiry submission cannot be delivered.
    pub async fn tick(&self, session: &mut ExamSession) -> Result<TickOutcome, SessionError> {
        let outcome = session.tick(self.clock.now());
        if let TickOutcome::Expired(summary) = outcome {
            info!(
                attempt_id = %session.attempt_id(),
                answered = summary.answered_count,
                total = summary.total_count,
                "exam time expired"
            );
            self.deliver(session).await?;
        }
        Ok(outcome)
    }

    /// Retry delivery for a submitted session that has no receipt yet.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` if the session is still active,
    /// or `SessionError::Sink` if delivery fails again.
    pub async fn finalize_submission(
        &self,
        session: &mut ExamSession,
    ) -> Result<SubmissionReceipt, SessionError> {
        if let Some(receipt) = session.receipt() {
            return Ok(receipt.clone());
        }
        if !session.is_submitted() {
            return Err(SessionError::InvalidState);
        }
        self.deliver(session).await
    }

    async fn deliver(&self, session: &mut ExamSession) -> Result<SubmissionReceipt, SessionError> {
        let submission = session.to_submission().ok_or(SessionError::InvalidState)?;
        let receipt = self
            .sink
            .submit_answers(&submission)
            .await
            .map_err(|e| {
                warn!(attempt_id = %submission.attempt_id, error = %e, "submission delivery failed");
                SessionError::Sink(e)
            })?;
        session.set_receipt(receipt.clone());
        Ok(receipt)
    }
}
