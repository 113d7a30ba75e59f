use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::error::Error;
use crate::model::ids::{ExamId, QuestionId};
use crate::model::question::{Question, QuestionDraft};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("exam title cannot be empty")]
    EmptyTitle,

    #[error("exam duration must be > 0 minutes")]
    InvalidDuration,

    #[error("exam duration of {minutes} minutes is too long")]
    DurationOverflow { minutes: u32 },

    #[error("exam must contain at least one question")]
    NoQuestions,

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(QuestionId),
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// Immutable definition of an exam: metadata plus the ordered question list.
///
/// Question order is the navigation order and never changes once built.
/// Serde goes through `ExamDraft`, so deserializing validates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExamDraft", into = "ExamDraft")]
pub struct ExamDefinition {
    id: ExamId,
    title: String,
    subject: String,
    duration_minutes: u32,
    questions: Vec<Question>,
}

impl ExamDefinition {
    /// Build a validated exam definition.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` if the title is blank, the duration is zero or too
    /// large to express in seconds, there are no questions, or question ids
    /// repeat.
    pub fn new(
        id: ExamId,
        title: impl Into<String>,
        subject: impl Into<String>,
        duration_minutes: u32,
        questions: Vec<Question>,
    ) -> Result<Self, ExamError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ExamError::EmptyTitle);
        }
        if duration_minutes == 0 {
            return Err(ExamError::InvalidDuration);
        }
        if duration_minutes.checked_mul(60).is_none() {
            return Err(ExamError::DurationOverflow {
                minutes: duration_minutes,
            });
        }
        if questions.is_empty() {
            return Err(ExamError::NoQuestions);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for q in &questions {
            if !seen.insert(q.id()) {
                return Err(ExamError::DuplicateQuestion(q.id()));
            }
        }

        Ok(Self {
            id,
            title,
            subject: subject.into(),
            duration_minutes,
            questions,
        })
    }

    #[must_use]
    pub fn id(&self) -> ExamId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    /// Total time allowed, in seconds.
    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        // Bounded at construction.
        self.duration_minutes.saturating_mul(60)
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn position_of(&self, id: QuestionId) -> Option<usize> {
        self.questions.iter().position(|q| q.id() == id)
    }

    #[must_use]
    pub fn contains_question(&self, id: QuestionId) -> bool {
        self.position_of(id).is_some()
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Unvalidated exam as read from a JSON exam file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamDraft {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub subject: String,
    pub duration_minutes: u32,
    pub questions: Vec<QuestionDraft>,
}

impl ExamDraft {
    /// Parse a draft from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the text is not a valid exam document.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Validate every question and the exam itself.
    ///
    /// # Errors
    ///
    /// Returns the first `QuestionError` or `ExamError` encountered.
    pub fn validate(self) -> Result<ExamDefinition, Error> {
        let questions = self
            .questions
            .into_iter()
            .map(QuestionDraft::validate)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ExamDefinition::new(
            ExamId::new(self.id),
            self.title,
            self.subject,
            self.duration_minutes,
            questions,
        )?)
    }
}

impl TryFrom<ExamDraft> for ExamDefinition {
    type Error = Error;

    fn try_from(draft: ExamDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<ExamDefinition> for ExamDraft {
    fn from(exam: ExamDefinition) -> Self {
        Self {
            id: exam.id.value(),
            title: exam.title,
            subject: exam.subject,
            duration_minutes: exam.duration_minutes,
            questions: exam.questions.into_iter().map(QuestionDraft::from).collect(),
        }
    }
}
