use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {id} has an empty prompt")]
    EmptyPrompt { id: QuestionId },

    #[error("single-choice question {id} has no choices")]
    NoChoices { id: QuestionId },

    #[error("single-choice question {id} has a blank choice at position {position}")]
    BlankChoice { id: QuestionId, position: usize },

    #[error("unknown question kind: {0}")]
    UnknownKind(String),
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// What kind of answer a question expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    /// Pick one of an ordered list of choices.
    SingleChoice { choices: Vec<String> },
    /// Free-form text answer.
    FreeText,
}

impl QuestionKind {
    /// Stable string form used by storage and exam files.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::SingleChoice { .. } => "single_choice",
            QuestionKind::FreeText => "free_text",
        }
    }
}

/// A single exam question. Deserializing goes through `QuestionDraft`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionDraft", into = "QuestionDraft")]
pub struct Question {
    id: QuestionId,
    prompt: String,
    kind: QuestionKind,
}

impl Question {
    /// Create a single-choice question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is blank, there are no choices,
    /// or any choice is blank.
    pub fn single_choice(
        id: QuestionId,
        prompt: impl Into<String>,
        choices: Vec<String>,
    ) -> Result<Self, QuestionError> {
        if choices.is_empty() {
            return Err(QuestionError::NoChoices { id });
        }
        if let Some(position) = choices.iter().position(|c| c.trim().is_empty()) {
            return Err(QuestionError::BlankChoice { id, position });
        }
        Self::build(id, prompt.into(), QuestionKind::SingleChoice { choices })
    }

    /// Create a free-text question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyPrompt` if the prompt is blank.
    pub fn free_text(id: QuestionId, prompt: impl Into<String>) -> Result<Self, QuestionError> {
        Self::build(id, prompt.into(), QuestionKind::FreeText)
    }

    fn build(id: QuestionId, prompt: String, kind: QuestionKind) -> Result<Self, QuestionError> {
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt { id });
        }
        Ok(Self { id, prompt, kind })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn kind(&self) -> &QuestionKind {
        &self.kind
    }

    /// Choices for single-choice questions, `None` for free text.
    #[must_use]
    pub fn choices(&self) -> Option<&[String]> {
        match &self.kind {
            QuestionKind::SingleChoice { choices } => Some(choices),
            QuestionKind::FreeText => None,
        }
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Unvalidated question as it appears in an exam file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub id: u64,
    pub kind: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

impl QuestionDraft {
    /// Validate the draft into a `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` for an unknown kind or invalid content.
    pub fn validate(self) -> Result<Question, QuestionError> {
        let id = QuestionId::new(self.id);
        match self.kind.as_str() {
            "single_choice" => {
                Question::single_choice(id, self.prompt, self.choices.unwrap_or_default())
            }
            "free_text" => Question::free_text(id, self.prompt),
            other => Err(QuestionError::UnknownKind(other.to_owned())),
        }
    }
}

impl TryFrom<QuestionDraft> for Question {
    type Error = QuestionError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<Question> for QuestionDraft {
    fn from(question: Question) -> Self {
        let kind = question.kind.as_str().to_owned();
        let choices = match question.kind {
            QuestionKind::SingleChoice { choices } => Some(choices),
            QuestionKind::FreeText => None,
        };
        Self {
            id: question.id.value(),
            kind,
            prompt: question.prompt,
            choices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_choice_exposes_choices_in_order() {
        let q = Question::single_choice(
            QuestionId::new(1),
            "2x + 5 = 13, x = ?",
            vec!["x = 3".into(), "x = 4".into()],
        )
        .unwrap();
        assert_eq!(q.choices().unwrap(), ["x = 3", "x = 4"]);
        assert_eq!(q.kind().as_str(), "single_choice");
    }

    #[test]
    fn free_text_has_no_choices() {
        let q = Question::free_text(QuestionId::new(3), "Explain the quadratic formula").unwrap();
        assert!(q.choices().is_none());
    }

    #[test]
    fn rejects_blank_prompt() {
        let err = Question::free_text(QuestionId::new(1), "   ").unwrap_err();
        assert_eq!(err, QuestionError::EmptyPrompt { id: QuestionId::new(1) });
    }

    #[test]
    fn rejects_missing_and_blank_choices() {
        let err = Question::single_choice(QuestionId::new(2), "Q", Vec::new()).unwrap_err();
        assert!(matches!(err, QuestionError::NoChoices { .. }));

        let err =
            Question::single_choice(QuestionId::new(2), "Q", vec!["a".into(), " ".into()])
                .unwrap_err();
        assert_eq!(
            err,
            QuestionError::BlankChoice {
                id: QuestionId::new(2),
                position: 1
            }
        );
    }

    #[test]
    fn deserializing_a_question_validates_it() {
        let blank = r#"{"id":1,"kind":"free_text","prompt":"  "}"#;
        assert!(serde_json::from_str::<Question>(blank).is_err());

        let no_choices = r#"{"id":2,"kind":"single_choice","prompt":"Pick one","choices":[]}"#;
        assert!(serde_json::from_str::<Question>(no_choices).is_err());

        let q = Question::single_choice(QuestionId::new(3), "Pick", vec!["a".into(), "b".into()])
            .unwrap();
        let json = serde_json::to_string(&q).unwrap();
        assert!(json.contains(r#""kind":"single_choice""#));
        assert_eq!(serde_json::from_str::<Question>(&json).unwrap(), q);
    }

    #[test]
    fn draft_with_unknown_kind_fails() {
        let draft = QuestionDraft {
            id: 1,
            kind: "matching".into(),
            prompt: "Q".into(),
            choices: None,
        };
        assert_eq!(
            draft.validate().unwrap_err(),
            QuestionError::UnknownKind("matching".into())
        );
    }
}
