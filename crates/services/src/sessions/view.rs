use serde::Serialize;

use exam_core::format_duration;
use exam_core::model::{QuestionKind, SubmissionSummary};

use super::service::ExamSession;

/// State of one slot in the question navigator strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NavigatorSlot {
    Current,
    Answered,
    Unanswered,
}

/// What the forward button does on the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrimaryAction {
    Next,
    SubmitExam,
}

/// The question currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    /// One-based question number.
    pub number: usize,
    pub prompt: String,
    /// `None` for free-text questions.
    pub choices: Option<Vec<String>>,
    pub answer: Option<String>,
}

/// Render-ready snapshot of an exam session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub title: String,
    pub subject: String,
    pub time_left: String,
    pub position_label: String,
    pub answered_count: usize,
    pub total_questions: usize,
    pub progress_percent: f64,
    pub question: QuestionView,
    pub navigator: Vec<NavigatorSlot>,
    pub can_go_back: bool,
    pub primary_action: PrimaryAction,
    pub outcome: Option<SubmissionSummary>,
}

impl SessionView {
    #[must_use]
    pub fn from_session(session: &ExamSession) -> Self {
        let definition = session.definition();
        let current = session.current_question();
        let index = session.current_index();

        let choices = match current.kind() {
            QuestionKind::SingleChoice { choices } => Some(choices.clone()),
            QuestionKind::FreeText => None,
        };

        let navigator = (0..session.total_questions())
            .map(|i| {
                if i == index {
                    NavigatorSlot::Current
                } else if session.is_answered(i) {
                    NavigatorSlot::Answered
                } else {
                    NavigatorSlot::Unanswered
                }
            })
            .collect();

        Self {
            title: definition.title().to_owned(),
            subject: definition.subject().to_owned(),
            time_left: format_duration(session.remaining_seconds()),
            position_label: format!("Question {} of {}", index + 1, session.total_questions()),
            answered_count: session.answered_count(),
            total_questions: session.total_questions(),
            progress_percent: session.progress_percent(),
            question: QuestionView {
                number: index + 1,
                prompt: current.prompt().to_owned(),
                choices,
                answer: session.answer(current.id()).map(str::to_owned),
            },
            navigator,
            can_go_back: !session.is_first(),
            primary_action: if session.is_last() {
                PrimaryAction::SubmitExam
            } else {
                PrimaryAction::Next
            },
            outcome: session.summary(),
        }
    }

    /// Closing line shown after submission.
    #[must_use]
    pub fn completion_message(&self) -> Option<String> {
        self.outcome.map(|summary| {
            format!(
                "You answered {} out of {} questions.",
                summary.answered_count, summary.total_count
            )
        })
    }
}
