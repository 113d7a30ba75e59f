mod exam;
mod ids;
mod question;
mod submission;
mod user;

pub use ids::{AttemptId, ExamId, ParseIdError, QuestionId, UserId};

pub use exam::{ExamDefinition, ExamDraft, ExamError};
pub use question::{Question, QuestionDraft, QuestionError, QuestionKind};
pub use submission::{
    Answers, SessionStatus, SubmitReason, Submission, SubmissionReceipt, SubmissionSummary,
};
pub use user::{Role, User, UserError, normalize_email};
