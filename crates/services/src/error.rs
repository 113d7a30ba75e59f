//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{ExamId, QuestionId, Role, UserError};
use storage::repository::StorageError;

/// Errors emitted by exam sessions and their orchestration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("question index {index} is out of range (exam has {len} questions)")]
    OutOfRange { index: usize, len: usize },
    #[error("exam session already submitted")]
    InvalidState,
    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),
    #[error("exam {0} not found")]
    NotFound(ExamId),
    #[error("role {role} cannot take exams")]
    Forbidden { role: Role },
    #[error("submission failed: {0}")]
    Sink(#[source] StorageError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by identity providers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("signed-in role {role} is not allowed here")]
    Forbidden { role: Role },
    #[error("password cannot be empty")]
    EmptyPassword,
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
