use thiserror::Error;

use crate::model::{ExamError, QuestionError, UserError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Exam(#[from] ExamError),
    #[error(transparent)]
    User(#[from] UserError),
}
