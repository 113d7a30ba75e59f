use exam_core::model::{
    AttemptId, ExamId, Question, QuestionId, Role, SubmitReason, UserId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Map write errors, surfacing unique-constraint hits as `Conflict`.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => conn(e),
    }
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn exam_id_from_i64(v: i64) -> Result<ExamId, StorageError> {
    Ok(ExamId::new(i64_to_u64("exam_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn parse_attempt_id(s: &str) -> Result<AttemptId, StorageError> {
    s.parse().map_err(ser)
}

pub(crate) fn parse_reason(s: &str) -> Result<SubmitReason, StorageError> {
    s.parse()
        .map_err(|e: String| StorageError::Serialization(e))
}

pub(crate) fn parse_role(s: &str) -> Result<Role, StorageError> {
    s.parse().map_err(ser)
}

pub(crate) fn choices_to_json(question: &Question) -> Result<Option<String>, StorageError> {
    question
        .choices()
        .map(|choices| serde_json::to_string(choices).map_err(ser))
        .transpose()
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let id = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let kind: String = row.try_get("kind").map_err(ser)?;
    let prompt: String = row.try_get("prompt").map_err(ser)?;
    let choices: Option<String> = row.try_get("choices").map_err(ser)?;

    match kind.as_str() {
        "single_choice" => {
            let raw = choices.ok_or_else(|| {
                StorageError::Serialization(format!("question {id} is missing choices"))
            })?;
            let choices: Vec<String> = serde_json::from_str(&raw).map_err(ser)?;
            Question::single_choice(id, prompt, choices).map_err(ser)
        }
        "free_text" => Question::free_text(id, prompt).map_err(ser),
        other => Err(StorageError::Serialization(format!(
            "invalid question kind: {other}"
        ))),
    }
}
