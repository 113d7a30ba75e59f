use exam_core::model::{Answers, Submission, SubmissionReceipt};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conn, exam_id_from_i64, id_i64, parse_attempt_id, parse_reason, question_id_from_i64, ser,
    user_id_from_i64, write_err,
};
use crate::repository::{
    StorageError, SubmissionRecord, SubmissionRepository, SubmissionSink,
};

#[async_trait::async_trait]
impl SubmissionSink for SqliteRepository {
    async fn submit_answers(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionReceipt, StorageError> {
        let received_at = self.clock.now();
        let total = i64::try_from(submission.total_questions).map_err(ser)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
                INSERT INTO submissions (
                    attempt_id, exam_id, user_id, reason,
                    total_questions, submitted_at, received_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(submission.attempt_id.to_string())
        .bind(id_i64("exam_id", submission.exam_id.value())?)
        .bind(id_i64("user_id", submission.user_id.value())?)
        .bind(submission.reason.as_str())
        .bind(total)
        .bind(submission.submitted_at)
        .bind(received_at)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;
        let id = res.last_insert_rowid();

        for (question_id, value) in &submission.answers {
            sqlx::query(
                r"
                    INSERT INTO submission_answers (submission_id, question_id, value)
                    VALUES (?1, ?2, ?3)
                ",
            )
            .bind(id)
            .bind(id_i64("question_id", question_id.value())?)
            .bind(value.as_str())
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(conn)?;

        Ok(SubmissionReceipt {
            id,
            attempt_id: submission.attempt_id,
            received_at,
        })
    }
}

#[async_trait::async_trait]
impl SubmissionRepository for SqliteRepository {
    async fn get_submission(&self, id: i64) -> Result<SubmissionRecord, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    id, attempt_id, exam_id, user_id, reason,
                    total_questions, submitted_at, received_at
                FROM submissions
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        let attempt_id = parse_attempt_id(&row.try_get::<String, _>("attempt_id").map_err(ser)?)?;
        let exam_id = exam_id_from_i64(row.try_get::<i64, _>("exam_id").map_err(ser)?)?;
        let user_id = user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?;
        let reason = parse_reason(&row.try_get::<String, _>("reason").map_err(ser)?)?;
        let total_questions =
            usize::try_from(row.try_get::<i64, _>("total_questions").map_err(ser)?)
                .map_err(ser)?;
        let submitted_at = row.try_get("submitted_at").map_err(ser)?;
        let received_at = row.try_get("received_at").map_err(ser)?;

        let answer_rows = sqlx::query(
            r"
                SELECT question_id, value
                FROM submission_answers
                WHERE submission_id = ?1
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut answers = Answers::new();
        for row in &answer_rows {
            let question_id =
                question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
            let value: String = row.try_get("value").map_err(ser)?;
            answers.insert(question_id, value);
        }

        Ok(SubmissionRecord {
            receipt: SubmissionReceipt {
                id,
                attempt_id,
                received_at,
            },
            submission: Submission {
                attempt_id,
                exam_id,
                user_id,
                answers,
                reason,
                submitted_at,
                total_questions,
            },
        })
    }
}
