use exam_core::model::{ExamDefinition, ExamId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    choices_to_json, conn, exam_id_from_i64, id_i64, map_question_row, ser,
};
use crate::repository::{ExamCatalog, StorageError};

impl SqliteRepository {
    async fn load_exam(&self, exam_id: i64) -> Result<ExamDefinition, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, title, subject, duration_minutes
                FROM exams
                WHERE id = ?1
            ",
        )
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        let id = exam_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
        let title: String = row.try_get("title").map_err(ser)?;
        let subject: String = row.try_get("subject").map_err(ser)?;
        let duration_minutes = u32::try_from(row.try_get::<i64, _>("duration_minutes").map_err(ser)?)
            .map_err(ser)?;

        let question_rows = sqlx::query(
            r"
                SELECT id, kind, prompt, choices
                FROM questions
                WHERE exam_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let questions = question_rows
            .iter()
            .map(map_question_row)
            .collect::<Result<Vec<_>, _>>()?;

        ExamDefinition::new(id, title, subject, duration_minutes, questions).map_err(ser)
    }
}

#[async_trait::async_trait]
impl ExamCatalog for SqliteRepository {
    async fn fetch_exam_definition(&self, id: ExamId) -> Result<ExamDefinition, StorageError> {
        self.load_exam(id_i64("exam_id", id.value())?).await
    }

    async fn upsert_exam(&self, exam: &ExamDefinition) -> Result<(), StorageError> {
        let exam_id = id_i64("exam_id", exam.id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO exams (id, title, subject, duration_minutes)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    subject = excluded.subject,
                    duration_minutes = excluded.duration_minutes
            ",
        )
        .bind(exam_id)
        .bind(exam.title())
        .bind(exam.subject())
        .bind(i64::from(exam.duration_minutes()))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // Question order is positional, so replace the whole list.
        sqlx::query("DELETE FROM questions WHERE exam_id = ?1")
            .bind(exam_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, question) in exam.questions().iter().enumerate() {
            let position = i64::try_from(position).map_err(ser)?;
            sqlx::query(
                r"
                    INSERT INTO questions (exam_id, id, position, kind, prompt, choices)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(exam_id)
            .bind(id_i64("question_id", question.id().value())?)
            .bind(position)
            .bind(question.kind().as_str())
            .bind(question.prompt())
            .bind(choices_to_json(question)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn list_exams(&self) -> Result<Vec<ExamDefinition>, StorageError> {
        let ids: Vec<i64> = sqlx::query("SELECT id FROM exams ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?
            .iter()
            .map(|row| row.try_get::<i64, _>("id").map_err(ser))
            .collect::<Result<_, _>>()?;

        let mut exams = Vec::with_capacity(ids.len());
        for id in ids {
            exams.push(self.load_exam(id).await?);
        }
        Ok(exams)
    }
}
