use exam_core::model::User;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, parse_role, ser, user_id_from_i64, write_err};
use crate::repository::{NewUserRecord, StorageError, UserRecord, UserRepository};

fn map_user_row(row: &sqlx::sqlite::SqliteRow) -> Result<UserRecord, StorageError> {
    let id = user_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let email: String = row.try_get("email").map_err(ser)?;
    let name: String = row.try_get("name").map_err(ser)?;
    let role = parse_role(&row.try_get::<String, _>("role").map_err(ser)?)?;
    let password_hash: String = row.try_get("password_hash").map_err(ser)?;

    Ok(UserRecord {
        user: User::new(id, email, name, role).map_err(ser)?,
        password_hash,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn insert_user(&self, user: NewUserRecord) -> Result<UserRecord, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO users (email, name, role, password_hash)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(user.email())
        .bind(user.name())
        .bind(user.role().as_str())
        .bind(user.password_hash())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let id = user_id_from_i64(res.last_insert_rowid())?;
        user.into_record(id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StorageError> {
        let email = email.trim().to_lowercase();
        let row = sqlx::query(
            r"
                SELECT id, email, name, role, password_hash
                FROM users
                WHERE email = ?1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_user_row).transpose()
    }
}
