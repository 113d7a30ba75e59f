use async_trait::async_trait;
use exam_core::Clock;
use exam_core::model::{
    AttemptId, ExamDefinition, ExamId, Role, Submission, SubmissionReceipt, User, UserError,
    UserId, normalize_email,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// A stored submission together with the receipt issued for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub receipt: SubmissionReceipt,
    pub submission: Submission,
}

/// Persisted account: the public identity plus its password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
}

/// Account to be inserted; the repository assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserRecord {
    email: String,
    name: String,
    role: Role,
    password_hash: String,
}

impl NewUserRecord {
    /// # Errors
    ///
    /// Returns `UserError` if the email is malformed or the name is blank.
    pub fn new(
        email: &str,
        name: impl Into<String>,
        role: Role,
        password_hash: String,
    ) -> Result<Self, UserError> {
        let email = normalize_email(email)?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(UserError::EmptyName);
        }
        Ok(Self {
            email,
            name,
            role,
            password_hash,
        })
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    /// Attach the assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored fields no longer
    /// form a valid user.
    pub fn into_record(self, id: UserId) -> Result<UserRecord, StorageError> {
        let user = User::new(id, self.email, self.name, self.role)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(UserRecord {
            user,
            password_hash: self.password_hash,
        })
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Source of exam definitions.
#[async_trait]
pub trait ExamCatalog: Send + Sync {
    /// Fetch an exam definition by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the exam is unknown, or other storage errors.
    async fn fetch_exam_definition(&self, id: ExamId) -> Result<ExamDefinition, StorageError>;

    /// Persist or replace an exam definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the exam cannot be stored.
    async fn upsert_exam(&self, exam: &ExamDefinition) -> Result<(), StorageError>;

    /// List all known exams ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the listing fails.
    async fn list_exams(&self) -> Result<Vec<ExamDefinition>, StorageError>;
}

/// Destination for finished attempts.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    /// Store a finished attempt's answers.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the attempt was already submitted,
    /// or other storage errors.
    async fn submit_answers(&self, submission: &Submission)
    -> Result<SubmissionReceipt, StorageError>;
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Fetch a stored submission by receipt id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_submission(&self, id: i64) -> Result<SubmissionRecord, StorageError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the email is taken.
    async fn insert_user(&self, user: NewUserRecord) -> Result<UserRecord, StorageError>;

    /// Look up an account by (normalized) email.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for storage failures; a missing account is `Ok(None)`.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct SubmissionTable {
    next_id: i64,
    rows: HashMap<i64, SubmissionRecord>,
    by_attempt: HashMap<AttemptId, i64>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    clock: Clock,
    exams: Arc<Mutex<HashMap<ExamId, ExamDefinition>>>,
    submissions: Arc<Mutex<SubmissionTable>>,
    users: Arc<Mutex<Vec<UserRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp receipts with the given clock instead of system time.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Number of stored submissions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn submission_count(&self) -> Result<usize, StorageError> {
        let guard = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.rows.len())
    }
}

#[async_trait]
impl ExamCatalog for InMemoryRepository {
    async fn fetch_exam_definition(&self, id: ExamId) -> Result<ExamDefinition, StorageError> {
        let guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn upsert_exam(&self, exam: &ExamDefinition) -> Result<(), StorageError> {
        let mut guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(exam.id(), exam.clone());
        Ok(())
    }

    async fn list_exams(&self) -> Result<Vec<ExamDefinition>, StorageError> {
        let guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut exams: Vec<_> = guard.values().cloned().collect();
        exams.sort_by_key(ExamDefinition::id);
        Ok(exams)
    }
}

#[async_trait]
impl SubmissionSink for InMemoryRepository {
    async fn submit_answers(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionReceipt, StorageError> {
        let mut guard = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.by_attempt.contains_key(&submission.attempt_id) {
            return Err(StorageError::Conflict);
        }

        guard.next_id += 1;
        let id = guard.next_id;
        let receipt = SubmissionReceipt {
            id,
            attempt_id: submission.attempt_id,
            received_at: self.clock.now(),
        };
        guard.by_attempt.insert(submission.attempt_id, id);
        guard.rows.insert(
            id,
            SubmissionRecord {
                receipt: receipt.clone(),
                submission: submission.clone(),
            },
        );
        Ok(receipt)
    }
}

#[async_trait]
impl SubmissionRepository for InMemoryRepository {
    async fn get_submission(&self, id: i64) -> Result<SubmissionRecord, StorageError> {
        let guard = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.rows.get(&id).cloned().ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn insert_user(&self, user: NewUserRecord) -> Result<UserRecord, StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.iter().any(|r| r.user.email() == user.email()) {
            return Err(StorageError::Conflict);
        }
        let next = u64::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("user id overflow".into()))?
            + 1;
        let record = user.into_record(UserId::new(next))?;
        guard.push(record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StorageError> {
        let email = email.trim().to_lowercase();
        let guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.iter().find(|r| r.user.email() == email).cloned())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub exams: Arc<dyn ExamCatalog>,
    pub sink: Arc<dyn SubmissionSink>,
    pub submissions: Arc<dyn SubmissionRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let exams: Arc<dyn ExamCatalog> = Arc::new(repo.clone());
        let sink: Arc<dyn SubmissionSink> = Arc::new(repo.clone());
        let submissions: Arc<dyn SubmissionRepository> = Arc::new(repo.clone());
        let users: Arc<dyn UserRepository> = Arc::new(repo);
        Self {
            exams,
            sink,
            submissions,
            users,
        }
    }
}
