use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use exam_core::model::AttemptId;
use tokio::sync::Mutex;

use super::service::ExamSession;

/// A session guarded for use from several tasks at once.
pub type SharedSession = Arc<Mutex<ExamSession>>;

/// Live sessions keyed by attempt.
///
/// Each session has its own lock, so concurrent ticks, answers and submits
/// on one attempt serialize without blocking other attempts.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<AttemptId, SharedSession>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and return its shared handle. Replaces any entry
    /// with the same attempt id.
    pub fn insert(&self, session: ExamSession) -> SharedSession {
        let id = session.attempt_id();
        let shared = Arc::new(Mutex::new(session));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&shared));
        shared
    }

    #[must_use]
    pub fn get(&self, id: AttemptId) -> Option<SharedSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn remove(&self, id: AttemptId) -> Option<SharedSession> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
