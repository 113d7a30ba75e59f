//! Sign-in for the exam runner.
//!
//! Identity is an injected capability: callers hold an `IdentityProvider`
//! and ask it who is signed in, instead of reading ambient global state.

mod hash;

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use exam_core::model::{Role, User};
use storage::repository::{NewUserRecord, StorageError, UserRepository};
use tracing::{info, warn};

use crate::error::IdentityError;

pub use hash::{hash_password, verify_password};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify credentials and make the user current.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidCredentials` for an unknown email or
    /// wrong password.
    async fn login(&self, email: &str, password: &str) -> Result<User, IdentityError>;

    /// Sign out and return who was signed in.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotSignedIn` if nobody was signed in.
    fn logout(&self) -> Result<User, IdentityError>;

    fn current_user(&self) -> Option<User>;

    /// The current user, provided they hold `role`.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotSignedIn` or `IdentityError::Forbidden`.
    fn require_role(&self, role: Role) -> Result<User, IdentityError> {
        let user = self.current_user().ok_or(IdentityError::NotSignedIn)?;
        if user.role() == role {
            Ok(user)
        } else {
            Err(IdentityError::Forbidden { role: user.role() })
        }
    }
}

/// Identity provider backed by a `UserRepository` holding Argon2 hashes.
pub struct LocalIdentityProvider {
    users: Arc<dyn UserRepository>,
    current: RwLock<Option<User>>,
}

impl LocalIdentityProvider {
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self {
            users,
            current: RwLock::new(None),
        }
    }

    /// Create an account. Does not sign it in.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::EmptyPassword`, `IdentityError::User` for bad
    /// email/name, or `IdentityError::EmailTaken`.
    pub async fn register(
        &self,
        email: &str,
        name: &str,
        role: Role,
        password: &str,
    ) -> Result<User, IdentityError> {
        if password.is_empty() {
            return Err(IdentityError::EmptyPassword);
        }
        let record = NewUserRecord::new(email, name, role, hash_password(password)?)?;
        let stored = match self.users.insert_user(record).await {
            Ok(stored) => stored,
            Err(StorageError::Conflict) => return Err(IdentityError::EmailTaken),
            Err(e) => return Err(e.into()),
        };
        info!(user_id = %stored.user.id(), role = %role, "account registered");
        Ok(stored.user)
    }

    fn set_current(&self, user: Option<User>) -> Option<User> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, user)
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn login(&self, email: &str, password: &str) -> Result<User, IdentityError> {
        let Some(record) = self.users.find_by_email(email).await? else {
            warn!("login rejected: unknown account");
            return Err(IdentityError::InvalidCredentials);
        };
        if !verify_password(password, &record.password_hash)? {
            warn!(user_id = %record.user.id(), "login rejected: wrong password");
            return Err(IdentityError::InvalidCredentials);
        }

        info!(user_id = %record.user.id(), role = %record.user.role(), "signed in");
        self.set_current(Some(record.user.clone()));
        Ok(record.user)
    }

    fn logout(&self) -> Result<User, IdentityError> {
        let user = self.set_current(None).ok_or(IdentityError::NotSignedIn)?;
        info!(user_id = %user.id(), "signed out");
        Ok(user)
    }

    fn current_user(&self) -> Option<User> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;

    fn provider() -> LocalIdentityProvider {
        LocalIdentityProvider::new(Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn login_and_logout_round_trip() {
        let identity = provider();
        identity
            .register("student@school.org", "Jane Student", Role::Student, "s3cret!")
            .await
            .unwrap();

        assert!(identity.current_user().is_none());
        let user = identity.login("Student@School.org", "s3cret!").await.unwrap();
        assert_eq!(user.role(), Role::Student);
        assert_eq!(identity.current_user(), Some(user.clone()));
        assert_eq!(identity.require_role(Role::Student).unwrap(), user);

        assert_eq!(identity.logout().unwrap(), user);
        assert!(identity.current_user().is_none());
        assert!(matches!(identity.logout(), Err(IdentityError::NotSignedIn)));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_rejected() {
        let identity = provider();
        identity
            .register("teacher@school.org", "John Teacher", Role::Teacher, "pw")
            .await
            .unwrap();

        assert!(matches!(
            identity.login("teacher@school.org", "nope").await,
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            identity.login("ghost@school.org", "pw").await,
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(identity.current_user().is_none());
    }

    #[tokio::test]
    async fn require_role_checks_signed_in_role() {
        let identity = provider();
        assert!(matches!(
            identity.require_role(Role::Student),
            Err(IdentityError::NotSignedIn)
        ));

        identity
            .register("admin@school.org", "Admin", Role::SuperAdmin, "pw")
            .await
            .unwrap();
        identity.login("admin@school.org", "pw").await.unwrap();
        assert!(matches!(
            identity.require_role(Role::Student),
            Err(IdentityError::Forbidden {
                role: Role::SuperAdmin
            })
        ));
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_empty_passwords() {
        let identity = provider();
        assert!(matches!(
            identity
                .register("a@school.org", "A", Role::Student, "")
                .await,
            Err(IdentityError::EmptyPassword)
        ));

        identity
            .register("a@school.org", "A", Role::Student, "pw")
            .await
            .unwrap();
        assert!(matches!(
            identity
                .register("A@school.org", "A again", Role::Student, "pw")
                .await,
            Err(IdentityError::EmailTaken)
        ));
    }
}
