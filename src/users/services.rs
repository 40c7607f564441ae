use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::dto::{PublicUser, SignUp};
use super::repo::UserRepository;
use crate::auth::password::{hash_password, verify_password};
use crate::db::schema::{NewUser, User};
use crate::db::Store;
use crate::error::{AppError, AppResult};
use crate::validation::normalize_email;

#[derive(Clone)]
pub struct UserService {
    users: UserRepository,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { users: UserRepository::new(store) }
    }

    pub fn repository(&self) -> &UserRepository {
        &self.users
    }

    /// Register a credential user. Credential sign-ups count as verified.
    ///
    /// The lookup is a fast path for a friendly error; the unique email index is what
    /// actually keeps two concurrent sign-ups apart.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn sign_up(&self, input: SignUp) -> AppResult<PublicUser> {
        let email = normalize_email(&input.email);
        if self.users.find_by_email(&email).await?.is_some() {
            warn!(%email, "email already registered");
            return Err(AppError::AlreadyExists("User"));
        }

        let hash = hash_password(input.password).await?;
        let new_user = NewUser {
            name: input.name,
            email,
            email_verified: Some(OffsetDateTime::now_utc()),
            password: Some(hash),
            ..Default::default()
        };
        let user = match self.users.base().create(&new_user).await {
            Ok(u) => u,
            Err(AppError::ConstraintViolation(msg)) => {
                warn!(%msg, "sign-up lost a race on the unique email index");
                return Err(AppError::AlreadyExists("User"));
            }
            Err(e) => return Err(e),
        };

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user.into())
    }

    /// Check credentials. Every rejection is the same `AuthenticationFailed`.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<PublicUser> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            warn!(%email, "sign-in unknown email");
            return Err(AppError::AuthenticationFailed);
        };
        let Some(hash) = user.password.clone() else {
            warn!(user_id = %user.id, "sign-in on provider-only account");
            return Err(AppError::AuthenticationFailed);
        };

        match verify_password(password.to_string(), hash).await {
            Ok(true) => {
                info!(user_id = %user.id, "user signed in");
                Ok(user.into())
            }
            Ok(false) => {
                warn!(user_id = %user.id, "sign-in invalid password");
                Err(AppError::AuthenticationFailed)
            }
            Err(e) => {
                error!(error = %e, user_id = %user.id, "stored password hash unreadable");
                Err(AppError::AuthenticationFailed)
            }
        }
    }

    /// `None` for empty input rather than an error.
    pub async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Ok(None);
        }
        self.users.find_by_email(&email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::ALL_TABLES;
    use crate::db::MemoryStore;
    use crate::error::AUTH_FAILED_MESSAGE;

    fn service() -> UserService {
        UserService::new(Arc::new(MemoryStore::new(ALL_TABLES)))
    }

    fn signup(email: &str, password: &str, name: &str) -> SignUp {
        SignUp { email: email.into(), password: password.into(), name: name.into() }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_keeps_the_id() {
        let svc = service();
        let created = svc.sign_up(signup("a@b.com", "pw123", "A")).await.unwrap();
        assert_eq!(created.email, "a@b.com");
        assert_eq!(created.name, "A");

        let signed_in = svc.sign_in("a@b.com", "pw123").await.unwrap();
        assert_eq!(signed_in.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_sign_up_leaves_existing_row_alone() {
        let svc = service();
        let first = svc.sign_up(signup("a@b.com", "pw123", "A")).await.unwrap();
        let before = svc.get_by_email("a@b.com").await.unwrap().unwrap();

        let err = svc.sign_up(signup("a@b.com", "other", "B")).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists("User")));

        let after = svc.get_by_email("a@b.com").await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(after.id, first.id);
        assert!(svc.sign_in("a@b.com", "pw123").await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let svc = service();
        svc.sign_up(signup("a@b.com", "pw123", "A")).await.unwrap();

        let wrong = svc.sign_in("a@b.com", "wrong").await.unwrap_err();
        let unknown = svc.sign_in("nobody@b.com", "pw123").await.unwrap_err();
        assert!(matches!(wrong, AppError::AuthenticationFailed));
        assert!(matches!(unknown, AppError::AuthenticationFailed));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.to_string(), AUTH_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn provider_only_accounts_cannot_use_passwords() {
        let svc = service();
        svc.repository()
            .base()
            .create(&NewUser {
                name: "Oauth".into(),
                email: "oauth@b.com".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let err = svc.sign_in("oauth@b.com", "").await.unwrap_err();
        assert!(matches!(err, AppError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn password_is_stored_hashed_and_email_normalized() {
        let svc = service();
        svc.sign_up(signup("  Mixed@Case.com ", "pw123", "M")).await.unwrap();
        let stored = svc.get_by_email("mixed@case.com").await.unwrap().unwrap();
        let hash = stored.password.unwrap();
        assert_ne!(hash, "pw123");
        assert!(hash.starts_with("$argon2"));
        assert!(stored.email_verified.is_some());
    }

    #[tokio::test]
    async fn get_by_email_empty_is_none() {
        assert!(service().get_by_email("").await.unwrap().is_none());
    }
}
