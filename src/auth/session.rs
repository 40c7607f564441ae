//! Persistence for sessions, provider accounts and verification tokens.

use std::sync::Arc;

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument};

use crate::db::schema::{Account, Session, User, VerificationToken};
use crate::db::Store;
use crate::error::AppResult;
use crate::repository::Repository;

pub const SESSION_TOKEN_LEN: usize = 48;

/// Opaque token from the OS CSPRNG (about 285 bits).
pub fn generate_session_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Repository<Session>,
    accounts: Repository<Account>,
    tokens: Repository<VerificationToken>,
    users: Repository<User>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            sessions: Repository::new(store.clone()),
            accounts: Repository::new(store.clone()),
            tokens: Repository::new(store.clone()),
            users: Repository::new(store),
        }
    }

    #[instrument(skip(self))]
    pub async fn create_session(&self, user_id: &str, max_age: Duration) -> AppResult<Session> {
        let session = Session {
            session_token: generate_session_token(),
            user_id: user_id.to_string(),
            expires: OffsetDateTime::now_utc() + max_age,
        };
        let created = self.sessions.create(&session).await?;
        debug!(%user_id, expires = %created.expires, "session created");
        Ok(created)
    }

    /// Live session and its user. Expired sessions are deleted here and reported as absent.
    #[instrument(skip_all)]
    pub async fn get_session_and_user(&self, token: &str) -> AppResult<Option<(Session, User)>> {
        let key = token.to_string();
        let Some(session) = self.sessions.find_optional(&key).await? else {
            return Ok(None);
        };
        if session.is_expired(OffsetDateTime::now_utc()) {
            info!(user_id = %session.user_id, "session expired");
            self.sessions.delete(&key).await?;
            return Ok(None);
        }
        let Some(user) = self.users.find_optional(&session.user_id).await? else {
            return Ok(None);
        };
        Ok(Some((session, user)))
    }

    pub async fn delete_session(&self, token: &str) -> AppResult<()> {
        self.sessions.delete(&token.to_string()).await
    }

    pub async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> AppResult<Option<User>> {
        let key = (provider.to_string(), provider_account_id.to_string());
        let Some(account) = self.accounts.find_optional(&key).await? else {
            return Ok(None);
        };
        self.users.find_optional(&account.user_id).await
    }

    #[instrument(skip(self, account), fields(provider = %account.provider, user_id = %account.user_id))]
    pub async fn link_account(&self, account: &Account) -> AppResult<Account> {
        let linked = self.accounts.create(account).await?;
        info!("account linked");
        Ok(linked)
    }

    pub async fn unlink_account(&self, provider: &str, provider_account_id: &str) -> AppResult<()> {
        self.accounts
            .delete(&(provider.to_string(), provider_account_id.to_string()))
            .await
    }

    pub async fn create_verification_token(
        &self,
        identifier: &str,
        ttl: Duration,
    ) -> AppResult<VerificationToken> {
        let vt = VerificationToken {
            identifier: identifier.to_string(),
            token: generate_session_token(),
            expires: OffsetDateTime::now_utc() + ttl,
        };
        self.tokens.create(&vt).await
    }

    /// Single use: the token is removed on read. Expired tokens read as `None`.
    pub async fn use_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> AppResult<Option<VerificationToken>> {
        let key = (identifier.to_string(), token.to_string());
        let Some(vt) = self.tokens.find_optional(&key).await? else {
            return Ok(None);
        };
        self.tokens.delete(&key).await?;
        if OffsetDateTime::now_utc() > vt.expires {
            return Ok(None);
        }
        Ok(Some(vt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{NewUser, SessionPatch, ALL_TABLES};
    use crate::db::MemoryStore;
    use crate::error::AppError;

    async fn setup() -> (SessionStore, Repository<Session>, User) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new(ALL_TABLES));
        let user = Repository::<User>::new(store.clone())
            .create(&NewUser { name: "A".into(), email: "a@b.com".into(), ..Default::default() })
            .await
            .unwrap();
        (SessionStore::new(store.clone()), Repository::new(store), user)
    }

    fn account(user_id: &str) -> Account {
        Account {
            user_id: user_id.into(),
            account_type: "oauth".into(),
            provider: "discord".into(),
            provider_account_id: "1234".into(),
            refresh_token: None,
            access_token: Some("at".into()),
            expires_at: None,
            token_type: Some("bearer".into()),
            scope: Some("identify email".into()),
            id_token: None,
            session_state: None,
        }
    }

    #[test]
    fn tokens_are_random_and_alphanumeric() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), SESSION_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let (sessions, _, user) = setup().await;
        let s = sessions.create_session(&user.id, Duration::days(30)).await.unwrap();
        let remaining = s.expires - OffsetDateTime::now_utc();
        assert!(remaining > Duration::days(29) && remaining <= Duration::days(30));

        let (found, owner) = sessions.get_session_and_user(&s.session_token).await.unwrap().unwrap();
        assert_eq!(found.session_token, s.session_token);
        assert_eq!(owner.id, user.id);

        sessions.delete_session(&s.session_token).await.unwrap();
        assert!(sessions.get_session_and_user(&s.session_token).await.unwrap().is_none());
        sessions.delete_session(&s.session_token).await.unwrap();
    }

    #[tokio::test]
    async fn expired_sessions_are_swept_on_lookup() {
        let (sessions, raw, user) = setup().await;
        let s = sessions.create_session(&user.id, Duration::days(1)).await.unwrap();
        let past = SessionPatch { expires: Some(OffsetDateTime::now_utc() - Duration::minutes(1)) };
        raw.update(&s.session_token, &past).await.unwrap();

        assert!(sessions.get_session_and_user(&s.session_token).await.unwrap().is_none());
        assert!(matches!(
            raw.find_one(&s.session_token).await,
            Err(AppError::NotFound("Session"))
        ));
    }

    #[tokio::test]
    async fn session_for_unknown_user_is_refused() {
        let (sessions, _, _) = setup().await;
        let err = sessions.create_session("ghost", Duration::days(1)).await.unwrap_err();
        assert!(matches!(err, AppError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn accounts_link_and_unlink() {
        let (sessions, _, user) = setup().await;
        assert!(sessions.get_user_by_account("discord", "1234").await.unwrap().is_none());

        sessions.link_account(&account(&user.id)).await.unwrap();
        let found = sessions.get_user_by_account("discord", "1234").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        let dup = sessions.link_account(&account(&user.id)).await.unwrap_err();
        assert!(matches!(dup, AppError::ConstraintViolation(_)));

        sessions.unlink_account("discord", "1234").await.unwrap();
        assert!(sessions.get_user_by_account("discord", "1234").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verification_tokens_are_single_use() {
        let (sessions, _, _) = setup().await;
        let vt = sessions
            .create_verification_token("a@b.com", Duration::hours(24))
            .await
            .unwrap();
        let used = sessions.use_verification_token("a@b.com", &vt.token).await.unwrap();
        assert_eq!(used.unwrap().token, vt.token);
        assert!(sessions.use_verification_token("a@b.com", &vt.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_verification_tokens_read_as_none() {
        let (sessions, _, _) = setup().await;
        let vt = sessions
            .create_verification_token("a@b.com", Duration::minutes(-1))
            .await
            .unwrap();
        assert!(sessions.use_verification_token("a@b.com", &vt.token).await.unwrap().is_none());
    }
}
