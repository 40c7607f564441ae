use std::sync::Arc;

use time::Duration;
use tracing::{info, instrument, warn};

use super::dto::{CredentialAction, CredentialsInput, ProviderProfile, SignInResponse};
use super::extractors::AuthUser;
use super::session::SessionStore;
use crate::config::AuthConfig;
use crate::db::schema::{Account, NewUser, User};
use crate::db::Store;
use crate::error::{AppError, AppResult};
use crate::users::dto::{PublicUser, SignUp};
use crate::users::services::UserService;
use crate::validation::{normalize_email, Validate};

/// Turns credentials or provider identities into session tokens, and tokens back into users.
#[derive(Clone)]
pub struct AuthService {
    users: UserService,
    sessions: SessionStore,
    session_max_age: Duration,
    allow_email_account_linking: bool,
}

impl AuthService {
    pub fn new(users: UserService, store: Arc<dyn Store>, cfg: &AuthConfig) -> Self {
        Self {
            users,
            sessions: SessionStore::new(store),
            session_max_age: Duration::days(cfg.session_max_age_days),
            allow_email_account_linking: cfg.allow_email_account_linking,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Credential sign-up or sign-in, ending in a fresh session token.
    #[instrument(skip(self, input), fields(action = %input.action))]
    pub async fn authorize(&self, input: CredentialsInput) -> AppResult<SignInResponse> {
        let action = input.action()?;
        let user = match action {
            CredentialAction::SignUp => {
                self.users
                    .sign_up(SignUp {
                        email: input.email,
                        password: input.password,
                        name: input.name.unwrap_or_default(),
                    })
                    .await?
            }
            CredentialAction::SignIn => self.users.sign_in(&input.email, &input.password).await?,
        };
        self.issue_session(user).await
    }

    /// Persist a session row for `user`. A failed insert fails the whole sign-in.
    async fn issue_session(&self, user: PublicUser) -> AppResult<SignInResponse> {
        let session = self
            .sessions
            .create_session(&user.id, self.session_max_age)
            .await?;
        Ok(SignInResponse {
            session_token: session.session_token,
            expires: session.expires,
            user,
        })
    }

    /// Sign in with an identity a provider has already verified.
    #[instrument(skip(self, profile), fields(provider = %profile.provider))]
    pub async fn provider_sign_in(&self, profile: ProviderProfile) -> AppResult<SignInResponse> {
        let user = match self
            .sessions
            .get_user_by_account(&profile.provider, &profile.provider_account_id)
            .await?
        {
            Some(user) => user,
            None => {
                let user = self.user_for_new_account(&profile).await?;
                self.sessions.link_account(&account_for(&user, &profile)).await?;
                user
            }
        };

        info!(user_id = %user.id, "provider sign-in");
        self.issue_session(user.into()).await
    }

    async fn user_for_new_account(&self, profile: &ProviderProfile) -> AppResult<User> {
        if let Some(existing) = self.users.get_by_email(&profile.email).await? {
            if !self.allow_email_account_linking {
                warn!(user_id = %existing.id, "email belongs to an unlinked user");
                return Err(AppError::unauthorized("OAuthAccountNotLinked"));
            }
            return Ok(existing);
        }

        let new_user = NewUser {
            name: profile.name.clone(),
            email: normalize_email(&profile.email),
            image: profile.image.clone(),
            ..Default::default()
        };
        new_user.validate()?;
        let user = self.users.repository().base().create(&new_user).await?;
        info!(user_id = %user.id, "user provisioned from provider");
        Ok(user)
    }

    /// Resolve a bearer token to its user through the session table.
    pub async fn resolve(&self, token: &str) -> AppResult<AuthUser> {
        let (session, user) = self
            .sessions
            .get_session_and_user(token)
            .await?
            .ok_or_else(|| AppError::unauthorized("invalid or expired token"))?;
        Ok(AuthUser {
            user: user.into(),
            expires: session.expires,
            token: token.to_string(),
        })
    }

    /// Idempotent.
    #[instrument(skip_all)]
    pub async fn sign_out(&self, token: &str) -> AppResult<()> {
        self.sessions.delete_session(token).await?;
        info!("signed out");
        Ok(())
    }
}

fn account_for(user: &User, profile: &ProviderProfile) -> Account {
    Account {
        user_id: user.id.clone(),
        account_type: profile.account_type.clone(),
        provider: profile.provider.clone(),
        provider_account_id: profile.provider_account_id.clone(),
        refresh_token: profile.refresh_token.clone(),
        access_token: profile.access_token.clone(),
        expires_at: profile.expires_at,
        token_type: profile.token_type.clone(),
        scope: profile.scope.clone(),
        id_token: profile.id_token.clone(),
        session_state: None,
    }
}
