use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{AppError, AppResult};
use crate::users::dto::PublicUser;
use crate::validation::{max_len, require_email, require_non_empty, Validate};

/// Which credential branch a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialAction {
    SignIn,
    SignUp,
}

impl FromStr for CredentialAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signin" => Ok(Self::SignIn),
            "signup" => Ok(Self::SignUp),
            other => Err(AppError::InvalidAction(other.to_string())),
        }
    }
}

/// Body of `POST /api/auth/callback/credentials`.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsInput {
    pub action: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl CredentialsInput {
    /// Parse the action, then check the shape of that branch.
    pub fn action(&self) -> AppResult<CredentialAction> {
        let action: CredentialAction = self.action.parse()?;
        require_email("email", self.email.trim())?;
        require_non_empty("password", &self.password)?;
        max_len("password", &self.password, 255)?;
        if action == CredentialAction::SignUp {
            let name = self.name.as_deref().unwrap_or_default();
            require_non_empty("name", name)?;
            max_len("name", name, 255)?;
        }
        Ok(action)
    }
}

impl Validate for CredentialsInput {
    fn validate(&self) -> AppResult<()> {
        self.action().map(|_| ())
    }
}

/// An identity an external provider has already verified.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderProfile {
    pub provider: String,
    pub provider_account_id: String,
    #[serde(default = "default_account_type")]
    pub account_type: String,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i32>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

fn default_account_type() -> String {
    "oauth".into()
}

/// Issued token plus the user it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct SignInResponse {
    pub session_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
    pub user: PublicUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user: PublicUser,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct SignOutResponse {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(action: &str, name: Option<&str>) -> CredentialsInput {
        CredentialsInput {
            action: action.into(),
            email: "a@b.com".into(),
            password: "pw123".into(),
            name: name.map(Into::into),
        }
    }

    #[test]
    fn unknown_action_is_rejected_before_shape() {
        let mut bad = input("reset", None);
        bad.email = "not-an-email".into();
        assert!(matches!(bad.action(), Err(AppError::InvalidAction(a)) if a == "reset"));
    }

    #[test]
    fn sign_up_needs_a_name() {
        assert!(matches!(input("signup", None).action(), Err(AppError::Validation(_))));
        assert!(matches!(input("signup", Some("  ")).action(), Err(AppError::Validation(_))));
        assert_eq!(input("signup", Some("A")).action().unwrap(), CredentialAction::SignUp);
        assert_eq!(input("signin", None).action().unwrap(), CredentialAction::SignIn);
    }

    #[test]
    fn email_and_password_shape() {
        let mut bad = input("signin", None);
        bad.email = "nope".into();
        assert!(bad.validate().is_err());

        let mut empty = input("signin", None);
        empty.password = String::new();
        assert!(empty.validate().is_err());

        let mut long = input("signin", None);
        long.password = "x".repeat(256);
        assert!(long.validate().is_err());
    }

    #[test]
    fn sign_in_response_uses_rfc3339() {
        let resp = SignInResponse {
            session_token: "t".into(),
            expires: time::macros::datetime!(2024-01-02 03:04:05 UTC),
            user: PublicUser { id: "u".into(), email: "a@b.com".into(), name: "A".into() },
        };
        let v = serde_json::to_value(resp).unwrap();
        assert_eq!(v["expires"], "2024-01-02T03:04:05Z");
    }
}
