//! Entity rows, their insert/patch shapes and table descriptors.
//!
//! Field names match column names; rows round-trip through the store as JSON objects, so
//! timestamps use RFC 3339.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::OffsetDateTime;

use super::table::{Column, ColumnDefault, ForeignKey, TableDef, UniqueKey};
use crate::error::AppResult;
use crate::validation::{max_len, require_email, Validate};

/// A record type stored in one table.
pub trait Entity: DeserializeOwned + Send + Sync + 'static {
    /// Primary-key value; composite keys serialize as a JSON array in key-column order.
    type Key: Serialize + Send + Sync + std::fmt::Debug;
    type New: Serialize + Send + Sync;
    type Patch: Serialize + Send + Sync;

    const TABLE: &'static TableDef;
    /// Human-readable name used in error messages.
    const NAME: &'static str;
}

// ---- user ----

pub static USER_TABLE: TableDef = TableDef {
    name: "user",
    columns: &[
        Column::generated("id", false, ColumnDefault::Uuid),
        Column::required("name"),
        Column::required("email"),
        Column::generated("email_verified", true, ColumnDefault::Now),
        Column::optional("password"),
        Column::optional("image"),
    ],
    primary_key: &["id"],
    // Backstop for the service-level duplicate check.
    unique: &[UniqueKey { name: "user_email_key", columns: &["email"] }],
    foreign_keys: &[],
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub email_verified: Option<OffsetDateTime>,
    /// Argon2 PHC string; absent for provider-only accounts.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Entity for User {
    type Key = String;
    type New = NewUser;
    type Patch = UserPatch;
    const TABLE: &'static TableDef = &USER_TABLE;
    const NAME: &'static str = "User";
}

impl Validate for NewUser {
    fn validate(&self) -> AppResult<()> {
        require_email("email", &self.email)?;
        max_len("name", &self.name, 255)?;
        if let Some(image) = &self.image {
            max_len("image", image, 255)?;
        }
        Ok(())
    }
}

// ---- account ----

pub static ACCOUNT_TABLE: TableDef = TableDef {
    name: "account",
    columns: &[
        Column::required("user_id"),
        Column::required("type"),
        Column::required("provider"),
        Column::required("provider_account_id"),
        Column::optional("refresh_token"),
        Column::optional("access_token"),
        Column::optional("expires_at"),
        Column::optional("token_type"),
        Column::optional("scope"),
        Column::optional("id_token"),
        Column::optional("session_state"),
    ],
    primary_key: &["provider", "provider_account_id"],
    unique: &[],
    foreign_keys: &[ForeignKey {
        name: "account_user_id_fkey",
        column: "user_id",
        references: "user",
        referenced_column: "id",
    }],
};

/// Link between a user and one external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub user_id: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub provider: String,
    pub provider_account_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires_at: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i32>,
}

impl Entity for Account {
    type Key = (String, String);
    type New = Account;
    type Patch = AccountPatch;
    const TABLE: &'static TableDef = &ACCOUNT_TABLE;
    const NAME: &'static str = "Account";
}

// ---- session ----

pub static SESSION_TABLE: TableDef = TableDef {
    name: "session",
    columns: &[
        Column::required("session_token"),
        Column::required("user_id"),
        Column::required("expires"),
    ],
    primary_key: &["session_token"],
    unique: &[],
    foreign_keys: &[ForeignKey {
        name: "session_user_id_fkey",
        column: "user_id",
        references: "user",
        referenced_column: "id",
    }],
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_token: String,
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

impl Session {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionPatch {
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub expires: Option<OffsetDateTime>,
}

impl Entity for Session {
    type Key = String;
    type New = Session;
    type Patch = SessionPatch;
    const TABLE: &'static TableDef = &SESSION_TABLE;
    const NAME: &'static str = "Session";
}

// ---- post ----

pub static POST_TABLE: TableDef = TableDef {
    name: "post",
    columns: &[
        Column::generated("id", false, ColumnDefault::Serial),
        Column::required("name"),
        Column::required("content"),
        Column::required("created_by_id"),
        Column::generated("created_at", false, ColumnDefault::Now),
        Column::generated("updated_at", true, ColumnDefault::OnUpdate),
    ],
    primary_key: &["id"],
    unique: &[],
    foreign_keys: &[ForeignKey {
        name: "post_created_by_id_fkey",
        column: "created_by_id",
        references: "user",
        referenced_column: "id",
    }],
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: i32,
    pub name: String,
    pub content: String,
    pub created_by_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub name: String,
    pub content: String,
    pub created_by_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostPatch {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_by_id: Option<String>,
}

impl Entity for Post {
    type Key = i32;
    type New = NewPost;
    type Patch = PostPatch;
    const TABLE: &'static TableDef = &POST_TABLE;
    const NAME: &'static str = "Post";
}

impl Validate for NewPost {
    fn validate(&self) -> AppResult<()> {
        max_len("name", &self.name, 256)?;
        max_len("created_by_id", &self.created_by_id, 255)?;
        if self.created_by_id.trim().is_empty() {
            return Err(crate::error::AppError::validation("created_by_id is required"));
        }
        Ok(())
    }
}

impl Validate for PostPatch {
    fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            max_len("name", name, 256)?;
        }
        if let Some(owner) = &self.created_by_id {
            max_len("created_by_id", owner, 255)?;
        }
        Ok(())
    }
}

// ---- verification token ----

pub static VERIFICATION_TOKEN_TABLE: TableDef = TableDef {
    name: "verification_token",
    columns: &[
        Column::required("identifier"),
        Column::required("token"),
        Column::required("expires"),
    ],
    primary_key: &["identifier", "token"],
    unique: &[],
    foreign_keys: &[],
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationToken {
    pub identifier: String,
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationTokenPatch {
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub expires: Option<OffsetDateTime>,
}

impl Entity for VerificationToken {
    type Key = (String, String);
    type New = VerificationToken;
    type Patch = VerificationTokenPatch;
    const TABLE: &'static TableDef = &VERIFICATION_TOKEN_TABLE;
    const NAME: &'static str = "Verification token";
}

/// Every table, parents before children.
pub static ALL_TABLES: &[&TableDef] = &[
    &USER_TABLE,
    &ACCOUNT_TABLE,
    &SESSION_TABLE,
    &POST_TABLE,
    &VERIFICATION_TOKEN_TABLE,
];
