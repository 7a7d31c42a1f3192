//! User tokens: login sessions and one-time password resets.
//!
//! Login tokens live 14 days and are pushed back on every authenticated
//! request. Password reset tokens live 1 day and disappear once used.
//! Expired tokens are deleted, either when presented or by the periodic
//! sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::crypto::generate_token;
use crate::database::Database;
use crate::error::{Result, invalid_field};

/// Serializes token refreshes with the cleanup sweep.
pub type TokenGuard = Arc<Mutex<()>>;

const TOKEN_COLUMNS: &str = "token, type, user_id, created, expiry, ip";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TokenKind {
    Login,
    PassReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::PassReset => "passreset",
        }
    }

    /// Validity period from creation or last refresh.
    pub fn lifetime(&self) -> TimeDelta {
        match self {
            Self::Login => TimeDelta::days(14),
            Self::PassReset => TimeDelta::days(1),
        }
    }
}

/// Outcome of a token validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Valid and kept.
    Valid,
    /// Valid for this use only.
    Consume,
    /// Expired.
    Expired,
}

/// Token as saved on database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct UserToken {
    pub token: String,
    #[serde(rename = "Type")]
    #[sqlx(rename = "type")]
    pub kind: TokenKind,
    #[serde(rename = "UserID")]
    pub user_id: String,
    pub created: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    #[serde(rename = "IP")]
    pub ip: String,
}

impl UserToken {
    /// Generate a fresh token for `user_id`.
    pub fn new(kind: TokenKind, user_id: &str, ip: &str) -> Result<Self> {
        if ip.is_empty() {
            return Err(invalid_field("ip", "Client address is required."));
        }

        let created = Utc::now();
        Ok(Self {
            token: generate_token(),
            kind,
            user_id: user_id.to_owned(),
            created,
            expiry: created + kind.lifetime(),
            ip: ip.to_owned(),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    /// Decide what validating this token at `now` means.
    pub fn verdict(&self, now: DateTime<Utc>) -> Verdict {
        if self.is_expired(now) {
            Verdict::Expired
        } else if self.kind == TokenKind::PassReset {
            Verdict::Consume
        } else {
            Verdict::Valid
        }
    }

    /// Check the token, deleting it when expired or consumed.
    ///
    /// A `dry` validation only reports and never touches the database.
    pub async fn validate(
        &self,
        repo: &TokenRepository,
        conn: Option<&mut SqliteConnection>,
        dry: bool,
    ) -> Result<bool> {
        let verdict = self.verdict(Utc::now());
        if dry {
            return Ok(verdict != Verdict::Expired);
        }

        match verdict {
            Verdict::Valid => Ok(true),
            // only the caller that actually removes the row may use it.
            Verdict::Consume => {
                Ok(repo.delete(conn, &self.user_id, &self.token).await? == 1)
            },
            Verdict::Expired => {
                repo.delete(conn, &self.user_id, &self.token).await?;
                Ok(false)
            },
        }
    }
}

#[derive(Clone)]
pub struct TokenRepository {
    db: Database,
}

impl TokenRepository {
    /// Create a new [`TokenRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Save a new token.
    pub async fn insert(
        &self,
        conn: Option<&mut SqliteConnection>,
        token: &UserToken,
    ) -> Result<()> {
        let mut conn = self.db.scoped(conn).await?;
        Database::execute(
            &mut conn,
            "INSERT INTO user_tokens (token, type, user_id, created, expiry, ip)
                VALUES (?, ?, ?, ?, ?, ?)",
            &[
                token.token.as_str().into(),
                token.kind.as_str().into(),
                token.user_id.as_str().into(),
                token.created.into(),
                token.expiry.into(),
                token.ip.as_str().into(),
            ],
        )
        .await?;

        Ok(())
    }

    /// Find the token `token` of `user_id`.
    pub async fn find(
        &self,
        conn: Option<&mut SqliteConnection>,
        user_id: &str,
        token: &str,
    ) -> Result<Option<UserToken>> {
        let mut conn = self.db.scoped(conn).await?;
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM user_tokens WHERE user_id = ? AND token = ? LIMIT 1"
        );

        Ok(Database::fetch_optional(&mut conn, &query, &[user_id.into(), token.into()])
            .await?)
    }

    /// Every token of `user_id`, soonest expiry first.
    pub async fn for_user(
        &self,
        conn: Option<&mut SqliteConnection>,
        user_id: &str,
    ) -> Result<Vec<UserToken>> {
        let mut conn = self.db.scoped(conn).await?;
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM user_tokens WHERE user_id = ? ORDER BY expiry"
        );

        let (tokens, _) = Database::fetch(&mut conn, &query, &[user_id.into()]).await?;
        Ok(tokens)
    }

    /// Every token stored.
    pub async fn all(
        &self,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<Vec<UserToken>> {
        let mut conn = self.db.scoped(conn).await?;
        let query = format!("SELECT {TOKEN_COLUMNS} FROM user_tokens ORDER BY expiry");

        let (tokens, _) = Database::fetch(&mut conn, &query, &[]).await?;
        Ok(tokens)
    }

    /// Push expiry back and record the client address.
    ///
    /// Already expired tokens are left untouched and `false` is returned.
    pub async fn refresh(
        &self,
        conn: Option<&mut SqliteConnection>,
        token: &mut UserToken,
        ip: &str,
    ) -> Result<bool> {
        let mut conn = self.db.scoped(conn).await?;
        let now = Utc::now();
        let expiry = now + token.kind.lifetime();

        let affected = Database::execute(
            &mut conn,
            "UPDATE user_tokens SET expiry = ?, ip = ?
                WHERE user_id = ? AND token = ? AND expiry > ?",
            &[
                expiry.into(),
                ip.into(),
                token.user_id.as_str().into(),
                token.token.as_str().into(),
                now.into(),
            ],
        )
        .await?;

        if affected == 1 {
            token.expiry = expiry;
            token.ip = ip.to_owned();
        }
        Ok(affected == 1)
    }

    /// Remove a token, returning the number of deleted rows.
    pub async fn delete(
        &self,
        conn: Option<&mut SqliteConnection>,
        user_id: &str,
        token: &str,
    ) -> Result<u64> {
        let mut conn = self.db.scoped(conn).await?;
        Ok(Database::execute(
            &mut conn,
            "DELETE FROM user_tokens WHERE user_id = ? AND token = ?",
            &[user_id.into(), token.into()],
        )
        .await?)
    }

    /// Remove a token only if it is expired at `now`.
    pub async fn delete_expired(
        &self,
        conn: Option<&mut SqliteConnection>,
        token: &UserToken,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut conn = self.db.scoped(conn).await?;
        Ok(Database::execute(
            &mut conn,
            "DELETE FROM user_tokens WHERE user_id = ? AND token = ? AND expiry <= ?",
            &[
                token.user_id.as_str().into(),
                token.token.as_str().into(),
                now.into(),
            ],
        )
        .await?)
    }

    /// Remove tokens of `user_id`, all of them or only of `kind`.
    pub async fn delete_for_user(
        &self,
        conn: Option<&mut SqliteConnection>,
        user_id: &str,
        kind: Option<TokenKind>,
    ) -> Result<u64> {
        let mut conn = self.db.scoped(conn).await?;
        let affected = match kind {
            Some(kind) => {
                Database::execute(
                    &mut conn,
                    "DELETE FROM user_tokens WHERE user_id = ? AND type = ?",
                    &[
                        user_id.into(),
                        kind.as_str().into(),
                    ],
                )
                .await?
            },
            None => {
                Database::execute(
                    &mut conn,
                    "DELETE FROM user_tokens WHERE user_id = ?",
                    &[user_id.into()],
                )
                .await?
            },
        };

        Ok(affected)
    }
}

/// Delete every expired token, returning how many were removed.
pub async fn cleanup_tokens(db: &Database, guard: &TokenGuard) -> Result<u64> {
    let repo = TokenRepository::new(db.clone());
    let _lock = guard.lock().await;

    let now = Utc::now();
    let mut removed = 0;
    for token in repo.all(None).await? {
        if token.verdict(now) == Verdict::Expired {
            removed += repo.delete_expired(None, &token, now).await?;
        }
    }

    metrics::counter!("tokens_cleaned_total").increment(removed);
    tracing::info!(removed, "expired tokens cleaned up");

    Ok(removed)
}

/// Run [`cleanup_tokens`] every `every` for the whole process lifetime.
pub fn spawn_cleanup(
    db: Database,
    guard: TokenGuard,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(err) = cleanup_tokens(&db, &guard).await {
                tracing::error!(error = %err, "expired tokens cleanup failed");
            }
        }
    })
}
