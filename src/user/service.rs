use std::sync::Arc;

use sqlx::SqliteConnection;

use crate::crypto::PasswordManager;
use crate::database::Database;
use crate::error::{Result, ServerError, invalid_field};
use crate::token::{TokenKind, TokenRepository};
use crate::user::{User, UserRepository};

/// User manager.
#[derive(Clone)]
pub struct UserService {
    pub repo: UserRepository,
    pub crypto: Arc<PasswordManager>,
    pub data: User,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(user: User, db: Database, crypto: Arc<PasswordManager>) -> Self {
        Self {
            data: user,
            repo: UserRepository::new(db),
            crypto,
        }
    }

    /// Create builded user.
    ///
    /// Give it an ID and hash its password.
    pub async fn create_user(mut self) -> Result<Self> {
        if self
            .repo
            .find_by_username(None, &self.data.username)
            .await?
            .is_some()
        {
            return Err(invalid_field("username", "Username is already taken."));
        }

        self.data.id = uuid::Uuid::new_v4().to_string();
        self.data.password = self.crypto.hash_password(&self.data.password)?;
        self.repo.insert(None, &self.data).await?;

        tracing::info!(user_id = %self.data.id, username = %self.data.username, "user created");
        Ok(self)
    }

    /// Check clear `password` of an active user named `username`.
    pub async fn login(
        db: Database,
        crypto: Arc<PasswordManager>,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let repo = UserRepository::new(db.clone());
        let user = match repo.find_by_username(None, username).await? {
            Some(user) if !user.deleted => user,
            _ => return Err(ServerError::Unauthorized),
        };

        crypto
            .verify_password(password, &user.password)
            .map_err(|_| ServerError::Unauthorized)?;

        Ok(Self::new(user, db, crypto))
    }

    /// Replace password and revoke every login token.
    pub async fn change_password(
        &mut self,
        conn: &mut SqliteConnection,
        password: &str,
        tokens: &TokenRepository,
    ) -> Result<()> {
        self.data.password = self.crypto.hash_password(password)?;
        self.repo.update(Some(&mut *conn), &self.data).await?;
        tokens
            .delete_for_user(Some(conn), &self.data.id, Some(TokenKind::Login))
            .await?;

        tracing::info!(user_id = %self.data.id, "password changed");
        Ok(())
    }

    /// Soft delete current user and revoke all its tokens.
    pub async fn delete(
        &mut self,
        conn: &mut SqliteConnection,
        tokens: &TokenRepository,
    ) -> Result<()> {
        self.repo.delete(Some(&mut *conn), &self.data.id).await?;
        tokens.delete_for_user(Some(conn), &self.data.id, None).await?;
        self.data.deleted = true;

        tracing::info!(user_id = %self.data.id, "user deleted");
        Ok(())
    }
}
