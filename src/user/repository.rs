//! Handle database requests.

use sqlx::SqliteConnection;

use crate::database::Database;
use crate::error::Result;
use crate::user::User;

const USER_COLUMNS: &str = "id, username, password, email, is_admin, deleted";

#[derive(Clone)]
pub struct UserRepository {
    db: Database,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert [`User`] into database.
    pub async fn insert(
        &self,
        conn: Option<&mut SqliteConnection>,
        user: &User,
    ) -> Result<()> {
        let mut conn = self.db.scoped(conn).await?;
        Database::execute(
            &mut conn,
            "INSERT INTO users (id, username, password, email, is_admin)
                VALUES (?, ?, ?, ?, ?)",
            &[
                user.id.as_str().into(),
                user.username.as_str().into(),
                user.password.as_str().into(),
                user.email.clone().into(),
                user.is_admin.into(),
            ],
        )
        .await?;

        Ok(())
    }

    /// Find user using `id` field.
    pub async fn find_by_id(
        &self,
        conn: Option<&mut SqliteConnection>,
        user_id: &str,
    ) -> Result<Option<User>> {
        let mut conn = self.db.scoped(conn).await?;
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? LIMIT 1");

        Ok(Database::fetch_optional(&mut conn, &query, &[user_id.into()]).await?)
    }

    /// Find user using exact `username`.
    pub async fn find_by_username(
        &self,
        conn: Option<&mut SqliteConnection>,
        username: &str,
    ) -> Result<Option<User>> {
        let mut conn = self.db.scoped(conn).await?;
        let query =
            format!("SELECT {USER_COLUMNS} FROM users WHERE username = ? LIMIT 1");

        Ok(Database::fetch_optional(&mut conn, &query, &[username.into()]).await?)
    }

    /// Update user fields, password included.
    pub async fn update(
        &self,
        conn: Option<&mut SqliteConnection>,
        user: &User,
    ) -> Result<()> {
        let mut conn = self.db.scoped(conn).await?;
        Database::execute(
            &mut conn,
            "UPDATE users
                SET username = ?, password = ?, email = ?, is_admin = ?
                WHERE id = ?",
            &[
                user.username.as_str().into(),
                user.password.as_str().into(),
                user.email.clone().into(),
                user.is_admin.into(),
                user.id.as_str().into(),
            ],
        )
        .await?;

        Ok(())
    }

    /// Flag user as deleted. Rows are never removed.
    pub async fn delete(
        &self,
        conn: Option<&mut SqliteConnection>,
        user_id: &str,
    ) -> Result<bool> {
        let mut conn = self.db.scoped(conn).await?;
        let affected = Database::execute(
            &mut conn,
            "UPDATE users SET deleted = 1 WHERE id = ? AND deleted = 0",
            &[user_id.into()],
        )
        .await?;

        Ok(affected == 1)
    }
}
