//! Versioned note contents.
//!
//! Versions start at 1 and only grow. Editing the latest version rewrites it
//! in place, editing an older one appends a new version after the latest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection};

use super::escape;
use crate::database::Database;
use crate::error::{Result, ServerError};

const CONTENT_COLUMNS: &str = "note_id, version, content, updated";

/// Content of a [`super::Note`] at a given version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct NoteContent {
    #[serde(rename = "NoteID")]
    pub note_id: String,
    pub version: i64,
    pub content: String,
    pub updated: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct Latest {
    version: Option<i64>,
}

#[derive(Clone)]
pub struct ContentRepository {
    db: Database,
}

impl ContentRepository {
    /// Create a new [`ContentRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a version right after the latest one.
    pub async fn add(
        &self,
        conn: Option<&mut SqliteConnection>,
        note_id: &str,
        content: &str,
    ) -> Result<NoteContent> {
        let mut conn = self.db.scoped(conn).await?;
        let query = format!(
            "INSERT INTO note_contents (note_id, version, content, updated)
                SELECT ?, COALESCE(MAX(version), 0) + 1, ?, ?
                FROM note_contents WHERE note_id = ?
                RETURNING {CONTENT_COLUMNS}"
        );

        Database::fetch_optional(
            &mut conn,
            &query,
            &[
                note_id.into(),
                escape(content).into(),
                Utc::now().into(),
                note_id.into(),
            ],
        )
        .await?
        .ok_or(ServerError::NotFound)
    }

    /// Edit `version`.
    ///
    /// Returns the content as stored, whose version differs from `version`
    /// when an older one was edited.
    pub async fn edit(
        &self,
        conn: Option<&mut SqliteConnection>,
        note_id: &str,
        version: i64,
        content: &str,
    ) -> Result<NoteContent> {
        let mut conn = self.db.scoped(conn).await?;
        let mut tx = conn.begin().await?;

        let latest = Database::fetch_optional::<Latest>(
            &mut tx,
            "SELECT MAX(version) AS version FROM note_contents WHERE note_id = ?",
            &[note_id.into()],
        )
        .await?
        .and_then(|latest| latest.version)
        .unwrap_or_default();

        if version < 1 || version > latest {
            return Err(ServerError::NotFound);
        }

        let stored = if version == latest {
            let query = format!(
                "UPDATE note_contents SET content = ?, updated = ?
                    WHERE note_id = ? AND version = ?
                    RETURNING {CONTENT_COLUMNS}"
            );
            Database::fetch_optional(
                &mut tx,
                &query,
                &[
                    escape(content).into(),
                    Utc::now().into(),
                    note_id.into(),
                    version.into(),
                ],
            )
            .await?
            .ok_or(ServerError::NotFound)?
        } else {
            self.add(Some(&mut *tx), note_id, content).await?
        };
        tx.commit().await?;

        Ok(stored)
    }

    /// Get a specific version.
    pub async fn get(
        &self,
        conn: Option<&mut SqliteConnection>,
        note_id: &str,
        version: i64,
    ) -> Result<Option<NoteContent>> {
        let mut conn = self.db.scoped(conn).await?;
        let query = format!(
            "SELECT {CONTENT_COLUMNS} FROM note_contents WHERE note_id = ? AND version = ? LIMIT 1"
        );

        Ok(Database::fetch_optional(&mut conn, &query, &[note_id.into(), version.into()])
            .await?)
    }

    /// Latest version, if the note has any content.
    pub async fn latest(
        &self,
        conn: Option<&mut SqliteConnection>,
        note_id: &str,
    ) -> Result<Option<NoteContent>> {
        let mut conn = self.db.scoped(conn).await?;
        let query = format!(
            "SELECT {CONTENT_COLUMNS} FROM note_contents WHERE note_id = ?
                ORDER BY version DESC LIMIT 1"
        );

        Ok(Database::fetch_optional(&mut conn, &query, &[note_id.into()]).await?)
    }

    /// Every version, newest first.
    pub async fn all(
        &self,
        conn: Option<&mut SqliteConnection>,
        note_id: &str,
    ) -> Result<Vec<NoteContent>> {
        let mut conn = self.db.scoped(conn).await?;
        let query = format!(
            "SELECT {CONTENT_COLUMNS} FROM note_contents WHERE note_id = ? ORDER BY version DESC"
        );

        let (contents, _) = Database::fetch(&mut conn, &query, &[note_id.into()]).await?;
        Ok(contents)
    }
}
