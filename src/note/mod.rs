//! Notes, their versioned contents and tags.
mod content;
mod search;
mod tag;

pub use content::*;
pub use search::*;
pub use tag::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection};

use crate::database::Database;
use crate::error::Result;
use crate::user::User;

const NOTE_COLUMNS: &str = "id, title, user_id, public, added, deleted";

/// Escape user text before it is stored.
pub fn escape(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

/// Note as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct Note {
    #[serde(rename = "ID")]
    pub id: String,
    pub title: String,
    #[serde(rename = "UserID")]
    pub user_id: String,
    pub public: bool,
    pub added: DateTime<Utc>,
    pub deleted: bool,
}

impl Note {
    /// Create a new note owned by `user_id`.
    pub fn new(title: &str, user_id: &str, public: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: escape(title),
            user_id: user_id.to_owned(),
            public,
            added: Utc::now(),
            deleted: false,
        }
    }

    /// Owner and administrators may edit.
    pub fn is_editable_by(&self, user: &User) -> bool {
        user.is_admin || user.id == self.user_id
    }

    /// Public notes out of the trash are readable by anyone.
    pub fn is_visible_to(&self, user: Option<&User>) -> bool {
        (self.public && !self.deleted)
            || user.is_some_and(|user| self.is_editable_by(user))
    }
}

/// What [`NoteRepository::delete`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Trashed,
    Removed,
}

#[derive(Clone)]
pub struct NoteRepository {
    db: Database,
}

impl NoteRepository {
    /// Create a new [`NoteRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert [`Note`] into database.
    pub async fn insert(
        &self,
        conn: Option<&mut SqliteConnection>,
        note: &Note,
    ) -> Result<()> {
        let mut conn = self.db.scoped(conn).await?;
        Database::execute(
            &mut conn,
            "INSERT INTO notes (id, title, user_id, public, added, deleted)
                VALUES (?, ?, ?, ?, ?, ?)",
            &[
                note.id.as_str().into(),
                note.title.as_str().into(),
                note.user_id.as_str().into(),
                note.public.into(),
                note.added.into(),
                note.deleted.into(),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn find(
        &self,
        conn: Option<&mut SqliteConnection>,
        note_id: &str,
    ) -> Result<Option<Note>> {
        let mut conn = self.db.scoped(conn).await?;
        let query = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ? LIMIT 1");

        Ok(Database::fetch_optional(&mut conn, &query, &[note_id.into()]).await?)
    }

    /// Save `title` and `public`. The title is escaped again.
    pub async fn update(
        &self,
        conn: Option<&mut SqliteConnection>,
        note: &mut Note,
        title: Option<&str>,
        public: Option<bool>,
    ) -> Result<()> {
        if let Some(title) = title {
            note.title = escape(title);
        }
        if let Some(public) = public {
            note.public = public;
        }

        let mut conn = self.db.scoped(conn).await?;
        Database::execute(
            &mut conn,
            "UPDATE notes SET title = ?, public = ? WHERE id = ?",
            &[
                note.title.as_str().into(),
                note.public.into(),
                note.id.as_str().into(),
            ],
        )
        .await?;

        Ok(())
    }

    /// Send to trash, or remove for good when already trashed.
    pub async fn delete(
        &self,
        conn: Option<&mut SqliteConnection>,
        note: &mut Note,
    ) -> Result<Deletion> {
        let mut conn = self.db.scoped(conn).await?;

        if !note.deleted {
            Database::execute(
                &mut conn,
                "UPDATE notes SET deleted = 1 WHERE id = ?",
                &[note.id.as_str().into()],
            )
            .await?;
            note.deleted = true;
            return Ok(Deletion::Trashed);
        }

        let mut tx = conn.begin().await?;
        for query in [
            "DELETE FROM note_tags WHERE note_id = ?",
            "DELETE FROM note_contents WHERE note_id = ?",
            "DELETE FROM notes WHERE id = ?",
        ] {
            Database::execute(&mut tx, query, &[note.id.as_str().into()]).await?;
        }
        tx.commit().await?;

        tracing::info!(note_id = %note.id, "note removed");
        Ok(Deletion::Removed)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::SqlitePool;

    use super::*;

    #[test]
    fn test_title_escaped() {
        let note = Note::new("<b>Tom & \"Jerry\"</b>", "user", false);
        assert_eq!(note.title, "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_visibility() {
        let owner = User {
            id: "owner".into(),
            ..Default::default()
        };
        let other = User {
            id: "other".into(),
            ..Default::default()
        };
        let admin = User {
            id: "admin".into(),
            is_admin: true,
            ..Default::default()
        };

        let mut note = Note::new("Title", "owner", false);
        assert!(note.is_visible_to(Some(&owner)));
        assert!(note.is_visible_to(Some(&admin)));
        assert!(!note.is_visible_to(Some(&other)));
        assert!(!note.is_visible_to(None));

        note.public = true;
        assert!(note.is_visible_to(None));
        note.deleted = true;
        assert!(!note.is_visible_to(Some(&other)));
        assert!(!note.is_editable_by(&other));
    }

    #[sqlx::test(migrations = false)]
    async fn test_trash_then_remove(pool: SqlitePool) {
        let state = crate::tests::state(pool).await;
        let user = crate::tests::create_user(&state, "alice", "pw1", false).await;
        let notes = NoteRepository::new(state.db.clone());
        let contents = ContentRepository::new(state.db.clone());
        let tags = TagRepository::new(state.db.clone());

        let mut note = Note::new("Groceries", &user.data.id, false);
        notes.insert(None, &note).await.unwrap();
        contents.add(None, &note.id, "milk").await.unwrap();
        tags.add(None, &note.id, "home").await.unwrap();

        assert_eq!(notes.delete(None, &mut note).await.unwrap(), Deletion::Trashed);
        let stored = notes.find(None, &note.id).await.unwrap().unwrap();
        assert!(stored.deleted);
        assert_eq!(contents.all(None, &note.id).await.unwrap().len(), 1);

        assert_eq!(notes.delete(None, &mut note).await.unwrap(), Deletion::Removed);
        assert!(notes.find(None, &note.id).await.unwrap().is_none());
        assert!(contents.all(None, &note.id).await.unwrap().is_empty());
        assert!(tags.for_note(None, &note.id).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = false)]
    async fn test_update(pool: SqlitePool) {
        let state = crate::tests::state(pool).await;
        let user = crate::tests::create_user(&state, "alice", "pw1", false).await;
        let notes = NoteRepository::new(state.db.clone());

        let mut note = Note::new("Draft", &user.data.id, false);
        notes.insert(None, &note).await.unwrap();
        notes
            .update(None, &mut note, Some("Final <1>"), Some(true))
            .await
            .unwrap();

        let stored = notes.find(None, &note.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Final &lt;1&gt;");
        assert!(stored.public);
        assert_eq!(stored.title, note.title);
    }
}
