use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection};

use super::escape;
use crate::database::Database;
use crate::error::Result;

/// Tag attached to a note.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    #[serde(rename = "NoteID")]
    pub note_id: String,
    pub name: String,
}

#[derive(sqlx::FromRow)]
struct Name {
    name: String,
}

#[derive(Clone)]
pub struct TagRepository {
    db: Database,
}

impl TagRepository {
    /// Create a new [`TagRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Attach `name` to a note. Adding twice is a no-op.
    pub async fn add(
        &self,
        conn: Option<&mut SqliteConnection>,
        note_id: &str,
        name: &str,
    ) -> Result<()> {
        let mut conn = self.db.scoped(conn).await?;
        Database::execute(
            &mut conn,
            "INSERT INTO note_tags (note_id, name) VALUES (?, ?)
                ON CONFLICT (note_id, name) DO NOTHING",
            &[note_id.into(), escape(name.trim()).into()],
        )
        .await?;

        Ok(())
    }

    /// Make `names` the exact tag set of a note.
    pub async fn replace(
        &self,
        conn: Option<&mut SqliteConnection>,
        note_id: &str,
        names: &[String],
    ) -> Result<Vec<Tag>> {
        let mut conn = self.db.scoped(conn).await?;
        let mut tx = conn.begin().await?;

        Database::execute(
            &mut tx,
            "DELETE FROM note_tags WHERE note_id = ?",
            &[note_id.into()],
        )
        .await?;
        for name in names.iter().filter(|name| !name.trim().is_empty()) {
            self.add(Some(&mut *tx), note_id, name).await?;
        }
        let tags = self.for_note(Some(&mut *tx), note_id).await?;
        tx.commit().await?;

        Ok(tags)
    }

    /// Tags of a note, by name.
    pub async fn for_note(
        &self,
        conn: Option<&mut SqliteConnection>,
        note_id: &str,
    ) -> Result<Vec<Tag>> {
        let mut conn = self.db.scoped(conn).await?;
        let (tags, _) = Database::fetch(
            &mut conn,
            "SELECT note_id, name FROM note_tags WHERE note_id = ? ORDER BY name",
            &[note_id.into()],
        )
        .await?;

        Ok(tags)
    }

    /// Every distinct tag name in use.
    pub async fn names(
        &self,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<Vec<String>> {
        let mut conn = self.db.scoped(conn).await?;
        let (names, _) = Database::fetch::<Name>(
            &mut conn,
            "SELECT DISTINCT name FROM note_tags ORDER BY name",
            &[],
        )
        .await?;

        Ok(names.into_iter().map(|n| n.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::SqlitePool;

    use super::*;
    use crate::note::{Note, NoteRepository};

    #[sqlx::test(migrations = false)]
    async fn test_tags(pool: SqlitePool) {
        let state = crate::tests::state(pool).await;
        let user = crate::tests::create_user(&state, "alice", "pw1", false).await;
        let notes = NoteRepository::new(state.db.clone());
        let tags = TagRepository::new(state.db.clone());

        let first = Note::new("First", &user.data.id, false);
        let second = Note::new("Second", &user.data.id, false);
        notes.insert(None, &first).await.unwrap();
        notes.insert(None, &second).await.unwrap();

        tags.add(None, &first.id, "work").await.unwrap();
        tags.add(None, &first.id, "work").await.unwrap();
        tags.add(None, &second.id, "home").await.unwrap();
        tags.add(None, &second.id, "work").await.unwrap();

        assert_eq!(tags.for_note(None, &first.id).await.unwrap().len(), 1);
        assert_eq!(tags.names(None).await.unwrap(), vec!["home", "work"]);

        tags.replace(None, &second.id, &[" a&b ".into()]).await.unwrap();
        assert_eq!(tags.names(None).await.unwrap(), vec!["a&amp;b", "work"]);

        let replaced = tags
            .replace(None, &first.id, &["b".into(), " ".into(), "a".into()])
            .await
            .unwrap();
        let names: Vec<_> = replaced.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
