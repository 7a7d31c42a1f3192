//! Note search.
//!
//! Criteria are turned into a parameterized `WHERE` clause. Each clause is
//! combined with `AND`, absent criteria add nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use validator::Validate;

use super::{Note, NoteRepository, escape};
use crate::database::{Database, QueryParam};
use crate::error::Result;
use crate::user::User;

/// Which trash state to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashFilter {
    #[default]
    Exclude,
    Only,
    Include,
}

impl TrashFilter {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("only") => Self::Only,
            Some("include") => Self::Include,
            _ => Self::Exclude,
        }
    }
}

/// Which visibility to return. `None` means both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicFilter {
    Only,
    Exclude,
}

impl PublicFilter {
    fn parse(value: Option<&str>) -> Option<Self> {
        match value {
            Some("only") => Some(Self::Only),
            Some("exclude") => Some(Self::Exclude),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchOrder {
    Updated,
    #[default]
    Added,
    Version,
    User,
}

impl SearchOrder {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("updated") => Self::Updated,
            Some("version") => Self::Version,
            Some("user") => Self::User,
            _ => Self::Added,
        }
    }

    fn clause(&self) -> &'static str {
        match self {
            Self::Updated => "last_update DESC",
            Self::Added => "n.added DESC",
            Self::Version => "COALESCE(lc.version, 0) DESC",
            Self::User => "u.username ASC",
        }
    }
}

/// Search criteria, all optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "PascalCase", default)]
pub struct SearchCriteria {
    /// Substring of the author username.
    pub username: Option<String>,
    /// `exclude` (default), `only` or `include`.
    pub trash: Option<String>,
    /// `only`, `exclude` or nothing for both.
    pub public: Option<String>,
    /// Substring of the title or latest content.
    pub text: Option<String>,
    /// Any of these tags.
    pub tags: Vec<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// `updated`, `added` (default), `version` or `user`.
    pub order: Option<String>,
    #[validate(range(min = 0, message = "Limit cannot be negative."))]
    pub limit: Option<i64>,
    #[validate(range(min = 0, message = "Offset cannot be negative."))]
    pub offset: Option<i64>,
    /// Exact author, set by the server only.
    #[serde(skip)]
    pub owner_id: Option<String>,
    /// Caller whose own notes are searched along with public ones, set by
    /// the server only.
    #[serde(skip)]
    pub viewer_id: Option<String>,
}

/// A note found by [`NoteRepository::search`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct SearchResult {
    #[sqlx(flatten)]
    pub note: Note,
    pub last_update: DateTime<Utc>,
    pub author: String,
}

const SEARCH_QUERY: &str = "SELECT n.id, n.title, n.user_id, n.public, n.added, n.deleted,
        COALESCE(lc.updated, n.added) AS last_update,
        u.username AS author
    FROM notes n
    JOIN users u ON u.id = n.user_id
    LEFT JOIN note_contents lc ON lc.note_id = n.id
        AND lc.version = (SELECT MAX(version) FROM note_contents WHERE note_id = n.id)";

/// Escape `LIKE` wildcards, then wrap with `%`.
fn contains(value: &str) -> QueryParam {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    QueryParam::Text(format!("%{escaped}%"))
}

impl SearchCriteria {
    /// Narrow criteria to what `viewer` is allowed to see.
    ///
    /// Administrators are unrestricted. Users searching their own notes get
    /// all of them, and users naming nobody get their own notes plus the
    /// public ones out of the trash. Everything else only matches public
    /// notes out of the trash.
    pub fn restrict_to(mut self, viewer: Option<&User>) -> Self {
        self.owner_id = None;
        self.viewer_id = None;

        match viewer {
            Some(user) if user.is_admin => {},
            Some(user) if self.username.as_deref() == Some(user.username.as_str()) => {
                self.owner_id = Some(user.id.clone());
                self.username = None;
            },
            Some(user) if self.username.as_deref().is_none_or(str::is_empty) => {
                self.viewer_id = Some(user.id.clone());
                self.username = None;
            },
            _ => {
                self.public = Some("only".to_owned());
                self.trash = None;
            },
        }
        self
    }

    /// Build the `WHERE` clause and its parameters, in order.
    pub fn where_clause(&self) -> (String, Vec<QueryParam>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        match TrashFilter::parse(self.trash.as_deref()) {
            TrashFilter::Exclude => clauses.push("n.deleted = 0".to_owned()),
            TrashFilter::Only => clauses.push("n.deleted = 1".to_owned()),
            TrashFilter::Include => {},
        }

        match PublicFilter::parse(self.public.as_deref()) {
            Some(PublicFilter::Only) => clauses.push("n.public = 1".to_owned()),
            Some(PublicFilter::Exclude) => clauses.push("n.public = 0".to_owned()),
            None => {},
        }

        if let Some(owner) = &self.owner_id {
            clauses.push("n.user_id = ?".to_owned());
            params.push(owner.as_str().into());
        }

        // other authors' notes must still be public and out of the trash.
        if let Some(viewer) = &self.viewer_id {
            clauses.push("(n.user_id = ? OR (n.public = 1 AND n.deleted = 0))".to_owned());
            params.push(viewer.as_str().into());
        }

        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            clauses.push("u.username LIKE ? ESCAPE '\\'".to_owned());
            params.push(contains(username));
        }

        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            let text = escape(text);
            clauses.push(
                "(n.title LIKE ? ESCAPE '\\' OR lc.content LIKE ? ESCAPE '\\')".to_owned(),
            );
            params.push(contains(&text));
            params.push(contains(&text));
        }

        let tags: Vec<_> = self
            .tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .collect();
        if !tags.is_empty() {
            let placeholders = vec!["?"; tags.len()].join(", ");
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM note_tags t WHERE t.note_id = n.id AND t.name IN ({placeholders}))"
            ));
            params.extend(tags.into_iter().map(|tag| escape(tag).into()));
        }

        if let Some(from) = self.date_from {
            clauses.push("COALESCE(lc.updated, n.added) >= ?".to_owned());
            params.push(from.into());
        }
        if let Some(to) = self.date_to {
            clauses.push("COALESCE(lc.updated, n.added) <= ?".to_owned());
            params.push(to.into());
        }

        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), params)
        }
    }

    /// Complete query with ordering and paging.
    pub fn query(&self) -> (String, Vec<QueryParam>) {
        let (clause, mut params) = self.where_clause();
        let order = SearchOrder::parse(self.order.as_deref()).clause();

        params.push(QueryParam::Int(self.limit.unwrap_or(-1)));
        params.push(QueryParam::Int(self.offset.unwrap_or(0)));

        (
            format!("{SEARCH_QUERY}{clause} ORDER BY {order}, n.id LIMIT ? OFFSET ?"),
            params,
        )
    }
}

impl NoteRepository {
    /// Find notes matching `criteria`.
    pub async fn search(
        &self,
        conn: Option<&mut SqliteConnection>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<SearchResult>> {
        let (query, params) = criteria.query();
        let mut conn = self.db.scoped(conn).await?;
        let (results, count) = Database::fetch(&mut conn, &query, &params).await?;

        tracing::debug!(count, "notes searched");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use sqlx::SqlitePool;

    use super::*;
    use crate::note::{ContentRepository, TagRepository};

    #[test]
    fn test_default_clause() {
        let (clause, params) = SearchCriteria::default().where_clause();
        assert_eq!(clause, " WHERE n.deleted = 0");
        assert!(params.is_empty());

        let criteria = SearchCriteria {
            trash: Some("include".into()),
            ..Default::default()
        };
        assert_eq!(criteria.where_clause().0, "");
    }

    #[test]
    fn test_parameters_follow_clauses() {
        let criteria = SearchCriteria {
            username: Some("al_ce".into()),
            text: Some("50%".into()),
            tags: vec!["a".into(), "".into(), "b".into()],
            public: Some("exclude".into()),
            ..Default::default()
        };

        let (clause, params) = criteria.where_clause();
        assert!(clause.contains("n.public = 0"));
        assert!(clause.contains("IN (?, ?)"));
        assert_eq!(params.len(), 5);
        assert_eq!(params[0], QueryParam::Text("%al\\_ce%".into()));
        assert_eq!(params[1], QueryParam::Text("%50\\%%".into()));
        assert_eq!(params[3], QueryParam::Text("a".into()));

        let (query, params) = criteria.query();
        assert!(query.ends_with("ORDER BY n.added DESC, n.id LIMIT ? OFFSET ?"));
        assert_eq!(params[5], QueryParam::Int(-1));
    }

    #[test]
    fn test_restrict_to() {
        let alice = User {
            id: "alice-id".into(),
            username: "alice".into(),
            ..Default::default()
        };
        let admin = User {
            is_admin: true,
            ..Default::default()
        };
        let criteria = SearchCriteria {
            username: Some("bob".into()),
            trash: Some("only".into()),
            ..Default::default()
        };

        let restricted = criteria.clone().restrict_to(Some(&alice));
        assert_eq!(restricted.public.as_deref(), Some("only"));
        assert_eq!(restricted.trash, None);
        assert_eq!(restricted.username.as_deref(), Some("bob"));

        assert_eq!(criteria.clone().restrict_to(Some(&admin)), criteria);
        assert_eq!(criteria.clone().restrict_to(None).public.as_deref(), Some("only"));

        let own = SearchCriteria {
            username: Some("alice".into()),
            trash: Some("only".into()),
            ..Default::default()
        }
        .restrict_to(Some(&alice));
        assert_eq!(own.owner_id.as_deref(), Some("alice-id"));
        assert_eq!(own.trash.as_deref(), Some("only"));
        assert_eq!(own.public, None);

        let unnamed = SearchCriteria {
            trash: Some("include".into()),
            ..Default::default()
        }
        .restrict_to(Some(&alice));
        assert_eq!(unnamed.viewer_id.as_deref(), Some("alice-id"));
        assert_eq!(unnamed.trash.as_deref(), Some("include"));
        assert_eq!(unnamed.public, None);
        assert!(unnamed.where_clause().0.contains("n.user_id = ? OR"));

        // anonymous callers never get a viewer scope.
        let anonymous = SearchCriteria::default().restrict_to(None);
        assert_eq!(anonymous.viewer_id, None);
        assert_eq!(anonymous.public.as_deref(), Some("only"));
    }

    #[sqlx::test(migrations = false)]
    async fn test_search(pool: SqlitePool) {
        let state = crate::tests::state(pool).await;
        let alice = crate::tests::create_user(&state, "alice", "pw1", false).await;
        let bob = crate::tests::create_user(&state, "bob", "pw2", false).await;
        let notes = NoteRepository::new(state.db.clone());
        let contents = ContentRepository::new(state.db.clone());
        let tags = TagRepository::new(state.db.clone());

        let mut trashed = Note::new("Old recipe", &alice.data.id, false);
        trashed.deleted = true;
        let private = Note::new("Diary", &alice.data.id, false);
        let public = Note::new("Announcement", &bob.data.id, true);
        for note in [&trashed, &private, &public] {
            notes.insert(None, note).await.unwrap();
        }
        contents.add(None, &private.id, "dear diary").await.unwrap();
        contents.add(None, &private.id, "met a cat today").await.unwrap();
        tags.add(None, &public.id, "news").await.unwrap();

        let search = |criteria: SearchCriteria| {
            let notes = notes.clone();
            async move {
                let mut ids: Vec<String> = notes
                    .search(None, &criteria)
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|r| r.note.id)
                    .collect();
                ids.sort();
                ids
            }
        };
        let sorted = |mut ids: Vec<String>| {
            ids.sort();
            ids
        };

        // trash unset excludes trashed notes.
        assert_eq!(
            search(SearchCriteria::default()).await,
            sorted(vec![private.id.clone(), public.id.clone()])
        );
        assert_eq!(
            search(SearchCriteria {
                trash: Some("only".into()),
                ..Default::default()
            })
            .await,
            vec![trashed.id.clone()]
        );
        assert_eq!(
            search(SearchCriteria {
                trash: Some("include".into()),
                ..Default::default()
            })
            .await
            .len(),
            3
        );

        // text goes through the latest content only.
        assert_eq!(
            search(SearchCriteria {
                text: Some("cat".into()),
                ..Default::default()
            })
            .await,
            vec![private.id.clone()]
        );
        assert!(
            search(SearchCriteria {
                text: Some("dear".into()),
                ..Default::default()
            })
            .await
            .is_empty()
        );

        assert_eq!(
            search(SearchCriteria {
                tags: vec!["news".into(), "other".into()],
                ..Default::default()
            })
            .await,
            vec![public.id.clone()]
        );
        assert_eq!(
            search(SearchCriteria {
                username: Some("ali".into()),
                ..Default::default()
            })
            .await,
            vec![private.id.clone()]
        );
        assert!(
            search(SearchCriteria {
                date_from: Some(Utc::now() + TimeDelta::hours(1)),
                ..Default::default()
            })
            .await
            .is_empty()
        );

        let results = notes
            .search(
                None,
                &SearchCriteria {
                    order: Some("user".into()),
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].author, "alice");
        assert!(results[0].last_update >= results[0].note.added);
        let hidden = Note::new("Bob's drafts", &bob.data.id, false);
        notes.insert(None, &hidden).await.unwrap();

        // alice sees her notes, trash included, and bob's public ones only.
        let criteria = SearchCriteria {
            trash: Some("include".into()),
            ..Default::default()
        }
        .restrict_to(Some(&alice.data));
        assert_eq!(
            search(criteria).await,
            sorted(vec![trashed.id.clone(), private.id.clone(), public.id.clone()])
        );
        let criteria = SearchCriteria::default().restrict_to(Some(&bob.data));
        assert_eq!(
            search(criteria).await,
            sorted(vec![public.id.clone(), hidden.id.clone()])
        );
    }
}
