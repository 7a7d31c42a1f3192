//! Notes, search and tags.

use serde::{Deserialize, Serialize};
use sqlx::Connection;
use validator::Validate;

use super::RouteContext;
use super::response::Reply;
use crate::AppState;
use crate::database::Database;
use crate::error::{Result, ServerError};
use crate::note::{
    ContentRepository, Note, NoteContent, NoteRepository, SearchCriteria,
    TagRepository,
};

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Create {
    #[validate(length(min = 1, message = "Title is required."))]
    title: String,
    #[serde(default)]
    public: bool,
    content: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Default, Validate, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Update {
    #[validate(length(min = 1, message = "Title cannot be empty."))]
    title: Option<String>,
    public: Option<bool>,
    content: Option<String>,
    #[validate(range(min = 1, message = "Version starts at 1."))]
    version: Option<i64>,
    tags: Option<Vec<String>>,
}

/// A note with every version of its content.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Detail {
    note: Note,
    /// Newest first.
    contents: Vec<NoteContent>,
    tags: Vec<String>,
}

impl Detail {
    async fn load(db: &Database, note: Note) -> Result<Self> {
        let contents = ContentRepository::new(db.clone())
            .all(None, &note.id)
            .await?;
        let tags = TagRepository::new(db.clone())
            .for_note(None, &note.id)
            .await?
            .into_iter()
            .map(|tag| tag.name)
            .collect();

        Ok(Self {
            note,
            contents,
            tags,
        })
    }
}

const NOTE_MISSING: &str = "This note does not exist.";

async fn find(state: &AppState, ctx: &RouteContext) -> Result<Note> {
    NoteRepository::new(state.db.clone())
        .find(None, ctx.param("id")?)
        .await?
        .ok_or_else(|| ServerError::NotFound.context(NOTE_MISSING))
}

/// Check the caller may edit `note` without revealing hidden notes.
fn check_editable(note: &Note, ctx: &RouteContext) -> Result<()> {
    let user = ctx.user()?;
    if note.is_editable_by(user) {
        Ok(())
    } else if note.is_visible_to(Some(user)) {
        Err(ServerError::Forbidden)
    } else {
        Err(ServerError::NotFound.context(NOTE_MISSING))
    }
}

pub async fn search(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let criteria: SearchCriteria = if ctx.body.is_empty() {
        SearchCriteria::default()
    } else {
        ctx.json()?
    };
    let criteria = criteria.restrict_to(ctx.user.as_ref());

    let results = NoteRepository::new(state.db.clone())
        .search(None, &criteria)
        .await?;
    Reply::json(results)
}

pub async fn create(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let user = ctx.user()?;
    let body: Create = ctx.json()?;
    let note = Note::new(&body.title, &user.id, body.public);

    {
        let mut conn = state.db.scoped(None).await?;
        let mut tx = conn.begin().await?;

        NoteRepository::new(state.db.clone())
            .insert(Some(&mut *tx), &note)
            .await?;
        if let Some(content) = &body.content {
            ContentRepository::new(state.db.clone())
                .add(Some(&mut *tx), &note.id, content)
                .await?;
        }
        if !body.tags.is_empty() {
            TagRepository::new(state.db.clone())
                .replace(Some(&mut *tx), &note.id, &body.tags)
                .await?;
        }

        tx.commit().await?;
    }

    tracing::info!(note_id = %note.id, user_id = %user.id, "note created");
    Reply::json(Detail::load(&state.db, note).await?)
}

pub async fn get(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let note = find(&state, &ctx).await?;
    if !note.is_visible_to(ctx.user.as_ref()) {
        return Err(ServerError::NotFound.context(NOTE_MISSING));
    }

    Reply::json(Detail::load(&state.db, note).await?)
}

pub async fn update(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let mut note = find(&state, &ctx).await?;
    check_editable(&note, &ctx)?;
    let body: Update = ctx.json()?;

    {
        let mut conn = state.db.scoped(None).await?;
        let mut tx = conn.begin().await?;

        if body.title.is_some() || body.public.is_some() {
            NoteRepository::new(state.db.clone())
                .update(Some(&mut *tx), &mut note, body.title.as_deref(), body.public)
                .await?;
        }

        if let Some(content) = &body.content {
            let contents = ContentRepository::new(state.db.clone());
            match body.version {
                Some(version) => {
                    contents
                        .edit(Some(&mut *tx), &note.id, version, content)
                        .await?
                },
                None => contents.add(Some(&mut *tx), &note.id, content).await?,
            };
        }

        if let Some(tags) = &body.tags {
            TagRepository::new(state.db.clone())
                .replace(Some(&mut *tx), &note.id, tags)
                .await?;
        }

        tx.commit().await?;
    }

    Reply::json(Detail::load(&state.db, note).await?)
}

/// Trash the note, or remove it when already in the trash.
pub async fn delete(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let mut note = find(&state, &ctx).await?;
    check_editable(&note, &ctx)?;

    let deletion = NoteRepository::new(state.db.clone())
        .delete(None, &mut note)
        .await?;

    tracing::info!(note_id = %note.id, ?deletion, "note deleted");
    Ok(Reply::Empty)
}

pub async fn tags(state: AppState, _ctx: RouteContext) -> Result<Reply> {
    Reply::json(TagRepository::new(state.db.clone()).names(None).await?)
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::{Method, StatusCode};
    use serde_json::{Value, json};
    use sqlx::SqlitePool;

    use crate::tests::{create_user, login, read_json, state};
    use crate::{app, make_request};

    async fn create(app: &Router, authorization: &str, body: Value) -> Value {
        let response = make_request(
            Some(authorization),
            app.clone(),
            Method::POST,
            "/note",
            body.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        read_json(response).await["Message"].clone()
    }

    #[sqlx::test(migrations = false)]
    async fn test_create_and_get(pool: SqlitePool) {
        let state = state(pool).await;
        let alice = create_user(&state, "alice", "pw1", false).await;
        let bob = create_user(&state, "bob", "pw2", false).await;
        let alice_auth = login(&state, &alice).await;
        let app = app(state.clone());

        let note = create(
            &app,
            &alice_auth,
            json!({ "Title": "Shopping <list>", "Content": "eggs & milk", "Tags": ["home", "food"] }),
        )
        .await;
        assert_eq!(note["Note"]["Title"], "Shopping &lt;list&gt;");
        assert_eq!(note["Note"]["UserID"], alice.data.id.as_str());
        assert_eq!(note["Contents"][0]["Version"], 1);
        assert_eq!(note["Contents"][0]["Content"], "eggs &amp; milk");
        assert_eq!(note["Tags"], json!(["food", "home"]));

        let path = format!("/note/{}", note["Note"]["ID"].as_str().unwrap());
        let response =
            make_request(Some(&alice_auth), app.clone(), Method::GET, &path, String::new())
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        // private notes are hidden from others.
        let response = make_request(
            Some(&login(&state, &bob).await),
            app.clone(),
            Method::GET,
            &path,
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response =
            make_request(None, app.clone(), Method::GET, &path, String::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = read_json(response).await;
        assert_eq!(body["Error"]["friendly"], "This note does not exist.");

        let response = make_request(
            None,
            app,
            Method::POST,
            "/note",
            json!({ "Title": "anonymous" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test(migrations = false)]
    async fn test_update_versions(pool: SqlitePool) {
        let state = state(pool).await;
        let alice = create_user(&state, "alice", "pw1", false).await;
        let bob = create_user(&state, "bob", "pw2", false).await;
        let alice_auth = login(&state, &alice).await;
        let app = app(state.clone());

        let note = create(
            &app,
            &alice_auth,
            json!({ "Title": "Draft", "Public": true, "Content": "v1" }),
        )
        .await;
        let path = format!("/note/{}", note["Note"]["ID"].as_str().unwrap());

        let update = |body: Value| {
            let app = app.clone();
            let path = path.clone();
            let alice_auth = alice_auth.clone();
            async move {
                let response =
                    make_request(Some(&alice_auth), app, Method::PUT, &path, body.to_string())
                        .await;
                assert_eq!(response.status(), StatusCode::OK);
                read_json(response).await["Message"].clone()
            }
        };

        // content without version appends.
        let note = update(json!({ "Content": "v2" })).await;
        assert_eq!(note["Contents"][0]["Version"], 2);

        // latest version is edited in place.
        let note = update(json!({ "Content": "v2 fixed", "Version": 2 })).await;
        assert_eq!(note["Contents"].as_array().unwrap().len(), 2);
        assert_eq!(note["Contents"][0]["Content"], "v2 fixed");

        // an older one becomes a new version.
        let note = update(json!({ "Content": "v1 revisited", "Version": 1, "Title": "Final", "Tags": ["done"] })).await;
        assert_eq!(note["Contents"][0]["Version"], 3);
        assert_eq!(note["Contents"][2]["Content"], "v1");
        assert_eq!(note["Note"]["Title"], "Final");
        assert_eq!(note["Tags"], json!(["done"]));

        let response = make_request(
            Some(&alice_auth),
            app.clone(),
            Method::PUT,
            &path,
            json!({ "Content": "nope", "Version": 9 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // public notes are readable but not editable by others.
        let response = make_request(
            Some(&login(&state, &bob).await),
            app,
            Method::PUT,
            &path,
            json!({ "Title": "Hijacked" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test(migrations = false)]
    async fn test_delete_and_tags(pool: SqlitePool) {
        let state = state(pool).await;
        let alice = create_user(&state, "alice", "pw1", false).await;
        let alice_auth = login(&state, &alice).await;
        let app = app(state.clone());

        let note = create(
            &app,
            &alice_auth,
            json!({ "Title": "Temp", "Tags": ["zeta", "alpha"] }),
        )
        .await;
        create(&app, &alice_auth, json!({ "Title": "Other", "Tags": ["alpha"] })).await;
        let path = format!("/note/{}", note["Note"]["ID"].as_str().unwrap());

        let response =
            make_request(None, app.clone(), Method::GET, "/tag", String::new()).await;
        assert_eq!(read_json(response).await["Message"], json!(["alpha", "zeta"]));

        let delete = || {
            make_request(
                Some(&alice_auth),
                app.clone(),
                Method::DELETE,
                &path,
                String::new(),
            )
        };

        assert_eq!(delete().await.status(), StatusCode::OK);
        let response =
            make_request(Some(&alice_auth), app.clone(), Method::GET, &path, String::new())
                .await;
        assert_eq!(read_json(response).await["Message"]["Note"]["Deleted"], true);

        assert_eq!(delete().await.status(), StatusCode::OK);
        assert_eq!(delete().await.status(), StatusCode::NOT_FOUND);

        let response =
            make_request(None, app, Method::GET, "/tag", String::new()).await;
        assert_eq!(read_json(response).await["Message"], json!(["alpha"]));
    }
}
