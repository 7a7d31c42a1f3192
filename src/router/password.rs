//! Password reset with one-time tokens.

use std::sync::Arc;

use serde::Deserialize;
use sqlx::Connection;
use validator::Validate;

use super::RouteContext;
use super::response::Reply;
use crate::AppState;
use crate::error::{Result, ServerError};
use crate::token::{TokenKind, TokenRepository, UserToken};
use crate::user::{UserRepository, UserService};

#[derive(Debug, Validate, Deserialize)]
pub struct Request {
    #[serde(rename = "UserID")]
    #[validate(length(min = 1, message = "User ID is required."))]
    user_id: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reset {
    #[serde(rename = "UserID")]
    #[validate(length(min = 1, message = "User ID is required."))]
    user_id: String,
    #[validate(length(min = 1, message = "Token is required."))]
    token: String,
    #[validate(length(min = 1, message = "Password is required."))]
    password: String,
}

/// Issue a reset token for the caller, or for anyone when admin.
pub async fn request(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let viewer = ctx.user()?;
    let body: Request = ctx.json()?;

    if !viewer.is_admin && viewer.id != body.user_id {
        return Err(ServerError::Forbidden);
    }

    let user = UserRepository::new(state.db.clone())
        .find_by_id(None, &body.user_id)
        .await?
        .filter(|user| !user.deleted)
        .ok_or(ServerError::NotFound)?;

    let token = UserToken::new(TokenKind::PassReset, &user.id, &ctx.ip)?;
    TokenRepository::new(state.db.clone())
        .insert(None, &token)
        .await?;

    tracing::info!(user_id = %user.id, requested_by = %viewer.id, "password reset requested");
    Reply::json(token)
}

const RESET_REFUSED: &str = "This reset token is invalid or expired.";

/// Consume a reset token and set the new password.
///
/// The token is only spent when the new password is stored.
pub async fn reset(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let body: Reset = ctx.json()?;
    let tokens = TokenRepository::new(state.db.clone());

    let token = tokens
        .find(None, &body.user_id, &body.token)
        .await?
        .filter(|token| token.kind == TokenKind::PassReset)
        .ok_or_else(|| ServerError::Unauthorized.context(RESET_REFUSED))?;

    let user = UserRepository::new(state.db.clone())
        .find_by_id(None, &body.user_id)
        .await?
        .filter(|user| !user.deleted)
        .ok_or(ServerError::NotFound)?;
    let mut user = UserService::new(user, state.db.clone(), Arc::clone(&state.crypto));

    let mut conn = state.db.scoped(None).await?;
    let mut tx = conn.begin().await?;
    if !token.validate(&tokens, Some(&mut *tx), false).await? {
        // keeps the removal of an expired token.
        tx.commit().await?;
        return Err(ServerError::Unauthorized.context(RESET_REFUSED));
    }
    user.change_password(&mut tx, &body.password, &tokens).await?;
    tx.commit().await?;

    Ok(Reply::Empty)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use sqlx::SqlitePool;

    use sqlx::Connection;

    use crate::tests::{create_user, login, read_json, state};
    use crate::token::{TokenKind, TokenRepository, UserToken};
    use crate::user::UserRepository;
    use crate::{app, make_request};

    #[sqlx::test(migrations = false)]
    async fn test_password_reset(pool: SqlitePool) {
        let state = state(pool).await;
        let alice = create_user(&state, "alice", "pw1", false).await;
        let authorization = login(&state, &alice).await;
        let app = app(state.clone());

        let response = make_request(
            Some(&authorization),
            app.clone(),
            Method::POST,
            "/password/reset",
            json!({ "UserID": alice.data.id }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["Message"]["Type"], "passreset");
        let token = body["Message"]["Token"].as_str().unwrap().to_owned();

        let reset = json!({
            "UserID": alice.data.id,
            "Token": token,
            "Password": "new password",
        })
        .to_string();
        let response =
            make_request(None, app.clone(), Method::PUT, "/password/reset", reset.clone())
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        // login tokens were revoked, the reset token is spent.
        let tokens = TokenRepository::new(state.db.clone());
        assert!(tokens.for_user(None, &alice.data.id).await.unwrap().is_empty());
        let response =
            make_request(None, app.clone(), Method::PUT, "/password/reset", reset).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            None,
            app,
            Method::POST,
            "/login",
            json!({ "Username": "alice", "Password": "new password" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[sqlx::test(migrations = false)]
    async fn test_reset_for_someone_else(pool: SqlitePool) {
        let state = state(pool).await;
        let alice = create_user(&state, "alice", "pw1", false).await;
        let bob = create_user(&state, "bob", "pw2", false).await;
        let root = create_user(&state, "root", "pw3", true).await;
        let app = app(state.clone());

        let body = json!({ "UserID": bob.data.id }).to_string();
        let response = make_request(
            Some(&login(&state, &alice).await),
            app.clone(),
            Method::POST,
            "/password/reset",
            body.clone(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            Some(&login(&state, &root).await),
            app.clone(),
            Method::POST,
            "/password/reset",
            body.clone(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response =
            make_request(None, app, Method::POST, "/password/reset", body).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test(migrations = false)]
    async fn test_failed_reset_keeps_token(pool: SqlitePool) {
        let state = state(pool).await;
        let alice = create_user(&state, "alice", "pw1", false).await;
        let tokens = TokenRepository::new(state.db.clone());
        let token = UserToken::new(TokenKind::PassReset, &alice.data.id, "127.0.0.1").unwrap();
        tokens.insert(None, &token).await.unwrap();

        // consumed inside a transaction that never commits.
        let mut conn = state.db.scoped(None).await.unwrap();
        let mut tx = conn.begin().await.unwrap();
        assert!(token.validate(&tokens, Some(&mut *tx), false).await.unwrap());
        tx.rollback().await.unwrap();
        drop(conn);
        assert!(tokens.find(None, &alice.data.id, &token.token).await.unwrap().is_some());

        // the account disappears before the reset.
        UserRepository::new(state.db.clone())
            .delete(None, &alice.data.id)
            .await
            .unwrap();
        let reset = json!({
            "UserID": alice.data.id,
            "Token": token.token,
            "Password": "new password",
        })
        .to_string();
        let response =
            make_request(None, app(state.clone()), Method::PUT, "/password/reset", reset)
                .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(tokens.find(None, &alice.data.id, &token.token).await.unwrap().is_some());

        let wrong = json!({
            "UserID": alice.data.id,
            "Token": "nope",
            "Password": "new password",
        })
        .to_string();
        let response =
            make_request(None, app(state), Method::PUT, "/password/reset", wrong).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["Error"]["friendly"], "This reset token is invalid or expired.");
    }
}
