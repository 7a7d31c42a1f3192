//! Accounts.

use std::sync::Arc;

use serde::Deserialize;
use sqlx::Connection;
use validator::Validate;

use super::RouteContext;
use super::response::Reply;
use crate::AppState;
use crate::error::{Result, ServerError};
use crate::token::TokenRepository;
use crate::user::{UserBuilder, UserRepository, UserService};

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Registration {
    #[validate(length(
        min = 1,
        max = 64,
        message = "Username must be between 1 and 64 characters."
    ))]
    username: String,
    #[validate(length(min = 1, message = "Password is required."))]
    password: String,
    #[validate(email(message = "Email must be formatted."))]
    email: Option<String>,
    /// Only honored when an administrator registers the account.
    #[serde(default)]
    is_admin: bool,
}

pub async fn register(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let admin = ctx.is_admin();
    if !state.config.registration && !admin {
        return Err(ServerError::Forbidden);
    }
    let body: Registration = ctx.json()?;

    let user = UserBuilder::new()
        .username(body.username)
        .password(body.password)
        .email(body.email)
        .admin(admin && body.is_admin)
        .build(state.db.clone(), Arc::clone(&state.crypto))
        .create_user()
        .await?;

    Reply::json(user.data)
}

/// Caller's own account.
pub async fn current(_state: AppState, ctx: RouteContext) -> Result<Reply> {
    Reply::json(ctx.user()?)
}

pub async fn get(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let user = UserRepository::new(state.db.clone())
        .find_by_id(None, ctx.param("id")?)
        .await?
        .filter(|user| !user.deleted || ctx.is_admin())
        .ok_or(ServerError::NotFound)?;

    Reply::json(user.view_for(ctx.user.as_ref()))
}

/// Soft delete an account and revoke its tokens.
pub async fn delete(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let viewer = ctx.user()?;
    let id = ctx.param("id")?;
    if !viewer.is_admin && viewer.id != id {
        return Err(ServerError::Forbidden);
    }

    let user = UserRepository::new(state.db.clone())
        .find_by_id(None, id)
        .await?
        .filter(|user| !user.deleted)
        .ok_or(ServerError::NotFound)?;

    let mut conn = state.db.scoped(None).await?;
    let mut tx = conn.begin().await?;
    UserService::new(user, state.db.clone(), Arc::clone(&state.crypto))
        .delete(&mut tx, &TokenRepository::new(state.db.clone()))
        .await?;
    tx.commit().await?;

    Ok(Reply::Empty)
}
