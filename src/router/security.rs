//! Login and logout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::RouteContext;
use super::auth::Credentials;
use super::response::Reply;
use crate::AppState;
use crate::error::{Result, ServerError};
use crate::token::{TokenKind, TokenRepository, UserToken};
use crate::user::{User, UserService};

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Body {
    #[validate(length(min = 1, message = "Username is required."))]
    username: String,
    #[validate(length(min = 1, message = "Password is required."))]
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Session {
    user: User,
    token: UserToken,
    /// Ready to use `Authorization` header value.
    authorization: String,
}

pub async fn login(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let body: Body = ctx.json()?;

    let user = UserService::login(
        state.db.clone(),
        Arc::clone(&state.crypto),
        &body.username,
        &body.password,
    )
    .await?;

    let token = UserToken::new(TokenKind::Login, &user.data.id, &ctx.ip)?;
    TokenRepository::new(state.db.clone())
        .insert(None, &token)
        .await?;

    tracing::info!(user_id = %user.data.id, ip = %ctx.ip, "user logged in");

    Reply::json(Session {
        authorization: Credentials::new(&token.user_id, &token.token).encode(),
        user: user.data,
        token,
    })
}

pub async fn logout(state: AppState, ctx: RouteContext) -> Result<Reply> {
    let credentials = ctx.credentials.as_ref().ok_or(ServerError::Unauthorized)?;

    let deleted = TokenRepository::new(state.db.clone())
        .delete(None, &credentials.user_id, &credentials.token)
        .await?;
    if deleted == 0 {
        return Err(ServerError::NotFound);
    }

    tracing::info!(user_id = %credentials.user_id, "user logged out");
    Ok(Reply::Empty)
}
