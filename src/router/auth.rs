//! `Authorization: Token <base64("userID:token")>` handling.

use axum::http::{HeaderMap, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::AppState;
use crate::error::Result;
use crate::token::{TokenKind, TokenRepository};
use crate::user::{User, UserRepository};

const SCHEME: &str = "Token";

/// Decoded credentials of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub token: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }

    /// Decode a header value. Anything malformed gives `None`.
    pub fn decode(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if scheme != SCHEME {
            return None;
        }

        let raw = STANDARD.decode(encoded.trim()).ok()?;
        let raw = String::from_utf8(raw).ok()?;
        let (user_id, token) = raw.split_once(':')?;
        if user_id.is_empty() || token.is_empty() {
            return None;
        }

        Some(Self::new(user_id, token))
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(Self::decode)
    }

    /// Header value carrying these credentials.
    pub fn encode(&self) -> String {
        let raw = format!("{}:{}", self.user_id, self.token);
        format!("{SCHEME} {}", STANDARD.encode(raw))
    }
}

/// Resolve the user behind `credentials`.
///
/// Only unexpired login tokens of active users authenticate. A successful
/// authentication refreshes the token with the client address.
pub async fn authenticate(
    state: &AppState,
    credentials: &Credentials,
    ip: &str,
) -> Result<Option<User>> {
    let tokens = TokenRepository::new(state.db.clone());

    {
        let _lock = state.tokens.lock().await;

        let Some(mut token) = tokens
            .find(None, &credentials.user_id, &credentials.token)
            .await?
        else {
            return Ok(None);
        };
        if token.kind != TokenKind::Login
            || !token.validate(&tokens, None, false).await?
            || !tokens.refresh(None, &mut token, ip).await?
        {
            return Ok(None);
        }
    }

    let user = UserRepository::new(state.db.clone())
        .find_by_id(None, &credentials.user_id)
        .await?;

    Ok(user.filter(|user| !user.deleted))
}
