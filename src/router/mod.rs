//! HTTP API.
//!
//! Every request goes through [`dispatch`], mounted as the single fallback
//! of the axum router.
mod assets;
pub mod auth;
mod note;
mod password;
pub mod response;
mod security;
pub mod table;
mod user;
mod util;

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::user::User;
use auth::Credentials;
use response::{Envelope, respond};
use table::{RouteTable, handler};

/// Largest accepted request body.
const BODY_LIMIT: usize = 2 * 1024 * 1024;
const UNKNOWN_ADDRESS: &str = "unknown";

/// Everything a handler knows about its request.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub method: Method,
    /// Values captured by the route pattern.
    pub params: HashMap<String, String>,
    pub body: Bytes,
    /// Authenticated caller, if any.
    pub user: Option<User>,
    /// Credentials sent, even when they did not authenticate.
    pub credentials: Option<Credentials>,
    /// Client address.
    pub ip: String,
}

impl RouteContext {
    /// Captured path parameter. Missing or empty gives `not_found`.
    pub fn param(&self, name: &str) -> Result<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .ok_or(ServerError::NotFound)
    }

    /// Deserialize then validate the JSON body.
    pub fn json<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let body: T = serde_json::from_slice(&self.body)?;
        body.validate()?;
        Ok(body)
    }

    /// Authenticated caller, or `unauth`.
    pub fn user(&self) -> Result<&User> {
        self.user.as_ref().ok_or(ServerError::Unauthorized)
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|user| user.is_admin)
    }
}

/// Build the route table. Order matters, first match wins.
pub fn routes() -> std::result::Result<RouteTable, regex_lite::Error> {
    RouteTable::new()
        .on("/login", Method::POST, handler(security::login))?
        .on("/logout", Method::GET, handler(security::logout))?
        .on("/password/reset", Method::POST, handler(password::request))?
        .on("/password/reset", Method::PUT, handler(password::reset))?
        .on("/note/search", Method::POST, handler(note::search))?
        .on("/note", Method::POST, handler(note::create))?
        .on("/note/{id}", Method::GET, handler(note::get))?
        .on("/note/{id}", Method::PUT, handler(note::update))?
        .on("/note/{id}", Method::DELETE, handler(note::delete))?
        .on("/tag", Method::GET, handler(note::tags))?
        .on("/user", Method::GET, handler(user::current))?
        .on("/user", Method::POST, handler(user::register))?
        .on("/user/{id}", Method::GET, handler(user::get))?
        .on("/user/{id}", Method::DELETE, handler(user::delete))?
        .on("/util/info", Method::GET, handler(util::info))?
        .on("/util/metrics", Method::GET, handler(util::metrics))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

/// Route a request to its handler.
pub async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_owned());

    // a bad header only means an anonymous caller.
    let credentials = Credentials::from_headers(req.headers());
    let user = match &credentials {
        Some(credentials) => {
            match auth::authenticate(&state, credentials, &ip).await {
                Ok(user) => user,
                Err(err) => {
                    tracing::warn!(error = %err, "authentication failed");
                    None
                },
            }
        },
        None => None,
    };
    let admin = user.as_ref().is_some_and(|user| user.is_admin);

    let path = req.uri().path().to_owned();
    let Some((route, params)) = state.routes.find(&path) else {
        return assets::serve(&state, req).await;
    };
    let Some(handler) = route.handler(req.method()).cloned() else {
        return Envelope::not_found().into_response();
    };
    let pattern = route.pattern().to_owned();

    let (parts, body) = req.into_parts();
    let body = if [Method::POST, Method::PUT, Method::PATCH].contains(&parts.method)
    {
        match axum::body::to_bytes(body, BODY_LIMIT).await {
            Ok(body) => body,
            Err(err) => return respond(Err(err.into()), admin),
        }
    } else {
        Bytes::new()
    };

    let ctx = RouteContext {
        method: parts.method.clone(),
        params,
        body,
        user,
        credentials,
        ip,
    };

    let result = match AssertUnwindSafe(handler(state.clone(), ctx))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(ServerError::Panic(panic_message(panic))),
    };

    tracing::debug!(method = %parts.method, route = %pattern, "request dispatched");
    respond(result, admin)
}
