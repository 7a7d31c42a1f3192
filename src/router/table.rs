//! Ordered route table.
//!
//! Patterns such as `/note/{id}` are compiled once into anchored regular
//! expressions where every `{name}` matches one path segment. Routes are
//! tried in insertion order and the first structural match wins, whatever
//! the request method.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use futures::FutureExt;
use futures::future::BoxFuture;
use regex_lite::Regex;

use super::RouteContext;
use super::response::Reply;
use crate::AppState;
use crate::error::Result;

/// Type-erased route handler.
pub type Handler =
    Arc<dyn Fn(AppState, RouteContext) -> BoxFuture<'static, Result<Reply>> + Send + Sync>;

/// Box an async function into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(AppState, RouteContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply>> + Send + 'static,
{
    Arc::new(move |state, ctx| f(state, ctx).boxed())
}

pub struct Route {
    pattern: String,
    regex: Regex,
    params: Vec<String>,
    handlers: HashMap<Method, Handler>,
}

impl Route {
    fn new(pattern: &str) -> std::result::Result<Self, regex_lite::Error> {
        let (regex, params) = compile(pattern)?;
        Ok(Self {
            pattern: pattern.to_owned(),
            regex,
            params,
            handlers: HashMap::new(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler(&self, method: &Method) -> Option<&Handler> {
        self.handlers.get(method)
    }

    /// Captured values by placeholder name, if `path` matches.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        Some(
            self.params
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    captures
                        .get(i + 1)
                        .map(|value| (name.clone(), value.as_str().to_owned()))
                })
                .collect(),
        )
    }
}

/// Turn `/note/{id}` into `^/note/([^/]*)$` and `["id"]`.
fn compile(pattern: &str) -> std::result::Result<(Regex, Vec<String>), regex_lite::Error> {
    let placeholder = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}")?;

    let mut expression = String::from("^");
    let mut params = Vec::new();
    let mut last = 0;
    for captures in placeholder.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        expression.push_str(&regex_lite::escape(&pattern[last..whole.start()]));
        expression.push_str("([^/]*)");
        params.push(name.as_str().to_owned());
        last = whole.end();
    }
    expression.push_str(&regex_lite::escape(&pattern[last..]));
    expression.push('$');

    Ok((Regex::new(&expression)?, params))
}

#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` on `pattern`.
    ///
    /// A pattern seen before keeps its original position.
    pub fn on(
        mut self,
        pattern: &str,
        method: Method,
        handler: Handler,
    ) -> std::result::Result<Self, regex_lite::Error> {
        let index = match self.routes.iter().position(|r| r.pattern == pattern) {
            Some(index) => index,
            None => {
                self.routes.push(Route::new(pattern)?);
                self.routes.len() - 1
            },
        };
        self.routes[index].handlers.insert(method, handler);

        Ok(self)
    }

    /// First route matching `path`, with its captured parameters.
    pub fn find(&self, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        self.routes
            .iter()
            .find_map(|route| route.matches(path).map(|params| (route, params)))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_: AppState, _: RouteContext) -> Result<Reply> {
        Ok(Reply::Empty)
    }

    fn table() -> RouteTable {
        RouteTable::new()
            .on("/note/search", Method::POST, handler(noop))
            .unwrap()
            .on("/note/{id}", Method::GET, handler(noop))
            .unwrap()
            .on("/note/{id}", Method::DELETE, handler(noop))
            .unwrap()
            .on("/user/{id}/token/{token}", Method::GET, handler(noop))
            .unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let table = table();
        assert_eq!(table.len(), 3);

        let (route, params) = table.find("/note/search").unwrap();
        assert_eq!(route.pattern(), "/note/search");
        assert!(params.is_empty());
        assert!(route.handler(&Method::GET).is_none());

        let (route, params) = table.find("/note/1234").unwrap();
        assert_eq!(route.pattern(), "/note/{id}");
        assert_eq!(params.get("id").map(String::as_str), Some("1234"));
        assert!(route.handler(&Method::DELETE).is_some());
    }

    #[test]
    fn test_anchored_segments() {
        let table = table();
        assert!(table.find("/note/1/extra").is_none());
        assert!(table.find("/api/note/1").is_none());
        assert!(table.find("/index.html").is_none());

        let (_, params) = table.find("/note/").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some(""));

        let (_, params) = table.find("/user/u1/token/t.2").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("u1"));
        assert_eq!(params.get("token").map(String::as_str), Some("t.2"));
    }

    #[test]
    fn test_literal_parts_escaped() {
        let table = RouteTable::new()
            .on("/status.json", Method::GET, handler(noop))
            .unwrap();
        assert!(table.find("/status.json").is_some());
        assert!(table.find("/statusxjson").is_none());
    }
}
