//! Front-end files served for every path no route matches.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tower::util::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

use super::response::Envelope;
use crate::AppState;

const INDEX: &str = "index.html";

/// Serve `req` from the public directory.
///
/// Paths whose last segment has an extension are files, anything else gets
/// the index page. Traversal outside the directory is refused by `ServeDir`.
pub async fn serve(state: &AppState, req: Request) -> Response {
    let public_dir = &state.config.public_dir;
    let is_file = req
        .uri()
        .path()
        .rsplit('/')
        .next()
        .is_some_and(|segment| segment.contains('.'));

    let response = if is_file {
        ServeDir::new(public_dir).oneshot(req).await
    } else {
        ServeFile::new(public_dir.join(INDEX)).oneshot(req).await
    };

    match response {
        Ok(response) if response.status() == StatusCode::NOT_FOUND => {
            tracing::debug!(dir = %public_dir.display(), "static file unavailable");
            Envelope::not_found().into_response()
        },
        Ok(response) => response.map(axum::body::Body::new),
        Err(err) => match err {},
    }
}
