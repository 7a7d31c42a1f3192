//! Site information and metrics.

use serde::Serialize;

use super::RouteContext;
use super::response::Reply;
use crate::AppState;
use crate::error::{Result, ServerError};
use crate::setting::{SettingKey, SettingRepository};

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Info {
    custom_style: Option<String>,
    title: Option<String>,
}

/// Public site settings.
pub async fn info(state: AppState, _ctx: RouteContext) -> Result<Reply> {
    let settings = SettingRepository::new(state.db.clone());

    Reply::json(Info {
        custom_style: settings.get(None, SettingKey::CustomPath).await?,
        title: settings.get(None, SettingKey::SiteTitle).await?,
    })
}

/// Prometheus exposition, for administrators.
pub async fn metrics(state: AppState, ctx: RouteContext) -> Result<Reply> {
    if !ctx.user()?.is_admin {
        return Err(ServerError::Forbidden);
    }

    let handle = state.metrics.as_ref().ok_or(ServerError::NotFound)?;
    Ok(Reply::Text(handle.render()))
}
