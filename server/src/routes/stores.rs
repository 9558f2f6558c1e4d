use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use storescore_core::{Analysis, Platform, Store, StoreView};
use storescore_scrape::{canonical, normalize_url, resolve_platform};
use tracing::info;

use super::owned_store;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStore {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub shopify_access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStore {
    #[serde(default)]
    pub name: Option<String>,
    /// An empty string removes the stored token.
    #[serde(default)]
    pub shopify_access_token: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<StoreView>>> {
    let mut stores = state.db.find::<Store, _>(|s| s.owner_id == user.id)?;
    stores.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(stores.iter().map(StoreView::from).collect()))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateStore>,
) -> ApiResult<(StatusCode, Json<StoreView>)> {
    let url = normalize_url(&req.url)?;
    let explicit = match non_empty(req.platform) {
        Some(p) => Some(
            Platform::parse(&p)
                .ok_or_else(|| ApiError::Validation(format!("unknown platform '{p}'")))?,
        ),
        None => None,
    };
    let platform = resolve_platform(&url, explicit);
    let url_str = canonical(&url);
    let name = non_empty(req.name)
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| url_str.clone());

    let _guard = state.accounts.lock().await;
    let duplicate = state
        .db
        .find_one::<Store, _>(|s| s.owner_id == user.id && s.url == url_str)?;
    if duplicate.is_some() {
        return Err(ApiError::Conflict(format!("{url_str} is already in your stores")));
    }

    let mut store = Store::new(&user.id, &name, &url_str, platform);
    store.shopify_access_token = non_empty(req.shopify_access_token);
    state.db.put(&store)?;
    info!("user {} added store {} ({})", user.id, store.id, url_str);
    Ok((StatusCode::CREATED, Json(StoreView::from(&store))))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<StoreView>> {
    let store = owned_store(&state.db, &user, &id)?;
    Ok(Json(StoreView::from(&store)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateStore>,
) -> ApiResult<Json<StoreView>> {
    let mut store = owned_store(&state.db, &user, &id)?;
    if let Some(name) = req.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("store name cannot be empty".into()));
        }
        store.name = name.to_string();
    }
    if let Some(token) = req.shopify_access_token {
        store.shopify_access_token = non_empty(Some(token));
    }
    state.db.put(&store)?;
    Ok(Json(StoreView::from(&store)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let store = owned_store(&state.db, &user, &id)?;
    let analyses = state.db.find::<Analysis, _>(|a| a.store_id == store.id)?;
    for analysis in &analyses {
        state.db.delete::<Analysis>(&analysis.id)?;
    }
    state.db.delete::<Store>(&store.id)?;
    info!("deleted store {} and {} analyses", store.id, analyses.len());
    Ok(StatusCode::NO_CONTENT)
}
