pub mod account;
pub mod analyses;
pub mod billing;
pub mod chat;
pub mod credits;
pub mod settings;
pub mod stores;

use axum::Json;
use serde_json::{json, Value};
use storescore_core::{Analysis, Db, Store, User};

use crate::error::{ApiError, ApiResult};

/// A store the caller owns. Someone else's store is reported as missing.
pub(crate) fn owned_store(db: &Db, user: &User, id: &str) -> ApiResult<Store> {
    match db.get::<Store>(id)? {
        Some(store) if store.owner_id == user.id => Ok(store),
        _ => Err(ApiError::NotFound("store not found".into())),
    }
}

pub(crate) fn owned_analysis(db: &Db, user: &User, id: &str) -> ApiResult<Analysis> {
    match db.get::<Analysis>(id)? {
        Some(analysis) if analysis.owner_id == user.id => Ok(analysis),
        _ => Err(ApiError::NotFound("analysis not found".into())),
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
