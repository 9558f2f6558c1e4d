use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use storescore_core::CreditEntry;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CreditsView {
    pub balance: i64,
    pub entries: Vec<CreditEntry>,
}

pub async fn ledger(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<CreditsView>> {
    let mut entries = state.db.find::<CreditEntry, _>(|e| e.user_id == user.id)?;
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(CreditsView {
        balance: user.credits,
        entries,
    }))
}
