use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storescore_core::{
    ai_configured, Analysis, AnalysisStatus, ChatMessage, ChatRole, ChatSession, Db, Store, User,
};
use storescore_score::{assistant, ScoreError};

use super::owned_store;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub store_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub session: ChatSession,
    pub reply: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub store_id: Option<String>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn owned_session(db: &Db, user: &User, id: &str) -> ApiResult<ChatSession> {
    match db.get::<ChatSession>(id)? {
        Some(session) if session.owner_id == user.id => Ok(session),
        _ => Err(ApiError::NotFound("chat session not found".into())),
    }
}

fn latest_completed(db: &Db, store: &Store) -> ApiResult<Option<Analysis>> {
    Ok(db
        .find::<Analysis, _>(|a| a.store_id == store.id && a.status == AnalysisStatus::Completed)?
        .into_iter()
        .max_by_key(|a| a.created_at))
}

/// The stores the assistant may talk about: one when the chat is pinned to a
/// store, otherwise all of the caller's stores.
fn store_context(
    db: &Db,
    user: &User,
    store_id: Option<&str>,
) -> ApiResult<Vec<assistant::StoreContext>> {
    let mut stores = match store_id {
        Some(id) => vec![owned_store(db, user, id)?],
        None => db.find::<Store, _>(|s| s.owner_id == user.id)?,
    };
    stores.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    stores
        .into_iter()
        .map(|store| {
            let latest = latest_completed(db, &store)?;
            Ok(assistant::StoreContext { store, latest })
        })
        .collect()
}

pub async fn send(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    let settings = state.settings();
    if !ai_configured(&settings) {
        return Err(ScoreError::NotConfigured.into());
    }
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::Validation("message cannot be empty".into()));
    }

    let mut session = match req.session_id.as_deref() {
        Some(id) => owned_session(&state.db, &user, id)?,
        None => ChatSession::new(&user.id, message, req.store_id.clone()),
    };
    let store_id = req.store_id.or_else(|| session.store_id.clone());
    let context = store_context(&state.db, &user, store_id.as_deref())?;

    let reply = assistant::reply(
        state.completion.as_ref(),
        &settings,
        &context,
        &session.messages,
        message,
    )
    .await?;

    session.push(ChatMessage::new(ChatRole::User, message));
    session.push(ChatMessage::new(ChatRole::Assistant, reply.clone()));
    state.db.put(&session)?;
    Ok(Json(ChatReply { session, reply }))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    let mut sessions = state.db.find::<ChatSession, _>(|s| s.owner_id == user.id)?;
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionSummary {
                message_count: s.messages.len(),
                id: s.id,
                title: s.title,
                store_id: s.store_id,
                created_at: s.created_at,
                updated_at: s.updated_at,
            })
            .collect(),
    ))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    Ok(Json(owned_session(&state.db, &user, &id)?))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let session = owned_session(&state.db, &user, &id)?;
    state.db.delete::<ChatSession>(&session.id)?;
    Ok(StatusCode::NO_CONTENT)
}
