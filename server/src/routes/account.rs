use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use storescore_core::{normalize_email, PlanState, PlanStatus, User};
use tracing::info;

use crate::auth::{hash_password, issue_token, verify_password, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub credits: i64,
    pub plan: PlanState,
    pub effective_status: PlanStatus,
    pub is_admin: bool,
}

impl UserView {
    pub fn new(user: &User, state: &AppState) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            credits: user.credits,
            plan: user.plan.clone(),
            effective_status: user.plan.effective_status(Utc::now()),
            is_admin: state.config.is_admin(&user.email),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Session {
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

fn session(user: &User, state: &AppState) -> ApiResult<Session> {
    Ok(Session {
        token: issue_token(user, &state.config.jwt_secret, state.config.token_ttl_hours)?,
        user: UserView::new(user, state),
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let email = normalize_email(&req.email);
    if !valid_email(&email) {
        return Err(ApiError::Validation("a valid email address is required".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default())
        .to_string();
    let hash = hash_password(&req.password)?;

    let _guard = state.accounts.lock().await;
    if state.db.find_one::<User, _>(|u| u.email == email)?.is_some() {
        return Err(ApiError::Conflict("an account with this email already exists".into()));
    }
    let user = User::new(&email, &name, hash);
    state.db.put(&user)?;
    info!("registered user {}", user.id);

    Ok((StatusCode::CREATED, Json(session(&user, &state)?)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<Session>> {
    let email = normalize_email(&req.email);
    let user = state.db.find_one::<User, _>(|u| u.email == email)?;
    match user {
        Some(user) if verify_password(&req.password, &user.password_hash) => {
            info!("user {} signed in", user.id);
            Ok(Json(session(&user, &state)?))
        }
        _ => Err(ApiError::Unauthorized("invalid email or password".into())),
    }
}

pub async fn me(State(state): State<Arc<AppState>>, AuthUser(user): AuthUser) -> Json<UserView> {
    Json(UserView::new(&user, &state))
}
