use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use storescore_core::{ai_configured, AiSettings};
use storescore_score::engine::PROVIDERS;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// AI settings as shown to clients. The key itself never leaves the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettingsView {
    pub provider: String,
    pub model: String,
    pub has_key: bool,
    pub configured: bool,
}

impl From<&AiSettings> for AiSettingsView {
    fn from(s: &AiSettings) -> Self {
        Self {
            provider: s.provider.clone(),
            model: s.model.clone(),
            has_key: !s.api_key.is_empty(),
            configured: ai_configured(s),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAiSettings {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
}

pub async fn get_ai(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
) -> Json<AiSettingsView> {
    Json(AiSettingsView::from(&state.settings()))
}

pub async fn put_ai(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<SaveAiSettings>,
) -> ApiResult<Json<AiSettingsView>> {
    if !state.config.is_admin(&user.email) {
        return Err(ApiError::Forbidden("only administrators can change AI settings".into()));
    }
    let provider = req.provider.trim().to_lowercase();
    if !PROVIDERS.contains(&provider.as_str()) {
        return Err(ApiError::Validation(format!(
            "unknown provider '{}', expected one of: {}",
            provider,
            PROVIDERS.join(", ")
        )));
    }
    let model = req.model.trim();
    if model.is_empty() {
        return Err(ApiError::Validation("model is required".into()));
    }

    let mut settings = state.settings();
    settings.provider = provider;
    settings.model = model.to_string();
    let key = req.api_key.trim();
    if !key.is_empty() {
        settings.api_key = key.to_string();
    }
    state.set_settings(settings.clone())?;
    info!("user {} set AI provider {} / {}", user.id, settings.provider, settings.model);
    Ok(Json(AiSettingsView::from(&settings)))
}
