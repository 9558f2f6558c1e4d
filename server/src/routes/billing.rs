use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use storescore_core::{credits, CreditReason, PlanState, PlanStatus, User};
use tracing::{info, warn};

use super::account::UserView;
use crate::auth::AuthUser;
use crate::billing::{apply_event, verify_signature, EventOutcome, StripeEvent};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingView {
    pub plan: PlanState,
    pub effective_status: PlanStatus,
    pub trial_days_remaining: Option<i64>,
    pub credits: i64,
    pub checkout_available: bool,
}

pub async fn overview(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Json<BillingView> {
    let now = Utc::now();
    Json(BillingView {
        effective_status: user.plan.effective_status(now),
        trial_days_remaining: user.plan.trial_days_remaining(now),
        credits: user.credits,
        checkout_available: state.payments.is_some(),
        plan: user.plan,
    })
}

pub async fn start_trial(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<UserView>> {
    let _guard = state.accounts.lock().await;
    let mut user = state.db.require::<User>(&user.id)?;
    user.plan.start_trial(Utc::now(), state.config.trial_days)?;
    let entry = if state.config.trial_credits > 0 {
        Some(credits::grant(
            &mut user,
            state.config.trial_credits,
            CreditReason::TrialGrant,
            None,
        )?)
    } else {
        None
    };
    credits::commit(&state.db, &user, entry.as_ref())?;
    info!(
        "user {} started a {}-day trial with {} credits",
        user.id, state.config.trial_days, state.config.trial_credits
    );
    Ok(Json(UserView::new(&user, &state)))
}

pub async fn checkout(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Value>> {
    let payments = state
        .payments
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("billing is not configured".into()))?;
    let base = &state.config.public_url;
    let session = payments
        .create_checkout(
            &user,
            &format!("{base}/billing?status=success"),
            &format!("{base}/billing?status=cancel"),
        )
        .await?;
    Ok(Json(json!({ "id": session.id, "url": session.url })))
}

/// Stripe calls this with the raw event body. The signature covers the exact
/// bytes, so the body must not be parsed before verification.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::Unavailable("webhooks are not configured".into()))?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing Stripe-Signature header".into()))?;
    if let Err(e) = verify_signature(&body, signature, secret, Utc::now().timestamp()) {
        warn!("rejected webhook: {e}");
        return Err(e.into());
    }

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed event: {e}")))?;

    let _guard = state.accounts.lock().await;
    let outcome = apply_event(&state.db, &state.config, &event)?;
    Ok(Json(json!({
        "received": true,
        "duplicate": outcome == EventOutcome::Duplicate,
    })))
}
