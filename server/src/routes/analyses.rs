//! Analysis runs: charge, scrape, score, and record.
//!
//! Credits are taken before any network work and given back when the run
//! fails, so a failed analysis never costs the merchant anything.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use storescore_core::{
    ai_configured, credits, AiSettings, Analysis, AnalysisStatus, Store, User,
};
use storescore_score::{score_snapshot, ScoreError, Scorecard};
use storescore_scrape::{normalize_url, scrape, PageSnapshot};
use tracing::{info, warn};

use super::{owned_analysis, owned_store};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn run(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(store_id): Path<String>,
) -> ApiResult<(StatusCode, Json<Analysis>)> {
    let store = owned_store(&state.db, &user, &store_id)?;
    let settings = state.settings();
    if !ai_configured(&settings) {
        return Err(ScoreError::NotConfigured.into());
    }

    let mut analysis = charge(&state, &user.id, &store, &settings).await?;

    match pipeline(&state, &store, &settings).await {
        Ok((snapshot, card)) => {
            analysis.snapshot_title = snapshot.title.clone();
            analysis.product_count = snapshot.products.len();
            analysis.complete(card.summary, card.categories);
            state.db.put(&analysis)?;
            record_on_store(&state, &analysis)?;
            info!(
                "analysis {} for store {} completed: {} ({:?})",
                analysis.id, store.id, card.overall, analysis.grade
            );
            Ok((StatusCode::CREATED, Json(analysis)))
        }
        Err(message) => {
            warn!("analysis {} for store {} failed: {}", analysis.id, store.id, message);
            analysis.fail(message.clone());
            refund(&state, &user.id, &mut analysis).await?;
            state.db.put(&analysis)?;
            Err(ApiError::Upstream(message))
        }
    }
}

/// Check the plan, take the credits, and persist the pending run.
async fn charge(
    state: &AppState,
    user_id: &str,
    store: &Store,
    settings: &AiSettings,
) -> ApiResult<Analysis> {
    let _guard = state.accounts.lock().await;
    let mut user = state.db.require::<User>(user_id)?;
    if !user.plan.can_analyze(Utc::now()) {
        return Err(ApiError::PaymentRequired(
            "an active trial or subscription is required to run analyses".into(),
        ));
    }

    let cost = state.config.analysis_cost;
    let analysis = Analysis::pending(store, settings, cost.max(0));
    if cost > 0 {
        let entry = credits::debit(&mut user, cost, Some(analysis.id.clone()))?;
        credits::commit(&state.db, &user, Some(&entry))?;
        info!("debited {} credits from {} for analysis {}", cost, user.id, analysis.id);
    }
    state.db.put(&analysis)?;
    Ok(analysis)
}

async fn refund(state: &AppState, user_id: &str, analysis: &mut Analysis) -> ApiResult<()> {
    if analysis.credits_charged <= 0 {
        return Ok(());
    }
    let _guard = state.accounts.lock().await;
    let mut user = state.db.require::<User>(user_id)?;
    let entry = credits::refund(&mut user, analysis.credits_charged, Some(analysis.id.clone()))?;
    credits::commit(&state.db, &user, Some(&entry))?;
    info!(
        "refunded {} credits to {} for failed analysis {}",
        analysis.credits_charged, user.id, analysis.id
    );
    analysis.credits_charged = 0;
    Ok(())
}

async fn pipeline(
    state: &AppState,
    store: &Store,
    settings: &AiSettings,
) -> Result<(PageSnapshot, Scorecard), String> {
    let url = normalize_url(&store.url).map_err(|e| e.to_string())?;
    let snapshot = scrape(
        state.fetcher.as_ref(),
        &url,
        store.platform,
        store.shopify_access_token.as_deref(),
    )
    .await
    .map_err(|e| e.to_string())?;
    let card = score_snapshot(state.completion.as_ref(), settings, &store.name, &snapshot)
        .await
        .map_err(|e| e.to_string())?;
    Ok((snapshot, card))
}

/// Mirror the latest completed analysis onto its store.
fn record_on_store(state: &AppState, analysis: &Analysis) -> ApiResult<()> {
    // The store may have been deleted while the run was in flight.
    if let Some(mut store) = state.db.get::<Store>(&analysis.store_id)? {
        store.last_score = analysis.overall_score;
        store.last_grade = analysis.grade;
        store.last_analyzed_at = analysis.completed_at;
        state.db.put(&store)?;
    }
    Ok(())
}

fn newest_first(mut analyses: Vec<Analysis>) -> Vec<Analysis> {
    analyses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    analyses
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(store_id): Path<String>,
) -> ApiResult<Json<Vec<Analysis>>> {
    let store = owned_store(&state.db, &user, &store_id)?;
    let analyses = state.db.find::<Analysis, _>(|a| a.store_id == store.id)?;
    Ok(Json(newest_first(analyses)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Analysis>> {
    Ok(Json(owned_analysis(&state.db, &user, &id)?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let analysis = owned_analysis(&state.db, &user, &id)?;
    state.db.delete::<Analysis>(&analysis.id)?;

    if let Some(mut store) = state.db.get::<Store>(&analysis.store_id)? {
        let latest = newest_first(state.db.find::<Analysis, _>(|a| {
            a.store_id == store.id && a.status == AnalysisStatus::Completed
        })?)
        .into_iter()
        .next();
        store.last_score = latest.as_ref().and_then(|a| a.overall_score);
        store.last_grade = latest.as_ref().and_then(|a| a.grade);
        store.last_analyzed_at = latest.as_ref().and_then(|a| a.completed_at);
        state.db.put(&store)?;
    }
    Ok(StatusCode::NO_CONTENT)
}
