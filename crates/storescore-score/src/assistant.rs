//! Store-aware chat assistant. Conversations are grounded in the caller's
//! stores and their most recent completed analysis.

use storescore_core::rubric::rubric;
use storescore_core::{ai_configured, AiSettings, Analysis, ChatMessage, ChatRole, Store};
use tracing::info;

use crate::{Completion, ScoreError, Turn};

/// Older turns beyond this are dropped from the prompt.
pub const MAX_HISTORY_TURNS: usize = 20;

#[derive(Debug, Clone)]
pub struct StoreContext {
    pub store: Store,
    pub latest: Option<Analysis>,
}

pub fn system_prompt(context: &[StoreContext]) -> String {
    let mut out = String::from(
        "You are StoreScore's assistant. You help merchants understand their storefront \
scores and decide what to improve next. Be concrete and brief. Refer to the scores below \
when they are relevant and never invent numbers that are not listed.\n\n## Rubric\n",
    );
    out.push_str(&rubric());
    out.push_str("\n\n## Stores\n");

    if context.is_empty() {
        out.push_str("The user has not added any stores yet. Suggest adding one and running an analysis.\n");
        return out;
    }

    for ctx in context {
        let store = &ctx.store;
        out.push_str(&format!(
            "- \"{}\" ({}) {}\n",
            store.name,
            store.platform.as_str(),
            store.url
        ));
        let Some(a) = &ctx.latest else {
            out.push_str("  not analyzed yet\n");
            continue;
        };
        let overall = a.overall_score.map(|s| s.to_string()).unwrap_or_else(|| "?".into());
        let grade = a.grade.map(|g| g.as_str()).unwrap_or("?");
        out.push_str(&format!(
            "  latest analysis {}: overall {} (grade {})\n",
            a.created_at.format("%Y-%m-%d"),
            overall,
            grade
        ));
        if !a.summary.is_empty() {
            out.push_str("  summary: ");
            out.push_str(&a.summary);
            out.push('\n');
        }
        for c in &a.categories {
            out.push_str(&format!("  {}: {}", c.category.label(), c.score));
            if let Some(first) = c.recommendations.first() {
                out.push_str(" | top fix: ");
                out.push_str(first);
            }
            out.push('\n');
        }
    }
    out
}

/// Answer `message` given prior `history` (oldest first).
pub async fn reply(
    completion: &dyn Completion,
    settings: &AiSettings,
    context: &[StoreContext],
    history: &[ChatMessage],
    message: &str,
) -> Result<String, ScoreError> {
    if !ai_configured(settings) {
        return Err(ScoreError::NotConfigured);
    }
    let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);
    let mut turns: Vec<Turn> = history[skip..]
        .iter()
        .map(|m| match m.role {
            ChatRole::User => Turn::user(m.content.clone()),
            ChatRole::Assistant => Turn::assistant(m.content.clone()),
        })
        .collect();
    turns.push(Turn::user(message));

    info!(
        "chat turn with {} stores in context, {} prior messages",
        context.len(),
        turns.len() - 1
    );
    let raw = completion
        .complete(settings, &system_prompt(context), &turns)
        .await?;
    Ok(raw.trim().to_string())
}
