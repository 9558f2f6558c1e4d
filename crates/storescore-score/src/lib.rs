pub mod assistant;
pub mod engine;
mod parse;
mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storescore_core::{ai_configured, AiSettings, CategoryScore, ChatRole, Grade};
use storescore_scrape::PageSnapshot;
use thiserror::Error;
use tracing::{debug, info};

pub use engine::LlmEngine;
pub use parse::parse_scorecard;
pub use prompt::{response_schema, serialize_snapshot};

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("AI provider is not configured")]
    NotConfigured,

    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    Generation(String),

    #[error("model response rejected: {0}")]
    InvalidShape(String),
}

/// One conversational turn handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: ChatRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Seam between the scoring pipeline and whatever produces model text.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(
        &self,
        settings: &AiSettings,
        system: &str,
        turns: &[Turn],
    ) -> Result<String, ScoreError>;
}

/// Validated model verdict. Holds every category exactly once, in rubric order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scorecard {
    pub summary: String,
    pub overall: u8,
    pub categories: Vec<CategoryScore>,
}

impl Scorecard {
    pub fn grade(&self) -> Grade {
        Grade::from_score(self.overall)
    }
}

/// Score a scraped storefront. Unlike chat, failures surface as errors so
/// the caller can refund the run.
pub async fn score_snapshot(
    completion: &dyn Completion,
    settings: &AiSettings,
    store_name: &str,
    snapshot: &PageSnapshot,
) -> Result<Scorecard, ScoreError> {
    if !ai_configured(settings) {
        return Err(ScoreError::NotConfigured);
    }
    let system = prompt::system_prompt();
    let user_msg = prompt::user_message(store_name, snapshot);

    info!(
        "scoring {} with {} ({}), prompt {} chars",
        snapshot.url,
        settings.provider,
        settings.model,
        user_msg.len()
    );

    let raw = completion
        .complete(settings, &system, &[Turn::user(user_msg)])
        .await?;
    debug!("raw model output:\n{}", raw);

    let card = parse::parse_scorecard(&raw)?;
    info!(
        "parsed {} categories for {}, overall {}",
        card.categories.len(),
        snapshot.url,
        card.overall
    );
    Ok(card)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Returns queued replies in order and records what it was asked.
    #[derive(Default)]
    pub struct ScriptedCompletion {
        pub replies: Mutex<Vec<Result<String, ScoreError>>>,
        pub calls: Mutex<Vec<(String, Vec<Turn>)>>,
    }

    impl ScriptedCompletion {
        pub fn replying(reply: &str) -> Self {
            let s = Self::default();
            s.replies.lock().unwrap().push(Ok(reply.to_string()));
            s
        }
    }

    #[async_trait]
    impl Completion for ScriptedCompletion {
        async fn complete(
            &self,
            _settings: &AiSettings,
            system: &str,
            turns: &[Turn],
        ) -> Result<String, ScoreError> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), turns.to_vec()));
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ScoreError::Generation("no scripted reply".into()));
            }
            replies.remove(0)
        }
    }

    pub fn settings() -> AiSettings {
        AiSettings {
            provider: "openai".into(),
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
        }
    }
}
