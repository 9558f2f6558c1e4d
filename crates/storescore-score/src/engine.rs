use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;

use storescore_core::{AiSettings, ChatRole};

use crate::{Completion, ScoreError, Turn};

fn map_backend(provider: &str) -> Result<LLMBackend, ScoreError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(ScoreError::Backend(format!("unknown provider: {other}"))),
    }
}

pub const PROVIDERS: [&str; 7] = [
    "openai", "anthropic", "google", "ollama", "groq", "mistral", "deepseek",
];

pub async fn generate(
    settings: &AiSettings,
    system: &str,
    turns: &[Turn],
) -> Result<String, ScoreError> {
    let backend = map_backend(&settings.provider)?;

    let mut builder = LLMBuilder::new()
        .backend(backend)
        .model(&settings.model)
        .system(system);

    if !settings.api_key.is_empty() {
        builder = builder.api_key(&settings.api_key);
    }

    let llm = builder
        .build()
        .map_err(|e| ScoreError::Backend(format!("build LLM: {e}")))?;

    let messages: Vec<ChatMessage> = turns
        .iter()
        .map(|turn| match turn.role {
            ChatRole::User => ChatMessage::user().content(&turn.content).build(),
            ChatRole::Assistant => ChatMessage::assistant().content(&turn.content).build(),
        })
        .collect();

    let response = llm
        .chat(&messages)
        .await
        .map_err(|e| ScoreError::Generation(format!("chat: {e}")))?;

    match response.text() {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(ScoreError::Generation("LLM returned empty text".to_string())),
        None => Err(ScoreError::Generation("LLM returned no text".to_string())),
    }
}

/// Production [`Completion`] backed by the `llm` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmEngine;

#[async_trait]
impl Completion for LlmEngine {
    async fn complete(
        &self,
        settings: &AiSettings,
        system: &str,
        turns: &[Turn],
    ) -> Result<String, ScoreError> {
        generate(settings, system, turns).await
    }
}
