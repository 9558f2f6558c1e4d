pub mod credits;
pub mod db;
pub mod plan;
pub mod rubric;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use db::{Db, Record};
pub use plan::{PlanState, PlanStatus};
pub use rubric::{overall_score, Category, Grade};

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{collection} '{id}' not found")]
    NotFound { collection: &'static str, id: String },

    #[error("invalid record id '{0}'")]
    InvalidId(String),

    #[error("{0}")]
    Conflict(String),

    #[error("insufficient credits: need {needed}, have {available}")]
    InsufficientCredits { needed: i64, available: i64 },

    #[error("invalid credit amount {0}")]
    InvalidAmount(i64),

    #[error("invalid plan transition: {0}")]
    InvalidTransition(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fresh random record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// --- Types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Platform {
    Shopify,
    Ebay,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Shopify => "shopify",
            Platform::Ebay => "ebay",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shopify" => Some(Platform::Shopify),
            "ebay" => Some(Platform::Ebay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub password_hash: String,
    #[serde(default)]
    pub credits: i64,
    #[serde(default)]
    pub plan: PlanState,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, name: &str, password_hash: String) -> Self {
        Self {
            id: new_id(),
            email: normalize_email(email),
            name: name.trim().to_string(),
            password_hash,
            credits: 0,
            plan: PlanState::default(),
            created_at: Utc::now(),
        }
    }
}

/// Lower-cased, trimmed form used for lookups and uniqueness.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub url: String,
    pub platform: Platform,
    /// Shopify Admin API token. Stays in storage, never leaves through the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopify_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_grade: Option<Grade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn new(owner_id: &str, name: &str, url: &str, platform: Platform) -> Self {
        Self {
            id: new_id(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            platform,
            shopify_access_token: None,
            last_score: None,
            last_grade: None,
            last_analyzed_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Outward-facing store. Reports whether an Admin API token is set without
/// ever carrying it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreView {
    pub id: String,
    pub name: String,
    pub url: String,
    pub platform: Platform,
    pub has_admin_token: bool,
    pub last_score: Option<u8>,
    pub last_grade: Option<Grade>,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Store> for StoreView {
    fn from(store: &Store) -> Self {
        Self {
            id: store.id.clone(),
            name: store.name.clone(),
            url: store.url.clone(),
            platform: store.platform,
            has_admin_token: store
                .shopify_access_token
                .as_deref()
                .is_some_and(|t| !t.is_empty()),
            last_score: store.last_score,
            last_grade: store.last_grade,
            last_analyzed_at: store.last_analyzed_at,
            created_at: store.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScore {
    pub category: Category,
    pub score: u8,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: String,
    pub store_id: String,
    pub owner_id: String,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<Grade>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub categories: Vec<CategoryScore>,
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_title: Option<String>,
    #[serde(default)]
    pub product_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub credits_charged: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Analysis {
    pub fn pending(store: &Store, settings: &AiSettings, credits_charged: i64) -> Self {
        Self {
            id: new_id(),
            store_id: store.id.clone(),
            owner_id: store.owner_id.clone(),
            status: AnalysisStatus::Pending,
            overall_score: None,
            grade: None,
            summary: String::new(),
            categories: Vec::new(),
            provider: settings.provider.clone(),
            model: settings.model.clone(),
            snapshot_title: None,
            product_count: 0,
            error: None,
            credits_charged,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record a successful scoring run. Overall score and grade are derived
    /// from the category scores, never taken from the caller.
    pub fn complete(&mut self, summary: String, categories: Vec<CategoryScore>) {
        let overall = overall_score(&categories);
        self.status = AnalysisStatus::Completed;
        self.overall_score = Some(overall);
        self.grade = Some(Grade::from_score(overall));
        self.summary = summary;
        self.categories = categories;
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = AnalysisStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn category(&self, category: Category) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const CHAT_TITLE_CHARS: usize = 60;

impl ChatSession {
    /// Start a session titled after the opening message.
    pub fn new(owner_id: &str, first_message: &str, store_id: Option<String>) -> Self {
        let now = Utc::now();
        let title: String = first_message.trim().chars().take(CHAT_TITLE_CHARS).collect();
        Self {
            id: new_id(),
            owner_id: owner_id.to_string(),
            title,
            store_id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.updated_at = message.created_at;
        self.messages.push(message);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CreditReason {
    TrialGrant,
    SubscriptionGrant,
    AnalysisDebit,
    AnalysisRefund,
    Adjustment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditEntry {
    pub id: String,
    pub user_id: String,
    pub delta: i64,
    pub reason: CreditReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// A processed Stripe webhook event, kept so redeliveries are no-ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub id: String,
    pub kind: String,
    pub received_at: DateTime<Utc>,
}

// --- Storage location ---

/// Resolve the data directory: `$STORESCORE_DATA_DIR`, else `~/.storescore/`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("STORESCORE_DATA_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".storescore")
}

// --- AI Settings ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
}

fn settings_path(dir: &Path) -> PathBuf {
    dir.join("settings.json")
}

pub fn read_settings(dir: &Path) -> AiSettings {
    let path = settings_path(dir);
    if !path.exists() {
        return AiSettings::default();
    }
    fs::read_to_string(&path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn write_settings(dir: &Path, settings: &AiSettings) -> Result<()> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(settings_path(dir), json)?;
    Ok(())
}

pub fn ai_configured(settings: &AiSettings) -> bool {
    !settings.provider.is_empty()
        && !settings.model.is_empty()
        && (settings.provider == "ollama" || !settings.api_key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AiSettings {
        AiSettings {
            provider: "openai".into(),
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
        }
    }

    #[test]
    fn ollama_needs_no_key() {
        let mut s = configured();
        s.api_key.clear();
        assert!(!ai_configured(&s));
        s.provider = "ollama".into();
        assert!(ai_configured(&s));
        s.model.clear();
        assert!(!ai_configured(&s));
    }

    #[test]
    fn settings_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_settings(dir.path()), AiSettings::default());
        write_settings(dir.path(), &configured()).unwrap();
        assert_eq!(read_settings(dir.path()), configured());
    }

    #[test]
    fn chat_title_is_truncated() {
        let long = format!("{}{}", "é".repeat(CHAT_TITLE_CHARS), "tail");
        let session = ChatSession::new("u1", &long, None);
        assert_eq!(session.title, "é".repeat(CHAT_TITLE_CHARS));

        let short = ChatSession::new("u1", "  How is my trust score?  ", None);
        assert_eq!(short.title, "How is my trust score?");
    }

    #[test]
    fn completing_an_analysis_derives_grade() {
        let store = Store::new("u1", "Shop", "https://shop.example.com", Platform::Shopify);
        let mut analysis = Analysis::pending(&store, &configured(), 1);
        let categories = Category::ALL
            .iter()
            .map(|&category| CategoryScore {
                category,
                score: 85,
                summary: String::new(),
                recommendations: vec![],
            })
            .collect();
        analysis.complete("Solid store".into(), categories);
        assert_eq!(analysis.status, AnalysisStatus::Completed);
        assert_eq!(analysis.overall_score, Some(85));
        assert_eq!(analysis.grade, Some(Grade::B));
        assert!(analysis.completed_at.is_some());
    }

    #[test]
    fn store_view_hides_token() {
        let mut store = Store::new("u1", "Shop", "https://shop.example.com", Platform::Shopify);
        store.shopify_access_token = Some("shpat_secret".into());
        let json = serde_json::to_string(&StoreView::from(&store)).unwrap();
        assert!(json.contains("\"hasAdminToken\":true"));
        assert!(!json.contains("shpat_secret"));
    }

    #[test]
    fn platform_parse_is_lenient() {
        assert_eq!(Platform::parse(" Shopify "), Some(Platform::Shopify));
        assert_eq!(Platform::parse("EBAY"), Some(Platform::Ebay));
        assert_eq!(Platform::parse("etsy"), None);
    }
}
