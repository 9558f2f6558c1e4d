#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{json, Value};
use storescore_core::{AiSettings, User};
use storescore_score::{Completion, ScoreError, Turn};
use storescore_scrape::{Fetcher, ScrapeError};
use storescore_server::billing::{BillingError, CheckoutSession, PaymentGateway};
use storescore_server::config::Config;
use storescore_server::create_router;
use storescore_server::state::AppState;
use tempfile::TempDir;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const PASSWORD: &str = "hunter2hunter2";

pub const STORE_PAGE: &str = r#"<html><head>
<title>Acme Mugs</title>
<meta name="description" content="Handmade ceramic mugs shipped worldwide">
</head><body>
<h1>Handmade mugs</h1>
<p>Every mug is thrown by hand in our Portland studio. Free shipping over $50.</p>
</body></html>"#;

/// Serves canned pages. Unknown URLs answer 404, hosts containing `broken` answer 503.
#[derive(Default)]
pub struct FakeFetcher {
    pub pages: HashMap<String, String>,
}

impl FakeFetcher {
    pub fn storefront() -> Self {
        let mut pages = HashMap::new();
        pages.insert("https://acme.myshopify.com".to_string(), STORE_PAGE.to_string());
        Self { pages }
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn get(&self, url: &str, _headers: &[(&str, &str)]) -> Result<String, ScrapeError> {
        if url.contains("broken") {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: 503,
            });
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Answers every prompt with the same text and counts the calls.
pub struct FakeCompletion {
    pub reply: String,
    pub calls: AtomicUsize,
    pub systems: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
            systems: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Completion for FakeCompletion {
    async fn complete(
        &self,
        _settings: &AiSettings,
        system: &str,
        _turns: &[Turn],
    ) -> Result<String, ScoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.systems.lock().unwrap().push(system.to_string());
        Ok(self.reply.clone())
    }
}

/// A scorecard giving every category `score`.
pub fn scorecard(score: u8) -> String {
    let categories: Vec<Value> = [
        "branding",
        "productPresentation",
        "pricing",
        "trust",
        "seo",
        "customerExperience",
    ]
    .iter()
    .map(|id| {
        json!({
            "category": id,
            "score": score,
            "summary": format!("{id} looks fine"),
            "recommendations": [format!("Improve {id}")],
        })
    })
    .collect();
    json!({ "summary": "Solid storefront.", "categories": categories }).to_string()
}

#[derive(Default)]
pub struct FakePayments {
    pub requests: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn create_checkout(
        &self,
        user: &User,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, BillingError> {
        self.requests.lock().unwrap().push((
            user.id.clone(),
            success_url.to_string(),
            cancel_url.to_string(),
        ));
        Ok(CheckoutSession {
            id: "cs_test_1".into(),
            url: "https://checkout.stripe.com/c/pay/cs_test_1".into(),
        })
    }
}

pub struct Harness {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub completion: Arc<FakeCompletion>,
    pub payments: Option<Arc<FakePayments>>,
    _dir: TempDir,
}

pub struct Options {
    pub ai_configured: bool,
    pub with_payments: bool,
    pub completion_reply: String,
    pub extra: Vec<(&'static str, &'static str)>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ai_configured: true,
            with_payments: false,
            completion_reply: scorecard(80),
            extra: Vec::new(),
        }
    }
}

pub fn harness() -> Harness {
    harness_with(Options::default())
}

pub fn harness_with(options: Options) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut vars: HashMap<String, String> = HashMap::from([
        ("STORESCORE_JWT_SECRET".into(), "test-secret".into()),
        ("STORESCORE_DATA_DIR".into(), dir.path().display().to_string()),
        ("STORESCORE_ADMIN_EMAILS".into(), ADMIN_EMAIL.into()),
        ("STORESCORE_PUBLIC_URL".into(), "https://app.storescore.test".into()),
        ("STRIPE_WEBHOOK_SECRET".into(), WEBHOOK_SECRET.into()),
    ]);
    if options.ai_configured {
        vars.insert("STORESCORE_AI_PROVIDER".into(), "openai".into());
        vars.insert("STORESCORE_AI_MODEL".into(), "gpt-4o-mini".into());
        vars.insert("STORESCORE_AI_API_KEY".into(), "sk-test".into());
    }
    for (k, v) in &options.extra {
        vars.insert(k.to_string(), v.to_string());
    }
    let config = Config::from_source(&|key: &str| vars.get(key).cloned()).unwrap();

    let completion = Arc::new(FakeCompletion::new(options.completion_reply));
    let payments = options.with_payments.then(|| Arc::new(FakePayments::default()));
    let state = AppState::with_services(
        config,
        completion.clone(),
        Arc::new(FakeFetcher::storefront()),
        payments.clone().map(|p| p as Arc<dyn PaymentGateway>),
    )
    .unwrap();

    let server = TestServer::new(create_router(state.clone())).unwrap();
    Harness {
        server,
        state,
        completion,
        payments,
        _dir: dir,
    }
}

impl Harness {
    /// Register an account and return its bearer token.
    pub async fn register(&self, email: &str) -> String {
        let resp = self
            .server
            .post("/api/auth/register")
            .json(&json!({ "email": email, "password": PASSWORD, "name": "Test Owner" }))
            .await;
        assert_eq!(resp.status_code(), 201, "register failed: {}", resp.text());
        let body: Value = resp.json();
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn me(&self, token: &str) -> Value {
        self.server
            .get("/api/me")
            .authorization_bearer(token)
            .await
            .json()
    }

    pub async fn add_store(&self, token: &str, url: &str) -> Value {
        let resp = self
            .server
            .post("/api/stores")
            .authorization_bearer(token)
            .json(&json!({ "url": url }))
            .await;
        assert_eq!(resp.status_code(), 201, "add store failed: {}", resp.text());
        resp.json()
    }

    pub async fn start_trial(&self, token: &str) {
        let resp = self
            .server
            .post("/api/billing/trial")
            .authorization_bearer(token)
            .await;
        assert_eq!(resp.status_code(), 200, "trial failed: {}", resp.text());
    }
}
