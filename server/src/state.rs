use std::sync::{Arc, Mutex};

use storescore_core::{ai_configured, read_settings, write_settings, AiSettings, Db};
use storescore_score::{Completion, LlmEngine};
use storescore_scrape::{Fetcher, HttpFetcher};
use tracing::{info, warn};

use crate::billing::{PaymentGateway, StripeClient};
use crate::config::Config;

pub struct AppState {
    pub config: Config,
    pub db: Db,
    settings: Mutex<AiSettings>,
    pub completion: Arc<dyn Completion>,
    pub fetcher: Arc<dyn Fetcher>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    /// Serializes read-modify-write of user accounts (credits, plan).
    pub accounts: tokio::sync::Mutex<()>,
}

impl AppState {
    /// Production wiring: real LLM providers, HTTP scraping, Stripe when configured.
    pub fn from_config(config: Config) -> Result<Arc<Self>, String> {
        let fetcher = HttpFetcher::new().map_err(|e| e.to_string())?;
        let payments: Option<Arc<dyn PaymentGateway>> = match StripeClient::from_config(&config) {
            Ok(Some(client)) => Some(Arc::new(client)),
            Ok(None) => {
                info!("Stripe checkout not configured");
                None
            }
            Err(e) => return Err(e.to_string()),
        };
        if config.stripe_webhook_secret.is_none() {
            warn!("STRIPE_WEBHOOK_SECRET not set, webhooks will be rejected");
        }
        Self::with_services(config, Arc::new(LlmEngine), Arc::new(fetcher), payments)
            .map_err(|e| e.to_string())
    }

    pub fn with_services(
        config: Config,
        completion: Arc<dyn Completion>,
        fetcher: Arc<dyn Fetcher>,
        payments: Option<Arc<dyn PaymentGateway>>,
    ) -> storescore_core::Result<Arc<Self>> {
        let db = Db::open(&config.data_dir)?;
        let mut settings = read_settings(db.root());
        if !ai_configured(&settings) {
            if let Some(seed) = &config.ai_seed {
                info!("Seeding AI settings from environment ({} / {})", seed.provider, seed.model);
                settings = seed.clone();
            }
        }
        info!("Data directory {}", db.root().display());
        Ok(Arc::new(Self {
            config,
            db,
            settings: Mutex::new(settings),
            completion,
            fetcher,
            payments,
            accounts: tokio::sync::Mutex::new(()),
        }))
    }

    pub fn settings(&self) -> AiSettings {
        self.settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Persist to `settings.json`, then swap the in-memory copy.
    pub fn set_settings(&self, settings: AiSettings) -> storescore_core::Result<()> {
        write_settings(self.db.root(), &settings)?;
        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = settings;
        Ok(())
    }
}
