use std::{collections::HashMap, env, fmt::Display, fs, path::Path, path::PathBuf, str::FromStr};

use storescore_core::AiSettings;
use thiserror::Error;
use toml_edit::{DocumentMut, Value};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("config file {path}: {message}")]
    File { path: String, message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub public_url: String,
    pub admin_emails: Vec<String>,
    pub trial_days: i64,
    pub trial_credits: i64,
    pub monthly_credits: i64,
    pub analysis_cost: i64,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_price_id: Option<String>,
    /// AI settings used when `settings.json` is not configured yet.
    pub ai_seed: Option<AiSettings>,
}

impl Config {
    /// Environment first, then the optional file named by `STORESCORE_CONFIG`.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match env::var("STORESCORE_CONFIG") {
            Ok(path) if !path.trim().is_empty() => {
                info!("Reading config file {path}");
                read_file(Path::new(path.trim()))?
            }
            _ => HashMap::new(),
        };
        Self::from_source(&|key| {
            env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file.get(&file_key(key)).cloned())
        })
    }

    pub fn from_source(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("STORESCORE_JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("STORESCORE_JWT_SECRET"))?;

        let data_dir = lookup("STORESCORE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(storescore_core::data_dir);

        let admin_emails = lookup("STORESCORE_ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(storescore_core::normalize_email)
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let ai_seed = match (
            lookup("STORESCORE_AI_PROVIDER"),
            lookup("STORESCORE_AI_MODEL"),
        ) {
            (Some(provider), Some(model)) => Some(AiSettings {
                provider: provider.trim().to_lowercase(),
                model: model.trim().to_string(),
                api_key: lookup("STORESCORE_AI_API_KEY").unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Self {
            port: try_load(lookup, "STORESCORE_PORT", "8080")?,
            data_dir,
            jwt_secret,
            token_ttl_hours: try_load(lookup, "STORESCORE_TOKEN_TTL_HOURS", "24")?,
            public_url: try_load::<String>(lookup, "STORESCORE_PUBLIC_URL", "http://localhost:5173")?
                .trim_end_matches('/')
                .to_string(),
            admin_emails,
            trial_days: try_load(lookup, "STORESCORE_TRIAL_DAYS", "7")?,
            trial_credits: try_load(lookup, "STORESCORE_TRIAL_CREDITS", "3")?,
            monthly_credits: try_load(lookup, "STORESCORE_MONTHLY_CREDITS", "50")?,
            analysis_cost: try_load(lookup, "STORESCORE_ANALYSIS_COST", "1")?,
            stripe_secret_key: secret(lookup, "STRIPE_SECRET_KEY"),
            stripe_webhook_secret: secret(lookup, "STRIPE_WEBHOOK_SECRET"),
            stripe_price_id: secret(lookup, "STRIPE_PRICE_ID"),
            ai_seed,
        })
    }

    pub fn is_admin(&self, email: &str) -> bool {
        let email = storescore_core::normalize_email(email);
        self.admin_emails.iter().any(|a| *a == email)
    }

    pub fn checkout_configured(&self) -> bool {
        self.stripe_secret_key.is_some() && self.stripe_price_id.is_some()
    }
}

fn try_load<T: FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                message: e.to_string(),
            }
        })
}

fn secret(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    let value = lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    if value.is_none() {
        info!("{key} not set");
    }
    value
}

/// `STORESCORE_TRIAL_DAYS` is `trial_days` in the file, `STRIPE_PRICE_ID` is `stripe_price_id`.
fn file_key(key: &str) -> String {
    key.strip_prefix("STORESCORE_").unwrap_or(key).to_lowercase()
}

fn read_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let file_error = |message: String| ConfigError::File {
        path: path.display().to_string(),
        message,
    };
    let raw = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
    let doc: DocumentMut = raw.parse().map_err(|e: toml_edit::TomlError| file_error(e.to_string()))?;

    let mut values = HashMap::new();
    for (key, item) in doc.iter() {
        let value = match item.as_value() {
            Some(Value::String(s)) => s.value().clone(),
            Some(Value::Integer(i)) => i.value().to_string(),
            Some(Value::Boolean(b)) => b.value().to_string(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(","),
            _ => {
                warn!("Ignoring config key {key}: unsupported value");
                continue;
            }
        };
        values.insert(key.to_string(), value);
    }
    Ok(values)
}
