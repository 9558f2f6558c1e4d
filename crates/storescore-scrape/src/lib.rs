pub mod ebay;
pub mod fetch;
pub mod html;
pub mod shopify;
pub mod target;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storescore_core::Platform;
use thiserror::Error;
use tracing::info;
use url::Url;

pub use fetch::{Fetcher, HttpFetcher};
pub use target::{canonical, detect_platform, normalize_url, resolve_platform};

pub const MAX_TEXT_CHARS: usize = 6000;
pub const MAX_PRODUCTS: usize = 50;
pub const MAX_HEADINGS: usize = 20;
pub const MAX_DESCRIPTION_CHARS: usize = 160;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid store url '{0}': {1}")]
    InvalidUrl(String, String),

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{0} returned no readable content")]
    EmptyPage(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub label: String,
    pub value: String,
}

impl Fact {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub variants: usize,
    #[serde(default)]
    pub images: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

/// Everything the scorer gets to see about a storefront.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub headings: Vec<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub products: Vec<ProductSummary>,
    #[serde(default)]
    pub facts: Vec<Fact>,
    pub fetched_at: DateTime<Utc>,
}

impl PageSnapshot {
    /// Page-level fields shared by every platform.
    pub fn from_html(url: &Url, platform: Platform, page: &str) -> Self {
        Self {
            url: canonical(url),
            platform,
            title: html::title(page),
            meta_description: html::meta_content(page, "description")
                .or_else(|| html::meta_content(page, "og:description")),
            headings: html::headings(page, MAX_HEADINGS),
            text: html::truncate_chars(&html::visible_text(page), MAX_TEXT_CHARS),
            products: Vec::new(),
            facts: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.products.is_empty()
    }
}

/// Fetch and extract a storefront according to its platform.
pub async fn scrape(
    fetcher: &dyn Fetcher,
    url: &Url,
    platform: Platform,
    admin_token: Option<&str>,
) -> Result<PageSnapshot, ScrapeError> {
    let snapshot = match platform {
        Platform::Shopify => shopify::scrape_shopify(fetcher, url, admin_token).await?,
        Platform::Ebay => ebay::scrape_ebay(fetcher, url).await?,
    };
    if snapshot.is_empty() {
        return Err(ScrapeError::EmptyPage(canonical(url)));
    }
    info!(
        "scraped {} ({}): {} chars text, {} products, {} facts",
        snapshot.url,
        platform.as_str(),
        snapshot.text.chars().count(),
        snapshot.products.len(),
        snapshot.facts.len()
    );
    Ok(snapshot)
}
