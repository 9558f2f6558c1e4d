//! Shopify storefronts expose their catalog at `/products.json` without
//! authentication. A merchant-supplied Admin API token adds shop facts.

use serde::Deserialize;
use storescore_core::Platform;
use tracing::{debug, warn};
use url::Url;

use crate::{canonical, html, Fact, Fetcher, PageSnapshot, ProductSummary, ScrapeError};
use crate::{MAX_DESCRIPTION_CHARS, MAX_PRODUCTS};

const PRODUCTS_LIMIT: usize = 250;
const ADMIN_API_VERSION: &str = "2024-10";

#[derive(Debug, Deserialize)]
struct ProductsPage {
    #[serde(default)]
    products: Vec<RawProduct>,
}

#[derive(Debug, Deserialize)]
struct RawProduct {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body_html: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    product_type: Option<String>,
    #[serde(default)]
    variants: Vec<RawVariant>,
    #[serde(default)]
    images: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawVariant {
    #[serde(default)]
    price: Option<serde_json::Value>,
    #[serde(default)]
    available: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ShopEnvelope {
    shop: AdminShop,
}

#[derive(Debug, Deserialize)]
struct AdminShop {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    plan_display_name: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
}

fn origin(url: &Url) -> String {
    url.origin().ascii_serialization()
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Prices arrive as strings ("19.99") on storefront JSON and occasionally as numbers.
fn parse_price(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// `Shopify.currency = {"active":"USD",...}` appears in most theme markup.
pub fn theme_currency(page: &str) -> Option<String> {
    let at = page.find("Shopify.currency")?;
    let rest = &page[at..];
    let key = rest.find("\"active\"")?;
    let after = &rest[key + "\"active\"".len()..];
    let open = after.find('"')?;
    let code: String = after[open + 1..]
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    (code.len() == 3).then(|| code.to_ascii_uppercase())
}

fn summarize(raw: RawProduct, currency: Option<&str>) -> ProductSummary {
    let price = raw
        .variants
        .iter()
        .filter_map(|v| v.price.as_ref().and_then(parse_price))
        .fold(None, |min: Option<f64>, p| Some(min.map_or(p, |m| m.min(p))));
    let available = if raw.variants.iter().any(|v| v.available.is_some()) {
        Some(raw.variants.iter().any(|v| v.available == Some(true)))
    } else {
        None
    };
    let description = raw
        .body_html
        .as_deref()
        .map(html::text_of)
        .map(|d| html::truncate_chars(&d, MAX_DESCRIPTION_CHARS))
        .unwrap_or_default();
    ProductSummary {
        title: raw.title.trim().to_string(),
        price,
        currency: price.and(currency.map(str::to_string)),
        variants: raw.variants.len(),
        images: raw.images.len(),
        product_type: non_empty(raw.product_type),
        vendor: non_empty(raw.vendor),
        description,
        available,
    }
}

/// Parse a `/products.json` body into summaries, keeping at most `MAX_PRODUCTS`.
/// Returns the full catalog count alongside.
pub fn parse_products(body: &str, currency: Option<&str>) -> Result<(Vec<ProductSummary>, usize), serde_json::Error> {
    let page: ProductsPage = serde_json::from_str(body)?;
    let total = page.products.len();
    let products = page
        .products
        .into_iter()
        .filter(|p| !p.title.trim().is_empty())
        .take(MAX_PRODUCTS)
        .map(|p| summarize(p, currency))
        .collect();
    Ok((products, total))
}

fn catalog_facts(products: &[ProductSummary], total: usize) -> Vec<Fact> {
    let mut facts = Vec::new();
    let size = if total >= PRODUCTS_LIMIT {
        format!("{}+ products", PRODUCTS_LIMIT)
    } else {
        format!("{} products", total)
    };
    facts.push(Fact::new("catalog size", size));

    let prices: Vec<f64> = products.iter().filter_map(|p| p.price).collect();
    if let (Some(min), Some(max)) = (
        prices.iter().copied().reduce(f64::min),
        prices.iter().copied().reduce(f64::max),
    ) {
        let currency = products
            .iter()
            .find_map(|p| p.currency.clone())
            .map(|c| format!(" {}", c))
            .unwrap_or_default();
        facts.push(Fact::new("price range", format!("{:.2} - {:.2}{}", min, max, currency)));
    }

    let known: Vec<bool> = products.iter().filter_map(|p| p.available).collect();
    if !known.is_empty() {
        let in_stock = known.iter().filter(|a| **a).count();
        facts.push(Fact::new("in stock", format!("{} of {} sampled", in_stock, known.len())));
    }
    facts
}

async fn admin_facts(fetcher: &dyn Fetcher, url: &Url, token: &str) -> Vec<Fact> {
    let endpoint = format!("{}/admin/api/{}/shop.json", origin(url), ADMIN_API_VERSION);
    let body = match fetcher
        .get(&endpoint, &[("X-Shopify-Access-Token", token)])
        .await
    {
        Ok(body) => body,
        Err(e) => {
            warn!("shopify admin lookup failed for {}: {}", canonical(url), e);
            return vec![];
        }
    };
    let shop = match serde_json::from_str::<ShopEnvelope>(&body) {
        Ok(envelope) => envelope.shop,
        Err(e) => {
            warn!("unexpected shop.json shape from {}: {}", canonical(url), e);
            return vec![];
        }
    };
    [
        ("shop name", shop.name),
        ("shop currency", shop.currency),
        ("shopify plan", shop.plan_display_name),
        ("shop country", shop.country_name),
    ]
    .into_iter()
    .filter_map(|(label, value)| non_empty(value).map(|v| Fact::new(label, v)))
    .collect()
}

pub async fn scrape_shopify(
    fetcher: &dyn Fetcher,
    url: &Url,
    admin_token: Option<&str>,
) -> Result<PageSnapshot, ScrapeError> {
    let page = fetcher.get(&canonical(url), &[]).await?;
    let mut snapshot = PageSnapshot::from_html(url, Platform::Shopify, &page);
    let currency = theme_currency(&page);

    let products_url = format!("{}/products.json?limit={}", origin(url), PRODUCTS_LIMIT);
    match fetcher.get(&products_url, &[]).await {
        Ok(body) => match parse_products(&body, currency.as_deref()) {
            Ok((products, total)) => {
                debug!("{} lists {} products", products_url, total);
                snapshot.facts.extend(catalog_facts(&products, total));
                snapshot.products = products;
            }
            Err(e) => warn!("{} is not a product listing: {}", products_url, e),
        },
        Err(e) => warn!("no public catalog for {}: {}", canonical(url), e),
    }

    if let Some(token) = admin_token.filter(|t| !t.trim().is_empty()) {
        snapshot.facts.extend(admin_facts(fetcher, url, token.trim()).await);
    }

    Ok(snapshot)
}
