//! eBay store (`/str/...`), seller (`/usr/...`) and search result pages all
//! render listings as item cards; we read titles and prices off the card
//! class names and pull seller reputation out of the page text.

use storescore_core::Platform;
use url::Url;

use crate::{canonical, html, Fact, Fetcher, PageSnapshot, ProductSummary, ScrapeError};
use crate::MAX_PRODUCTS;

const TITLE_CLASSES: [&str; 2] = ["s-item__title", "str-item-card__property-title"];
const PRICE_CLASSES: [&str; 2] = ["s-item__price", "str-item-card__property-displayPrice"];

/// eBay pads result grids with a hidden "Shop on eBay" template card.
const PLACEHOLDER_TITLES: [&str; 2] = ["shop on ebay", "new listing"];

fn first_non_empty(page: &str, classes: &[&str]) -> Vec<String> {
    classes
        .iter()
        .map(|c| html::texts_with_class(page, c))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// First price in strings like "US $12.99", "£8.00 to £12.00" or "EUR 5,50".
pub fn parse_price(raw: &str) -> Option<(f64, Option<String>)> {
    let currency = if raw.contains('£') || raw.contains("GBP") {
        Some("GBP")
    } else if raw.contains('€') || raw.contains("EUR") {
        Some("EUR")
    } else if raw.contains("AU $") {
        Some("AUD")
    } else if raw.contains("C $") {
        Some("CAD")
    } else if raw.contains('$') {
        Some("USD")
    } else {
        None
    };
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let number: String = raw[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let number = number.trim_end_matches(['.', ',']);
    // With both separators present the later one is the decimal mark. A lone
    // comma followed by one or two digits is a decimal comma.
    let normalized = match (number.rfind('.'), number.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => {
            format!("{}.{}", number[..comma].replace(['.', ','], ""), &number[comma + 1..])
        }
        (Some(_), Some(_)) => number.replace(',', ""),
        (None, Some(comma))
            if number.matches(',').count() == 1 && (2..=3).contains(&(number.len() - comma)) =>
        {
            format!("{}.{}", &number[..comma], &number[comma + 1..])
        }
        (None, Some(_)) => number.replace(',', ""),
        (Some(_), None) if number.matches('.').count() > 1 => number.replace('.', ""),
        _ => number.to_string(),
    };
    let value = normalized.parse().ok()?;
    Some((value, currency.map(str::to_string)))
}

/// The token immediately before `needle`, e.g. "99.8%" in "99.8% positive feedback".
fn token_before<'a>(text: &'a str, needle: &str) -> Option<&'a str> {
    let at = text.to_ascii_lowercase().find(needle)?;
    let head = text[..at].trim_end();
    let start = head.rfind(char::is_whitespace).map(|i| i + 1).unwrap_or(0);
    let token = &head[start..];
    token.chars().any(|c| c.is_ascii_digit()).then_some(token)
}

fn reputation_facts(text: &str) -> Vec<Fact> {
    let mut facts = Vec::new();
    if let Some(pct) = token_before(text, "positive feedback") {
        facts.push(Fact::new("positive feedback", pct));
    }
    if let Some(sold) = token_before(text, "items sold") {
        facts.push(Fact::new("items sold", sold));
    }
    if let Some(followers) = token_before(text, "followers") {
        facts.push(Fact::new("followers", followers));
    }
    facts
}

pub fn parse_items(page: &str) -> Vec<ProductSummary> {
    let titles = first_non_empty(page, &TITLE_CLASSES);
    let prices = first_non_empty(page, &PRICE_CLASSES);
    let offset = titles
        .iter()
        .take_while(|t| PLACEHOLDER_TITLES.contains(&t.to_lowercase().as_str()))
        .count();
    // Placeholder cards carry a price span too; keep the lists aligned.
    let price_offset = if prices.len() == titles.len() { offset } else { 0 };

    titles
        .iter()
        .skip(offset)
        .enumerate()
        .filter(|(_, t)| !PLACEHOLDER_TITLES.contains(&t.to_lowercase().as_str()))
        .take(MAX_PRODUCTS)
        .map(|(i, title)| {
            let parsed = prices.get(i + price_offset).and_then(|p| parse_price(p));
            ProductSummary {
                title: title.clone(),
                price: parsed.as_ref().map(|(v, _)| *v),
                currency: parsed.and_then(|(_, c)| c),
                variants: 1,
                ..Default::default()
            }
        })
        .collect()
}

pub async fn scrape_ebay(fetcher: &dyn Fetcher, url: &Url) -> Result<PageSnapshot, ScrapeError> {
    let page = fetcher.get(&canonical(url), &[]).await?;
    let mut snapshot = PageSnapshot::from_html(url, Platform::Ebay, &page);
    snapshot.products = parse_items(&page);
    snapshot.facts = reputation_facts(&html::visible_text(&page));
    if !snapshot.products.is_empty() {
        snapshot
            .facts
            .push(Fact::new("listings on page", snapshot.products.len().to_string()));
    }
    Ok(snapshot)
}
