use schemars::JsonSchema;
use serde::Deserialize;
use storescore_core::rubric::rubric;
use storescore_core::Category;
use storescore_scrape::html::truncate_chars;
use storescore_scrape::PageSnapshot;

/// Response shape the model is asked for. Only used to render the schema;
/// parsing goes through the lenient types in `parse`.
#[allow(dead_code)]
#[derive(Deserialize, JsonSchema)]
struct ResponseShape {
    /// Two or three sentences on the store as a whole.
    summary: String,
    /// Exactly one entry per rubric category.
    categories: Vec<CategoryShape>,
}

#[allow(dead_code)]
#[derive(Deserialize, JsonSchema)]
struct CategoryShape {
    category: Category,
    #[schemars(range(min = 0, max = 100))]
    score: u8,
    /// One sentence citing what was observed.
    summary: String,
    #[schemars(length(max = 5))]
    recommendations: Vec<String>,
}

pub fn response_schema() -> String {
    let schema = schemars::schema_for!(ResponseShape);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

const PRODUCT_TITLE_CHARS: usize = 80;
const PRODUCT_DESCRIPTION_CHARS: usize = 120;

/// Convert a snapshot to a compact text representation for LLM consumption.
pub fn serialize_snapshot(store_name: &str, snapshot: &PageSnapshot) -> String {
    let mut out = String::with_capacity(snapshot.text.len() + 2048);

    out.push_str("STORE: \"");
    out.push_str(store_name);
    out.push_str("\" (");
    out.push_str(snapshot.platform.as_str());
    out.push_str(") ");
    out.push_str(&snapshot.url);
    out.push('\n');

    out.push_str("PAGE:\n");
    out.push_str("  title: ");
    out.push_str(snapshot.title.as_deref().unwrap_or("(none)"));
    out.push('\n');
    out.push_str("  meta description: ");
    out.push_str(snapshot.meta_description.as_deref().unwrap_or("(none)"));
    out.push('\n');

    if !snapshot.facts.is_empty() {
        out.push_str("FACTS:\n");
        for fact in &snapshot.facts {
            out.push_str("  ");
            out.push_str(&fact.label);
            out.push_str(": ");
            out.push_str(&fact.value);
            out.push('\n');
        }
    }

    if !snapshot.headings.is_empty() {
        out.push_str("HEADINGS:\n");
        for heading in &snapshot.headings {
            out.push_str("  - ");
            out.push_str(heading);
            out.push('\n');
        }
    }

    out.push_str(&format!("PRODUCTS ({} sampled):\n", snapshot.products.len()));
    if snapshot.products.is_empty() {
        out.push_str("  (no product listing visible)\n");
    }
    for p in &snapshot.products {
        out.push_str("  - \"");
        out.push_str(&truncate_chars(&p.title, PRODUCT_TITLE_CHARS));
        out.push('"');
        if let Some(price) = p.price {
            out.push_str(&format!(" price={:.2}", price));
            if let Some(currency) = &p.currency {
                out.push(' ');
                out.push_str(currency);
            }
        }
        if p.variants > 1 {
            out.push_str(&format!(" variants={}", p.variants));
        }
        if p.images > 0 {
            out.push_str(&format!(" images={}", p.images));
        }
        if let Some(available) = p.available {
            out.push_str(if available { " in-stock" } else { " sold-out" });
        }
        if let Some(t) = &p.product_type {
            out.push_str(" type=");
            out.push_str(t);
        }
        if let Some(v) = &p.vendor {
            out.push_str(" vendor=");
            out.push_str(v);
        }
        if !p.description.is_empty() {
            out.push_str(" | \"");
            out.push_str(&truncate_chars(&p.description, PRODUCT_DESCRIPTION_CHARS));
            out.push('"');
        }
        out.push('\n');
    }

    out.push_str("TEXT:\n");
    if snapshot.text.is_empty() {
        out.push_str("(no visible text)");
    } else {
        out.push_str(&snapshot.text);
    }
    out.push('\n');

    out
}

pub fn system_prompt() -> String {
    format!(
        "You are an e-commerce conversion consultant. You review public storefronts and score them \
the way a first-time shopper would experience them, using only the page data provided.\n\n\
## Rubric\n{}\n\n\
## Output\n\
Output ONLY a JSON object matching this JSON Schema:\n{}\n\n\
Rules:\n\
- Include every category id exactly once: {}.\n\
- `score` is an integer from 0 to 100.\n\
- `summary` fields cite concrete evidence from the page data (a product title, a missing policy, \
a meta description).\n\
- At most 5 recommendations per category, most impactful first. Use an empty array when there is \
nothing concrete to recommend.\n\
- Do not include an overall score; it is computed from the category scores.\n\n\
Output ONLY the JSON object, nothing else.",
        rubric(),
        response_schema(),
        Category::ALL
            .iter()
            .map(|c| c.id())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

pub fn user_message(store_name: &str, snapshot: &PageSnapshot) -> String {
    serialize_snapshot(store_name, snapshot)
}
