use serde::{Deserialize, Serialize};

use crate::CategoryScore;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
    schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Branding,
    ProductPresentation,
    Pricing,
    Trust,
    Seo,
    CustomerExperience,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Branding,
        Category::ProductPresentation,
        Category::Pricing,
        Category::Trust,
        Category::Seo,
        Category::CustomerExperience,
    ];

    /// Wire id, identical to the serde name.
    pub fn id(&self) -> &'static str {
        match self {
            Category::Branding => "branding",
            Category::ProductPresentation => "productPresentation",
            Category::Pricing => "pricing",
            Category::Trust => "trust",
            Category::Seo => "seo",
            Category::CustomerExperience => "customerExperience",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Branding => "Branding",
            Category::ProductPresentation => "Product Presentation",
            Category::Pricing => "Pricing",
            Category::Trust => "Trust & Credibility",
            Category::Seo => "SEO & Discoverability",
            Category::CustomerExperience => "Customer Experience",
        }
    }

    /// Relative weight in the overall score. Weights sum to 100.
    pub fn weight(&self) -> u32 {
        match self {
            Category::ProductPresentation | Category::Trust => 20,
            _ => 15,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Category::Branding => {
                "Clear identity and value proposition: store name, tagline, consistent tone, \
an obvious answer to \"why buy here\"."
            }
            Category::ProductPresentation => {
                "Product titles, descriptions, imagery counts, variant clarity and catalog \
organization. Thin or copy-pasted descriptions score low."
            }
            Category::Pricing => {
                "Price visibility, consistency across the catalog, discount and bundle strategy, \
shipping cost transparency, competitiveness signals."
            }
            Category::Trust => {
                "Reviews, seller feedback, return and refund policy, contact details, about page, \
secure checkout cues, social proof."
            }
            Category::Seo => {
                "Page title and meta description quality, heading structure, descriptive product \
names, keyword coverage for what the store sells."
            }
            Category::CustomerExperience => {
                "Navigation, search, collections, shipping and delivery information, support \
channels, friction on the path to checkout."
            }
        }
    }

    /// Resolve a category name as a model might write it: the wire id, the
    /// display label, or a common alias. Case and separators are ignored.
    pub fn resolve(name: &str) -> Option<Category> {
        let key = squash(name);
        if key.is_empty() {
            return None;
        }
        if let Some(c) = Category::ALL
            .iter()
            .find(|c| squash(c.id()) == key || squash(c.label()) == key)
        {
            return Some(*c);
        }
        let alias = match key.as_str() {
            "brand" | "design" | "identity" => Category::Branding,
            "products" | "product" | "productpages" | "catalog" | "listings" => {
                Category::ProductPresentation
            }
            "price" | "prices" | "value" => Category::Pricing,
            "credibility" | "trustsignals" | "trustandcredibility" | "reputation" => Category::Trust,
            "search" | "discoverability" | "seoanddiscoverability" | "searchengineoptimization" => {
                Category::Seo
            }
            "ux" | "cx" | "usability" | "experience" | "customerservice" | "checkout" => {
                Category::CustomerExperience
            }
            _ => return None,
        };
        Some(alias)
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => Grade::A,
            80..=89 => Grade::B,
            70..=79 => Grade::C,
            60..=69 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// Weighted mean of the category scores present, rounded to the nearest integer.
pub fn overall_score(categories: &[CategoryScore]) -> u8 {
    let (weighted, weights) = categories.iter().fold((0u32, 0u32), |(sum, w), c| {
        let weight = c.category.weight();
        (sum + u32::from(c.score.min(100)) * weight, w + weight)
    });
    if weights == 0 {
        return 0;
    }
    ((weighted + weights / 2) / weights) as u8
}

/// Scoring rubric: single source of truth for the scoring prompt, the chat
/// assistant and the MCP instructions.
pub fn rubric() -> String {
    let mut out = String::with_capacity(2048);
    for (i, c) in Category::ALL.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} (id: `{}`, weight {}%). {}\n",
            i + 1,
            c.label(),
            c.id(),
            c.weight(),
            c.description()
        ));
    }
    out.push_str(SCALE);
    out
}

const SCALE: &str = "\
\n\
## Score scale\n\
- 90-100: best-in-class, nothing material to fix.\n\
- 80-89: strong, minor polish left.\n\
- 70-79: solid basics with visible gaps.\n\
- 60-69: several gaps that likely cost conversions.\n\
- below 60: missing fundamentals.\n\
\n\
Scores are judged only from what the storefront shows publicly. Absence of evidence counts against \
the store: a policy or contact page that cannot be seen does not exist for a shopper. Recommendations \
must be concrete actions tied to something observed (\"Add a returns policy link to the footer\"), \
never generic advice (\"improve trust\").";
