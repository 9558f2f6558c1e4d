use serde::Deserialize;
use serde_json::Value;
use storescore_core::{overall_score, Category, CategoryScore};
use tracing::warn;

use crate::{Scorecard, ScoreError};

const MAX_RECOMMENDATIONS: usize = 5;

#[derive(Deserialize)]
struct LlmScorecard {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default, alias = "scores")]
    categories: Vec<LlmCategory>,
}

#[derive(Deserialize)]
struct LlmCategory {
    #[serde(alias = "name", alias = "id")]
    category: String,
    #[serde(default, alias = "rating")]
    score: Value,
    #[serde(default, alias = "rationale", alias = "reason")]
    summary: Option<String>,
    #[serde(default, alias = "suggestions")]
    recommendations: Value,
}

/// Parse raw model output into a validated scorecard. Tolerates prose around
/// the JSON, string or fractional scores and category names written as labels.
pub fn parse_scorecard(raw: &str) -> Result<Scorecard, ScoreError> {
    let json_str = extract_json_object(raw)
        .ok_or_else(|| ScoreError::InvalidShape("no JSON object in model output".into()))?;

    let parsed = match serde_json::from_str::<LlmScorecard>(json_str) {
        Ok(card) => card,
        Err(e) => {
            warn!("model output is not strict JSON ({}), scanning objects", e);
            salvage(json_str)
        }
    };

    let mut categories: Vec<CategoryScore> = Vec::new();
    for lc in parsed.categories {
        let Some(category) = Category::resolve(&lc.category) else {
            warn!("ignoring unknown category '{}'", lc.category);
            continue;
        };
        if categories.iter().any(|c| c.category == category) {
            continue;
        }
        let Some(score) = coerce_score(&lc.score) else {
            warn!("ignoring {} with unreadable score {}", category.id(), lc.score);
            continue;
        };
        categories.push(CategoryScore {
            category,
            score,
            summary: lc.summary.as_deref().unwrap_or_default().trim().to_string(),
            recommendations: recommendations(&lc.recommendations),
        });
    }

    let missing: Vec<&str> = Category::ALL
        .iter()
        .filter(|c| !categories.iter().any(|s| s.category == **c))
        .map(|c| c.id())
        .collect();
    if !missing.is_empty() {
        return Err(ScoreError::InvalidShape(format!(
            "missing categories: {}",
            missing.join(", ")
        )));
    }

    categories.sort_by_key(|c| c.category);
    Ok(Scorecard {
        summary: parsed.summary.as_deref().unwrap_or_default().trim().to_string(),
        overall: overall_score(&categories),
        categories,
    })
}

/// Extract the outermost JSON object substring from raw LLM output.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Recover what we can from a malformed object: every well-formed category
/// object nested inside it, and a top-level summary if one is readable.
fn salvage(json_str: &str) -> LlmScorecard {
    let inner = json_str
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(json_str);

    let (objects, residue) = split_objects(inner);
    let categories = objects
        .into_iter()
        .filter_map(|obj| serde_json::from_str::<LlmCategory>(obj).ok())
        .collect();

    LlmScorecard {
        summary: string_field(&residue, "summary"),
        categories,
    }
}

/// Split `s` into its depth-0 `{...}` objects and the text between them.
/// Braces inside string literals do not count.
fn split_objects(s: &str) -> (Vec<&str>, String) {
    let mut objects = Vec::new();
    let mut residue = String::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if depth == 0 && ch != '{' {
            residue.push(ch);
        }
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s0) = start.take() {
                        objects.push(&s[s0..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    (objects, residue)
}

/// Read `"key": "value"` out of loose text, unescaping the value.
fn string_field(text: &str, key: &str) -> Option<String> {
    let needle = format!("\"{}\"", key);
    let at = text.find(&needle)?;
    let rest = text[at + needle.len()..].trim_start().strip_prefix(':')?;
    let rest = rest.trim_start();
    if !rest.starts_with('"') {
        return None;
    }
    let mut escaped = false;
    for (i, ch) in rest.char_indices().skip(1) {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return serde_json::from_str(&rest[..=i]).ok(),
            _ => {}
        }
    }
    None
}

fn coerce_score(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            let s = s
                .strip_suffix('%')
                .or_else(|| s.strip_suffix("/100"))
                .unwrap_or(s);
            s.trim().parse::<f64>().ok()?
        }
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(0.0, 100.0) as u8)
}

/// Recommendations as a list, or one string with a suggestion per line.
fn recommendations(value: &Value) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Value::String(s) => s
            .lines()
            .map(|l| {
                l.trim()
                    .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
                    .to_string()
            })
            .collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .take(MAX_RECOMMENDATIONS)
        .collect()
}
