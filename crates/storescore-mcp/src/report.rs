//! Plain-text renderings of stores and analyses for MCP clients.

use storescore_core::{Analysis, AnalysisStatus, Category, Store};

pub fn store_line(store: &Store, owner_email: Option<&str>) -> String {
    let score = match (store.last_score, store.last_grade) {
        (Some(s), Some(g)) => format!("score {} ({})", s, g.as_str()),
        _ => "not analyzed".to_string(),
    };
    let mut line = format!(
        "{}  \"{}\" ({}) {}  {}",
        store.id,
        store.name,
        store.platform.as_str(),
        store.url,
        score
    );
    if let Some(email) = owner_email {
        line.push_str("  owner ");
        line.push_str(email);
    }
    line
}

pub fn analysis_line(a: &Analysis) -> String {
    let outcome = match a.status {
        AnalysisStatus::Completed => format!(
            "completed  {} ({})",
            a.overall_score.unwrap_or_default(),
            a.grade.map(|g| g.as_str()).unwrap_or("?")
        ),
        AnalysisStatus::Failed => format!("failed  {}", a.error.as_deref().unwrap_or("unknown error")),
        AnalysisStatus::Pending => "pending".to_string(),
    };
    format!(
        "{}  {}  {}  [{} / {}]",
        a.id,
        a.created_at.format("%Y-%m-%d %H:%M"),
        outcome,
        a.provider,
        a.model
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDelta {
    pub category: Category,
    pub before: Option<u8>,
    pub after: Option<u8>,
}

impl CategoryDelta {
    pub fn delta(&self) -> Option<i16> {
        Some(i16::from(self.after?) - i16::from(self.before?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub previous_id: String,
    pub latest_id: String,
    pub overall_before: u8,
    pub overall_after: u8,
    pub categories: Vec<CategoryDelta>,
}

/// The two most recent completed analyses as `(previous, latest)`.
pub fn latest_two_completed(mut analyses: Vec<Analysis>) -> Option<(Analysis, Analysis)> {
    analyses.retain(|a| a.status == AnalysisStatus::Completed);
    analyses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let mut it = analyses.into_iter();
    let latest = it.next()?;
    let previous = it.next()?;
    Some((previous, latest))
}

pub fn compare(previous: &Analysis, latest: &Analysis) -> Comparison {
    Comparison {
        previous_id: previous.id.clone(),
        latest_id: latest.id.clone(),
        overall_before: previous.overall_score.unwrap_or_default(),
        overall_after: latest.overall_score.unwrap_or_default(),
        categories: Category::ALL
            .iter()
            .map(|&category| CategoryDelta {
                category,
                before: previous.category(category).map(|c| c.score),
                after: latest.category(category).map(|c| c.score),
            })
            .collect(),
    }
}

fn signed(d: i16) -> String {
    if d > 0 {
        format!("+{}", d)
    } else {
        d.to_string()
    }
}

fn score_or_dash(s: Option<u8>) -> String {
    s.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

impl Comparison {
    pub fn render(&self) -> String {
        let overall = i16::from(self.overall_after) - i16::from(self.overall_before);
        let mut out = format!(
            "{} -> {}\noverall: {} -> {} ({})\n",
            self.previous_id,
            self.latest_id,
            self.overall_before,
            self.overall_after,
            signed(overall)
        );
        for c in &self.categories {
            out.push_str(&format!(
                "{}: {} -> {} ({})\n",
                c.category.label(),
                score_or_dash(c.before),
                score_or_dash(c.after),
                c.delta().map(signed).unwrap_or_else(|| "n/a".into())
            ));
        }
        out
    }
}
