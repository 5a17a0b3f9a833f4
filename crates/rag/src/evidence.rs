use serde::{Deserialize, Serialize};

use finmda_core::{DeltaMetric, TrendResult};

pub const SNIPPET_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based, stable within one evidence bundle.
    pub index: usize,
    pub company: Option<String>,
    pub period: Option<String>,
    pub snippet: String,
    pub relevance_score: f32,
}

/// The retrieval payload handed to narrative generation: concatenated chunk
/// context plus the citations backing it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub context: String,
    pub citations: Vec<Citation>,
}

pub fn snippet(text: &str) -> String {
    let mut out: String = text.chars().take(SNIPPET_MAX_CHARS).collect();
    if text.chars().count() > SNIPPET_MAX_CHARS {
        out.push_str("...");
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footnote {
    pub index: usize,
    pub company: Option<String>,
    pub period: Option<String>,
    pub detail: String,
    pub relevance_score: Option<f32>,
}

/// Footnote list scoped to one generation request. Every push takes the next
/// 1-based index; indices are never reused within a bundle, and a fresh
/// builder restarts at 1, so numbering is stable within an answer but not
/// across answers.
#[derive(Debug, Default)]
pub struct EvidenceBuilder {
    footnotes: Vec<Footnote>,
}

impl EvidenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_citation(&mut self, citation: &Citation) -> usize {
        self.push(Footnote {
            index: 0,
            company: citation.company.clone(),
            period: citation.period.clone(),
            detail: citation.snippet.clone(),
            relevance_score: Some(citation.relevance_score),
        })
    }

    pub fn push_delta(&mut self, company: &str, delta: &DeltaMetric) -> usize {
        let mut parts = Vec::new();
        if let Some(qoq) = delta.qoq_pct {
            parts.push(format!("QoQ {qoq:+.1}%"));
        }
        if let Some(yoy) = delta.yoy_pct {
            parts.push(format!("YoY {yoy:+.1}%"));
        }
        if let Some(margin) = delta.derived_ratio {
            parts.push(format!("margin {:.1}%", margin * 100.0));
        }
        if parts.is_empty() {
            parts.push("insufficient history".to_string());
        }
        self.push(Footnote {
            index: 0,
            company: Some(company.to_string()),
            period: Some(delta.period.to_string()),
            detail: format!("{} {}", delta.concept, parts.join(", ")),
            relevance_score: None,
        })
    }

    pub fn push_trend(&mut self, company: &str, trend: &TrendResult) -> usize {
        self.push(Footnote {
            index: 0,
            company: Some(company.to_string()),
            period: None,
            detail: format!(
                "{} trend {} (r2={:.2}, p={:.3})",
                trend.concept,
                trend.direction.as_str(),
                trend.r_squared,
                trend.p_value
            ),
            relevance_score: None,
        })
    }

    /// Rendered footnote lines, `[^n] company | period | detail`.
    pub fn render(&self) -> String {
        self.footnotes
            .iter()
            .map(|f| {
                format!(
                    "[^{}] {} | {} | {}",
                    f.index,
                    f.company.as_deref().unwrap_or("-"),
                    f.period.as_deref().unwrap_or("-"),
                    f.detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn finish(self) -> Vec<Footnote> {
        self.footnotes
    }

    fn push(&mut self, mut footnote: Footnote) -> usize {
        let index = self.footnotes.len() + 1;
        footnote.index = index;
        self.footnotes.push(footnote);
        index
    }
}
