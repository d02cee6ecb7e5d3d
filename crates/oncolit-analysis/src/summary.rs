//! Aggregate statistics over a batch of analysed articles.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::schema::{AnalyzedItem, Confidence, Role};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDistribution {
    pub tumor_suppressor: usize,
    pub oncogene: usize,
    pub both: usize,
    pub unclear: usize,
}

impl RoleDistribution {
    fn add(&mut self, role: Role) {
        match role {
            Role::TumorSuppressor => self.tumor_suppressor += 1,
            Role::Oncogene => self.oncogene += 1,
            Role::Both => self.both += 1,
            Role::Unclear => self.unclear += 1,
        }
    }
}

/// Overall confidence, one count per article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ConfidenceDistribution {
    fn add(&mut self, confidence: Confidence) {
        match confidence {
            Confidence::High => self.high += 1,
            Confidence::Medium => self.medium += 1,
            Confidence::Low => self.low += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub high_confidence_count: usize,
    /// Percent of articles, one decimal.
    pub high_confidence_percentage: f64,
    pub needs_full_text_count: usize,
    /// Percent of articles, one decimal.
    pub needs_full_text_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_articles_analyzed: usize,
    pub total_cancer_classifications: usize,
    pub unique_cancer_types: usize,
    /// Sorted, unique.
    pub cancer_types_found: Vec<String>,
    pub role_distribution: RoleDistribution,
    pub confidence_distribution: ConfidenceDistribution,
    pub quality_metrics: QualityMetrics,
}

/// Serialised as an empty object when nothing was analysed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Summary {
    Stats(SummaryStats),
    Empty(EmptySummary),
}

/// The `{}` summary. Any key makes it fail to read, so a damaged stats
/// object is an error instead of an empty summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptySummary {}

impl Summary {
    pub fn stats(&self) -> Option<&SummaryStats> {
        match self {
            Summary::Stats(stats) => Some(stats),
            Summary::Empty(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stats().is_none()
    }
}

impl Default for Summary {
    fn default() -> Self {
        Summary::Empty(EmptySummary {})
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    let pct = part as f64 / total as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

pub fn generate_summary(results: &[AnalyzedItem]) -> Summary {
    if results.is_empty() {
        return Summary::Empty(EmptySummary {});
    }

    let mut roles = RoleDistribution::default();
    let mut confidence = ConfidenceDistribution::default();
    let mut cancer_types = BTreeSet::new();
    let mut classifications = 0;
    let mut needs_full_text = 0;

    for item in results {
        let analysis = &item.analysis;
        for finding in &analysis.cancers {
            classifications += 1;
            roles.add(finding.role);
            cancer_types.insert(finding.cancer_type.clone());
        }
        confidence.add(analysis.confidence);
        if analysis.needs_full_text {
            needs_full_text += 1;
        }
    }

    let total = results.len();
    Summary::Stats(SummaryStats {
        total_articles_analyzed: total,
        total_cancer_classifications: classifications,
        unique_cancer_types: cancer_types.len(),
        cancer_types_found: cancer_types.into_iter().collect(),
        role_distribution: roles,
        confidence_distribution: confidence,
        quality_metrics: QualityMetrics {
            high_confidence_count: confidence.high,
            high_confidence_percentage: percentage(confidence.high, total),
            needs_full_text_count: needs_full_text,
            needs_full_text_percentage: percentage(needs_full_text, total),
        },
    })
}
