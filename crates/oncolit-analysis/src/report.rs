//! JSON report written after a gene-literature run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;
use crate::schema::AnalyzedItem;
use crate::summary::Summary;

const MAX_SLUG_LEN: usize = 100;

/// Query used when the caller gives none.
pub fn default_query(gene: &str) -> String {
    format!("{gene}[Title/Abstract] AND cancer[Title/Abstract]")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub gene: String,
    pub search_query: String,
    /// ISO 8601, local time.
    pub timestamp: String,
    pub summary: Summary,
    pub results: Vec<AnalyzedItem>,
}

/// Filename-safe form of a search query.
pub fn query_slug(query: &str) -> String {
    let mut slug = query.to_string();
    for tag in ["[Title/Abstract]", "[Title]", "[Abstract]"] {
        slug = slug.replace(tag, "");
    }
    for op in [" AND ", " OR ", " NOT "] {
        slug = slug.replace(op, "_");
    }
    slug.retain(|c| !matches!(c, '(' | ')' | '[' | ']'));
    let slug = slug.replace([' ', '/', '\\'], "_");

    let slug = slug.split('_').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("_");
    slug.chars().take(MAX_SLUG_LEN).collect()
}

pub fn report_filename(gene: &str, query: &str, now: &DateTime<Local>) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");
    if query.is_empty() || query == default_query(gene) {
        format!("{gene}_{stamp}.json")
    } else {
        format!("{}_{stamp}.json", query_slug(query))
    }
}

/// Write `report` into `dir`, creating it if needed. Returns the file path.
pub fn save_report(report: &Report, dir: &Path, now: &DateTime<Local>) -> Result<PathBuf, PipelineError> {
    std::fs::create_dir_all(dir).map_err(|source| PipelineError::Persist {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(report_filename(&report.gene, &report.search_query, now));
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json).map_err(|source| PipelineError::Persist {
        path: path.clone(),
        source,
    })?;

    debug!(path = %path.display(), "Results saved");
    Ok(path)
}
