//! One-call gene literature analysis: search, fetch, analyse, summarise, save.

use std::path::PathBuf;

use chrono::Local;
use oncolit_ingestion::{LiteratureSource, SearchQuery, SortOrder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::analyzer::Analyzer;
use crate::batch::BatchOptions;
use crate::error::PipelineError;
use crate::report::{default_query, save_report, Report};
use crate::schema::AnalyzedItem;
use crate::summary::{generate_summary, Summary};

pub const DEFAULT_MAX_RESULTS: usize = 10;
pub const DEFAULT_SAVE_DIR: &str = "results";

#[derive(Debug, Clone)]
pub struct GeneLiteratureRequest {
    /// Target gene symbol, e.g. `PPP2R2A`.
    pub gene: String,
    /// Source query; [`default_query`] when `None`.
    pub search_query: Option<String>,
    pub max_results: Option<usize>,
    /// `YYYY/MM/DD`
    pub date_from: Option<String>,
    /// `YYYY/MM/DD`
    pub date_to: Option<String>,
    pub sort: SortOrder,
    pub batch: BatchOptions,
    /// Where to write the report; nothing is written when `None`.
    pub save_dir: Option<PathBuf>,
}

impl GeneLiteratureRequest {
    pub fn new(gene: impl Into<String>) -> Self {
        Self {
            gene: gene.into(),
            search_query: None,
            max_results: Some(DEFAULT_MAX_RESULTS),
            date_from: None,
            date_to: None,
            sort: SortOrder::default(),
            batch: BatchOptions::default(),
            save_dir: Some(PathBuf::from(DEFAULT_SAVE_DIR)),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = Some(query.into());
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn with_date_range(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_batch_options(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    pub fn without_save(mut self) -> Self {
        self.save_dir = None;
        self
    }

    pub fn query(&self) -> String {
        self.search_query.clone().unwrap_or_else(|| default_query(&self.gene))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneLiteratureOutcome {
    pub gene: String,
    pub search_query: String,
    /// Articles returned by the source.
    pub total_articles: usize,
    /// Articles analysed successfully; less than `total_articles` on partial failure.
    pub analyzed_articles: usize,
    pub results: Vec<AnalyzedItem>,
    pub summary: Summary,
    pub output_file: Option<PathBuf>,
    /// ISO 8601, local time.
    pub timestamp: String,
}

impl GeneLiteratureOutcome {
    pub fn failed_articles(&self) -> usize {
        self.total_articles - self.analyzed_articles
    }
}

/// Search `source` for articles about `request.gene`, analyse each with
/// `analyzer`, and optionally persist a report.
///
/// Search and fetch failures abort the run. Per-article analysis failures
/// only lower `analyzed_articles`.
#[instrument(skip_all, fields(gene = %request.gene))]
pub async fn analyze_gene_literature(
    request: &GeneLiteratureRequest,
    source: &dyn LiteratureSource,
    analyzer: &Analyzer,
) -> Result<GeneLiteratureOutcome, PipelineError> {
    let gene = request.gene.as_str();
    let search_query = request.query();
    info!(model = %analyzer.model(), "Starting gene literature analysis");
    debug!(query = %search_query, "Searching literature");

    let mut query = SearchQuery::new(search_query.clone())
        .with_date_range(request.date_from.clone(), request.date_to.clone())
        .with_sort(request.sort);
    query.max_results = request.max_results;

    let ids = source.search(&query).await.map_err(PipelineError::Search)?;
    let articles = source.fetch(&ids).await.map_err(PipelineError::Fetch)?;
    debug!(found = articles.len(), "Fetched articles");

    if articles.is_empty() {
        warn!("No articles found");
        return Ok(GeneLiteratureOutcome {
            gene: gene.to_string(),
            search_query,
            total_articles: 0,
            analyzed_articles: 0,
            results: vec![],
            summary: Summary::default(),
            output_file: None,
            timestamp: Local::now().to_rfc3339(),
        });
    }

    info!(articles = articles.len(), "Analysing articles");
    let results = analyzer.batch_analyze(&articles, gene, &request.batch).await;
    info!(succeeded = results.len(), total = articles.len(), "Analysis complete");

    let summary = generate_summary(&results);
    let now = Local::now();

    let output_file = match &request.save_dir {
        Some(dir) => {
            let report = Report {
                gene: gene.to_string(),
                search_query: search_query.clone(),
                timestamp: now.to_rfc3339(),
                summary: summary.clone(),
                results: results.clone(),
            };
            let path = save_report(&report, dir, &now)?;
            info!(path = %path.display(), "Report written");
            Some(path)
        }
        None => None,
    };

    Ok(GeneLiteratureOutcome {
        gene: gene.to_string(),
        search_query,
        total_articles: articles.len(),
        analyzed_articles: results.len(),
        results,
        summary,
        output_file,
        timestamp: now.to_rfc3339(),
    })
}
