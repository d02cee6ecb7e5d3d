//! Bounded-concurrency batch analysis.
//!
//! Every item is tagged with its input index before it is launched and the
//! outcomes are sorted by that index afterwards, so output order never
//! depends on completion order. A failed item becomes an absent slot; it
//! never stops its siblings.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use oncolit_ingestion::Article;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::analyzer::Analyzer;
use crate::schema::AnalyzedItem;

pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// How the concurrency bound is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStrategy {
    /// Consecutive chunks of `C` items; a chunk starts once the previous one
    /// has fully finished.
    #[default]
    Chunked,
    /// At most `C` items in flight; a new one starts as soon as a slot frees.
    Windowed,
}

impl BatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStrategy::Chunked => "chunked",
            BatchStrategy::Windowed => "windowed",
        }
    }
}

impl FromStr for BatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chunked" => Ok(BatchStrategy::Chunked),
            "windowed" => Ok(BatchStrategy::Windowed),
            other => Err(format!("unknown batch strategy '{other}' (expected chunked or windowed)")),
        }
    }
}

impl fmt::Display for BatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Concurrency bound `C`. Zero behaves as one.
    pub max_concurrent: usize,
    pub strategy: BatchStrategy,
    /// Advanced once per finished item, success or failure.
    pub progress: Option<ProgressBar>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            strategy: BatchStrategy::default(),
            progress: None,
        }
    }
}

impl BatchOptions {
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent, ..Default::default() }
    }

    pub fn with_strategy(mut self, strategy: BatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn bound(&self) -> usize {
        self.max_concurrent.max(1)
    }
}

/// Outcome of one batch, one slot per input item in input order.
#[derive(Debug, Clone)]
pub struct BatchRun<R> {
    outcomes: Vec<Option<R>>,
}

impl<R> BatchRun<R> {
    pub fn requested(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_some()).count()
    }

    /// Input positions whose item failed, ascending.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.is_none().then_some(i))
            .collect()
    }

    pub fn outcomes(&self) -> &[Option<R>] {
        &self.outcomes
    }

    /// Successful results in input order.
    pub fn into_successes(self) -> Vec<R> {
        self.outcomes.into_iter().flatten().collect()
    }
}

impl<R> FromIterator<Option<R>> for BatchRun<R> {
    fn from_iter<I: IntoIterator<Item = Option<R>>>(iter: I) -> Self {
        Self { outcomes: iter.into_iter().collect() }
    }
}

async fn tagged<F: Future>(index: usize, fut: F, progress: Option<&ProgressBar>) -> (usize, F::Output) {
    let out = fut.await;
    if let Some(pb) = progress {
        pb.inc(1);
    }
    (index, out)
}

/// Run `task` over every item with at most `options.bound()` in flight and
/// return the outputs in input order.
pub async fn run_batch<'a, T, F, Fut>(items: &'a [T], options: &BatchOptions, task: F) -> Vec<Fut::Output>
where
    F: Fn(usize, &'a T) -> Fut,
    Fut: Future,
{
    let bound = options.bound();
    let progress = options.progress.as_ref();
    if let Some(pb) = progress {
        pb.inc_length(items.len() as u64);
    }

    let mut outcomes: Vec<(usize, Fut::Output)> = match options.strategy {
        BatchStrategy::Chunked => {
            let mut outcomes = Vec::with_capacity(items.len());
            for (chunk_no, chunk) in items.chunks(bound).enumerate() {
                let base = chunk_no * bound;
                let launched = chunk.iter().enumerate().map(|(offset, item)| {
                    let index = base + offset;
                    tagged(index, task(index, item), progress)
                });
                outcomes.extend(join_all(launched).await);
            }
            outcomes
        }
        BatchStrategy::Windowed => {
            stream::iter(items.iter().enumerate())
                .map(|(index, item)| tagged(index, task(index, item), progress))
                .buffer_unordered(bound)
                .collect()
                .await
        }
    };

    outcomes.sort_by_key(|(index, _)| *index);
    outcomes.into_iter().map(|(_, out)| out).collect()
}

impl Analyzer {
    /// Analyse every article, keeping one slot per input.
    #[instrument(skip_all, fields(gene = %gene, items = articles.len(), strategy = %options.strategy))]
    pub async fn batch_analyze_run(
        &self,
        articles: &[Article],
        gene: &str,
        options: &BatchOptions,
    ) -> BatchRun<AnalyzedItem> {
        let run: BatchRun<AnalyzedItem> = run_batch(articles, options, |_, article| async move {
            match self.analyze(article, gene).await {
                Ok(item) => Some(item),
                Err(e) => {
                    error!(pmid = %article.pmid, kind = %e.kind(), error = %e, "Article analysis failed");
                    None
                }
            }
        })
        .await
        .into_iter()
        .collect();

        if run.succeeded() < run.requested() {
            warn!(
                succeeded = run.succeeded(),
                requested = run.requested(),
                "Batch analysis finished with failures"
            );
        } else {
            info!(succeeded = run.succeeded(), "Batch analysis complete");
        }
        run
    }

    /// Analyse every article and return the successes in input order.
    pub async fn batch_analyze(
        &self,
        articles: &[Article],
        gene: &str,
        options: &BatchOptions,
    ) -> Vec<AnalyzedItem> {
        self.batch_analyze_run(articles, gene, options).await.into_successes()
    }
}
