//! Bibliographic records and search parameters.

use serde::{Deserialize, Serialize};

/// A parsed bibliographic record as returned by a literature source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub pmid: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub journal: String,
    /// `YYYY-MM-DD`, `YYYY-Mon` or `YYYY`; empty when unknown.
    #[serde(default)]
    pub publication_date: String,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub mesh_terms: Vec<String>,
}

impl Article {
    /// Leading component of the publication date, or empty.
    pub fn year(&self) -> String {
        self.publication_date
            .split('-')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Ordering of search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Newest first.
    #[default]
    PubDate,
    Relevance,
    /// Oldest first.
    PubDateAscending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::PubDate          => "pub_date",
            SortOrder::Relevance        => "relevance",
            SortOrder::PubDateAscending => "pub+date",
        }
    }
}

/// Parameters for one search call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    /// Result cap; sources apply their own ceiling.
    pub max_results: Option<usize>,
    /// `YYYY/MM/DD`
    pub date_from: Option<String>,
    /// `YYYY/MM/DD`
    pub date_to: Option<String>,
    pub sort: SortOrder,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
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

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}
