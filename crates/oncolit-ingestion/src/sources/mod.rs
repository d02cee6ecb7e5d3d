//! Literature source clients.

pub mod pubmed;

use async_trait::async_trait;
use crate::models::{Article, SearchQuery};

/// Common interface for literature source clients.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Search and return matching record identifiers in source order.
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<String>>;

    /// Fetch and parse the records for `ids`.
    async fn fetch(&self, ids: &[String]) -> anyhow::Result<Vec<Article>>;

    /// Search, then fetch every hit.
    async fn search_and_fetch(&self, query: &SearchQuery) -> anyhow::Result<Vec<Article>> {
        let ids = self.search(query).await?;
        self.fetch(&ids).await
    }
}
