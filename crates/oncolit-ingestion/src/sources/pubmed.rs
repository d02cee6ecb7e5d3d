//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, instrument, warn};

use crate::models::{Article, SearchQuery};
use super::LiteratureSource;

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL:  &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

/// Hard ceiling on identifiers returned by one search.
pub const MAX_SEARCH_RESULTS: usize = 1000;

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PubMedConfig {
    /// Contact email, required by NCBI.
    pub email: String,
    pub tool: String,
    pub api_key: Option<SecretString>,
    /// Records per efetch request (1..=500).
    pub batch_size: usize,
}

impl PubMedConfig {
    pub fn new(email: impl Into<String>) -> anyhow::Result<Self> {
        let email = email.into().trim().to_string();
        if email.is_empty() {
            anyhow::bail!(
                "Email is required for NCBI E-utilities. \
                 Set NCBI_EMAIL or pass an email explicitly."
            );
        }
        Ok(Self {
            email,
            tool: "oncolit".to_string(),
            api_key: None,
            batch_size: 50,
        })
    }

    /// Build from `NCBI_EMAIL` and `NCBI_API_KEY`.
    pub fn from_env() -> anyhow::Result<Self> {
        let email = std::env::var("NCBI_EMAIL").unwrap_or_default();
        let mut cfg = Self::new(email)?;
        cfg.api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        Ok(cfg)
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty()).map(SecretString::from);
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, 500);
        self
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct PubMedClient {
    client: Client,
    config: PubMedConfig,
}

impl PubMedClient {
    pub fn new(config: PubMedConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("{}/{}", config.tool, env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        info!(email = %config.email, "Initialized PubMed client");
        Ok(Self { client, config })
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("email", self.config.email.clone()),
            ("tool", self.config.tool.clone()),
        ];
        if let Some(key) = &self.config.api_key {
            params.push(("api_key", key.expose_secret().to_string()));
        }
        params
    }

    /// Search PubMed and return a list of PMIDs.
    #[instrument(skip(self), fields(query = %query.query))]
    async fn esearch(&self, query: &SearchQuery) -> anyhow::Result<Vec<String>> {
        let mut params = self.base_params();
        params.extend(esearch_params(query));

        let resp: serde_json::Value = self.client
            .get(ESEARCH_URL)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = resp["esearchresult"]["ERROR"].as_str() {
            anyhow::bail!("PubMed esearch error: {err}");
        }

        let ids: Vec<String> = resp["esearchresult"]["idlist"]
            .as_array()
            .map(|ids| ids.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let count = resp["esearchresult"]["count"]
            .as_str()
            .and_then(|c| c.parse::<u64>().ok())
            .unwrap_or(0);

        info!(count, returned = ids.len(), "PubMed esearch complete");
        Ok(ids)
    }

    /// Fetch PubMed XML for one batch of PMIDs.
    #[instrument(skip(self, pmids), fields(n = pmids.len()))]
    async fn efetch_batch(&self, pmids: &[String]) -> anyhow::Result<Vec<Article>> {
        let mut params = self.base_params();
        params.push(("id", pmids.join(",")));
        params.push(("rettype", "medline".to_string()));
        params.push(("retmode", "xml".to_string()));

        let xml = self.client
            .get(EFETCH_URL)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_pubmed_xml(&xml)
    }
}

#[async_trait]
impl LiteratureSource for PubMedClient {
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<String>> {
        self.esearch(query)
            .await
            .with_context(|| format!("Failed to search PubMed for {:?}", query.query))
    }

    async fn fetch(&self, ids: &[String]) -> anyhow::Result<Vec<Article>> {
        if ids.is_empty() {
            warn!("No PMIDs provided to fetch");
            return Ok(vec![]);
        }

        let batch_size = self.config.batch_size.max(1);
        info!(n = ids.len(), batch_size, "Fetching PubMed records");

        let mut articles = Vec::with_capacity(ids.len());
        for (i, batch) in ids.chunks(batch_size).enumerate() {
            debug!(batch = i + 1, n = batch.len(), "Fetching batch");
            let parsed = self
                .efetch_batch(batch)
                .await
                .context("Failed to fetch PubMed records")?;
            articles.extend(parsed);
        }

        info!(n = articles.len(), "Fetched and parsed PubMed records");
        Ok(articles)
    }
}

/// Query parameters for esearch, without the shared base params.
fn esearch_params(query: &SearchQuery) -> Vec<(&'static str, String)> {
    let retmax = match query.max_results {
        None => MAX_SEARCH_RESULTS,
        Some(n) if n > MAX_SEARCH_RESULTS => {
            warn!(requested = n, "Limiting search to {MAX_SEARCH_RESULTS} results");
            MAX_SEARCH_RESULTS
        }
        Some(n) => n,
    };

    let mut params = vec![
        ("term", query.query.clone()),
        ("retmax", retmax.to_string()),
        ("sort", query.sort.as_str().to_string()),
        ("retmode", "json".to_string()),
    ];
    if let Some(from) = &query.date_from {
        params.push(("mindate", from.clone()));
    }
    if let Some(to) = &query.date_to {
        params.push(("maxdate", to.clone()));
    }
    if query.date_from.is_some() || query.date_to.is_some() {
        params.push(("datetype", "pdat".to_string()));
    }
    params
}

// ── XML parsing ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordBuilder {
    pmid: Option<String>,
    title: String,
    abstract_sections: Vec<String>,
    current_section: String,
    authors: Vec<String>,
    last_name: String,
    fore_name: String,
    collective_name: String,
    journal: String,
    article_date: DateParts,
    pub_date: DateParts,
    medline_date: String,
    doi: String,
    keywords: Vec<String>,
    mesh_terms: Vec<String>,
}

#[derive(Default)]
struct DateParts {
    year: String,
    month: String,
    day: String,
}

impl RecordBuilder {
    fn publication_date(&self) -> String {
        let ad = &self.article_date;
        if !ad.year.is_empty() {
            return format!("{}-{:0>2}-{:0>2}", ad.year, ad.month, ad.day);
        }
        let pd = &self.pub_date;
        if !pd.year.is_empty() {
            return if pd.month.is_empty() {
                pd.year.clone()
            } else {
                format!("{}-{}", pd.year, pd.month)
            };
        }
        // "2019 Jan-Feb" style dates only carry a reliable year.
        self.medline_date
            .split_whitespace()
            .next()
            .filter(|y| y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()))
            .map(String::from)
            .unwrap_or_default()
    }

    fn finish(self) -> Option<Article> {
        let publication_date = self.publication_date();
        let pmid = self.pmid?;
        Some(Article {
            pmid,
            title: self.title,
            abstract_text: self.abstract_sections.join(" "),
            authors: self.authors,
            journal: self.journal,
            publication_date,
            doi: self.doi,
            keywords: self.keywords,
            mesh_terms: self.mesh_terms,
        })
    }
}

fn is_doi_id(e: &BytesStart) -> anyhow::Result<bool> {
    match e.try_get_attribute("IdType")? {
        Some(attr) => Ok(attr.unescape_value()? == "doi"),
        None => Ok(false),
    }
}

/// Parse PubMed efetch XML into articles.
/// Handles the <PubmedArticleSet><PubmedArticle> structure; records without
/// a PMID are skipped with a warning.
pub fn parse_pubmed_xml(xml: &str) -> anyhow::Result<Vec<Article>> {
    let mut articles = Vec::new();
    // Text nodes stay untrimmed so inline markup keeps its surrounding spacing.
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<RecordBuilder> = None;
    let mut in_doi = false;

    loop {
        match reader.read_event().context("Malformed PubMed XML")? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "PubmedArticle" => current = Some(RecordBuilder::default()),
                    "Author" => {
                        if let Some(r) = current.as_mut() {
                            r.last_name.clear();
                            r.fore_name.clear();
                            r.collective_name.clear();
                        }
                    }
                    "AbstractText" => {
                        if let Some(r) = current.as_mut() {
                            r.current_section.clear();
                        }
                    }
                    "ArticleId" => in_doi = is_doi_id(&e)?,
                    _ => {}
                }
                stack.push(name);
            }
            Event::Text(e) => {
                let Some(r) = current.as_mut() else { continue };
                let raw = e.unescape()?;
                let text = raw.trim();
                let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());
                let within = |tag: &str| stack.iter().any(|s| s == tag);

                match stack.last().map(String::as_str) {
                    Some("PMID") if parent == Some("MedlineCitation") && r.pmid.is_none() => {
                        r.pmid = Some(text.to_string());
                    }
                    Some("LastName") if parent == Some("Author") => r.last_name = text.to_string(),
                    Some("ForeName") if parent == Some("Author") => r.fore_name = text.to_string(),
                    Some("CollectiveName") => r.collective_name = text.to_string(),
                    Some("Title") if parent == Some("Journal") => r.journal = text.to_string(),
                    Some("Year") if parent == Some("ArticleDate") => r.article_date.year = text.to_string(),
                    Some("Month") if parent == Some("ArticleDate") => r.article_date.month = text.to_string(),
                    Some("Day") if parent == Some("ArticleDate") => r.article_date.day = text.to_string(),
                    Some("Year") if parent == Some("PubDate") => r.pub_date.year = text.to_string(),
                    Some("Month") if parent == Some("PubDate") => r.pub_date.month = text.to_string(),
                    Some("MedlineDate") => r.medline_date = text.to_string(),
                    Some("ArticleId") if in_doi && r.doi.is_empty() => r.doi = text.to_string(),
                    Some("Keyword") if !text.is_empty() => r.keywords.push(text.to_string()),
                    Some("DescriptorName") if parent == Some("MeshHeading") && !text.is_empty() => {
                        r.mesh_terms.push(text.to_string())
                    }
                    // Inline markup (<i>, <sup>, …) nests inside title and abstract text.
                    _ if within("AbstractText") => r.current_section.push_str(&raw),
                    _ if within("ArticleTitle") => r.title.push_str(&raw),
                    _ => {}
                }
            }
            Event::End(e) => {
                stack.pop();
                match e.local_name().as_ref() {
                    b"AbstractText" => {
                        if let Some(r) = current.as_mut() {
                            let section = std::mem::take(&mut r.current_section);
                            let section = section.trim();
                            if !section.is_empty() {
                                r.abstract_sections.push(section.to_string());
                            }
                        }
                    }
                    b"ArticleTitle" => {
                        if let Some(r) = current.as_mut() {
                            r.title = r.title.trim().to_string();
                        }
                    }
                    b"Author" => {
                        if let Some(r) = current.as_mut() {
                            let name = match (r.fore_name.is_empty(), r.last_name.is_empty()) {
                                (false, false) => Some(format!("{} {}", r.fore_name, r.last_name)),
                                (true, false) => Some(r.last_name.clone()),
                                _ if !r.collective_name.is_empty() => Some(r.collective_name.clone()),
                                _ => None,
                            };
                            r.authors.extend(name);
                        }
                    }
                    b"ArticleId" => in_doi = false,
                    b"PubmedArticle" => {
                        if let Some(r) = current.take() {
                            match r.finish() {
                                Some(article) => articles.push(article),
                                None => warn!("Skipping PubMed record without PMID"),
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(articles)
}
