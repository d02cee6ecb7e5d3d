//! Single-item analysis: prompt, model call, parse, validate or repair.

use std::sync::Arc;
use std::time::Instant;

use oncolit_ingestion::Article;
use oncolit_llm::audit::LlmAuditEntry;
use oncolit_llm::{LlmBackend, LlmError, LlmRequest};
use tracing::{debug, error, instrument, warn};

use crate::error::AnalysisError;
use crate::parser::{parse_response, snippet};
use crate::prompts::{PromptStyle, SYSTEM_PROMPT};
use crate::repair;
use crate::schema::{AgentResult, Analysis, AnalyzedItem};

pub const DEFAULT_REASONING_EFFORT: &str = "minimal";

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    /// Model name sent with each request; the backend default when `None`.
    pub model: Option<String>,
    pub prompt_style: PromptStyle,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model: None,
            prompt_style: PromptStyle::default(),
            max_tokens: None,
            temperature: None,
            reasoning_effort: Some(DEFAULT_REASONING_EFFORT.to_string()),
        }
    }
}

/// Analyses one article at a time against a model backend.
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct Analyzer {
    backend: Arc<dyn LlmBackend>,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend, config: AnalyzerConfig::default() }
    }

    pub fn with_config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_prompt_style(mut self, style: PromptStyle) -> Self {
        self.config.prompt_style = style;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Name of the model answering the requests.
    pub fn model(&self) -> &str {
        self.config.model.as_deref().unwrap_or_else(|| self.backend.model_id())
    }

    pub fn build_prompt(&self, gene: &str, abstract_text: &str) -> String {
        self.config.prompt_style.build(gene, abstract_text)
    }

    fn request(&self, prompt: String) -> LlmRequest {
        LlmRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            reasoning_effort: self.config.reasoning_effort.clone(),
            ..LlmRequest::json(SYSTEM_PROMPT, prompt)
        }
    }

    async fn call(&self, article: &Article, gene: &str) -> Result<String, LlmError> {
        let request = self.request(self.build_prompt(gene, &article.abstract_text));

        let started = Instant::now();
        let response = self.backend.complete(request).await?;
        LlmAuditEntry::new(
            Some(article.pmid.clone()),
            &response,
            started.elapsed().as_millis() as u64,
        )
        .log();

        debug!(reply = %snippet(&response.content), "Model reply");
        Ok(response.content)
    }

    /// Run one model call and turn the reply into a valid [`Analysis`].
    #[instrument(skip_all, fields(pmid = %article.pmid, gene = %gene))]
    pub async fn analyze_article(&self, article: &Article, gene: &str) -> Result<Analysis, AnalysisError> {
        let raw = self.call(article, gene).await?;
        interpret_reply(&raw)
    }

    /// Analyse one article and pair the result with its metadata.
    pub async fn analyze(&self, article: &Article, gene: &str) -> Result<AnalyzedItem, AnalysisError> {
        let analysis = self.analyze_article(article, gene).await?;
        Ok(AnalyzedItem::new(article, gene, analysis))
    }

    /// Analyse one article and tag the result with the model and time.
    pub async fn create_agent_result(
        &self,
        article: &Article,
        gene: &str,
    ) -> Result<AgentResult, AnalysisError> {
        let analysis = self.analyze_article(article, gene).await?;
        Ok(AgentResult {
            model: self.model().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            analysis,
        })
    }
}

/// Parse a raw reply and construct an [`Analysis`], repairing once if needed.
pub fn interpret_reply(raw: &str) -> Result<Analysis, AnalysisError> {
    let record = parse_response(raw).inspect_err(|e| {
        error!(error = %e, reply = %snippet(raw), "Model reply is not a JSON object");
    })?;

    let first = match Analysis::from_record(&record) {
        Ok(analysis) => return Ok(analysis),
        Err(e) => e,
    };
    warn!(error = %first, "Reply failed validation, repairing");

    match repair::repair(record, first) {
        Ok(repaired) => {
            debug!(patches = repaired.patches.len(), "Reply repaired");
            Ok(repaired.analysis)
        }
        Err(e) => {
            error!(error = %e, first_error = %e.first, reply = %snippet(raw), "Reply could not be repaired");
            Err(e.into())
        }
    }
}
