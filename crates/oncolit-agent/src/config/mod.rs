//! Configuration loading for oncolit.
//! Reads oncolit.toml from the current directory or the path in ONCOLIT_CONFIG.
//! Every field has a default, so a missing file or section is not an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use oncolit_analysis::{AnalyzerConfig, BatchStrategy, PromptStyle};
use oncolit_common::{OncolitError, Result};
use oncolit_ingestion::sources::pubmed::PubMedConfig;
use oncolit_llm::backend::{OllamaBackend, OpenAiBackend, OpenAiCompatibleBackend};
use oncolit_llm::LlmBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "ONCOLIT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "oncolit.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pubmed: PubMedSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    Openai,
    OpenaiCompatible,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    /// Required for `openai_compatible`; Ollama defaults to localhost.
    pub base_url: Option<String>,
    /// Falls back to `OPENAI_API_KEY` when empty.
    #[serde(default)]
    pub api_key: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    #[serde(default = "default_reasoning_effort")]
    pub reasoning_effort: Option<String>,
}

fn default_model()            -> String         { "gpt-5-nano".to_string() }
fn default_reasoning_effort() -> Option<String> { Some("minimal".to_string()) }
fn default_ollama_url()       -> String         { "http://localhost:11434".to_string() }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            base_url: None,
            api_key: String::new(),
            max_tokens: None,
            temperature: None,
            reasoning_effort: default_reasoning_effort(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubMedSection {
    /// Falls back to `NCBI_EMAIL` when empty.
    #[serde(default)]
    pub email: String,
    /// Falls back to `NCBI_API_KEY` when empty.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Default result cap for a run (1..=10000).
    #[serde(default = "default_retmax")]
    pub retmax: usize,
    /// Records per efetch request (1..=500).
    #[serde(default = "default_fetch_batch")]
    pub batch_size: usize,
}

fn default_tool()        -> String { "oncolit".to_string() }
fn default_retmax()      -> usize  { 100 }
fn default_fetch_batch() -> usize  { 50 }

impl Default for PubMedSection {
    fn default() -> Self {
        Self {
            email: String::new(),
            api_key: String::new(),
            tool: default_tool(),
            retmax: default_retmax(),
            batch_size: default_fetch_batch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSection {
    #[serde(default)]
    pub prompt_style: PromptStyle,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub strategy: BatchStrategy,
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
}

fn default_max_concurrent() -> usize   { 10 }
fn default_save_dir()       -> PathBuf { PathBuf::from("results") }

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            prompt_style: PromptStyle::default(),
            max_concurrent: default_max_concurrent(),
            strategy: BatchStrategy::default(),
            save_dir: default_save_dir(),
        }
    }
}

mod tests;

impl Config {
    /// Load from `ONCOLIT_CONFIG` or `./oncolit.toml`, then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var(CONFIG_ENV).ok().filter(|p| !p.trim().is_empty());
        let path = PathBuf::from(explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else if explicit.is_some() {
            return Err(OncolitError::Config(format!(
                "Config file not found: {} (set by {CONFIG_ENV})",
                path.display()
            )));
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Fill empty secrets from the environment. File values win when set.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.llm.api_key.trim().is_empty() {
            if let Some(key) = var("OPENAI_API_KEY") {
                self.llm.api_key = key;
            }
        }
        if self.pubmed.email.trim().is_empty() {
            if let Some(email) = var("NCBI_EMAIL") {
                self.pubmed.email = email;
            }
        }
        if self.pubmed.api_key.trim().is_empty() {
            if let Some(key) = var("NCBI_API_KEY") {
                self.pubmed.api_key = key;
            }
        }
    }

    /// Check required values and clamp ranges.
    pub fn validate(&mut self) -> Result<()> {
        if self.pubmed.email.trim().is_empty() {
            return Err(OncolitError::Config(format!(
                "NCBI email required. Set pubmed.email in {DEFAULT_CONFIG_PATH} or the NCBI_EMAIL env var"
            )));
        }
        match self.llm.provider {
            LlmProvider::Openai if self.llm.api_key.trim().is_empty() => {
                return Err(OncolitError::Config(format!(
                    "OpenAI API key required. Set llm.api_key in {DEFAULT_CONFIG_PATH} or the OPENAI_API_KEY env var"
                )));
            }
            LlmProvider::OpenaiCompatible if self.llm.base_url.is_none() => {
                return Err(OncolitError::Config(
                    "llm.base_url is required for the openai_compatible provider".to_string(),
                ));
            }
            _ => {}
        }
        self.pubmed.retmax = self.pubmed.retmax.clamp(1, 10_000);
        self.pubmed.batch_size = self.pubmed.batch_size.clamp(1, 500);
        Ok(())
    }

    /// Construct the model backend. `model` overrides `llm.model`.
    pub fn build_backend(&self, model: Option<&str>) -> Arc<dyn LlmBackend> {
        let model = model.unwrap_or(&self.llm.model).to_string();
        let api_key = Some(self.llm.api_key.clone()).filter(|k| !k.trim().is_empty());

        match self.llm.provider {
            LlmProvider::Openai => Arc::new(OpenAiBackend::new(self.llm.api_key.clone(), model)),
            LlmProvider::OpenaiCompatible => Arc::new(OpenAiCompatibleBackend::new(
                self.llm.base_url.clone().unwrap_or_default(),
                model,
                api_key,
            )),
            LlmProvider::Ollama => Arc::new(OllamaBackend::new(
                self.llm.base_url.clone().unwrap_or_else(default_ollama_url),
                model,
            )),
        }
    }

    pub fn analyzer_config(&self, model: Option<String>, style: Option<PromptStyle>) -> AnalyzerConfig {
        AnalyzerConfig {
            model: Some(model.unwrap_or_else(|| self.llm.model.clone())),
            prompt_style: style.unwrap_or(self.analysis.prompt_style),
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            reasoning_effort: self.llm.reasoning_effort.clone(),
        }
    }

    pub fn pubmed_config(&self) -> Result<PubMedConfig> {
        Ok(PubMedConfig::new(self.pubmed.email.clone())?
            .with_api_key(Some(self.pubmed.api_key.clone()))
            .with_tool(self.pubmed.tool.clone())
            .with_batch_size(self.pubmed.batch_size))
    }
}
