//! Structured analysis schema.
//!
//! Strict types: constructing an [`Analysis`] fails when a required field is
//! absent or an enum field holds anything outside its closed value set.
//! Wire names follow the JSON the model is asked to produce
//! (`type`, `evidence_mentioned`, `quote_from_abstract`).

use std::fmt;
use std::str::FromStr;

use oncolit_ingestion::Article;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Loosely-typed key/value record decoded from a model reply.
pub type Record = Map<String, Value>;

/// An enum field held a string outside its closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} is not a valid {}", self.value, self.field)
    }
}

impl std::error::Error for UnknownVariant {}

// ── Enums ─────────────────────────────────────────────────────────────────────

/// The gene's role in a given cancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    TumorSuppressor,
    Oncogene,
    Both,
    Unclear,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::TumorSuppressor, Role::Oncogene, Role::Both, Role::Unclear];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::TumorSuppressor => "tumor_suppressor",
            Role::Oncogene        => "oncogene",
            Role::Both            => "both",
            Role::Unclear         => "unclear",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownVariant { field: "role", value: s.to_string() })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-assessed certainty of a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub const ALL: [Confidence; 3] = [Confidence::High, Confidence::Medium, Confidence::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High   => "high",
            Confidence::Medium => "medium",
            Confidence::Low    => "low",
        }
    }
}

impl FromStr for Confidence {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Confidence::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant { field: "confidence", value: s.to_string() })
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

/// One cancer type's classification for the target gene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancerFinding {
    #[serde(rename = "type")]
    pub cancer_type: String,
    pub role: Role,
    #[serde(rename = "evidence_mentioned", default)]
    pub evidence: Vec<String>,
    pub confidence: Confidence,
    #[serde(rename = "quote_from_abstract", default)]
    pub supporting_quote: Option<String>,
}

impl CancerFinding {
    /// Keys a finding may carry on the wire.
    pub const FIELDS: [&'static str; 5] =
        ["type", "role", "evidence_mentioned", "confidence", "quote_from_abstract"];
}

/// Clinical and/or basic-research design of the source work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyDesign {
    pub clinical: bool,
    #[serde(default)]
    pub clinical_description: Option<String>,
    pub basic: bool,
    #[serde(default)]
    pub basic_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismSummary {
    #[serde(default)]
    pub tumor_suppressor_mechanisms: Vec<String>,
    #[serde(default)]
    pub oncogenic_mechanisms: Vec<String>,
    pub mutations_described: bool,
    #[serde(default)]
    pub mutation_details: Option<String>,
}

impl Default for MechanismSummary {
    fn default() -> Self {
        Self {
            tumor_suppressor_mechanisms: vec![],
            oncogenic_mechanisms: vec![],
            mutations_described: false,
            mutation_details: None,
        }
    }
}

/// The full structured result for one abstract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub cancers: Vec<CancerFinding>,
    pub study_types: StudyDesign,
    pub mechanisms: MechanismSummary,
    pub confidence: Confidence,
    pub reasoning: String,
    #[serde(default)]
    pub ambiguities: Option<String>,
    pub needs_full_text: bool,
}

impl Analysis {
    /// Keys an analysis may carry on the wire.
    pub const FIELDS: [&'static str; 7] = [
        "cancers",
        "study_types",
        "mechanisms",
        "confidence",
        "reasoning",
        "ambiguities",
        "needs_full_text",
    ];

    /// Strict construction from a loosely-typed record.
    /// Unrecognised keys are ignored.
    pub fn from_record(record: &Record) -> Result<Self, ValidationError> {
        let analysis: Analysis = serde_json::from_value(Value::Object(record.clone()))?;
        analysis.validate()?;
        Ok(analysis)
    }

    pub fn to_record(&self) -> Record {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Record::new(),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(i) = self.cancers.iter().position(|c| c.cancer_type.trim().is_empty()) {
            return Err(ValidationError::new(format!("cancers[{i}].type must not be empty")));
        }
        Ok(())
    }

    /// A fully-populated instance, used as the reply template in prompts.
    pub fn example() -> Self {
        Analysis {
            cancers: vec![CancerFinding {
                cancer_type: "breast cancer".to_string(),
                role: Role::TumorSuppressor,
                evidence: vec!["deletion".to_string(), "reduced_expression".to_string()],
                confidence: Confidence::High,
                supporting_quote: Some(
                    "PP2A deletion promotes tumor growth in breast cancer".to_string(),
                ),
            }],
            study_types: StudyDesign {
                clinical: true,
                clinical_description: Some("47 breast cancer patient samples".to_string()),
                basic: true,
                basic_description: Some("MCF7 and MDA-MB-231 cell lines".to_string()),
            },
            mechanisms: MechanismSummary {
                tumor_suppressor_mechanisms: vec![
                    "deletion".to_string(),
                    "loss_of_function".to_string(),
                ],
                oncogenic_mechanisms: vec![],
                mutations_described: false,
                mutation_details: None,
            },
            confidence: Confidence::High,
            reasoning: "Abstract explicitly states PP2A deletion promotes cancer growth".to_string(),
            ambiguities: None,
            needs_full_text: false,
        }
    }
}

/// An article's metadata paired with its analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedItem {
    pub pmid: String,
    #[serde(default)]
    pub doi: String,
    pub title: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub journal: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Target gene the analysis was scoped to.
    pub search_gene: String,
    pub analysis: Analysis,
}

impl AnalyzedItem {
    pub fn new(article: &Article, gene: &str, analysis: Analysis) -> Self {
        Self {
            pmid: article.pmid.clone(),
            doi: article.doi.clone(),
            title: article.title.clone(),
            year: article.year(),
            authors: article.authors.clone(),
            journal: article.journal.clone(),
            abstract_text: article.abstract_text.clone(),
            search_gene: gene.to_string(),
            analysis,
        }
    }
}

/// An analysis tagged with the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub model: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub analysis: Analysis,
}
