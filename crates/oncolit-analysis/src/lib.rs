//! oncolit-analysis — Gene role classification over literature abstracts.
//! Parses model replies into the analysis schema, repairs near-miss replies,
//! runs bounded-concurrency batches and aggregates the results.

pub mod error;
pub mod schema;
pub mod parser;
pub mod repair;
pub mod prompts;
pub mod analyzer;
pub mod batch;
pub mod summary;
pub mod report;
pub mod api;

pub use analyzer::{interpret_reply, Analyzer, AnalyzerConfig};
pub use api::{analyze_gene_literature, GeneLiteratureOutcome, GeneLiteratureRequest};
pub use batch::{run_batch, BatchOptions, BatchRun, BatchStrategy};
pub use error::{AnalysisError, AnalysisErrorKind, ParseError, PipelineError, UnrecoverableResponseError, ValidationError};
pub use prompts::PromptStyle;
pub use schema::{AgentResult, Analysis, AnalyzedItem, CancerFinding, Confidence, MechanismSummary, Role, StudyDesign};
pub use summary::{generate_summary, EmptySummary, Summary, SummaryStats};
