//! Prompt templates for abstract analysis.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::schema::Analysis;

/// System instruction sent with every analysis call.
pub const SYSTEM_PROMPT: &str = "You are a scientific literature analyst specialising in cancer \
genetics. Reply with a single valid JSON object and nothing else.";

/// Which user-prompt template to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// Rules plus worked examples.
    #[default]
    Simple,
    /// Definitions, numbered instructions and reminders.
    Detailed,
}

impl PromptStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptStyle::Simple => "simple",
            PromptStyle::Detailed => "detailed",
        }
    }

    pub fn build(&self, gene: &str, abstract_text: &str) -> String {
        match self {
            PromptStyle::Simple => build_simple_prompt(gene, abstract_text),
            PromptStyle::Detailed => build_analysis_prompt(gene, abstract_text),
        }
    }
}

impl FromStr for PromptStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(PromptStyle::Simple),
            "detailed" => Ok(PromptStyle::Detailed),
            other => Err(format!("unknown prompt style '{other}' (expected simple or detailed)")),
        }
    }
}

impl fmt::Display for PromptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The reply template, rendered from a real [`Analysis`] so it cannot drift
/// from the schema.
pub fn json_schema_example() -> String {
    serde_json::to_string_pretty(&Analysis::example()).unwrap_or_default()
}

fn tumor_suppressor_definition(gene: &str) -> String {
    format!(
        "Treat {gene} as a TUMOR SUPPRESSOR when:
- its loss, deletion or inactivation promotes cancer
- lower expression goes with worse outcome
- its mutations are loss-of-function
- it normally restrains growth

Typical wording:
- \"deletion of {gene} promotes...\"
- \"loss of {gene} increases proliferation\"
- \"{gene} inactivation leads to...\"
- \"reduced {gene} expression correlates with...\"
- \"restoring {gene} suppresses...\""
    )
}

fn oncogene_definition(gene: &str) -> String {
    format!(
        "Treat {gene} as an ONCOGENE when:
- its gain, overexpression or activation promotes cancer
- higher expression goes with worse outcome
- its mutations are gain-of-function or activating
- it drives growth when active

Typical wording:
- \"{gene} overexpression drives...\"
- \"{gene} amplification promotes...\"
- \"activating mutations in {gene}...\"
- \"knockdown or inhibition of {gene} reduces tumour growth\"
- \"increased {gene} correlates with...\""
    )
}

const FIELD_TABLE: &str = r#"Field types and allowed values (copy the strings exactly):
- "role": one of "tumor_suppressor", "oncogene", "both", "unclear"
  never "unknown", "uncertain" or "ambiguous"; use "unclear"
- "confidence": one of "high", "medium", "low"
  never "unclear", "unknown" or "moderate"
- "evidence_mentioned": list of short keywords, e.g. ["deletion", "overexpression"]
- "tumor_suppressor_mechanisms": list of short keywords, e.g. ["deletion", "loss_of_function"]
- "oncogenic_mechanisms": list of short keywords, e.g. ["overexpression", "amplification"]
- "mutation_details": one string or null, never a list
- "quote_from_abstract": one exact quote or null
- "clinical", "basic": true or false

Confidence levels: "high" for direct evidence, "medium" for indirect evidence,
"low" for weak or conflicting evidence. "unclear" is only valid for role."#;

/// The long-form prompt.
pub fn build_analysis_prompt(gene: &str, abstract_text: &str) -> String {
    format!(
        "You extract structured information about the gene **{gene}** from a scientific abstract.

Only report findings about {gene}. Ignore other genes the abstract mentions.

## CLASSIFICATION RULES

{ts}

{onc}

## INSTRUCTIONS

1. List every cancer type mentioned, using full names (\"breast cancer\", not \"breast\").
   If none is mentioned, say so in the reasoning.
2. For each cancer, give the role of {gene}:
   - tumor_suppressor: loss or inactivation promotes cancer
   - oncogene: overexpression or activation drives cancer
   - both: the abstract shows different roles in different contexts
   - unclear: not enough information
3. Evidence to look for:
   - tumor suppressor: deletion, loss of function, reduced expression, inactivation, methylation
   - oncogene: overexpression, activating mutation, amplification, gain of function
4. Study design:
   - clinical: patient samples, trials, human tissue, clinical data
   - basic: cell lines, animal models, in vitro work, molecular mechanism
5. Confidence:
   - high: explicit statement with mechanistic detail
   - medium: strongly implied
   - low: vague or contradictory
6. Full text:
   - recommend it when the abstract is ambiguous, contradictory or lacks mechanism
   - do not recommend it when the classification is clear

## ABSTRACT

{abstract_text}

## OUTPUT FORMAT

Reply with valid JSON only, no code fences and no commentary, in exactly this shape:

{example}

## REMINDERS

- Only {gene} matters.
- Use what the abstract states; do not infer beyond it.
- When unsure, classify as \"unclear\" and describe the ambiguity.
- Keep confidence conservative.
- Quote the abstract to support each classification where possible.

{FIELD_TABLE}

Analyse the abstract now and reply with JSON only:",
        ts = tumor_suppressor_definition(gene),
        onc = oncogene_definition(gene),
        example = json_schema_example(),
    )
}

/// The short, example-driven prompt.
pub fn build_simple_prompt(gene: &str, abstract_text: &str) -> String {
    format!(
        "Extract cancer genetics findings about {gene} from this abstract.

Roles (exact words):
- tumor_suppressor: loss causes cancer (deletion, inactivation, reduced expression)
- oncogene: gain causes cancer (overexpression, activating mutation, amplification)
- both: different roles in different contexts
- unclear: not enough information

Examples:
\"{gene} deletion promotes tumor growth\" -> \"tumor_suppressor\"
\"{gene} overexpression drives proliferation\" -> \"oncogene\"
\"{gene} has context-dependent dual roles\" -> \"both\"
\"knockdown of {gene} inhibits tumour growth\" -> \"oncogene\"
\"too little information about {gene}\" -> \"unclear\"

Abstract:
{abstract_text}

{FIELD_TABLE}

Reply with JSON only, no code fences:
{example}",
        example = json_schema_example(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABSTRACT: &str = "PPP2R2A deletion promotes tumor growth in breast cancer.";

    #[test]
    fn test_both_styles_include_gene_and_abstract() {
        for style in [PromptStyle::Simple, PromptStyle::Detailed] {
            let prompt = style.build("PPP2R2A", ABSTRACT);
            assert!(prompt.contains("PPP2R2A"), "{style} prompt lacks gene");
            assert!(prompt.contains(ABSTRACT), "{style} prompt lacks abstract");
            assert!(prompt.contains("\"needs_full_text\""), "{style} prompt lacks example");
        }
    }

    #[test]
    fn test_simple_prompt_is_shorter() {
        let simple = build_simple_prompt("TP53", ABSTRACT);
        let detailed = build_analysis_prompt("TP53", ABSTRACT);
        assert!(simple.len() < detailed.len());
    }

    #[test]
    fn test_detailed_prompt_parameterises_definitions() {
        let prompt = build_analysis_prompt("KRAS", ABSTRACT);
        assert!(prompt.contains("deletion of KRAS promotes"));
        assert!(prompt.contains("KRAS overexpression drives"));
        assert!(!prompt.contains("{gene}"));
    }

    #[test]
    fn test_json_example_is_a_valid_analysis() {
        let value: serde_json::Value = serde_json::from_str(&json_schema_example()).unwrap();
        let record = value.as_object().unwrap();
        assert!(Analysis::from_record(record).is_ok());
    }

    #[test]
    fn test_prompt_style_parsing() {
        assert_eq!("Detailed".parse::<PromptStyle>().unwrap(), PromptStyle::Detailed);
        assert_eq!(PromptStyle::default(), PromptStyle::Simple);
        assert!("terse".parse::<PromptStyle>().is_err());
    }
}
