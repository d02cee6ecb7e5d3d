//! Best-effort repair of model replies that fail strict validation.
//!
//! A reply is loaded into an [`AnalysisDraft`], where every field is
//! optional and enum fields are [`Slot`]s that remember whether the model
//! sent nothing, garbage, or a valid value. [`AnalysisDraft::normalize`]
//! applies a fixed table of patches, each idempotent and leaving valid data
//! alone, and records every change as a [`Patch`]. The draft is then turned
//! back into a record and strictly constructed exactly once more.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use crate::error::{UnrecoverableResponseError, ValidationError};
use crate::schema::{Analysis, Confidence, Record, Role};

/// Reasoning used when the reply carries none.
pub const INCOMPLETE_REASONING: &str = "Incomplete analysis from LLM";

/// State of a field that must hold a specific shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    Missing,
    /// Present, but not of the expected shape or value set.
    Malformed(Value),
    Present(T),
}

impl<T> Slot<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Slot::Present(v) => Some(v),
            _ => None,
        }
    }
}

/// Parse-to-enum that never fails: anything unrecognised is kept as `Malformed`.
fn enum_slot<T: FromStr>(value: Option<Value>) -> Slot<T> {
    match value {
        None => Slot::Missing,
        Some(Value::String(s)) => match s.parse() {
            Ok(v) => Slot::Present(v),
            Err(_) => Slot::Malformed(Value::String(s)),
        },
        Some(other) => Slot::Malformed(other),
    }
}

fn object_slot<T>(value: Option<Value>, build: impl FnOnce(Record) -> T) -> Slot<T> {
    match value {
        None => Slot::Missing,
        Some(Value::Object(map)) => Slot::Present(build(map)),
        Some(other) => Slot::Malformed(other),
    }
}

fn put(map: &mut Record, key: &str, value: Option<Value>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v);
    }
}

fn put_enum<T: fmt::Display>(map: &mut Record, key: &str, slot: Slot<T>) {
    match slot {
        Slot::Missing => {}
        Slot::Malformed(v) => {
            map.insert(key.to_string(), v);
        }
        Slot::Present(v) => {
            map.insert(key.to_string(), Value::String(v.to_string()));
        }
    }
}

fn put_object<T>(map: &mut Record, key: &str, slot: Slot<T>, into: impl FnOnce(T) -> Record) {
    match slot {
        Slot::Missing => {}
        Slot::Malformed(v) => {
            map.insert(key.to_string(), v);
        }
        Slot::Present(v) => {
            map.insert(key.to_string(), Value::Object(into(v)));
        }
    }
}

// ── Patches ───────────────────────────────────────────────────────────────────

/// One change made by the repair table.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    ConfidenceDefaulted { was: Option<Value> },
    ReasoningLifted,
    ReasoningDefaulted,
    NeedsFullTextDefaulted,
    StudyTypesReset,
    StudyFlagDefaulted { field: &'static str },
    MechanismsDefaulted,
    MutationDetailsStringified,
    CancersDefaulted,
    RoleCoerced { index: usize, was: Value },
    FindingConfidenceCoerced { index: usize, was: Value },
    FindingFieldsStripped { index: usize, fields: Vec<String> },
    FieldsStripped { fields: Vec<String> },
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::ConfidenceDefaulted { was: Some(v) } => write!(f, "confidence: {v} -> low"),
            Patch::ConfidenceDefaulted { was: None } => write!(f, "confidence: missing -> low"),
            Patch::ReasoningLifted => write!(f, "reasoning: taken from conclusion object"),
            Patch::ReasoningDefaulted => write!(f, "reasoning: missing -> default"),
            Patch::NeedsFullTextDefaulted => write!(f, "needs_full_text: missing -> true"),
            Patch::StudyTypesReset => write!(f, "study_types: missing or not an object -> {{}}"),
            Patch::StudyFlagDefaulted { field } => write!(f, "study_types.{field}: missing -> false"),
            Patch::MechanismsDefaulted => write!(f, "mechanisms: missing -> defaults"),
            Patch::MutationDetailsStringified => {
                write!(f, "mechanisms.mutation_details: list/object -> string")
            }
            Patch::CancersDefaulted => write!(f, "cancers: missing -> []"),
            Patch::RoleCoerced { index, was } => write!(f, "cancers[{index}].role: {was} -> unclear"),
            Patch::FindingConfidenceCoerced { index, was } => {
                write!(f, "cancers[{index}].confidence: {was} -> low")
            }
            Patch::FindingFieldsStripped { index, fields } => {
                write!(f, "cancers[{index}]: removed {}", fields.join(", "))
            }
            Patch::FieldsStripped { fields } => write!(f, "removed {}", fields.join(", ")),
        }
    }
}

// ── Drafts ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FindingDraft {
    pub cancer_type: Option<Value>,
    pub role: Slot<Role>,
    pub evidence: Option<Value>,
    pub confidence: Slot<Confidence>,
    pub supporting_quote: Option<Value>,
    /// Keys outside [`crate::schema::CancerFinding::FIELDS`].
    pub extra: Record,
}

impl FindingDraft {
    pub fn from_record(mut map: Record) -> Self {
        Self {
            cancer_type: map.remove("type"),
            role: enum_slot(map.remove("role")),
            evidence: map.remove("evidence_mentioned"),
            confidence: enum_slot(map.remove("confidence")),
            supporting_quote: map.remove("quote_from_abstract"),
            extra: map,
        }
    }

    pub fn into_record(self) -> Record {
        let mut map = self.extra;
        put(&mut map, "type", self.cancer_type);
        put_enum(&mut map, "role", self.role);
        put(&mut map, "evidence_mentioned", self.evidence);
        put_enum(&mut map, "confidence", self.confidence);
        put(&mut map, "quote_from_abstract", self.supporting_quote);
        map
    }

    // A missing role or confidence stays missing; strict construction reports it.
    fn normalize(&mut self, index: usize, patches: &mut Vec<Patch>) {
        if let Slot::Malformed(was) = &self.role {
            patches.push(Patch::RoleCoerced { index, was: was.clone() });
            self.role = Slot::Present(Role::Unclear);
        }
        if let Slot::Malformed(was) = &self.confidence {
            patches.push(Patch::FindingConfidenceCoerced { index, was: was.clone() });
            self.confidence = Slot::Present(Confidence::Low);
        }
        if !self.extra.is_empty() {
            let fields = std::mem::take(&mut self.extra).into_iter().map(|(k, _)| k).collect();
            patches.push(Patch::FindingFieldsStripped { index, fields });
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyDesignDraft {
    pub clinical: Option<Value>,
    pub clinical_description: Option<Value>,
    pub basic: Option<Value>,
    pub basic_description: Option<Value>,
    pub extra: Record,
}

impl StudyDesignDraft {
    pub fn from_record(mut map: Record) -> Self {
        Self {
            clinical: map.remove("clinical"),
            clinical_description: map.remove("clinical_description"),
            basic: map.remove("basic"),
            basic_description: map.remove("basic_description"),
            extra: map,
        }
    }

    pub fn into_record(self) -> Record {
        let mut map = self.extra;
        put(&mut map, "clinical", self.clinical);
        put(&mut map, "clinical_description", self.clinical_description);
        put(&mut map, "basic", self.basic);
        put(&mut map, "basic_description", self.basic_description);
        map
    }

    fn normalize(&mut self, patches: &mut Vec<Patch>) {
        if self.clinical.is_none() {
            self.clinical = Some(Value::Bool(false));
            patches.push(Patch::StudyFlagDefaulted { field: "clinical" });
        }
        if self.basic.is_none() {
            self.basic = Some(Value::Bool(false));
            patches.push(Patch::StudyFlagDefaulted { field: "basic" });
        }
        self.clinical_description.get_or_insert(Value::Null);
        self.basic_description.get_or_insert(Value::Null);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MechanismDraft {
    pub tumor_suppressor_mechanisms: Option<Value>,
    pub oncogenic_mechanisms: Option<Value>,
    pub mutations_described: Option<Value>,
    pub mutation_details: Option<Value>,
    pub extra: Record,
}

impl Default for MechanismDraft {
    fn default() -> Self {
        Self {
            tumor_suppressor_mechanisms: Some(Value::Array(vec![])),
            oncogenic_mechanisms: Some(Value::Array(vec![])),
            mutations_described: Some(Value::Bool(false)),
            mutation_details: Some(Value::Null),
            extra: Record::new(),
        }
    }
}

impl MechanismDraft {
    pub fn from_record(mut map: Record) -> Self {
        Self {
            tumor_suppressor_mechanisms: map.remove("tumor_suppressor_mechanisms"),
            oncogenic_mechanisms: map.remove("oncogenic_mechanisms"),
            mutations_described: map.remove("mutations_described"),
            mutation_details: map.remove("mutation_details"),
            extra: map,
        }
    }

    pub fn into_record(self) -> Record {
        let mut map = self.extra;
        put(&mut map, "tumor_suppressor_mechanisms", self.tumor_suppressor_mechanisms);
        put(&mut map, "oncogenic_mechanisms", self.oncogenic_mechanisms);
        put(&mut map, "mutations_described", self.mutations_described);
        put(&mut map, "mutation_details", self.mutation_details);
        map
    }

    fn normalize(&mut self, patches: &mut Vec<Patch>) {
        if let Some(details @ (Value::Array(_) | Value::Object(_))) = &self.mutation_details {
            self.mutation_details = Some(Value::String(details.to_string()));
            patches.push(Patch::MutationDetailsStringified);
        }
    }
}

/// A reply record with every field optional.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisDraft {
    pub cancers: Slot<Vec<Slot<FindingDraft>>>,
    pub study_types: Slot<StudyDesignDraft>,
    pub mechanisms: Slot<MechanismDraft>,
    pub confidence: Slot<Confidence>,
    pub reasoning: Option<Value>,
    pub ambiguities: Option<Value>,
    pub needs_full_text: Option<Value>,
    /// Keys outside [`Analysis::FIELDS`].
    pub extra: Record,
}

impl AnalysisDraft {
    pub fn from_record(mut map: Record) -> Self {
        let cancers = match map.remove("cancers") {
            None => Slot::Missing,
            Some(Value::Array(items)) => Slot::Present(
                items
                    .into_iter()
                    .map(|item| object_slot(Some(item), FindingDraft::from_record))
                    .collect(),
            ),
            Some(other) => Slot::Malformed(other),
        };

        Self {
            cancers,
            study_types: object_slot(map.remove("study_types"), StudyDesignDraft::from_record),
            mechanisms: object_slot(map.remove("mechanisms"), MechanismDraft::from_record),
            confidence: enum_slot(map.remove("confidence")),
            reasoning: map.remove("reasoning"),
            ambiguities: map.remove("ambiguities"),
            needs_full_text: map.remove("needs_full_text"),
            extra: map,
        }
    }

    pub fn into_record(self) -> Record {
        let mut map = self.extra;
        match self.cancers {
            Slot::Missing => {}
            Slot::Malformed(v) => {
                map.insert("cancers".to_string(), v);
            }
            Slot::Present(items) => {
                let items = items
                    .into_iter()
                    .map(|item| match item {
                        Slot::Present(f) => Value::Object(f.into_record()),
                        Slot::Malformed(v) => v,
                        Slot::Missing => Value::Null,
                    })
                    .collect();
                map.insert("cancers".to_string(), Value::Array(items));
            }
        }
        put_object(&mut map, "study_types", self.study_types, StudyDesignDraft::into_record);
        put_object(&mut map, "mechanisms", self.mechanisms, MechanismDraft::into_record);
        put_enum(&mut map, "confidence", self.confidence);
        put(&mut map, "reasoning", self.reasoning);
        put(&mut map, "ambiguities", self.ambiguities);
        put(&mut map, "needs_full_text", self.needs_full_text);
        map
    }

    /// Apply the repair table in order and return what changed.
    pub fn normalize(&mut self) -> Vec<Patch> {
        let mut patches = Vec::new();

        // 1. overall confidence
        match &self.confidence {
            Slot::Present(_) => {}
            Slot::Missing => patches.push(Patch::ConfidenceDefaulted { was: None }),
            Slot::Malformed(v) => patches.push(Patch::ConfidenceDefaulted { was: Some(v.clone()) }),
        }
        if self.confidence.present().is_none() {
            self.confidence = Slot::Present(Confidence::Low);
        }

        // 2. reasoning, possibly nested in a "conclusion" object
        if self.reasoning.is_none() {
            let lifted = self
                .extra
                .get("conclusion")
                .and_then(Value::as_object)
                .and_then(|c| c.get("reasoning"))
                .cloned();
            match lifted {
                Some(r) => {
                    self.reasoning = Some(r);
                    patches.push(Patch::ReasoningLifted);
                }
                None => {
                    self.reasoning = Some(Value::String(INCOMPLETE_REASONING.to_string()));
                    patches.push(Patch::ReasoningDefaulted);
                }
            }
        }

        // 3. needs_full_text: recommend follow-up when unsure
        if self.needs_full_text.is_none() {
            self.needs_full_text = Some(Value::Bool(true));
            patches.push(Patch::NeedsFullTextDefaulted);
        }

        // 4. study_types
        if self.study_types.present().is_none() {
            self.study_types = Slot::Present(StudyDesignDraft::default());
            patches.push(Patch::StudyTypesReset);
        }
        if let Slot::Present(st) = &mut self.study_types {
            st.normalize(&mut patches);
        }

        // 5. mechanisms
        if self.mechanisms == Slot::Missing {
            self.mechanisms = Slot::Present(MechanismDraft::default());
            patches.push(Patch::MechanismsDefaulted);
        } else if let Slot::Present(m) = &mut self.mechanisms {
            m.normalize(&mut patches);
        }

        // 6. cancers
        if self.cancers == Slot::Missing {
            self.cancers = Slot::Present(vec![]);
            patches.push(Patch::CancersDefaulted);
        } else if let Slot::Present(items) = &mut self.cancers {
            for (index, item) in items.iter_mut().enumerate() {
                if let Slot::Present(finding) = item {
                    finding.normalize(index, &mut patches);
                }
            }
        }

        // 7. unrecognised top-level keys
        if !self.extra.is_empty() {
            let fields = std::mem::take(&mut self.extra).into_iter().map(|(k, _)| k).collect();
            patches.push(Patch::FieldsStripped { fields });
        }

        patches
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// A record that passed strict construction after repair.
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub analysis: Analysis,
    pub patches: Vec<Patch>,
}

/// Apply the repair table to a record without validating the result.
pub fn normalize_record(record: Record) -> (Record, Vec<Patch>) {
    let mut draft = AnalysisDraft::from_record(record);
    let patches = draft.normalize();
    (draft.into_record(), patches)
}

/// Repair a record that failed strict construction with `first`, then try
/// strict construction once more.
pub fn repair(record: Record, first: ValidationError) -> Result<Repaired, UnrecoverableResponseError> {
    let (record, patches) = normalize_record(record);
    for patch in &patches {
        debug!(%patch, "Repaired reply field");
    }

    match Analysis::from_record(&record) {
        Ok(analysis) => Ok(Repaired { analysis, patches }),
        Err(second) => Err(UnrecoverableResponseError { first, second }),
    }
}

/// Strict construction, falling back to [`repair`] on failure.
pub fn validate_or_repair(record: Record) -> Result<Analysis, UnrecoverableResponseError> {
    match Analysis::from_record(&record) {
        Ok(analysis) => Ok(analysis),
        Err(first) => repair(record, first).map(|r| r.analysis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CancerFinding;
    use serde_json::json;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn complete() -> Value {
        json!({
            "cancers": [
                {"type": "breast cancer", "role": "tumor_suppressor",
                 "evidence_mentioned": ["deletion"], "confidence": "high",
                 "quote_from_abstract": "deletion promotes tumor growth"},
                {"type": "lung cancer", "role": "oncogene",
                 "evidence_mentioned": [], "confidence": "medium"}
            ],
            "study_types": {"clinical": true, "clinical_description": "patients",
                            "basic": false, "basic_description": null},
            "mechanisms": {"tumor_suppressor_mechanisms": ["deletion"],
                           "oncogenic_mechanisms": [], "mutations_described": false,
                           "mutation_details": null},
            "confidence": "high",
            "reasoning": "Explicit statement",
            "ambiguities": null,
            "needs_full_text": false
        })
    }

    #[test]
    fn test_valid_record_needs_no_patches() {
        let (out, patches) = normalize_record(record(complete()));
        assert!(patches.is_empty(), "unexpected patches: {patches:?}");
        assert_eq!(Value::Object(out), complete());
    }

    #[test]
    fn test_missing_or_invalid_confidence_becomes_low() {
        for bad in [json!("moderate"), json!("low_to_medium"), json!("unclear"), json!(3), Value::Null] {
            let mut v = complete();
            v["confidence"] = bad.clone();
            let first = Analysis::from_record(&record(v.clone())).unwrap_err();
            let repaired = repair(record(v), first).unwrap();
            assert_eq!(repaired.analysis.confidence, Confidence::Low, "input {bad}");
            assert_eq!(repaired.patches, vec![Patch::ConfidenceDefaulted { was: Some(bad) }]);
        }

        let mut v = record(complete());
        v.remove("confidence");
        let analysis = validate_or_repair(v).unwrap();
        assert_eq!(analysis.confidence, Confidence::Low);
    }

    #[test]
    fn test_invalid_role_is_coerced_and_siblings_untouched() {
        let mut v = complete();
        v["cancers"][1]["role"] = json!("unknown");
        let analysis = validate_or_repair(record(v)).unwrap();

        assert_eq!(analysis.cancers[0].role, Role::TumorSuppressor);
        assert_eq!(analysis.cancers[0].confidence, Confidence::High);
        assert_eq!(
            analysis.cancers[0].supporting_quote.as_deref(),
            Some("deletion promotes tumor growth")
        );
        assert_eq!(analysis.cancers[1].role, Role::Unclear);
        assert_eq!(analysis.cancers[1].cancer_type, "lung cancer");
    }

    #[test]
    fn test_invalid_finding_confidence_becomes_low() {
        let mut v = complete();
        v["cancers"][0]["confidence"] = json!("very high");
        let (_, patches) = normalize_record(record(v.clone()));
        assert_eq!(
            patches,
            vec![Patch::FindingConfidenceCoerced { index: 0, was: json!("very high") }]
        );
        assert_eq!(validate_or_repair(record(v)).unwrap().cancers[0].confidence, Confidence::Low);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let messy = json!({
            "cancers": [
                {"type": "glioma", "role": "suppressor", "confidence": "moderate",
                 "gene": "PPP2R2A", "notes": "extra"}
            ],
            "mechanisms": {"tumor_suppressor_mechanisms": [], "oncogenic_mechanisms": [],
                           "mutations_described": true,
                           "mutation_details": ["R183W", {"site": "exon 3"}]},
            "conclusion": {"reasoning": "Loss promotes growth"},
            "gene": "PPP2R2A"
        });
        let (once, first_patches) = normalize_record(record(messy));
        assert!(!first_patches.is_empty());

        let (twice, second_patches) = normalize_record(once.clone());
        assert_eq!(once, twice);
        assert!(second_patches.is_empty(), "second pass patched: {second_patches:?}");
        assert!(Analysis::from_record(&twice).is_ok());
    }

    #[test]
    fn test_reasoning_is_lifted_from_conclusion() {
        let mut v = record(complete());
        v.remove("reasoning");
        v.insert("conclusion".to_string(), json!({"reasoning": "nested", "role": "oncogene"}));
        let repaired = repair(v.clone(), Analysis::from_record(&v).unwrap_err()).unwrap();
        assert_eq!(repaired.analysis.reasoning, "nested");
        assert!(repaired.patches.contains(&Patch::ReasoningLifted));
        assert!(repaired
            .patches
            .contains(&Patch::FieldsStripped { fields: vec!["conclusion".to_string()] }));
    }

    #[test]
    fn test_missing_reasoning_gets_default_marker() {
        let mut v = record(complete());
        v.remove("reasoning");
        v.insert("conclusion".to_string(), json!("not an object"));
        let analysis = validate_or_repair(v).unwrap();
        assert_eq!(analysis.reasoning, INCOMPLETE_REASONING);
    }

    #[test]
    fn test_missing_needs_full_text_defaults_to_true() {
        let mut v = record(complete());
        v.remove("needs_full_text");
        assert!(validate_or_repair(v).unwrap().needs_full_text);
    }

    #[test]
    fn test_study_types_defaults() {
        let mut v = complete();
        v["study_types"] = json!("clinical");
        let analysis = validate_or_repair(record(v)).unwrap();
        assert!(!analysis.study_types.clinical);
        assert!(!analysis.study_types.basic);
        assert_eq!(analysis.study_types.clinical_description, None);

        let mut v = complete();
        v["study_types"] = json!({"clinical": true, "clinical_description": "cohort"});
        let (_, patches) = normalize_record(record(v.clone()));
        assert_eq!(patches, vec![Patch::StudyFlagDefaulted { field: "basic" }]);
        let analysis = validate_or_repair(record(v)).unwrap();
        assert!(analysis.study_types.clinical);
        assert_eq!(analysis.study_types.clinical_description.as_deref(), Some("cohort"));
    }

    #[test]
    fn test_missing_mechanisms_are_defaulted() {
        let mut v = record(complete());
        v.remove("mechanisms");
        let analysis = validate_or_repair(v).unwrap();
        assert_eq!(analysis.mechanisms, crate::schema::MechanismSummary::default());
    }

    #[test]
    fn test_structured_mutation_details_are_stringified() {
        let mut v = complete();
        v["mechanisms"]["mutation_details"] = json!(["R183W", "deletion of exon 3"]);
        let analysis = validate_or_repair(record(v)).unwrap();
        assert_eq!(
            analysis.mechanisms.mutation_details.as_deref(),
            Some(r#"["R183W","deletion of exon 3"]"#)
        );
    }

    #[test]
    fn test_missing_cancers_become_empty() {
        let mut v = record(complete());
        v.remove("cancers");
        let (_, patches) = normalize_record(v.clone());
        assert_eq!(patches, vec![Patch::CancersDefaulted]);
        assert!(validate_or_repair(v).unwrap().cancers.is_empty());
    }

    #[test]
    fn test_extra_finding_fields_are_stripped() {
        let mut v = complete();
        v["cancers"][0]["gene"] = json!("PPP2R2A");
        v["cancers"][0]["notes"] = json!("hallucinated");
        let (out, patches) = normalize_record(record(v));
        assert_eq!(
            patches,
            vec![Patch::FindingFieldsStripped {
                index: 0,
                fields: vec!["gene".to_string(), "notes".to_string()],
            }]
        );
        let finding = out["cancers"][0].as_object().unwrap();
        assert!(finding.keys().all(|k| CancerFinding::FIELDS.contains(&k.as_str())));
    }

    #[test]
    fn test_structural_failure_is_unrecoverable() {
        // A missing role is not in the repair table.
        let mut v = complete();
        v["cancers"][0].as_object_mut().unwrap().remove("role");
        let first = Analysis::from_record(&record(v.clone())).unwrap_err();
        let err = repair(record(v), first.clone()).unwrap_err();
        assert_eq!(err.first, first);
        assert!(err.second.message.contains("role"));
        assert!(err.to_string().starts_with("Invalid analysis format even after adding defaults"));
    }

    #[test]
    fn test_malformed_shapes_are_left_for_strict_construction() {
        let mut v = complete();
        v["cancers"] = json!({"type": "breast cancer"});
        let (out, patches) = normalize_record(record(v));
        assert!(patches.is_empty());
        assert_eq!(out["cancers"], json!({"type": "breast cancer"}));
        assert!(Analysis::from_record(&out).is_err());
    }
}
