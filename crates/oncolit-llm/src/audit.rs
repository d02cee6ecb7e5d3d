//! Audit records for model calls.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::backend::LlmResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAuditEntry {
    pub id: Uuid,
    /// Identifier of the item the call was made for (PMID for articles).
    pub item_id: Option<String>,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub output_hash: String,
    pub latency_ms: u64,
    pub called_at: chrono::DateTime<Utc>,
}

impl LlmAuditEntry {
    pub fn new(item_id: Option<String>, response: &LlmResponse, latency_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id,
            model: response.model.clone(),
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            output_hash: sha256_hex(&response.content),
            latency_ms,
            called_at: Utc::now(),
        }
    }

    /// Emit the entry as a structured debug event.
    pub fn log(&self) {
        tracing::debug!(
            audit_id = %self.id,
            item_id = self.item_id.as_deref().unwrap_or("-"),
            model = %self.model,
            prompt_tokens = self.prompt_tokens,
            completion_tokens = self.completion_tokens,
            output_hash = %self.output_hash,
            latency_ms = self.latency_ms,
            "LLM call"
        );
    }
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_entry_hashes_output() {
        let resp = LlmResponse {
            content: "abc".to_string(),
            model: "gpt-5-nano".to_string(),
            prompt_tokens: 10,
            completion_tokens: 2,
        };
        let entry = LlmAuditEntry::new(Some("12345678".to_string()), &resp, 42);
        assert_eq!(
            entry.output_hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(entry.item_id.as_deref(), Some("12345678"));
        assert_eq!(entry.latency_ms, 42);
    }
}
