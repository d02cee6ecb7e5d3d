//! Scripted backend: replays canned replies without network access.
//!
//! Replies are chosen by the first marker found in the user prompt, so a
//! test can give every item its own reply by embedding a distinct token in
//! the item's text. The backend also counts calls and records the peak
//! number of calls in flight at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{LlmBackend, LlmError, LlmRequest, LlmResponse};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(String),
}

pub struct ScriptedBackend {
    model: String,
    rules: Vec<(String, ScriptedReply)>,
    fallback: ScriptedReply,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    /// Every call returns `reply` unless a rule matches.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            model: "scripted".to_string(),
            rules: Vec::new(),
            fallback: ScriptedReply::Text(reply.into()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Reply with `reply` when the user prompt contains `marker`.
    pub fn on(mut self, marker: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((marker.into(), ScriptedReply::Text(reply.into())));
        self
    }

    /// Fail with an unavailable backend when the user prompt contains `marker`.
    pub fn fail_on(mut self, marker: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push((marker.into(), ScriptedReply::Fail(message.into())));
        self
    }

    /// Hold every call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(&self, prompt: &str) -> &ScriptedReply {
        self.rules
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.fallback)
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.reply_for(req.user_prompt().unwrap_or_default()).clone();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            ScriptedReply::Text(content) => Ok(LlmResponse {
                completion_tokens: content.split_whitespace().count() as u32,
                content,
                model: self.model.clone(),
                prompt_tokens: 0,
            }),
            ScriptedReply::Fail(message) => Err(LlmError::Unavailable(message)),
        }
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_match_by_marker() {
        let backend = ScriptedBackend::new("default")
            .on("ITEM-1", "first")
            .fail_on("ITEM-2", "boom");

        let r = backend.complete(LlmRequest::json("s", "about ITEM-1")).await.unwrap();
        assert_eq!(r.content, "first");

        let err = backend.complete(LlmRequest::json("s", "about ITEM-2")).await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(ref m) if m == "boom"));

        let r = backend.complete(LlmRequest::json("s", "other")).await.unwrap();
        assert_eq!(r.content, "default");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_sequential_calls_peak_at_one() {
        let backend = ScriptedBackend::new("x").with_delay(Duration::from_millis(1));
        for _ in 0..3 {
            backend.complete(LlmRequest::json("s", "u")).await.unwrap();
        }
        assert_eq!(backend.peak_in_flight(), 1);
    }
}
