//! oncolit-llm — Model-call boundary.
//! Implements the LlmBackend trait, the concrete chat-completion backends,
//! a scripted backend for tests and demos, and per-call audit records.

pub mod backend;
pub mod audit;
pub mod mock;

pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
pub use mock::{ScriptedBackend, ScriptedReply};
