//! LLM-backed extraction of candidate commands from manual chunks.
//!
//! All non-determinism lives behind [`ModelProvider`]; everything downstream
//! of the extraction client is deterministic given its inputs.

pub mod claude;
pub mod client;
pub mod prompts;
pub mod provider;

pub use claude::ClaudeClient;
pub use client::{ChunkOutcome, ExtractionClient};
pub use provider::{ModelError, ModelProvider};
