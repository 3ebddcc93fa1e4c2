//! Per-chunk extraction driver: prompt, parse, retry, degrade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::commandset::{CandidateCommand, ManualChunk, Parameter};
use crate::extract::prompts;
use crate::extract::provider::ModelProvider;

/// Result of extracting one chunk. A chunk failure never aborts the run; it
/// degrades to `Failed` and becomes a coverage gap in the output document.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Commands {
        chunk_index: usize,
        candidates: Vec<CandidateCommand>,
    },
    Failed {
        chunk_index: usize,
        pages: Vec<u32>,
        reason: String,
    },
}

impl ChunkOutcome {
    pub fn chunk_index(&self) -> usize {
        match self {
            ChunkOutcome::Commands { chunk_index, .. } => *chunk_index,
            ChunkOutcome::Failed { chunk_index, .. } => *chunk_index,
        }
    }

    pub fn candidate_count(&self) -> usize {
        match self {
            ChunkOutcome::Commands { candidates, .. } => candidates.len(),
            ChunkOutcome::Failed { .. } => 0,
        }
    }
}

/// Drives the model provider over chunks. Malformed output retries with a
/// clarifying prompt up to `parse_retries` extra attempts; transport retry
/// lives inside the provider.
#[derive(Clone)]
pub struct ExtractionClient {
    provider: Arc<dyn ModelProvider>,
    parse_retries: u32,
}

impl ExtractionClient {
    pub fn new(provider: Arc<dyn ModelProvider>, parse_retries: u32) -> Self {
        Self {
            provider,
            parse_retries,
        }
    }

    /// Extract candidate commands from one chunk.
    pub async fn extract_chunk(&self, chunk: &ManualChunk) -> ChunkOutcome {
        let mut prompt = prompts::extraction_prompt(chunk);
        let mut reason = String::new();

        for attempt in 0..=self.parse_retries {
            match self.provider.complete(&prompt).await {
                Ok(response) => match parse_candidates(&response, chunk) {
                    Ok(candidates) => {
                        tracing::debug!(
                            chunk = chunk.index,
                            count = candidates.len(),
                            "chunk extracted"
                        );
                        return ChunkOutcome::Commands {
                            chunk_index: chunk.index,
                            candidates,
                        };
                    }
                    Err(parse_error) => {
                        tracing::warn!(
                            chunk = chunk.index,
                            attempt,
                            "unparseable model output: {}",
                            parse_error
                        );
                        prompt = prompts::clarify_prompt(chunk, &parse_error);
                        reason = format!("unparseable model output: {}", parse_error);
                    }
                },
                Err(model_error) => {
                    // The provider already exhausted its transport retries.
                    reason = format!("model transport failure: {}", model_error);
                    break;
                }
            }
        }

        tracing::warn!(chunk = chunk.index, "extraction failed: {}", reason);
        ChunkOutcome::Failed {
            chunk_index: chunk.index,
            pages: chunk.pages.clone(),
            reason,
        }
    }

    /// Extract every chunk with bounded concurrency, then re-sort the
    /// outcomes into chunk order so aggregation is deterministic regardless
    /// of completion order. A set cancel flag stops dispatching new chunks;
    /// undispatched chunks come back as `Failed` with a cancellation reason.
    pub async fn extract_all(
        &self,
        chunks: &[ManualChunk],
        concurrency: usize,
        cancel: Arc<AtomicBool>,
    ) -> Vec<ChunkOutcome> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut join = JoinSet::new();

        for chunk in chunks {
            let chunk = chunk.clone();
            let client = self.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            join.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return ChunkOutcome::Failed {
                            chunk_index: chunk.index,
                            pages: chunk.pages.clone(),
                            reason: "worker pool closed".to_string(),
                        }
                    }
                };
                if cancel.load(Ordering::Relaxed) {
                    return ChunkOutcome::Failed {
                        chunk_index: chunk.index,
                        pages: chunk.pages.clone(),
                        reason: "cancelled before dispatch".to_string(),
                    };
                }
                client.extract_chunk(&chunk).await
            });
        }

        let mut outcomes = Vec::with_capacity(chunks.len());
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("extraction task panicked: {}", e),
            }
        }
        outcomes.sort_by_key(|o| o.chunk_index());
        outcomes
    }
}

/// Lenient mirror of one record in the model's JSON array.
#[derive(Debug, Deserialize)]
struct RawCandidate {
    mnemonic: String,
    #[serde(default)]
    supports_query: bool,
    #[serde(default)]
    parameters: Vec<Parameter>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    source_pages: Vec<u32>,
    #[serde(default)]
    uncertain: bool,
}

fn parse_candidates(response: &str, chunk: &ManualChunk) -> Result<Vec<CandidateCommand>, String> {
    let json = extract_json_array(response);
    let raw: Vec<RawCandidate> = serde_json::from_str(&json)
        .map_err(|e| format!("expected a JSON array of command records: {}", e))?;

    let mut candidates = Vec::with_capacity(raw.len());
    for record in raw {
        let mnemonic = record.mnemonic.trim().to_string();
        if mnemonic.is_empty() {
            continue;
        }
        let supports_query = record.supports_query || mnemonic.ends_with('?');
        let source_pages = if record.source_pages.is_empty() {
            chunk.pages.clone()
        } else {
            record.source_pages
        };
        candidates.push(CandidateCommand {
            mnemonic,
            supports_query,
            parameters: record.parameters,
            description: record.description.trim().to_string(),
            source_pages,
            chunk_index: chunk.index,
            uncertain: record.uncertain,
        });
    }
    Ok(candidates)
}

/// Pull a JSON array out of model text that may wrap it in code fences or
/// surrounding prose.
fn extract_json_array(text: &str) -> String {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        if let Some(end) = text.rfind("```") {
            if end > start + 7 {
                return text[start + 7..end].trim().to_string();
            }
        }
    }
    if let Some(start) = text.find("```") {
        if let Some(end) = text.rfind("```") {
            if end > start + 3 {
                let fenced = text[start + 3..end].trim();
                if fenced.starts_with('[') {
                    return fenced.to_string();
                }
            }
        }
    }
    if let Some(start) = text.find('[') {
        if let Some(end) = text.rfind(']') {
            if end > start {
                return text[start..=end].to_string();
            }
        }
    }
    text.to_string()
}
