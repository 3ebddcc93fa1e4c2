//! Run-level error taxonomy and the extraction pipeline driver.
//!
//! A pipeline instance owns exactly one run: page extraction, chunking,
//! model extraction with bounded concurrency, aggregation. The caller writes
//! the aggregated set before any review pass so an interrupt never discards
//! completed chunk work.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregate::Aggregator;
use crate::chunk::Chunker;
use crate::commandset::{CommandSet, ManualChunk, Metadata};
use crate::extract::{ExtractionClient, ModelProvider};
use crate::source::PageExtractor;

/// Fatal run-level failures. Chunk-level extraction failures never appear
/// here; they degrade to coverage gaps in the output document.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Bad CLI or parameter input. Reported immediately, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The source manual could not be read.
    #[error("document error: {0}")]
    Document(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Options for one extraction run.
#[derive(Clone, Debug)]
pub struct ExtractionOptions {
    /// 1-based pages of the manual to process.
    pub pages: Vec<u32>,
    pub max_chars_per_chunk: usize,
    /// Cap on in-flight model requests.
    pub concurrency: usize,
    /// Extra attempts with a clarifying prompt after malformed model output.
    pub parse_retries: u32,
    /// Instrument label recorded in the document metadata; defaults to the
    /// manual's file stem when empty.
    pub instrument: String,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            max_chars_per_chunk: 4000,
            concurrency: 2,
            parse_retries: 2,
            instrument: String::new(),
        }
    }
}

/// Counters for one completed run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    pub pages_extracted: usize,
    pub chunks: usize,
    pub candidates: usize,
    pub commands: usize,
    pub conflicts: usize,
    pub failed_chunks: usize,
    pub cancelled: bool,
}

/// One manual-to-command-set run.
pub struct ExtractionPipeline {
    extractor: Box<dyn PageExtractor>,
    provider: Arc<dyn ModelProvider>,
    options: ExtractionOptions,
}

impl ExtractionPipeline {
    pub fn new(
        extractor: Box<dyn PageExtractor>,
        provider: Arc<dyn ModelProvider>,
        options: ExtractionOptions,
    ) -> Self {
        Self {
            extractor,
            provider,
            options,
        }
    }

    /// Run extraction end to end, producing the aggregated (unreviewed)
    /// command set. Setting `cancel` mid-run stops dispatching chunks; the
    /// outcome still reflects every chunk completed before the interrupt.
    pub async fn run(
        &self,
        manual: &Path,
        cancel: Arc<AtomicBool>,
    ) -> Result<(CommandSet, RunReport), PipelineError> {
        if self.options.pages.is_empty() {
            return Err(PipelineError::Configuration(
                "no pages selected".to_string(),
            ));
        }

        let page_text = self.extractor.extract_pages(manual, &self.options.pages)?;
        if page_text.values().all(|t| t.trim().is_empty()) {
            return Err(PipelineError::Document(format!(
                "no text extracted from the selected pages of {}",
                manual.display()
            )));
        }
        tracing::info!(
            pages = page_text.len(),
            manual = %manual.display(),
            "extracted page text"
        );

        let chunks = self.chunk(&page_text)?;
        tracing::info!(chunks = chunks.len(), "chunked manual text");

        let client = ExtractionClient::new(self.provider.clone(), self.options.parse_retries);
        let outcomes = client
            .extract_all(&chunks, self.options.concurrency, cancel.clone())
            .await;
        let candidates = outcomes.iter().map(|o| o.candidate_count()).sum();

        let metadata = Metadata::new(self.instrument_label(manual), manual_name(manual));
        let set = Aggregator::with_default_grammar().aggregate(metadata, outcomes);

        let report = RunReport {
            pages_extracted: page_text.len(),
            chunks: chunks.len(),
            candidates,
            commands: set.commands.len(),
            conflicts: set.conflict_count(),
            failed_chunks: set.metadata.coverage_gaps.len(),
            cancelled: cancel.load(Ordering::Relaxed),
        };
        Ok((set, report))
    }

    fn chunk(&self, page_text: &BTreeMap<u32, String>) -> Result<Vec<ManualChunk>, PipelineError> {
        let chunker = Chunker::new(page_text, self.options.max_chars_per_chunk)?;
        Ok(chunker.collect())
    }

    fn instrument_label(&self, manual: &Path) -> String {
        if !self.options.instrument.is_empty() {
            return self.options.instrument.clone();
        }
        manual
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

fn manual_name(manual: &Path) -> String {
    manual
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Command-set JSON files in a directory, in path order. Used by the
/// validation CLI when invoked with no paths.
pub fn discover_command_sets(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_finds_only_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("b.json"), "{}").expect("write");
        std::fs::write(dir.path().join("a.json"), "{}").expect("write");
        std::fs::write(dir.path().join("notes.txt"), "x").expect("write");

        let files = discover_command_sets(dir.path()).expect("discover");
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.json"));
        assert!(files[1].ends_with("b.json"));
    }
}
