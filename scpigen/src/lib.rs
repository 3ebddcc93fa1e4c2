//! ScpiGen - SCPI command-set extraction and validation library
//!
//! Converts an instrument programming manual into a structured SCPI
//! command-set document (JSON) and validates any such document against the
//! canonical schema.
//!
//! The pipeline: page text -> chunker -> model extraction (per chunk) ->
//! aggregation -> optional interactive review -> JSON document. The schema
//! validator is independently usable over any command-set file.
//!
//! # Quick Start
//!
//! ```no_run
//! use scpigen::{SchemaValidator};
//! use std::path::Path;
//!
//! let validator = SchemaValidator::new();
//! let report = validator.validate_file(Path::new("bk8616.json"));
//!
//! for diag in &report.diagnostics {
//!     println!("{:?} at {}: {}", diag.severity, diag.path, diag.message);
//! }
//! ```
//!
//! # Design notes
//!
//! - All model non-determinism sits behind [`ModelProvider`]; everything
//!   downstream is deterministic given its inputs.
//! - Chunk-level failures degrade to coverage gaps in the output document;
//!   they never abort a run.
//! - Mnemonic normalization is pluggable via [`MnemonicGrammar`].

pub mod aggregate;
pub mod chunk;
pub mod commandset;
pub mod core;
pub mod extract;
pub mod grammar;
pub mod review;
pub mod source;
pub mod validate;

// Re-export main types
pub use crate::core::{
    discover_command_sets, ExtractionOptions, ExtractionPipeline, PipelineError, RunReport,
};
pub use aggregate::Aggregator;
pub use chunk::Chunker;
pub use commandset::{
    CandidateCommand, CommandSet, CommandSetEntry, CoverageGap, ManualChunk, Metadata, ParamType,
    Parameter, ReviewStatus, SCHEMA_VERSION,
};
pub use extract::{ChunkOutcome, ClaudeClient, ExtractionClient, ModelError, ModelProvider};
pub use grammar::{MnemonicGrammar, ScpiGrammar};
pub use review::{ReviewSession, ReviewSummary};
pub use source::{parse_page_ranges, PageExtractor, PdftotextExtractor, PlainTextExtractor};
pub use validate::{Diagnostic, SchemaValidator, Severity, ValidationReport};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CommandSet, Diagnostic, ExtractionOptions, ExtractionPipeline, PipelineError,
        SchemaValidator, Severity, ValidationReport,
    };
}
