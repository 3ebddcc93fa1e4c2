//! Command-set data model and the persisted JSON document format.
//!
//! The document written to disk is `{"metadata": {...}, "commands": {...}}`,
//! keyed by canonical mnemonic. `BTreeMap` keeps the keys unique and the
//! serialized output deterministically sorted.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::PipelineError;

/// Schema version the documents produced by this crate target.
pub const SCHEMA_VERSION: u32 = 1;

/// One bounded slice of manual text submitted as a single extraction unit.
///
/// Immutable once built by the chunker; `span` is the chunk's character range
/// within the concatenated page text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualChunk {
    pub index: usize,
    pub start_page: u32,
    /// Every page number this chunk's text touches, in order.
    pub pages: Vec<u32>,
    pub span: Range<usize>,
    pub text: String,
}

/// Closed set of parameter type tags recognized by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Bool,
    Int,
    Float,
    Str,
}

impl ParamType {
    pub const ALL: [&'static str; 4] = ["bool", "int", "float", "str"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Bool => "bool",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Str => "str",
        }
    }
}

impl std::str::FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" => Ok(ParamType::Bool),
            "int" => Ok(ParamType::Int),
            "float" => Ok(ParamType::Float),
            "str" => Ok(ParamType::Str),
            other => Err(format!(
                "unrecognized parameter type '{}' (expected one of {})",
                other,
                ParamType::ALL.join(", ")
            )),
        }
    }
}

/// One command parameter. `range` bounds and `values` enumerations are only
/// present when the manual states them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Inclusive [min, max]; either bound may be open (null).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[Option<f64>; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default)]
    pub required: bool,
}

impl Parameter {
    pub fn of_type(param_type: ParamType) -> Self {
        Self {
            name: None,
            param_type,
            range: None,
            values: None,
            required: false,
        }
    }
}

/// One command record proposed by the extraction step for one chunk.
/// Ephemeral: exists only between extraction and aggregation, except when
/// retained on an entry's conflict list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateCommand {
    pub mnemonic: String,
    #[serde(default)]
    pub supports_query: bool,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_pages: Vec<u32>,
    #[serde(default)]
    pub chunk_index: usize,
    /// Set when the model flagged the record as ambiguous.
    #[serde(default)]
    pub uncertain: bool,
}

/// Review disposition of a command-set entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Unreviewed,
    Accepted,
    Edited,
    Rejected,
}

/// The canonical, deduplicated record for one SCPI command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSetEntry {
    /// Canonical mnemonic (uppercase, whitespace stripped, no trailing '?').
    pub mnemonic: String,
    pub supports_query: bool,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub description: String,
    /// Union of every page that contributed to this entry.
    pub source_pages: BTreeSet<u32>,
    #[serde(default)]
    pub status: ReviewStatus,
    /// Candidates whose parameter lists could not be reconciled. Only an
    /// explicit review resolves these; they are never dropped silently.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<CandidateCommand>,
    /// Marker for downstream consumers: true while the entry is unreviewed
    /// or carries unresolved conflicts.
    #[serde(default)]
    pub needs_review: bool,
}

impl CommandSetEntry {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Recompute the `needs_review` marker from status and conflicts.
    pub fn refresh_review_marker(&mut self) {
        self.needs_review = self.status == ReviewStatus::Unreviewed || self.has_conflicts();
    }
}

/// Pages for which extraction failed; surfaced so a reader knows coverage
/// of the manual is incomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub chunk_index: usize,
    pub pages: Vec<u32>,
    pub reason: String,
}

/// Document-level metadata for one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub instrument: String,
    pub source_manual: String,
    pub extracted_at: DateTime<Utc>,
    pub schema_version: u32,
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_gaps: Vec<CoverageGap>,
}

impl Metadata {
    pub fn new(instrument: impl Into<String>, source_manual: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            source_manual: source_manual.into(),
            extracted_at: Utc::now(),
            schema_version: SCHEMA_VERSION,
            run_id: Uuid::new_v4(),
            coverage_gaps: Vec::new(),
        }
    }
}

/// The full command set for one instrument: metadata plus the mnemonic-keyed
/// entry map. Owned exclusively by the run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSet {
    pub metadata: Metadata,
    pub commands: BTreeMap<String, CommandSetEntry>,
}

impl CommandSet {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            commands: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        let set = serde_json::from_str(&text)?;
        Ok(set)
    }

    /// Write the finalized document. Rejected entries are dropped and the
    /// `needs_review` markers are refreshed before serialization.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let doc = self.finalized();
        let text = serde_json::to_string_pretty(&doc)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Clone of this set as it will appear on disk.
    pub fn finalized(&self) -> CommandSet {
        let mut doc = self.clone();
        doc.commands
            .retain(|_, entry| entry.status != ReviewStatus::Rejected);
        for entry in doc.commands.values_mut() {
            entry.refresh_review_marker();
        }
        doc
    }

    /// Entries still awaiting review, in mnemonic order.
    pub fn unreviewed_keys(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter(|(_, e)| e.status == ReviewStatus::Unreviewed)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn conflict_count(&self) -> usize {
        self.commands.values().map(|e| e.conflicts.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mnemonic: &str, status: ReviewStatus) -> CommandSetEntry {
        CommandSetEntry {
            mnemonic: mnemonic.to_string(),
            supports_query: false,
            parameters: vec![],
            description: String::new(),
            source_pages: BTreeSet::from([1]),
            status,
            conflicts: vec![],
            needs_review: false,
        }
    }

    #[test]
    fn finalized_drops_rejected_entries() {
        let mut set = CommandSet::new(Metadata::new("TEST", "manual.pdf"));
        set.commands
            .insert("*RST".into(), entry("*RST", ReviewStatus::Accepted));
        set.commands
            .insert("SOUR:VOLT".into(), entry("SOUR:VOLT", ReviewStatus::Rejected));

        let doc = set.finalized();
        assert!(doc.commands.contains_key("*RST"));
        assert!(!doc.commands.contains_key("SOUR:VOLT"));
    }

    #[test]
    fn finalized_refreshes_review_markers() {
        let mut set = CommandSet::new(Metadata::new("TEST", "manual.pdf"));
        set.commands
            .insert("*IDN".into(), entry("*IDN", ReviewStatus::Unreviewed));
        set.commands
            .insert("*CLS".into(), entry("*CLS", ReviewStatus::Accepted));

        let doc = set.finalized();
        assert!(doc.commands["*IDN"].needs_review);
        assert!(!doc.commands["*CLS"].needs_review);
    }

    #[test]
    fn param_type_round_trip() {
        for name in ParamType::ALL {
            let t: ParamType = name.parse().expect("known type");
            assert_eq!(t.as_str(), name);
        }
        assert!("voltage".parse::<ParamType>().is_err());
    }

    #[test]
    fn document_shape_is_stable() {
        let mut set = CommandSet::new(Metadata::new("BK8616", "manual.pdf"));
        set.commands
            .insert("*RST".into(), entry("*RST", ReviewStatus::Accepted));

        let value = serde_json::to_value(set.finalized()).expect("serialize");
        assert!(value.get("metadata").is_some());
        assert!(value.get("commands").is_some());
        assert_eq!(value["metadata"]["schema_version"], SCHEMA_VERSION);
        assert!(value["commands"]["*RST"]["supports_query"].is_boolean());
    }
}
