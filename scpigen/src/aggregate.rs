//! Merges per-chunk candidates into one deduplicated command set.
//!
//! Input outcomes are processed in chunk order (re-sorted here as a
//! guarantee), so merge tie-breaks are reproducible for any network
//! completion order. Conflicting candidates are retained on the entry, never
//! dropped; only an explicit review resolves them.

use std::collections::btree_map::Entry;

use crate::commandset::{
    CandidateCommand, CommandSet, CommandSetEntry, CoverageGap, Metadata, Parameter, ReviewStatus,
};
use crate::extract::ChunkOutcome;
use crate::grammar::{MnemonicGrammar, ScpiGrammar};

pub struct Aggregator {
    grammar: Box<dyn MnemonicGrammar>,
}

impl Aggregator {
    pub fn new(grammar: Box<dyn MnemonicGrammar>) -> Self {
        Self { grammar }
    }

    pub fn with_default_grammar() -> Self {
        Self::new(Box::new(ScpiGrammar))
    }

    /// Fold chunk outcomes into a command set. Failed chunks become coverage
    /// gaps in the metadata rather than entries.
    pub fn aggregate(&self, metadata: Metadata, outcomes: Vec<ChunkOutcome>) -> CommandSet {
        let mut set = CommandSet::new(metadata);
        let mut outcomes = outcomes;
        outcomes.sort_by_key(|o| o.chunk_index());

        for outcome in outcomes {
            match outcome {
                ChunkOutcome::Failed {
                    chunk_index,
                    pages,
                    reason,
                } => {
                    set.metadata.coverage_gaps.push(CoverageGap {
                        chunk_index,
                        pages,
                        reason,
                    });
                }
                ChunkOutcome::Commands { candidates, .. } => {
                    for candidate in candidates {
                        self.merge(&mut set, candidate);
                    }
                }
            }
        }
        set
    }

    fn merge(&self, set: &mut CommandSet, mut candidate: CandidateCommand) {
        let canonical = self.grammar.normalize(&candidate.mnemonic);
        if canonical.is_empty() {
            tracing::warn!(
                "dropping candidate with empty canonical mnemonic (raw: '{}')",
                candidate.mnemonic
            );
            return;
        }
        candidate.supports_query =
            candidate.supports_query || candidate.mnemonic.trim_end().ends_with('?');

        match set.commands.entry(canonical.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(seed_entry(canonical, candidate));
            }
            Entry::Occupied(mut slot) => {
                merge_candidate(slot.get_mut(), candidate);
            }
        }
    }
}

fn seed_entry(canonical: String, candidate: CandidateCommand) -> CommandSetEntry {
    CommandSetEntry {
        mnemonic: canonical,
        supports_query: candidate.supports_query,
        parameters: candidate.parameters,
        description: candidate.description,
        source_pages: candidate.source_pages.iter().copied().collect(),
        status: ReviewStatus::Unreviewed,
        conflicts: Vec::new(),
        needs_review: true,
    }
}

/// Parameter lists are compatible when either side is empty (one candidate
/// simply saw no parameters) or the arity and types line up exactly.
fn parameters_compatible(a: &[Parameter], b: &[Parameter]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.param_type == y.param_type)
}

fn merge_candidate(entry: &mut CommandSetEntry, candidate: CandidateCommand) {
    entry.source_pages.extend(candidate.source_pages.iter().copied());
    entry.supports_query |= candidate.supports_query;

    if !parameters_compatible(&entry.parameters, &candidate.parameters) {
        tracing::warn!(
            mnemonic = %entry.mnemonic,
            "conflicting parameter lists, keeping candidate for review"
        );
        entry.conflicts.push(candidate);
        return;
    }

    if entry.parameters.is_empty() {
        entry.parameters = candidate.parameters;
    } else if !candidate.parameters.is_empty() {
        for (existing, incoming) in entry.parameters.iter_mut().zip(candidate.parameters) {
            if existing.name.is_none() {
                existing.name = incoming.name;
            }
            if existing.range.is_none() {
                existing.range = incoming.range;
            }
            if existing.values.is_none() {
                existing.values = incoming.values;
            }
            existing.required |= incoming.required;
        }
    }

    // Earliest chunk's description wins on exact duplication; a strict
    // superset of the existing text replaces it.
    if entry.description.is_empty() {
        entry.description = candidate.description;
    } else if candidate.description != entry.description
        && candidate.description.contains(entry.description.as_str())
    {
        entry.description = candidate.description;
    }
}
