//! Interactive review pass over unreviewed command-set entries.
//!
//! Single-threaded and blocking: one entry at a time, in mnemonic order.
//! Generic over the input/output streams so tests drive it with cursors.
//! Quitting leaves the remaining entries unreviewed, which supports resuming
//! the pass later from the written document.

use std::io::{self, BufRead, Write};

use crate::commandset::{CommandSet, CommandSetEntry, Parameter, ReviewStatus};

/// Tally of one review pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReviewSummary {
    pub accepted: usize,
    pub edited: usize,
    pub rejected: usize,
    pub deferred: usize,
    /// True when the user quit before reaching the last entry.
    pub aborted: bool,
}

pub struct ReviewSession<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ReviewSession<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Walk every unreviewed entry. Rejected entries stay in the set with
    /// status `rejected`; the final write drops them.
    pub fn run(&mut self, set: &mut CommandSet) -> io::Result<ReviewSummary> {
        let keys = set.unreviewed_keys();
        let total = keys.len();
        let mut summary = ReviewSummary::default();

        if total == 0 {
            writeln!(self.output, "Nothing to review.")?;
            return Ok(summary);
        }

        'entries: for (position, key) in keys.iter().enumerate() {
            loop {
                {
                    let entry = &set.commands[key];
                    self.show_entry(entry, position + 1, total)?;
                }
                let line = match self.read_line()? {
                    Some(line) => line,
                    None => {
                        // EOF on input behaves like quit.
                        summary.aborted = true;
                        break 'entries;
                    }
                };
                let entry = set
                    .commands
                    .get_mut(key)
                    .expect("reviewed key vanished from set");
                match line.trim().to_ascii_lowercase().as_str() {
                    "a" => {
                        entry.status = ReviewStatus::Accepted;
                        entry.conflicts.clear();
                        entry.needs_review = false;
                        summary.accepted += 1;
                        continue 'entries;
                    }
                    "e" => {
                        self.edit_entry(key, set)?;
                        summary.edited += 1;
                        continue 'entries;
                    }
                    "r" => {
                        entry.status = ReviewStatus::Rejected;
                        entry.needs_review = false;
                        summary.rejected += 1;
                        continue 'entries;
                    }
                    "d" => {
                        summary.deferred += 1;
                        continue 'entries;
                    }
                    "q" => {
                        summary.aborted = true;
                        break 'entries;
                    }
                    other => {
                        writeln!(self.output, "Unknown command '{}'. Use a, e, r, d, or q.", other)?;
                    }
                }
            }
        }

        if summary.aborted {
            writeln!(
                self.output,
                "Review stopped; remaining entries left unreviewed."
            )?;
        }
        Ok(summary)
    }

    fn show_entry(&mut self, entry: &CommandSetEntry, position: usize, total: usize) -> io::Result<()> {
        writeln!(self.output)?;
        writeln!(
            self.output,
            "[{}/{}] {}{}",
            position,
            total,
            entry.mnemonic,
            if entry.supports_query { " (query)" } else { "" }
        )?;
        if !entry.description.is_empty() {
            writeln!(self.output, "    {}", entry.description)?;
        }
        if !entry.parameters.is_empty() {
            writeln!(
                self.output,
                "    parameters: {}",
                describe_parameters(&entry.parameters)
            )?;
        }
        let pages: Vec<String> = entry.source_pages.iter().map(|p| p.to_string()).collect();
        writeln!(self.output, "    pages: {}", pages.join(", "))?;
        for conflict in &entry.conflicts {
            writeln!(
                self.output,
                "    CONFLICT (chunk {}): {} parameter(s){}",
                conflict.chunk_index,
                conflict.parameters.len(),
                if conflict.description.is_empty() {
                    String::new()
                } else {
                    format!(" - {}", conflict.description)
                }
            )?;
        }
        write!(self.output, "(a)ccept / (e)dit / (r)eject / (d)efer / (q)uit > ")?;
        self.output.flush()
    }

    /// Field-level patch: `field=value` lines until an empty line. Supported
    /// fields: description, query (true/false), params (comma-separated
    /// types, empty to clear).
    fn edit_entry(&mut self, key: &str, set: &mut CommandSet) -> io::Result<()> {
        writeln!(
            self.output,
            "Edit fields as field=value (description, query, params). Empty line applies."
        )?;
        loop {
            write!(self.output, "edit> ")?;
            self.output.flush()?;
            let line = match self.read_line()? {
                Some(line) => line,
                None => break,
            };
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            let entry = set
                .commands
                .get_mut(key)
                .expect("edited key vanished from set");
            match line.split_once('=') {
                Some(("description", value)) => entry.description = value.trim().to_string(),
                Some(("query", value)) => match value.trim() {
                    "true" => entry.supports_query = true,
                    "false" => entry.supports_query = false,
                    other => writeln!(self.output, "query must be true or false, got '{}'.", other)?,
                },
                Some(("params", value)) => match parse_param_list(value) {
                    Ok(parameters) => entry.parameters = parameters,
                    Err(message) => writeln!(self.output, "{}", message)?,
                },
                _ => writeln!(
                    self.output,
                    "Expected field=value with field in: description, query, params."
                )?,
            }
        }
        let entry = set
            .commands
            .get_mut(key)
            .expect("edited key vanished from set");
        entry.status = ReviewStatus::Edited;
        entry.conflicts.clear();
        entry.needs_review = false;
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes = self.input.read_line(&mut line)?;
        if bytes == 0 {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }
}

fn describe_parameters(parameters: &[Parameter]) -> String {
    parameters
        .iter()
        .map(|p| {
            let mut text = p.param_type.as_str().to_string();
            if let Some(name) = &p.name {
                text = format!("{} {}", name, text);
            }
            if let Some([min, max]) = &p.range {
                let bound = |b: &Option<f64>| b.map_or("..".to_string(), |v| v.to_string());
                text.push_str(&format!(" [{}, {}]", bound(min), bound(max)));
            }
            if let Some(values) = &p.values {
                text.push_str(&format!(" {{{}}}", values.join("|")));
            }
            text
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_param_list(value: &str) -> Result<Vec<Parameter>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value
        .split(',')
        .map(|t| t.parse().map(Parameter::of_type))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commandset::{CommandSetEntry, Metadata, ParamType};
    use std::collections::BTreeSet;
    use std::io::Cursor;

    fn set_with(mnemonics: &[&str]) -> CommandSet {
        let mut set = CommandSet::new(Metadata::new("TEST", "manual.pdf"));
        for m in mnemonics {
            set.commands.insert(
                m.to_string(),
                CommandSetEntry {
                    mnemonic: m.to_string(),
                    supports_query: false,
                    parameters: vec![],
                    description: "desc".to_string(),
                    source_pages: BTreeSet::from([1]),
                    status: ReviewStatus::Unreviewed,
                    conflicts: vec![],
                    needs_review: true,
                },
            );
        }
        set
    }

    fn run_session(set: &mut CommandSet, script: &str) -> ReviewSummary {
        let mut out = Vec::new();
        ReviewSession::new(Cursor::new(script.to_string()), &mut out)
            .run(set)
            .expect("session io")
    }

    #[test]
    fn accept_and_reject() {
        let mut set = set_with(&["*CLS", "*RST"]);
        let summary = run_session(&mut set, "a\nr\n");
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(set.commands["*CLS"].status, ReviewStatus::Accepted);
        assert_eq!(set.commands["*RST"].status, ReviewStatus::Rejected);
    }

    #[test]
    fn defer_keeps_entry_unreviewed() {
        let mut set = set_with(&["VOLT"]);
        let summary = run_session(&mut set, "d\n");
        assert_eq!(summary.deferred, 1);
        assert_eq!(set.commands["VOLT"].status, ReviewStatus::Unreviewed);
        assert!(set.commands["VOLT"].needs_review);
    }

    #[test]
    fn quit_aborts_and_leaves_rest_untouched() {
        let mut set = set_with(&["*CLS", "*RST", "VOLT"]);
        let summary = run_session(&mut set, "a\nq\n");
        assert!(summary.aborted);
        assert_eq!(summary.accepted, 1);
        assert_eq!(set.commands["*RST"].status, ReviewStatus::Unreviewed);
        assert_eq!(set.commands["VOLT"].status, ReviewStatus::Unreviewed);
    }

    #[test]
    fn eof_behaves_like_quit() {
        let mut set = set_with(&["*CLS", "*RST"]);
        let summary = run_session(&mut set, "a\n");
        assert!(summary.aborted);
        assert_eq!(summary.accepted, 1);
    }

    #[test]
    fn edit_applies_field_patches() {
        let mut set = set_with(&["VOLT"]);
        let summary = run_session(
            &mut set,
            "e\ndescription=Sets the voltage.\nquery=true\nparams=int,float\n\n",
        );
        assert_eq!(summary.edited, 1);
        let entry = &set.commands["VOLT"];
        assert_eq!(entry.status, ReviewStatus::Edited);
        assert_eq!(entry.description, "Sets the voltage.");
        assert!(entry.supports_query);
        assert_eq!(entry.parameters.len(), 2);
        assert_eq!(entry.parameters[0].param_type, ParamType::Int);
        assert_eq!(entry.parameters[1].param_type, ParamType::Float);
        assert!(!entry.needs_review);
    }

    #[test]
    fn accept_clears_conflicts() {
        let mut set = set_with(&["VOLT"]);
        set.commands.get_mut("VOLT").unwrap().conflicts.push(
            crate::commandset::CandidateCommand {
                mnemonic: "VOLT".to_string(),
                supports_query: false,
                parameters: vec![Parameter::of_type(ParamType::Int)],
                description: String::new(),
                source_pages: vec![2],
                chunk_index: 1,
                uncertain: false,
            },
        );
        run_session(&mut set, "a\n");
        assert!(set.commands["VOLT"].conflicts.is_empty());
        assert!(!set.commands["VOLT"].needs_review);
    }

    #[test]
    fn unknown_input_reprompts() {
        let mut set = set_with(&["VOLT"]);
        let summary = run_session(&mut set, "x\na\n");
        assert_eq!(summary.accepted, 1);
    }

    #[test]
    fn empty_set_is_a_noop() {
        let mut set = CommandSet::new(Metadata::new("TEST", "manual.pdf"));
        let summary = run_session(&mut set, "");
        assert_eq!(summary, ReviewSummary::default());
    }
}
