//! Canonical-schema validation for command-set JSON documents.
//!
//! Works on raw `serde_json::Value` so a malformed document still yields
//! diagnostics instead of a deserialization error. Diagnostics carry a
//! document path (`commands["*RST"].parameters[0].type`), a severity and a
//! message; only `error` severity blocks success.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::commandset::{ParamType, SCHEMA_VERSION};
use crate::grammar::{MnemonicGrammar, ScpiGrammar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub path: String,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Per-file validation result.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub file: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// Success means zero error-severity diagnostics; warnings never block.
    pub fn passed(&self) -> bool {
        self.error_count() == 0
    }
}

const KNOWN_ENTRY_FIELDS: [&str; 8] = [
    "mnemonic",
    "supports_query",
    "parameters",
    "description",
    "source_pages",
    "status",
    "conflicts",
    "needs_review",
];

const KNOWN_STATUS_VALUES: [&str; 4] = ["unreviewed", "accepted", "edited", "rejected"];

pub struct SchemaValidator {
    grammar: Box<dyn MnemonicGrammar>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self {
            grammar: Box::new(ScpiGrammar),
        }
    }

    pub fn with_grammar(grammar: Box<dyn MnemonicGrammar>) -> Self {
        Self { grammar }
    }

    /// Validate one file. Unreadable or syntactically invalid JSON yields a
    /// single error diagnostic at `$`; the caller's multi-file run continues.
    pub fn validate_file(&self, path: &Path) -> ValidationReport {
        let diagnostics = match std::fs::read_to_string(path) {
            Err(e) => vec![Diagnostic::error("$", format!("cannot read file: {}", e))],
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Err(e) => vec![Diagnostic::error("$", format!("invalid JSON: {}", e))],
                Ok(doc) => self.validate_value(&doc),
            },
        };
        ValidationReport {
            file: path.to_path_buf(),
            diagnostics,
        }
    }

    /// Validate an in-memory document against the canonical schema.
    pub fn validate_value(&self, doc: &Value) -> Vec<Diagnostic> {
        let mut diags = Vec::new();

        let Some(root) = doc.as_object() else {
            diags.push(Diagnostic::error("$", "document must be a JSON object"));
            return diags;
        };

        match root.get("metadata") {
            None => diags.push(Diagnostic::warning("$", "missing 'metadata' object")),
            Some(meta) => self.check_metadata(meta, &mut diags),
        }

        match root.get("commands") {
            None => diags.push(Diagnostic::error("$", "missing required key 'commands'")),
            Some(commands) => match commands.as_object() {
                None => diags.push(Diagnostic::error(
                    "$.commands",
                    "'commands' must be an object keyed by mnemonic",
                )),
                Some(commands) => {
                    let mut seen: HashMap<String, String> = HashMap::new();
                    for (key, entry) in commands {
                        self.check_entry(key, entry, &mut diags);

                        let canonical = self.grammar.normalize(key);
                        if let Some(first) = seen.get(&canonical) {
                            diags.push(Diagnostic::error(
                                "$.commands",
                                format!(
                                    "duplicate mnemonic '{}' ('{}' and '{}' collide after case folding)",
                                    canonical, first, key
                                ),
                            ));
                        } else {
                            seen.insert(canonical, key.clone());
                        }
                    }
                }
            },
        }

        diags
    }

    fn check_metadata(&self, meta: &Value, diags: &mut Vec<Diagnostic>) {
        let Some(meta) = meta.as_object() else {
            diags.push(Diagnostic::error("$.metadata", "'metadata' must be an object"));
            return;
        };
        for field in ["instrument", "source_manual"] {
            match meta.get(field) {
                None => diags.push(Diagnostic::warning(
                    "$.metadata",
                    format!("missing '{}'", field),
                )),
                Some(v) if !v.is_string() => diags.push(Diagnostic::error(
                    format!("$.metadata.{}", field),
                    "must be a string",
                )),
                _ => {}
            }
        }
        match meta.get("schema_version") {
            None => diags.push(Diagnostic::warning("$.metadata", "missing 'schema_version'")),
            Some(v) => match v.as_u64() {
                None => diags.push(Diagnostic::error(
                    "$.metadata.schema_version",
                    "must be a positive integer",
                )),
                Some(version) if version != u64::from(SCHEMA_VERSION) => {
                    diags.push(Diagnostic::warning(
                        "$.metadata.schema_version",
                        format!("document targets schema version {}, this tool is at {}", version, SCHEMA_VERSION),
                    ));
                }
                _ => {}
            },
        }
    }

    fn check_entry(&self, key: &str, entry: &Value, diags: &mut Vec<Diagnostic>) {
        let base = format!("commands[\"{}\"]", key);

        let Some(fields) = entry.as_object() else {
            diags.push(Diagnostic::error(&base, "entry must be an object"));
            return;
        };

        let canonical = self.grammar.normalize(key);
        if let Err(message) = self.grammar.check(&canonical) {
            diags.push(Diagnostic::error(&base, message));
        } else if canonical != key {
            diags.push(Diagnostic::warning(
                &base,
                format!("non-canonical mnemonic key (canonical form is '{}')", canonical),
            ));
        }

        for field in fields.keys() {
            if !KNOWN_ENTRY_FIELDS.contains(&field.as_str()) {
                diags.push(Diagnostic::warning(
                    format!("{}.{}", base, field),
                    "unknown field",
                ));
            }
        }

        if let Some(mnemonic) = fields.get("mnemonic") {
            match mnemonic.as_str() {
                None => diags.push(Diagnostic::error(
                    format!("{}.mnemonic", base),
                    "must be a string",
                )),
                Some(m) if self.grammar.normalize(m) != canonical => {
                    diags.push(Diagnostic::error(
                        format!("{}.mnemonic", base),
                        format!("'{}' does not match the entry key '{}'", m, key),
                    ));
                }
                _ => {}
            }
        }

        let supports_query = match fields.get("supports_query") {
            None => {
                diags.push(Diagnostic::warning(&base, "missing 'supports_query'"));
                None
            }
            Some(v) => match v.as_bool() {
                None => {
                    diags.push(Diagnostic::error(
                        format!("{}.supports_query", base),
                        "must be a boolean",
                    ));
                    None
                }
                some => some,
            },
        };

        // Cross-check: a '?'-suffixed key documents a query form.
        if key.ends_with('?') && supports_query == Some(false) {
            diags.push(Diagnostic::warning(
                format!("{}.supports_query", base),
                "mnemonic is written as a query but supports_query is false",
            ));
        }

        if let Some(description) = fields.get("description") {
            if !description.is_string() {
                diags.push(Diagnostic::error(
                    format!("{}.description", base),
                    "must be a string",
                ));
            }
        }

        if let Some(pages) = fields.get("source_pages") {
            match pages.as_array() {
                None => diags.push(Diagnostic::error(
                    format!("{}.source_pages", base),
                    "must be an array of page numbers",
                )),
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        match item.as_u64() {
                            None | Some(0) => diags.push(Diagnostic::error(
                                format!("{}.source_pages[{}]", base, i),
                                "must be a positive integer",
                            )),
                            _ => {}
                        }
                    }
                }
            }
        }

        if let Some(parameters) = fields.get("parameters") {
            match parameters.as_array() {
                None => diags.push(Diagnostic::error(
                    format!("{}.parameters", base),
                    "must be an array",
                )),
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        self.check_parameter(&format!("{}.parameters[{}]", base, i), item, diags);
                    }
                }
            }
        }

        if let Some(status) = fields.get("status") {
            match status.as_str() {
                None => diags.push(Diagnostic::error(
                    format!("{}.status", base),
                    "must be a string",
                )),
                Some(s) if !KNOWN_STATUS_VALUES.contains(&s) => {
                    diags.push(Diagnostic::error(
                        format!("{}.status", base),
                        format!(
                            "unknown status '{}' (expected one of {})",
                            s,
                            KNOWN_STATUS_VALUES.join(", ")
                        ),
                    ));
                }
                Some("rejected") => diags.push(Diagnostic::warning(
                    format!("{}.status", base),
                    "rejected entry present in output",
                )),
                _ => {}
            }
        }

        if fields.get("needs_review").and_then(Value::as_bool) == Some(true) {
            diags.push(Diagnostic::warning(&base, "entry needs review"));
        }
    }

    fn check_parameter(&self, path: &str, parameter: &Value, diags: &mut Vec<Diagnostic>) {
        let Some(fields) = parameter.as_object() else {
            diags.push(Diagnostic::error(path, "parameter must be an object"));
            return;
        };

        match fields.get("type") {
            None => diags.push(Diagnostic::error(
                format!("{}.type", path),
                "missing parameter type",
            )),
            Some(t) => match t.as_str() {
                None => diags.push(Diagnostic::error(
                    format!("{}.type", path),
                    "must be a string",
                )),
                Some(tag) if tag.parse::<ParamType>().is_err() => {
                    diags.push(Diagnostic::error(
                        format!("{}.type", path),
                        format!(
                            "unrecognized parameter type '{}' (expected one of {})",
                            tag,
                            ParamType::ALL.join(", ")
                        ),
                    ));
                }
                _ => {}
            },
        }

        if let Some(range) = fields.get("range") {
            let ok = range
                .as_array()
                .map(|bounds| {
                    bounds.len() == 2 && bounds.iter().all(|b| b.is_number() || b.is_null())
                })
                .unwrap_or(false);
            if !ok && !range.is_null() {
                diags.push(Diagnostic::error(
                    format!("{}.range", path),
                    "must be a [min, max] array with numeric or null bounds",
                ));
            }
        }

        if let Some(values) = fields.get("values") {
            let ok = values
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false);
            if !ok && !values.is_null() {
                diags.push(Diagnostic::error(
                    format!("{}.values", path),
                    "must be an array of strings",
                ));
            }
        }

        if let Some(required) = fields.get("required") {
            if !required.is_boolean() {
                diags.push(Diagnostic::error(
                    format!("{}.required", path),
                    "must be a boolean",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(doc: Value) -> Vec<Diagnostic> {
        SchemaValidator::new().validate_value(&doc)
    }

    fn errors(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
        diags
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    #[test]
    fn missing_commands_is_one_error_at_root() {
        let diags = validate(json!({"metadata": {
            "instrument": "BK8616",
            "source_manual": "manual.pdf",
            "schema_version": 1
        }}));
        let errors = errors(&diags);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "$");
        assert!(errors[0].message.contains("commands"));
    }

    #[test]
    fn non_object_document_is_an_error() {
        let diags = validate(json!([1, 2, 3]));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].path, "$");
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn case_folded_duplicates_are_a_document_error() {
        let diags = validate(json!({
            "metadata": {"instrument": "X", "source_manual": "m.pdf", "schema_version": 1},
            "commands": {
                "*RST": {"mnemonic": "*RST", "supports_query": false, "source_pages": [1]},
                "*rst": {"mnemonic": "*rst", "supports_query": false, "source_pages": [1]}
            }
        }));
        let dup: Vec<_> = errors(&diags)
            .into_iter()
            .filter(|d| d.path == "$.commands" && d.message.contains("duplicate"))
            .collect();
        assert_eq!(dup.len(), 1);
    }

    #[test]
    fn unknown_parameter_type_is_an_error_at_its_path() {
        let diags = validate(json!({
            "metadata": {"instrument": "X", "source_manual": "m.pdf", "schema_version": 1},
            "commands": {
                "VOLT": {
                    "mnemonic": "VOLT",
                    "supports_query": false,
                    "source_pages": [1],
                    "parameters": [{"type": "voltage"}]
                }
            }
        }));
        let errors = errors(&diags);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "commands[\"VOLT\"].parameters[0].type");
    }

    #[test]
    fn query_mismatch_is_a_warning_not_an_error() {
        let diags = validate(json!({
            "metadata": {"instrument": "X", "source_manual": "m.pdf", "schema_version": 1},
            "commands": {
                "MEAS:VOLT?": {
                    "mnemonic": "MEAS:VOLT?",
                    "supports_query": false,
                    "source_pages": [1]
                }
            }
        }));
        assert!(errors(&diags).is_empty());
        assert!(diags
            .iter()
            .any(|d| d.severity == Severity::Warning
                && d.message.contains("supports_query is false")));
    }

    #[test]
    fn needs_review_is_a_warning() {
        let diags = validate(json!({
            "metadata": {"instrument": "X", "source_manual": "m.pdf", "schema_version": 1},
            "commands": {
                "VOLT": {
                    "mnemonic": "VOLT",
                    "supports_query": false,
                    "source_pages": [1],
                    "needs_review": true
                }
            }
        }));
        assert!(errors(&diags).is_empty());
        assert!(diags.iter().any(|d| d.message.contains("needs review")));
    }

    #[test]
    fn clean_document_passes() {
        let diags = validate(json!({
            "metadata": {"instrument": "X", "source_manual": "m.pdf", "schema_version": 1},
            "commands": {
                "SOUR:VOLT": {
                    "mnemonic": "SOUR:VOLT",
                    "supports_query": true,
                    "description": "Sets the output voltage.",
                    "source_pages": [26, 27],
                    "status": "accepted",
                    "parameters": [
                        {"name": "level", "type": "float", "range": [0, 60], "required": true}
                    ]
                }
            }
        }));
        assert!(errors(&diags).is_empty());
    }

    #[test]
    fn bad_range_and_values_are_errors() {
        let diags = validate(json!({
            "metadata": {"instrument": "X", "source_manual": "m.pdf", "schema_version": 1},
            "commands": {
                "VOLT": {
                    "mnemonic": "VOLT",
                    "supports_query": false,
                    "source_pages": [1],
                    "parameters": [
                        {"type": "float", "range": [0]},
                        {"type": "str", "values": [1, 2]}
                    ]
                }
            }
        }));
        let errors = errors(&diags);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|d| d.path.ends_with("parameters[0].range")));
        assert!(errors.iter().any(|d| d.path.ends_with("parameters[1].values")));
    }

    #[test]
    fn invalid_mnemonic_key_is_an_error() {
        let diags = validate(json!({
            "metadata": {"instrument": "X", "source_manual": "m.pdf", "schema_version": 1},
            "commands": {
                "VO LT;": {"mnemonic": "VO LT;", "supports_query": false, "source_pages": [1]}
            }
        }));
        assert!(!errors(&diags).is_empty());
    }
}
