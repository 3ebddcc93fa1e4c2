//! Prompt contract for SCPI command extraction.

use crate::commandset::ManualChunk;

/// Fixed instruction sent with every chunk. Demands a strict JSON array so
/// the response parses straight into candidate records.
pub fn extraction_prompt(chunk: &ManualChunk) -> String {
    let pages = chunk
        .pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are extracting SCPI commands from an instrument programming manual.

The text below comes from manual page(s) {pages}. It is raw PDF text and may
contain headers, footers, tables and other noise. Identify every SCPI command
definition it contains.

Respond ONLY with a JSON array (no markdown, no code fences, no prose). Each
element describes one command:
{{
  "mnemonic": "SOUR:VOLT",
  "supports_query": true,
  "parameters": [
    {{"name": "voltage", "type": "float", "range": [0, 60], "values": null, "required": true}}
  ],
  "description": "Sets the output voltage.",
  "source_pages": [{first_page}],
  "uncertain": false
}}

Rules:
- "type" must be one of: bool, int, float, str.
- "range" is [min, max] with null for an open bound; omit it when the manual
  states no range. "values" lists enumerated choices for str parameters.
- Set "uncertain": true when the text is ambiguous about the command.
- A command documented with a '?' form supports query.
- Return [] if the text contains no command definitions.

MANUAL TEXT:
{text}"#,
        pages = pages,
        first_page = chunk.start_page,
        text = chunk.text,
    )
}

/// Follow-up used when a response failed to parse: same contract, with the
/// parse failure spelled out.
pub fn clarify_prompt(chunk: &ManualChunk, parse_error: &str) -> String {
    format!(
        r#"Your previous answer could not be parsed as a JSON array of SCPI
command records ({parse_error}).

Answer again for the same manual text. Respond with ONLY a JSON array, no
surrounding text of any kind. Use exactly the fields: mnemonic,
supports_query, parameters, description, source_pages, uncertain. Parameter
"type" must be one of bool, int, float, str. Return [] if there are no
commands.

MANUAL TEXT:
{text}"#,
        parse_error = parse_error,
        text = chunk.text,
    )
}
