//! Manual text sources: page-range parsing and the page-text extraction seam.
//!
//! PDF rendering is an external collaborator, reached through the
//! [`PageExtractor`] trait. The built-in implementations shell out to
//! `pdftotext` or read pre-extracted text in the `---- PAGE n ----` marker
//! format that `--debug-text` produces.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use crate::core::PipelineError;

/// Parse a user-supplied page range string such as `"11-35,73-80,90"` into a
/// sorted, deduplicated page list. Pages are 1-based.
pub fn parse_page_ranges(ranges: &str) -> Result<Vec<u32>, PipelineError> {
    let mut pages = std::collections::BTreeSet::new();
    for part in ranges.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((a, b)) = part.split_once('-') {
            let start = parse_page(a)?;
            let end = parse_page(b)?;
            if end < start {
                return Err(PipelineError::Configuration(format!(
                    "page range '{}' runs backwards",
                    part
                )));
            }
            pages.extend(start..=end);
        } else {
            pages.insert(parse_page(part)?);
        }
    }
    if pages.is_empty() {
        return Err(PipelineError::Configuration(
            "no pages selected".to_string(),
        ));
    }
    Ok(pages.into_iter().collect())
}

fn parse_page(s: &str) -> Result<u32, PipelineError> {
    let page: u32 = s
        .trim()
        .parse()
        .map_err(|_| PipelineError::Configuration(format!("invalid page number '{}'", s.trim())))?;
    if page == 0 {
        return Err(PipelineError::Configuration(
            "page numbers are 1-based".to_string(),
        ));
    }
    Ok(page)
}

/// Source of page-indexed manual text. Implementations fail with
/// [`PipelineError::Document`] on unreadable or missing input.
pub trait PageExtractor: Send + Sync {
    /// Extract text for the requested 1-based pages. Pages outside the
    /// document or with no text are simply absent from the result.
    fn extract_pages(
        &self,
        path: &Path,
        pages: &[u32],
    ) -> Result<BTreeMap<u32, String>, PipelineError>;
}

/// Extracts page text by invoking the `pdftotext` tool one page at a time.
pub struct PdftotextExtractor {
    tool: String,
}

impl Default for PdftotextExtractor {
    fn default() -> Self {
        Self {
            tool: "pdftotext".to_string(),
        }
    }
}

impl PdftotextExtractor {
    pub fn with_tool(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }
}

impl PageExtractor for PdftotextExtractor {
    fn extract_pages(
        &self,
        path: &Path,
        pages: &[u32],
    ) -> Result<BTreeMap<u32, String>, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::Document(format!(
                "manual not found: {}",
                path.display()
            )));
        }
        let mut page_text = BTreeMap::new();
        for &page in pages {
            let output = Command::new(&self.tool)
                .arg("-f")
                .arg(page.to_string())
                .arg("-l")
                .arg(page.to_string())
                .arg(path)
                .arg("-")
                .output()
                .map_err(|e| {
                    PipelineError::Document(format!(
                        "failed to run '{}': {} (is poppler installed?)",
                        self.tool, e
                    ))
                })?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(PipelineError::Document(format!(
                    "'{}' failed on page {} of {}: {}",
                    self.tool,
                    page,
                    path.display(),
                    stderr.trim()
                )));
            }
            let text = String::from_utf8_lossy(&output.stdout).into_owned();
            if !text.trim().is_empty() {
                page_text.insert(page, text);
            }
        }
        Ok(page_text)
    }
}

/// Reads pre-extracted manual text with `---- PAGE n ----` markers. A file
/// without markers is treated as a single page numbered 1.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

impl PageExtractor for PlainTextExtractor {
    fn extract_pages(
        &self,
        path: &Path,
        pages: &[u32],
    ) -> Result<BTreeMap<u32, String>, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Document(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut all = split_page_markers(&text);
        if all.is_empty() && !text.trim().is_empty() {
            all.insert(1, text);
        }
        all.retain(|page, _| pages.contains(page));
        Ok(all)
    }
}

/// Split marker-formatted text into per-page content.
pub fn split_page_markers(text: &str) -> BTreeMap<u32, String> {
    let mut pages = BTreeMap::new();
    let mut current: Option<u32> = None;
    let mut buf = String::new();
    for line in text.lines() {
        if let Some(page) = parse_marker(line) {
            if let Some(prev) = current {
                pages.insert(prev, std::mem::take(&mut buf));
            }
            current = Some(page);
        } else if current.is_some() {
            buf.push_str(line);
            buf.push('\n');
        }
    }
    if let Some(prev) = current {
        pages.insert(prev, buf);
    }
    pages
}

fn parse_marker(line: &str) -> Option<u32> {
    let rest = line.trim().strip_prefix("---- PAGE ")?;
    let rest = rest.strip_suffix(" ----")?;
    rest.trim().parse().ok()
}

/// Write page text back out in the marker format `split_page_markers` reads.
pub fn write_debug_text(
    pages: &BTreeMap<u32, String>,
    path: &Path,
) -> Result<(), PipelineError> {
    let mut out = String::new();
    for (page, text) in pages {
        out.push_str(&format!("---- PAGE {} ----\n", page));
        out.push_str(text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ranges_mixed() {
        let pages = parse_page_ranges("11-13,73, 75-76").expect("valid ranges");
        assert_eq!(pages, vec![11, 12, 13, 73, 75, 76]);
    }

    #[test]
    fn parse_ranges_deduplicates() {
        let pages = parse_page_ranges("5,3-6").expect("valid ranges");
        assert_eq!(pages, vec![3, 4, 5, 6]);
    }

    #[test]
    fn parse_ranges_rejects_garbage() {
        assert!(parse_page_ranges("").is_err());
        assert!(parse_page_ranges("abc").is_err());
        assert!(parse_page_ranges("10-5").is_err());
        assert!(parse_page_ranges("0").is_err());
    }

    #[test]
    fn markers_round_trip() {
        let text = "---- PAGE 3 ----\nfirst page\n---- PAGE 4 ----\nsecond\npage\n";
        let pages = split_page_markers(text);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[&3], "first page\n");
        assert_eq!(pages[&4], "second\npage\n");
    }

    #[test]
    fn plain_text_without_markers_is_page_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("manual.txt");
        std::fs::write(&path, "VOLT <value> sets the voltage").expect("write");

        let pages = PlainTextExtractor
            .extract_pages(&path, &[1, 2])
            .expect("extract");
        assert_eq!(pages.len(), 1);
        assert!(pages[&1].contains("VOLT"));
    }

    #[test]
    fn plain_text_missing_file_is_document_error() {
        let err = PlainTextExtractor
            .extract_pages(Path::new("/no/such/manual.txt"), &[1])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Document(_)));
    }
}
