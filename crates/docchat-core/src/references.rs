//! Citation parsing
//!
//! Language models cite evidence in loosely formatted text such as
//! `(Lease Agreement.pdf, Page 3)` or a bulleted `- a.pdf, Pages 3 and 20.`.
//! This module turns that text into an ordered `filename -> pages` mapping.
//!
//! Matching is not anchored to line boundaries by default, so a page list
//! may run on into the next line. Set [`ParserOptions::line_anchored`] to
//! keep every citation on a single line.

use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;

lazy_static! {
    /// Citation pattern where whitespace may include line breaks
    static ref CITATION_PATTERN: Regex = Regex::new(&citation_pattern(r"\s")).unwrap();

    /// Citation pattern restricted to a single line
    static ref LINE_CITATION_PATTERN: Regex = Regex::new(&citation_pattern(r" \t")).unwrap();

    /// The word "and" used as a list separator
    static ref AND_SEPARATOR: Regex = Regex::new(r"(?i)\band\b").unwrap();

    /// A single page "7" or a range "7-10"
    static ref PAGE_TOKEN: Regex = Regex::new(r"^(\d+)\s*(?:-\s*(\d+))?$").unwrap();
}

/// Build the citation regex with `ws` as the whitespace class body.
fn citation_pattern(ws: &str) -> String {
    format!(
        r"(?i)[{ws}\-•]*(?P<filename>[\w{ws}\-()&]+\.pdf)[{ws}]*,?[{ws}]*Pages?[{ws}]*:?[{ws}]*(?P<pages>(?:[\d{ws},]|\band\b|[-–—][{ws}]*\d)+)"
    )
}

/// Options for [`ReferenceParser`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Keep each citation on one line instead of letting page lists bleed
    /// across line breaks.
    pub line_anchored: bool,
    /// Largest `end - start` accepted for a page range. Wider ranges are
    /// treated as malformed tokens.
    pub max_range_span: u32,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            line_anchored: false,
            max_range_span: 1000,
        }
    }
}

/// Parsed citations: normalized filename to ascending, unique page numbers.
///
/// Entries keep the order in which each filename was first cited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfReferences {
    entries: Vec<(String, Vec<u32>)>,
}

impl PdfReferences {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Pages cited for `filename` (exact, case-sensitive key)
    pub fn get(&self, filename: &str) -> Option<&[u32]> {
        self.entries
            .iter()
            .find(|(name, _)| name == filename)
            .map(|(_, pages)| pages.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u32])> {
        self.entries
            .iter()
            .map(|(name, pages)| (name.as_str(), pages.as_slice()))
    }
}

impl<S, P> FromIterator<(S, P)> for PdfReferences
where
    S: Into<String>,
    P: IntoIterator<Item = u32>,
{
    fn from_iter<T: IntoIterator<Item = (S, P)>>(iter: T) -> Self {
        let mut builder = ReferenceBuilder::default();
        for (filename, pages) in iter {
            builder.add(filename.into(), pages);
        }
        builder.finish()
    }
}

impl Serialize for PdfReferences {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, pages) in &self.entries {
            map.serialize_entry(name, pages)?;
        }
        map.end()
    }
}

/// Accumulates pages per filename, preserving first-seen order.
#[derive(Default)]
struct ReferenceBuilder {
    index: HashMap<String, usize>,
    entries: Vec<(String, BTreeSet<u32>)>,
}

impl ReferenceBuilder {
    fn add(&mut self, filename: String, pages: impl IntoIterator<Item = u32>) {
        let mut pages = pages.into_iter().peekable();
        if pages.peek().is_none() {
            return;
        }
        let slot = match self.index.get(&filename) {
            Some(&slot) => slot,
            None => {
                self.index.insert(filename.clone(), self.entries.len());
                self.entries.push((filename, BTreeSet::new()));
                self.entries.len() - 1
            }
        };
        self.entries[slot].1.extend(pages);
    }

    fn finish(self) -> PdfReferences {
        PdfReferences {
            entries: self
                .entries
                .into_iter()
                .map(|(name, pages)| (name, pages.into_iter().collect()))
                .collect(),
        }
    }
}

/// Extracts `filename -> pages` citations from model output.
#[derive(Debug, Clone, Default)]
pub struct ReferenceParser {
    options: ParserOptions,
}

impl ReferenceParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn parse(&self, text: &str) -> PdfReferences {
        let pattern: &Regex = if self.options.line_anchored {
            &LINE_CITATION_PATTERN
        } else {
            &CITATION_PATTERN
        };

        let mut builder = ReferenceBuilder::default();
        for caps in pattern.captures_iter(text) {
            let (Some(filename), Some(pages)) = (caps.name("filename"), caps.name("pages")) else {
                continue;
            };
            let filename = normalize_filename(filename.as_str());
            if filename.is_empty() {
                continue;
            }
            builder.add(
                filename,
                expand_pages(pages.as_str(), self.options.max_range_span),
            );
        }
        builder.finish()
    }
}

/// Parse citations with the default (non-anchored) options.
pub fn extract_pdf_references(text: &str) -> PdfReferences {
    ReferenceParser::default().parse(text)
}

/// Trim bullets and whitespace, and drop an unmatched opening parenthesis
/// along with everything before it, as in `(a.pdf` or `see (a.pdf`.
fn normalize_filename(raw: &str) -> String {
    let mut name = raw.trim_start_matches(|c: char| c.is_whitespace() || c == '-' || c == '•');

    let mut open: Vec<usize> = Vec::new();
    for (idx, c) in name.char_indices() {
        match c {
            '(' => open.push(idx),
            ')' => {
                open.pop();
            }
            _ => {}
        }
    }
    if let Some(&last_unmatched) = open.last() {
        name = &name[last_unmatched + 1..];
    }

    name.trim().to_string()
}

/// Expand a page expression such as `"3, 5-7 and 9"`.
///
/// Malformed tokens and reversed ranges are skipped.
fn expand_pages(raw: &str, max_range_span: u32) -> Vec<u32> {
    let normalized = AND_SEPARATOR
        .replace_all(raw, ",")
        .replace(['–', '—'], "-");

    let mut pages = Vec::new();
    for token in normalized.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let Some(caps) = PAGE_TOKEN.captures(token) else {
            continue;
        };
        let Ok(start) = caps[1].parse::<u32>() else {
            continue;
        };
        let end = match caps.get(2) {
            Some(end) => match end.as_str().parse::<u32>() {
                Ok(end) => end,
                Err(_) => continue,
            },
            None => start,
        };
        if end >= start && end - start <= max_range_span {
            pages.extend(start..=end);
        }
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn refs(pairs: &[(&str, Vec<u32>)]) -> PdfReferences {
        pairs
            .iter()
            .map(|(name, pages)| (name.to_string(), pages.clone()))
            .collect()
    }

    #[test]
    fn test_inline_single_page() {
        assert_eq!(
            extract_pdf_references("(a.pdf, Page 3)"),
            refs(&[("a.pdf", vec![3])])
        );
    }

    #[test]
    fn test_range_expands_inclusive() {
        assert_eq!(
            extract_pdf_references("(a.pdf, Pages 3-5)"),
            refs(&[("a.pdf", vec![3, 4, 5])])
        );
    }

    #[test]
    fn test_en_and_em_dash_ranges() {
        assert_eq!(
            extract_pdf_references("(a.pdf, Pages 3–4, 8—9)"),
            refs(&[("a.pdf", vec![3, 4, 8, 9])])
        );
    }

    #[test]
    fn test_reversed_range_is_dropped() {
        assert!(extract_pdf_references("(a.pdf, Pages 5-3)").is_empty());
        assert_eq!(
            extract_pdf_references("(a.pdf, Pages 5-3, 7)"),
            refs(&[("a.pdf", vec![7])])
        );
    }

    #[test]
    fn test_and_is_a_separator() {
        assert_eq!(
            extract_pdf_references("(a.pdf, Page 3 and 5)"),
            refs(&[("a.pdf", vec![3, 5])])
        );
    }

    #[test]
    fn test_bulleted_reference_with_trailing_period() {
        assert_eq!(
            extract_pdf_references("- a.pdf, Pages 3 and 20."),
            refs(&[("a.pdf", vec![3, 20])])
        );
    }

    #[test]
    fn test_colon_and_case_insensitive_keyword() {
        assert_eq!(
            extract_pdf_references("Handbook_v2.pdf PAGES: 4, 2"),
            refs(&[("Handbook_v2.pdf", vec![2, 4])])
        );
    }

    #[test]
    fn test_filename_with_spaces_parentheses_and_ampersand() {
        assert_eq!(
            extract_pdf_references("- Terms & Conditions (2024).pdf, Page 12"),
            refs(&[("Terms & Conditions (2024).pdf", vec![12])])
        );
    }

    #[test]
    fn test_mentions_accumulate_and_dedupe() {
        let text = "(b.pdf, Page 9) then (a.pdf, Page 4) and again (b.pdf, Pages 2, 9)";
        let parsed = extract_pdf_references(text);
        assert_eq!(parsed.get("b.pdf"), Some(&[2, 9][..]));
        assert_eq!(parsed.get("a.pdf"), Some(&[4][..]));
        let order: Vec<&str> = parsed.iter().map(|(name, _)| name).collect();
        assert_eq!(order, vec!["b.pdf", "a.pdf"]);
    }

    #[test]
    fn test_bulleted_list_keeps_each_file() {
        let text = "References:\n- a.pdf, Page 3\n- b.pdf, Pages 4-5\n";
        assert_eq!(
            extract_pdf_references(text),
            refs(&[("a.pdf", vec![3]), ("b.pdf", vec![4, 5])])
        );
    }

    #[test]
    fn test_no_citation_yields_empty() {
        assert!(extract_pdf_references("No sources were used.").is_empty());
        assert!(extract_pdf_references("").is_empty());
    }

    #[test]
    fn test_page_list_bleeds_across_lines_by_default() {
        let text = "- a.pdf, Page 3,\n12 more items";
        assert_eq!(extract_pdf_references(text), refs(&[("a.pdf", vec![3, 12])]));
    }

    #[test]
    fn test_line_anchored_stops_at_line_break() {
        let parser = ReferenceParser::new(ParserOptions {
            line_anchored: true,
            ..ParserOptions::default()
        });
        let text = "- a.pdf, Page 3,\n12 more items";
        assert_eq!(parser.parse(text), refs(&[("a.pdf", vec![3])]));
    }

    #[test]
    fn test_line_anchored_rejects_split_citation() {
        let parser = ReferenceParser::new(ParserOptions {
            line_anchored: true,
            ..ParserOptions::default()
        });
        assert!(parser.parse("a.pdf,\nPage 3").is_empty());
        assert_eq!(
            extract_pdf_references("a.pdf,\nPage 3"),
            refs(&[("a.pdf", vec![3])])
        );
    }

    #[test]
    fn test_oversized_range_is_malformed() {
        assert!(extract_pdf_references("(a.pdf, Pages 1-4000000000)").is_empty());
        assert!(extract_pdf_references("(a.pdf, Page 99999999999)").is_empty());
    }

    #[test]
    fn test_normalize_filename_strips_unmatched_paren() {
        assert_eq!(normalize_filename("(a.pdf"), "a.pdf");
        assert_eq!(normalize_filename("see (a.pdf"), "a.pdf");
        assert_eq!(normalize_filename(" - Report (final).pdf"), "Report (final).pdf");
    }

    #[test]
    fn test_serializes_in_citation_order() {
        let parsed = extract_pdf_references("(z.pdf, Page 2) (a.pdf, Page 1)");
        let json = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, r#"{"z.pdf":[2],"a.pdf":[1]}"#);
    }
}
