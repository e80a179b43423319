//! Source chunks and citation matching
//!
//! The retrieval backend returns the chunks it used as evidence. Only the
//! chunks that the answer actually cites are worth showing, so each cited
//! filename is matched against the chunk list and the matching chunks are
//! merged into one [`RelevantSource`] per file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::ocr::OcrLayout;
use crate::references::PdfReferences;

/// A page number as sent by the backend: a JSON integer, an integral
/// float such as `3.0`, or a numeric string. Anything else is kept so the
/// chunk still deserializes, and never matches a citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageValue {
    Number(u32),
    Float(f64),
    Text(String),
    Other(Value),
}

impl PageValue {
    pub fn as_page(&self) -> Option<u32> {
        match self {
            PageValue::Number(n) => Some(*n),
            PageValue::Float(f) => whole_page(*f),
            PageValue::Text(s) => {
                let s = s.trim();
                s.parse().ok().or_else(|| s.parse().ok().and_then(whole_page))
            }
            PageValue::Other(_) => None,
        }
    }
}

fn whole_page(f: f64) -> Option<u32> {
    (f.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&f)).then_some(f as u32)
}

/// Scalar or list page number of a chunk. A missing page number never matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageNumber {
    Many(Vec<PageValue>),
    One(PageValue),
}

impl Default for PageNumber {
    fn default() -> Self {
        PageNumber::One(PageValue::Other(Value::Null))
    }
}

impl PageNumber {
    /// The page used for matching. Multi-page chunks are checked by their
    /// first page only.
    pub fn first_page(&self) -> Option<u32> {
        match self {
            PageNumber::One(value) => value.as_page(),
            PageNumber::Many(values) => values.first().and_then(PageValue::as_page),
        }
    }
}

impl From<u32> for PageNumber {
    fn from(page: u32) -> Self {
        PageNumber::One(PageValue::Number(page))
    }
}

/// One retrieved evidence chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceChunk {
    pub filename: String,
    #[serde(default)]
    pub page_number: PageNumber,
    #[serde(default)]
    pub content: String,
    /// OCR layout for scanned documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_content: Option<OcrLayout>,
    /// Any other backend fields, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceChunk {
    pub fn new(filename: impl Into<String>, page: u32, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            page_number: page.into(),
            content: content.into(),
            pages_content: None,
            extra: Map::new(),
        }
    }
}

/// All cited chunks of one file. `content[i]` belongs to `page_number[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantSource {
    pub filename: String,
    pub content: Vec<String>,
    pub page_number: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_content: Option<OcrLayout>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelevantSource {
    fn seed(chunk: &SourceChunk, page: u32) -> Self {
        Self {
            filename: chunk.filename.clone(),
            content: vec![chunk.content.clone()],
            page_number: vec![page],
            pages_content: chunk.pages_content.clone(),
            extra: chunk.extra.clone(),
        }
    }

    fn push(&mut self, chunk: &SourceChunk, page: u32) {
        self.content.push(chunk.content.clone());
        self.page_number.push(page);
    }

    /// `(content, page)` pairs in arrival order
    pub fn pairs(&self) -> impl Iterator<Item = (&str, u32)> {
        self.content
            .iter()
            .map(String::as_str)
            .zip(self.page_number.iter().copied())
    }
}

/// Last path segment of a filename, trimmed.
pub fn strip_path(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
}

/// Cross-reference parsed citations against the retrieved chunks.
///
/// Filenames are compared case-insensitively on their last path segment.
/// A chunk is kept when its (first) page is one of the cited pages. The
/// result holds one entry per file, in the order the entries were created.
pub fn get_relevant_sources(refs: &PdfReferences, chunks: &[SourceChunk]) -> Vec<RelevantSource> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, RelevantSource> = HashMap::new();

    for (cited, allowed_pages) in refs.iter() {
        let cited_name = strip_path(cited).to_lowercase();

        for chunk in chunks {
            let chunk_name = strip_path(&chunk.filename);
            if chunk_name.to_lowercase() != cited_name {
                continue;
            }
            let Some(page) = chunk.page_number.first_page() else {
                debug!(filename = %chunk.filename, "chunk has no usable page number");
                continue;
            };
            if allowed_pages.binary_search(&page).is_err() {
                continue;
            }

            match merged.get_mut(chunk_name) {
                Some(source) => source.push(chunk, page),
                None => {
                    order.push(chunk_name.to_string());
                    merged.insert(chunk_name.to_string(), RelevantSource::seed(chunk, page));
                }
            }
        }
    }

    order
        .iter()
        .filter_map(|name| merged.remove(name))
        .collect()
}
