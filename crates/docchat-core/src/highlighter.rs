//! Highlighting cited passages in the original PDF
//!
//! One [`Highlighter::highlight`] call handles one source file: it fetches
//! the bytes, finds every cited passage on its page and writes a Highlight
//! annotation for each region found. A target that cannot be located is
//! reported and skipped; only fetch, parse and save failures abort.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use lopdf::{Document, ObjectId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::annotate::{add_highlight, page_media_box, HighlightOptions};
use crate::blob::BlobStore;
use crate::chunker::Chunker;
use crate::error::{HighlightError, LocateError};
use crate::layout::{extract_page_text, PageText};
use crate::ocr::{self, OcrLayout};
use crate::sources::RelevantSource;
use crate::text_locator::find_on_page;

/// A cited passage and the 1-indexed page it was retrieved from
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightTarget {
    pub content: String,
    pub page: u32,
}

impl HighlightTarget {
    pub fn new(content: impl Into<String>, page: u32) -> Self {
        Self {
            content: content.into(),
            page,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// Text is extractable from the content streams
    Digital,
    /// Scanned pages, located through the OCR layout
    Scanned(OcrLayout),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HighlightSource {
    pub filename: String,
    pub targets: Vec<HighlightTarget>,
    pub kind: SourceKind,
}

impl From<RelevantSource> for HighlightSource {
    fn from(source: RelevantSource) -> Self {
        let targets = source
            .pairs()
            .map(|(content, page)| HighlightTarget::new(content, page))
            .collect();
        let kind = match source.pages_content {
            Some(layout) => SourceKind::Scanned(layout),
            None => SourceKind::Digital,
        };
        Self {
            filename: source.filename,
            targets,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetStatus {
    Annotated { regions: usize },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub page: u32,
    #[serde(flatten)]
    pub status: TargetStatus,
}

impl TargetReport {
    pub fn is_annotated(&self) -> bool {
        matches!(self.status, TargetStatus::Annotated { .. })
    }
}

#[derive(Debug, Clone)]
pub struct HighlightOutcome {
    pub pdf: Vec<u8>,
    /// For digital sources, whether any target was highlighted.
    /// Always true for scanned sources once highlighting was attempted.
    pub found: bool,
    pub targets: Vec<TargetReport>,
}

pub struct Highlighter<B, C> {
    store: B,
    chunker: C,
    options: HighlightOptions,
}

impl<B: BlobStore, C: Chunker> Highlighter<B, C> {
    pub fn new(store: B, chunker: C) -> Self {
        Self {
            store,
            chunker,
            options: HighlightOptions::default(),
        }
    }

    pub fn with_options(mut self, options: HighlightOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &B {
        &self.store
    }

    pub fn options(&self) -> &HighlightOptions {
        &self.options
    }

    pub fn highlight(
        &self,
        source: &HighlightSource,
        try_highlight: bool,
    ) -> Result<HighlightOutcome, HighlightError> {
        let bytes = self.store.fetch(&source.filename)?;
        if !try_highlight {
            debug!(filename = %source.filename, "highlighting disabled, returning original");
            return Ok(HighlightOutcome {
                pdf: bytes,
                found: false,
                targets: Vec::new(),
            });
        }

        let mut doc =
            Document::load_mem(&bytes).map_err(|e| HighlightError::Document(e.to_string()))?;
        let pages = doc.get_pages();

        let (found, targets) = match &source.kind {
            SourceKind::Scanned(layout) => {
                let targets = source
                    .targets
                    .iter()
                    .map(|target| self.highlight_scanned(&mut doc, &pages, layout, target))
                    .collect();
                (true, targets)
            }
            SourceKind::Digital => {
                let mut page_cache = HashMap::new();
                let targets: Vec<TargetReport> = source
                    .targets
                    .iter()
                    .map(|target| {
                        self.highlight_digital(&mut doc, &pages, &mut page_cache, target)
                    })
                    .collect();
                (targets.iter().any(TargetReport::is_annotated), targets)
            }
        };

        let mut pdf = Vec::new();
        doc.save_to(&mut pdf)
            .map_err(|e| HighlightError::Serialize(e.to_string()))?;
        drop(doc);

        info!(
            filename = %source.filename,
            targets = targets.len(),
            found,
            "highlighted PDF"
        );
        Ok(HighlightOutcome {
            pdf,
            found,
            targets,
        })
    }

    fn highlight_scanned(
        &self,
        doc: &mut Document,
        pages: &BTreeMap<u32, ObjectId>,
        layout: &OcrLayout,
        target: &HighlightTarget,
    ) -> TargetReport {
        let page = target.page;
        let Some(&page_id) = pages.get(&page) else {
            return skipped(page, LocateError::PageOutOfRange { page, count: pages.len() });
        };

        let media_box = page_media_box(doc, page_id);
        let rects = ocr::locate(layout, &target.content, page);
        if rects.is_empty() {
            return skipped(page, LocateError::NotFound(page));
        }

        for rect in &rects {
            let quad = rect.flip_y(&media_box);
            if let Err(e) = add_highlight(doc, page_id, page, &[quad], &self.options) {
                return skipped(page, e);
            }
        }
        debug!(page, regions = rects.len(), "annotated OCR lines");
        annotated(page, rects.len())
    }

    fn highlight_digital(
        &self,
        doc: &mut Document,
        pages: &BTreeMap<u32, ObjectId>,
        page_cache: &mut HashMap<u32, Result<PageText, LocateError>>,
        target: &HighlightTarget,
    ) -> TargetReport {
        let page = target.page;
        let Some(&page_id) = pages.get(&page) else {
            return skipped(page, LocateError::PageOutOfRange { page, count: pages.len() });
        };

        let page_text = page_cache
            .entry(page)
            .or_insert_with(|| extract_page_text(doc, page_id));
        let located = match page_text {
            Ok(text) => find_on_page(text, page, &target.content, &self.chunker),
            Err(e) => Err(e.clone()),
        };
        let matches = match located {
            Ok(matches) => matches,
            Err(e) => return skipped(page, e),
        };

        for found in &matches {
            if let Err(e) = add_highlight(doc, page_id, page, &found.quads, &self.options) {
                return skipped(page, e);
            }
        }
        debug!(page, regions = matches.len(), "annotated text matches");
        annotated(page, matches.len())
    }
}

fn annotated(page: u32, regions: usize) -> TargetReport {
    TargetReport {
        page,
        status: TargetStatus::Annotated { regions },
    }
}

fn skipped(page: u32, reason: impl Display) -> TargetReport {
    warn!(page, %reason, "skipping highlight target");
    TargetReport {
        page,
        status: TargetStatus::Skipped {
            reason: reason.to_string(),
        },
    }
}

/// Highlighted bytes of `source` and whether anything was found.
pub fn get_highlighted_pdf_content<B: BlobStore, C: Chunker>(
    highlighter: &Highlighter<B, C>,
    source: &HighlightSource,
    try_highlight: bool,
) -> Result<(Vec<u8>, bool), HighlightError> {
    let outcome = highlighter.highlight(source, try_highlight)?;
    Ok((outcome.pdf, outcome.found))
}
