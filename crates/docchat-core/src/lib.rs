//! Citation resolution and PDF highlighting for document chat
//!
//! An answer from the retrieval backend cites its evidence inline, e.g.
//! `lease.pdf, Pages 3-4`. This crate:
//! - parses those citations ([`extract_pdf_references`])
//! - keeps only the retrieved chunks the answer cites ([`get_relevant_sources`])
//! - highlights the cited passages in the original PDF ([`Highlighter`])
//!
//! Digital pages are searched through their content streams; scanned pages
//! use the OCR layout that came with the chunk.

pub mod annotate;
pub mod blob;
pub mod chunker;
pub mod error;
mod font;
pub mod geometry;
pub mod highlighter;
pub mod layout;
mod object;
pub mod ocr;
pub mod references;
pub mod sources;
pub mod text_locator;
pub mod tfidf;

pub use annotate::HighlightOptions;
pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use chunker::{Chunker, WordWindowChunker};
pub use error::{BlobError, HighlightError, LocateError};
pub use geometry::Rect;
pub use highlighter::{
    get_highlighted_pdf_content, HighlightOutcome, HighlightSource, HighlightTarget, Highlighter,
    SourceKind, TargetReport, TargetStatus,
};
pub use ocr::{OcrLayout, OcrLine, OcrPage};
pub use references::{extract_pdf_references, ParserOptions, PdfReferences, ReferenceParser};
pub use sources::{get_relevant_sources, PageNumber, PageValue, RelevantSource, SourceChunk};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
