use thiserror::Error;

/// Fatal failures for a single highlight request.
#[derive(Error, Debug)]
pub enum HighlightError {
    #[error("Failed to fetch PDF: {0}")]
    Blob(#[from] BlobError),

    #[error("Failed to parse PDF: {0}")]
    Document(String),

    #[error("Failed to annotate page {page}: {message}")]
    Annotation { page: u32, message: String },

    #[error("Failed to serialize PDF: {0}")]
    Serialize(String),
}

/// Per-target failures. These are absorbed by the highlighter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    #[error("page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: usize },

    #[error("page {0} has no extractable text")]
    EmptyPage(u32),

    #[error("page text produced no chunks")]
    NoCandidates,

    #[error("empty vocabulary; text contains only stop characters")]
    EmptyVocabulary,

    #[error("no literal occurrence of the best chunk on page {0}")]
    NotFound(u32),

    #[error("page content could not be read: {0}")]
    Content(String),
}

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob name: {0:?}")]
    InvalidName(String),

    #[error("blob store I/O error: {0}")]
    Io(#[from] std::io::Error),
}
