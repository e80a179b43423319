//! Locating cited text on a digital page
//!
//! The cited content is usually a chunk produced at ingestion time, so the
//! page text is re-chunked and the chunk closest to the citation (TF-IDF
//! cosine) is searched for literally.

use tracing::debug;

use crate::chunker::Chunker;
use crate::error::LocateError;
use crate::layout::{PageText, TextMatch};
use crate::tfidf::most_similar;

/// Best-matching chunk of `page_text` for `cited`.
///
/// Returns `Ok(None)` when there is nothing to look for.
pub fn locate(
    page_text: &str,
    cited: &str,
    chunker: &dyn Chunker,
) -> Result<Option<String>, LocateError> {
    if cited.trim().is_empty() {
        return Ok(None);
    }

    let mut chunks = chunker.chunk_text(page_text);
    let best = most_similar(cited, chunks.as_slice())?;
    debug!(candidates = chunks.len(), best, "selected page chunk");
    Ok(Some(chunks.swap_remove(best)))
}

/// Every occurrence on `page` of the chunk that best matches `cited`.
pub fn find_on_page(
    page: &PageText,
    page_number: u32,
    cited: &str,
    chunker: &dyn Chunker,
) -> Result<Vec<TextMatch>, LocateError> {
    if page.is_blank() {
        return Err(LocateError::EmptyPage(page_number));
    }

    let Some(chunk) = locate(&page.text(), cited, chunker)? else {
        return Err(LocateError::NotFound(page_number));
    };

    let matches = page.search(&chunk);
    if matches.is_empty() {
        return Err(LocateError::NotFound(page_number));
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::WordWindowChunker;
    use pretty_assertions::assert_eq;

    const PAGE: &str = "Section 1 Rent. The tenant shall pay rent monthly.\n\
                        Section 2 Deposit. The security deposit is returned within fifteen days.\n\
                        Section 3 Pets. No pets are allowed without written consent.";

    #[test]
    fn test_picks_chunk_sharing_rare_terms() {
        let chunker = WordWindowChunker::new(8, 0);
        let best = locate(PAGE, "security deposit returned", &chunker)
            .unwrap()
            .unwrap();
        assert!(best.contains("deposit"), "got {best:?}");
    }

    #[test]
    fn test_single_window_returns_whole_page() {
        let chunker = WordWindowChunker::default();
        let best = locate("Late fees apply\nafter five days.", "late fee", &chunker)
            .unwrap()
            .unwrap();
        assert_eq!(best, "Late fees apply after five days.");
    }

    #[test]
    fn test_blank_citation_locates_nothing() {
        let chunker = WordWindowChunker::default();
        assert_eq!(locate(PAGE, "  ", &chunker), Ok(None));
    }

    #[test]
    fn test_blank_page_has_no_candidates() {
        let chunker = WordWindowChunker::default();
        assert_eq!(
            locate(" \n ", "deposit", &chunker),
            Err(LocateError::NoCandidates)
        );
    }

    #[test]
    fn test_stop_characters_only() {
        let chunker = WordWindowChunker::default();
        assert_eq!(
            locate("a b c", "x", &chunker),
            Err(LocateError::EmptyVocabulary)
        );
    }
}
