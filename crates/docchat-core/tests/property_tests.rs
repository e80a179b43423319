//! Property-based tests for citation parsing and source matching

use std::collections::BTreeSet;

use docchat_core::{
    extract_pdf_references, get_relevant_sources, ParserOptions, ReferenceParser, SourceChunk,
};
use proptest::prelude::*;

fn filename() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}".prop_map(|stem| format!("{stem}.pdf"))
}

fn page_list() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(1u32..500, 1..8)
}

fn join(pages: &[u32]) -> String {
    pages
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ============================================================
    // Citation parsing
    // ============================================================

    #[test]
    fn inline_citation_yields_sorted_unique_pages(name in filename(), pages in page_list()) {
        let text = format!("The rent is due monthly ({name}, Pages {}).", join(&pages));
        let refs = extract_pdf_references(&text);

        let expected: Vec<u32> = pages.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        prop_assert_eq!(refs.len(), 1);
        prop_assert_eq!(refs.get(&name), Some(expected.as_slice()));
    }

    #[test]
    fn ranges_expand_inclusively(name in filename(), start in 1u32..300, span in 0u32..50) {
        let text = format!("{name}, Pages {}-{}", start, start + span);
        let refs = extract_pdf_references(&text);
        let expected: Vec<u32> = (start..=start + span).collect();
        prop_assert_eq!(refs.get(&name), Some(expected.as_slice()));
    }

    #[test]
    fn reversed_ranges_contribute_nothing(name in filename(), start in 2u32..300, back in 1u32..50) {
        let end = start.saturating_sub(back).max(1);
        prop_assume!(end < start);
        let refs = extract_pdf_references(&format!("{name}, Pages {start}-{end}"));
        prop_assert!(refs.is_empty());
    }

    #[test]
    fn repeated_citations_accumulate(name in filename(), a in page_list(), b in page_list()) {
        let text = format!("({name}, Pages {}) and later ({name}, Page {})", join(&a), join(&b));
        let refs = extract_pdf_references(&text);

        let expected: Vec<u32> = a.iter().chain(b.iter()).copied().collect::<BTreeSet<_>>().into_iter().collect();
        prop_assert_eq!(refs.get(&name), Some(expected.as_slice()));
    }

    #[test]
    fn reparsing_rendered_pages_is_idempotent(name in filename(), pages in page_list()) {
        let first = extract_pdf_references(&format!("({name}, Pages {})", join(&pages)));
        let rendered = first.get(&name).map(join).unwrap_or_default();
        let second = extract_pdf_references(&format!("({name}, Pages {rendered})"));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn parsing_is_deterministic(text in "\\PC{0,200}") {
        let parser = ReferenceParser::new(ParserOptions::default());
        prop_assert_eq!(parser.parse(&text), parser.parse(&text));
    }

    #[test]
    fn anchored_parser_never_panics(text in "[a-z .,\\-\n0-9]{0,200}(\\.pdf, Pages [0-9 ,\\-]{0,20})?") {
        let parser = ReferenceParser::new(ParserOptions { line_anchored: true, ..Default::default() });
        for (_, pages) in parser.parse(&text).iter() {
            prop_assert!(pages.windows(2).all(|w| w[0] < w[1]));
        }
    }

    // ============================================================
    // Source matching
    // ============================================================

    #[test]
    fn relevant_sources_stay_aligned(
        chunks in prop::collection::vec(
            (prop::sample::select(vec!["a.pdf", "docs/b.pdf", "C.PDF"]), 1u32..6, "[a-z ]{0,20}"),
            0..20,
        )
    ) {
        let refs = extract_pdf_references("- a.pdf, Pages 1-3\n- b.pdf, Page 2\n- c.pdf, Pages 4 and 5");
        let chunks: Vec<SourceChunk> = chunks
            .into_iter()
            .map(|(name, page, content)| SourceChunk::new(name, page, content))
            .collect();

        let sources = get_relevant_sources(&refs, &chunks);
        for source in &sources {
            prop_assert_eq!(source.content.len(), source.page_number.len());
            let cited = refs
                .iter()
                .find(|(name, _)| source.filename.to_lowercase().ends_with(&name.to_lowercase()))
                .map(|(_, pages)| pages.to_vec())
                .unwrap_or_default();
            for page in &source.page_number {
                prop_assert!(cited.contains(page));
            }
        }

        let names: BTreeSet<&str> = sources.iter().map(|s| s.filename.as_str()).collect();
        prop_assert_eq!(names.len(), sources.len());
    }
}
