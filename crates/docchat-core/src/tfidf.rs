//! Classic TF-IDF vectors and cosine similarity
//!
//! Term handling follows the common defaults: lowercase, tokens of two or
//! more word characters, smoothed idf `ln((1 + n) / (1 + df)) + 1`, raw term
//! counts and L2-normalized rows.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::LocateError;

lazy_static! {
    static ref TOKEN_PATTERN: Regex = Regex::new(r"\b\w\w+\b").unwrap();
}

fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Sparse, L2-normalized document vectors over a shared vocabulary
#[derive(Debug)]
pub struct TfIdfMatrix {
    rows: Vec<HashMap<usize, f64>>,
}

impl TfIdfMatrix {
    /// Fit the vocabulary and idf weights on `documents` and transform them.
    pub fn fit_transform<S: AsRef<str>>(documents: &[S]) -> Result<Self, LocateError> {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut counts: Vec<HashMap<usize, f64>> = Vec::with_capacity(documents.len());

        for doc in documents {
            let mut row: HashMap<usize, f64> = HashMap::new();
            for token in tokenize(doc.as_ref()) {
                let next = vocabulary.len();
                let term = *vocabulary.entry(token).or_insert(next);
                *row.entry(term).or_insert(0.0) += 1.0;
            }
            counts.push(row);
        }

        if vocabulary.is_empty() {
            return Err(LocateError::EmptyVocabulary);
        }

        let mut document_frequency = vec![0usize; vocabulary.len()];
        for row in &counts {
            for &term in row.keys() {
                document_frequency[term] += 1;
            }
        }

        let n = documents.len() as f64;
        let idf: Vec<f64> = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        let rows = counts
            .into_iter()
            .map(|mut row| {
                for (term, weight) in row.iter_mut() {
                    *weight *= idf[*term];
                }
                let norm = row.values().map(|w| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for weight in row.values_mut() {
                        *weight /= norm;
                    }
                }
                row
            })
            .collect();

        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cosine similarity of two rows (rows are already unit length)
    pub fn cosine(&self, i: usize, j: usize) -> f64 {
        let (small, large) = if self.rows[i].len() <= self.rows[j].len() {
            (&self.rows[i], &self.rows[j])
        } else {
            (&self.rows[j], &self.rows[i])
        };
        small
            .iter()
            .filter_map(|(term, w)| large.get(term).map(|v| w * v))
            .sum()
    }
}

/// Index into `candidates` of the entry most similar to `query`.
///
/// Ties go to the earliest candidate.
pub fn most_similar<S: AsRef<str>>(query: &str, candidates: &[S]) -> Result<usize, LocateError> {
    if candidates.is_empty() {
        return Err(LocateError::NoCandidates);
    }

    let mut documents: Vec<&str> = Vec::with_capacity(candidates.len() + 1);
    documents.push(query);
    documents.extend(candidates.iter().map(AsRef::as_ref));

    let matrix = TfIdfMatrix::fit_transform(&documents)?;

    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for idx in 0..candidates.len() {
        let score = matrix.cosine(0, idx + 1);
        if score > best_score {
            best = idx;
            best_score = score;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_drops_single_characters() {
        assert_eq!(tokenize("A cat, a DOG; x9!"), vec!["cat", "dog", "x9"]);
    }

    #[test]
    fn test_identical_documents_have_unit_similarity() {
        let m = TfIdfMatrix::fit_transform(&["late fee policy", "late fee policy", "other"]).unwrap();
        assert!((m.cosine(0, 1) - 1.0).abs() < 1e-9);
        assert_eq!(m.cosine(0, 2), 0.0);
    }

    #[test]
    fn test_idf_matches_smoothed_formula() {
        // "shared" appears in both documents, "only" in one.
        let m = TfIdfMatrix::fit_transform(&["shared only", "shared"]).unwrap();
        let idf_only = (3.0f64 / 2.0).ln() + 1.0;
        let idf_shared = 1.0;
        let norm = (idf_only * idf_only + idf_shared * idf_shared).sqrt();
        let expected = idf_shared / norm;
        assert!((m.cosine(0, 1) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_most_similar_prefers_rare_shared_terms() {
        let candidates = [
            "the tenant shall pay the rent",
            "security deposit returned within fifteen days",
            "the the the tenant",
        ];
        let best = most_similar("when is the security deposit returned", &candidates).unwrap();
        assert_eq!(best, 1);
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let best = most_similar("zebra", &["alpha", "beta"]).unwrap();
        assert_eq!(best, 0);
    }

    #[test]
    fn test_empty_vocabulary_errors() {
        assert_eq!(
            most_similar("a", &["b", "- ."]),
            Err(LocateError::EmptyVocabulary)
        );
        let none: [&str; 0] = [];
        assert_eq!(most_similar("query", &none), Err(LocateError::NoCandidates));
    }
}
