//! Lexical schema retrieval
//!
//! Ranks schema snippets against the user's question with a TF-IDF vector
//! space (stop-words removed, smoothed idf, L2-normalised vectors, cosine
//! similarity) and keeps the top-k so the generation prompt stays small.
//! The vector space is rebuilt per request; it holds no cross-request state.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::SchemaSnippet;

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9_][a-z0-9_]+").expect("static token pattern"));

/// Common English stop words, excluded from the vector space.
static STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "cannot", "could", "did", "do", "does", "doing", "down", "during", "each",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "out", "over", "own", "same", "she", "should", "so", "some",
    "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up", "very",
    "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "would", "you", "your", "yours", "yourself",
];

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

fn l2_normalize(vector: &mut HashMap<usize, f64>) {
    let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for weight in vector.values_mut() {
            *weight /= norm;
        }
    }
}

/// Per-request TF-IDF index over the snippet corpus.
pub struct SchemaRetriever {
    snippets: Vec<SchemaSnippet>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    doc_vectors: Vec<HashMap<usize, f64>>,
}

impl SchemaRetriever {
    pub fn new(snippets: Vec<SchemaSnippet>) -> Self {
        let tokenized: Vec<Vec<String>> =
            snippets.iter().map(|s| tokenize(&s.content)).collect();

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();
        for tokens in &tokenized {
            let mut seen: Vec<usize> = Vec::new();
            for token in tokens {
                let next_id = vocabulary.len();
                let id = *vocabulary.entry(token.clone()).or_insert(next_id);
                if id == document_frequency.len() {
                    document_frequency.push(0);
                }
                if !seen.contains(&id) {
                    seen.push(id);
                    document_frequency[id] += 1;
                }
            }
        }

        // Smoothed idf, as in scikit-learn: ln((1 + n) / (1 + df)) + 1.
        let corpus_size = snippets.len() as f64;
        let idf: Vec<f64> = document_frequency
            .iter()
            .map(|df| ((1.0 + corpus_size) / (1.0 + *df as f64)).ln() + 1.0)
            .collect();

        let doc_vectors = tokenized
            .iter()
            .map(|tokens| {
                let mut vector: HashMap<usize, f64> = HashMap::new();
                for token in tokens {
                    if let Some(&id) = vocabulary.get(token) {
                        *vector.entry(id).or_insert(0.0) += idf[id];
                    }
                }
                l2_normalize(&mut vector);
                vector
            })
            .collect();

        Self {
            snippets,
            vocabulary,
            idf,
            doc_vectors,
        }
    }

    /// Cosine similarity between the question and every snippet, in corpus
    /// order.
    fn similarities(&self, question: &str) -> Vec<f64> {
        let mut query: HashMap<usize, f64> = HashMap::new();
        for token in tokenize(question) {
            if let Some(&id) = self.vocabulary.get(&token) {
                *query.entry(id).or_insert(0.0) += self.idf[id];
            }
        }
        l2_normalize(&mut query);

        self.doc_vectors
            .iter()
            .map(|doc| {
                query
                    .iter()
                    .filter_map(|(id, weight)| doc.get(id).map(|dw| dw * weight))
                    .sum()
            })
            .collect()
    }

    /// Top-k snippets with strictly positive similarity, ranked descending,
    /// ties broken by corpus order. Falls back to the first k snippets when
    /// nothing scores positive, so the generator always receives some schema
    /// when schema exists.
    pub fn retrieve(&self, question: &str, k: usize) -> Vec<&SchemaSnippet> {
        if self.snippets.is_empty() || k == 0 {
            return Vec::new();
        }

        let similarities = self.similarities(question);
        let mut ranked: Vec<(usize, f64)> = similarities
            .iter()
            .enumerate()
            .filter(|(_, score)| **score > 0.0)
            .map(|(index, score)| (index, *score))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        ranked.truncate(k);

        if ranked.is_empty() {
            return self.snippets.iter().take(k).collect();
        }

        ranked.iter().map(|(index, _)| &self.snippets[*index]).collect()
    }

    /// Schema context block for the generation prompt.
    pub fn context_block(&self, question: &str, k: usize) -> String {
        self.retrieve(question, k)
            .iter()
            .map(|snippet| snippet.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
