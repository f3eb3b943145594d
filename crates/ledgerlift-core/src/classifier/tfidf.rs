//! Bag-of-words TF-IDF vectorizer for short merchant/item descriptions

use std::collections::HashMap;

/// Uppercase alphanumeric tokens of at least two characters
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_uppercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_string())
        .collect()
}

/// Vocabulary + inverse document frequencies fitted on a corpus
#[derive(Debug)]
pub struct TfidfVectorizer {
    index: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Fit on a corpus, keeping at most `max_features` terms (highest corpus
    /// frequency first; ties break on the term for determinism)
    pub fn fit(docs: &[String], max_features: usize) -> Self {
        let mut corpus_counts: HashMap<String, usize> = HashMap::new();
        let mut doc_counts: HashMap<String, usize> = HashMap::new();

        for doc in docs {
            let tokens = tokenize(doc);
            for token in &tokens {
                *corpus_counts.entry(token.clone()).or_insert(0) += 1;
            }
            let mut unique: Vec<&String> = tokens.iter().collect();
            unique.sort();
            unique.dedup();
            for token in unique {
                *doc_counts.entry(token.clone()).or_insert(0) += 1;
            }
        }

        let mut terms: Vec<(String, usize)> = corpus_counts.into_iter().collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        terms.truncate(max_features);

        let n_docs = docs.len() as f64;
        let mut index = HashMap::new();
        let mut idf = Vec::with_capacity(terms.len());
        for (i, (term, _)) in terms.into_iter().enumerate() {
            let df = *doc_counts.get(&term).unwrap_or(&0) as f64;
            // Smoothed idf so no term ever gets a zero weight
            idf.push(((1.0 + n_docs) / (1.0 + df)).ln() + 1.0);
            index.insert(term, i);
        }

        Self { index, idf }
    }

    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    /// Dense, l2-normalized TF-IDF vector. Out-of-vocabulary tokens are
    /// dropped; a fully unknown document comes back all-zero.
    pub fn transform(&self, doc: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.idf.len()];
        for token in tokenize(doc) {
            if let Some(&i) = self.index.get(&token) {
                vector[i] += self.idf[i];
            }
        }
        let norm: f64 = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}
