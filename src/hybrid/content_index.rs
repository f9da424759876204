use hashbrown::HashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{RecoError, Result};

// English stop words, excluded from the vocabulary.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway",
    "anywhere", "are", "around", "as", "at", "back", "be", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below", "beside",
    "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call", "can",
    "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail", "do",
    "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto", "or",
    "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "part",
    "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together", "too",
    "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up", "upon",
    "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence",
    "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever",
    "whether", "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Lower-cased runs of at least two alphanumeric characters, stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .filter(|token| !STOP_WORDS.contains(token))
        .map(|token| token.to_string())
        .collect()
}

/// TF-IDF vector space over product names. Row `i` is the `i`-th name given to `fit`,
/// vectors are L2-normalised so a dot product is the cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentIndex {
    vocabulary: HashMap<String, u32>,
    idf: Vec<f64>,
    vectors: Vec<Vec<(u32, f64)>>,
    postings: Vec<Vec<(u32, f64)>>,
}

impl ContentIndex {
    pub fn fit<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let tokenized: Vec<Vec<String>> = names.into_iter().map(tokenize).collect();
        let num_docs = tokenized.len();

        let mut vocabulary: HashMap<String, u32> = HashMap::new();
        let mut doc_freq: Vec<usize> = Vec::new();
        let mut counts_per_doc: Vec<Vec<(u32, usize)>> = Vec::with_capacity(num_docs);
        for tokens in tokenized.iter() {
            let mut counts: HashMap<u32, usize> = HashMap::new();
            for token in tokens {
                let next = vocabulary.len() as u32;
                let term = *vocabulary.entry(token.clone()).or_insert(next);
                if term == next {
                    doc_freq.push(0);
                }
                *counts.entry(term).or_insert(0) += 1;
            }
            for term in counts.keys() {
                doc_freq[*term as usize] += 1;
            }
            let mut counts: Vec<(u32, usize)> = counts.into_iter().collect();
            counts.sort_unstable_by_key(|(term, _)| *term);
            counts_per_doc.push(counts);
        }

        // smoothed idf: ln((1 + n) / (1 + df)) + 1
        let idf: Vec<f64> = doc_freq
            .iter()
            .map(|df| ((1.0 + num_docs as f64) / (1.0 + *df as f64)).ln() + 1.0)
            .collect();

        let vectors: Vec<Vec<(u32, f64)>> = counts_per_doc
            .into_iter()
            .map(|counts| {
                let mut vector: Vec<(u32, f64)> = counts
                    .into_iter()
                    .map(|(term, tf)| (term, tf as f64 * idf[term as usize]))
                    .collect();
                let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    vector.iter_mut().for_each(|(_, w)| *w /= norm);
                }
                vector
            })
            .collect();

        let mut postings: Vec<Vec<(u32, f64)>> = vec![Vec::new(); idf.len()];
        for (doc, vector) in vectors.iter().enumerate() {
            for (term, weight) in vector {
                postings[*term as usize].push((doc as u32, *weight));
            }
        }

        ContentIndex {
            vocabulary,
            idf,
            vectors,
            postings,
        }
    }

    pub fn num_products(&self) -> usize {
        self.vectors.len()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Cosine similarity of `product_idx` against every product, in catalog order.
    pub fn similarity(&self, product_idx: usize) -> Result<Vec<f64>> {
        let query = self.vectors.get(product_idx).ok_or_else(|| {
            RecoError::InternalComputation(format!(
                "product row {} is outside of the {} indexed names",
                product_idx,
                self.vectors.len()
            ))
        })?;

        let mut similarities = vec![0.0_f64; self.vectors.len()];
        for (term, query_weight) in query {
            for (doc, weight) in self.postings[*term as usize].iter() {
                similarities[*doc as usize] += query_weight * weight;
            }
        }
        if similarities.par_iter().any(|value| !value.is_finite()) {
            return Err(RecoError::InternalComputation(
                "non-finite content similarity".to_string(),
            ));
        }
        similarities
            .iter_mut()
            .for_each(|value| *value = value.clamp(0.0, 1.0));
        Ok(similarities)
    }
}

#[cfg(test)]
mod content_index_test {
    use float_cmp::approx_eq;

    use super::*;

    #[test]
    fn should_drop_stop_words_and_short_tokens() {
        assert_eq!(
            vec!["milk".to_string(), "cookies".to_string(), "2x".to_string()],
            tokenize("Milk and a Cookies, 2x")
        );
    }

    #[test]
    fn should_score_self_highest() {
        let index = ContentIndex::fit(vec![
            "Organic Bananas",
            "Banana Chips",
            "Organic Whole Milk",
            "Bag of Organic Bananas",
        ]);
        let similarities = index.similarity(0).unwrap();

        assert_eq!(4, similarities.len());
        assert!(approx_eq!(f64, 1.0, similarities[0], epsilon = 1e-9));
        assert!(approx_eq!(f64, 0.0, similarities[1], epsilon = 1e-12));
        assert!(similarities[3] > similarities[2]);
        assert!(similarities.iter().all(|value| (0.0..=1.0).contains(value)));
    }

    #[test]
    fn should_give_zero_vector_for_stop_word_only_names() {
        let index = ContentIndex::fit(vec!["the one", "Oat Milk"]);
        let similarities = index.similarity(0).unwrap();
        assert!(similarities.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn should_fail_for_unknown_row() {
        let index = ContentIndex::fit(vec!["Oat Milk"]);
        assert!(matches!(
            index.similarity(3),
            Err(RecoError::InternalComputation(_))
        ));
    }
}
