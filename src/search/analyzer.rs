// src/search/analyzer.rs

//! Text analysis shared by indexing and querying.

use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

/// Common French stop words, plus URL artifacts.
const STOPWORDS: &[&str] = &[
    "au", "aux", "avec", "ce", "ces", "cet", "cette", "dans", "de", "des", "du", "elle", "elles",
    "en", "est", "et", "il", "ils", "la", "le", "les", "leur", "leurs", "lui", "ne", "ni", "nos",
    "notre", "on", "ou", "par", "pas", "pour", "qu", "que", "qui", "sa", "se", "ses", "son",
    "sont", "sur", "un", "une", "vos", "votre", // URL artifacts
    "http", "https", "www", "fr", "html",
];

/// Lowercasing, word segmentation, stop-word removal and French stemming.
pub struct Analyzer {
    stemmer: Stemmer,
    min_token_length: usize,
}

impl Analyzer {
    pub fn new(min_token_length: usize) -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::French),
            min_token_length,
        }
    }

    /// Normalized words of `text`, in order, before stemming.
    ///
    /// Elided articles (`l'`, `d'`) are split off and dropped with the other
    /// short or stop words.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let normalized = text.to_lowercase();

        normalized
            .unicode_words()
            .flat_map(|word| word.split(['\'', '’']))
            .filter(|word| word.chars().count() >= self.min_token_length)
            .filter(|word| !is_stopword(word))
            .map(String::from)
            .collect()
    }

    /// Index terms of `text`: its tokens, stemmed.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        self.tokens(text)
            .iter()
            .map(|token| self.stem(token))
            .collect()
    }

    pub fn stem(&self, token: &str) -> String {
        self.stemmer.stem(token).into_owned()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(2)
    }
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}
