// src/search/lexicon.rs

//! Lexical network: lemmas and synonym sets for query expansion.
//!
//! The bundled implementation reads a local JSON file:
//!
//! ```json
//! {
//!   "lemmas": { "abattoirs": "abattoir" },
//!   "synsets": [["hygiène", "salubrité", "propreté"]]
//! }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};

/// Source of lemmas and synonyms.
pub trait LexicalNetwork: Send + Sync {
    /// Dictionary form of a lowercase word; the word itself when unknown.
    fn lemma(&self, word: &str) -> String;

    /// Words sharing a synset with `lemma`, excluding `lemma` itself.
    fn synonyms(&self, lemma: &str) -> BTreeSet<String>;
}

#[derive(Debug, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    lemmas: HashMap<String, String>,
    #[serde(default)]
    synsets: Vec<Vec<String>>,
}

/// Lexical network loaded from a JSON word-forms and synonym file.
#[derive(Debug, Default)]
pub struct JsonLexicon {
    lemmas: HashMap<String, String>,
    synsets: Vec<BTreeSet<String>>,
    /// word -> positions in `synsets`
    membership: HashMap<String, Vec<usize>>,
}

impl JsonLexicon {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::lexical(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw).map_err(|e| match e {
            AppError::Lexical(message) => {
                AppError::lexical(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: LexiconFile = serde_json::from_str(raw).map_err(AppError::lexical)?;

        let lemmas = file
            .lemmas
            .into_iter()
            .map(|(form, lemma)| (form.to_lowercase(), lemma.to_lowercase()))
            .collect();

        let mut lexicon = Self {
            lemmas,
            ..Self::default()
        };

        for synset in file.synsets {
            let words: BTreeSet<String> = synset
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect();
            if words.len() < 2 {
                continue;
            }

            let position = lexicon.synsets.len();
            for word in &words {
                lexicon
                    .membership
                    .entry(word.clone())
                    .or_default()
                    .push(position);
            }
            lexicon.synsets.push(words);
        }

        Ok(lexicon)
    }

    pub fn synset_count(&self) -> usize {
        self.synsets.len()
    }
}

impl LexicalNetwork for JsonLexicon {
    fn lemma(&self, word: &str) -> String {
        self.lemmas
            .get(word)
            .cloned()
            .unwrap_or_else(|| word.to_string())
    }

    fn synonyms(&self, lemma: &str) -> BTreeSet<String> {
        self.membership
            .get(lemma)
            .into_iter()
            .flatten()
            .flat_map(|&position| self.synsets[position].iter())
            .filter(|word| word.as_str() != lemma)
            .cloned()
            .collect()
    }
}
