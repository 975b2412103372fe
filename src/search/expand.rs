// src/search/expand.rs

//! Query expansion with lemmas and synonyms.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use super::analyzer::Analyzer;
use super::lexicon::{JsonLexicon, LexicalNetwork};

/// A query matching any of its terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisjunctiveQuery {
    pub terms: BTreeSet<String>,
}

impl DisjunctiveQuery {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl std::fmt::Display for DisjunctiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let terms: Vec<&str> = self.terms.iter().map(String::as_str).collect();
        write!(f, "{}", terms.join(" OR "))
    }
}

/// Expands free-text queries through a lexical network.
///
/// Without a network, expansion is the normalized literal query.
pub struct QueryExpander {
    lexicon: Option<Arc<dyn LexicalNetwork>>,
    analyzer: Analyzer,
}

impl QueryExpander {
    pub fn new(lexicon: Option<Arc<dyn LexicalNetwork>>, min_token_length: usize) -> Self {
        Self {
            lexicon,
            analyzer: Analyzer::new(min_token_length),
        }
    }

    /// Load the JSON lexicon at `path`, degrading when it is unusable.
    pub fn from_path(path: impl AsRef<Path>, min_token_length: usize) -> Self {
        let lexicon = match JsonLexicon::load(path) {
            Ok(lexicon) => {
                log::debug!("Loaded lexicon with {} synsets", lexicon.synset_count());
                Some(Arc::new(lexicon) as Arc<dyn LexicalNetwork>)
            }
            Err(e) => {
                log::warn!("{} - query expansion disabled", e);
                None
            }
        };
        Self::new(lexicon, min_token_length)
    }

    pub fn is_degraded(&self) -> bool {
        self.lexicon.is_none()
    }

    /// Normalized query words, their lemmas and every synonym of those.
    pub fn expand(&self, query: &str) -> BTreeSet<String> {
        let tokens = self.analyzer.tokens(query);

        let Some(lexicon) = &self.lexicon else {
            return tokens.into_iter().collect();
        };

        let mut terms = BTreeSet::new();
        for token in tokens {
            let lemma = lexicon.lemma(&token);
            terms.extend(lexicon.synonyms(&lemma));
            terms.insert(lemma);
            terms.insert(token);
        }
        terms
    }

    pub fn build_query(&self, query: &str) -> DisjunctiveQuery {
        DisjunctiveQuery {
            terms: self.expand(query),
        }
    }
}
