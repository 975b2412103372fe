//! Full-text search over stored bulletins.
//!
//! - Text analysis (`Analyzer`)
//! - On-disk index kept in step with the store (`IndexSynchronizer`)
//! - Lexical network and query expansion (`JsonLexicon`, `QueryExpander`)

pub mod analyzer;
mod expand;
mod index;
mod lexicon;

pub use analyzer::Analyzer;
pub use expand::{DisjunctiveQuery, QueryExpander};
pub use index::{
    INDEX_FILE, IndexDocument, IndexState, IndexSynchronizer, LOCK_FILE, STALE_FILE, SearchHit,
    WriteLock,
};
pub use lexicon::{JsonLexicon, LexicalNetwork};
