//! Working-tree acquisition and eligible-file selection.
//!
//! The fetcher materializes a repository on disk (git clone/pull or a local
//! directory as-is); the classifier walks that tree and yields the files worth
//! embedding.

pub mod classifier;
pub mod error;
pub mod fetcher;

pub use classifier::{ClassifierConfig, FileCandidate, FileClassifier, language_histogram};
pub use error::FetchError;
pub use fetcher::{FetcherConfig, SourceFetcher, WorkingTree, derive_name, validate_name};
