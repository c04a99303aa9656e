//! Knowledge graph consistency layer.
//!
//! Keeps the working-tree cache, the metadata registry and the vector index in
//! agreement across add, update and delete operations.

pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod secret;

pub use bootstrap::build_knowledge_graph;
pub use config::Config;
pub use coordinator::{
    ComponentHealth, HealthReport, IngestReport, IngestState, KnowledgeGraph, RepoGroup,
    SearchResult, Stats, UpdateOptions,
};
pub use error::KnowledgeGraphError;
pub use registry::{RepoRegistry, RepositoryRecord};
pub use secret::Secret;
