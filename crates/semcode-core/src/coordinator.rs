//! Ingestion, removal and search across the working-tree cache, the vector
//! index and the registry.
//!
//! Every mutation of a repository name runs under that name's lock, so an
//! update and a delete of the same repository never interleave. Operations on
//! different names proceed in parallel. Searches take no lock.
//!
//! An add or update walks a fixed sequence of states:
//!
//! ```text
//! FETCHING -> CLASSIFYING -> EMBEDDING -> INDEXING -> RECORDING -> DONE
//! ```
//!
//! Any failure moves to `ABORTED`. Everything that can fail for reasons
//! outside the index (cloning, reading, embedding) happens before the first
//! index write, so an abort before `INDEXING` leaves the previous state of the
//! repository untouched.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use semcode_index::{
    FetchError, FileCandidate, FileClassifier, SourceFetcher, WorkingTree, derive_name,
    language_histogram, validate_name,
};
use semcode_llm::provider::check_batch;
use semcode_llm::{AnyEmbedder, Embedder};
use semcode_memory::{IndexedDocument, RepoHit, RepoVectorIndex};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{KnowledgeGraphError, Result};
use crate::registry::{RepoRegistry, RepositoryRecord, write_json_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestState {
    Fetching,
    Classifying,
    Embedding,
    Indexing,
    Recording,
    Done,
    Aborted,
}

impl IngestState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Classifying => "classifying",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
            Self::Recording => "recording",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and logs the state of one ingest.
struct Progress<'a> {
    repo: &'a str,
    state: IngestState,
}

impl<'a> Progress<'a> {
    fn start(repo: &'a str) -> Self {
        tracing::info!(repo, state = %IngestState::Fetching, "ingest started");
        Self {
            repo,
            state: IngestState::Fetching,
        }
    }

    fn advance(&mut self, next: IngestState) {
        tracing::debug!(repo = self.repo, from = %self.state, to = %next, "ingest state");
        self.state = next;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Accept a change of embedding dimensions by rebuilding the collection.
    pub full_reembed: bool,
}

/// Outcome of a successful add or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub name: String,
    pub files_processed: usize,
    pub language_histogram: BTreeMap<String, usize>,
    pub total_bytes: u64,
    pub embedding_dimensions: Option<usize>,
    /// True when a previous record for this name was replaced.
    pub updated: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub path: String,
    pub content: String,
    pub repo_name: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl From<RepoHit> for SearchResult {
    fn from(hit: RepoHit) -> Self {
        Self {
            path: hit.path,
            content: hit.content,
            repo_name: hit.repo_name,
            score: hit.score,
            extension: hit.extension,
            size_bytes: hit.size_bytes,
            modified: hit.modified_time,
        }
    }
}

/// Search results of one repository with their mean score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoGroup {
    pub repo_name: String,
    pub relevance: f32,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_repositories: usize,
    pub total_files: usize,
    pub total_bytes: u64,
    pub languages: BTreeMap<String, usize>,
    /// Points in the vector collection; `None` when the index could not be counted.
    pub indexed_documents: Option<u64>,
    pub index_healthy: bool,
    pub repositories: Vec<RepositoryRecord>,
}

#[derive(Debug, Serialize)]
struct ExportDocument<'a> {
    exported_at: DateTime<Utc>,
    stats: &'a Stats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ComponentHealth {
    Up,
    Down(String),
}

impl ComponentHealth {
    fn from_result<E: std::fmt::Display>(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Up,
            Err(e) => Self::Down(e.to_string()),
        }
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub embedding: ComponentHealth,
    pub vector_index: ComponentHealth,
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.embedding.is_up() && self.vector_index.is_up()
    }
}

/// What the index has to do before new vectors can be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexPlan {
    /// Remove this repository's old points, if any.
    Replace,
    /// Drop and recreate the collection at the new width.
    Rebuild(usize),
}

/// Exclusive hold on one repository name. The table entry is dropped once no
/// other task holds or waits for it.
struct NameLock<'a> {
    table: &'a std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameLock<'_> {
    fn drop(&mut self) {
        // The guard owns a clone of the Arc; release it before counting.
        drop(self.guard.take());
        let mut locks = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.name);
        }
    }
}

pub struct KnowledgeGraph {
    fetcher: SourceFetcher,
    classifier: Arc<FileClassifier>,
    embedder: AnyEmbedder,
    index: RepoVectorIndex,
    registry: RepoRegistry,
    batch_size: usize,
    locks: std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl std::fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraph")
            .field("fetcher", &self.fetcher)
            .field("embedder", &self.embedder.name())
            .field("index", &self.index)
            .field("registry", &self.registry)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl KnowledgeGraph {
    #[must_use]
    pub fn new(
        fetcher: SourceFetcher,
        classifier: FileClassifier,
        embedder: AnyEmbedder,
        index: RepoVectorIndex,
        registry: RepoRegistry,
        batch_size: usize,
    ) -> Self {
        Self {
            fetcher,
            classifier: Arc::new(classifier),
            embedder,
            index,
            registry,
            batch_size: batch_size.max(1),
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &RepoRegistry {
        &self.registry
    }

    #[must_use]
    pub fn index(&self) -> &RepoVectorIndex {
        &self.index
    }

    /// Ingest `source` under `name`, or under a name derived from the source.
    ///
    /// Adding a name that is already registered re-ingests it, replacing its
    /// documents.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeGraphError::Fetch`] for invalid names or unreachable
    /// sources, and the error of whichever stage aborted otherwise.
    pub async fn add_or_update_repository(
        &self,
        source: &str,
        name: Option<&str>,
        is_remote: bool,
    ) -> Result<IngestReport> {
        self.add_or_update_repository_with(source, name, is_remote, UpdateOptions::default())
            .await
    }

    /// [`Self::add_or_update_repository`] with explicit options.
    ///
    /// `full_reembed` lets the add rebuild a collection whose width no longer
    /// matches the model, dropping points that no registered repository owns.
    ///
    /// # Errors
    ///
    /// See [`Self::add_or_update_repository`].
    pub async fn add_or_update_repository_with(
        &self,
        source: &str,
        name: Option<&str>,
        is_remote: bool,
        options: UpdateOptions,
    ) -> Result<IngestReport> {
        let name = resolve_name(source, name, is_remote).await?;
        let _guard = self.lock_name(&name).await;
        let previous = self.registry.get(&name);
        self.ingest(&name, source, is_remote, previous, options)
            .await
    }

    /// Re-ingest a registered repository from its recorded source.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeGraphError::NotFound`] if `name` is not registered.
    pub async fn update_repository(&self, name: &str) -> Result<IngestReport> {
        self.update_repository_with(name, UpdateOptions::default())
            .await
    }

    /// # Errors
    ///
    /// See [`Self::update_repository`].
    pub async fn update_repository_with(
        &self,
        name: &str,
        options: UpdateOptions,
    ) -> Result<IngestReport> {
        let _guard = self.lock_name(name).await;
        let previous = self
            .registry
            .get(name)
            .ok_or_else(|| KnowledgeGraphError::NotFound(name.to_owned()))?;
        let source = previous.source.clone();
        let is_remote = previous.is_remote;
        self.ingest(name, &source, is_remote, Some(previous), options)
            .await
    }

    /// Remove every trace of `name`: its points, its owned working tree and
    /// its record. Local source directories are never touched.
    ///
    /// Returns whether anything existed. Unknown names are `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index or registry cannot be updated. Re-running
    /// the removal after a failure completes it.
    pub async fn remove_repository(&self, name: &str) -> Result<bool> {
        if validate_name(name).is_err() {
            return Ok(false);
        }
        let _guard = self.lock_name(name).await;
        let record = self.registry.get(name);

        let points = self.index.count_for_repo(name).await?;
        self.index.delete_by_repo(name).await?;

        let removed_tree = if record.as_ref().is_some_and(|r| !r.is_remote) {
            false
        } else {
            self.fetcher.remove(&self.fetcher.owned_tree(name)?).await?
        };
        let removed_record = self.registry.delete(name).await?;

        let existed = points > 0 || removed_tree || removed_record;
        if existed {
            tracing::info!(
                repo = name,
                points,
                removed_tree,
                removed_record,
                "repository removed"
            );
        } else {
            tracing::debug!(repo = name, "nothing to remove");
        }
        Ok(existed)
    }

    #[must_use]
    pub fn list_repositories(&self) -> Vec<RepositoryRecord> {
        self.registry.list_all()
    }

    #[must_use]
    pub fn get_repository(&self, name: &str) -> Option<RepositoryRecord> {
        self.registry.get(name)
    }

    /// The `limit` documents nearest to `query`, best first, optionally
    /// restricted to one repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded or the index queried.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        repo_name: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;
        let hits = self.index.query(vector, limit, repo_name).await?;
        tracing::debug!(query_len = query.len(), limit, hits = hits.len(), "search");
        Ok(hits.into_iter().map(SearchResult::from).collect())
    }

    /// Search across all repositories and group hits per repository.
    ///
    /// Twice `limit` documents are retrieved; groups are ranked by the mean
    /// score of their documents and the best `limit` groups are returned.
    ///
    /// # Errors
    ///
    /// See [`Self::search`].
    pub async fn search_grouped(&self, query: &str, limit: usize) -> Result<Vec<RepoGroup>> {
        let results = self.search(query, limit.saturating_mul(2), None).await?;
        Ok(group_by_repo(results, limit))
    }

    /// Aggregate counters over the registry, plus the index point count.
    ///
    /// An unreachable index is reported, not returned as an error.
    pub async fn stats(&self) -> Stats {
        let repositories = self.registry.list_all();
        let mut languages = BTreeMap::new();
        for record in &repositories {
            for (ext, count) in &record.language_histogram {
                *languages.entry(ext.clone()).or_insert(0) += count;
            }
        }
        let indexed_documents = match self.index.count_all().await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!("could not count indexed documents: {e}");
                None
            }
        };
        Stats {
            total_repositories: repositories.len(),
            total_files: repositories.iter().map(|r| r.files_processed).sum(),
            total_bytes: repositories.iter().map(|r| r.total_bytes).sum(),
            languages,
            index_healthy: indexed_documents.is_some(),
            indexed_documents,
            repositories,
        }
    }

    /// Write a JSON snapshot of [`Self::stats`] to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn export(&self, path: &Path) -> Result<Stats> {
        let stats = self.stats().await;
        let document = serde_json::to_value(ExportDocument {
            exported_at: Utc::now(),
            stats: &stats,
        })
        .map_err(std::io::Error::from)?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_json_atomic(&target, &document))
            .await
            .map_err(std::io::Error::other)??;
        tracing::info!(path = %path.display(), repos = stats.total_repositories, "exported");
        Ok(stats)
    }

    /// Probe the embedding provider and the vector index concurrently.
    pub async fn health_check(&self) -> HealthReport {
        let (embedding, vector_index) =
            tokio::join!(self.embedder.health_check(), self.index.health());
        HealthReport {
            embedding: ComponentHealth::from_result(embedding),
            vector_index: ComponentHealth::from_result(vector_index),
        }
    }

    async fn lock_name(&self, name: &str) -> NameLock<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(name.to_owned()).or_default())
        };
        NameLock {
            table: &self.locks,
            name: name.to_owned(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run the ingest state machine. The caller holds the name lock.
    async fn ingest(
        &self,
        name: &str,
        source: &str,
        is_remote: bool,
        previous: Option<RepositoryRecord>,
        options: UpdateOptions,
    ) -> Result<IngestReport> {
        let started = Instant::now();
        let mut progress = Progress::start(name);

        let tree = match self.fetcher.materialize(source, name, is_remote).await {
            Ok(tree) => tree,
            Err(e) => return Err(abort(&progress, e.into())),
        };

        let outcome = self
            .process(&mut progress, &tree, source, is_remote, previous.as_ref(), options)
            .await;
        match outcome {
            Ok(mut report) => {
                if let Some(prev) = previous.as_ref().filter(|p| p.is_remote && !is_remote) {
                    self.discard_stale_tree(name, prev, &tree).await;
                }
                progress.advance(IngestState::Done);
                report.duration_ms =
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(
                    repo = name,
                    files = report.files_processed,
                    updated = report.updated,
                    duration_ms = report.duration_ms,
                    "ingest finished"
                );
                Ok(report)
            }
            Err(e) => {
                let reached = progress.state;
                let err = abort(&progress, e);
                if previous.is_none() {
                    self.roll_back_new(name, &tree, reached).await;
                }
                Err(err)
            }
        }
    }

    async fn process(
        &self,
        progress: &mut Progress<'_>,
        tree: &WorkingTree,
        source: &str,
        is_remote: bool,
        previous: Option<&RepositoryRecord>,
        options: UpdateOptions,
    ) -> Result<IngestReport> {
        let name = progress.repo;

        progress.advance(IngestState::Classifying);
        let candidates = self.classify(&tree.root).await?;
        let histogram = language_histogram(&candidates);
        let total_bytes: u64 = candidates.iter().map(|c| c.size_bytes).sum();
        tracing::info!(repo = name, files = candidates.len(), total_bytes, "files selected");

        progress.advance(IngestState::Embedding);
        let vectors = self.embed_candidates(name, &candidates).await?;
        let dimensions = vectors.first().map(Vec::len);
        let plan = match dimensions {
            Some(observed) => self.plan_index(name, previous, observed, options).await?,
            None => IndexPlan::Replace,
        };

        progress.advance(IngestState::Indexing);
        match plan {
            IndexPlan::Rebuild(width) => self.index.reset(width).await?,
            IndexPlan::Replace => {
                if previous.is_some() || self.index.count_for_repo(name).await? > 0 {
                    self.index.delete_by_repo(name).await?;
                }
            }
        }
        let indexed_at = Utc::now().to_rfc3339();
        let files_processed = candidates.len();
        let documents = candidates
            .into_iter()
            .zip(vectors)
            .map(|(c, embedding)| IndexedDocument {
                repo_name: name.to_owned(),
                path: c.rel_path,
                content: c.content,
                extension: c.extension,
                size_bytes: c.size_bytes,
                modified_time: c.modified,
                content_hash: c.content_hash,
                indexed_at: indexed_at.clone(),
                embedding,
            })
            .collect();
        self.index.upsert_documents(documents).await?;

        progress.advance(IngestState::Recording);
        self.registry
            .put(RepositoryRecord {
                name: name.to_owned(),
                source: source.to_owned(),
                is_remote,
                local_path: tree.root.clone(),
                files_processed,
                language_histogram: histogram.clone(),
                total_bytes,
                embedding_model: self.embedder.model().to_owned(),
                embedding_dimensions: dimensions,
                processed_at: Utc::now(),
            })
            .await?;

        Ok(IngestReport {
            name: name.to_owned(),
            files_processed,
            language_histogram: histogram,
            total_bytes,
            embedding_dimensions: dimensions,
            updated: previous.is_some(),
            duration_ms: 0,
        })
    }

    async fn classify(&self, root: &Path) -> Result<Vec<FileCandidate>> {
        let classifier = Arc::clone(&self.classifier);
        let root = root.to_path_buf();
        let candidates =
            tokio::task::spawn_blocking(move || classifier.select(&root).collect::<Vec<_>>())
                .await
                .map_err(std::io::Error::other)?;
        Ok(candidates)
    }

    /// Embed every candidate, in batches, before anything is written.
    async fn embed_candidates(
        &self,
        name: &str,
        candidates: &[FileCandidate],
    ) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(embedding_text).collect();
            let embedded = self.embedder.embed_batch(&texts).await?;
            check_batch(texts.len(), &embedded)?;
            vectors.extend(embedded);
            tracing::debug!(
                repo = name,
                done = vectors.len(),
                total = candidates.len(),
                "embedded batch"
            );
        }
        // Batches are checked one at a time; widths must also agree across them.
        check_batch(candidates.len(), &vectors)?;
        Ok(vectors)
    }

    /// Decide how to make room for `observed`-wide vectors of `name`.
    async fn plan_index(
        &self,
        name: &str,
        previous: Option<&RepositoryRecord>,
        observed: usize,
        options: UpdateOptions,
    ) -> Result<IndexPlan> {
        // The collection is shared, so every other repository pins its width.
        let pinned = self
            .registry
            .list_all()
            .into_iter()
            .filter(|r| r.name != name)
            .find_map(|r| r.embedding_dimensions);
        if let Some(recorded) = pinned
            && recorded != observed
        {
            return Err(KnowledgeGraphError::DimensionMismatch {
                repo: name.to_owned(),
                recorded,
                observed,
            });
        }

        if let Some(recorded) = previous.and_then(|p| p.embedding_dimensions)
            && recorded != observed
        {
            if !options.full_reembed {
                return Err(KnowledgeGraphError::DimensionMismatch {
                    repo: name.to_owned(),
                    recorded,
                    observed,
                });
            }
            tracing::warn!(
                repo = name,
                recorded,
                observed,
                "embedding width changed, rebuilding collection"
            );
            return Ok(IndexPlan::Rebuild(observed));
        }

        // The collection outlives the records that described it: every
        // repository may have been removed, or the registry lost.
        let Some(width) = self.index.dimensions().await? else {
            return Ok(IndexPlan::Replace);
        };
        if width == observed {
            return Ok(IndexPlan::Replace);
        }
        let unowned = self
            .index
            .count_all()
            .await?
            .saturating_sub(self.index.count_for_repo(name).await?);
        if unowned > 0 && !options.full_reembed {
            return Err(KnowledgeGraphError::DimensionMismatch {
                repo: name.to_owned(),
                recorded: width,
                observed,
            });
        }
        tracing::warn!(
            repo = name,
            collection_width = width,
            observed,
            unowned,
            "collection width differs from the model, rebuilding collection"
        );
        Ok(IndexPlan::Rebuild(observed))
    }

    /// Undo a failed first-time ingest so the name is absent everywhere.
    async fn roll_back_new(&self, name: &str, tree: &WorkingTree, reached: IngestState) {
        if reached >= IngestState::Indexing
            && let Err(e) = self.index.delete_by_repo(name).await
        {
            tracing::warn!(repo = name, "rollback could not delete points: {e}");
        }
        match self.fetcher.remove(tree).await {
            Ok(true) => tracing::debug!(repo = name, "rolled back working tree"),
            Ok(false) => {}
            Err(e) => tracing::warn!(repo = name, "rollback could not remove working tree: {e}"),
        }
    }

    /// A repository that moved from a remote to a local source no longer
    /// needs its clone.
    async fn discard_stale_tree(
        &self,
        name: &str,
        previous: &RepositoryRecord,
        current: &WorkingTree,
    ) {
        let Ok(stale) = self.fetcher.owned_tree(name) else {
            return;
        };
        let stale_root = tokio::fs::canonicalize(&stale.root)
            .await
            .unwrap_or_else(|_| stale.root.clone());
        if stale_root == current.root {
            return;
        }
        if let Err(e) = self.fetcher.remove(&stale).await {
            tracing::warn!(
                repo = name,
                previous_source = %previous.source,
                "could not remove previous clone: {e}"
            );
        }
    }
}

fn abort(progress: &Progress<'_>, error: KnowledgeGraphError) -> KnowledgeGraphError {
    tracing::warn!(
        repo = progress.repo,
        state = %progress.state,
        next = %IngestState::Aborted,
        retryable = error.is_retryable(),
        "ingest aborted: {error}"
    );
    error
}

fn embedding_text(candidate: &FileCandidate) -> String {
    format!(
        "File: {}\n\nContent:\n{}",
        candidate.rel_path, candidate.content
    )
}

async fn resolve_name(source: &str, name: Option<&str>, is_remote: bool) -> Result<String> {
    if let Some(name) = name {
        validate_name(name)?;
        return Ok(name.to_owned());
    }
    let derived = if is_remote {
        derive_name(source, true)
    } else {
        let canonical: PathBuf = tokio::fs::canonicalize(source)
            .await
            .map_err(|_| FetchError::LocalPathMissing(PathBuf::from(source)))?;
        derive_name(&canonical.to_string_lossy(), false)
    };
    let name = derived.ok_or_else(|| FetchError::InvalidName(source.to_owned()))?;
    validate_name(&name)?;
    Ok(name)
}

fn group_by_repo(results: Vec<SearchResult>, limit: usize) -> Vec<RepoGroup> {
    let mut grouped: BTreeMap<String, Vec<SearchResult>> = BTreeMap::new();
    for result in results {
        grouped
            .entry(result.repo_name.clone())
            .or_default()
            .push(result);
    }
    let mut groups: Vec<RepoGroup> = grouped
        .into_iter()
        .map(|(repo_name, mut results)| {
            results.sort_by(|a, b| b.score.total_cmp(&a.score));
            #[allow(clippy::cast_precision_loss)]
            let relevance = results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32;
            RepoGroup {
                repo_name,
                relevance,
                results,
            }
        })
        .collect();
    groups.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    groups.truncate(limit);
    groups
}
