use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use semcode_core::{
    ComponentHealth, KnowledgeGraph, KnowledgeGraphError, RepoRegistry, UpdateOptions,
};
use semcode_index::{ClassifierConfig, FetchError, FetcherConfig, FileClassifier, SourceFetcher};
use semcode_llm::AnyEmbedder;
use semcode_llm::mock::MockEmbedder;
use semcode_memory::{
    BoxFuture, InMemoryVectorStore, IndexedDocument, RepoVectorIndex, ScoredVectorPoint, VectorFilter,
    VectorPoint, VectorStore, VectorStoreError,
};

const COLLECTION: &str = "test_knowledge";

/// In-memory store whose writes can be made to fail on demand.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryVectorStore,
    fail_upserts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyStore {
    fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

impl VectorStore for FlakyStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        self.inner.ensure_collection(collection, vector_size)
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        self.inner.collection_exists(collection)
    }

    fn collection_dimensions(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>> {
        self.inner.collection_dimensions(collection)
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        self.inner.delete_collection(collection)
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Box::pin(async { Err(VectorStoreError::Upsert("injected".into())) });
        }
        self.inner.upsert(collection, points)
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        self.inner.search(collection, vector, limit, filter)
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Box::pin(async { Err(VectorStoreError::Delete("injected".into())) });
        }
        self.inner.delete_by_filter(collection, filter)
    }

    fn count(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        self.inner.count(collection, filter)
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        self.inner.health_check()
    }
}

struct Harness {
    dir: tempfile::TempDir,
    kg: Arc<KnowledgeGraph>,
    embedder: MockEmbedder,
    store: Arc<FlakyStore>,
}

impl Harness {
    fn new() -> Self {
        Self::with_classifier(ClassifierConfig::default())
    }

    fn with_classifier(classifier: ClassifierConfig) -> Self {
        Self::build(classifier, MockEmbedder::new(64))
    }

    fn build(classifier: ClassifierConfig, embedder: MockEmbedder) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FlakyStore::default());
        let kg = KnowledgeGraph::new(
            SourceFetcher::new(FetcherConfig {
                repos_dir: dir.path().join("repos"),
                token: None,
                timeout: Duration::from_secs(60),
                shallow: false,
            }),
            FileClassifier::new(&classifier),
            AnyEmbedder::Mock(embedder.clone()),
            RepoVectorIndex::new(Arc::clone(&store) as Arc<dyn VectorStore>, COLLECTION),
            RepoRegistry::open(dir.path().join("data").join("registry.json")).unwrap(),
            2,
        );
        Self {
            dir,
            kg: Arc::new(kg),
            embedder,
            store,
        }
    }

    /// Create a local source directory with the given files.
    fn source(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let root = self.dir.path().join("sources").join(name);
        for (rel, content) in files {
            write(&root, rel, content);
        }
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    async fn add_local(&self, root: &Path, name: &str) -> semcode_core::IngestReport {
        self.kg
            .add_or_update_repository(root.to_str().unwrap(), Some(name), false)
            .await
            .unwrap()
    }

    async fn points(&self, name: &str) -> u64 {
        self.kg.index().count_for_repo(name).await.unwrap()
    }

    fn registry_path(&self) -> PathBuf {
        self.dir.path().join("data").join("registry.json")
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn three_files() -> [(&'static str, &'static str); 3] {
    [
        (
            "math.py",
            "def fibonacci():\n    \"\"\"fibonacci fibonacci fibonacci fibonacci fibonacci fibonacci fibonacci\"\"\"\n",
        ),
        ("src/server.rs", "fn serve_http(port: u16) { listen(port); }\n"),
        ("README.md", "# Demo\nA small demo repository.\n"),
    ]
}

#[tokio::test]
async fn add_local_indexes_every_eligible_file() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    write(&root, "node_modules/dep/index.js", "module.exports = 1;");
    write(&root, "logo.png", "not really a png");

    let report = h.add_local(&root, "demo").await;
    assert_eq!(report.name, "demo");
    assert_eq!(report.files_processed, 3);
    assert!(!report.updated);
    assert_eq!(report.embedding_dimensions, Some(64));
    assert_eq!(report.language_histogram.get(".py"), Some(&1));
    assert_eq!(report.language_histogram.get(".rs"), Some(&1));
    assert_eq!(h.points("demo").await, 3);

    let record = h.kg.get_repository("demo").unwrap();
    assert_eq!(record.files_processed, 3);
    assert!(!record.is_remote);
    assert_eq!(record.embedding_model, "mock-embed");
    assert_eq!(record.local_path, std::fs::canonicalize(&root).unwrap());
}

#[tokio::test]
async fn readding_is_idempotent() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;
    let again = h.add_local(&root, "demo").await;

    assert!(again.updated);
    assert_eq!(again.files_processed, 3);
    assert_eq!(h.points("demo").await, 3);
    assert_eq!(h.kg.list_repositories().len(), 1);
}

#[tokio::test]
async fn update_picks_up_added_file() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;

    write(&root, "lib/util.py", "def helper(): pass\n");
    let report = h.kg.update_repository("demo").await.unwrap();

    assert!(report.updated);
    assert_eq!(report.files_processed, 4);
    assert_eq!(h.points("demo").await, 4);
    assert_eq!(h.kg.get_repository("demo").unwrap().files_processed, 4);
}

#[tokio::test]
async fn update_drops_deleted_file() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;

    std::fs::remove_file(root.join("math.py")).unwrap();
    h.kg.update_repository("demo").await.unwrap();

    assert_eq!(h.points("demo").await, 2);
    let hits = h.kg.search("fibonacci", 10, Some("demo")).await.unwrap();
    assert!(hits.iter().all(|r| r.path != "math.py"));
}

#[tokio::test]
async fn remove_clears_index_and_registry_but_not_local_source() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;

    assert!(h.kg.remove_repository("demo").await.unwrap());
    assert_eq!(h.points("demo").await, 0);
    assert!(h.kg.get_repository("demo").is_none());
    assert!(h.kg.search("fibonacci", 10, None).await.unwrap().is_empty());
    assert!(root.join("math.py").exists());

    let reopened = RepoRegistry::open(h.registry_path()).unwrap();
    assert!(reopened.get("demo").is_none());

    assert!(!h.kg.remove_repository("demo").await.unwrap());
}

#[tokio::test]
async fn remove_unknown_or_invalid_name_is_false() {
    let h = Harness::new();
    assert!(!h.kg.remove_repository("ghost").await.unwrap());
    assert!(!h.kg.remove_repository("../etc").await.unwrap());
}

#[tokio::test]
async fn update_unknown_is_not_found() {
    let h = Harness::new();
    let err = h.kg.update_repository("ghost").await.unwrap_err();
    assert!(matches!(err, KnowledgeGraphError::NotFound(ref n) if n == "ghost"));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn invalid_name_is_rejected_before_any_work() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    let err = h
        .kg
        .add_or_update_repository(root.to_str().unwrap(), Some("../evil"), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KnowledgeGraphError::Fetch(FetchError::InvalidName(_))
    ));
    assert_eq!(h.embedder.embedded_count(), 0);
}

#[tokio::test]
async fn missing_local_path_is_a_fetch_error() {
    let h = Harness::new();
    let missing = h.dir.path().join("nowhere");
    let err = h
        .kg
        .add_or_update_repository(missing.to_str().unwrap(), Some("x"), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KnowledgeGraphError::Fetch(FetchError::LocalPathMissing(_))
    ));
    assert!(h.kg.get_repository("x").is_none());
}

#[tokio::test]
async fn name_defaults_to_directory_name() {
    let h = Harness::new();
    let root = h.source("my_project", &three_files());
    let report = h
        .kg
        .add_or_update_repository(root.to_str().unwrap(), None, false)
        .await
        .unwrap();
    assert_eq!(report.name, "my_project");
    assert!(h.kg.get_repository("my_project").is_some());
}

#[tokio::test]
async fn search_ranks_matching_file_first() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;

    let hits = h.kg.search("fibonacci", 3, None).await.unwrap();
    assert_eq!(hits[0].path, "math.py");
    assert_eq!(hits[0].repo_name, "demo");
    assert_eq!(hits[0].extension.as_deref(), Some(".py"));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn search_filter_returns_only_that_repository() {
    let h = Harness::new();
    let a = h.source("a", &three_files());
    let b = h.source("b", &[("fib.py", "def fibonacci(): pass\n"), ("x.rs", "fn x() {}\n")]);
    h.add_local(&a, "a").await;
    h.add_local(&b, "b").await;

    let hits = h.kg.search("fibonacci", 10, Some("b")).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|r| r.repo_name == "b"));

    let none = h.kg.search("fibonacci", 10, Some("ghost")).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn search_limit_bounds() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;

    assert!(h.kg.search("demo", 0, None).await.unwrap().is_empty());
    assert_eq!(h.kg.search("demo", 1, None).await.unwrap().len(), 1);
    assert_eq!(h.kg.search("demo", 100, None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn search_on_empty_index_is_empty() {
    let h = Harness::new();
    assert!(h.kg.search("anything", 5, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_grouped_ranks_repositories() {
    let h = Harness::new();
    let a = h.source("a", &[("fib.py", "fibonacci fibonacci fibonacci\n")]);
    let b = h.source("b", &[("web.rs", "serve http requests\n")]);
    h.add_local(&a, "a").await;
    h.add_local(&b, "b").await;

    let groups = h.kg.search_grouped("fibonacci", 5).await.unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].repo_name, "a");
    assert!(groups[0].relevance >= groups[1].relevance);
    assert_eq!(h.kg.search_grouped("fibonacci", 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn oversized_files_are_not_indexed() {
    let h = Harness::with_classifier(ClassifierConfig {
        max_file_size_bytes: 1024,
        ..ClassifierConfig::default()
    });
    let big = "x = 1\n".repeat(400);
    let root = h.source("demo", &[("small.py", "y = 2\n"), ("big.py", &big)]);

    let report = h.add_local(&root, "demo").await;
    assert_eq!(report.files_processed, 1);
    let hits = h.kg.search("x", 10, None).await.unwrap();
    assert!(hits.iter().all(|r| r.path != "big.py"));
}

#[tokio::test]
async fn repository_without_eligible_files_is_recorded_empty() {
    let h = Harness::new();
    let root = h.source("empty", &[("image.png", "binary-ish")]);
    let report = h.add_local(&root, "empty").await;
    assert_eq!(report.files_processed, 0);
    assert_eq!(report.embedding_dimensions, None);
    assert_eq!(h.kg.get_repository("empty").unwrap().files_processed, 0);
}

#[tokio::test]
async fn embedding_failure_keeps_previous_state() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;
    let before = h.kg.get_repository("demo").unwrap();

    write(&root, "new.py", "def added(): pass\n");
    h.embedder.set_failing(true);
    let err = h.kg.update_repository("demo").await.unwrap_err();
    assert!(matches!(err, KnowledgeGraphError::EmbeddingUnavailable(_)));
    assert!(err.is_retryable());

    assert_eq!(h.points("demo").await, 3);
    assert_eq!(h.kg.get_repository("demo").unwrap(), before);

    h.embedder.set_failing(false);
    assert_eq!(h.kg.update_repository("demo").await.unwrap().files_processed, 4);
}

#[tokio::test]
async fn failed_first_add_leaves_nothing_behind() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.embedder.set_failing(true);

    let err = h
        .kg
        .add_or_update_repository(root.to_str().unwrap(), Some("demo"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, KnowledgeGraphError::EmbeddingUnavailable(_)));
    assert!(h.kg.get_repository("demo").is_none());
    assert_eq!(h.points("demo").await, 0);
    assert!(root.join("math.py").exists());
}

#[tokio::test]
async fn failed_first_upsert_is_rolled_back() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.store.fail_upserts(true);

    let err = h
        .kg
        .add_or_update_repository(root.to_str().unwrap(), Some("demo"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, KnowledgeGraphError::IndexUnavailable(_)));
    assert!(h.kg.get_repository("demo").is_none());
    assert_eq!(h.points("demo").await, 0);
}

#[tokio::test]
async fn upsert_failure_after_delete_recovers_on_retry() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;
    let before = h.kg.get_repository("demo").unwrap();

    h.store.fail_upserts(true);
    let err = h.kg.update_repository("demo").await.unwrap_err();
    assert!(matches!(err, KnowledgeGraphError::IndexUnavailable(_)));
    assert!(err.is_retryable());
    // The record still describes the last successful ingest.
    assert_eq!(h.kg.get_repository("demo").unwrap(), before);

    h.store.fail_upserts(false);
    h.kg.update_repository("demo").await.unwrap();
    assert_eq!(h.points("demo").await, 3);
}

#[tokio::test]
async fn failed_delete_during_remove_can_be_retried() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;

    h.store.fail_deletes(true);
    assert!(matches!(
        h.kg.remove_repository("demo").await,
        Err(KnowledgeGraphError::IndexUnavailable(_))
    ));
    assert!(h.kg.get_repository("demo").is_some());

    h.store.fail_deletes(false);
    assert!(h.kg.remove_repository("demo").await.unwrap());
    assert_eq!(h.points("demo").await, 0);
    assert!(h.kg.get_repository("demo").is_none());
}

#[tokio::test]
async fn dimension_change_needs_full_reembed() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;

    h.embedder.set_dimensions(24);
    let err = h.kg.update_repository("demo").await.unwrap_err();
    assert!(matches!(
        err,
        KnowledgeGraphError::DimensionMismatch {
            recorded: 64,
            observed: 24,
            ..
        }
    ));
    assert!(!err.is_retryable());
    assert_eq!(h.points("demo").await, 3);

    let report = h
        .kg
        .update_repository_with("demo", UpdateOptions { full_reembed: true })
        .await
        .unwrap();
    assert_eq!(report.embedding_dimensions, Some(24));
    assert_eq!(h.kg.get_repository("demo").unwrap().embedding_dimensions, Some(24));
    assert_eq!(h.points("demo").await, 3);
    assert_eq!(h.kg.search("fibonacci", 1, None).await.unwrap()[0].path, "math.py");
}

#[tokio::test]
async fn other_repositories_pin_the_dimension() {
    let h = Harness::new();
    let a = h.source("a", &three_files());
    let b = h.source("b", &three_files());
    h.add_local(&a, "a").await;

    h.embedder.set_dimensions(24);
    let err = h
        .kg
        .add_or_update_repository(b.to_str().unwrap(), Some("b"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, KnowledgeGraphError::DimensionMismatch { .. }));
    assert!(h.kg.get_repository("b").is_none());
    assert_eq!(h.points("a").await, 3);
}

#[tokio::test]
async fn emptied_collection_adopts_new_model_width() {
    let h = Harness::new();
    let a = h.source("a", &three_files());
    let b = h.source("b", &three_files());
    h.add_local(&a, "a").await;
    assert!(h.kg.remove_repository("a").await.unwrap());

    h.embedder.set_dimensions(24);
    let report = h.add_local(&b, "b").await;
    assert_eq!(report.embedding_dimensions, Some(24));
    assert_eq!(h.kg.index().dimensions().await.unwrap(), Some(24));
    assert_eq!(h.points("b").await, 3);
    assert_eq!(h.kg.search("fibonacci", 1, None).await.unwrap()[0].repo_name, "b");
}

#[tokio::test]
async fn unregistered_points_pin_the_dimension_until_full_reembed() {
    let h = Harness::new();
    // Points whose record was lost: nothing in the registry describes them.
    h.kg.index()
        .upsert_documents(vec![IndexedDocument {
            repo_name: "lost".into(),
            path: "old.rs".into(),
            content: "fn old() {}".into(),
            extension: ".rs".into(),
            size_bytes: 11,
            modified_time: "2026-01-01T00:00:00Z".into(),
            content_hash: "hash".into(),
            indexed_at: "2026-01-01T00:00:00Z".into(),
            embedding: vec![0.5; 64],
        }])
        .await
        .unwrap();

    h.embedder.set_dimensions(24);
    let b = h.source("b", &three_files());
    for _ in 0..2 {
        let err = h
            .kg
            .add_or_update_repository(b.to_str().unwrap(), Some("b"), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KnowledgeGraphError::DimensionMismatch {
                recorded: 64,
                observed: 24,
                ..
            }
        ));
        assert!(!err.is_retryable());
    }
    assert!(h.kg.get_repository("b").is_none());
    assert_eq!(h.points("lost").await, 1);

    let report = h
        .kg
        .add_or_update_repository_with(
            b.to_str().unwrap(),
            Some("b"),
            false,
            UpdateOptions { full_reembed: true },
        )
        .await
        .unwrap();
    assert_eq!(report.embedding_dimensions, Some(24));
    assert_eq!(h.points("lost").await, 0);
    assert_eq!(h.points("b").await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_update_and_remove_end_consistent() {
    let h = Harness::build(ClassifierConfig::default(), MockEmbedder::new(64).with_delay(20));
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;

    let update = {
        let kg = Arc::clone(&h.kg);
        tokio::spawn(async move { kg.update_repository("demo").await })
    };
    let remove = {
        let kg = Arc::clone(&h.kg);
        tokio::spawn(async move { kg.remove_repository("demo").await })
    };
    let updated = update.await.unwrap();
    assert!(remove.await.unwrap().unwrap());

    // Whichever ran first, the removal leaves nothing behind.
    match updated {
        Ok(report) => assert_eq!(report.files_processed, 3),
        Err(e) => assert!(matches!(e, KnowledgeGraphError::NotFound(_))),
    }
    assert!(h.kg.get_repository("demo").is_none());
    assert_eq!(h.points("demo").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_repositories_ingest_in_parallel() {
    let h = Harness::build(ClassifierConfig::default(), MockEmbedder::new(64).with_delay(10));
    let a = h.source("a", &three_files());
    let b = h.source("b", &three_files());

    let (ra, rb) = tokio::join!(
        h.kg.add_or_update_repository(a.to_str().unwrap(), Some("a"), false),
        h.kg.add_or_update_repository(b.to_str().unwrap(), Some("b"), false),
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(h.points("a").await, 3);
    assert_eq!(h.points("b").await, 3);
    let reopened = RepoRegistry::open(h.registry_path()).unwrap();
    assert_eq!(reopened.list_all().len(), 2);
}

#[tokio::test]
async fn stats_aggregate_registry_and_index() {
    let h = Harness::new();
    let a = h.source("a", &three_files());
    let b = h.source("b", &[("x.py", "x = 1\n")]);
    h.add_local(&a, "a").await;
    h.add_local(&b, "b").await;

    let stats = h.kg.stats().await;
    assert_eq!(stats.total_repositories, 2);
    assert_eq!(stats.total_files, 4);
    assert_eq!(stats.languages.get(".py"), Some(&2));
    assert_eq!(stats.indexed_documents, Some(4));
    assert!(stats.index_healthy);
    assert_eq!(stats.repositories[0].name, "a");
}

#[tokio::test]
async fn export_writes_snapshot() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;

    let path = h.dir.path().join("out").join("graph.json");
    h.kg.export(&path).await.unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(json["exported_at"].is_string());
    assert_eq!(json["stats"]["total_repositories"], 1);
    assert_eq!(json["stats"]["repositories"][0]["name"], "demo");
}

#[tokio::test]
async fn health_reports_each_component() {
    let h = Harness::new();
    let report = h.kg.health_check().await;
    assert!(report.is_healthy());

    h.embedder.set_failing(true);
    let report = h.kg.health_check().await;
    assert!(matches!(report.embedding, ComponentHealth::Down(_)));
    assert_eq!(report.vector_index, ComponentHealth::Up);
    assert!(!report.is_healthy());
}

#[tokio::test]
async fn registry_survives_restart() {
    let h = Harness::new();
    let root = h.source("demo", &three_files());
    h.add_local(&root, "demo").await;
    h.kg.remove_repository("demo").await.unwrap();
    h.add_local(&root, "demo").await;

    let reopened = RepoRegistry::open(h.registry_path()).unwrap();
    let names: Vec<_> = reopened.list_all().into_iter().map(|r| r.name).collect();
    assert_eq!(names, ["demo"]);
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(["-c", "user.name=semcode", "-c", "user.email=semcode@localhost"])
        .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
        .args(args)
        .current_dir(dir)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

#[tokio::test]
async fn remote_clone_is_owned_and_removed() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let h = Harness::new();
    let upstream = h.source("upstream", &three_files());
    git(&upstream, &["init", "--quiet"]);
    git(&upstream, &["add", "."]);
    git(&upstream, &["commit", "--quiet", "-m", "init"]);
    let url = upstream.to_str().unwrap();

    let report = h
        .kg
        .add_or_update_repository(url, Some("cloned"), true)
        .await
        .unwrap();
    assert_eq!(report.files_processed, 3);
    let clone = h.dir.path().join("repos").join("cloned");
    assert!(clone.join(".git").exists());

    write(&upstream, "extra.py", "def extra(): pass\n");
    git(&upstream, &["add", "."]);
    git(&upstream, &["commit", "--quiet", "-m", "more"]);
    assert_eq!(h.kg.update_repository("cloned").await.unwrap().files_processed, 4);

    assert!(h.kg.remove_repository("cloned").await.unwrap());
    assert!(!clone.exists());
    assert!(upstream.join("math.py").exists());
}
