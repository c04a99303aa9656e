//! Test-only deterministic embedder.
//!
//! Vectors are hashed bags of words, so texts sharing vocabulary score higher
//! under cosine similarity. Failure, dimensionality and latency can be changed
//! at runtime through shared handles, which lets tests flip them mid-scenario.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::error::EmbedError;
use crate::provider::Embedder;

#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay_ms: Arc<AtomicU64>,
    embedded: Arc<AtomicUsize>,
    pub model: String,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: Arc::new(AtomicUsize::new(dimensions.max(1))),
            failing: Arc::new(AtomicBool::new(false)),
            delay_ms: Arc::new(AtomicU64::new(0)),
            embedded: Arc::new(AtomicUsize::new(0)),
            model: "mock-embed".into(),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_failing(true);
        mock
    }

    #[must_use]
    pub fn with_delay(self, ms: u64) -> Self {
        self.delay_ms.store(ms, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_dimensions(&self, dimensions: usize) {
        self.dimensions.store(dimensions.max(1), Ordering::SeqCst);
    }

    /// Number of texts embedded so far, across clones.
    #[must_use]
    pub fn embedded_count(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let dims = self.dimensions.load(Ordering::SeqCst);
        let mut v = vec![0.0_f32; dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&hash.as_bytes()[..8]);
            #[expect(clippy::cast_possible_truncation)]
            let idx = (u64::from_le_bytes(bucket) % dims as u64) as usize;
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.pause().await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbedError::Unreachable("mock embedder offline".into()));
        }
        self.embedded.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.pause().await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbedError::Unreachable("mock embedder offline".into()));
        }
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    async fn health_check(&self) -> Result<(), EmbedError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(EmbedError::Unreachable("mock embedder offline".into()))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
