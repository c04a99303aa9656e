use std::future::Future;

use crate::error::EmbedError;

pub trait Embedder: Send + Sync {
    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unreachable or the model is unavailable.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, EmbedError>> + Send;

    /// Embed an ordered batch. The output has the same length and order as `texts`.
    ///
    /// Either every text is embedded or the whole call fails.
    ///
    /// # Errors
    ///
    /// Returns an error if any item in the batch fails.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, EmbedError>> + Send;

    /// Check that the backing service is reachable and the model is loaded.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the provider cannot serve requests.
    fn health_check(&self) -> impl Future<Output = Result<(), EmbedError>> + Send;

    fn name(&self) -> &'static str;

    /// Configured embedding model name.
    fn model(&self) -> &str;
}

/// Reject batches whose vectors do not line up with their inputs.
///
/// # Errors
///
/// Returns [`EmbedError::CountMismatch`] or [`EmbedError::InconsistentDimensions`].
pub fn check_batch(expected: usize, vectors: &[Vec<f32>]) -> Result<(), EmbedError> {
    if vectors.len() != expected {
        return Err(EmbedError::CountMismatch {
            expected,
            actual: vectors.len(),
        });
    }
    if let Some(first) = vectors.first() {
        let first = first.len();
        if let Some(other) = vectors.iter().map(Vec::len).find(|&n| n != first) {
            return Err(EmbedError::InconsistentDimensions { first, other });
        }
    }
    Ok(())
}
