use std::future::Future;
use std::time::Duration;

use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;

use crate::device::{Device, DevicePreference};
use crate::error::EmbedError;
use crate::provider::{Embedder, check_batch};

const DEFAULT_PORT: u16 = 11434;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Ollama,
    model: String,
    device: Device,
    timeout: Duration,
}

impl OllamaEmbedder {
    /// Build an embedder for `model` served at `base_url`.
    ///
    /// The device preference is resolved here, once, and logged.
    #[must_use]
    pub fn new(
        base_url: &str,
        model: String,
        device: DevicePreference,
        timeout: Duration,
    ) -> Self {
        let (host, port) = parse_host_port(base_url);
        let device = device.resolve();
        tracing::info!(
            model = %model,
            host = %host,
            port,
            device = %device,
            "initialized Ollama embeddings"
        );
        Self {
            client: Ollama::new(host, port),
            model,
            device,
            timeout,
        }
    }

    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }

    /// Embedding request pinned to the resolved device.
    ///
    /// CPU sends no layers to the GPU; GPU leaves offloading to the server,
    /// which uses every layer that fits.
    fn request(&self, input: EmbeddingsInput) -> GenerateEmbeddingsRequest {
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), input);
        match self.device {
            Device::Cpu => request.options(ModelOptions::default().num_gpu(0)),
            Device::Gpu => request,
        }
    }

    async fn with_timeout<T, E: std::fmt::Display>(
        &self,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, EmbedError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(classify_error(&self.model, &e.to_string())),
            Err(_) => Err(EmbedError::Timeout(self.timeout.as_secs())),
        }
    }
}

impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let request = self.request(EmbeddingsInput::from(text));

        let response = self
            .with_timeout(self.client.generate_embeddings(request))
            .await?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::EmptyResponse { provider: "ollama" })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = self.request(EmbeddingsInput::Multiple(texts.to_vec()));

        let response = self
            .with_timeout(self.client.generate_embeddings(request))
            .await?;

        check_batch(texts.len(), &response.embeddings)?;
        tracing::debug!(count = texts.len(), model = %self.model, "embedded batch");
        Ok(response.embeddings)
    }

    async fn health_check(&self) -> Result<(), EmbedError> {
        let models = self
            .with_timeout(self.client.list_local_models())
            .await
            .map_err(|e| match e {
                EmbedError::ModelNotLoaded(_) => EmbedError::Unreachable(e.to_string()),
                other => other,
            })?;

        if models.iter().any(|m| model_matches(&m.name, &self.model)) {
            Ok(())
        } else {
            Err(EmbedError::ModelNotLoaded(self.model.clone()))
        }
    }

    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn classify_error(model: &str, message: &str) -> EmbedError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("not found") && lower.contains("model") {
        EmbedError::ModelNotLoaded(model.to_owned())
    } else {
        EmbedError::Unreachable(message.to_owned())
    }
}

/// Ollama reports models with an explicit tag (`nomic-embed-text:latest`).
fn model_matches(listed: &str, configured: &str) -> bool {
    if listed == configured {
        return true;
    }
    if configured.contains(':') {
        return false;
    }
    listed
        .split_once(':')
        .is_some_and(|(name, tag)| name == configured && tag == "latest")
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            let host = url[..colon_pos].to_string();
            return (host, port);
        }
    }
    (url.to_string(), DEFAULT_PORT)
}
