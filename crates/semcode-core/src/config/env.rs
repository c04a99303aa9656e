use std::path::PathBuf;

use semcode_llm::DevicePreference;

use super::{Config, VectorBackend};
use crate::secret::Secret;

/// First variable in `keys` that is set, with the key that supplied it.
fn first_var<'a>(keys: &[&'a str]) -> Option<(&'a str, String)> {
    keys.iter()
        .find_map(|&key| std::env::var(key).ok().map(|v| (key, v)))
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_paths();
        self.apply_env_overrides_embedding();
        self.apply_env_overrides_vector_store();
        self.apply_env_overrides_fetcher();
    }

    fn apply_env_overrides_paths(&mut self) {
        if let Some((_, v)) = first_var(&["SEMCODE_DATA_DIR", "DATA_DIR"]) {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some((_, v)) = first_var(&["SEMCODE_REPOS_DIR", "REPOS_DIR"]) {
            self.storage.repos_dir = PathBuf::from(v);
        }
        if let Some((key, v)) = first_var(&["SEMCODE_MAX_FILE_SIZE_MB", "MAX_FILE_SIZE_MB"]) {
            if let Ok(mb) = v.parse::<u64>() {
                self.classifier.max_file_size_mb = mb;
            } else {
                tracing::warn!("ignoring invalid {key} value: {v}");
            }
        }
    }

    fn apply_env_overrides_embedding(&mut self) {
        if let Some((_, v)) = first_var(&["SEMCODE_EMBEDDING_BASE_URL", "OLLAMA_BASE_URL"]) {
            self.embedding.base_url = v;
        }
        if let Some((_, v)) = first_var(&["SEMCODE_EMBEDDING_MODEL", "OLLAMA_EMBEDDING_MODEL"]) {
            self.embedding.model = v;
        }
        if let Some((key, v)) = first_var(&["SEMCODE_EMBEDDING_DEVICE", "EMBEDDING_DEVICE"]) {
            match v.parse::<DevicePreference>() {
                Ok(device) => self.embedding.device = device,
                Err(_) => tracing::warn!("ignoring invalid {key} value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("SEMCODE_EMBEDDING_BATCH_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                self.embedding.batch_size = n;
            } else {
                tracing::warn!("ignoring invalid SEMCODE_EMBEDDING_BATCH_SIZE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SEMCODE_TIMEOUT_EMBEDDING")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.embedding.timeout_secs = secs;
        }
    }

    fn apply_env_overrides_vector_store(&mut self) {
        if let Some((key, v)) = first_var(&["SEMCODE_VECTOR_BACKEND", "VECTOR_DB_TYPE"]) {
            match v.parse::<VectorBackend>() {
                Ok(backend) => self.vector_store.backend = backend,
                Err(_) => tracing::warn!("ignoring invalid {key} value: {v}"),
            }
        }
        if let Some((_, v)) = first_var(&["SEMCODE_QDRANT_URL", "QDRANT_URL"]) {
            self.vector_store.url = v;
        }
        if let Ok(v) = std::env::var("SEMCODE_QDRANT_API_KEY") {
            self.vector_store.api_key = Some(Secret::new(v));
        }
    }

    fn apply_env_overrides_fetcher(&mut self) {
        if let Some((_, v)) = first_var(&["SEMCODE_GITHUB_TOKEN", "GITHUB_TOKEN"])
            && !v.trim().is_empty()
        {
            self.fetcher.github_token = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("SEMCODE_TIMEOUT_FETCH")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.fetcher.timeout_secs = secs;
        }
    }
}
