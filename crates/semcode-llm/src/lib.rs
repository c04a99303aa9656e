//! Embedding gateway: provider abstraction, Ollama backend, and device strategy.

pub mod any;
pub mod device;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod provider;

pub use any::AnyEmbedder;
pub use device::{Device, DevicePreference};
pub use error::EmbedError;
pub use provider::Embedder;
