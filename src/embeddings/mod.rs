mod fastembed_provider;
pub mod mock;
mod provider;

pub use fastembed_provider::{vector_field_for_model, FastEmbedProvider};
pub use mock::MockEmbedder;
pub use provider::EmbeddingProvider;
