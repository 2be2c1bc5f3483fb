//! Text embeddings
//!
//! The engine only needs "text in, fixed-size vector out". [`Embedder`] is
//! that seam; [`FastEmbedder`] is the local ONNX-backed implementation and
//! `crate::testing` provides deterministic stand-ins for tests.

mod similarity;

pub use similarity::cosine_similarity;

use std::sync::Mutex;

use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use crate::error::{LtmError, Result};

/// Dimension of the default model's vectors
pub const EMBEDDING_DIMENSION: usize = 384;

/// Tag stored next to vectors produced by [`FastEmbedder`]
pub const DEFAULT_MODEL_TAG: &str = "BAAI/bge-small-en-v1.5";

/// Source of text embeddings
pub trait Embedder {
    /// Identifies the embedding space; vectors with different tags are never compared
    fn model_tag(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Local BGE-small embedder backed by fastembed
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedder {
    /// Load the model, downloading it on first use.
    ///
    /// Fails with `EmbeddingUnavailable` when the model cannot be loaded.
    pub fn new() -> Result<Self> {
        let options =
            InitOptions::new(FastEmbedModel::BGESmallENV15).with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| LtmError::EmbeddingUnavailable(e.to_string()))?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl Embedder for FastEmbedder {
    fn model_tag(&self) -> &str {
        DEFAULT_MODEL_TAG
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| LtmError::EmbeddingUnavailable("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| LtmError::EmbeddingUnavailable("embedding model lock poisoned".to_string()))?;
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| LtmError::EmbeddingUnavailable(e.to_string()))
    }
}

#[cfg(all(test, feature = "ml-tests"))]
mod tests {
    use super::*;

    #[test]
    fn test_embed_returns_correct_dimension() {
        let model = FastEmbedder::new().expect("Failed to load model");
        let embedding = model.embed("Hello, world!").expect("Failed to embed");
        assert_eq!(embedding.len(), EMBEDDING_DIMENSION);
    }

    #[test]
    fn test_similar_texts_have_high_similarity() {
        let model = FastEmbedder::new().expect("Failed to load model");
        let a = model
            .embed("The team chose SQLite for simplicity")
            .expect("embed");
        let b = model
            .embed("We picked SQLite because it is simple")
            .expect("embed");
        let c = model
            .embed("Quantum computing revolutionizes cryptography")
            .expect("embed");

        assert!(
            cosine_similarity(&a, &b) > cosine_similarity(&a, &c),
            "Related sentences should be closer than unrelated ones"
        );
    }
}
