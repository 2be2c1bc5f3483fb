//! Test utilities for ltm - deterministic embedders
//!
//! These stand in for the real model so tests run fast and offline:
//! - [`MockEmbedder`]: hashed bag-of-words vectors, so texts sharing words
//!   score as similar
//! - [`FixedEmbedder`]: caller-chosen vectors per text
//! - [`UnavailableEmbedder`]: always fails, to exercise keyword fallback
//! - [`RejectingEmbedder`]: fails only for texts containing a given word

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::embedding::{EMBEDDING_DIMENSION, Embedder};
use crate::error::{LtmError, Result};

/// Mock embedding model for fast unit tests that don't need real ML.
/// Produces deterministic 384-dimensional vectors from the words of the text.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedder;

impl MockEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Bucket each lowercase word by hash and count occurrences
    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; EMBEDDING_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % EMBEDDING_DIMENSION as u64) as usize;
            vector[bucket] += 1.0;
        }
        vector
    }
}

impl Embedder for MockEmbedder {
    fn model_tag(&self) -> &str {
        "mock-bow-384"
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector_for(text))
    }
}

/// Embedder returning preset vectors; unknown texts get the mock vector.
#[derive(Debug, Clone, Default)]
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    tag: String,
}

impl FixedEmbedder {
    pub fn new() -> Self {
        Self {
            vectors: HashMap::new(),
            tag: "fixed".to_string(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }
}

impl Embedder for FixedEmbedder {
    fn model_tag(&self) -> &str {
        &self.tag
    }

    fn dimension(&self) -> usize {
        self.vectors
            .values()
            .next()
            .map(Vec::len)
            .unwrap_or(EMBEDDING_DIMENSION)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| MockEmbedder::vector_for(text)))
    }
}

/// Embedder whose backend is never available
#[derive(Debug, Clone, Default)]
pub struct UnavailableEmbedder;

impl Embedder for UnavailableEmbedder {
    fn model_tag(&self) -> &str {
        "unavailable"
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(LtmError::EmbeddingUnavailable(
            "no embedding backend configured".to_string(),
        ))
    }
}

/// Mock embedder that rejects any text containing `word`, batch or single
#[derive(Debug, Clone)]
pub struct RejectingEmbedder {
    word: String,
}

impl RejectingEmbedder {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into().to_lowercase(),
        }
    }

    fn rejects(&self, text: &str) -> bool {
        text.split(|c: char| !c.is_alphanumeric())
            .any(|w| w.to_lowercase() == self.word)
    }
}

impl Embedder for RejectingEmbedder {
    fn model_tag(&self) -> &str {
        "mock-bow-384"
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.rejects(text) {
            return Err(LtmError::InvalidInput(format!("cannot embed '{text}'")));
        }
        Ok(MockEmbedder::vector_for(text))
    }
}

/// Two unit vectors in `dim` dimensions whose cosine similarity is `similarity`
pub fn vectors_with_similarity(similarity: f32, dim: usize) -> (Vec<f32>, Vec<f32>) {
    let mut a = vec![0.0; dim.max(2)];
    let mut b = vec![0.0; dim.max(2)];
    a[0] = 1.0;
    b[0] = similarity;
    b[1] = (1.0 - similarity * similarity).max(0.0).sqrt();
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_mock_is_deterministic() {
        let model = MockEmbedder::new();
        let a = model.embed("test input").expect("embed");
        let b = model.embed("test input").expect("embed");
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIMENSION);
    }

    #[test]
    fn test_mock_shared_words_are_similar() {
        let a = MockEmbedder::vector_for("SQLite WAL mode for the memory store");
        let b = MockEmbedder::vector_for("memory store uses SQLite WAL mode");
        let c = MockEmbedder::vector_for("onboarding checklist");
        assert!(cosine_similarity(&a, &b) > 0.5);
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn test_vectors_with_similarity() {
        let (a, b) = vectors_with_similarity(0.82, 8);
        assert!((cosine_similarity(&a, &b) - 0.82).abs() < 1e-5);
    }

    #[test]
    fn test_rejecting_embedder_fails_whole_batch() {
        let model = RejectingEmbedder::new("poison");
        assert!(model.embed("healthy row").is_ok());
        assert!(model.embed("Poison row").is_err());
        let texts = vec!["healthy row".to_string(), "poison row".to_string()];
        assert!(model.embed_batch(&texts).is_err());
    }

    #[test]
    fn test_unavailable_embedder_errors() {
        assert!(matches!(
            UnavailableEmbedder.embed("x"),
            Err(LtmError::EmbeddingUnavailable(_))
        ));
    }
}
