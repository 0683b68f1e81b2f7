//! Flat linear-scan cosine-similarity vector index, persisted as a single
//! `bincode`-encoded file.
//!
//! No approximate search structure: every query is a full scan over the
//! resident vectors. For the node/chunk counts a single mubase realistically
//! holds this is fast enough, and it needs no native dependency or index
//! build step — the natural interim before an HNSW-backed index earns its
//! complexity.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MuResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    id: u64,
    vector: Vec<f32>,
}

/// Flat cosine-similarity vector index over embedding vectors.
pub struct VectorIndex {
    path: PathBuf,
    dimensions: usize,
    entries: Vec<Entry>,
}

impl VectorIndex {
    /// Open (or create) a vector index at the given path.
    pub fn open(index_path: &Path, dimensions: usize) -> MuResult<Self> {
        let entries = if index_path.exists() {
            let bytes = std::fs::read(index_path)?;
            bincode::deserialize(&bytes).unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Self {
            path: index_path.to_path_buf(),
            dimensions,
            entries,
        })
    }

    /// Add a vector to the index, replacing any existing vector with the
    /// same id, then persist.
    pub fn add(&mut self, id: u64, vector: &[f32]) -> MuResult<()> {
        self.entries.retain(|e| e.id != id);
        self.entries.push(Entry {
            id,
            vector: vector.to_vec(),
        });
        self.flush()
    }

    /// Search for the K nearest neighbors to the query vector by cosine
    /// similarity, highest similarity first.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        let mut scored: Vec<(u64, f32)> = self
            .entries
            .iter()
            .map(|e| (e.id, cosine_similarity(query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }

    /// Remove a vector by id, then persist.
    pub fn remove(&mut self, id: u64) -> MuResult<()> {
        self.entries.retain(|e| e.id != id);
        self.flush()
    }

    /// Returns the number of vectors in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the configured dimensions.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn flush(&self) -> MuResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serialize(&self.entries)
            .map_err(|e| crate::error::MuError::Serialization(e.to_string()))?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` for a
/// zero-length vector on either side rather than dividing by zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..len {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// L2-normalize a vector in place.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
