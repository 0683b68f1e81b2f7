//! Pipeline orchestrator.
//!
//! Wires together all subsystems into the top-level public API: the
//! `Engine` owns the mubase, the in-memory graph, and the embedding/vector
//! stack, and coordinates a full or incremental index run.
//!
//! ```text
//! directory walk --> parser::parse_file --> ModuleDef
//!                                              |
//!                                              v
//!                                      builder::build_module (Store)
//!                                              |
//!                                              v
//!                              graph.load  <---+---> embeddings --> vector index
//! ```
//!
//! Queries run against the loaded graph via [`crate::muql::MuqlEngine`] and
//! [`crate::context::SmartContextExtractor`]; this module only owns the
//! subsystems and the indexing loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};

use crate::builder;
use crate::config::Config;
use crate::context::{ContextResult, ExtractionConfig, SmartContextExtractor, VectorScorer};
use crate::embedder::EmbeddingProvider;
use crate::error::{MuError, MuResult};
use crate::graph::GraphEngine;
use crate::model::ModuleDef;
use crate::muql::executor::QueryResult;
use crate::muql::formatter::OutputFormat;
use crate::muql::MuqlEngine;
use crate::parser;
use crate::store::Store;
use crate::types::Language;
use crate::vector::VectorIndex;

/// The main Mu kernel engine.
///
/// Owns the mubase, the in-memory graph, and the embedding/vector stack,
/// and is the primary entry point both the daemon and the CLI build on.
pub struct Engine {
    config: Config,
    store: Store,
    graph: GraphEngine,
    embedding_provider: EmbeddingProvider,
    vector_index: VectorIndex,
    excludes: GlobSet,
}

impl Engine {
    /// Open (or create) the engine for the given repository root.
    pub fn new(repo_path: &Path) -> MuResult<Self> {
        let config = Config::load(repo_path)?;
        Self::with_config(config)
    }

    /// Build an engine from an explicit configuration (used by tests and
    /// the daemon, which loads config once up front).
    pub fn with_config(config: Config) -> MuResult<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let store = Store::open_write(&data_dir.join("mubase"))?;

        let graph = GraphEngine::new();
        graph.load(&store)?;

        let embedding_provider = EmbeddingProvider::from_config(&config.embedding)?;
        let vector_index = VectorIndex::open(&data_dir.join("vectors.bin"), config.embedding.dimensions)?;
        let excludes = build_excludes(&config.indexing.exclude_patterns)?;

        tracing::info!(
            repo = %config.repo_path.display(),
            data_dir = %data_dir.display(),
            embedding_available = embedding_provider.is_available(),
            "engine initialized"
        );

        Ok(Self {
            config,
            store,
            graph,
            embedding_provider,
            vector_index,
            excludes,
        })
    }

    /// Walk the repository, parse every supported file, and commit the
    /// resulting module definitions into the mubase. Per-file parse
    /// failures are isolated: one bad file does not abort the run.
    pub async fn run_index(&mut self) -> MuResult<IndexResult> {
        let repo_path = self.config.repo_path.clone();
        let files = self.discover_files(&repo_path)?;
        tracing::info!(files = files.len(), "scan complete, processing files");

        let mut result = IndexResult::default();
        for path in &files {
            match self.process_file(path) {
                Ok(stats) => {
                    result.files_processed += 1;
                    result.nodes_added += stats.nodes_added;
                    result.edges_added += stats.edges_added;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to process file");
                    result.files_failed += 1;
                }
            }
        }

        self.graph.load(&self.store)?;
        result.embeddings_generated = self.reembed_all().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "embedding pass failed");
            0
        });

        tracing::info!(
            files = result.files_processed,
            nodes = result.nodes_added,
            edges = result.edges_added,
            embeddings = result.embeddings_generated,
            failed = result.files_failed,
            "indexing complete"
        );

        Ok(result)
    }

    /// Re-parse a single file and commit it (the watcher's worker path).
    pub fn process_file(&mut self, path: &Path) -> MuResult<builder::BuildStats> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MuError::Parse { path: path.to_path_buf(), message: e.to_string() })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let language = Language::from_extension(ext);
        if matches!(language, Language::Unknown) {
            return Err(MuError::Parse { path: path.to_path_buf(), message: "unsupported language".into() });
        }

        let module = parser::parse_file(path, content.as_bytes(), language)
            .map_err(|e| MuError::Parse { path: path.to_path_buf(), message: e.to_string() })?;

        let relative = path
            .strip_prefix(&self.config.repo_path)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let module = ModuleDef { path: relative, ..module };

        let stats = builder::build_module(&mut self.store, &module)?;
        self.graph.load(&self.store)?;
        tracing::debug!(
            path = %path.display(),
            nodes_added = stats.nodes_added,
            edges_added = stats.edges_added,
            "file processed"
        );
        Ok(stats)
    }

    /// Remove a deleted file's nodes (and the edges that touched them) from
    /// the mubase.
    pub fn delete_file(&mut self, path: &Path) -> MuResult<usize> {
        let relative = path
            .strip_prefix(&self.config.repo_path)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let nodes = self.store.nodes_in_file(&relative)?;
        let mut removed = 0;
        for node in &nodes {
            self.store.delete_edges_touching(&node.id)?;
            self.store.delete_node(&node.id)?;
            self.vector_index.remove(node_vector_id(&node.id))?;
            removed += 1;
        }
        self.graph.load(&self.store)?;
        Ok(removed)
    }

    /// Execute a MUQL query, formatted per `format`.
    pub fn query(&self, muql: &str, format: OutputFormat) -> MuResult<String> {
        MuqlEngine::new(&self.store, &self.graph).query(muql, format)
    }

    /// Execute a MUQL query and return the structured result.
    pub fn execute(&self, muql: &str) -> MuResult<QueryResult> {
        MuqlEngine::new(&self.store, &self.graph).execute(muql)
    }

    /// Extract a token-budgeted MU-text context for `question`, using
    /// embedding similarity as an extra candidate-selection signal when the
    /// provider is available.
    pub async fn context(&self, question: &str, config: &ExtractionConfig) -> MuResult<ContextResult> {
        let scorer = self.vector_scorer(question).await?;
        let extractor = SmartContextExtractor::new(&self.store, &self.graph);
        extractor.extract(question, config, scorer.as_ref().map(|s| s as &dyn VectorScorer))
    }

    async fn vector_scorer(&self, question: &str) -> MuResult<Option<PrecomputedVectorScorer<'_>>> {
        if !self.embedding_provider.is_available() {
            return Ok(None);
        }
        let embeddings = self.embedding_provider.embed_batch(&[question]).await?;
        let Some(Some(vector)) = embeddings.into_iter().next() else {
            return Ok(None);
        };

        let nodes_by_vid: HashMap<u64, String> = self
            .store
            .all_nodes()?
            .into_iter()
            .map(|n| (node_vector_id(&n.id), n.id))
            .collect();

        Ok(Some(PrecomputedVectorScorer {
            vector,
            nodes_by_vid,
            index: &self.vector_index,
        }))
    }

    /// Re-embed every node that carries a docstring and refresh the vector
    /// index. Returns the number of vectors written.
    async fn reembed_all(&mut self) -> MuResult<usize> {
        if !self.embedding_provider.is_available() {
            return Ok(0);
        }

        let nodes = self.store.all_nodes()?;
        let texts: Vec<String> = nodes.iter().map(embeddable_text).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let mut written = 0;
        for chunk_start in (0..text_refs.len()).step_by(64) {
            let chunk_end = (chunk_start + 64).min(text_refs.len());
            let embeddings = self.embedding_provider.embed_batch(&text_refs[chunk_start..chunk_end]).await?;
            for (offset, maybe_vector) in embeddings.into_iter().enumerate() {
                if let Some(vector) = maybe_vector {
                    let node = &nodes[chunk_start + offset];
                    self.vector_index.add(node_vector_id(&node.id), &vector)?;
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    /// Current engine status: graph size, schema version, availability.
    pub fn status(&self) -> MuResult<EngineStatus> {
        let stats = self.graph.stats()?;
        Ok(EngineStatus {
            repo_path: self.config.repo_path.display().to_string(),
            data_dir: self.config.data_dir().display().to_string(),
            node_count: stats.node_count,
            edge_count: stats.edge_count,
            vectors_indexed: self.vector_index.len(),
            embedding_available: self.embedding_provider.is_available(),
        })
    }

    /// The repository root this engine serves.
    #[must_use]
    pub fn repo_path(&self) -> &Path {
        &self.config.repo_path
    }

    /// Read-only access to the mubase (for advanced callers: patterns,
    /// temporal, memory stores).
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Mutable access to the mubase (builder/migration callers).
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// The in-memory graph engine.
    #[must_use]
    pub fn graph(&self) -> &GraphEngine {
        &self.graph
    }

    fn discover_files(&self, root: &Path) -> MuResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        self.walk_dir(root, &mut files)?;
        Ok(files)
    }

    fn walk_dir(&self, dir: &Path, out: &mut Vec<PathBuf>) -> MuResult<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if self.excludes.is_match(path.as_path()) {
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(_) => continue,
            };

            if file_type.is_symlink() && !self.config.indexing.follow_symlinks {
                continue;
            }

            if file_type.is_dir() {
                self.walk_dir(&path, out)?;
                continue;
            }

            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if matches!(Language::from_extension(ext), Language::Unknown) {
                continue;
            }

            if let Ok(meta) = entry.metadata() {
                if meta.len() > self.config.indexing.max_file_size {
                    continue;
                }
            }

            out.push(path);
        }
        Ok(())
    }
}

/// A [`VectorScorer`] backed by one already-computed question embedding and
/// a snapshot of the id-hash -> node-id mapping at query time.
struct PrecomputedVectorScorer<'a> {
    vector: Vec<f32>,
    nodes_by_vid: HashMap<u64, String>,
    index: &'a VectorIndex,
}

impl VectorScorer for PrecomputedVectorScorer<'_> {
    fn similar(&self, _question: &str, limit: usize) -> MuResult<HashMap<String, f64>> {
        let hits = self.index.search(&self.vector, limit);
        Ok(hits
            .into_iter()
            .filter_map(|(vid, score)| self.nodes_by_vid.get(&vid).map(|id| (id.clone(), f64::from(score))))
            .collect())
    }
}

/// Result of a full indexing run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexResult {
    /// Files successfully parsed and committed.
    pub files_processed: usize,
    /// Files that failed to parse (isolated, non-fatal).
    pub files_failed: usize,
    /// Total nodes added across all files.
    pub nodes_added: usize,
    /// Total edges added across all files.
    pub edges_added: usize,
    /// Total embeddings generated.
    pub embeddings_generated: usize,
}

/// Snapshot of engine status for `/status` and the CLI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    /// Repository root.
    pub repo_path: String,
    /// Mubase/data directory.
    pub data_dir: String,
    /// Node count in the graph.
    pub node_count: usize,
    /// Edge count in the graph.
    pub edge_count: usize,
    /// Vectors resident in the vector index.
    pub vectors_indexed: usize,
    /// Whether the embedding provider is ready to produce real vectors.
    pub embedding_available: bool,
}

fn build_excludes(patterns: &[String]) -> MuResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob_pattern = if pattern.contains(['*', '?', '[']) {
            pattern.clone()
        } else {
            format!("**/{pattern}/**")
        };
        let glob = Glob::new(&glob_pattern)
            .map_err(|e| MuError::Config { details: format!("invalid exclude pattern {pattern}: {e}") })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| MuError::Config { details: format!("failed to build exclude set: {e}") })
}

/// Text fed to the embedding provider for a node: qualified name plus
/// docstring when present, falling back to the bare name.
fn embeddable_text(node: &crate::model::Node) -> String {
    let docstring = node
        .properties
        .get("docstring")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let name = node.qualified_name.as_deref().unwrap_or(&node.name);
    crate::embedder::format_chunk_for_embedding(
        node.file_path.as_deref().unwrap_or(""),
        name,
        node.node_type.as_str(),
        &format!("{name}\n{docstring}"),
    )
}

/// Stable u64 id for a node's string id, used as the vector index key.
fn node_vector_id(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest is at least 8 bytes"))
}
