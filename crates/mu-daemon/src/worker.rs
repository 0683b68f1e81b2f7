//! Debounced-event worker.
//!
//! Consumes [`PipelineEvent`]s produced by the file watcher, re-parses and
//! commits changed files via [`Engine::process_file`]/[`Engine::delete_file`],
//! and emits per-node `added|modified|removed` events to WS subscribers,
//! per spec.md §4.7's worker responsibilities.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use mu_core::types::PipelineEvent;
use mu_core::Engine;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::events::{GraphEvent, GraphEventKind};

/// Run until `rx` closes (the watcher task exiting drops its sender).
pub async fn run_worker(
    engine: Arc<Mutex<Engine>>,
    mut rx: mpsc::Receiver<PipelineEvent>,
    events: broadcast::Sender<GraphEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::FileChanged { path } => handle_changed(&engine, &events, &path).await,
            PipelineEvent::FileDeleted { path } => handle_deleted(&engine, &events, &path).await,
            PipelineEvent::FullScan | PipelineEvent::Shutdown => {}
        }
    }
}

async fn relative_path(engine: &Mutex<Engine>, path: &Path) -> String {
    let guard = engine.lock().await;
    path.strip_prefix(guard.repo_path()).unwrap_or(path).to_string_lossy().replace('\\', "/")
}

async fn handle_changed(engine: &Arc<Mutex<Engine>>, events: &broadcast::Sender<GraphEvent>, path: &Path) {
    let relative = relative_path(engine, path).await;

    let mut guard = engine.lock().await;
    let before: HashSet<String> = guard
        .store()
        .nodes_in_file(&relative)
        .map(|nodes| nodes.into_iter().map(|n| n.id).collect())
        .unwrap_or_default();

    match guard.process_file(path) {
        Ok(_) => {
            let after = guard.store().nodes_in_file(&relative).unwrap_or_default();
            drop(guard);
            for node in after {
                let kind = if before.contains(&node.id) { GraphEventKind::Modified } else { GraphEventKind::Added };
                let _ = events.send(GraphEvent { kind, node_id: node.id, file_path: relative.clone() });
            }
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "worker failed to process changed file");
        }
    }
}

async fn handle_deleted(engine: &Arc<Mutex<Engine>>, events: &broadcast::Sender<GraphEvent>, path: &Path) {
    let relative = relative_path(engine, path).await;

    let mut guard = engine.lock().await;
    let before = guard.store().nodes_in_file(&relative).unwrap_or_default();

    match guard.delete_file(path) {
        Ok(_) => {
            drop(guard);
            for node in before {
                let _ = events.send(GraphEvent { kind: GraphEventKind::Removed, node_id: node.id, file_path: relative.clone() });
            }
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "worker failed to process deleted file");
        }
    }
}
