//! Git commit metadata fetch for stamping a new Snapshot.
//!
//! Deliberately narrow: rather than shelling out to `git log -N` and
//! replaying a window of history, this only ever resolves the metadata of
//! *one* commit at a time — the one being snapshotted. History accumulates
//! snapshot-by-snapshot rather than being replayed wholesale from git.

use std::path::Path;

use crate::error::{MuError, MuResult};
use crate::temporal::models::CommitMetadata;

fn upstream(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> MuError {
    MuError::Upstream {
        message: message.into(),
        retryable: false,
        source: Some(Box::new(source)),
    }
}

/// Read commit metadata for `commit_ref` (a revspec: full/short hash, tag,
/// or branch name) or `HEAD` when `commit_ref` is `None`.
pub fn read_commit_metadata(repo_path: &Path, commit_ref: Option<&str>) -> MuResult<CommitMetadata> {
    let repo = gix::open(repo_path)
        .map_err(|e| upstream(format!("failed to open git repository at {}", repo_path.display()), e))?;

    let commit = match commit_ref {
        Some(spec) => repo
            .rev_parse_single(spec)
            .map_err(|e| upstream(format!("unresolvable git revision '{spec}'"), e))?
            .object()
            .map_err(|e| upstream("failed to load git object", e))?
            .try_into_commit()
            .map_err(|e| upstream(format!("'{spec}' is not a commit"), e))?,
        None => repo
            .head_commit()
            .map_err(|e| upstream("repository has no HEAD commit (unborn branch?)", e))?,
    };

    let hash = commit.id.to_string();

    let message_ref = commit
        .message()
        .map_err(|e| upstream("failed to decode commit message", e))?;
    let message = String::from_utf8_lossy(message_ref.summary().as_ref()).into_owned();

    let author_sig = commit
        .author()
        .map_err(|e| upstream("failed to decode commit author", e))?;
    let author = String::from_utf8_lossy(author_sig.name.as_ref()).into_owned();
    let timestamp = author_sig.time.format(gix::date::time::format::ISO8601_STRICT);

    Ok(CommitMetadata {
        hash,
        message,
        author,
        timestamp,
    })
}
