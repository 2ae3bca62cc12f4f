use axum::{
    extract::{Path, State},
    Json,
};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, instrument};

use webby_protocol::{parse_ls_tree, TreeEntry};

use crate::app_state::AppState;
use crate::config::ServiceConfig;
use crate::error::WebbyError;
use crate::repository::Repository;

/// `GET {prefix}/{repo}/{revision}`
pub async fn list_root(
    State(state): State<Arc<AppState>>,
    Path((name, revision)): Path<(String, String)>,
) -> Result<Json<Vec<TreeEntry>>, WebbyError> {
    let repo = Repository::resolve(&state.config.project_root, &name)?;
    Ok(Json(list(&state.config, &repo, &revision, "").await?))
}

/// `GET {prefix}/{repo}/{revision}/{*path}`
pub async fn list_path(
    State(state): State<Arc<AppState>>,
    Path((name, revision, subpath)): Path<(String, String, String)>,
) -> Result<Json<Vec<TreeEntry>>, WebbyError> {
    let repo = Repository::resolve(&state.config.project_root, &name)?;
    Ok(Json(list(&state.config, &repo, &revision, &subpath).await?))
}

/// Entries of `revision:subpath` in git's order.
#[instrument(skip(config, repo), fields(repo = %repo.path().display()))]
pub async fn list(
    config: &ServiceConfig,
    repo: &Repository,
    revision: &str,
    subpath: &str,
) -> Result<Vec<TreeEntry>, WebbyError> {
    if revision.is_empty() || revision.starts_with('-') {
        return Err(WebbyError::BadRequest(format!("invalid revision {revision:?}")));
    }

    let treeish = format!("{revision}:{}", subpath.trim_matches('/'));
    let output = Command::new(&config.git_path)
        .args(["ls-tree", "-z", "--abbrev=6", "--full-tree", "--long"])
        .arg(&treeish)
        .current_dir(repo.path())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| WebbyError::Internal(anyhow::anyhow!("failed to spawn git ls-tree: {e}")))?;

    if !output.status.success() {
        debug!(
            %treeish,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "ls-tree failed"
        );
        return Err(WebbyError::NotFound);
    }

    Ok(parse_ls_tree(&String::from_utf8_lossy(&output.stdout)))
}
