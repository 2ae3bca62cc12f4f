use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use webby_protocol::{Route, Service};

use crate::error::WebbyError;

pub const DEFAULT_REALM: &str = "git-webby";
pub const DEFAULT_TREE_PREFIX: &str = "/tree";

/// Immutable per-deployment settings, built once at startup and shared by
/// every request.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory that contains all repositories (canonical).
    pub project_root: PathBuf,
    /// `git` executable; a bare name is looked up on `PATH`.
    pub git_path: PathBuf,
    /// Like `http.getanyfile`: serve the dumb protocol files.
    pub get_any_file: bool,
    /// Like `http.uploadpack`: allow fetch/clone.
    pub upload_pack: bool,
    /// Like `http.receivepack`: allow push.
    pub receive_pack: bool,
    /// Require Basic credentials on every request.
    pub authenticate: bool,
    pub htpasswd: PathBuf,
    pub realm: String,
    /// Mount point of the JSON tree endpoint.
    pub tree_prefix: String,
}

impl ServiceConfig {
    /// Defaults follow `git http-backend`: anonymous read and fetch, no push.
    pub fn new(project_root: impl AsRef<Path>, git_path: impl AsRef<Path>) -> Result<Self> {
        let project_root = project_root.as_ref();
        let project_root = project_root
            .canonicalize()
            .with_context(|| format!("project root {} does not exist", project_root.display()))?;
        if !project_root.is_dir() {
            bail!("project root {} is not a directory", project_root.display());
        }

        let git_path = resolve_git_path(git_path.as_ref())?;
        let htpasswd = project_root.join("htpasswd");

        Ok(Self {
            project_root,
            git_path,
            get_any_file: true,
            upload_pack: true,
            receive_pack: false,
            authenticate: false,
            htpasswd,
            realm: DEFAULT_REALM.to_string(),
            tree_prefix: DEFAULT_TREE_PREFIX.to_string(),
        })
    }

    pub fn with_tree_prefix(mut self, prefix: &str) -> Result<Self> {
        let trimmed = prefix.trim_end_matches('/');
        if !trimmed.starts_with('/') || trimmed.len() < 2 {
            bail!("tree prefix must look like \"/tree\", got {prefix:?}");
        }
        self.tree_prefix = trimmed.to_string();
        Ok(self)
    }

    /// Directory below the project root whose repositories the tree endpoint
    /// hides, if it exists.
    pub fn shadowed_by_tree_prefix(&self) -> Option<PathBuf> {
        let dir = self.project_root.join(self.tree_prefix.trim_start_matches('/'));
        dir.is_dir().then_some(dir)
    }

    /// Refuse routes whose capability is switched off.
    pub fn check_enabled(&self, route: &Route) -> Result<(), WebbyError> {
        match route.service() {
            Some(Service::UploadPack) if !self.upload_pack => {
                Err(WebbyError::Forbidden("upload-pack".into()))
            }
            Some(Service::ReceivePack) if !self.receive_pack => {
                Err(WebbyError::Forbidden("receive-pack".into()))
            }
            Some(_) => Ok(()),
            None if !self.get_any_file => Err(WebbyError::Forbidden("getanyfile".into())),
            None => Ok(()),
        }
    }
}

fn resolve_git_path(git_path: &Path) -> Result<PathBuf> {
    if git_path.components().count() <= 1 && !git_path.is_absolute() {
        return Ok(git_path.to_path_buf());
    }
    git_path
        .canonicalize()
        .with_context(|| format!("git executable {} does not exist", git_path.display()))
}
