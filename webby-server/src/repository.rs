//! Mapping of untrusted repository names onto directories below the project root.
use std::path::{Component, Path, PathBuf};

use crate::error::WebbyError;

/// A repository directory that existed when it was resolved and lies inside
/// the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    path: PathBuf,
}

impl Repository {
    /// Resolve `name` below `project_root`.
    ///
    /// Names that do not already end in `<word char>.git` get `/.git`
    /// appended, so both bare repositories and working copies resolve.
    /// Canonicalization follows symlinks and removes `..`; anything that
    /// lands outside the root, or is not a directory, is `NotFound`.
    pub fn resolve(project_root: &Path, name: &str) -> Result<Self, WebbyError> {
        let name = name.trim_start_matches('/');
        if name.is_empty() || name.contains('\0') {
            return Err(WebbyError::NotFound);
        }

        let candidate = if is_bare_name(name) {
            project_root.join(name)
        } else {
            project_root.join(name).join(".git")
        };

        let root = project_root
            .canonicalize()
            .map_err(|_| WebbyError::NotFound)?;
        let path = candidate.canonicalize().map_err(|_| WebbyError::NotFound)?;

        if !path.starts_with(&root) || !path.is_dir() {
            return Err(WebbyError::NotFound);
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Join plain file name segments onto the repository path.
    pub fn path_to<I, S>(&self, segments: I) -> Result<PathBuf, WebbyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = self.path.clone();
        for segment in segments {
            let segment = segment.as_ref();
            check_segment(segment)?;
            path.push(segment);
        }
        Ok(path)
    }

    pub fn loose_object_path(&self, prefix: &str, suffix: &str) -> Result<PathBuf, WebbyError> {
        self.path_to(["objects", prefix, suffix])
    }

    pub fn pack_path(&self, pack: &str) -> Result<PathBuf, WebbyError> {
        self.path_to(["objects", "pack", pack])
    }

    pub fn info_packs_path(&self) -> Result<PathBuf, WebbyError> {
        self.path_to(["objects", "info", "packs"])
    }
}

/// `foo.git` style name: ends in a word character followed by `.git`.
fn is_bare_name(name: &str) -> bool {
    name.strip_suffix(".git")
        .and_then(|stem| stem.chars().last())
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
}

fn check_segment(segment: &str) -> Result<(), WebbyError> {
    let bad = segment.is_empty()
        || segment.contains(['/', '\\', '\0'])
        || !matches!(
            Path::new(segment).components().next(),
            Some(Component::Normal(_))
        );
    if bad {
        return Err(WebbyError::BadRequest(format!(
            "invalid path segment {segment:?}"
        )));
    }
    Ok(())
}
