use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};
use webby_server::config::{DEFAULT_REALM, DEFAULT_TREE_PREFIX};
use webby_server::ServiceConfig;

pub const CONFIG_FILE_NAME: &str = ".git-webby.toml";

/// Capability switches, named after `git http-backend`'s `http.*` settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HttpBackend {
    pub get_any_file: bool,
    pub upload_pack: bool,
    pub receive_pack: bool,
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self {
            get_any_file: true,
            upload_pack: true,
            receive_pack: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen: SocketAddr,
    pub project_root: PathBuf,
    pub git_path: PathBuf,
    pub authenticate: bool,
    /// Defaults to `{project_root}/htpasswd`.
    pub htpasswd: Option<PathBuf>,
    pub realm: String,
    pub tree_prefix: String,
    pub http_backend: HttpBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            project_root: PathBuf::from("/home/git"),
            git_path: PathBuf::from("git"),
            authenticate: false,
            htpasswd: None,
            realm: DEFAULT_REALM.to_string(),
            tree_prefix: DEFAULT_TREE_PREFIX.to_string(),
            http_backend: HttpBackend::default(),
        }
    }
}

impl Config {
    /// Read `path`, or `~/.git-webby.toml` when no path is given and that
    /// file exists, or fall back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&s).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Validate paths and produce the settings the server runs with.
    pub fn service_config(&self) -> Result<ServiceConfig> {
        let mut config = ServiceConfig::new(&self.project_root, &self.git_path)?
            .with_tree_prefix(&self.tree_prefix)?;

        config.get_any_file = self.http_backend.get_any_file;
        config.upload_pack = self.http_backend.upload_pack;
        config.receive_pack = self.http_backend.receive_pack;
        config.authenticate = self.authenticate;
        config.realm = self.realm.clone();
        if let Some(htpasswd) = &self.htpasswd {
            config.htpasswd = absolute(htpasswd)?;
        }
        Ok(config)
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("could not determine current directory")?
        .join(path))
}
