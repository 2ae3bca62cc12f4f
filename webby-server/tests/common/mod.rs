//! Shared fixtures: a project root holding a bare `mycode.git` (packed, with
//! one extra loose object and dumb-protocol info files) and a `work` working copy.
#![allow(dead_code)]

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use webby_server::{AppState, ServiceConfig};

pub struct Fixture {
    pub root: TempDir,
    /// `pack-<40 hex>` without extension
    pub pack: String,
    /// 40 hex id of a loose object in `mycode.git`
    pub loose: String,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let root = TempDir::new()?;
        let work = root.path().join("work");
        fs::create_dir_all(work.join("lib"))?;

        git(&work, &["init", "-q"])?;
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/master"])?;
        fs::write(work.join(".gitignore"), "*.log\n")?;
        fs::write(work.join("README.txt"), "My code\n")?;
        fs::write(work.join("lib/mycode.rb"), "puts 'hello'\n")?;
        git(&work, &["add", "."])?;
        git(&work, &["commit", "-q", "-m", "Initial commit"])?;

        git(root.path(), &["clone", "--bare", "-q", "work", "mycode.git"])?;
        let bare = root.path().join("mycode.git");
        git(&bare, &["repack", "-a", "-d", "-q"])?;
        git(&bare, &["update-server-info"])?;

        let extra = root.path().join("loose.txt");
        fs::write(&extra, "a loose object\n")?;
        let loose = git(&bare, &["hash-object", "-w", extra.to_str().context("utf-8 path")?])?
            .trim()
            .to_string();

        let pack = fs::read_dir(bare.join("objects/pack"))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .find_map(|name| name.strip_suffix(".pack").map(str::to_string))
            .context("repack produced no pack")?;

        Ok(Self { root, pack, loose })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn bare(&self) -> PathBuf {
        self.root.path().join("mycode.git")
    }

    pub fn config(&self) -> Result<ServiceConfig> {
        ServiceConfig::new(self.root.path(), "git")
    }
}

/// Run git with a fixed identity and no user/system configuration.
pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_AUTHOR_NAME", "Test User")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test User")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .with_context(|| format!("failed to run git {args:?}"))?;
    if !output.status.success() {
        bail!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Serve `config` on an ephemeral port; returns the base URL.
pub async fn spawn_server(config: ServiceConfig) -> Result<String> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let state = Arc::new(AppState::new(config)?);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, webby_server::app(state)).await;
    });
    Ok(format!("http://{addr}"))
}

pub fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
