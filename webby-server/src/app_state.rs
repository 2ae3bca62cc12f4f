use anyhow::Result;

use crate::config::ServiceConfig;
use crate::htpasswd::SharedHtpasswd;

/// State handed to every request. The configuration is fixed; the password
/// table follows its file.
#[derive(Debug)]
pub struct AppState {
    pub config: ServiceConfig,
    pub htpasswd: SharedHtpasswd,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let htpasswd = SharedHtpasswd::load(&config.htpasswd)?;
        if config.authenticate && htpasswd.current().is_empty() {
            tracing::warn!(
                path = %config.htpasswd.display(),
                "authentication is enabled but the password file has no users"
            );
        }
        if let Some(shadowed) = config.shadowed_by_tree_prefix() {
            tracing::warn!(
                path = %shadowed.display(),
                prefix = %config.tree_prefix,
                "repositories below this directory are unreachable, the tree endpoint owns the prefix"
            );
        }
        Ok(Self { config, htpasswd })
    }
}
