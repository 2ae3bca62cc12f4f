//! `.htpasswd` style credential store using traditional DES crypt.
//!
//! One `username:hash` record per line where `hash` is 13 characters: a
//! 2-character salt followed by 11 characters of DES crypt output. The format
//! is kept byte-compatible with files produced by `htpasswd -d`.
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use subtle::ConstantTimeEq;
use tempfile::NamedTempFile;

/// Hash checked for unknown users so they cost the same as a wrong password.
const DUMMY_HASH: &str = "aaqPiZY5xR5l.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub salted_hash: String,
}

impl Credential {
    pub fn salt(&self) -> &str {
        self.salted_hash.get(..2).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct Htpasswd {
    path: PathBuf,
    entries: Vec<Credential>,
}

impl Htpasswd {
    /// Load the file at `path`. A missing file is an empty table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let (username, hash) = line.split_once(':').ok_or_else(|| {
                anyhow!("{}:{}: expected username:hash", path.display(), lineno + 1)
            })?;
            entries.push(Credential {
                username: username.to_string(),
                salted_hash: hash.to_string(),
            });
        }

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored hash and its salt.
    pub fn find(&self, username: &str) -> Option<(&str, &str)> {
        self.entries
            .iter()
            .find(|c| c.username == username)
            .map(|c| (c.salted_hash.as_str(), c.salt()))
    }

    /// Check `password` against the stored hash. Unknown users and wrong
    /// passwords are indistinguishable to the caller.
    pub fn authenticated(&self, username: &str, password: &str) -> bool {
        let (stored, found) = match self.find(username) {
            Some((hash, _)) => (hash, true),
            None => (DUMMY_HASH, false),
        };
        let salt = stored.get(..2).unwrap_or("");

        #[allow(deprecated)]
        let Ok(computed) = pwhash::unix_crypt::hash_with(salt, password) else {
            return false;
        };
        let matches: bool = computed.as_bytes().ct_eq(stored.as_bytes()).into();
        found && matches
    }

    /// Add a user, or replace the password of an existing one, with a fresh
    /// random salt.
    pub fn create(&mut self, username: &str, password: &str) -> Result<()> {
        if username.is_empty() || username.contains([':', '\n', '\r']) {
            bail!("invalid username {username:?}");
        }
        #[allow(deprecated)]
        let salted_hash = pwhash::unix_crypt::hash(password)
            .map_err(|e| anyhow!("failed to hash password: {e:?}"))?;

        match self.entries.iter_mut().find(|c| c.username == username) {
            Some(existing) => existing.salted_hash = salted_hash,
            None => self.entries.push(Credential {
                username: username.to_string(),
                salted_hash,
            }),
        }
        Ok(())
    }

    pub fn update(&mut self, username: &str, password: &str) -> Result<()> {
        self.create(username, password)
    }

    /// Remove a user; returns whether it existed.
    pub fn destroy(&mut self, username: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|c| c.username != username);
        self.entries.len() != before
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.iter().any(|c| c.username == username)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|c| c.username.as_str())
    }

    /// Rewrite the whole file: temp file in the same directory, then rename.
    pub fn write(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        for c in &self.entries {
            writeln!(tmp, "{}:{}", c.username, c.salted_hash)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// What identifies one version of the password file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
    inode: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        #[cfg(unix)]
        let inode = std::os::unix::fs::MetadataExt::ino(&metadata);
        #[cfg(not(unix))]
        let inode = 0;
        Some(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            inode,
        })
    }
}

#[derive(Debug)]
struct Snapshot {
    stamp: Option<FileStamp>,
    table: Arc<Htpasswd>,
}

/// Password table shared by the server. The file is re-read whenever it is
/// replaced or modified, so users added or removed with `git-webby passwd`
/// take effect without a restart.
#[derive(Debug)]
pub struct SharedHtpasswd {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl SharedHtpasswd {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let stamp = FileStamp::of(&path);
        let table = Arc::new(Htpasswd::load(&path)?);
        Ok(Self {
            path,
            snapshot: RwLock::new(Snapshot { stamp, table }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current table, reloaded first if the file changed since the last call.
    ///
    /// A file that fails to parse is reported and the previous table stays in
    /// use until the file changes again.
    pub fn current(&self) -> Arc<Htpasswd> {
        let stamp = FileStamp::of(&self.path);
        {
            let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
            if snapshot.stamp == stamp {
                return Arc::clone(&snapshot.table);
            }
        }

        let mut snapshot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        if snapshot.stamp != stamp {
            match Htpasswd::load(&self.path) {
                Ok(table) => {
                    tracing::info!(
                        path = %self.path.display(),
                        users = table.len(),
                        "reloaded password file"
                    );
                    snapshot.table = Arc::new(table);
                }
                Err(e) => tracing::error!(error = %e, "keeping previous password table"),
            }
            snapshot.stamp = stamp;
        }
        Arc::clone(&snapshot.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // all four share the password "s3kr3t"
    const FIXTURE: &str = "matthew:zKOzsdCzE.mEE\n\
                           mark:V5.e7XhcXHmQc\n\
                           luke:1y687odVzuFJs\n\
                           john:BInD5.JEyr5Ng\n";

    fn fixture() -> (TempDir, Htpasswd) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("htpasswd");
        fs::write(&path, FIXTURE).unwrap();
        let htpasswd = Htpasswd::load(&path).unwrap();
        (dir, htpasswd)
    }

    #[test]
    fn find_returns_hash_and_salt() {
        let (_dir, htpasswd) = fixture();
        assert_eq!(htpasswd.find("matthew"), Some(("zKOzsdCzE.mEE", "zK")));
        assert_eq!(htpasswd.find("john"), Some(("BInD5.JEyr5Ng", "BI")));
        assert_eq!(htpasswd.find("judas"), None);
    }

    #[test]
    fn authenticates_existing_crypt_hashes() {
        let (_dir, htpasswd) = fixture();
        for user in ["matthew", "mark", "luke", "john"] {
            assert!(htpasswd.authenticated(user, "s3kr3t"), "{user}");
            assert!(!htpasswd.authenticated(user, "invalid"), "{user}");
        }
    }

    #[test]
    fn unknown_users_never_authenticate() {
        let (_dir, htpasswd) = fixture();
        assert!(!htpasswd.authenticated("nobody", "empty"));
        assert!(!htpasswd.authenticated("nobody", "s3kr3t"));
        assert!(!htpasswd.authenticated("", ""));
    }

    #[test]
    fn size_and_membership() {
        let (_dir, htpasswd) = fixture();
        assert_eq!(htpasswd.len(), 4);
        assert!(htpasswd.contains("luke"));
        assert!(!htpasswd.contains("judas"));
        assert_eq!(
            htpasswd.usernames().collect::<Vec<_>>(),
            ["matthew", "mark", "luke", "john"]
        );
    }

    #[test]
    fn create_write_and_reload() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("htpasswd.tmp");

        let mut htpasswd = Htpasswd::load(&path)?;
        assert!(htpasswd.is_empty());
        htpasswd.create("judas", "hanged")?;
        assert!(htpasswd.contains("judas"));
        assert!(htpasswd.authenticated("judas", "hanged"));
        htpasswd.write()?;

        let reloaded = Htpasswd::load(&path)?;
        let (hash, salt) = reloaded.find("judas").unwrap();
        assert_eq!(hash.len(), 13);
        assert_eq!(&hash[..2], salt);
        assert!(reloaded.authenticated("judas", "hanged"));
        Ok(())
    }

    #[test]
    fn update_replaces_password() -> Result<()> {
        let (_dir, mut htpasswd) = fixture();
        htpasswd.update("mark", "n3w")?;
        assert!(htpasswd.authenticated("mark", "n3w"));
        assert!(!htpasswd.authenticated("mark", "s3kr3t"));
        assert_eq!(htpasswd.len(), 4);
        Ok(())
    }

    #[test]
    fn destroy_user() -> Result<()> {
        let (_dir, mut htpasswd) = fixture();
        htpasswd.create("judas", "hanged")?;
        assert!(htpasswd.destroy("judas"));
        assert!(!htpasswd.contains("judas"));
        assert!(!htpasswd.destroy("judas"));

        htpasswd.write()?;
        let reloaded = Htpasswd::load(htpasswd.path())?;
        assert_eq!(reloaded.len(), 4);
        Ok(())
    }

    #[test]
    fn rejects_usernames_that_break_the_format() {
        let (_dir, mut htpasswd) = fixture();
        assert!(htpasswd.create("a:b", "x").is_err());
        assert!(htpasswd.create("a\nb", "x").is_err());
        assert!(htpasswd.create("", "x").is_err());
    }

    #[test]
    fn malformed_lines_are_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("htpasswd");
        fs::write(&path, "# admins\n\nmatthew:zKOzsdCzE.mEE\nbroken\n").unwrap();
        let err = Htpasswd::load(&path).unwrap_err();
        assert!(err.to_string().contains(":4:"));
    }

    #[test]
    fn shared_table_follows_the_file() -> Result<()> {
        let (dir, _) = fixture();
        let path = dir.path().join("htpasswd");
        let shared = SharedHtpasswd::load(&path)?;
        assert!(shared.current().authenticated("john", "s3kr3t"));

        let mut htpasswd = Htpasswd::load(&path)?;
        htpasswd.create("paul", "tarsus")?;
        assert!(htpasswd.destroy("john"));
        htpasswd.write()?;

        let table = shared.current();
        assert!(table.authenticated("paul", "tarsus"));
        assert!(!table.authenticated("john", "s3kr3t"));
        assert!(Arc::ptr_eq(&table, &shared.current()));
        Ok(())
    }

    #[test]
    fn shared_table_empties_when_the_file_goes_away() -> Result<()> {
        let (dir, _) = fixture();
        let path = dir.path().join("htpasswd");
        let shared = SharedHtpasswd::load(&path)?;
        assert_eq!(shared.current().len(), 4);

        fs::remove_file(&path)?;
        assert!(shared.current().is_empty());
        Ok(())
    }

    #[test]
    fn shared_table_keeps_last_good_version() -> Result<()> {
        let (dir, _) = fixture();
        let path = dir.path().join("htpasswd");
        let shared = SharedHtpasswd::load(&path)?;

        fs::write(&path, "no separator here\n")?;
        assert_eq!(shared.current().len(), 4);
        assert!(shared.current().authenticated("luke", "s3kr3t"));
        Ok(())
    }
}
