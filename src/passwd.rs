//! Administration of the password file behind `git-webby passwd`.
use anyhow::Result;
use std::path::Path;
use webby_server::Htpasswd;

/// Add `username` or replace its password. Returns `true` when the user is new.
pub fn add(file: &Path, username: &str, password: &str) -> Result<bool> {
    let mut htpasswd = Htpasswd::load(file)?;
    let created = !htpasswd.contains(username);
    if created {
        htpasswd.create(username, password)?;
    } else {
        htpasswd.update(username, password)?;
    }
    htpasswd.write()?;
    Ok(created)
}

/// Returns `false` if there was no such user; the file is left untouched then.
pub fn remove(file: &Path, username: &str) -> Result<bool> {
    let mut htpasswd = Htpasswd::load(file)?;
    if !htpasswd.destroy(username) {
        return Ok(false);
    }
    htpasswd.write()?;
    Ok(true)
}

pub fn list(file: &Path) -> Result<Vec<String>> {
    let htpasswd = Htpasswd::load(file)?;
    Ok(htpasswd.usernames().map(str::to_string).collect())
}

pub fn check(file: &Path, username: &str, password: &str) -> Result<bool> {
    Ok(Htpasswd::load(file)?.authenticated(username, password))
}
