//! The JSON tree listing.

mod common;

use anyhow::Result;
use common::{git, spawn_server, Fixture};
use reqwest::header;
use serde_json::Value;
use std::fs;

#[tokio::test]
async fn lists_root_of_head() -> Result<()> {
    let fixture = Fixture::new()?;
    let base = spawn_server(fixture.config()?).await?;

    let resp = reqwest::get(format!("{base}/tree/mycode.git/HEAD")).await?;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");

    let entries: Vec<Value> = resp.json().await?;
    let names: Vec<&str> = entries
        .iter()
        .filter_map(|e| e["fname"].as_str())
        .collect();
    assert_eq!(names, [".gitignore", "README.txt", "lib"]);

    let readme = &entries[1];
    assert_eq!(readme["ftype"], "file");
    assert_eq!(readme["fperm"], "rw-r--r--");
    assert_eq!(readme["otype"], "blob");
    assert!(readme["ohash"].as_str().is_some_and(|hash| hash.len() >= 6));
    assert_eq!(readme["fsize"], serde_json::json!([8.0, "B"]));

    let lib = &entries[2];
    assert_eq!(lib["ftype"], "directory");
    assert_eq!(lib["otype"], "tree");
    assert!(lib["fsize"].is_null());
    Ok(())
}

#[tokio::test]
async fn lists_subdirectory() -> Result<()> {
    let fixture = Fixture::new()?;
    let base = spawn_server(fixture.config()?).await?;

    let resp = reqwest::get(format!("{base}/tree/mycode.git/master/lib")).await?;
    assert_eq!(resp.status(), 200);

    let entries: Vec<Value> = resp.json().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["fname"], "mycode.rb");
    Ok(())
}

#[tokio::test]
async fn unknown_revision_or_path_is_not_found() -> Result<()> {
    let fixture = Fixture::new()?;
    let base = spawn_server(fixture.config()?).await?;

    for path in [
        "/tree/mycode.git/nosuchbranch",
        "/tree/mycode.git/HEAD/nowhere",
        "/tree/nothere.git/HEAD",
    ] {
        let resp = reqwest::get(format!("{base}{path}")).await?;
        assert_eq!(resp.status(), 404, "{path}");
    }
    Ok(())
}

#[tokio::test]
async fn option_like_revision_is_rejected() -> Result<()> {
    let fixture = Fixture::new()?;
    let base = spawn_server(fixture.config()?).await?;

    let resp = reqwest::get(format!("{base}/tree/mycode.git/--output=x")).await?;
    assert_eq!(resp.status(), 400);
    Ok(())
}

#[tokio::test]
async fn custom_prefix_moves_the_endpoint() -> Result<()> {
    let fixture = Fixture::new()?;
    let config = fixture.config()?.with_tree_prefix("/browse/")?;
    let base = spawn_server(config).await?;

    let resp = reqwest::get(format!("{base}/browse/mycode.git/HEAD")).await?;
    assert_eq!(resp.status(), 200);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn names_are_returned_unquoted() -> Result<()> {
    let fixture = Fixture::new()?;
    let work = fixture.path().join("names");
    fs::create_dir(&work)?;
    git(&work, &["init", "-q"])?;
    fs::write(work.join("caf\u{e9}.txt"), "x\n")?;
    fs::write(work.join("say \"hi\".txt"), "x\n")?;
    git(&work, &["add", "."])?;
    git(&work, &["commit", "-q", "-m", "Odd names"])?;
    let base = spawn_server(fixture.config()?).await?;

    let resp = reqwest::get(format!("{base}/tree/names/HEAD")).await?;
    assert_eq!(resp.status(), 200);
    let entries: Vec<Value> = resp.json().await?;
    let names: Vec<&str> = entries
        .iter()
        .filter_map(|e| e["fname"].as_str())
        .collect();
    assert_eq!(names, ["caf\u{e9}.txt", "say \"hi\".txt"]);
    Ok(())
}
