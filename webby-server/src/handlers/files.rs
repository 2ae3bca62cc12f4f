//! Files served to dumb clients straight from the repository directory.
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::debug;

use webby_protocol::PackExt;

use super::utils::{cache_forever, no_cache};
use crate::error::WebbyError;
use crate::repository::Repository;

/// HEAD, info/refs and the alternates files.
pub async fn text_file(repo: &Repository, segments: &[&str]) -> Result<Response, WebbyError> {
    let path = repo.path_to(segments)?;
    let data = read_file(&path).await?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(data))?;
    no_cache(response.headers_mut());
    Ok(response)
}

/// `objects/info/packs`, one `P pack-<hash>.pack` line per pack.
pub async fn info_packs(repo: &Repository) -> Result<Response, WebbyError> {
    let path = repo.info_packs_path()?;
    let data = read_file(&path).await?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(data))?;
    no_cache(response.headers_mut());
    Ok(response)
}

pub async fn loose_object(
    repo: &Repository,
    prefix: &str,
    suffix: &str,
) -> Result<Response, WebbyError> {
    let path = repo.loose_object_path(prefix, suffix)?;
    send_file(&path, "application/x-git-loose-object").await
}

pub async fn pack_file(repo: &Repository, pack: &str, ext: PackExt) -> Result<Response, WebbyError> {
    let path = repo.pack_path(pack)?;
    send_file(&path, ext.content_type()).await
}

async fn read_file(path: &Path) -> Result<Vec<u8>, WebbyError> {
    tokio::fs::read(path).await.map_err(|e| {
        debug!(path = %path.display(), error = %e, "file not readable");
        WebbyError::NotFound
    })
}

/// Stream a content-addressed file with cache-forever headers.
async fn send_file(path: &Path, content_type: &'static str) -> Result<Response, WebbyError> {
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        debug!(path = %path.display(), error = %e, "file not readable");
        WebbyError::NotFound
    })?;
    let metadata = file.metadata().await.map_err(|_| WebbyError::NotFound)?;
    if !metadata.is_file() {
        return Err(WebbyError::NotFound);
    }

    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    cache_forever(headers)?;
    Ok(response)
}
