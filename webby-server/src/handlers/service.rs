//! Smart protocol: ref advertisement and stateless RPC through `git`.
use anyhow::Context as _;
use axum::{
    body::{Body, BodyDataStream},
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use flate2::write::GzDecoder;
use futures::StreamExt;
use std::io::{self, Write};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, instrument, warn};

use webby_protocol::{advertisement_header, Service};

use super::utils::no_cache;
use crate::config::ServiceConfig;
use crate::error::WebbyError;
use crate::repository::Repository;

/// Size of each read from the subprocess's stdout.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Chunks buffered between the stdout pump and the response body.
const CHANNEL_DEPTH: usize = 16;

/// `GET info/refs?service=...`: service announcement, flush, then the refs
/// as printed by `git <service> --stateless-rpc --advertise-refs .`.
#[instrument(skip(config, repo), fields(repo = %repo.path().display()))]
pub async fn advertise(
    config: &ServiceConfig,
    repo: &Repository,
    service: Service,
) -> Result<Response, WebbyError> {
    let output = Command::new(&config.git_path)
        .arg(service.name())
        .args(["--stateless-rpc", "--advertise-refs", "."])
        .current_dir(repo.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to spawn git {}", service.name()))?;

    if !output.status.success() {
        warn!(
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "ref advertisement exited unsuccessfully"
        );
    }

    let mut body =
        advertisement_header(service).context("failed to encode service announcement")?;
    body.extend_from_slice(&output.stdout);

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, service.advertisement_content_type())
        .body(Body::from(body))?;
    no_cache(response.headers_mut());
    Ok(response)
}

/// `POST /{repo}/git-<service>`: stream the request body into
/// `git <service> --stateless-rpc .` and its stdout back to the client.
///
/// The body is written by its own task while the pump task reads stdout, so
/// neither side can stall on a full pipe. The pump owns the child and always
/// reaps it, killing it first if the client goes away.
#[instrument(skip(config, repo, request), fields(repo = %repo.path().display()))]
pub async fn run(
    config: &ServiceConfig,
    repo: &Repository,
    service: Service,
    request: Request,
) -> Result<Response, WebbyError> {
    let gzip = match request.headers().get(header::CONTENT_ENCODING) {
        None => false,
        Some(v) if v == "gzip" || v == "x-gzip" => true,
        Some(other) => {
            return Err(WebbyError::BadRequest(format!(
                "unsupported Content-Encoding: {}",
                String::from_utf8_lossy(other.as_bytes())
            )))
        }
    };

    let mut child = Command::new(&config.git_path)
        .arg(service.name())
        .args(["--stateless-rpc", "."])
        .current_dir(repo.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn git {}", service.name()))?;

    let stdin = child.stdin.take().context("child stdin was not captured")?;
    let stdout = child.stdout.take().context("child stdout was not captured")?;

    let writer = tokio::spawn(feed_stdin(request.into_body().into_data_stream(), stdin, gzip));

    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    tokio::spawn(pump(child, stdout, writer, tx, service));

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&service.result_content_type())?,
    );
    no_cache(headers);
    Ok(response)
}

/// Copy the request body into the child's stdin, then close it so git sees EOF.
async fn feed_stdin(
    mut body: BodyDataStream,
    mut stdin: ChildStdin,
    gzip: bool,
) -> io::Result<u64> {
    let mut decoder = gzip.then(|| GzDecoder::new(Vec::new()));
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(io::Error::other)?;
        let data = match decoder.as_mut() {
            Some(decoder) => {
                decoder.write_all(&chunk)?;
                std::mem::take(decoder.get_mut())
            }
            None => chunk.to_vec(),
        };
        stdin.write_all(&data).await?;
        written += data.len() as u64;
    }

    if let Some(decoder) = decoder {
        let rest = decoder.finish()?;
        stdin.write_all(&rest).await?;
        written += rest.len() as u64;
    }

    stdin.shutdown().await?;
    Ok(written)
}

async fn pump(
    mut child: Child,
    mut stdout: ChildStdout,
    writer: JoinHandle<io::Result<u64>>,
    tx: mpsc::Sender<io::Result<Bytes>>,
    service: Service,
) {
    let stderr = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        })
    });

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        let read = tokio::select! {
            read = stdout.read(&mut buf) => read,
            _ = tx.closed() => return abandon(child, writer, service).await,
        };

        match read {
            Ok(0) => break,
            Ok(n) => {
                sent += n as u64;
                if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                    return abandon(child, writer, service).await;
                }
            }
            Err(e) => {
                error!(error = %e, "failed reading git stdout");
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
    drop(tx);

    match writer.await {
        Ok(Ok(received)) => debug!(received, "request body delivered"),
        Ok(Err(e)) => debug!(error = %e, "git stopped reading its input early"),
        Err(e) => warn!(error = %e, "stdin writer task failed"),
    }

    match child.wait().await {
        Ok(status) if status.success() => debug!(%service, sent, "git finished"),
        Ok(status) => {
            let stderr = match stderr {
                Some(handle) => handle.await.unwrap_or_default(),
                None => Vec::new(),
            };
            warn!(
                %service,
                %status,
                stderr = %String::from_utf8_lossy(&stderr).trim(),
                "git exited unsuccessfully"
            );
        }
        Err(e) => error!(error = %e, "failed to wait on git"),
    }
}

/// The response body was dropped: stop feeding git and reap it.
async fn abandon(mut child: Child, writer: JoinHandle<io::Result<u64>>, service: Service) {
    warn!(%service, "client went away, killing git");
    writer.abort();
    if let Err(e) = child.kill().await {
        error!(error = %e, "failed to kill git");
    }
}
