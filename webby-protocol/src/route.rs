//! Classification of smart HTTP requests.
//!
//! Git clients only ever ask for a small, fixed set of paths below a
//! repository. [`classify`] maps `(method, path, service)` onto a [`Route`]
//! whose fields are already validated, so handlers never see raw captures.

use crate::{Service, WireError};

/// Files under `objects/info/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoFile {
    Packs,
    Alternates,
    HttpAlternates,
}

impl InfoFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            InfoFile::Packs => "packs",
            InfoFile::Alternates => "alternates",
            InfoFile::HttpAlternates => "http-alternates",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "packs" => Some(InfoFile::Packs),
            "alternates" => Some(InfoFile::Alternates),
            "http-alternates" => Some(InfoFile::HttpAlternates),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackExt {
    Pack,
    Idx,
}

impl PackExt {
    pub fn content_type(&self) -> &'static str {
        match self {
            PackExt::Pack => "application/x-git-packed-objects",
            PackExt::Idx => "application/x-git-packed-objects-toc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /{repo}/HEAD`
    HeadFile { repo: String },
    /// `GET /{repo}/info/refs` for dumb clients
    InfoRefs { repo: String },
    /// `GET /{repo}/info/refs?service=git-...`
    InfoRefsService { repo: String, service: Service },
    /// `GET /{repo}/objects/info/{packs,alternates,http-alternates}`
    InfoFile { repo: String, file: InfoFile },
    /// `GET /{repo}/objects/{2 hex}/{38 hex}`
    LooseObject {
        repo: String,
        prefix: String,
        suffix: String,
    },
    /// `GET /{repo}/objects/pack/pack-{40 hex}.{pack,idx}`
    PackFile {
        repo: String,
        pack: String,
        ext: PackExt,
    },
    /// `POST /{repo}/git-{upload,receive}-pack`
    ServiceRpc { repo: String, service: Service },
}

impl Route {
    pub fn repo(&self) -> &str {
        match self {
            Route::HeadFile { repo }
            | Route::InfoRefs { repo }
            | Route::InfoRefsService { repo, .. }
            | Route::InfoFile { repo, .. }
            | Route::LooseObject { repo, .. }
            | Route::PackFile { repo, .. }
            | Route::ServiceRpc { repo, .. } => repo,
        }
    }

    /// The stateless-RPC service this route drives, if any.
    pub fn service(&self) -> Option<Service> {
        match self {
            Route::InfoRefsService { service, .. } | Route::ServiceRpc { service, .. } => {
                Some(*service)
            }
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RouteError {
    #[error("Unsupported service: {0}")]
    UnsupportedService(String),
}

/// Classify a request. `Ok(None)` means the request is not part of the smart
/// HTTP grammar and should fall through to a 404.
///
/// `method` is the upper-case HTTP method; `HEAD` is treated like `GET`.
pub fn classify(
    method: &str,
    path: &str,
    service: Option<&str>,
) -> Result<Option<Route>, RouteError> {
    let path = path.trim_start_matches('/');
    match method {
        "GET" | "HEAD" => classify_get(path, service),
        "POST" => Ok(classify_post(path)),
        _ => Ok(None),
    }
}

fn classify_get(path: &str, service: Option<&str>) -> Result<Option<Route>, RouteError> {
    if let Some(repo) = repo_before(path, "/HEAD") {
        return Ok(Some(Route::HeadFile { repo }));
    }

    if let Some(repo) = repo_before(path, "/info/refs") {
        return match service {
            None => Ok(Some(Route::InfoRefs { repo })),
            Some(name) => match Service::from_prefixed(name) {
                Ok(service) => Ok(Some(Route::InfoRefsService { repo, service })),
                Err(WireError::UnknownService(name)) => {
                    Err(RouteError::UnsupportedService(name))
                }
                Err(_) => Err(RouteError::UnsupportedService(name.to_string())),
            },
        };
    }

    let mut parts = path.rsplitn(4, '/');
    let (Some(last), Some(second), Some(third), Some(repo)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Ok(None);
    };
    if repo.is_empty() {
        return Ok(None);
    }

    if third == "objects" && second == "info" {
        return Ok(InfoFile::parse(last).map(|file| Route::InfoFile {
            repo: repo.to_string(),
            file,
        }));
    }

    if third == "objects" && is_lower_hex(second, 2) && is_lower_hex(last, 38) {
        return Ok(Some(Route::LooseObject {
            repo: repo.to_string(),
            prefix: second.to_string(),
            suffix: last.to_string(),
        }));
    }

    if third == "objects" && second == "pack" {
        return Ok(parse_pack_name(last).map(|ext| Route::PackFile {
            repo: repo.to_string(),
            pack: last.to_string(),
            ext,
        }));
    }

    Ok(None)
}

fn classify_post(path: &str) -> Option<Route> {
    let (repo, last) = path.rsplit_once('/')?;
    if repo.is_empty() {
        return None;
    }
    // only the two exact service names route; anything else is a 404
    let service = Service::from_prefixed(last).ok()?;
    Some(Route::ServiceRpc {
        repo: repo.to_string(),
        service,
    })
}

fn repo_before(path: &str, suffix: &str) -> Option<String> {
    path.strip_suffix(suffix)
        .filter(|repo| !repo.is_empty())
        .map(str::to_string)
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// `pack-{40 hex}.pack` or `pack-{40 hex}.idx`
fn parse_pack_name(name: &str) -> Option<PackExt> {
    let rest = name.strip_prefix("pack-")?;
    let (hash, ext) = rest.split_once('.')?;
    if !is_lower_hex(hash, 40) {
        return None;
    }
    match ext {
        "pack" => Some(PackExt::Pack),
        "idx" => Some(PackExt::Idx),
        _ => None,
    }
}
