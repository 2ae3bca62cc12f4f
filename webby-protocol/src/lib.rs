pub mod route;
pub mod tree;

use std::fmt;
use std::str::FromStr;

pub use route::{classify, InfoFile, PackExt, Route, RouteError};
pub use tree::{parse_ls_tree, FileSize, FileType, TreeEntry};

/// The flush packet that terminates a pkt-line section.
pub const FLUSH_PKT: &[u8; 4] = b"0000";

/// Largest payload a single pkt-line can carry (the length field is 4 hex digits
/// and counts its own 4 bytes).
pub const MAX_PKT_PAYLOAD: usize = 0xffff - 4;

/// The two services git exposes over stateless RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    /// Parse a service as it appears on the wire (`git-upload-pack`).
    ///
    /// The `git-` prefix is mandatory; anything else is refused rather than
    /// defaulted so it can never reach the subprocess command line.
    pub fn from_prefixed(s: &str) -> Result<Self, WireError> {
        let name = s
            .strip_prefix("git-")
            .ok_or_else(|| WireError::UnknownService(s.to_string()))?;
        match name {
            "upload-pack" => Ok(Service::UploadPack),
            "receive-pack" => Ok(Service::ReceivePack),
            _ => Err(WireError::UnknownService(s.to_string())),
        }
    }

    /// Name without the prefix, i.e. the `git` subcommand.
    pub fn name(&self) -> &'static str {
        match self {
            Service::UploadPack => "upload-pack",
            Service::ReceivePack => "receive-pack",
        }
    }

    pub fn prefixed(&self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }

    pub fn advertisement_content_type(&self) -> String {
        format!("application/x-git-{}-advertisement", self.name())
    }

    pub fn result_content_type(&self) -> String {
        format!("application/x-git-{}-result", self.name())
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefixed())
    }
}

impl FromStr for Service {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Service::from_prefixed(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("unsupported service: {0}")]
    UnknownService(String),

    #[error("pkt-line payload too long: {0} bytes")]
    TooLong(usize),
}

/// Encode one pkt-line: 4 lower-case hex digits of `payload.len() + 4`, then the payload.
pub fn pkt_line(payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_PKT_PAYLOAD {
        return Err(WireError::TooLong(payload.len()));
    }
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(format!("{:04x}", payload.len() + 4).as_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Header of a smart `info/refs` response: `# service=git-{service}\n` as a
/// pkt-line followed by a flush.
pub fn advertisement_header(service: Service) -> Result<Vec<u8>, WireError> {
    let mut out = pkt_line(format!("# service={}\n", service.prefixed()).as_bytes())?;
    out.extend_from_slice(FLUSH_PKT);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_requires_git_prefix() {
        assert_eq!(
            Service::from_prefixed("git-upload-pack").unwrap(),
            Service::UploadPack
        );
        assert_eq!(
            Service::from_prefixed("git-receive-pack").unwrap(),
            Service::ReceivePack
        );
        assert!(Service::from_prefixed("upload-pack").is_err());
        assert!(Service::from_prefixed("svn-upload-pack").is_err());
        assert!(Service::from_prefixed("git-").is_err());
        assert!(Service::from_prefixed("git-upload-archive").is_err());
    }

    #[test]
    fn service_content_types() {
        assert_eq!(
            Service::UploadPack.advertisement_content_type(),
            "application/x-git-upload-pack-advertisement"
        );
        assert_eq!(
            Service::ReceivePack.result_content_type(),
            "application/x-git-receive-pack-result"
        );
    }

    #[test]
    fn pkt_line_length_includes_header() {
        // 26 payload bytes + 4 = 30 = 0x1e
        let line = pkt_line(b"# service=git-upload-pack\n").unwrap();
        assert_eq!(line, b"001e# service=git-upload-pack\n".to_vec());

        // 27 payload bytes + 4 = 31 = 0x1f
        let line = pkt_line(b"# service=git-receive-pack\n").unwrap();
        assert_eq!(&line[..4], b"001f");
    }

    #[test]
    fn pkt_line_hex_is_lowercase() {
        let payload = vec![b'a'; 0xab - 4];
        let line = pkt_line(&payload).unwrap();
        assert_eq!(&line[..4], b"00ab");
    }

    #[test]
    fn pkt_line_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PKT_PAYLOAD + 1];
        assert!(matches!(pkt_line(&payload), Err(WireError::TooLong(_))));
    }

    #[test]
    fn advertisement_header_is_line_plus_flush() {
        let header = advertisement_header(Service::UploadPack).unwrap();
        assert_eq!(header, b"001e# service=git-upload-pack\n0000".to_vec());

        let header = advertisement_header(Service::ReceivePack).unwrap();
        assert!(header.starts_with(b"001f# service=git-receive-pack\n"));
        assert!(header.ends_with(FLUSH_PKT));
    }
}
