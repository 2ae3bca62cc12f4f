//! Parsing of `git ls-tree -z --abbrev=6 --full-tree --long` output.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

// <type code><perm><perm><perm> <object type> <hash> <padding><size>\t<name>
static LS_TREE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([0-7]{3})([0-7])([0-7])([0-7]) (\w+) ([0-9a-f]{6,}) +(-|\d+)\t(.+)$")
        .expect("ls-tree line regex is valid")
});

const PERMISSIONS: [&str; 8] = ["---", "--x", "-w-", "-wx", "r--", "r-x", "rw-", "rwx"];

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
    Symlink,
    /// Any mode git reports that is not one of the three above (e.g. `160`
    /// for submodule commits).
    Unknown,
}

impl FileType {
    pub fn from_code(code: &str) -> Self {
        match code {
            "100" => FileType::File,
            "040" => FileType::Directory,
            "120" => FileType::Symlink,
            _ => FileType::Unknown,
        }
    }
}

/// Human readable size, serialized as `[value, "unit"]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FileSize(pub f64, pub &'static str);

impl FileSize {
    /// Scale `bytes` to the first unit whose value is at most 10, rounded to
    /// two decimals. Values too large for every unit stay in `TB`.
    pub fn from_bytes(bytes: u64) -> Self {
        let scaled = |unit: usize| bytes as f64 / 1024f64.powi(unit as i32);
        let unit = (0..SIZE_UNITS.len())
            .find(|&unit| scaled(unit) <= 10.0)
            .unwrap_or(SIZE_UNITS.len() - 1);
        FileSize((scaled(unit) * 100.0).round() / 100.0, SIZE_UNITS[unit])
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn unit(&self) -> &'static str {
        self.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeEntry {
    #[serde(rename = "ftype")]
    pub file_type: FileType,
    #[serde(rename = "fperm")]
    pub permissions: String,
    #[serde(rename = "otype")]
    pub object_type: String,
    #[serde(rename = "ohash")]
    pub object_hash: String,
    #[serde(rename = "fsize")]
    pub size: Option<FileSize>,
    #[serde(rename = "fname")]
    pub name: String,
}

impl TreeEntry {
    /// Parse a single record (without its terminating NUL). Names are taken
    /// verbatim, so they may contain tabs, quotes or newlines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let caps = LS_TREE_LINE.captures(line)?;

        let permissions = [&caps[2], &caps[3], &caps[4]]
            .iter()
            .map(|digit| PERMISSIONS[usize::from(digit.as_bytes()[0] - b'0')])
            .collect::<String>();

        let size = match &caps[7] {
            "-" => None,
            raw => Some(FileSize::from_bytes(raw.parse().ok()?)),
        };

        Some(TreeEntry {
            file_type: FileType::from_code(&caps[1]),
            permissions,
            object_type: caps[5].to_string(),
            object_hash: caps[6].to_string(),
            size,
            name: caps[8].to_string(),
        })
    }
}

/// Parse full NUL-separated `ls-tree -z` output, keeping git's order.
/// Records outside the grammar are skipped.
pub fn parse_ls_tree(output: &str) -> Vec<TreeEntry> {
    output
        .split('\0')
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let entry = TreeEntry::parse_line(line);
            if entry.is_none() {
                tracing::warn!(%line, "skipping unparseable ls-tree line");
            }
            entry
        })
        .collect()
}
