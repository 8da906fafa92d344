//! Pipeline data structures for per-file processing

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::indexer::identity::{ABSOLUTE_PATH_FIELD, FILE_NAME_FIELD, PROJECT_FIELD};
use crate::indexer::IdentityKey;

const MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A regular file found by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub absolute_path: PathBuf,
    pub relative_path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

impl FileCandidate {
    /// Relative path with `/` separators, for logs and payloads
    pub fn display_path(&self) -> String {
        to_posix(&self.relative_path)
    }
}

/// Text encodings tried in order when reading content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

impl TextEncoding {
    pub const FALLBACK_ORDER: [TextEncoding; 2] = [TextEncoding::Utf8, TextEncoding::Latin1];

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            // Every byte maps to the code point of the same value
            Self::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "iso-8859-1",
        }
    }
}

/// Decoded file content ready for embedding
#[derive(Debug, Clone)]
pub struct ContentRecord {
    pub text: String,
    pub byte_length: usize,
    pub encoding: TextEncoding,
    pub truncated: bool,
}

impl ContentRecord {
    /// Decode raw bytes with the first encoding that succeeds, capped at
    /// `max_chars` characters.
    pub fn decode(bytes: &[u8], max_chars: usize) -> Option<Self> {
        TextEncoding::FALLBACK_ORDER.iter().find_map(|encoding| {
            encoding.decode(bytes).map(|text| {
                let (text, truncated) = truncate_chars(text, max_chars);
                ContentRecord {
                    text,
                    byte_length: bytes.len(),
                    encoding: *encoding,
                    truncated,
                }
            })
        })
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => {
            let mut text = text;
            text.truncate(byte_index);
            (text, true)
        }
        None => (text, false),
    }
}

/// Metadata stored in each point's payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub project: String,
    pub absolute_path: String,
    pub relative_path: String,
    pub file_name: String,
    pub extension: String,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl FileMetadata {
    pub fn new(project: &str, candidate: &FileCandidate) -> Self {
        let path = &candidate.absolute_path;
        Self {
            project: project.to_string(),
            absolute_path: path.to_string_lossy().to_string(),
            relative_path: candidate.display_path(),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default(),
            extension: path
                .extension()
                .map(|ext| ext.to_string_lossy().to_string())
                .unwrap_or_default(),
            size_bytes: candidate.size_bytes,
            modified_at: format_modified(candidate.modified),
            encoding: None,
        }
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = Some(encoding.as_str().to_string());
        self
    }

    /// All identifying fields; project + absolute path dominate when present
    pub fn identity_key(&self) -> IdentityKey {
        let mut key = IdentityKey::new()
            .with(PROJECT_FIELD, self.project.as_str())
            .with(ABSOLUTE_PATH_FIELD, self.absolute_path.as_str())
            .with(FILE_NAME_FIELD, self.file_name.as_str())
            .with("relative_path", self.relative_path.as_str())
            .with("extension", self.extension.as_str())
            .with("size_bytes", self.size_bytes.to_string());
        if let Some(modified_at) = &self.modified_at {
            key.insert("modified_at", modified_at.as_str());
        }
        key
    }
}

fn format_modified(modified: SystemTime) -> Option<String> {
    if modified == SystemTime::UNIX_EPOCH {
        return None;
    }
    let local: DateTime<Local> = modified.into();
    Some(local.format(MODIFIED_FORMAT).to_string())
}

/// Render a relative path with forward slashes
pub fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
