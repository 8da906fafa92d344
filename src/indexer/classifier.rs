//! Binary/text classification of discovered files.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::indexing::FileCandidate;

/// Bytes sampled from the start of a file for content sniffing
pub const SAMPLE_SIZE: usize = 4096;

/// Samples shorter than this are never judged by the non-text ratio
const MIN_RATIO_SAMPLE: usize = 50;

const MAX_NON_TEXT_RATIO: f64 = 0.3;

/// Extensions that are never indexed, regardless of content
pub const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp", "ico", "svg",
    // audio / video
    "mp3", "wav", "ogg", "mp4", "avi", "mov", "mkv", "flv", "webm",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    // archives
    "zip", "tar", "gz", "rar", "7z", "jar", "war",
    // compiled
    "exe", "dll", "so", "class", "pyc", "pyo", "o", "a", "lib", "bin",
    // data
    "dat", "db", "sqlite", "sqlite3",
];

/// Outcome of classifying one discovered file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationVerdict {
    Eligible,
    IgnoredByRule,
    Hidden,
    Binary,
    Oversized,
}

impl ClassificationVerdict {
    pub const ALL: [ClassificationVerdict; 5] = [
        Self::Eligible,
        Self::IgnoredByRule,
        Self::Hidden,
        Self::Binary,
        Self::Oversized,
    ];

    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::IgnoredByRule => "ignored",
            Self::Hidden => "hidden",
            Self::Binary => "binary",
            Self::Oversized => "oversized",
        }
    }

    /// Position in [`ClassificationVerdict::ALL`]
    pub fn ordinal(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ClassificationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a file is indexable text
#[derive(Debug, Clone)]
pub struct ContentClassifier {
    max_file_size: u64,
    binary_extensions: HashSet<&'static str>,
}

impl ContentClassifier {
    pub fn new(max_file_size: u64) -> Self {
        Self {
            max_file_size,
            binary_extensions: BINARY_EXTENSIONS.iter().copied().collect(),
        }
    }

    /// Classify a candidate. First match wins: extension denylist, size cap,
    /// then a sniff of the first [`SAMPLE_SIZE`] bytes.
    ///
    /// Any I/O failure while sampling yields `Binary`.
    pub fn classify(&self, candidate: &FileCandidate) -> ClassificationVerdict {
        if self.has_binary_extension(&candidate.absolute_path) {
            return ClassificationVerdict::Binary;
        }

        if candidate.size_bytes > self.max_file_size {
            return ClassificationVerdict::Oversized;
        }

        match read_sample(&candidate.absolute_path) {
            Ok(sample) if looks_binary(&sample) => ClassificationVerdict::Binary,
            Ok(_) => ClassificationVerdict::Eligible,
            Err(_) => ClassificationVerdict::Binary,
        }
    }

    fn has_binary_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.binary_extensions.contains(ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

fn read_sample(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    file.take(SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

/// Null byte anywhere, or too many bytes outside printable ASCII and whitespace.
pub fn looks_binary(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    if sample.len() < MIN_RATIO_SAMPLE {
        return false;
    }

    let non_text = sample.iter().filter(|&&b| !(9..=126).contains(&b)).count();
    non_text as f64 / sample.len() as f64 > MAX_NON_TEXT_RATIO
}
