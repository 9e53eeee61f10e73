//! Conversion results and statistics.

use crate::error::{ErrorKind, MdPressError};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

static PAGE_OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Type\s*/Page[^s]").unwrap());

/// Estimate the page count by scanning for page objects.
///
/// A byte-level heuristic, not a read of the page tree; compressed object
/// streams can hide pages. Never returns less than 1 for non-empty input.
pub fn estimate_page_count(pdf: &[u8]) -> usize {
    if pdf.is_empty() {
        return 0;
    }
    PAGE_OBJECT_RE.find_iter(pdf).count().max(1)
}

/// Statistics for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Wall-clock time from read to write.
    pub duration_ms: u64,
    /// Size of the PDF in bytes.
    pub byte_size: usize,
    pub page_count: usize,
    /// Print attempts used.
    pub attempts: u32,
    pub diagrams_rendered: usize,
    pub diagrams_failed: usize,
}

/// A rendered document held in memory.
#[derive(Debug, Clone)]
pub struct RenderArtifact {
    pub pdf: Vec<u8>,
    /// The assembled HTML the PDF was printed from.
    pub html: String,
    pub title: Option<String>,
    pub stats: ConversionStats,
}

impl RenderArtifact {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.stats.duration_ms)
    }
}

/// Why a document failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl ConversionFailure {
    /// See [`MdPressError::is_fatal`].
    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::BrowserLaunch
    }
}

impl From<&MdPressError> for ConversionFailure {
    fn from(e: &MdPressError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Outcome for one input file. Failures are values, not errors, so a batch
/// always yields one result per input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub input: PathBuf,
    /// Written PDF, when conversion succeeded.
    pub output: Option<PathBuf>,
    /// Sibling HTML file, when requested and written.
    pub html_output: Option<PathBuf>,
    pub stats: ConversionStats,
    pub error: Option<ConversionFailure>,
}

impl ConversionResult {
    pub fn success(input: PathBuf, output: PathBuf, html_output: Option<PathBuf>, stats: ConversionStats) -> Self {
        Self {
            input,
            output: Some(output),
            html_output,
            stats,
            error: None,
        }
    }

    pub fn failure(input: PathBuf, error: &MdPressError, duration: Duration) -> Self {
        Self {
            input,
            output: None,
            html_output: None,
            stats: ConversionStats {
                duration_ms: duration.as_millis() as u64,
                ..ConversionStats::default()
            },
            error: Some(ConversionFailure::from(error)),
        }
    }

    /// A file that was not attempted because an earlier one failed fatally.
    pub fn skipped(input: PathBuf, failure: ConversionFailure) -> Self {
        Self {
            input,
            output: None,
            html_output: None,
            stats: ConversionStats::default(),
            error: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Format a byte count for humans: `512 B`, `12.3 KB`, `1.5 MB`.
pub fn human_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_ignores_pages_tree() {
        let pdf = b"%PDF-1.4\n1 0 obj << /Type /Pages /Count 2 >>\n2 0 obj << /Type /Page >>\n3 0 obj << /Type/Page\n>>";
        assert_eq!(estimate_page_count(pdf), 2);
    }

    #[test]
    fn page_count_floor() {
        assert_eq!(estimate_page_count(b"%PDF-1.7 compressed"), 1);
        assert_eq!(estimate_page_count(b""), 0);
    }

    #[test]
    fn failure_carries_kind() {
        let err = MdPressError::FileNotFound { path: "a.md".into() };
        let r = ConversionResult::failure("a.md".into(), &err, Duration::from_millis(5));
        assert!(!r.is_success());
        assert_eq!(r.error.as_ref().unwrap().kind, ErrorKind::FileNotFound);
        assert_eq!(r.stats.duration_ms, 5);
    }

    #[test]
    fn sizes() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }
}
