//! Error types for the mdpress library.
//!
//! Two layers:
//!
//! * [`MdPressError`]: the failures that escape a stage. Each variant knows
//!   its [`ErrorKind`] at the point of origin, exposed by
//!   [`MdPressError::kind`].
//!
//! * [`ErrorKind`]: the flat category stored in a failed
//!   [`crate::output::ConversionResult`], so batch callers can tell a missing
//!   input from a browser problem without matching on the full enum.
//!
//! Extension-layer and diagram failures never show up here; they degrade to
//! visible markup inside the document instead.

use std::path::PathBuf;
use thiserror::Error;

/// Flat error category reported for a failed conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    FileNotFound,
    FileRead,
    FileWrite,
    InvalidInput,
    Parse,
    DiagramRender,
    HtmlRender,
    PdfRender,
    BrowserLaunch,
    Theme,
    Config,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Guess a category from a free-form message.
    ///
    /// Only used at the `headless_chrome` boundary, whose errors arrive as
    /// untyped `anyhow::Error` values.
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        if m.contains("not found") || m.contains("enoent") {
            ErrorKind::FileNotFound
        } else if m.contains("permission") {
            ErrorKind::FileWrite
        } else if m.contains("mermaid") || m.contains("diagram") {
            ErrorKind::DiagramRender
        } else if m.contains("browser") || m.contains("chrome") {
            ErrorKind::BrowserLaunch
        } else if m.contains("timeout") || m.contains("timed out") {
            ErrorKind::Timeout
        } else {
            ErrorKind::Unknown
        }
    }

    /// Stable upper-case code, e.g. `FILE_NOT_FOUND`.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "FILE_NOT_FOUND",
            ErrorKind::FileRead => "FILE_READ_ERROR",
            ErrorKind::FileWrite => "FILE_WRITE_ERROR",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Parse => "PARSE_ERROR",
            ErrorKind::DiagramRender => "MERMAID_RENDER_ERROR",
            ErrorKind::HtmlRender => "HTML_RENDER_ERROR",
            ErrorKind::PdfRender => "PDF_RENDER_ERROR",
            ErrorKind::BrowserLaunch => "BROWSER_LAUNCH_ERROR",
            ErrorKind::Theme => "THEME_ERROR",
            ErrorKind::Config => "CONFIG_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// All errors returned by the mdpress library.
#[derive(Debug, Error)]
pub enum MdPressError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input pattern or path is unusable (no matches, not Markdown, …).
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Browser errors ────────────────────────────────────────────────────
    /// No usable browser could be started.
    #[error(
        "Failed to launch a headless browser: {0}\n\n\
mdpress drives Chrome or Chromium to produce PDFs. You can:\n\
  • Install Google Chrome or Chromium.\n\
  • Set MDPRESS_CHROME_PATH=/path/to/chrome to use an existing binary.\n"
    )]
    BrowserLaunch(String),

    /// Loading the assembled document into the page failed.
    #[error("HTML render failed: {0}")]
    HtmlRender(String),

    /// Print-to-PDF failed after every retry.
    #[error("PDF render failed after {attempts} attempt(s): {message}")]
    PdfRender { attempts: u32, message: String },

    /// A standalone diagram render failed at the browser level.
    #[error("Diagram render failed: {0}")]
    DiagramRender(String),

    /// A bounded wait elapsed.
    #[error("Timed out after {ms}ms while {during}")]
    Timeout { during: String, ms: u64 },

    /// A browser error whose category is only known from its message.
    #[error("{message}")]
    Browser { kind: ErrorKind, message: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A theme could not be resolved or generated.
    #[error("Theme error: {0}")]
    Theme(String),

    /// Front matter or an option value could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MdPressError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MdPressError::FileNotFound { .. } => ErrorKind::FileNotFound,
            MdPressError::FileRead { .. } => ErrorKind::FileRead,
            MdPressError::InvalidInput { .. } => ErrorKind::InvalidInput,
            MdPressError::FileWrite { .. } => ErrorKind::FileWrite,
            MdPressError::BrowserLaunch(_) => ErrorKind::BrowserLaunch,
            MdPressError::HtmlRender(_) => ErrorKind::HtmlRender,
            MdPressError::PdfRender { .. } => ErrorKind::PdfRender,
            MdPressError::DiagramRender(_) => ErrorKind::DiagramRender,
            MdPressError::Timeout { .. } => ErrorKind::Timeout,
            MdPressError::Browser { kind, .. } => *kind,
            MdPressError::InvalidConfig(_) => ErrorKind::Config,
            MdPressError::Theme(_) => ErrorKind::Theme,
            MdPressError::Parse(_) => ErrorKind::Parse,
            MdPressError::Internal(_) => ErrorKind::Unknown,
        }
    }

    /// Wrap an untyped browser error, classifying it by message.
    pub fn from_browser(err: impl std::fmt::Display) -> Self {
        let message = err.to_string();
        MdPressError::Browser {
            kind: ErrorKind::classify(&message),
            message,
        }
    }

    /// Whether the whole batch should stop: without a browser nothing else
    /// can succeed either.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MdPressError::BrowserLaunch(_))
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MdPressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_substring() {
        assert_eq!(ErrorKind::classify("ENOENT: no such file"), ErrorKind::FileNotFound);
        assert_eq!(ErrorKind::classify("Permission denied"), ErrorKind::FileWrite);
        assert_eq!(ErrorKind::classify("Mermaid parse error"), ErrorKind::DiagramRender);
        assert_eq!(ErrorKind::classify("Chrome exited"), ErrorKind::BrowserLaunch);
        assert_eq!(ErrorKind::classify("navigation timed out"), ErrorKind::Timeout);
        assert_eq!(ErrorKind::classify("something odd"), ErrorKind::Unknown);
    }

    #[test]
    fn classify_prefers_earlier_rules() {
        // "not found" wins over "chrome".
        assert_eq!(ErrorKind::classify("chrome binary not found"), ErrorKind::FileNotFound);
    }

    #[test]
    fn kind_is_known_at_origin() {
        let e = MdPressError::FileNotFound { path: "a.md".into() };
        assert_eq!(e.kind(), ErrorKind::FileNotFound);
        let e = MdPressError::InvalidConfig("scale".into());
        assert_eq!(e.kind(), ErrorKind::Config);
        let e = MdPressError::PdfRender {
            attempts: 3,
            message: "boom".into(),
        };
        assert_eq!(e.kind(), ErrorKind::PdfRender);
        assert!(e.to_string().contains("3 attempt"));
    }

    #[test]
    fn from_browser_classifies() {
        let e = MdPressError::from_browser("Timeout while waiting for event");
        assert_eq!(e.kind(), ErrorKind::Timeout);
        assert!(!e.is_fatal());
        assert!(MdPressError::BrowserLaunch("x".into()).is_fatal());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::DiagramRender.code(), "MERMAID_RENDER_ERROR");
        assert_eq!(ErrorKind::Unknown.to_string(), "UNKNOWN_ERROR");
    }
}
