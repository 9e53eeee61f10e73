//! # mdpress
//!
//! Convert Markdown documents to print-ready PDF (and standalone HTML)
//! through a headless Chrome.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Input     file, directory, wildcard, or an in-memory string
//!  ├─ 2. Front     YAML front matter → metadata table + config overrides
//!  ├─ 3. Parse     CommonMark + tables, footnotes, math, emoji, attributes
//!  ├─ 4. Assemble  themed, self-contained HTML with embedded images
//!  ├─ 5. Diagrams  Mermaid blocks rendered to SVG inside the page
//!  └─ 6. Print     wait for the page to settle, print with retry
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdpress::{convert_string, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder().toc(true).build()?;
//!     let artifact = convert_string("# Hello\n\nWorld", &config).await?;
//!     std::fs::write("hello.pdf", &artifact.pdf)?;
//!     eprintln!("{} page(s) in {}ms", artifact.stats.page_count, artifact.stats.duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! HTML needs no browser:
//!
//! ```rust
//! use mdpress::{generate_html, ConversionConfig};
//!
//! let html = generate_html("# Title", None, &ConversionConfig::default());
//! assert!(html.contains("<h1 id=\"title\">Title</h1>"));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mdpress` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## Browser
//!
//! A Chrome or Chromium install is required for PDF output. It is found
//! through `MDPRESS_CHROME_PATH`, then the usual install locations.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod browser;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod themes;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, DiagramOptions, DiagramTheme, HighlightTheme,
    Margins, Orientation, PageFormat, PdfOptions, RetryPolicy, Theme, ThemeOptions, Timeouts,
};
pub use convert::{
    convert_file, convert_files, convert_files_with_progress, convert_string, convert_sync,
    generate_html, parse_markdown,
};
pub use error::{ErrorKind, MdPressError, Result};
pub use output::{ConversionFailure, ConversionResult, ConversionStats, RenderArtifact};
pub use pipeline::diagram::DiagramRenderer;
pub use pipeline::input::{output_path_for, resolve_inputs};
pub use pipeline::markdown::ParsedMarkdown;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, ResultStream};
pub use themes::available_themes;
