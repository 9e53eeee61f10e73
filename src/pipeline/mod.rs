//! Pipeline stages for Markdown-to-PDF conversion.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ frontmatter ──▶ markdown ──▶ assemble ──▶ diagram ──▶ pdf
//! (files)    (YAML)        (fragment)   (document)   (in-page)   (print)
//! ```
//!
//! 1. [`input`]: expand files, directories and wildcards; read and write
//! 2. [`frontmatter`]: split the YAML header and render it as a table
//! 3. [`markdown`]: Markdown to an HTML fragment; uses [`scan`] to protect
//!    math, [`attrs`] for `{: …}` blocks, [`anchors`] for heading ids and the
//!    table of contents, [`highlight`] for code and [`math`] for formulas
//! 4. [`assemble`]: a complete document with styles and embedded images
//! 5. [`diagram`]: render Mermaid placeholders inside the loaded page
//! 6. [`pdf`]: wait for the page to settle and print, with retries;
//!    runs in `spawn_blocking` because the browser client is synchronous

pub mod anchors;
pub mod assemble;
pub mod attrs;
pub mod diagram;
pub mod frontmatter;
pub mod highlight;
pub mod input;
pub mod markdown;
pub mod math;
pub mod pdf;
pub mod scan;
