//! End-to-end integration tests for mdpress.
//!
//! These tests launch a real Chrome/Chromium. They are gated behind the
//! `MDPRESS_E2E` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   MDPRESS_E2E=1 cargo test --test e2e -- --nocapture
//!
//! Point at a specific browser with `MDPRESS_CHROME_PATH=/path/to/chrome`.

use mdpress::{
    convert_file, convert_files, convert_string, generate_html, ConversionConfig, DiagramOptions,
    DiagramRenderer, ErrorKind,
};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("MDPRESS_E2E").is_err() {
            println!("SKIP — set MDPRESS_E2E=1 to run e2e tests");
            return;
        }
    }};
}

fn assert_pdf(bytes: &[u8], context: &str) {
    assert!(!bytes.is_empty(), "[{context}] PDF is empty");
    assert!(
        bytes.starts_with(b"%PDF-"),
        "[{context}] output does not start with a PDF header"
    );
}

/// A diagram library URL that cannot load, so every diagram fails fast.
fn broken_diagram_config() -> ConversionConfig {
    ConversionConfig::builder()
        .diagram_library_url("file:///nonexistent/mermaid.min.js")
        .diagram_timeout_ms(2_000)
        .build()
        .unwrap()
}

// ── In-memory conversion ─────────────────────────────────────────────────────

#[test]
fn test_hello_world_pdf() {
    e2e_skip_unless_enabled!();
    let artifact = tokio_test::block_on(convert_string(
        "# Hello\n\nWorld",
        &ConversionConfig::default(),
    ))
    .expect("conversion failed");

    assert_pdf(&artifact.pdf, "hello");
    assert!(artifact.html.contains("<h1"));
    assert!(artifact.html.contains("<p>World</p>"));
    assert!(artifact.stats.page_count >= 1);
    assert!(artifact.stats.attempts >= 1 && artifact.stats.attempts <= 3);
}

#[tokio::test]
async fn test_rich_document() {
    e2e_skip_unless_enabled!();
    let md = r#"---
title: Rich
theme: github-dark
pdf:
  format: A5
  landscape: true
---
[[toc]]

# Intro :rocket:

Inline $E = mc^2$ and a table:

| a | b |
|---|---|
| 1 | 2 |

::: warning Careful
A callout.
:::

```rust
fn main() {}
```

- [x] done
- [ ] todo

Footnote.[^1]

[^1]: The note.
"#;
    let config = ConversionConfig::builder().toc(true).build().unwrap();
    let artifact = convert_string(md, &config).await.expect("conversion failed");
    assert_pdf(&artifact.pdf, "rich");
    assert_eq!(artifact.title.as_deref(), Some("Rich"));
    assert!(artifact.html.contains("<math"));
    assert!(artifact.html.contains("custom-container warning"));
    assert!(artifact.html.contains("class=\"table-of-contents\""));
}

// ── Diagrams ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_diagram_failure_still_produces_pdf() {
    e2e_skip_unless_enabled!();
    let md = "# D\n\n```mermaid\ngraph LR\nA-->B\n```\n";
    let artifact = convert_string(md, &broken_diagram_config())
        .await
        .expect("diagram failure must not fail the document");
    assert_pdf(&artifact.pdf, "diagram-failure");
    assert_eq!(artifact.stats.diagrams_rendered, 0);
}

#[tokio::test]
async fn test_standalone_renderer_close_and_relaunch() {
    e2e_skip_unless_enabled!();
    let renderer = DiagramRenderer::launch(DiagramOptions::default())
        .await
        .expect("launch failed");
    assert!(renderer.is_open());

    renderer.close();
    renderer.close();
    assert!(!renderer.is_open());
    let html = renderer.render("graph LR\nA-->B").await;
    assert!(html.contains("mermaid-error"), "closed renderer must return an error block");

    renderer.relaunch().await.expect("relaunch failed");
    assert!(renderer.is_open());
}

// ── Files ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_file_conversion_with_html_and_image() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    // 1×1 transparent GIF
    let gif: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\x00\x00\x00\xff\xff\xff!\xf9\x04\x01\x00\x00\x00\x00,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";
    std::fs::write(dir.path().join("dot.gif"), gif).unwrap();
    let input = dir.path().join("doc.md");
    std::fs::write(&input, "# Doc\n\n![dot](dot.gif)\n").unwrap();

    let config = ConversionConfig::builder().html_output(true).build().unwrap();
    let result = convert_file(&input, None, &config).await;
    assert!(result.is_success(), "{:?}", result.error);

    let pdf = std::fs::read(dir.path().join("doc.pdf")).unwrap();
    assert_pdf(&pdf, "file");
    let html = std::fs::read_to_string(dir.path().join("doc.html")).unwrap();
    assert!(html.contains("data:image/gif;base64,"));
}

#[tokio::test]
async fn test_batch_isolates_missing_file() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.md");
    std::fs::write(&good, "# Good\n").unwrap();
    let inputs = vec![PathBuf::from("/no/such/file.md"), good];
    let out = dir.path().join("out");

    let results = convert_files(&inputs, Some(&out), &ConversionConfig::default()).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].error.as_ref().unwrap().kind, ErrorKind::FileNotFound);
    assert!(results[1].is_success());
    assert!(out.join("good.pdf").exists());
}

// ── No browser needed ────────────────────────────────────────────────────────

#[test]
fn test_generate_html_is_standalone() {
    let html = generate_html("# Hello\n\nWorld", None, &ConversionConfig::default());
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<h1"));
    assert!(!html.contains("<link rel=\"stylesheet\""));
}
