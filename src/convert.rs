//! Conversion entry points.
//!
//! ```text
//! text ─▶ front matter ─▶ markdown ─▶ assemble ─▶ browser (diagrams, print) ─▶ PDF
//! ```
//!
//! [`convert_string`] works in memory and returns errors; the file APIs turn
//! every per-document error into a failed [`ConversionResult`] so a batch
//! never stops early, except when no browser can be launched at all.

use crate::config::ConversionConfig;
use crate::error::MdPressError;
use crate::output::{estimate_page_count, ConversionResult, ConversionStats, RenderArtifact};
use crate::pipeline::markdown::{self, ParsedMarkdown};
use crate::pipeline::{assemble, input, pdf};
use crate::progress::{ConversionProgressCallback, NoopProgressCallback};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parse Markdown (front matter included) into an HTML fragment.
pub fn parse_markdown(text: &str, config: &ConversionConfig) -> ParsedMarkdown {
    markdown::parse_markdown(text, config)
}

/// Render Markdown to a complete, self-contained HTML document.
///
/// Local images are resolved against `base_path` (or the configured base
/// path, or the current directory).
pub fn generate_html(text: &str, base_path: Option<&Path>, config: &ConversionConfig) -> String {
    let mut config = config.clone();
    if let Some(base) = base_path {
        config.base_path = Some(base.to_path_buf());
    }
    let parsed = markdown::parse_markdown(text, &config);
    assemble_parsed(&parsed)
}

fn assemble_parsed(parsed: &ParsedMarkdown) -> String {
    let title = parsed.front_matter.title();
    assemble::assemble(&parsed.fragment.html, title.as_deref(), &parsed.config)
}

/// A parsed and assembled document, ready to print.
struct Prepared {
    parsed: ParsedMarkdown,
    html: String,
}

fn prepare(text: &str, config: &ConversionConfig) -> Prepared {
    let parsed = markdown::parse_markdown(text, config);
    debug!(
        "Parsed: {} heading(s), {} diagram(s)",
        parsed.fragment.headings.len(),
        parsed.fragment.diagrams.len()
    );
    let html = assemble_parsed(&parsed);
    Prepared { parsed, html }
}

async fn print(prepared: Prepared, start: Instant) -> Result<RenderArtifact, MdPressError> {
    let Prepared { parsed, html } = prepared;
    let rendered = pdf::render_pdf(html.clone(), &parsed.config).await?;

    let stats = ConversionStats {
        duration_ms: start.elapsed().as_millis() as u64,
        byte_size: rendered.bytes.len(),
        page_count: estimate_page_count(&rendered.bytes),
        attempts: rendered.attempts,
        diagrams_rendered: rendered.diagrams.rendered,
        diagrams_failed: rendered.diagrams.failed,
    };
    Ok(RenderArtifact {
        pdf: rendered.bytes,
        html,
        title: parsed.front_matter.title(),
        stats,
    })
}

/// Convert Markdown text to PDF in memory.
///
/// # Errors
/// Browser launch, page load and print failures (after retries). Markdown,
/// math and diagram problems never fail a conversion.
pub async fn convert_string(
    text: &str,
    config: &ConversionConfig,
) -> Result<RenderArtifact, MdPressError> {
    let start = Instant::now();
    print(prepare(text, config), start).await
}

/// Convert one file and write the PDF (and optional HTML) next to it, or
/// to `output`. The HTML is written before printing, so it survives a
/// failed print.
pub async fn convert_file(
    input_path: &Path,
    output: Option<&Path>,
    config: &ConversionConfig,
) -> ConversionResult {
    let start = Instant::now();
    let out_path = input::output_path_for(input_path, output, None);
    match convert_file_inner(input_path, &out_path, config).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Failed to convert {}: {}", input_path.display(), e);
            ConversionResult::failure(input_path.to_path_buf(), &e, start.elapsed())
        }
    }
}

async fn convert_file_inner(
    input_path: &Path,
    out_path: &Path,
    config: &ConversionConfig,
) -> Result<ConversionResult, MdPressError> {
    convert_file_with(input_path, out_path, config, print).await
}

async fn convert_file_with<P, F>(
    input_path: &Path,
    out_path: &Path,
    config: &ConversionConfig,
    print: P,
) -> Result<ConversionResult, MdPressError>
where
    P: FnOnce(Prepared, Instant) -> F,
    F: Future<Output = Result<RenderArtifact, MdPressError>>,
{
    let start = Instant::now();
    info!("Converting {}", input_path.display());

    let text = input::read_document(input_path).await?;

    let mut config = config.clone();
    if config.base_path.is_none() {
        config.base_path = input_path
            .parent()
            .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
            .map(Path::to_path_buf);
    }

    let prepared = prepare(&text, &config);
    let html_path = if config.html_output {
        let path = out_path.with_extension("html");
        input::write_output(&path, prepared.html.as_bytes()).await?;
        Some(path)
    } else {
        None
    };

    let artifact = print(prepared, start).await?;
    input::write_output(out_path, &artifact.pdf).await?;

    let stats = ConversionStats {
        duration_ms: start.elapsed().as_millis() as u64,
        ..artifact.stats
    };
    info!(
        "Wrote {} ({} bytes, {} page(s), {}ms)",
        out_path.display(),
        stats.byte_size,
        stats.page_count,
        stats.duration_ms
    );
    Ok(ConversionResult::success(
        input_path.to_path_buf(),
        out_path.to_path_buf(),
        html_path,
        stats,
    ))
}

/// Convert files one after another. Outputs go to `output_dir` when given,
/// else next to each input.
pub async fn convert_files(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    config: &ConversionConfig,
) -> Vec<ConversionResult> {
    convert_files_with_progress(inputs, output_dir, config, &NoopProgressCallback).await
}

/// [`convert_files`] with progress events.
///
/// A failed browser launch stops the batch: the remaining inputs are
/// reported with the same error without being attempted.
pub async fn convert_files_with_progress(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    config: &ConversionConfig,
    progress: &dyn ConversionProgressCallback,
) -> Vec<ConversionResult> {
    let total = inputs.len();
    progress.on_batch_start(total);

    let mut results = Vec::with_capacity(total);
    let mut fatal: Option<MdPressError> = None;

    for (i, path) in inputs.iter().enumerate() {
        if let Some(ref e) = fatal {
            progress.on_file_error(path, &e.to_string());
            results.push(ConversionResult::failure(path.clone(), e, Default::default()));
            continue;
        }

        progress.on_file_start(path, i + 1, total);
        let start = Instant::now();
        let out_path = input::output_path_for(path, None, output_dir);

        let result = match convert_file_inner(path, &out_path, config).await {
            Ok(r) => {
                progress.on_file_complete(&r);
                r
            }
            Err(e) => {
                warn!("Failed to convert {}: {}", path.display(), e);
                progress.on_file_error(path, &e.to_string());
                let r = ConversionResult::failure(path.clone(), &e, start.elapsed());
                if e.is_fatal() {
                    fatal = Some(e);
                }
                r
            }
        };
        results.push(result);
    }

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    info!("Batch complete: {}/{} succeeded", succeeded, total);
    progress.on_batch_complete(total, succeeded);
    results
}

/// Synchronous wrapper around [`convert_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_path: &Path,
    output: Option<&Path>,
    config: &ConversionConfig,
) -> ConversionResult {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(convert_file(input_path, output, config)),
        Err(e) => ConversionResult::failure(
            input_path.to_path_buf(),
            &MdPressError::Internal(format!("Failed to create tokio runtime: {}", e)),
            Default::default(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Mutex;

    #[test]
    fn html_document_for_hello_world() {
        let html = generate_html("# Hello\n\nWorld", None, &ConversionConfig::default());
        assert!(html.contains("<h1 id=\"hello\">Hello</h1>"));
        assert!(html.contains("<p>World</p>"));
        assert!(html.contains("<title>Document</title>"));
    }

    #[test]
    fn front_matter_title_and_theme_reach_the_document() {
        let html = generate_html(
            "---\ntitle: Report <1>\ntheme: github-dark\n---\nBody\n",
            None,
            &ConversionConfig::default(),
        );
        assert!(html.contains("<title>Report &lt;1&gt;</title>"));
        assert!(html.contains("/* github-dark */"));
        assert!(html.contains("frontmatter-table"));
    }

    #[test]
    fn images_resolve_against_base_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pic.gif"), b"GIF89a").unwrap();
        let html = generate_html("![p](pic.gif)", Some(dir.path()), &ConversionConfig::default());
        assert!(html.contains("src=\"data:image/gif;base64,"), "{html}");
    }

    #[tokio::test]
    async fn missing_file_is_a_failed_result() {
        let r = convert_file(Path::new("/no/such/doc.md"), None, &ConversionConfig::default()).await;
        assert!(!r.is_success());
        assert_eq!(r.error.unwrap().kind, ErrorKind::FileNotFound);
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_batch_start(&self, total: usize) {
            self.events.lock().unwrap().push(format!("start {total}"));
        }
        fn on_file_error(&self, path: &Path, _message: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("error {}", path.file_name().unwrap().to_string_lossy()));
        }
        fn on_batch_complete(&self, total: usize, ok: usize) {
            self.events.lock().unwrap().push(format!("done {ok}/{total}"));
        }
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let inputs = vec![PathBuf::from("/no/a.md"), PathBuf::from("/no/b.md")];
        let rec = Recorder::default();
        let results =
            convert_files_with_progress(&inputs, None, &ConversionConfig::default(), &rec).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.is_success()));
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["start 2", "error a.md", "error b.md", "done 0/2"]
        );
    }

    #[tokio::test]
    async fn html_is_written_even_when_printing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.md");
        std::fs::write(&input, "# Notes\n").unwrap();
        let out = dir.path().join("notes.pdf");
        let config = ConversionConfig::builder().html_output(true).build().unwrap();

        let err = convert_file_with(&input, &out, &config, |_, _| async {
            Err(MdPressError::BrowserLaunch("no chrome".into()))
        })
        .await
        .unwrap_err();

        assert!(err.is_fatal());
        let html = std::fs::read_to_string(dir.path().join("notes.html")).unwrap();
        assert!(html.contains("<h1 id=\"notes\">Notes</h1>"));
        assert!(!out.exists());
    }

    #[test]
    fn sync_wrapper_reports_failures() {
        let r = convert_sync(Path::new("/no/such.md"), None, &ConversionConfig::default());
        assert!(!r.is_success());
    }
}
