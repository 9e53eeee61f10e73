//! Print an assembled HTML document to PDF.
//!
//! ```text
//! launch ─▶ load ─▶ network quiet ─▶ fonts ─▶ images ─▶ diagrams ─▶ settle ─▶ print (×3)
//! ```
//!
//! Each wait is bounded and only logs when it gives up; the load itself and
//! the final print are the only steps whose failure fails the document.
//! The print is retried with linear backoff (`attempt × base`).

use crate::browser::{BrowserSession, PageHandle, PrintSettings};
use crate::config::{ConversionConfig, PdfOptions, RetryPolicy, Timeouts};
use crate::error::MdPressError;
use crate::pipeline::diagram::{self, BatchReport};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static LENGTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?|\.\d+)\s*(mm|cm|in|px|pt|pc)?\s*$").unwrap());

/// Footer used when page numbers are requested without a footer template.
pub const DEFAULT_FOOTER: &str = "<div style=\"width: 100%; font-size: 9px; text-align: center; color: #666;\"><span class=\"pageNumber\"></span> / <span class=\"totalPages\"></span></div>";

/// Header used when header/footer display is on without a header template.
pub const EMPTY_TEMPLATE: &str = "<div></div>";

/// Result of a successful print.
#[derive(Debug, Clone)]
pub struct PdfRender {
    pub bytes: Vec<u8>,
    /// Print attempts used, at least 1.
    pub attempts: u32,
    pub diagrams: BatchReport,
}

/// What the retry loop did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub attempts: u32,
    /// Delays slept between attempts, in order.
    pub delays: Vec<Duration>,
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached, sleeping
/// `attempt × base` after each failure. `op` receives the 1-based attempt.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    mut op: impl FnMut(u32) -> Result<T, MdPressError>,
    mut sleep: impl FnMut(Duration),
) -> (Result<T, MdPressError>, RetryReport) {
    let max = policy.max_attempts.max(1);
    let mut report = RetryReport::default();
    let mut attempt = 1;
    loop {
        report.attempts = attempt;
        match op(attempt) {
            Ok(v) => return (Ok(v), report),
            Err(e) if attempt >= max => return (Err(e), report),
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {}ms",
                    attempt,
                    max,
                    e,
                    delay.as_millis()
                );
                report.delays.push(delay);
                sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// Convert a CSS length to inches. Bare numbers are pixels.
pub fn length_to_inches(value: &str) -> Option<f64> {
    let caps = LENGTH_RE.captures(value)?;
    let n: f64 = caps[1].parse().ok()?;
    let inches = match caps.get(2).map(|m| m.as_str()) {
        Some("mm") => n / 25.4,
        Some("cm") => n / 2.54,
        Some("in") => n,
        Some("pt") => n / 72.0,
        Some("pc") => n / 6.0,
        _ => n / 96.0,
    };
    Some(inches)
}

/// Browser print settings for `pdf`.
///
/// The paper size is always given in portrait; the `landscape` flag makes
/// the browser rotate it.
pub fn print_settings(pdf: &PdfOptions) -> PrintSettings {
    let (mut width, mut height) = pdf.format.size_inches();
    if let (Some(w), Some(h)) = (&pdf.width, &pdf.height) {
        match (length_to_inches(w), length_to_inches(h)) {
            (Some(w), Some(h)) => {
                width = w;
                height = h;
            }
            _ => warn!("Unsupported paper size {} x {}; using {}", w, h, pdf.format),
        }
    }

    let header = pdf.header_template.clone();
    let mut footer = pdf.footer_template.clone();
    if footer.is_none() && pdf.page_numbers {
        footer = Some(DEFAULT_FOOTER.to_string());
    }
    let display = pdf.display_header_footer || header.is_some() || footer.is_some();

    let (header, footer) = if display {
        (
            Some(header.unwrap_or_else(|| EMPTY_TEMPLATE.to_string())),
            Some(footer.unwrap_or_else(|| EMPTY_TEMPLATE.to_string())),
        )
    } else {
        (None, None)
    };

    PrintSettings {
        paper_width_in: width,
        paper_height_in: height,
        landscape: pdf.orientation.is_landscape(),
        print_background: pdf.print_background,
        scale: pdf.scale,
        page_ranges: pdf.page_ranges.clone().filter(|r| !r.trim().is_empty()),
        display_header_footer: display,
        header_template: header,
        footer_template: footer,
    }
}

// ── Waits ────────────────────────────────────────────────────────────────

fn network_quiet_script(t: &Timeouts) -> String {
    format!(
        r#"new Promise(resolve => {{
  const started = Date.now();
  let count = performance.getEntriesByType('resource').length;
  let changed = Date.now();
  const tick = () => {{
    const now = performance.getEntriesByType('resource').length;
    if (now !== count) {{ count = now; changed = Date.now(); }}
    if (Date.now() - changed >= {window}) return resolve(true);
    if (Date.now() - started >= {limit}) return resolve(false);
    setTimeout(tick, 50);
  }};
  tick();
}})"#,
        window = t.network_quiet_window_ms,
        limit = t.network_idle_ms,
    )
}

const FONTS_SCRIPT: &str = "document.fonts ? document.fonts.ready.then(() => true) : true";

fn images_script(limit_ms: u64) -> String {
    format!(
        r#"Promise.race([
  Promise.all(Array.from(document.images).map(img => img.complete ? true :
    new Promise(resolve => {{
      img.addEventListener('load', () => resolve(true), {{ once: true }});
      img.addEventListener('error', () => resolve(false), {{ once: true }});
    }}))).then(() => true),
  new Promise(resolve => setTimeout(() => resolve(false), {limit_ms}))
])"#
    )
}

fn settle_script(settle_ms: u64) -> String {
    format!(
        "new Promise(resolve => requestAnimationFrame(() => setTimeout(() => resolve(true), {settle_ms})))"
    )
}

/// Evaluate a readiness script; `false` or an error only logs.
fn wait_for(page: &mut dyn PageHandle, what: &str, script: &str) {
    let started = Instant::now();
    match page.evaluate(script, true) {
        Ok(serde_json::Value::Bool(false)) => {
            warn!("Gave up waiting for {} after {}ms", what, started.elapsed().as_millis())
        }
        Ok(_) => debug!("{} ready in {}ms", what, started.elapsed().as_millis()),
        Err(e) => warn!("Waiting for {} failed: {}", what, e),
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Load `html` into `page`, bring it to a printable state and print it.
///
/// `sleep` is used for retry backoff.
pub fn render_on_page(
    page: &mut dyn PageHandle,
    html: &str,
    config: &ConversionConfig,
    sleep: impl FnMut(Duration),
) -> Result<PdfRender, MdPressError> {
    let t = &config.timeouts;

    page.load_html(html)?;
    wait_for(page, "network quiet", &network_quiet_script(t));
    wait_for(page, "web fonts", FONTS_SCRIPT);
    wait_for(page, "images", &images_script(t.load_ms));

    let diagrams = diagram::render_placeholders(page, &config.diagram);
    if diagrams.failed > 0 {
        warn!("{} diagram(s) failed and were replaced by error blocks", diagrams.failed);
    }

    wait_for(page, "layout to settle", &settle_script(t.settle_ms));

    let settings = print_settings(&config.pdf);
    let (result, report) = with_retry(&config.retry, |_| page.print_pdf(&settings), sleep);
    match result {
        Ok(bytes) => {
            info!("Printed PDF: {} bytes in {} attempt(s)", bytes.len(), report.attempts);
            Ok(PdfRender {
                bytes,
                attempts: report.attempts,
                diagrams,
            })
        }
        Err(e) => Err(MdPressError::PdfRender {
            attempts: report.attempts,
            message: e.to_string(),
        }),
    }
}

/// Launch a browser, print `html`, and tear everything down.
pub async fn render_pdf(html: String, config: &ConversionConfig) -> Result<PdfRender, MdPressError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || render_pdf_blocking(&html, &config))
        .await
        .map_err(|e| MdPressError::Internal(format!("PDF task panicked: {}", e)))?
}

fn render_pdf_blocking(html: &str, config: &ConversionConfig) -> Result<PdfRender, MdPressError> {
    let timeout = Duration::from_millis(config.timeouts.load_ms);
    let mut session = BrowserSession::launch(!config.debug, timeout)?;

    let result = session.new_page().and_then(|mut page| {
        let rendered = render_on_page(&mut page, html, config, std::thread::sleep);
        if let Err(e) = page.close() {
            warn!("Closing page failed: {}", e);
        }
        rendered
    });

    session.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::MockPage;
    use crate::config::{Orientation, PageFormat};

    fn fast_config() -> ConversionConfig {
        ConversionConfig::builder()
            .retry_base_delay_ms(100)
            .build()
            .unwrap()
    }

    #[test]
    fn retry_succeeds_on_third_attempt_with_growing_delays() {
        let policy = RetryPolicy { max_attempts: 3, base_delay_ms: 100 };
        let mut slept = Vec::new();
        let (result, report) = with_retry(
            &policy,
            |attempt| {
                if attempt < 3 {
                    Err(MdPressError::from_browser("transient"))
                } else {
                    Ok(attempt)
                }
            },
            |d| slept.push(d),
        );
        assert_eq!(result.unwrap(), 3);
        assert_eq!(report.attempts, 3);
        assert_eq!(slept, vec![Duration::from_millis(100), Duration::from_millis(200)]);
        assert_eq!(report.delays, slept);
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let (result, report) = with_retry(
            &policy,
            |_| -> Result<(), MdPressError> {
                calls += 1;
                Err(MdPressError::from_browser("boom"))
            },
            |_| {},
        );
        assert!(result.is_err());
        assert_eq!(calls, 3);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.delays.len(), 2);
    }

    #[test]
    fn lengths_convert_to_inches() {
        assert_eq!(length_to_inches("1in"), Some(1.0));
        assert_eq!(length_to_inches("25.4mm"), Some(1.0));
        assert_eq!(length_to_inches("96px"), Some(1.0));
        assert_eq!(length_to_inches("72pt"), Some(1.0));
        assert_eq!(length_to_inches("96"), Some(1.0));
        assert_eq!(length_to_inches("1em"), None);
    }

    #[test]
    fn settings_use_format_and_orientation() {
        let pdf = PdfOptions {
            format: PageFormat::Letter,
            orientation: Orientation::Landscape,
            ..PdfOptions::default()
        };
        let s = print_settings(&pdf);
        assert_eq!((s.paper_width_in, s.paper_height_in), (8.5, 11.0));
        assert!(s.landscape);
        assert!(!s.display_header_footer);
        assert!(s.header_template.is_none());
    }

    #[test]
    fn explicit_paper_size_wins() {
        let pdf = PdfOptions {
            width: Some("100mm".into()),
            height: Some("2in".into()),
            ..PdfOptions::default()
        };
        let s = print_settings(&pdf);
        assert!((s.paper_width_in - 100.0 / 25.4).abs() < 1e-9);
        assert_eq!(s.paper_height_in, 2.0);
    }

    #[test]
    fn page_numbers_synthesize_footer_and_empty_header() {
        let pdf = PdfOptions {
            page_numbers: true,
            ..PdfOptions::default()
        };
        let s = print_settings(&pdf);
        assert!(s.display_header_footer);
        assert_eq!(s.footer_template.as_deref(), Some(DEFAULT_FOOTER));
        assert_eq!(s.header_template.as_deref(), Some(EMPTY_TEMPLATE));
    }

    #[test]
    fn explicit_footer_is_kept() {
        let pdf = PdfOptions {
            page_numbers: true,
            footer_template: Some("<div>f</div>".into()),
            ..PdfOptions::default()
        };
        assert_eq!(print_settings(&pdf).footer_template.as_deref(), Some("<div>f</div>"));
    }

    #[test]
    fn display_flag_alone_gets_empty_templates() {
        let pdf = PdfOptions {
            display_header_footer: true,
            ..PdfOptions::default()
        };
        let s = print_settings(&pdf);
        assert_eq!(s.header_template.as_deref(), Some(EMPTY_TEMPLATE));
        assert_eq!(s.footer_template.as_deref(), Some(EMPTY_TEMPLATE));
    }

    #[test]
    fn page_runs_waits_then_prints() {
        let mut page = MockPage::new();
        let out = render_on_page(&mut page, "<html></html>", &fast_config(), |_| {}).unwrap();
        assert_eq!(out.attempts, 1);
        assert!(out.bytes.starts_with(b"%PDF"));
        assert_eq!(page.loaded.len(), 1);
        assert!(page.scripts.iter().any(|s| s.contains("document.fonts")));
        assert!(page.scripts.iter().any(|s| s.contains("document.images")));
        assert!(page.scripts.iter().any(|s| s.contains("requestAnimationFrame")));
    }

    #[test]
    fn transient_print_failures_are_retried() {
        let mut page = MockPage::new().print_results(vec![
            Err("Target crashed".into()),
            Err("Target crashed".into()),
            Ok(b"%PDF-1.7".to_vec()),
        ]);
        let mut slept = Vec::new();
        let out = render_on_page(&mut page, "<html></html>", &fast_config(), |d| slept.push(d)).unwrap();
        assert_eq!(out.attempts, 3);
        assert_eq!(page.print_settings.len(), 3);
        assert!(slept[0] < slept[1]);
    }

    #[test]
    fn exhausted_retries_report_attempts() {
        let mut page = MockPage::new().print_results(vec![
            Err("a".into()),
            Err("b".into()),
            Err("c".into()),
        ]);
        let err = render_on_page(&mut page, "<html></html>", &fast_config(), |_| {}).unwrap_err();
        assert!(matches!(err, MdPressError::PdfRender { attempts: 3, .. }), "{err}");
    }

    #[test]
    fn load_failure_is_not_retried() {
        let mut page = MockPage {
            fail_load: true,
            ..MockPage::new()
        };
        let err = render_on_page(&mut page, "<html></html>", &fast_config(), |_| {}).unwrap_err();
        assert!(matches!(err, MdPressError::HtmlRender(_)));
        assert!(page.print_settings.is_empty());
    }
}
