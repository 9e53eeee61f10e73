//! Mermaid diagrams rendered to inline SVG inside a browser page.
//!
//! Two entry points share one render protocol:
//!
//! - [`render_placeholders`] renders every `div.mermaid[data-mermaid]` in a
//!   page that is about to be printed, reusing that page.
//! - [`DiagramRenderer`] owns a long-lived browser and renders isolated
//!   diagrams, one tab per call.
//!
//! Failures never escape: a diagram that cannot be rendered becomes a
//! `<div class="mermaid-error">` block showing the message and the source.

use crate::browser::{BrowserSession, PageHandle};
use crate::config::DiagramOptions;
use crate::error::MdPressError;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

static SVG_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<svg\b[^>]*>").unwrap());
static DIM_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s(width|height|style)\s*=\s*("[^"]*"|'[^']*')"#).unwrap());
static NUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)(?:px)?\s*$").unwrap());

const HOST_PAGE: &str =
    "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"></head><body></body></html>";

/// Bounding box reported by the browser for a rendered diagram.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize)]
struct RenderReply {
    ok: bool,
    #[serde(default)]
    svg: String,
    #[serde(default)]
    bbox: Option<BBox>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "timedOut")]
    timed_out: bool,
}

#[derive(Debug, Deserialize)]
struct Placeholder {
    id: String,
    data: String,
}

/// Counts from one batch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub rendered: usize,
    pub failed: usize,
}

// ── Page protocol ────────────────────────────────────────────────────────

/// Evaluate a script whose result is JSON (a value or a `JSON.stringify`ed string).
fn eval_json<T: DeserializeOwned>(
    page: &mut dyn PageHandle,
    script: &str,
    await_promise: bool,
) -> Result<T, MdPressError> {
    let value = page.evaluate(script, await_promise)?;
    let parsed = match value {
        Value::String(s) => serde_json::from_str(&s),
        other => serde_json::from_value(other),
    };
    parsed.map_err(|e| MdPressError::DiagramRender(format!("unexpected reply from page: {e}")))
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Load the diagram library into the page (once) and initialise it.
pub fn ensure_library(page: &mut dyn PageHandle, opts: &DiagramOptions) -> Result<(), MdPressError> {
    let script = format!(
        r#"(async () => {{
  if (!window.mermaid) {{
    await new Promise((resolve, reject) => {{
      const s = document.createElement('script');
      s.src = {url};
      s.onload = resolve;
      s.onerror = () => reject(new Error('failed to load mermaid from ' + {url}));
      document.head.appendChild(s);
    }});
  }}
  window.mermaid.initialize({{
    startOnLoad: false,
    securityLevel: 'strict',
    theme: {theme},
    themeVariables: {{ fontFamily: {font}, background: {background} }}
  }});
  return JSON.stringify({{ ok: true }});
}})().catch(e => JSON.stringify({{ ok: false, error: String(e && e.message || e) }}))"#,
        url = js_string(&opts.library_url),
        theme = js_string(opts.theme.name()),
        font = js_string(&opts.font_family),
        background = js_string(&opts.background),
    );
    let reply: RenderReply = eval_json(page, &script, true)?;
    if reply.ok {
        debug!("Diagram library ready");
        Ok(())
    } else {
        Err(MdPressError::DiagramRender(
            reply.error.unwrap_or_else(|| "library did not load".into()),
        ))
    }
}

/// Render one diagram on a page where the library is already loaded.
fn render_svg(
    page: &mut dyn PageHandle,
    render_id: &str,
    source: &str,
    opts: &DiagramOptions,
) -> Result<String, MdPressError> {
    let script = format!(
        r#"(async () => {{
  const id = {id};
  const timeout = new Promise((_, reject) =>
    setTimeout(() => reject(Object.assign(new Error('render timed out'), {{ timedOut: true }})), {ms}));
  try {{
    const {{ svg }} = await Promise.race([window.mermaid.render(id, {source}), timeout]);
    const scratch = document.createElement('div');
    scratch.style.cssText = 'position:absolute;left:-10000px;top:0;visibility:hidden';
    scratch.innerHTML = svg;
    document.body.appendChild(scratch);
    const el = scratch.querySelector('svg');
    let bbox = null;
    if (el && el.getBBox) {{
      const b = el.getBBox();
      bbox = {{ x: b.x, y: b.y, width: b.width, height: b.height }};
    }}
    scratch.remove();
    return JSON.stringify({{ ok: true, svg, bbox }});
  }} catch (e) {{
    const stray = document.getElementById('d' + id);
    if (stray) stray.remove();
    return JSON.stringify({{ ok: false, timedOut: !!(e && e.timedOut), error: String(e && e.message || e) }});
  }}
}})()"#,
        id = js_string(render_id),
        ms = opts.timeout_ms,
        source = js_string(source),
    );
    let reply: RenderReply = eval_json(page, &script, true)?;
    match reply {
        RenderReply { ok: true, svg, bbox, .. } if !svg.trim().is_empty() => {
            Ok(normalize_svg(&svg, bbox))
        }
        RenderReply { timed_out: true, .. } => Err(MdPressError::Timeout {
            during: format!("rendering diagram {render_id}"),
            ms: opts.timeout_ms,
        }),
        RenderReply { error, .. } => Err(MdPressError::DiagramRender(
            error.unwrap_or_else(|| "renderer returned no SVG".into()),
        )),
    }
}

/// Render `source` on `page`, returning the container or the error block.
pub fn render_on_page(
    page: &mut dyn PageHandle,
    render_id: &str,
    source: &str,
    opts: &DiagramOptions,
) -> String {
    match render_svg(page, render_id, source, opts) {
        Ok(svg) => format!("<div class=\"mermaid-container\">{svg}</div>"),
        Err(e) => {
            warn!("Diagram {} failed: {}", render_id, e);
            error_block(source, &e.to_string())
        }
    }
}

/// Replace every diagram placeholder in the loaded page with its SVG or
/// an error block.
pub fn render_placeholders(page: &mut dyn PageHandle, opts: &DiagramOptions) -> BatchReport {
    let list_script = "JSON.stringify(Array.from(document.querySelectorAll('div.mermaid[data-mermaid]')).map(e => ({ id: e.id, data: e.dataset.mermaid })))";
    let placeholders: Vec<Placeholder> = match eval_json(page, list_script, false) {
        Ok(list) => list,
        Err(e) => {
            warn!("Could not list diagram placeholders: {}", e);
            return BatchReport::default();
        }
    };
    if placeholders.is_empty() {
        return BatchReport::default();
    }
    info!("Rendering {} diagram(s)", placeholders.len());

    let library = ensure_library(page, opts);
    let mut report = BatchReport::default();

    for (i, ph) in placeholders.iter().enumerate() {
        let source = decode_source(&ph.data);
        let html = match &library {
            Ok(()) => render_on_page(page, &format!("mdpress-svg-{i}"), &source, opts),
            Err(e) => error_block(&source, &e.to_string()),
        };
        if html.starts_with("<div class=\"mermaid-container\">") {
            report.rendered += 1;
        } else {
            report.failed += 1;
        }

        let replace = format!(
            "(() => {{ const el = document.getElementById({id}); if (el) {{ el.outerHTML = {html}; }} return true; }})()",
            id = js_string(&ph.id),
            html = js_string(&html),
        );
        if let Err(e) = page.evaluate(&replace, false) {
            warn!("Could not replace diagram {}: {}", ph.id, e);
        }
    }
    report
}

fn decode_source(data: &str) -> String {
    match base64::engine::general_purpose::STANDARD.decode(data.trim()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("Diagram placeholder is not valid base64: {}", e);
            String::new()
        }
    }
}

/// The visible fallback for a diagram that could not be rendered.
pub fn error_block(source: &str, message: &str) -> String {
    format!(
        "<div class=\"mermaid-error\"><p class=\"error-message\">Diagram render failed: {}</p><pre><code>{}</code></pre></div>",
        html_escape::encode_text(message),
        html_escape::encode_text(source)
    )
}

/// Make a rendered SVG scale with its container: width 100%, no fixed
/// height, and a viewBox so the aspect ratio survives.
pub fn normalize_svg(svg: &str, bbox: Option<BBox>) -> String {
    let Some(open) = SVG_OPEN_RE.find(svg) else {
        return svg.to_string();
    };
    let tag = open.as_str();

    let mut width = None;
    let mut height = None;
    for caps in DIM_ATTR_RE.captures_iter(tag) {
        let value = caps[2].trim_matches(['"', '\'']).to_string();
        match &caps[1] {
            "width" => width = Some(value),
            "height" => height = Some(value),
            _ => {}
        }
    }

    let body = tag.trim_end_matches('>').trim_end_matches('/');
    let mut new_tag = DIM_ATTR_RE.replace_all(body, "").into_owned();

    if !tag.contains("viewBox") {
        let from_attrs = || {
            let w = NUM_RE.captures(width.as_deref()?)?[1].parse::<f64>().ok()?;
            let h = NUM_RE.captures(height.as_deref()?)?[1].parse::<f64>().ok()?;
            Some(BBox { x: 0.0, y: 0.0, width: w, height: h })
        };
        if let Some(b) = bbox.filter(|b| b.width > 0.0 && b.height > 0.0).or_else(from_attrs) {
            new_tag.push_str(&format!(
                " viewBox=\"{} {} {} {}\"",
                fmt_num(b.x),
                fmt_num(b.y),
                fmt_num(b.width),
                fmt_num(b.height)
            ));
        }
    }
    new_tag.push_str(" width=\"100%\" style=\"max-width: 100%; height: auto;\">");

    let mut out = String::with_capacity(svg.len() + 64);
    out.push_str(&svg[..open.start()]);
    out.push_str(&new_tag);
    out.push_str(&svg[open.end()..]);
    out
}

fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v:.2}")
    }
}

// ── Standalone renderer ──────────────────────────────────────────────────

/// A long-lived browser for rendering isolated diagrams.
///
/// `close()` is idempotent; a closed renderer returns error blocks until
/// [`DiagramRenderer::relaunch`] is called.
pub struct DiagramRenderer {
    session: Arc<Mutex<Option<BrowserSession>>>,
    options: DiagramOptions,
    headless: bool,
    counter: AtomicUsize,
}

impl DiagramRenderer {
    /// Launch a headless browser for diagram rendering.
    pub async fn launch(options: DiagramOptions) -> Result<Self, MdPressError> {
        Self::launch_with(options, true).await
    }

    /// Launch with an explicit headless flag (`false` for debugging).
    pub async fn launch_with(options: DiagramOptions, headless: bool) -> Result<Self, MdPressError> {
        let session = start_session(headless, options.timeout_ms).await?;
        Ok(Self {
            session: Arc::new(Mutex::new(Some(session))),
            options,
            headless,
            counter: AtomicUsize::new(0),
        })
    }

    pub fn options(&self) -> &DiagramOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.session
            .lock()
            .map(|s| s.as_ref().is_some_and(BrowserSession::is_open))
            .unwrap_or(false)
    }

    /// Render one diagram to `<div class="mermaid-container">` or an error block.
    pub async fn render(&self, source: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let session = Arc::clone(&self.session);
        let opts = self.options.clone();
        let src = source.to_string();

        let result = tokio::task::spawn_blocking(move || -> Result<String, MdPressError> {
            let guard = session
                .lock()
                .map_err(|_| MdPressError::Internal("diagram renderer lock poisoned".into()))?;
            let browser = guard
                .as_ref()
                .ok_or_else(|| MdPressError::DiagramRender("renderer is closed".into()))?;
            let mut page = browser.new_page()?;
            page.load_html(HOST_PAGE)?;
            let html = match ensure_library(&mut page, &opts) {
                Ok(()) => render_on_page(&mut page, &format!("mdpress-svg-{n}"), &src, &opts),
                Err(e) => error_block(&src, &e.to_string()),
            };
            page.close()?;
            Ok(html)
        })
        .await;

        match result {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => {
                warn!("Diagram render failed: {}", e);
                error_block(source, &e.to_string())
            }
            Err(e) => error_block(source, &format!("render task panicked: {e}")),
        }
    }

    /// Shut the browser down. Safe to call more than once.
    pub fn close(&self) {
        match self.session.lock() {
            Ok(mut guard) => {
                if let Some(mut session) = guard.take() {
                    session.close();
                    info!("Diagram renderer closed");
                }
            }
            Err(_) => warn!("Diagram renderer lock poisoned; browser left to drop"),
        }
    }

    /// Start a fresh browser, replacing any existing one.
    pub async fn relaunch(&self) -> Result<(), MdPressError> {
        self.close();
        let session = start_session(self.headless, self.options.timeout_ms).await?;
        let mut guard = self
            .session
            .lock()
            .map_err(|_| MdPressError::Internal("diagram renderer lock poisoned".into()))?;
        *guard = Some(session);
        Ok(())
    }
}

impl Drop for DiagramRenderer {
    fn drop(&mut self) {
        self.close();
    }
}

async fn start_session(headless: bool, timeout_ms: u64) -> Result<BrowserSession, MdPressError> {
    // Page operations may legitimately take as long as the diagram timeout.
    let page_timeout = Duration::from_millis(timeout_ms.saturating_add(5_000));
    tokio::task::spawn_blocking(move || BrowserSession::launch(headless, page_timeout))
        .await
        .map_err(|e| MdPressError::Internal(format!("Browser launch task panicked: {}", e)))?
}
