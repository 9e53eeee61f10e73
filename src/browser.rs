//! Headless browser lifecycle and the page abstraction used by rendering.
//!
//! `headless_chrome` is a blocking API. Everything here is synchronous and
//! is driven from `tokio::task::spawn_blocking` by the async callers.
//!
//! Rendering code only sees the [`PageHandle`] trait, so the orchestration
//! in [`crate::pipeline::pdf`] and [`crate::pipeline::diagram`] can be tested
//! with a scripted page instead of a real browser.

use crate::error::MdPressError;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Paper and print settings handed to the browser.
///
/// Margins are not part of this struct: native margins are always zero.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintSettings {
    pub paper_width_in: f64,
    pub paper_height_in: f64,
    pub landscape: bool,
    pub print_background: bool,
    pub scale: f64,
    pub page_ranges: Option<String>,
    pub display_header_footer: bool,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
}

/// One browser page, as seen by the renderers.
pub trait PageHandle: Send {
    /// Load a full HTML document and wait for the load event.
    fn load_html(&mut self, html: &str) -> Result<(), MdPressError>;

    /// Navigate to a URL and wait for the load event.
    fn navigate(&mut self, url: &str) -> Result<(), MdPressError>;

    /// Evaluate a script, optionally awaiting the promise it returns.
    fn evaluate(&mut self, script: &str, await_promise: bool) -> Result<Value, MdPressError>;

    fn print_pdf(&mut self, settings: &PrintSettings) -> Result<Vec<u8>, MdPressError>;

    /// Close the page. Closing twice is not an error.
    fn close(&mut self) -> Result<(), MdPressError>;
}

// ── Browser ──────────────────────────────────────────────────────────────

/// A running browser process. Dropping the session kills the process.
pub struct BrowserSession {
    browser: Option<Browser>,
    page_timeout: Duration,
}

impl BrowserSession {
    /// Launch a browser.
    ///
    /// When `MDPRESS_CHROME_PATH` or `CHROME` is set, the located binary is
    /// launched directly. Otherwise managed auto-detection runs first, then
    /// the locator's install paths and `which`/`where`.
    pub fn launch(headless: bool, page_timeout: Duration) -> Result<Self, MdPressError> {
        let overrides = [chrome_locate::ENV_OVERRIDE, chrome_locate::ENV_FALLBACK].map(std::env::var_os);
        if override_requested(&overrides) {
            let path = chrome_locate::locate_chrome()
                .map_err(|e| MdPressError::BrowserLaunch(e.to_string()))?;
            return Self::launch_at(path, headless, page_timeout);
        }

        let managed_err = match launch_with(None, headless) {
            Ok(browser) => {
                info!("Launched managed headless browser");
                return Ok(Self::from_browser(browser, page_timeout));
            }
            Err(e) => e,
        };
        debug!("Managed browser launch failed: {}", managed_err);

        let path = chrome_locate::locate_chrome().map_err(|e| {
            MdPressError::BrowserLaunch(format!("{managed_err}; {e}"))
        })?;
        Self::launch_at(path, headless, page_timeout)
    }

    fn launch_at(path: PathBuf, headless: bool, page_timeout: Duration) -> Result<Self, MdPressError> {
        info!("Launching browser at {}", path.display());
        let browser = launch_with(Some(path.clone()), headless).map_err(|e| {
            MdPressError::BrowserLaunch(format!("{} ({})", e, path.display()))
        })?;
        Ok(Self::from_browser(browser, page_timeout))
    }

    fn from_browser(browser: Browser, page_timeout: Duration) -> Self {
        Self {
            browser: Some(browser),
            page_timeout,
        }
    }

    pub fn is_open(&self) -> bool {
        self.browser.is_some()
    }

    /// Open a new tab.
    pub fn new_page(&self) -> Result<ChromePage, MdPressError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| MdPressError::from_browser("browser is closed"))?;
        let tab = browser.new_tab().map_err(MdPressError::from_browser)?;
        tab.set_default_timeout(self.page_timeout);
        Ok(ChromePage {
            tab,
            document: None,
            closed: false,
        })
    }

    /// Shut the browser down. Safe to call more than once.
    pub fn close(&mut self) {
        if self.browser.take().is_some() {
            debug!("Browser closed");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Whether any browser override variable carries a value.
fn override_requested(values: &[Option<OsString>]) -> bool {
    values.iter().flatten().any(|v| !v.is_empty())
}

fn launch_with(path: Option<PathBuf>, headless: bool) -> Result<Browser, String> {
    let options = LaunchOptions::default_builder()
        .headless(headless)
        .sandbox(false)
        .path(path)
        .idle_browser_timeout(Duration::from_secs(300))
        .args(vec![
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--allow-file-access-from-files"),
        ])
        .build()
        .map_err(|e| format!("invalid launch options: {e}"))?;
    Browser::new(options).map_err(|e| format!("browser launch failed: {e}"))
}

// ── Page ─────────────────────────────────────────────────────────────────

/// A Chrome tab. Documents are written to a temporary `.html` file and
/// loaded by `file://` URL, so relative resources and large documents work.
pub struct ChromePage {
    tab: Arc<Tab>,
    document: Option<tempfile::NamedTempFile>,
    closed: bool,
}

impl PageHandle for ChromePage {
    fn load_html(&mut self, html: &str) -> Result<(), MdPressError> {
        let file = tempfile::Builder::new()
            .prefix("mdpress-")
            .suffix(".html")
            .tempfile()
            .map_err(|e| MdPressError::HtmlRender(format!("temp file: {e}")))?;
        std::fs::write(file.path(), html).map_err(|e| MdPressError::FileWrite {
            path: file.path().to_path_buf(),
            source: e,
        })?;
        let url = format!("file://{}", file.path().display());
        self.document = Some(file);
        self.navigate(&url)
            .map_err(|e| MdPressError::HtmlRender(e.to_string()))
    }

    fn navigate(&mut self, url: &str) -> Result<(), MdPressError> {
        self.tab
            .navigate_to(url)
            .map_err(MdPressError::from_browser)?
            .wait_until_navigated()
            .map_err(MdPressError::from_browser)?;
        Ok(())
    }

    fn evaluate(&mut self, script: &str, await_promise: bool) -> Result<Value, MdPressError> {
        let result = self
            .tab
            .evaluate(script, await_promise)
            .map_err(MdPressError::from_browser)?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn print_pdf(&mut self, s: &PrintSettings) -> Result<Vec<u8>, MdPressError> {
        let options = PrintToPdfOptions {
            landscape: Some(s.landscape),
            display_header_footer: Some(s.display_header_footer),
            print_background: Some(s.print_background),
            scale: Some(s.scale),
            paper_width: Some(s.paper_width_in),
            paper_height: Some(s.paper_height_in),
            margin_top: Some(0.0),
            margin_bottom: Some(0.0),
            margin_left: Some(0.0),
            margin_right: Some(0.0),
            page_ranges: s.page_ranges.clone(),
            header_template: s.header_template.clone(),
            footer_template: s.footer_template.clone(),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };
        self.tab
            .print_to_pdf(Some(options))
            .map_err(MdPressError::from_browser)
    }

    fn close(&mut self) -> Result<(), MdPressError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.document = None;
        if let Err(e) = self.tab.close(true) {
            warn!("Closing tab failed: {}", e);
        }
        Ok(())
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted [`PageHandle`] for exercising render orchestration.

    use super::*;
    use std::collections::VecDeque;

    /// Records every call and replays queued results.
    #[derive(Default)]
    pub struct MockPage {
        pub loaded: Vec<String>,
        pub navigated: Vec<String>,
        pub scripts: Vec<String>,
        /// Answers for `evaluate`, matched by substring of the script;
        /// unmatched scripts return `null`.
        pub answers: Vec<(String, Result<Value, String>)>,
        /// Results for successive `print_pdf` calls; empty means success.
        pub prints: VecDeque<Result<Vec<u8>, String>>,
        pub print_settings: Vec<PrintSettings>,
        pub close_calls: usize,
        pub fail_load: bool,
    }

    impl MockPage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn answer(mut self, needle: &str, value: Result<Value, String>) -> Self {
            self.answers.push((needle.to_string(), value));
            self
        }

        pub fn print_results(mut self, results: Vec<Result<Vec<u8>, String>>) -> Self {
            self.prints = results.into();
            self
        }
    }

    impl PageHandle for MockPage {
        fn load_html(&mut self, html: &str) -> Result<(), MdPressError> {
            if self.fail_load {
                return Err(MdPressError::HtmlRender("load failed".into()));
            }
            self.loaded.push(html.to_string());
            Ok(())
        }

        fn navigate(&mut self, url: &str) -> Result<(), MdPressError> {
            self.navigated.push(url.to_string());
            Ok(())
        }

        fn evaluate(&mut self, script: &str, _await_promise: bool) -> Result<Value, MdPressError> {
            self.scripts.push(script.to_string());
            for (needle, answer) in &self.answers {
                if script.contains(needle.as_str()) {
                    return answer.clone().map_err(MdPressError::from_browser);
                }
            }
            Ok(Value::Null)
        }

        fn print_pdf(&mut self, settings: &PrintSettings) -> Result<Vec<u8>, MdPressError> {
            self.print_settings.push(settings.clone());
            match self.prints.pop_front() {
                Some(Ok(bytes)) => Ok(bytes),
                Some(Err(e)) => Err(MdPressError::from_browser(e)),
                None => Ok(b"%PDF-1.4\n1 0 obj << /Type /Page >> endobj\n%%EOF".to_vec()),
            }
        }

        fn close(&mut self) -> Result<(), MdPressError> {
            self.close_calls += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_variables_take_precedence_when_set() {
        assert!(!override_requested(&[None, None]));
        assert!(!override_requested(&[Some(OsString::new()), None]));
        assert!(override_requested(&[Some("/opt/chrome".into()), None]));
        assert!(override_requested(&[None, Some("/usr/bin/chromium".into())]));
    }
}
