//! Configuration types for Markdown-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. A document's front matter can then
//! override part of it with [`ConversionConfig::with_front_matter`]:
//!
//! ```text
//! system defaults  <  caller config  <  front matter (`theme:`, `pdf:`)
//! ```
//!
//! Merging is field-level and shallow, except for margins, which merge edge
//! by edge.

use crate::error::MdPressError;
use crate::pipeline::frontmatter::FrontMatter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Default diagram library, loaded into the page on demand.
pub const DEFAULT_MERMAID_URL: &str = "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js";

/// Configuration for a Markdown conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use mdpress::{ConversionConfig, PageFormat};
///
/// let config = ConversionConfig::builder()
///     .format(PageFormat::Letter)
///     .margins_str("20mm,15mm").unwrap()
///     .toc(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.pdf.margins.left, "15mm");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionConfig {
    /// Page geometry and print options.
    pub pdf: PdfOptions,

    /// Document theme, highlight theme and custom CSS.
    pub theme: ThemeOptions,

    /// Diagram rendering options.
    pub diagram: DiagramOptions,

    /// Typeset `$…$` / `$$…$$` as MathML. Default: true.
    pub math: bool,

    /// Expand `:shortcode:` emoji. Default: true.
    pub emoji: bool,

    /// Syntax-highlight fenced code. Default: true.
    pub highlight: bool,

    /// Insert a table of contents. Default: false.
    pub toc: bool,

    /// Deepest heading level listed in the TOC. Range: 1–6. Default: 3.
    pub toc_depth: u8,

    /// Also write the assembled HTML next to the PDF. Default: false.
    pub html_output: bool,

    /// Launch the browser with a visible window. Default: false.
    pub debug: bool,

    /// Directory that relative images and CSS paths resolve against.
    /// Defaults to the input file's directory, or the working directory for
    /// in-memory strings.
    pub base_path: Option<PathBuf>,

    /// Extra directory a custom CSS file may be read from besides `base_path`.
    pub trusted_root: Option<PathBuf>,

    /// Print retry policy.
    pub retry: RetryPolicy,

    /// Bounded waits used while rendering.
    pub timeouts: Timeouts,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            pdf: PdfOptions::default(),
            theme: ThemeOptions::default(),
            diagram: DiagramOptions::default(),
            math: true,
            emoji: true,
            highlight: true,
            toc: false,
            toc_depth: 3,
            html_output: false,
            debug: false,
            base_path: None,
            trusted_root: None,
            retry: RetryPolicy::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Layer a document's front matter on top of this configuration.
    ///
    /// `theme:` must name a known theme; anything else selects the default
    /// theme with a warning. `pdf:` is read as [`PdfOverrides`]; a block that does not
    /// deserialise is ignored with a warning. The highlight theme is
    /// re-derived from the resulting document theme.
    pub fn with_front_matter(&self, front_matter: &FrontMatter) -> ConversionConfig {
        let mut merged = self.clone();

        if let Some(name) = front_matter.theme() {
            merged.theme.theme = Theme::resolve(&name);
            debug!("Front matter selects theme '{}'", merged.theme.theme);
        }

        match front_matter.pdf() {
            Ok(Some(overrides)) => merged.pdf.apply(&overrides),
            Ok(None) => {}
            Err(e) => warn!("Ignoring front-matter pdf options: {}", e),
        }

        merged.theme.highlight = HighlightTheme::for_theme(merged.theme.theme);
        merged
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn format(mut self, format: PageFormat) -> Self {
        self.config.pdf.format = format;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.config.pdf.orientation = orientation;
        self
    }

    pub fn landscape(self, landscape: bool) -> Self {
        self.orientation(if landscape {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        })
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.config.pdf.margins = margins;
        self
    }

    /// Set margins from CLI shorthand (`a`, `a,b` or `a,b,c,d`).
    pub fn margins_str(self, shorthand: &str) -> Result<Self, MdPressError> {
        let margins = Margins::parse(shorthand)?;
        Ok(self.margins(margins))
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.config.pdf.scale = scale.clamp(0.1, 2.0);
        self
    }

    pub fn page_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.config.pdf.page_ranges = Some(ranges.into());
        self
    }

    pub fn print_background(mut self, v: bool) -> Self {
        self.config.pdf.print_background = v;
        self
    }

    pub fn header_template(mut self, html: impl Into<String>) -> Self {
        self.config.pdf.header_template = Some(html.into());
        self
    }

    pub fn footer_template(mut self, html: impl Into<String>) -> Self {
        self.config.pdf.footer_template = Some(html.into());
        self
    }

    pub fn page_numbers(mut self, v: bool) -> Self {
        self.config.pdf.page_numbers = v;
        self
    }

    pub fn theme(mut self, theme: Theme) -> Self {
        self.config.theme.theme = theme;
        self.config.theme.highlight = HighlightTheme::for_theme(theme);
        self
    }

    /// Select a theme by name; unknown names fall back to `github` with a warning.
    pub fn theme_name(self, name: &str) -> Self {
        let theme = Theme::resolve(name);
        self.theme(theme)
    }

    pub fn custom_css(mut self, css: impl Into<String>) -> Self {
        self.config.theme.custom_css = Some(css.into());
        self
    }

    pub fn custom_css_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.theme.custom_css_path = Some(path.into());
        self
    }

    pub fn diagram_theme(mut self, theme: DiagramTheme) -> Self {
        self.config.diagram.theme = theme;
        self
    }

    pub fn diagram_font(mut self, font_family: impl Into<String>) -> Self {
        self.config.diagram.font_family = font_family.into();
        self
    }

    pub fn diagram_background(mut self, background: impl Into<String>) -> Self {
        self.config.diagram.background = background.into();
        self
    }

    pub fn diagram_library_url(mut self, url: impl Into<String>) -> Self {
        self.config.diagram.library_url = url.into();
        self
    }

    pub fn diagram_timeout_ms(mut self, ms: u64) -> Self {
        self.config.diagram.timeout_ms = ms.max(100);
        self
    }

    pub fn math(mut self, v: bool) -> Self {
        self.config.math = v;
        self
    }

    pub fn emoji(mut self, v: bool) -> Self {
        self.config.emoji = v;
        self
    }

    pub fn highlight(mut self, v: bool) -> Self {
        self.config.highlight = v;
        self
    }

    pub fn toc(mut self, v: bool) -> Self {
        self.config.toc = v;
        self
    }

    pub fn toc_depth(mut self, depth: u8) -> Self {
        self.config.toc_depth = depth.clamp(1, 6);
        self
    }

    pub fn html_output(mut self, v: bool) -> Self {
        self.config.html_output = v;
        self
    }

    pub fn debug(mut self, v: bool) -> Self {
        self.config.debug = v;
        self
    }

    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_path = Some(path.into());
        self
    }

    pub fn trusted_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.trusted_root = Some(path.into());
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n.max(1);
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, MdPressError> {
        let c = &self.config;
        if !(0.1..=2.0).contains(&c.pdf.scale) {
            return Err(MdPressError::InvalidConfig(format!(
                "Scale must be 0.1–2.0, got {}",
                c.pdf.scale
            )));
        }
        if !(1..=6).contains(&c.toc_depth) {
            return Err(MdPressError::InvalidConfig(format!(
                "TOC depth must be 1–6, got {}",
                c.toc_depth
            )));
        }
        if c.retry.max_attempts == 0 {
            return Err(MdPressError::InvalidConfig(
                "Retry attempts must be ≥ 1".into(),
            ));
        }
        c.pdf.margins.validate()?;
        for (name, value) in [("width", &c.pdf.width), ("height", &c.pdf.height)] {
            if let Some(v) = value {
                if !is_css_length(v) {
                    return Err(MdPressError::InvalidConfig(format!(
                        "Page {name} '{v}' is not a CSS length"
                    )));
                }
            }
        }
        Ok(self.config)
    }
}

// ── Page geometry ────────────────────────────────────────────────────────

/// Paper format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl PageFormat {
    /// All formats, in display order.
    pub const ALL: [PageFormat; 6] = [
        PageFormat::A3,
        PageFormat::A4,
        PageFormat::A5,
        PageFormat::Letter,
        PageFormat::Legal,
        PageFormat::Tabloid,
    ];

    /// Portrait paper size in inches, `(width, height)`.
    pub fn size_inches(self) -> (f64, f64) {
        match self {
            PageFormat::A3 => (11.69, 16.54),
            PageFormat::A4 => (8.27, 11.69),
            PageFormat::A5 => (5.83, 8.27),
            PageFormat::Letter => (8.5, 11.0),
            PageFormat::Legal => (8.5, 14.0),
            PageFormat::Tabloid => (11.0, 17.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PageFormat::A3 => "A3",
            PageFormat::A4 => "A4",
            PageFormat::A5 => "A5",
            PageFormat::Letter => "Letter",
            PageFormat::Legal => "Legal",
            PageFormat::Tabloid => "Tabloid",
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PageFormat {
    type Err = MdPressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PageFormat::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MdPressError::InvalidConfig(format!("Unknown page format '{s}'")))
    }
}

impl TryFrom<String> for PageFormat {
    type Error = MdPressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PageFormat> for String {
    fn from(f: PageFormat) -> Self {
        f.name().to_string()
    }
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn is_landscape(self) -> bool {
        self == Orientation::Landscape
    }

    pub fn name(self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

static CSS_LENGTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:0|\d+(?:\.\d+)?|\.\d+)(?:mm|cm|in|px|pt|pc|em|rem|%)?$").unwrap()
});

fn is_css_length(s: &str) -> bool {
    CSS_LENGTH_RE.is_match(s.trim())
}

/// A length CSS accepts: unitless non-zero numbers get `px`.
fn css_length(value: &str) -> String {
    let v = value.trim();
    if v.parse::<f64>().is_ok_and(|n| n != 0.0) {
        format!("{v}px")
    } else {
        v.to_string()
    }
}

/// Four independent page margins, as CSS lengths.
///
/// Margins are never handed to the browser's print engine: native margins
/// are always zero and these values become padding on the document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform("10mm")
    }
}

impl Margins {
    pub fn uniform(value: &str) -> Self {
        Self {
            top: value.to_string(),
            right: value.to_string(),
            bottom: value.to_string(),
            left: value.to_string(),
        }
    }

    /// Parse CSS-style shorthand.
    ///
    /// * `a`: all four edges
    /// * `a,b`: top/bottom `a`, right/left `b`
    /// * `a,b,c,d`: top, right, bottom, left
    ///
    /// Any other number of parts is rejected, as is any part that is not a
    /// CSS length.
    pub fn parse(shorthand: &str) -> Result<Self, MdPressError> {
        let parts: Vec<&str> = shorthand.split(',').map(str::trim).collect();
        let margins = match parts.as_slice() {
            [a] => Self::uniform(a),
            [v, h] => Self {
                top: v.to_string(),
                right: h.to_string(),
                bottom: v.to_string(),
                left: h.to_string(),
            },
            [t, r, b, l] => Self {
                top: t.to_string(),
                right: r.to_string(),
                bottom: b.to_string(),
                left: l.to_string(),
            },
            _ => {
                return Err(MdPressError::InvalidConfig(format!(
                    "Margin '{shorthand}' must have 1, 2 or 4 comma-separated values, got {}",
                    parts.len()
                )))
            }
        };
        margins.validate()?;
        Ok(margins)
    }

    fn validate(&self) -> Result<(), MdPressError> {
        for (edge, value) in self.edges() {
            if !is_css_length(value) {
                return Err(MdPressError::InvalidConfig(format!(
                    "Margin {edge} '{value}' is not a CSS length"
                )));
            }
        }
        Ok(())
    }

    fn edges(&self) -> [(&'static str, &str); 4] {
        [
            ("top", &self.top),
            ("right", &self.right),
            ("bottom", &self.bottom),
            ("left", &self.left),
        ]
    }

    /// CSS `padding` value: `top right bottom left`. Bare numbers are pixels.
    pub fn to_css(&self) -> String {
        format!(
            "{} {} {} {}",
            css_length(&self.top),
            css_length(&self.right),
            css_length(&self.bottom),
            css_length(&self.left)
        )
    }

    /// Merge per-edge overrides; edges left unset keep their value.
    pub fn merge(&mut self, overrides: &MarginOverrides) {
        if let Some(ref v) = overrides.top {
            self.top = v.clone();
        }
        if let Some(ref v) = overrides.right {
            self.right = v.clone();
        }
        if let Some(ref v) = overrides.bottom {
            self.bottom = v.clone();
        }
        if let Some(ref v) = overrides.left {
            self.left = v.clone();
        }
    }
}

/// Per-edge margin overrides from front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginOverrides {
    pub top: Option<String>,
    pub right: Option<String>,
    pub bottom: Option<String>,
    pub left: Option<String>,
}

/// Front-matter `margin:` accepts either shorthand or an edge mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarginSpec {
    Shorthand(String),
    Edges(MarginOverrides),
}

/// Print options for the PDF renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfOptions {
    pub format: PageFormat,
    pub orientation: Orientation,
    pub margins: Margins,
    /// Print CSS backgrounds. Default: true.
    pub print_background: bool,
    /// Show the header/footer band. Implied by a header or footer template.
    pub display_header_footer: bool,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    /// Request an "N / total" footer when no footer template is given.
    pub page_numbers: bool,
    /// Render scale. Range: 0.1–2.0. Default: 1.0.
    pub scale: f64,
    /// Page ranges to print, e.g. `1-5, 8`.
    pub page_ranges: Option<String>,
    /// Explicit paper width; overrides the format together with `height`.
    pub width: Option<String>,
    pub height: Option<String>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            format: PageFormat::default(),
            orientation: Orientation::default(),
            margins: Margins::default(),
            print_background: true,
            display_header_footer: false,
            header_template: None,
            footer_template: None,
            page_numbers: false,
            scale: 1.0,
            page_ranges: None,
            width: None,
            height: None,
        }
    }
}

impl PdfOptions {
    /// Apply front-matter overrides field by field.
    pub fn apply(&mut self, o: &PdfOverrides) {
        if let Some(format) = o.format {
            self.format = format;
        }
        if let Some(landscape) = o.landscape {
            self.orientation = if landscape {
                Orientation::Landscape
            } else {
                Orientation::Portrait
            };
        }
        match &o.margin {
            Some(MarginSpec::Edges(edges)) => self.margins.merge(edges),
            Some(MarginSpec::Shorthand(s)) => match Margins::parse(s) {
                Ok(m) => self.margins = m,
                Err(e) => warn!("Ignoring front-matter margin: {}", e),
            },
            None => {}
        }
        if let Some(v) = o.print_background {
            self.print_background = v;
        }
        if let Some(v) = o.display_header_footer {
            self.display_header_footer = v;
        }
        if let Some(ref v) = o.header_template {
            self.header_template = Some(v.clone());
        }
        if let Some(ref v) = o.footer_template {
            self.footer_template = Some(v.clone());
        }
        if let Some(v) = o.scale {
            self.scale = v.clamp(0.1, 2.0);
        }
        if let Some(ref v) = o.page_ranges {
            self.page_ranges = Some(v.clone());
        }
        if let Some(ref v) = o.width {
            self.width = Some(v.clone());
        }
        if let Some(ref v) = o.height {
            self.height = Some(v.clone());
        }
    }

    /// CSS `@page` size, e.g. `A4 landscape` or `8.5in 11in`.
    pub fn css_page_size(&self) -> String {
        match (&self.width, &self.height) {
            (Some(w), Some(h)) => format!("{w} {h}"),
            _ => format!("{} {}", self.format, self.orientation.name()),
        }
    }
}

/// The front-matter `pdf:` mapping. Keys are camelCase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PdfOverrides {
    pub format: Option<PageFormat>,
    pub landscape: Option<bool>,
    pub margin: Option<MarginSpec>,
    pub print_background: Option<bool>,
    pub display_header_footer: Option<bool>,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    pub scale: Option<f64>,
    pub page_ranges: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

// ── Themes ───────────────────────────────────────────────────────────────

/// Document theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
    #[default]
    Github,
    GithubDark,
    VscodeLight,
    VscodeDark,
}

impl Theme {
    pub const ALL: [Theme; 4] = [
        Theme::Github,
        Theme::GithubDark,
        Theme::VscodeLight,
        Theme::VscodeDark,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Theme::Github => "github",
            Theme::GithubDark => "github-dark",
            Theme::VscodeLight => "vscode-light",
            Theme::VscodeDark => "vscode-dark",
        }
    }

    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Theme> {
        let name = name.trim();
        Theme::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Like [`Theme::from_name`], falling back to `github` with a warning.
    pub fn resolve(name: &str) -> Theme {
        name.parse().unwrap_or_else(|e: MdPressError| {
            warn!("{}; falling back to '{}'", e, Theme::Github);
            Theme::Github
        })
    }

    pub fn is_dark(self) -> bool {
        matches!(self, Theme::GithubDark | Theme::VscodeDark)
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Theme {
    type Err = MdPressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Theme::from_name(s).ok_or_else(|| {
            let names: Vec<&str> = Theme::ALL.iter().map(|t| t.name()).collect();
            MdPressError::Theme(format!("unknown theme '{}' (available: {})", s.trim(), names.join(", ")))
        })
    }
}

/// Syntax-highlight palette paired with the document theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightTheme {
    #[default]
    Light,
    Dark,
}

impl HighlightTheme {
    pub fn for_theme(theme: Theme) -> Self {
        if theme.is_dark() {
            HighlightTheme::Dark
        } else {
            HighlightTheme::Light
        }
    }

    /// Name of the bundled `syntect` theme.
    pub fn syntect_name(self) -> &'static str {
        match self {
            HighlightTheme::Light => "InspiredGitHub",
            HighlightTheme::Dark => "base16-ocean.dark",
        }
    }
}

/// Theme selection and user CSS.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeOptions {
    pub theme: Theme,
    /// Derived from `theme`; recomputed whenever the theme changes.
    pub highlight: HighlightTheme,
    /// Inline CSS appended after the theme.
    pub custom_css: Option<String>,
    /// CSS file appended after `custom_css`; must resolve inside the base
    /// directory or the trusted root.
    pub custom_css_path: Option<PathBuf>,
}

// ── Diagrams ─────────────────────────────────────────────────────────────

/// Mermaid theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramTheme {
    #[default]
    Default,
    Forest,
    Dark,
    Neutral,
    Base,
}

impl DiagramTheme {
    pub const ALL: [DiagramTheme; 5] = [
        DiagramTheme::Default,
        DiagramTheme::Forest,
        DiagramTheme::Dark,
        DiagramTheme::Neutral,
        DiagramTheme::Base,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DiagramTheme::Default => "default",
            DiagramTheme::Forest => "forest",
            DiagramTheme::Dark => "dark",
            DiagramTheme::Neutral => "neutral",
            DiagramTheme::Base => "base",
        }
    }
}

impl fmt::Display for DiagramTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DiagramTheme {
    type Err = MdPressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiagramTheme::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MdPressError::InvalidConfig(format!("Unknown diagram theme '{s}'")))
    }
}

/// Options for rendering diagram blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramOptions {
    pub theme: DiagramTheme,
    pub font_family: String,
    pub background: String,
    /// Script URL of the diagram library.
    pub library_url: String,
    /// Per-diagram render timeout. Default: 10 000 ms.
    pub timeout_ms: u64,
}

impl Default for DiagramOptions {
    fn default() -> Self {
        Self {
            theme: DiagramTheme::default(),
            font_family: "-apple-system, BlinkMacSystemFont, 'Segoe UI', Helvetica, Arial, sans-serif"
                .to_string(),
            background: "white".to_string(),
            library_url: DEFAULT_MERMAID_URL.to_string(),
            timeout_ms: 10_000,
        }
    }
}

// ── Retry and waits ──────────────────────────────────────────────────────

/// Linear-backoff retry policy for the final print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Default: 3.
    pub max_attempts: u32,
    /// Delay unit; the wait after attempt `n` is `n × base`. Default: 1000 ms.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(attempt as u64))
    }
}

/// Bounded waits used while loading and printing a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Navigation and load. Default: 60 s.
    pub load_ms: u64,
    /// Upper bound for the network-quiet wait. Default: 10 s.
    pub network_idle_ms: u64,
    /// Window with no new resource entries that counts as quiet. Default: 500 ms.
    pub network_quiet_window_ms: u64,
    /// Settle delay after the final animation frame. Default: 500 ms.
    pub settle_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            load_ms: 60_000,
            network_idle_ms: 10_000,
            network_quiet_window_ms: 500,
            settle_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frontmatter;

    #[test]
    fn margin_css_keeps_units_and_pixels_bare_numbers() {
        let m = Margins::parse("1.5, 10mm, 0, 2in").unwrap();
        assert_eq!(m.to_css(), "1.5px 10mm 0 2in");
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.pdf.format, PageFormat::A4);
        assert_eq!(c.pdf.margins, Margins::uniform("10mm"));
        assert!(c.pdf.print_background);
        assert_eq!(c.toc_depth, 3);
        assert!(c.math && c.emoji && c.highlight);
        assert_eq!(c.retry.max_attempts, 3);
        assert_eq!(c.diagram.timeout_ms, 10_000);
        assert_eq!(c.theme.theme, Theme::Github);
    }

    #[test]
    fn margin_shorthand_two_values() {
        let m = Margins::parse("10mm,20mm").unwrap();
        assert_eq!(m.top, "10mm");
        assert_eq!(m.bottom, "10mm");
        assert_eq!(m.right, "20mm");
        assert_eq!(m.left, "20mm");
    }

    #[test]
    fn margin_shorthand_four_values() {
        let m = Margins::parse("1in, 2in, 3in, 4in").unwrap();
        assert_eq!(m.to_css(), "1in 2in 3in 4in");
    }

    #[test]
    fn margin_shorthand_rejects_other_counts() {
        assert!(Margins::parse("1mm,2mm,3mm").is_err());
        assert!(Margins::parse("1,2,3,4,5").is_err());
        assert!(Margins::parse("wide").is_err());
    }

    #[test]
    fn builder_clamps_and_validates() {
        let c = ConversionConfig::builder()
            .toc_depth(9)
            .scale(5.0)
            .build()
            .unwrap();
        assert_eq!(c.toc_depth, 6);
        assert_eq!(c.pdf.scale, 2.0);

        let err = ConversionConfig::builder()
            .margins(Margins::uniform("huge"))
            .build()
            .unwrap_err();
        assert!(matches!(err, MdPressError::InvalidConfig(_)));
    }

    #[test]
    fn theme_lookup_is_case_insensitive() {
        assert_eq!(Theme::from_name("GitHub-Dark"), Some(Theme::GithubDark));
        assert_eq!(Theme::resolve("solarized"), Theme::Github);
        assert_eq!(HighlightTheme::for_theme(Theme::VscodeDark), HighlightTheme::Dark);
        assert_eq!(HighlightTheme::for_theme(Theme::VscodeLight), HighlightTheme::Light);
    }

    #[test]
    fn unknown_theme_name_is_a_theme_error() {
        let err = "solarized".parse::<Theme>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Theme);
        assert!(err.to_string().contains("unknown theme 'solarized'"));
        assert!(err.to_string().contains("vscode-dark"));
        assert_eq!(" vscode-light ".parse::<Theme>().unwrap(), Theme::VscodeLight);
    }

    #[test]
    fn builder_theme_pairs_highlight() {
        let c = ConversionConfig::builder().theme_name("vscode-dark").build().unwrap();
        assert_eq!(c.theme.highlight, HighlightTheme::Dark);
    }

    #[test]
    fn front_matter_overrides_caller_config() {
        let text = "---\ntheme: github-dark\npdf:\n  format: letter\n  landscape: true\n  margin:\n    top: 30mm\n  printBackground: false\n---\n# Body\n";
        let (fm, _) = frontmatter::extract(text);
        let base = ConversionConfig::builder()
            .margins(Margins::uniform("5mm"))
            .build()
            .unwrap();

        let merged = base.with_front_matter(&fm);
        assert_eq!(merged.theme.theme, Theme::GithubDark);
        assert_eq!(merged.theme.highlight, HighlightTheme::Dark);
        assert_eq!(merged.pdf.format, PageFormat::Letter);
        assert!(merged.pdf.orientation.is_landscape());
        assert_eq!(merged.pdf.margins.top, "30mm");
        assert_eq!(merged.pdf.margins.left, "5mm");
        assert!(!merged.pdf.print_background);
    }

    #[test]
    fn front_matter_unknown_theme_selects_default() {
        let (fm, _) = frontmatter::extract("---\ntheme: neon\n---\nx");
        let base = ConversionConfig::builder().theme(Theme::VscodeDark).build().unwrap();
        let merged = base.with_front_matter(&fm);
        assert_eq!(merged.theme.theme, Theme::Github);
        assert_eq!(merged.theme.highlight, HighlightTheme::Light);
    }

    #[test]
    fn front_matter_margin_shorthand() {
        let (fm, _) = frontmatter::extract("---\npdf:\n  margin: 1in,2in\n---\nx");
        let merged = ConversionConfig::default().with_front_matter(&fm);
        assert_eq!(merged.pdf.margins.top, "1in");
        assert_eq!(merged.pdf.margins.right, "2in");
    }

    #[test]
    fn explicit_size_wins_over_format() {
        let mut pdf = PdfOptions::default();
        assert_eq!(pdf.css_page_size(), "A4 portrait");
        pdf.width = Some("8in".into());
        pdf.height = Some("10in".into());
        assert_eq!(pdf.css_page_size(), "8in 10in");
    }

    #[test]
    fn retry_delay_is_linear() {
        let r = RetryPolicy::default();
        assert_eq!(r.delay_after(1), Duration::from_millis(1000));
        assert_eq!(r.delay_after(2), Duration::from_millis(2000));
    }
}
