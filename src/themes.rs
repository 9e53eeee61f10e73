//! Document themes and the structural base stylesheet.
//!
//! Each theme is a [`Palette`]; one template turns a palette into the
//! `.markdown-body` rules, so the four themes differ only in colour.

use crate::config::{PdfOptions, Theme};

/// Colours for one document theme.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub fg: &'static str,
    pub fg_muted: &'static str,
    pub bg: &'static str,
    pub bg_subtle: &'static str,
    pub border: &'static str,
    pub link: &'static str,
    pub code_bg: &'static str,
    pub font: &'static str,
    /// Callout backgrounds: tip, warning, danger, info, note, important, caution.
    pub callouts: [&'static str; 7],
}

const SYSTEM_FONT: &str = "-apple-system, BlinkMacSystemFont, \"Segoe UI\", \"Noto Sans\", Helvetica, Arial, sans-serif, \"Apple Color Emoji\", \"Segoe UI Emoji\"";
const VSCODE_FONT: &str = "\"Segoe WPC\", \"Segoe UI\", system-ui, Ubuntu, \"Droid Sans\", sans-serif";

const GITHUB: Palette = Palette {
    fg: "#24292f",
    fg_muted: "#57606a",
    bg: "#ffffff",
    bg_subtle: "#f6f8fa",
    border: "#d0d7de",
    link: "#0969da",
    code_bg: "rgba(175, 184, 193, 0.2)",
    font: SYSTEM_FONT,
    callouts: ["#e8f5e9", "#fff3e0", "#ffebee", "#e3f2fd", "#f3e5f5", "#fff8e1", "#fce4ec"],
};

const GITHUB_DARK: Palette = Palette {
    fg: "#f0f6fc",
    fg_muted: "#9198a1",
    bg: "#0d1117",
    bg_subtle: "#151b23",
    border: "#3d444d",
    link: "#4493f8",
    code_bg: "#656c7633",
    font: SYSTEM_FONT,
    callouts: ["#12261e", "#272115", "#25171c", "#121d2f", "#1e1a2e", "#2b2111", "#2a1520"],
};

const VSCODE_LIGHT: Palette = Palette {
    fg: "#3b3b3b",
    fg_muted: "#6e7681",
    bg: "#ffffff",
    bg_subtle: "#f3f3f3",
    border: "#e5e5e5",
    link: "#006ab1",
    code_bg: "#f3f3f3",
    font: VSCODE_FONT,
    callouts: ["#eaf7ee", "#fff8e5", "#fdecec", "#e8f2fc", "#f1ebf8", "#fff6db", "#fcebf2"],
};

const VSCODE_DARK: Palette = Palette {
    fg: "#d4d4d4",
    fg_muted: "#9d9d9d",
    bg: "#1e1e1e",
    bg_subtle: "#252526",
    border: "#3c3c3c",
    link: "#3794ff",
    code_bg: "#3c3c3c",
    font: VSCODE_FONT,
    callouts: ["#1a2f1f", "#2d2a16", "#2d1b1b", "#1b2836", "#241f2d", "#2e2813", "#2d1a24"],
};

const CALLOUT_KINDS: [(&str, &str); 7] = [
    ("tip", "#4caf50"),
    ("warning", "#ff9800"),
    ("danger", "#f44336"),
    ("info", "#2196f3"),
    ("note", "#9c27b0"),
    ("important", "#ffc107"),
    ("caution", "#e91e63"),
];

pub fn palette(theme: Theme) -> &'static Palette {
    match theme {
        Theme::Github => &GITHUB,
        Theme::GithubDark => &GITHUB_DARK,
        Theme::VscodeLight => &VSCODE_LIGHT,
        Theme::VscodeDark => &VSCODE_DARK,
    }
}

/// Theme names accepted by `--theme` and the front-matter `theme` key.
pub fn available_themes() -> Vec<&'static str> {
    Theme::ALL.iter().map(|t| t.name()).collect()
}

/// The colour stylesheet for `theme`.
pub fn stylesheet(theme: Theme) -> String {
    let p = palette(theme);
    let mut css = format!(
        r#"
/* {name} */
html, body {{ background-color: {bg}; }}
.markdown-body {{
  color: {fg};
  background-color: {bg};
  font-family: {font};
  font-size: 16px;
  line-height: 1.5;
  word-wrap: break-word;
}}
.markdown-body > *:first-child {{ margin-top: 0 !important; }}
.markdown-body > *:last-child {{ margin-bottom: 0 !important; }}
.markdown-body h1, .markdown-body h2, .markdown-body h3,
.markdown-body h4, .markdown-body h5, .markdown-body h6 {{
  margin-top: 1em;
  margin-bottom: 0.5em;
  font-weight: 600;
  line-height: 1.25;
  break-after: avoid;
}}
.markdown-body h1 {{ padding-bottom: 0.3em; font-size: 2em; border-bottom: 1px solid {border}; }}
.markdown-body h2 {{ padding-bottom: 0.3em; font-size: 1.5em; border-bottom: 1px solid {border}; }}
.markdown-body h3 {{ font-size: 1.25em; }}
.markdown-body h4 {{ font-size: 1em; }}
.markdown-body h5 {{ font-size: 0.875em; }}
.markdown-body h6 {{ font-size: 0.85em; color: {muted}; }}
.markdown-body p, .markdown-body ul, .markdown-body ol,
.markdown-body table, .markdown-body pre {{ margin-top: 0; margin-bottom: 16px; }}
.markdown-body ul, .markdown-body ol {{ padding-left: 2em; }}
.markdown-body li + li {{ margin-top: 0.25em; }}
.markdown-body a {{ color: {link}; text-decoration: none; }}
.markdown-body blockquote {{
  margin: 0 0 16px 0;
  padding: 0 1em;
  color: {muted};
  border-left: 0.25em solid {border};
}}
.markdown-body code {{
  padding: 0.2em 0.4em;
  font-size: 85%;
  background-color: {code_bg};
  border-radius: 6px;
  font-family: ui-monospace, SFMono-Regular, "SF Mono", Menlo, Consolas, "Liberation Mono", monospace;
}}
.markdown-body pre {{
  padding: 16px;
  overflow: auto;
  font-size: 85%;
  line-height: 1.45;
  background-color: {subtle};
  border-radius: 6px;
}}
.markdown-body pre code {{ padding: 0; font-size: 100%; background: transparent; white-space: pre; }}
.markdown-body table {{ border-spacing: 0; border-collapse: collapse; display: block; width: max-content; max-width: 100%; overflow: auto; }}
.markdown-body table th, .markdown-body table td {{ padding: 6px 13px; border: 1px solid {border}; }}
.markdown-body table th {{ font-weight: 600; }}
.markdown-body table tr:nth-child(2n) {{ background-color: {subtle}; }}
.markdown-body hr {{ height: 0.25em; padding: 0; margin: 24px 0; background-color: {border}; border: 0; }}
.markdown-body img {{ max-width: 100%; box-sizing: content-box; }}
.markdown-body .table-of-contents, .markdown-body details {{ background: {subtle}; }}
.markdown-body .footnotes {{ border-top-color: {border}; color: {muted}; }}
"#,
        name = theme.name(),
        fg = p.fg,
        muted = p.fg_muted,
        bg = p.bg,
        subtle = p.bg_subtle,
        border = p.border,
        link = p.link,
        code_bg = p.code_bg,
        font = p.font,
    );
    for ((kind, accent), bg) in CALLOUT_KINDS.iter().zip(p.callouts) {
        css.push_str(&format!(
            ".custom-container.{kind} {{ background: {bg}; border-color: {accent}; }}\n"
        ));
    }
    css
}

/// Structural rules shared by every theme, including page geometry.
///
/// Native page margins are zero; the configured margins become padding on
/// `.markdown-body`, so backgrounds reach the paper edge.
pub fn base_css(pdf: &PdfOptions) -> String {
    format!(
        r#"
@page {{ size: {size}; margin: 0; }}
* {{ box-sizing: border-box; }}
html {{ -webkit-print-color-adjust: exact; print-color-adjust: exact; }}
body {{ margin: 0; padding: 0; }}
.markdown-body {{ padding: {padding}; min-height: 100vh; }}
.frontmatter-wrapper {{ margin-bottom: 1.5em; overflow-x: auto; }}
.frontmatter-table {{ border-collapse: collapse; }}
.frontmatter-table th, .frontmatter-table td {{ text-align: center; }}
.mermaid, .mermaid-container {{
  display: flex;
  justify-content: center;
  margin: 1em 0;
  break-inside: avoid;
}}
.mermaid-container svg, .mermaid svg {{ max-width: 100%; height: auto; display: block; }}
.mermaid-error {{
  background: #fff3cd;
  border: 1px solid #ffc107;
  border-radius: 4px;
  padding: 1em;
  margin: 1em 0;
  color: #533f03;
}}
.mermaid-error .error-message {{ color: #856404; font-size: 0.9em; }}
.custom-container {{ padding: 1em 1.5em; margin: 1em 0; border-left: 4px solid; border-radius: 4px; }}
.custom-container-title {{ font-weight: 600; margin-bottom: 0.5em; }}
.task-list-item {{ list-style-type: none; }}
.task-list-item input {{ margin: 0 0.5em 0 -1.3em; vertical-align: middle; }}
.footnotes {{ border-top: 1px solid #e1e4e8; margin-top: 2em; padding-top: 1em; font-size: 0.9em; }}
.footnotes-sep {{ display: none; }}
.footnote-ref {{ font-size: 0.75em; vertical-align: super; }}
.table-of-contents {{ padding: 0.75em 1em; border-radius: 6px; margin: 1em 0; }}
.table-of-contents ul {{ margin: 0; padding-left: 1.5em; }}
details {{ margin: 1em 0; padding: 0.5em 1em; border-radius: 4px; }}
details summary {{ cursor: pointer; font-weight: 600; }}
@media print {{
  pre, code {{ white-space: pre-wrap; word-wrap: break-word; }}
  img, table, .mermaid-container svg {{ break-inside: avoid; }}
}}
"#,
        size = pdf.css_page_size(),
        padding = pdf.margins.to_css(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Margins, Orientation, PageFormat};

    #[test]
    fn every_theme_has_a_stylesheet() {
        for theme in Theme::ALL {
            let css = stylesheet(theme);
            assert!(css.contains(".markdown-body"));
            assert!(css.contains(palette(theme).bg));
            assert!(css.contains(".custom-container.caution"));
        }
    }

    #[test]
    fn dark_themes_have_dark_backgrounds() {
        assert!(stylesheet(Theme::GithubDark).contains("#0d1117"));
        assert!(stylesheet(Theme::VscodeDark).contains("#1e1e1e"));
    }

    #[test]
    fn base_css_uses_zero_page_margin_and_padding() {
        let pdf = PdfOptions {
            format: PageFormat::Letter,
            orientation: Orientation::Landscape,
            margins: Margins::parse("10mm,20mm").unwrap(),
            ..PdfOptions::default()
        };
        let css = base_css(&pdf);
        assert!(css.contains("@page { size: Letter landscape; margin: 0; }"), "{css}");
        assert!(css.contains("padding: 10mm 20mm 10mm 20mm;"));
    }

    #[test]
    fn unitless_margins_become_pixel_padding() {
        let pdf = PdfOptions {
            margins: Margins::parse("1,2,3,0").unwrap(),
            ..PdfOptions::default()
        };
        let css = base_css(&pdf);
        assert!(css.contains("padding: 1px 2px 3px 0;"), "{css}");
    }

    #[test]
    fn theme_names_are_listed() {
        assert_eq!(
            available_themes(),
            vec!["github", "github-dark", "vscode-light", "vscode-dark"]
        );
    }
}
