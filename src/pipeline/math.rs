//! LaTeX math to MathML.
//!
//! MathML renders natively in Chrome, so the assembled document needs no
//! script to typeset formulas. A formula that fails to convert is shown as
//! its escaped source in an error-styled code element.

use latex2mathml::{latex_to_mathml, DisplayStyle};
use tracing::warn;

/// latex2mathml reports some errors inline instead of through `Err`.
const PARSE_ERROR_MARKER: &str = "[PARSE ERROR";

fn to_mathml(source: &str, style: DisplayStyle) -> Result<String, String> {
    let mathml = latex_to_mathml(source, style).map_err(|e| e.to_string())?;
    match mathml.find(PARSE_ERROR_MARKER) {
        Some(at) => {
            let detail = &mathml[at + 1..];
            let end = detail.find(']').unwrap_or(detail.len());
            Err(detail[..end].to_string())
        }
        None => Ok(mathml),
    }
}

/// Render `$…$` content.
pub fn render_inline(source: &str) -> String {
    match to_mathml(source, DisplayStyle::Inline) {
        Ok(mathml) => format!("<span class=\"math-inline\">{mathml}</span>"),
        Err(e) => {
            warn!("Inline math failed ({}): {}", e, source);
            format!(
                "<code class=\"math-error\">{}</code>",
                html_escape::encode_text(source)
            )
        }
    }
}

/// Render `$$…$$` content.
pub fn render_block(source: &str) -> String {
    match to_mathml(source, DisplayStyle::Block) {
        Ok(mathml) => format!("<div class=\"math-block\">{mathml}</div>\n"),
        Err(e) => {
            warn!("Block math failed ({}): {}", e, source);
            format!(
                "<pre class=\"math-error\"><code>{}</code></pre>\n",
                html_escape::encode_text(source)
            )
        }
    }
}

/// Stylesheet for rendered formulas and their error fallbacks.
pub fn css() -> &'static str {
    r#"
.math-inline math { font-size: 1.05em; }
.math-block { margin: 1em 0; overflow-x: auto; text-align: center; }
.math-block math { display: block; font-size: 1.15em; }
.math-error { color: #cb2431; background: #ffeef0; }
pre.math-error { padding: 0.5em 1em; border-radius: 4px; white-space: pre-wrap; }
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_produces_mathml_span() {
        let html = render_inline("x^2");
        assert!(html.starts_with("<span class=\"math-inline\">"), "{html}");
        assert!(html.contains("<math"));
        assert!(html.contains("<msup>"));
    }

    #[test]
    fn block_produces_mathml_div() {
        let html = render_block(r"\frac{a}{b}");
        assert!(html.starts_with("<div class=\"math-block\">"), "{html}");
        assert!(html.contains("<mfrac>"));
    }

    #[test]
    fn invalid_inline_falls_back_to_escaped_source() {
        let html = render_inline(r"\nosuchcommand{<a>}");
        assert!(html.starts_with("<code class=\"math-error\">"), "{html}");
        assert!(html.contains("&lt;a&gt;"));
    }

    #[test]
    fn invalid_block_falls_back_to_pre() {
        let html = render_block(r"\nosuchcommand x");
        assert!(html.starts_with("<pre class=\"math-error\"><code>"), "{html}");
    }

    #[test]
    fn errors_reported_inside_mathml_are_failures() {
        for source in [r"\nosuchcommand{x}", r"y = \undefinedmacro"] {
            let html = render_inline(source);
            assert!(html.starts_with("<code class=\"math-error\">"), "{source}: {html}");
            assert!(!html.contains("PARSE ERROR"));
        }
    }

    #[test]
    fn error_marker_is_detected() {
        let err = to_mathml(r"\nosuchcommand{x}", DisplayStyle::Inline).unwrap_err();
        assert!(err.starts_with("PARSE ERROR"), "{err}");
    }
}
