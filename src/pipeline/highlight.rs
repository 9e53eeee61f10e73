//! Syntax highlighting for fenced code blocks.
//!
//! Highlighting emits CSS classes rather than inline colours; the matching
//! stylesheet comes from [`css_for`] and is generated once per theme.

use crate::config::HighlightTheme;
use once_cell::sync::Lazy;
use syntect::highlighting::ThemeSet;
use syntect::html::{css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use tracing::{debug, warn};

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hl-" };

/// Render a code block as `<pre class="hljs"><code class="language-X">`.
///
/// The declared language is tried first, then detection from the first
/// line; when neither matches, or `enabled` is false, the code is escaped
/// as plain text.
pub fn highlight_block(code: &str, lang: Option<&str>, enabled: bool) -> String {
    let lang = lang.map(str::trim).filter(|l| !l.is_empty());
    let class_attr = lang
        .map(|l| format!(" class=\"language-{}\"", html_escape::encode_double_quoted_attribute(l)))
        .unwrap_or_default();

    let body = if enabled {
        find_syntax(code, lang)
            .and_then(|syntax| highlight_with(code, syntax))
            .unwrap_or_else(|| html_escape::encode_text(code).into_owned())
    } else {
        html_escape::encode_text(code).into_owned()
    };

    format!("<pre class=\"hljs\"><code{class_attr}>{body}</code></pre>\n")
}

fn find_syntax(code: &str, lang: Option<&str>) -> Option<&'static SyntaxReference> {
    let ss: &'static SyntaxSet = &SYNTAX_SET;
    if let Some(lang) = lang {
        if let Some(s) = ss
            .find_syntax_by_token(lang)
            .or_else(|| ss.find_syntax_by_token(&lang.to_lowercase()))
        {
            return Some(s);
        }
        debug!("No syntax for language '{}', trying detection", lang);
    }
    ss.find_syntax_by_first_line(code)
}

fn highlight_with(code: &str, syntax: &SyntaxReference) -> Option<String> {
    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, CLASS_STYLE);
    for line in LinesWithEndings::from(code) {
        if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
            warn!("Highlighting failed for {}: {}", syntax.name, e);
            return None;
        }
    }
    Some(generator.finalize())
}

/// Stylesheet for the classes emitted by [`highlight_block`].
pub fn css_for(theme: HighlightTheme) -> String {
    let Some(t) = THEME_SET.themes.get(theme.syntect_name()) else {
        warn!("Highlight theme '{}' is not bundled", theme.syntect_name());
        return String::new();
    };
    match css_for_theme_with_class_style(t, CLASS_STYLE) {
        Ok(css) => css,
        Err(e) => {
            warn!("Failed to generate highlight CSS: {}", e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_language_is_highlighted() {
        let html = highlight_block("fn main() {}\n", Some("rust"), true);
        assert!(html.starts_with("<pre class=\"hljs\"><code class=\"language-rust\">"));
        assert!(html.contains("<span class=\"hl-"), "{html}");
    }

    #[test]
    fn shebang_is_detected_without_language() {
        let html = highlight_block("#!/bin/bash\necho hi\n", None, true);
        assert!(html.contains("<span class=\"hl-"), "{html}");
    }

    #[test]
    fn unknown_language_never_panics() {
        let html = highlight_block("<b>x</b>", Some("no-such-lang"), true);
        assert!(html.contains("language-no-such-lang"));
        assert!(html.contains("&lt;b&gt;"));
    }

    #[test]
    fn disabled_highlighting_escapes() {
        let html = highlight_block("a < b\n", Some("rust"), false);
        assert_eq!(
            html,
            "<pre class=\"hljs\"><code class=\"language-rust\">a &lt; b\n</code></pre>\n"
        );
    }

    #[test]
    fn css_is_generated_for_both_themes() {
        assert!(css_for(HighlightTheme::Light).contains(".hl-"));
        assert!(css_for(HighlightTheme::Dark).contains(".hl-"));
    }
}
