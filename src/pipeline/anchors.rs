//! Heading anchors and the table of contents.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w-]").unwrap());
static DASHES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").unwrap());

/// Turn heading text into an anchor id.
///
/// Lowercase, trim, whitespace runs become `-`, characters that are neither
/// word characters nor `-` are dropped, repeated `-` collapse. Word
/// characters are Unicode-aware, so `Überblick` keeps its umlaut.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let dashed = WHITESPACE_RE.replace_all(lower.trim(), "-");
    let cleaned = NON_WORD_RE.replace_all(&dashed, "");
    DASHES_RE.replace_all(&cleaned, "-").into_owned()
}

/// Hands out unique slugs for one document: repeats get `-1`, `-2`, ….
#[derive(Debug, Default)]
pub struct Slugger {
    seen: HashMap<String, usize>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slug(&mut self, text: &str) -> String {
        self.unique(slugify(text))
    }

    /// Reserve an explicit id (e.g. from `{: #id}`) so later slugs avoid it.
    pub fn unique(&mut self, base: String) -> String {
        match self.seen.get(&base).copied() {
            None => {
                self.seen.insert(base.clone(), 0);
                base
            }
            Some(mut n) => loop {
                n += 1;
                let candidate = format!("{base}-{n}");
                if !self.seen.contains_key(&candidate) {
                    self.seen.insert(base.clone(), n);
                    self.seen.insert(candidate.clone(), 0);
                    break candidate;
                }
            },
        }
    }
}

/// One heading as seen by the table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingEntry {
    pub level: u8,
    pub id: String,
    /// Plain text, unescaped.
    pub text: String,
}

/// Build the nested `<nav class="table-of-contents">` list for headings up
/// to `max_depth`. Returns an empty string when no heading qualifies.
pub fn render_toc(headings: &[HeadingEntry], max_depth: u8) -> String {
    let items: Vec<&HeadingEntry> = headings.iter().filter(|h| h.level <= max_depth).collect();
    if items.is_empty() {
        return String::new();
    }

    let mut html = String::from("<nav class=\"table-of-contents\">\n");
    // Levels of the currently open <ul> elements.
    let mut stack: Vec<u8> = Vec::new();

    for h in items {
        match stack.last().copied() {
            None => {
                html.push_str("<ul>\n");
                stack.push(h.level);
            }
            Some(top) if h.level > top => {
                html.push_str("\n<ul>\n");
                stack.push(h.level);
            }
            Some(_) => {
                html.push_str("</li>\n");
                while let Some(&top) = stack.last() {
                    if stack.len() == 1 || h.level >= top {
                        break;
                    }
                    if stack[stack.len() - 2] < h.level {
                        // Shallower than its siblings but deeper than the parent.
                        if let Some(last) = stack.last_mut() {
                            *last = h.level;
                        }
                        break;
                    }
                    stack.pop();
                    html.push_str("</ul>\n</li>\n");
                }
            }
        }
        html.push_str(&format!(
            "<li><a href=\"#{}\">{}</a>",
            html_escape::encode_double_quoted_attribute(&h.id),
            html_escape::encode_text(&h.text)
        ));
    }

    html.push_str("</li>\n");
    while stack.len() > 1 {
        stack.pop();
        html.push_str("</ul>\n</li>\n");
    }
    html.push_str("</ul>\n</nav>\n");
    html
}
