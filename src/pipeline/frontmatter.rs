//! Front-matter extraction and display.
//!
//! A document may open with a YAML block fenced by `---` lines. The block is
//! split off, parsed into an insertion-ordered mapping, and (when non-empty)
//! rendered as a header table above the body.
//!
//! Extraction never fails: an unterminated block, invalid YAML or YAML that
//! is not a mapping is logged and the whole input is treated as body.

use crate::config::PdfOverrides;
use crate::error::MdPressError;
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

/// Parsed front-matter metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    data: Mapping,
}

impl FrontMatter {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Raw value for a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// The underlying mapping, in document order.
    pub fn data(&self) -> &Mapping {
        &self.data
    }

    /// `title:` as display text.
    pub fn title(&self) -> Option<String> {
        self.get("title").and_then(scalar_text)
    }

    /// `theme:` as given (not validated).
    pub fn theme(&self) -> Option<String> {
        self.get("theme").and_then(scalar_text)
    }

    /// `pdf:` deserialised into overrides; `Ok(None)` when absent.
    pub fn pdf(&self) -> Result<Option<PdfOverrides>, MdPressError> {
        match self.get("pdf") {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_yaml::from_value(v.clone())
                .map(Some)
                .map_err(|e| MdPressError::Parse(format!("front-matter pdf block: {e}"))),
        }
    }

    /// Render the metadata as a nested header table.
    ///
    /// Returns `None` when there is nothing to show.
    pub fn to_html_table(&self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(format!(
            "<div class=\"frontmatter-wrapper\">{}</div>\n",
            render_table(&self.data)
        ))
    }
}

/// Split `text` into front matter and body.
///
/// Without an opening `---` line the body is `text` unchanged.
pub fn extract(text: &str) -> (FrontMatter, String) {
    match try_extract(text) {
        Some(Ok((data, body))) => {
            debug!("Front matter: {} key(s)", data.len());
            (FrontMatter { data }, body.to_string())
        }
        Some(Err(reason)) => {
            warn!("Failed to parse front matter: {}", reason);
            (FrontMatter::default(), text.to_string())
        }
        None => (FrontMatter::default(), text.to_string()),
    }
}

/// Whether the raw input opens with a front-matter fence.
pub fn starts_with_fence(text: &str) -> bool {
    text.trim_start_matches('\u{feff}').starts_with("---")
}

/// `None`: no opening fence. `Some(Err)`: malformed block.
fn try_extract(text: &str) -> Option<Result<(Mapping, &str), String>> {
    let content = text.strip_prefix('\u{feff}').unwrap_or(text);

    let (first, mut rest) = split_line(content);
    if first.trim_end() != "---" {
        return None;
    }

    let yaml_start = content.len() - rest.len();
    loop {
        if rest.is_empty() {
            return Some(Err("unterminated front-matter block".to_string()));
        }
        let line_start = content.len() - rest.len();
        let (line, after) = split_line(rest);
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let yaml = &content[yaml_start..line_start];
            return Some(parse_mapping(yaml).map(|data| (data, after)));
        }
        rest = after;
    }
}

/// Returns the line (without its terminator) and the remainder after it.
fn split_line(s: &str) -> (&str, &str) {
    match s.find('\n') {
        Some(i) => (s[..i].trim_end_matches('\r'), &s[i + 1..]),
        None => (s, ""),
    }
}

fn parse_mapping(yaml: &str) -> Result<Mapping, String> {
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(m)) => Ok(m),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(other) => Err(format!("expected a mapping, found {}", type_name(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

// ── Display table ────────────────────────────────────────────────────────

fn as_branch(v: &Value) -> Option<&Mapping> {
    match v {
        Value::Mapping(m) if !m.is_empty() => Some(m),
        Value::Tagged(t) => as_branch(&t.value),
        _ => None,
    }
}

/// Leaf columns under `v`.
fn columns(v: &Value) -> usize {
    match as_branch(v) {
        Some(m) => m.values().map(columns).sum(),
        None => 1,
    }
}

/// Nesting depth of `v`; leaves are 1.
fn depth(v: &Value) -> usize {
    match as_branch(v) {
        Some(m) => 1 + m.values().map(depth).max().unwrap_or(0),
        None => 1,
    }
}

fn render_table(data: &Mapping) -> String {
    let total_rows = data.values().map(depth).max().unwrap_or(1) + 1;
    let mut rows: Vec<String> = vec![String::new(); total_rows];

    for (key, value) in data {
        place(key, value, 0, total_rows, &mut rows);
    }

    let mut html = String::from("<table class=\"frontmatter-table\">\n");
    for row in rows {
        html.push_str("  <tr>\n");
        html.push_str(&row);
        html.push_str("  </tr>\n");
    }
    html.push_str("</table>\n");
    html
}

/// Emit the header cell for `key` on row `level`, then either recurse into
/// its children or emit its value cell spanning to the last row.
fn place(key: &Value, value: &Value, level: usize, total_rows: usize, rows: &mut [String]) {
    let key_text = html_escape::encode_text(&scalar_text(key).unwrap_or_default()).into_owned();
    rows[level].push_str(&format!(
        "    <th colspan=\"{}\">{}</th>\n",
        columns(value),
        key_text
    ));

    match as_branch(value) {
        Some(children) => {
            for (k, v) in children {
                place(k, v, level + 1, total_rows, rows);
            }
        }
        None => {
            let row = level + 1;
            rows[row].push_str(&format!(
                "    <td rowspan=\"{}\">{}</td>\n",
                total_rows - row,
                html_escape::encode_text(&display_value(value))
            ));
        }
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(t) => scalar_text(&t.value),
        _ => None,
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Sequence(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Mapping(m) if m.is_empty() => String::new(),
        Value::Mapping(_) => serde_json::to_string(v).unwrap_or_default(),
        Value::Tagged(t) => display_value(&t.value),
        other => scalar_text(other).unwrap_or_default(),
    }
}
