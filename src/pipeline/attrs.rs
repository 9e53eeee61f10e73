//! Inline attribute blocks: `{: #id .class key=value key="quoted value"}`.
//!
//! Only `id`, `class`, `style`, `width` and `height` survive; everything
//! else is dropped.

use pulldown_cmark::CowStr;
use tracing::debug;

const ALLOWED: [&str; 5] = ["id", "class", "style", "width", "height"];

/// Parsed, allow-listed attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs {
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// `style`, `width`, `height`, in source order.
    pub other: Vec<(String, String)>,
}

impl Attrs {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.classes.is_empty() && self.other.is_empty()
    }

    /// Parse the inside of a `{: … }` block.
    pub fn parse(inner: &str) -> Attrs {
        let mut attrs = Attrs::default();
        for token in tokenize(inner) {
            if let Some(id) = token.strip_prefix('#') {
                if !id.is_empty() {
                    attrs.id = Some(id.to_string());
                }
            } else if let Some(class) = token.strip_prefix('.') {
                if !class.is_empty() {
                    attrs.classes.push(class.to_string());
                }
            } else if let Some((key, value)) = token.split_once('=') {
                let value = unquote(value);
                match key {
                    "id" => attrs.id = Some(value.to_string()),
                    "class" => attrs
                        .classes
                        .extend(value.split_whitespace().map(str::to_string)),
                    k if ALLOWED.contains(&k) => attrs.other.push((k.to_string(), value.to_string())),
                    k => debug!("Dropping attribute '{}'", k),
                }
            } else {
                debug!("Dropping attribute '{}'", token);
            }
        }
        attrs
    }

    /// Render as ` id="…" class="…" key="…"` (leading space, escaped).
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        if let Some(ref id) = self.id {
            push_attr(&mut out, "id", id);
        }
        if !self.classes.is_empty() {
            push_attr(&mut out, "class", &self.classes.join(" "));
        }
        for (k, v) in &self.other {
            push_attr(&mut out, k, v);
        }
        out
    }

    /// The `other` list in the shape `pulldown_cmark::Tag::Heading` expects.
    pub fn heading_attrs<'a>(&self) -> Vec<(CowStr<'a>, Option<CowStr<'a>>)> {
        self.other
            .iter()
            .map(|(k, v)| (CowStr::from(k.clone()), Some(CowStr::from(v.clone()))))
            .collect()
    }
}

fn push_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    out.push_str(&html_escape::encode_double_quoted_attribute(value));
    out.push('"');
}

/// Split on whitespace, keeping double-quoted values together.
fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in s.chars() {
        match c {
            '"' | '\u{201c}' | '\u{201d}' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Smart punctuation may already have curled the quotes.
fn unquote(v: &str) -> &str {
    v.strip_prefix(['"', '\u{201c}'])
        .and_then(|v| v.strip_suffix(['"', '\u{201d}']))
        .unwrap_or(v)
}

/// If `text` ends with a `{: … }` block, return the text before it
/// (trailing whitespace removed) and the parsed attributes.
pub fn split_trailing(text: &str) -> Option<(&str, Attrs)> {
    let trimmed = text.trim_end();
    let inner_end = trimmed.strip_suffix('}')?;
    let open = inner_end.rfind("{:")?;
    let inner = &inner_end[open + 2..];
    if inner.contains('{') || inner.contains('}') {
        return None;
    }
    Some((trimmed[..open].trim_end(), Attrs::parse(inner)))
}

/// If `text` starts with a `{: … }` block, return the parsed attributes and
/// the text after it.
pub fn split_leading(text: &str) -> Option<(Attrs, &str)> {
    let rest = text.strip_prefix("{:")?;
    let close = rest.find('}')?;
    let inner = &rest[..close];
    if inner.contains('{') {
        return None;
    }
    Some((Attrs::parse(inner), &rest[close + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shorthand_and_pairs() {
        let a = Attrs::parse(r#" #intro .lead .wide style="color: red" width=300 "#);
        assert_eq!(a.id.as_deref(), Some("intro"));
        assert_eq!(a.classes, vec!["lead", "wide"]);
        assert_eq!(
            a.other,
            vec![
                ("style".to_string(), "color: red".to_string()),
                ("width".to_string(), "300".to_string())
            ]
        );
    }

    #[test]
    fn drops_disallowed_keys() {
        let a = Attrs::parse(r#"onclick="alert(1)" data-x=1 height=2"#);
        assert_eq!(a.other, vec![("height".to_string(), "2".to_string())]);
        assert!(!a.to_html().contains("onclick"));
    }

    #[test]
    fn curly_quotes_are_unquoted() {
        let a = Attrs::parse("style=\u{201c}color: red\u{201d}");
        assert_eq!(a.other[0].1, "color: red");
    }

    #[test]
    fn renders_escaped() {
        let a = Attrs::parse(r#"style="a&b""#);
        assert_eq!(a.to_html(), " style=\"a&amp;b\"");
    }

    #[test]
    fn trailing_block() {
        let (rest, a) = split_trailing("Title {: #t .x}").unwrap();
        assert_eq!(rest, "Title");
        assert_eq!(a.id.as_deref(), Some("t"));
        assert!(split_trailing("no attrs here").is_none());
        assert!(split_trailing("set {a}").is_none());
    }

    #[test]
    fn leading_block() {
        let (a, rest) = split_leading("{: width=50} tail").unwrap();
        assert_eq!(a.other[0].1, "50");
        assert_eq!(rest, " tail");
    }
}
