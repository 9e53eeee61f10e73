//! Source pre-pass for the syntax CommonMark does not know.
//!
//! The pass walks the Markdown line by line with an ordered table of block
//! matchers, then walks each remaining text line with an ordered table of
//! inline matchers. Every matcher looks at the cursor and either claims a
//! span (returning a token and its length) or declines.
//!
//! Matched math is swapped for inert private-use placeholders that survive
//! `pulldown-cmark` untouched; callout containers become raw HTML blocks.
//! Everything else is passed through byte for byte.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Opens a placeholder. Private-use code point, never produced by Markdown.
pub const PH_OPEN: char = '\u{E000}';
/// Closes a placeholder.
pub const PH_CLOSE: char = '\u{E001}';

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E000}([MB])(\\d+)\u{E001}").unwrap());
static BLOCK_PARAGRAPH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("<p>(\u{E000}B\\d+\u{E001})</p>").unwrap());

const TYPED_CONTAINERS: [&str; 7] = [
    "warning",
    "info",
    "tip",
    "danger",
    "note",
    "important",
    "caution",
];

// ── Tokens ───────────────────────────────────────────────────────────────

/// Callout flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerKind {
    /// One of `warning info tip danger note important caution`.
    Typed(&'static str),
    /// `::: details` collapsible block.
    Details,
}

/// Block-level token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockToken<'a> {
    /// A fenced code block, opening and closing lines included.
    Fence(Vec<&'a str>),
    /// `$$ … $$`; `indent` is the opening line's leading whitespace.
    Math { indent: &'a str, source: String },
    ContainerOpen {
        kind: ContainerKind,
        title: String,
        colons: usize,
    },
    ContainerClose,
    /// Any other line.
    Line(&'a str),
}

/// Inline token within a single text line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineToken<'a> {
    /// Backslash plus the escaped character.
    Escape(&'a str),
    /// A complete code span, backticks included.
    CodeSpan(&'a str),
    /// `$…$` content, delimiters excluded.
    Math(&'a str),
    Text(&'a str),
}

/// Result of the pre-pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prepared {
    /// Markdown with placeholders, ready for `pulldown-cmark`.
    pub markdown: String,
    /// Inline formula sources, indexed by placeholder number.
    pub inline_math: Vec<String>,
    /// Display formula sources, indexed by placeholder number.
    pub block_math: Vec<String>,
}

impl Prepared {
    /// Put formula sources back in place of their placeholders, for text
    /// that ended up inside code.
    pub fn restore_math<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if !text.contains(PH_OPEN) {
            return Cow::Borrowed(text);
        }
        PLACEHOLDER_RE.replace_all(text, |caps: &regex::Captures| {
            let idx: usize = caps[2].parse().unwrap_or(usize::MAX);
            match &caps[1] {
                "M" => self
                    .inline_math
                    .get(idx)
                    .map(|s| format!("${s}$"))
                    .unwrap_or_default(),
                _ => self
                    .block_math
                    .get(idx)
                    .map(|s| format!("$$\n{s}\n$$"))
                    .unwrap_or_default(),
            }
        })
    }

    /// Replace placeholders in rendered HTML. A block placeholder that
    /// `pulldown-cmark` wrapped in `<p>` loses the wrapper.
    pub fn substitute(
        &self,
        html: &str,
        inline: impl Fn(&str) -> String,
        block: impl Fn(&str) -> String,
    ) -> String {
        if !html.contains(PH_OPEN) {
            return html.to_string();
        }
        let unwrapped = BLOCK_PARAGRAPH_RE.replace_all(html, "$1");
        PLACEHOLDER_RE
            .replace_all(&unwrapped, |caps: &regex::Captures| {
                let idx: usize = caps[2].parse().unwrap_or(usize::MAX);
                match &caps[1] {
                    "M" => self.inline_math.get(idx).map(|s| inline(s)).unwrap_or_default(),
                    _ => self.block_math.get(idx).map(|s| block(s)).unwrap_or_default(),
                }
            })
            .into_owned()
    }
}

// ── Block matchers ───────────────────────────────────────────────────────

/// What a block matcher sees.
struct BlockCursor<'c, 'a> {
    lines: &'c [&'a str],
    at: usize,
    math: bool,
    /// Colon counts of the open containers, innermost last.
    open: &'c [usize],
}

impl<'a> BlockCursor<'_, 'a> {
    fn line(&self) -> &'a str {
        self.lines[self.at]
    }
}

type BlockMatcher = for<'c, 'a> fn(&BlockCursor<'c, 'a>) -> Option<(BlockToken<'a>, usize)>;

const BLOCK_MATCHERS: [BlockMatcher; 4] = [
    match_fence,
    match_math_block,
    match_container_open,
    match_container_close,
];

fn fence_marker(line: &str) -> Option<(char, usize)> {
    let t = line.trim_start();
    let c = t.chars().next()?;
    if c != '`' && c != '~' {
        return None;
    }
    let n = t.chars().take_while(|&x| x == c).count();
    (n >= 3).then_some((c, n))
}

fn match_fence<'a>(cur: &BlockCursor<'_, 'a>) -> Option<(BlockToken<'a>, usize)> {
    let (c, n) = fence_marker(cur.line())?;
    if c == '`' && cur.line().trim_start()[n..].contains('`') {
        return None;
    }
    let mut end = cur.at + 1;
    while end < cur.lines.len() {
        let t = cur.lines[end].trim();
        let run = t.chars().take_while(|&x| x == c).count();
        end += 1;
        if run >= n && run == t.chars().count() {
            break;
        }
    }
    let lines = cur.lines[cur.at..end].to_vec();
    Some((BlockToken::Fence(lines), end - cur.at))
}

fn match_math_block<'a>(cur: &BlockCursor<'_, 'a>) -> Option<(BlockToken<'a>, usize)> {
    if !cur.math {
        return None;
    }
    let line = cur.line();
    let body = line.trim_start();
    let first = body.strip_prefix("$$")?;
    let indent = &line[..line.len() - body.len()];

    let close = (cur.at + 1..cur.lines.len()).find(|&i| cur.lines[i].trim() == "$$")?;

    let mut source = String::from(first);
    for l in &cur.lines[cur.at + 1..close] {
        source.push('\n');
        source.push_str(l);
    }
    Some((
        BlockToken::Math {
            indent,
            source: source.trim().to_string(),
        },
        close + 1 - cur.at,
    ))
}

fn colon_run(line: &str) -> (usize, &str) {
    let t = line.trim_start();
    let n = t.chars().take_while(|&c| c == ':').count();
    (n, &t[n..])
}

fn match_container_open<'a>(cur: &BlockCursor<'_, 'a>) -> Option<(BlockToken<'a>, usize)> {
    let (colons, rest) = colon_run(cur.line());
    if colons < 3 {
        return None;
    }
    let params = rest.trim();
    if params.is_empty() {
        return None;
    }

    let first = params.split(' ').next().unwrap_or_default();
    let (kind, title) = if let Some(&name) = TYPED_CONTAINERS.iter().find(|&&t| t == first) {
        let title = params[name.len()..].trim();
        (ContainerKind::Typed(name), title_or(title, &capitalize(name)))
    } else if let Some(title) = params.strip_prefix("details") {
        (ContainerKind::Details, title_or(title.trim(), "Details"))
    } else {
        return None;
    };

    Some((
        BlockToken::ContainerOpen {
            kind,
            title,
            colons,
        },
        1,
    ))
}

fn match_container_close<'a>(cur: &BlockCursor<'_, 'a>) -> Option<(BlockToken<'a>, usize)> {
    let (colons, rest) = colon_run(cur.line());
    let innermost = *cur.open.last()?;
    (colons >= innermost && rest.trim().is_empty()).then_some((BlockToken::ContainerClose, 1))
}

fn title_or(title: &str, fallback: &str) -> String {
    if title.is_empty() {
        fallback.to_string()
    } else {
        title.to_string()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Split `text` into block tokens.
pub fn tokenize_blocks(text: &str, math: bool) -> Vec<BlockToken<'_>> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut tokens = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut at = 0;

    while at < lines.len() {
        let cursor = BlockCursor {
            lines: &lines,
            at,
            math,
            open: &open,
        };
        let (token, len) = BLOCK_MATCHERS
            .iter()
            .find_map(|m| m(&cursor))
            .unwrap_or((BlockToken::Line(lines[at]), 1));

        match &token {
            BlockToken::ContainerOpen { colons, .. } => open.push(*colons),
            BlockToken::ContainerClose => {
                open.pop();
            }
            _ => {}
        }
        tokens.push(token);
        at += len;
    }

    // Unclosed containers end with the document.
    tokens.extend(open.iter().map(|_| BlockToken::ContainerClose));
    tokens
}

// ── Inline matchers ──────────────────────────────────────────────────────

type InlineMatcher = for<'a> fn(&'a str, usize, bool) -> Option<(InlineToken<'a>, usize)>;

const INLINE_MATCHERS: [InlineMatcher; 3] = [match_escape, match_code_span, match_inline_math];

fn match_escape(line: &str, at: usize, _math: bool) -> Option<(InlineToken<'_>, usize)> {
    let rest = &line[at..];
    let mut chars = rest.chars();
    if chars.next()? != '\\' {
        return None;
    }
    let len = 1 + chars.next()?.len_utf8();
    Some((InlineToken::Escape(&rest[..len]), len))
}

fn match_code_span(line: &str, at: usize, _math: bool) -> Option<(InlineToken<'_>, usize)> {
    let rest = &line[at..];
    let n = rest.bytes().take_while(|&b| b == b'`').count();
    if n == 0 {
        return None;
    }
    let mut i = n;
    while i < rest.len() {
        let run = rest[i..].bytes().take_while(|&b| b == b'`').count();
        if run == n {
            return Some((InlineToken::CodeSpan(&rest[..i + n]), i + n));
        }
        i += run.max(1);
        while !rest.is_char_boundary(i) {
            i += 1;
        }
    }
    // No closer: the whole run is literal.
    Some((InlineToken::Text(&rest[..n]), n))
}

fn match_inline_math(line: &str, at: usize, math: bool) -> Option<(InlineToken<'_>, usize)> {
    if !math {
        return None;
    }
    let rest = &line[at..];
    let bytes = rest.as_bytes();
    if bytes.first() != Some(&b'$') {
        return None;
    }
    match bytes.get(1) {
        Some(b'$') => return Some((InlineToken::Text(&rest[..2]), 2)),
        Some(b'{') | None => return None,
        _ => {}
    }
    let mut end = 1;
    while end < bytes.len() && bytes[end] != b'$' {
        if bytes[end] == b'\\' {
            end += 1;
        }
        end += 1;
    }
    if end >= bytes.len() {
        return None;
    }
    Some((InlineToken::Math(&rest[1..end]), end + 1))
}

/// Split one line into inline tokens; adjacent text is merged.
pub fn tokenize_inline(line: &str, math: bool) -> Vec<InlineToken<'_>> {
    let mut tokens: Vec<InlineToken<'_>> = Vec::new();
    let mut text_start: Option<usize> = None;
    let mut at = 0;

    while at < line.len() {
        match INLINE_MATCHERS.iter().find_map(|m| m(line, at, math)) {
            Some((token, len)) => {
                if let Some(s) = text_start.take() {
                    tokens.push(InlineToken::Text(&line[s..at]));
                }
                tokens.push(token);
                at += len;
            }
            None => {
                text_start.get_or_insert(at);
                at += line[at..].chars().next().map_or(1, char::len_utf8);
            }
        }
    }
    if let Some(s) = text_start {
        tokens.push(InlineToken::Text(&line[s..]));
    }
    tokens
}

// ── Assembly ─────────────────────────────────────────────────────────────

/// Run the pre-pass over a document body.
pub fn prepare(text: &str, math: bool) -> Prepared {
    let mut out = Prepared::default();
    let mut closers: Vec<&'static str> = Vec::new();
    let mut md = String::with_capacity(text.len());

    for token in tokenize_blocks(text, math) {
        match token {
            BlockToken::Fence(lines) => {
                for l in lines {
                    md.push_str(l);
                    md.push('\n');
                }
            }
            BlockToken::Math { indent, source } => {
                md.push_str(&format!(
                    "\n{indent}{PH_OPEN}B{}{PH_CLOSE}\n\n",
                    out.block_math.len()
                ));
                out.block_math.push(source);
            }
            BlockToken::ContainerOpen { kind, title, .. } => {
                let title = html_escape::encode_text(&title);
                match kind {
                    ContainerKind::Typed(name) => {
                        md.push_str(&format!(
                            "\n<div class=\"custom-container {name}\">\n<p class=\"custom-container-title\">{title}</p>\n\n"
                        ));
                        closers.push("\n</div>\n\n");
                    }
                    ContainerKind::Details => {
                        md.push_str(&format!("\n<details>\n<summary>{title}</summary>\n\n"));
                        closers.push("\n</details>\n\n");
                    }
                }
            }
            BlockToken::ContainerClose => {
                if let Some(c) = closers.pop() {
                    md.push_str(c);
                }
            }
            BlockToken::Line(line) => {
                for t in tokenize_inline(line, math) {
                    match t {
                        InlineToken::Math(src) => {
                            md.push_str(&format!(
                                "{PH_OPEN}M{}{PH_CLOSE}",
                                out.inline_math.len()
                            ));
                            out.inline_math.push(src.to_string());
                        }
                        InlineToken::Escape(s) | InlineToken::CodeSpan(s) | InlineToken::Text(s) => {
                            md.push_str(s)
                        }
                    }
                }
                md.push('\n');
            }
        }
    }

    // `split('\n')` yields one more line than there are newlines.
    if md.ends_with('\n') {
        md.pop();
    }
    out.markdown = md;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_math_becomes_placeholder() {
        let p = prepare("Area $x^2$ here", true);
        assert_eq!(p.inline_math, vec!["x^2"]);
        assert_eq!(p.markdown, "Area \u{E000}M0\u{E001} here");
    }

    #[test]
    fn unclosed_dollar_is_literal() {
        let p = prepare("costs $5 (no closing)", true);
        assert!(p.inline_math.is_empty());
        assert_eq!(p.markdown, "costs $5 (no closing)");
    }

    #[test]
    fn escaped_dollar_never_opens_math() {
        let p = prepare(r"price \$5 and \$6", true);
        assert!(p.inline_math.is_empty());
    }

    #[test]
    fn dollar_brace_and_double_dollar_are_literal() {
        let p = prepare("${toc} and $$ inline", true);
        assert!(p.inline_math.is_empty());
        assert_eq!(p.markdown, "${toc} and $$ inline");
    }

    #[test]
    fn escaped_dollar_inside_math() {
        let p = prepare(r"$a \$ b$", true);
        assert_eq!(p.inline_math, vec![r"a \$ b"]);
    }

    #[test]
    fn code_span_protects_dollars() {
        let p = prepare("`$x$` and ``a ` $y$``", true);
        assert!(p.inline_math.is_empty());
    }

    #[test]
    fn math_disabled_is_plain() {
        let p = prepare("$x$\n$$\ny\n$$\n", false);
        assert!(p.inline_math.is_empty() && p.block_math.is_empty());
        assert_eq!(p.markdown, "$x$\n$$\ny\n$$\n");
    }

    #[test]
    fn block_math_is_trimmed() {
        let p = prepare("before\n\n  $$\n  E = mc^2\n  $$\nafter\n", true);
        assert_eq!(p.block_math, vec!["E = mc^2"]);
        assert!(p.markdown.contains("\n  \u{E000}B0\u{E001}\n\n"));
        assert!(p.markdown.ends_with("after\n"));
    }

    #[test]
    fn unterminated_block_math_falls_through() {
        let p = prepare("$$\nx + y\n", true);
        assert!(p.block_math.is_empty());
    }

    #[test]
    fn fenced_code_is_untouched() {
        let src = "```\n$x$\n::: tip\n```\n";
        let p = prepare(src, true);
        assert_eq!(p.markdown, src);
        assert!(p.inline_math.is_empty());
    }

    #[test]
    fn longer_fence_needs_longer_close() {
        let blocks = tokenize_blocks("````\n```\n$a$\n````\nafter", true);
        assert!(matches!(&blocks[0], BlockToken::Fence(l) if l.len() == 4));
        assert_eq!(blocks[1], BlockToken::Line("after"));
    }

    #[test]
    fn typed_container_with_default_title() {
        let p = prepare("::: warning\nCareful\n:::\n", true);
        assert!(p.markdown.contains("<div class=\"custom-container warning\">"));
        assert!(p.markdown.contains("<p class=\"custom-container-title\">Warning</p>"));
        assert!(p.markdown.contains("</div>"));
    }

    #[test]
    fn container_name_is_exact_and_case_sensitive() {
        let blocks = tokenize_blocks("::: Warning\n:::\n::: tipster\n", true);
        assert!(blocks.iter().all(|b| matches!(b, BlockToken::Line(_))));
    }

    #[test]
    fn details_container_uses_prefix() {
        let p = prepare("::: details Click <me>\nhidden\n:::", true);
        assert!(p.markdown.contains("<summary>Click &lt;me&gt;</summary>"));
        assert!(p.markdown.contains("</details>"));
    }

    #[test]
    fn nested_containers_use_more_colons_outside() {
        let blocks = tokenize_blocks(":::: note Outer\n::: tip\ninner\n:::\nouter text\n::::\n", true);
        let opens = blocks
            .iter()
            .filter(|b| matches!(b, BlockToken::ContainerOpen { .. }))
            .count();
        let closes = blocks
            .iter()
            .filter(|b| matches!(b, BlockToken::ContainerClose))
            .count();
        assert_eq!((opens, closes), (2, 2));
        assert_eq!(blocks[4], BlockToken::Line("outer text"));
    }

    #[test]
    fn unclosed_container_closes_at_end() {
        let p = prepare("::: info\nno close", true);
        assert!(p.markdown.trim_end().ends_with("</div>"));
    }

    #[test]
    fn restore_math_for_code() {
        let p = prepare("$a$\n\n$$\nb\n$$\n", true);
        let restored = p.restore_math("x \u{E000}M0\u{E001} \u{E000}B0\u{E001}");
        assert_eq!(restored, "x $a$ $$\nb\n$$");
    }

    #[test]
    fn substitute_unwraps_block_paragraphs() {
        let p = prepare("$a$\n\n$$\nb\n$$\n", true);
        let html = "<p>\u{E000}M0\u{E001}</p>\n<p>\u{E000}B0\u{E001}</p>\n";
        let out = p.substitute(html, |s| format!("[i:{s}]"), |s| format!("[b:{s}]"));
        assert_eq!(out, "<p>[i:a]</p>\n[b:b]\n");
    }

    #[test]
    fn inline_tokens_are_ordered() {
        let toks = tokenize_inline(r"a \* `c` $d$", true);
        assert_eq!(
            toks,
            vec![
                InlineToken::Text("a "),
                InlineToken::Escape(r"\*"),
                InlineToken::Text(" "),
                InlineToken::CodeSpan("`c`"),
                InlineToken::Text(" "),
                InlineToken::Math("d"),
            ]
        );
    }
}
