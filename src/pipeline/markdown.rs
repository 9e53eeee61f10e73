//! Markdown to HTML with the extension set.
//!
//! ```text
//! body ──▶ scan::prepare ──▶ pulldown-cmark ──▶ Rewriter ──▶ push_html ──▶ substitute
//!          (math, callouts)   (CommonMark+GFM)  (headings,     (HTML)     (math, TOC)
//!                                                code, notes…)
//! ```
//!
//! The [`Rewriter`] edits the event stream in place: it owns the output
//! vector and patches earlier events (a paragraph's start tag, an item's
//! `<li>`) once later events reveal attributes or task markers.

use crate::config::ConversionConfig;
use crate::pipeline::anchors::{self, HeadingEntry, Slugger};
use crate::pipeline::attrs::{self, Attrs};
use crate::pipeline::frontmatter::{self, FrontMatter};
use crate::pipeline::scan::{self, Prepared, PH_CLOSE, PH_OPEN};
use crate::pipeline::{highlight, math};
use base64::Engine as _;
use once_cell::sync::Lazy;
use pulldown_cmark::{
    html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, TextMergeStream,
};
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("https?://[^\\s<>\"\u{E000}\u{E001}]+").unwrap());
static EMOJI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r":([a-zA-Z0-9_+\-]+):").unwrap());

const TOC_MARKERS: [&str; 3] = ["[[toc]]", "${toc}", "[TOC]"];

fn toc_placeholder() -> String {
    format!("{PH_OPEN}T{PH_CLOSE}")
}

/// Extension switches, taken from [`ConversionConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkdownOptions {
    pub math: bool,
    pub emoji: bool,
    pub highlight: bool,
    pub toc: bool,
    pub toc_depth: u8,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        MarkdownOptions::from(&ConversionConfig::default())
    }
}

impl From<&ConversionConfig> for MarkdownOptions {
    fn from(c: &ConversionConfig) -> Self {
        Self {
            math: c.math,
            emoji: c.emoji,
            highlight: c.highlight,
            toc: c.toc,
            toc_depth: c.toc_depth,
        }
    }
}

/// A diagram block left for the browser to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramPlaceholder {
    /// Element id, `diagram-N`.
    pub id: String,
    /// Trimmed diagram source.
    pub source: String,
}

/// Output of [`render`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedFragment {
    pub html: String,
    pub diagrams: Vec<DiagramPlaceholder>,
    pub headings: Vec<HeadingEntry>,
}

/// A parsed document: metadata, body, rendered HTML and the configuration
/// after front-matter overrides.
#[derive(Debug, Clone)]
pub struct ParsedMarkdown {
    pub front_matter: FrontMatter,
    pub body: String,
    pub fragment: RenderedFragment,
    pub config: ConversionConfig,
}

/// Split front matter, merge its overrides into `config`, and render the body.
///
/// When the document opens with non-empty front matter, its table is placed
/// above the body.
pub fn parse_markdown(text: &str, config: &ConversionConfig) -> ParsedMarkdown {
    let (front_matter, body) = frontmatter::extract(text);
    let config = config.with_front_matter(&front_matter);

    let mut fragment = render(&body, &MarkdownOptions::from(&config));
    if frontmatter::starts_with_fence(text) {
        if let Some(table) = front_matter.to_html_table() {
            fragment.html.insert_str(0, &table);
        }
    }

    debug!("Markdown parsed: {} bytes of HTML", fragment.html.len());
    ParsedMarkdown {
        front_matter,
        body,
        fragment,
        config,
    }
}

/// Render a Markdown body (no front matter) to an HTML fragment.
pub fn render(body: &str, opts: &MarkdownOptions) -> RenderedFragment {
    let prepared = scan::prepare(body, opts.math);

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);

    let parser = TextMergeStream::new(Parser::new_ext(&prepared.markdown, options));
    let mut rewriter = Rewriter::new(opts, &prepared);
    for event in parser {
        rewriter.push(event);
    }
    let Finished {
        events,
        footnotes,
        diagrams,
        headings,
    } = rewriter.finish();

    let mut html_out = String::with_capacity(prepared.markdown.len() * 3 / 2);
    html::push_html(&mut html_out, events.into_iter());
    html_out.push_str(&footnotes);

    if opts.math {
        html_out = prepared.substitute(&html_out, math::render_inline, math::render_block);
    }

    if opts.toc {
        let toc = anchors::render_toc(&headings, opts.toc_depth);
        let marker = toc_placeholder();
        if html_out.contains(&marker) {
            html_out = html_out.replace(&marker, &toc);
        } else {
            html_out.insert_str(0, &toc);
        }
    }

    RenderedFragment {
        html: html_out,
        diagrams,
        headings,
    }
}

// ── Event rewriting ──────────────────────────────────────────────────────

struct Finished<'a> {
    events: Vec<Event<'a>>,
    footnotes: String,
    diagrams: Vec<DiagramPlaceholder>,
    headings: Vec<HeadingEntry>,
}

struct CodeBuf {
    info: Option<String>,
    text: String,
}

struct Rewriter<'a, 'p> {
    opts: &'p MarkdownOptions,
    prepared: &'p Prepared,
    out: Vec<Event<'a>>,
    /// Open footnote definition: label and captured events.
    capture: Option<(String, Vec<Event<'a>>)>,
    definitions: HashMap<String, Vec<Event<'a>>>,
    /// Footnote labels in order of first reference.
    note_order: Vec<String>,
    note_refs: HashMap<String, usize>,
    code: Option<CodeBuf>,
    paragraph_starts: Vec<usize>,
    item_starts: Vec<usize>,
    heading_start: Option<usize>,
    /// Start indices of open links/images.
    inline_starts: Vec<usize>,
    /// Start index of the link or image that just closed.
    last_closed: Option<usize>,
    slugger: Slugger,
    headings: Vec<HeadingEntry>,
    diagrams: Vec<DiagramPlaceholder>,
}

impl<'a, 'p> Rewriter<'a, 'p> {
    fn new(opts: &'p MarkdownOptions, prepared: &'p Prepared) -> Self {
        Self {
            opts,
            prepared,
            out: Vec::new(),
            capture: None,
            definitions: HashMap::new(),
            note_order: Vec::new(),
            note_refs: HashMap::new(),
            code: None,
            paragraph_starts: Vec::new(),
            item_starts: Vec::new(),
            heading_start: None,
            inline_starts: Vec::new(),
            last_closed: None,
            slugger: Slugger::new(),
            headings: Vec::new(),
            diagrams: Vec::new(),
        }
    }

    /// Where events currently go: the open footnote definition, or the body.
    fn sink(&mut self) -> &mut Vec<Event<'a>> {
        match self.capture {
            Some((_, ref mut events)) => events,
            None => &mut self.out,
        }
    }

    fn emit(&mut self, event: Event<'a>) {
        self.sink().push(event);
    }

    fn push(&mut self, event: Event<'a>) {
        if self.code.is_some() {
            self.push_in_code(event);
            return;
        }

        let after_inline = self.last_closed.take();

        match event {
            Event::Text(text) => self.push_text(text, after_inline),

            Event::Code(code) => {
                let restored = self.prepared.restore_math(&code).into_owned();
                self.emit(Event::Code(CowStr::from(restored)));
            }

            Event::SoftBreak => self.emit(Event::HardBreak),

            Event::Start(Tag::CodeBlock(kind)) => {
                let info = match kind {
                    CodeBlockKind::Fenced(info) => Some(info.to_string()),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some(CodeBuf {
                    info,
                    text: String::new(),
                });
            }

            Event::Start(Tag::Paragraph) => {
                let at = self.sink().len();
                self.paragraph_starts.push(at);
                self.emit(Event::Start(Tag::Paragraph));
            }
            Event::End(TagEnd::Paragraph) => self.end_paragraph(),

            Event::Start(tag @ Tag::Heading { .. }) => {
                self.heading_start = Some(self.sink().len());
                self.emit(Event::Start(tag));
            }
            Event::End(TagEnd::Heading(level)) => self.end_heading(level),

            Event::Start(Tag::Item) => {
                let at = self.sink().len();
                self.item_starts.push(at);
                self.emit(Event::Start(Tag::Item));
            }
            Event::End(TagEnd::Item) => {
                self.item_starts.pop();
                self.emit(Event::End(TagEnd::Item));
            }
            Event::TaskListMarker(checked) => self.task_marker(checked),

            Event::Start(tag @ (Tag::Link { .. } | Tag::Image { .. })) => {
                let at = self.sink().len();
                self.inline_starts.push(at);
                self.emit(Event::Start(tag));
            }
            Event::End(end @ (TagEnd::Link | TagEnd::Image)) => {
                self.last_closed = self.inline_starts.pop();
                self.emit(Event::End(end));
            }

            Event::FootnoteReference(label) => self.footnote_ref(label.to_string()),
            Event::Start(Tag::FootnoteDefinition(label)) => {
                self.capture = Some((label.to_string(), Vec::new()));
            }
            Event::End(TagEnd::FootnoteDefinition) => {
                if let Some((label, events)) = self.capture.take() {
                    self.definitions.insert(label, events);
                }
            }

            other => self.emit(other),
        }
    }

    fn push_in_code(&mut self, event: Event<'a>) {
        match event {
            Event::Text(t) => {
                if let Some(code) = self.code.as_mut() {
                    code.text.push_str(&t);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(code) = self.code.take() {
                    let html = self.code_block(code);
                    self.emit(Event::Html(CowStr::from(html)));
                }
            }
            _ => {}
        }
    }

    fn code_block(&mut self, code: CodeBuf) -> String {
        let text = self.prepared.restore_math(&code.text).into_owned();
        let lang = code
            .info
            .as_deref()
            .and_then(|i| i.split_whitespace().next())
            .map(str::to_string);

        if lang.as_deref().is_some_and(|l| l.eq_ignore_ascii_case("mermaid")) {
            let source = text.trim().to_string();
            let id = format!("diagram-{}", self.diagrams.len());
            let encoded = base64::engine::general_purpose::STANDARD.encode(source.as_bytes());
            let html = format!(
                "<div class=\"mermaid\" id=\"{id}\" data-mermaid=\"{encoded}\">{}</div>\n",
                html_escape::encode_text(&source)
            );
            self.diagrams.push(DiagramPlaceholder { id, source });
            return html;
        }

        highlight::highlight_block(&text, lang.as_deref(), self.opts.highlight)
    }

    fn push_text(&mut self, text: CowStr<'a>, after_inline: Option<usize>) {
        let mut text: &str = &text;
        let owned;

        // `{: …}` right after a link or image belongs to it.
        if let Some(start) = after_inline {
            if let Some((a, rest)) = attrs::split_leading(text) {
                self.apply_inline_attrs(start, &a);
                owned = rest.to_string();
                text = &owned;
                if text.is_empty() {
                    return;
                }
            }
        }

        let in_link = !self.inline_starts.is_empty();
        let in_heading = self.heading_start.is_some();

        let with_emoji = if self.opts.emoji {
            expand_emoji(text)
        } else {
            text.to_string()
        };

        if in_link || in_heading {
            self.emit(Event::Text(CowStr::from(with_emoji)));
            return;
        }
        for event in linkify(&with_emoji) {
            self.emit(event);
        }
    }

    fn apply_inline_attrs(&mut self, start: usize, a: &Attrs) {
        let sink = self.sink();
        let Some(start_event) = sink.get(start).cloned() else {
            return;
        };
        match start_event {
            Event::Start(Tag::Link {
                dest_url, title, ..
            }) => {
                let mut tag = format!(
                    "<a href=\"{}\"",
                    html_escape::encode_double_quoted_attribute(&dest_url)
                );
                if !title.is_empty() {
                    tag.push_str(&format!(
                        " title=\"{}\"",
                        html_escape::encode_double_quoted_attribute(&title)
                    ));
                }
                tag.push_str(&a.to_html());
                tag.push('>');
                sink[start] = Event::InlineHtml(CowStr::from(tag));
            }
            Event::Start(Tag::Image {
                dest_url, title, ..
            }) => {
                let alt: String = sink[start + 1..]
                    .iter()
                    .filter_map(|e| match e {
                        Event::Text(t) | Event::Code(t) => Some(t.as_ref()),
                        _ => None,
                    })
                    .collect();
                let mut tag = format!(
                    "<img src=\"{}\" alt=\"{}\"",
                    html_escape::encode_double_quoted_attribute(&dest_url),
                    html_escape::encode_double_quoted_attribute(&alt)
                );
                if !title.is_empty() {
                    tag.push_str(&format!(
                        " title=\"{}\"",
                        html_escape::encode_double_quoted_attribute(&title)
                    ));
                }
                tag.push_str(&a.to_html());
                tag.push_str(" />");
                sink.truncate(start);
                sink.push(Event::InlineHtml(CowStr::from(tag)));
            }
            _ => {}
        }
    }

    fn end_paragraph(&mut self) {
        let Some(start) = self.paragraph_starts.pop() else {
            self.emit(Event::End(TagEnd::Paragraph));
            return;
        };
        let toc = self.opts.toc;
        let sink = self.sink();

        if toc {
            if let [Event::Text(t)] = &sink[start + 1..] {
                if TOC_MARKERS.contains(&t.trim()) {
                    sink.truncate(start);
                    sink.push(Event::Html(CowStr::from(format!("{}\n", toc_placeholder()))));
                    return;
                }
            }
        }

        if let Some(Event::Text(last)) = sink.last() {
            if let Some((rest, a)) = attrs::split_trailing(last) {
                let rest = rest.to_string();
                sink.pop();
                if !rest.is_empty() {
                    sink.push(Event::Text(CowStr::from(rest)));
                }
                if !a.is_empty() {
                    sink[start] = Event::Html(CowStr::from(format!("<p{}>", a.to_html())));
                }
            }
        }
        sink.push(Event::End(TagEnd::Paragraph));
    }

    fn end_heading(&mut self, level: pulldown_cmark::HeadingLevel) {
        let Some(start) = self.heading_start.take() else {
            self.emit(Event::End(TagEnd::Heading(level)));
            return;
        };

        let mut explicit = Attrs::default();
        {
            let sink = self.sink();
            if let Some(Event::Text(last)) = sink.last() {
                if let Some((rest, a)) = attrs::split_trailing(last) {
                    let rest = rest.to_string();
                    sink.pop();
                    if !rest.is_empty() {
                        sink.push(Event::Text(CowStr::from(rest)));
                    }
                    explicit = a;
                }
            }
        }

        let text: String = self.sink()[start + 1..]
            .iter()
            .filter_map(|e| match e {
                Event::Text(t) | Event::Code(t) => Some(t.as_ref()),
                _ => None,
            })
            .collect();
        let text = self.prepared.restore_math(&text).into_owned();

        let id = match explicit.id.take() {
            Some(id) => self.slugger.unique(id),
            None => self.slugger.slug(&text),
        };

        self.headings.push(HeadingEntry {
            level: level as u8,
            id: id.clone(),
            text,
        });

        let heading = Event::Start(Tag::Heading {
            level,
            id: Some(CowStr::from(id)),
            classes: explicit.classes.iter().cloned().map(CowStr::from).collect(),
            attrs: explicit.heading_attrs(),
        });
        let sink = self.sink();
        sink[start] = heading;
        sink.push(Event::End(TagEnd::Heading(level)));
    }

    fn task_marker(&mut self, checked: bool) {
        let start = self.item_starts.last().copied();
        let sink = self.sink();
        if let Some(i) = start {
            if matches!(sink.get(i), Some(Event::Start(Tag::Item))) {
                sink[i] = Event::Html(CowStr::from("<li class=\"task-list-item\">"));
            }
        }
        let checked = if checked { " checked=\"\"" } else { "" };
        sink.push(Event::InlineHtml(CowStr::from(format!(
            "<input class=\"task-list-item-checkbox\" type=\"checkbox\" disabled=\"\"{checked} /> "
        ))));
    }

    fn footnote_ref(&mut self, label: String) {
        let n = match self.note_order.iter().position(|l| *l == label) {
            Some(i) => i + 1,
            None => {
                self.note_order.push(label.clone());
                self.note_order.len()
            }
        };
        let count = self.note_refs.entry(label).or_insert(0);
        let ref_id = if *count == 0 {
            format!("fnref{n}")
        } else {
            format!("fnref{n}:{count}")
        };
        *count += 1;
        self.emit(Event::InlineHtml(CowStr::from(format!(
            "<sup class=\"footnote-ref\"><a href=\"#fn{n}\" id=\"{ref_id}\">[{n}]</a></sup>"
        ))));
    }

    fn finish(mut self) -> Finished<'a> {
        // An unterminated footnote definition still counts.
        if let Some((label, events)) = self.capture.take() {
            self.definitions.insert(label, events);
        }

        let mut footnotes = String::new();
        if !self.note_order.is_empty() {
            footnotes.push_str(
                "<hr class=\"footnotes-sep\" />\n<section class=\"footnotes\">\n<ol class=\"footnotes-list\">\n",
            );
            for (i, label) in self.note_order.iter().enumerate() {
                let n = i + 1;
                let mut events = self.definitions.remove(label).unwrap_or_default();
                let backref = Event::InlineHtml(CowStr::from(format!(
                    " <a href=\"#fnref{n}\" class=\"footnote-backref\">\u{21a9}\u{fe0e}</a>"
                )));
                match events.last() {
                    Some(Event::End(TagEnd::Paragraph)) => {
                        let at = events.len() - 1;
                        events.insert(at, backref);
                    }
                    _ => events.push(backref),
                }
                footnotes.push_str(&format!("<li id=\"fn{n}\" class=\"footnote-item\">"));
                html::push_html(&mut footnotes, events.into_iter());
                footnotes.push_str("</li>\n");
            }
            footnotes.push_str("</ol>\n</section>\n");
        }
        for label in self.definitions.keys() {
            debug!("Footnote '{}' is never referenced", label);
        }

        Finished {
            events: self.out,
            footnotes,
            diagrams: self.diagrams,
            headings: self.headings,
        }
    }
}

/// Replace known `:shortcode:` names with their emoji.
fn expand_emoji(text: &str) -> String {
    if !text.contains(':') {
        return text.to_string();
    }
    EMOJI_RE
        .replace_all(text, |caps: &regex::Captures| {
            emojis::get_by_shortcode(&caps[1])
                .map(|e| e.as_str().to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Split text into plain text and anchor elements for bare URLs.
fn linkify<'a>(text: &str) -> Vec<Event<'a>> {
    let mut events = Vec::new();
    let mut last = 0;
    for m in URL_RE.find_iter(text) {
        let url = m
            .as_str()
            .trim_end_matches(['.', ',', ':', ';', '!', '?', ')', ']', '\'']);
        if url.len() <= "https://".len() {
            continue;
        }
        if m.start() > last {
            events.push(Event::Text(CowStr::from(text[last..m.start()].to_string())));
        }
        events.push(Event::InlineHtml(CowStr::from(format!(
            "<a href=\"{}\">{}</a>",
            html_escape::encode_double_quoted_attribute(url),
            html_escape::encode_text(url)
        ))));
        last = m.start() + url.len();
    }
    if last < text.len() {
        events.push(Event::Text(CowStr::from(text[last..].to_string())));
    }
    events
}
