//! Self-contained HTML document assembly.
//!
//! Stylesheets are concatenated in a fixed order (base, theme, highlight,
//! math, custom) so that custom CSS always wins. Local images are inlined
//! as data URIs; nothing in the output refers to the filesystem.

use crate::config::{ConversionConfig, ThemeOptions};
use crate::pipeline::{highlight, math};
use crate::themes;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

static IMG_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(<img\b[^>]*?\bsrc=)(["'])([^"']+)(["'])"#).unwrap());

const DEFAULT_TITLE: &str = "Document";

/// Build the final HTML document around a rendered fragment.
pub fn assemble(fragment: &str, title: Option<&str>, config: &ConversionConfig) -> String {
    let base = base_dir(config);
    let root = trusted_root(config, &base);

    let custom = load_custom_css(&config.theme, &base, &root);
    let body = embed_images(fragment, &base);
    let title = html_escape::encode_text(title.unwrap_or(DEFAULT_TITLE));

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
{base_css}
{theme_css}
{highlight_css}
{math_css}
{custom}
</style>
</head>
<body>
<article class="markdown-body">
{body}
</article>
</body>
</html>
"#,
        base_css = themes::base_css(&config.pdf),
        theme_css = themes::stylesheet(config.theme.theme),
        highlight_css = highlight::css_for(config.theme.highlight),
        math_css = math::css(),
    );
    debug!("Assembled HTML document: {} bytes", html.len());
    html
}

fn base_dir(config: &ConversionConfig) -> PathBuf {
    config
        .base_path
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn trusted_root(config: &ConversionConfig, base: &Path) -> PathBuf {
    let root = config.trusted_root.as_deref().unwrap_or(base);
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}

/// Resolve `path` against `base` and return it only if it exists and lies
/// under `root` (or under `base`).
pub fn resolve_within(path: &Path, base: &Path, root: &Path) -> Option<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let resolved = joined.canonicalize().ok()?;
    let base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    if resolved.starts_with(root) || resolved.starts_with(&base) {
        Some(resolved)
    } else {
        None
    }
}

/// Inline custom CSS followed by the custom CSS file, when it is safe to read.
pub fn load_custom_css(theme: &ThemeOptions, base: &Path, root: &Path) -> String {
    let mut css = theme.custom_css.clone().unwrap_or_default();

    if let Some(ref path) = theme.custom_css_path {
        let joined = if path.is_absolute() {
            path.clone()
        } else {
            base.join(path)
        };
        if !joined.exists() {
            warn!("Custom CSS not found: {}", joined.display());
            return css;
        }
        match resolve_within(path, base, root) {
            Some(resolved) => match std::fs::read_to_string(&resolved) {
                Ok(text) => {
                    debug!("Loaded custom CSS from {}", resolved.display());
                    if !css.is_empty() {
                        css.push('\n');
                    }
                    css.push_str(&text);
                }
                Err(e) => warn!("Failed to read custom CSS {}: {}", resolved.display(), e),
            },
            None => warn!(
                "Custom CSS path {} is outside {}; skipping",
                path.display(),
                root.display()
            ),
        }
    }
    css
}

fn is_remote(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("data:")
        || lower.starts_with("//")
}

/// Rewrite local `<img src>` references to base64 data URIs.
///
/// Relative sources resolve against `base`. Images are not confined to the
/// trusted root; only custom CSS is.
pub fn embed_images(html: &str, base: &Path) -> String {
    IMG_SRC_RE
        .replace_all(html, |caps: &Captures| {
            let src = &caps[3];
            if is_remote(src) {
                return caps[0].to_string();
            }
            match data_uri(src, base) {
                Some(uri) => {
                    debug!("Embedded image: {}", src);
                    format!("{}{}{}{}", &caps[1], &caps[2], uri, &caps[4])
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn data_uri(src: &str, base: &Path) -> Option<String> {
    let decoded = html_escape::decode_html_entities(src);
    let path = Path::new(decoded.as_ref());
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    if !resolved.is_file() {
        warn!("Image not found: {}", resolved.display());
        return None;
    }
    match std::fs::read(&resolved) {
        Ok(bytes) => Some(format!(
            "data:{};base64,{}",
            mime_for(&resolved),
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )),
        Err(e) => {
            warn!("Failed to embed image {}: {}", src, e);
            None
        }
    }
}

/// MIME type by file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}
