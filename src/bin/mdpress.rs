//! CLI binary for mdpress.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mdpress::output::human_size;
use mdpress::{
    available_themes, convert_file, convert_files_with_progress, resolve_inputs,
    ConversionConfig, ConversionProgressCallback, ConversionResult, DiagramTheme, ErrorKind,
    PageFormat,
};
use std::collections::HashSet;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress reporter ────────────────────────────────────────────────────

/// Prints one line per file and, on a terminal, a progress bar across the
/// batch. Lines go through the bar so they never tear it.
struct CliReporter {
    bar: Option<ProgressBar>,
    quiet: bool,
    failed: AtomicUsize,
}

impl CliReporter {
    fn new(show_bar: bool, quiet: bool) -> Self {
        let bar = show_bar.then(|| {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&TICKS),
            );
            bar.set_prefix("Preparing");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Self {
            bar,
            quiet,
            failed: AtomicUsize::new(0),
        }
    }

    fn line(&self, text: String) {
        if self.quiet {
            return;
        }
        match self.bar {
            Some(ref bar) => bar.println(text),
            None => eprintln!("{text}"),
        }
    }
}

impl ConversionProgressCallback for CliReporter {
    fn on_batch_start(&self, total_files: usize) {
        if let Some(ref bar) = self.bar {
            let style = ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&TICKS);
            bar.set_length(total_files as u64);
            bar.set_style(style);
            bar.set_prefix("Converting");
        }
    }

    fn on_file_start(&self, path: &Path, _index: usize, _total: usize) {
        if let Some(ref bar) = self.bar {
            bar.set_message(path.display().to_string());
        }
    }

    fn on_file_complete(&self, result: &ConversionResult) {
        let output = result
            .output
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        self.line(format!(
            "  {} {}  →  {}  {}  {}",
            green("✓"),
            result.input.display(),
            bold(&output),
            dim(&human_size(result.stats.byte_size)),
            dim(&format!("{:.1}s", result.stats.duration_ms as f64 / 1000.0)),
        ));
        if let Some(ref html) = result.html_output {
            self.line(format!("    {} {}", dim("html"), html.display()));
        }
        if result.stats.diagrams_failed > 0 {
            self.line(format!(
                "    {} {} diagram(s) failed to render",
                cyan("⚠"),
                result.stats.diagrams_failed
            ));
        }
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    fn on_file_error(&self, path: &Path, message: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        // Always reported, even in quiet mode.
        let text = format!("  {} {}  {}", red("✗"), path.display(), red(message));
        match self.bar {
            Some(ref bar) => {
                bar.println(text);
                bar.inc(1);
            }
            None => eprintln!("{text}"),
        }
    }

    fn on_batch_complete(&self, total_files: usize, succeeded: usize) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
        if self.quiet || total_files <= 1 {
            return;
        }
        let failed = total_files.saturating_sub(succeeded);
        if failed == 0 {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total_files { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one file (writes README.pdf)
  mdpress README.md

  # Explicit output, US Letter, landscape
  mdpress notes.md -o notes.pdf --format Letter --landscape

  # Every Markdown file in a directory, into out/
  mdpress docs/ --output-dir out/

  # Wildcard, with a table of contents and page numbers
  mdpress 'chapters/ch*.md' --toc --page-numbers

  # Margins: all sides, vertical/horizontal, or top/right/bottom/left
  mdpress report.md --margin 20mm,15mm

  # Dark theme plus a custom stylesheet, keeping the HTML
  mdpress report.md --theme github-dark --css print.css --html

FRONT MATTER:
  ---
  title: Quarterly Report
  theme: vscode-light
  pdf:
    format: A5
    landscape: true
    margin: { top: 15mm, bottom: 15mm }
    printBackground: true
  ---

ENVIRONMENT VARIABLES:
  MDPRESS_CHROME_PATH     Chrome/Chromium executable to use
  RUST_LOG                Log filter (overrides --quiet/--verbose)
"#;

/// Convert Markdown files to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "mdpress",
    version,
    about = "Convert Markdown files to styled PDF through headless Chrome",
    long_about = "Convert Markdown documents to print-ready PDF. Supports tables, footnotes, \
task lists, math, Mermaid diagrams, callouts, emoji, syntax highlighting, front matter and \
themes. Requires a Chrome or Chromium install.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown files, directories, or wildcard patterns.
    #[arg(required_unless_present = "list_themes")]
    inputs: Vec<String>,

    /// Output PDF path (single input only).
    #[arg(short, long, env = "MDPRESS_OUTPUT", conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Directory for output files (default: next to each input).
    #[arg(short = 'd', long, env = "MDPRESS_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Paper format: A3, A4, A5, Letter, Legal, Tabloid.
    #[arg(short, long, env = "MDPRESS_FORMAT", default_value = "A4")]
    format: String,

    /// Landscape orientation.
    #[arg(long, env = "MDPRESS_LANDSCAPE")]
    landscape: bool,

    /// Margins: `a`, `a,b` or `a,b,c,d` (CSS lengths).
    #[arg(short, long, env = "MDPRESS_MARGIN")]
    margin: Option<String>,

    /// Do not print background colours and images.
    #[arg(long)]
    no_background: bool,

    /// Document theme.
    #[arg(short, long, env = "MDPRESS_THEME", default_value = "github")]
    theme: String,

    /// Insert a table of contents.
    #[arg(long, env = "MDPRESS_TOC")]
    toc: bool,

    /// Deepest heading level in the table of contents.
    #[arg(long, env = "MDPRESS_TOC_DEPTH", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(1..=6))]
    toc_depth: u8,

    /// Also write the assembled HTML next to each PDF.
    #[arg(long, env = "MDPRESS_HTML")]
    html: bool,

    /// Leave `$…$` math as literal text.
    #[arg(long)]
    no_math: bool,

    /// Leave `:shortcode:` emoji as literal text.
    #[arg(long)]
    no_emoji: bool,

    /// Disable syntax highlighting.
    #[arg(long)]
    no_highlight: bool,

    /// Mermaid theme: default, forest, dark, neutral, base.
    #[arg(long, env = "MDPRESS_MERMAID_THEME", default_value = "default")]
    mermaid_theme: String,

    /// HTML header template (Chrome print template syntax).
    #[arg(long, env = "MDPRESS_HEADER")]
    header: Option<String>,

    /// HTML footer template (Chrome print template syntax).
    #[arg(long, env = "MDPRESS_FOOTER")]
    footer: Option<String>,

    /// Add a "page / total" footer.
    #[arg(long, env = "MDPRESS_PAGE_NUMBERS")]
    page_numbers: bool,

    /// Extra stylesheet, appended after the theme.
    #[arg(long, env = "MDPRESS_CSS")]
    css: Option<PathBuf>,

    /// Directory a custom CSS file may also be read from.
    #[arg(long, env = "MDPRESS_TRUSTED_ROOT")]
    trusted_root: Option<PathBuf>,

    /// Launch the browser with a visible window.
    #[arg(long)]
    debug: bool,

    /// Print results as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "MDPRESS_NO_PROGRESS")]
    no_progress: bool,

    /// List available themes and exit.
    #[arg(long)]
    list_themes: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MDPRESS_VERBOSE", conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MDPRESS_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_themes {
        for name in available_themes() {
            println!("{name}");
        }
        return Ok(());
    }

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO lines would interleave with the bar; the bar's own lines cover them.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && io::stderr().is_terminal();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Resolve inputs ───────────────────────────────────────────────────
    let mut inputs: Vec<PathBuf> = Vec::new();
    for pattern in &cli.inputs {
        let files = resolve_inputs(pattern)
            .with_context(|| format!("Failed to resolve input '{pattern}'"))?;
        inputs.extend(files);
    }
    let inputs = dedup_paths(inputs);
    if cli.output.is_some() && inputs.len() > 1 {
        bail!(
            "--output takes a single input but {} files matched; use --output-dir",
            inputs.len()
        );
    }

    let config = build_config(&cli)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let reporter = CliReporter::new(show_progress, cli.quiet || cli.json);
    let results = match cli.output {
        Some(ref output) => convert_one(&inputs[0], output, &config, &reporter).await,
        None => {
            convert_files_with_progress(&inputs, cli.output_dir.as_deref(), &config, &reporter)
                .await
        }
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialise results")?
        );
    }

    let failed = reporter.failed.load(Ordering::SeqCst);
    if results
        .iter()
        .any(|r| r.error.as_ref().is_some_and(|e| e.kind == ErrorKind::BrowserLaunch))
    {
        eprintln!(
            "{} Stopped: no usable Chrome/Chromium, remaining files were not converted",
            red("✘")
        );
    }
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Convert a single file to an explicit output path, reporting through the
/// same callbacks as a batch.
async fn convert_one(
    input: &Path,
    output: &Path,
    config: &ConversionConfig,
    reporter: &CliReporter,
) -> Vec<ConversionResult> {
    reporter.on_batch_start(1);
    reporter.on_file_start(input, 1, 1);
    let result = convert_file(input, Some(output), config).await;
    match result.error {
        None => reporter.on_file_complete(&result),
        Some(ref e) => reporter.on_file_error(input, &e.message),
    }
    reporter.on_batch_complete(1, usize::from(result.is_success()));
    vec![result]
}

/// Drop repeated paths, keeping the first occurrence of each.
fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli) -> Result<ConversionConfig> {
    let format = PageFormat::from_str(&cli.format).context("Invalid --format")?;
    let mermaid_theme =
        DiagramTheme::from_str(&cli.mermaid_theme).context("Invalid --mermaid-theme")?;

    let mut builder = ConversionConfig::builder()
        .format(format)
        .landscape(cli.landscape)
        .print_background(!cli.no_background)
        .theme_name(&cli.theme)
        .toc(cli.toc)
        .toc_depth(cli.toc_depth)
        .html_output(cli.html)
        .math(!cli.no_math)
        .emoji(!cli.no_emoji)
        .highlight(!cli.no_highlight)
        .diagram_theme(mermaid_theme)
        .page_numbers(cli.page_numbers)
        .debug(cli.debug);

    if let Some(ref margin) = cli.margin {
        builder = builder.margins_str(margin).context("Invalid --margin")?;
    }
    if let Some(ref header) = cli.header {
        builder = builder.header_template(header.clone());
    }
    if let Some(ref footer) = cli.footer {
        builder = builder.footer_template(footer.clone());
    }
    if let Some(ref css) = cli.css {
        builder = builder.custom_css_path(css.clone());
    }
    if let Some(ref root) = cli.trusted_root {
        builder = builder.trusted_root(root.clone());
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdpress::Orientation;

    #[test]
    fn repeated_inputs_are_converted_once() {
        let paths = ["a.md", "b.md", "a.md", "c.md", "b.md"].map(PathBuf::from).to_vec();
        assert_eq!(
            dedup_paths(paths),
            ["a.md", "b.md", "c.md"].map(PathBuf::from).to_vec()
        );
    }

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["mdpress"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_map_to_config() {
        let cli = parse(&[
            "a.md",
            "--format",
            "letter",
            "--landscape",
            "--margin",
            "10mm,20mm",
            "--toc",
            "--toc-depth",
            "2",
            "--no-math",
            "--mermaid-theme",
            "forest",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.pdf.format, PageFormat::Letter);
        assert_eq!(config.pdf.orientation, Orientation::Landscape);
        assert_eq!(config.pdf.margins.top, "10mm");
        assert_eq!(config.pdf.margins.right, "20mm");
        assert!(config.toc);
        assert_eq!(config.toc_depth, 2);
        assert!(!config.math);
        assert_eq!(config.diagram.theme, DiagramTheme::Forest);
    }

    #[test]
    fn bad_margin_is_rejected() {
        let cli = parse(&["a.md", "--margin", "1mm,2mm,3mm"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn toc_depth_out_of_range_fails_to_parse() {
        assert!(Cli::try_parse_from(["mdpress", "a.md", "--toc-depth", "9"]).is_err());
    }

    #[test]
    fn list_themes_needs_no_input() {
        let cli = parse(&["--list-themes"]);
        assert!(cli.list_themes);
        assert!(cli.inputs.is_empty());
    }
}
