//! Input resolution: files, directories and wildcard patterns.
//!
//! A pattern may be a single file, a directory (every Markdown file in it,
//! not recursive), or a path whose final component contains `*` or `?`.
//! Results are sorted so batch order is stable.

use crate::error::MdPressError;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

const MARKDOWN_EXTENSIONS: [&str; 3] = ["md", "markdown", "mdown"];

pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MARKDOWN_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(e)))
}

fn has_wildcard(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

fn wildcard_regex(pattern: &str) -> Result<Regex, MdPressError> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| MdPressError::InvalidInput {
        input: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Markdown files directly inside `dir`.
fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, MdPressError> {
    let entries = std::fs::read_dir(dir).map_err(|e| MdPressError::FileRead {
        path: dir.to_path_buf(),
        source: e,
    })?;
    Ok(entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_markdown(p))
        .collect())
}

/// Expand `pattern` into a sorted list of input files.
pub fn resolve_inputs(pattern: &str) -> Result<Vec<PathBuf>, MdPressError> {
    let path = Path::new(pattern);

    let mut files = if path.is_dir() {
        list_dir(path)?
    } else if path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(has_wildcard)
    {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let re = wildcard_regex(name)?;
        list_dir(dir)?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| re.is_match(n))
            })
            .collect()
    } else if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        return Err(MdPressError::FileNotFound {
            path: path.to_path_buf(),
        });
    };

    if files.is_empty() {
        return Err(MdPressError::InvalidInput {
            input: pattern.to_string(),
            reason: "no Markdown files matched".to_string(),
        });
    }
    files.sort();
    debug!("Resolved {} input(s) from '{}'", files.len(), pattern);
    Ok(files)
}

/// Where the PDF for `input` goes.
///
/// An explicit `output` wins; otherwise `<output_dir>/<stem>.pdf`, or the
/// input path with its extension replaced.
pub fn output_path_for(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> PathBuf {
    if let Some(out) = output {
        return out.to_path_buf();
    }
    let file = input.with_extension("pdf");
    match (output_dir, file.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => file,
    }
}

/// Read a Markdown file, mapping I/O failures to typed errors.
pub async fn read_document(path: &Path) -> Result<String, MdPressError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MdPressError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(MdPressError::FileRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Write `bytes`, creating parent directories. Uses a temporary sibling and
/// a rename so a failed write never leaves a truncated file.
pub async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), MdPressError> {
    let write_err = |e| MdPressError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "# x\n").unwrap();
    }

    #[test]
    fn markdown_extensions() {
        assert!(is_markdown(Path::new("a.md")));
        assert!(is_markdown(Path::new("a.MARKDOWN")));
        assert!(!is_markdown(Path::new("a.txt")));
        assert!(!is_markdown(Path::new("README")));
    }

    #[test]
    fn directory_lists_markdown_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.md");
        touch(dir.path(), "a.md");
        touch(dir.path(), "notes.txt");
        let files = resolve_inputs(dir.path().to_str().unwrap()).unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        assert_eq!(names, vec!["a.md", "b.md"]);
    }

    #[test]
    fn wildcard_in_last_component() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ch1.md");
        touch(dir.path(), "ch2.md");
        touch(dir.path(), "intro.md");
        let pattern = dir.path().join("ch?.md");
        let files = resolve_inputs(pattern.to_str().unwrap()).unwrap();
        assert_eq!(files.len(), 2);
        let star = dir.path().join("*.md");
        assert_eq!(resolve_inputs(star.to_str().unwrap()).unwrap().len(), 3);
    }

    #[test]
    fn missing_and_empty_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.md");
        assert!(matches!(
            resolve_inputs(missing.to_str().unwrap()),
            Err(MdPressError::FileNotFound { .. })
        ));
        assert!(matches!(
            resolve_inputs(dir.path().to_str().unwrap()),
            Err(MdPressError::InvalidInput { .. })
        ));
    }

    #[test]
    fn output_paths() {
        let input = Path::new("docs/guide.md");
        assert_eq!(output_path_for(input, None, None), PathBuf::from("docs/guide.pdf"));
        assert_eq!(
            output_path_for(input, None, Some(Path::new("out"))),
            PathBuf::from("out/guide.pdf")
        );
        assert_eq!(
            output_path_for(input, Some(Path::new("x.pdf")), Some(Path::new("out"))),
            PathBuf::from("x.pdf")
        );
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let err = read_document(Path::new("/no/such/file.md")).await.unwrap_err();
        assert!(matches!(err, MdPressError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.pdf");
        write_output(&path, b"%PDF").await.unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"%PDF");
    }
}
