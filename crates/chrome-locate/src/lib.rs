//! # chrome-locate
//!
//! Find a Chrome-family browser executable that can be driven over the
//! DevTools protocol, so that callers of `headless_chrome` get a usable
//! binary even when its own auto-detection comes up empty.
//!
//! ## Search order
//!
//! 1. `MDPRESS_CHROME_PATH` (then `CHROME`), when set and pointing at a file.
//! 2. The well-known install locations for the current OS family.
//! 3. The platform "locate executable" command (`which` on Unix, `where` on
//!    Windows) for every known executable name.
//!
//! The first hit is cached for the lifetime of the process.
//!
//! ```rust,no_run
//! let chrome = chrome_locate::locate_chrome().expect("no browser installed");
//! println!("using {}", chrome.display());
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable consulted before any other search step.
pub const ENV_OVERRIDE: &str = "MDPRESS_CHROME_PATH";

/// Secondary override honoured for compatibility with `headless_chrome`.
pub const ENV_FALLBACK: &str = "CHROME";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chrome-locate.
#[derive(Error, Debug)]
pub enum LocateError {
    /// The current OS family has no known install locations.
    #[error("Unsupported platform: {os}")]
    UnsupportedPlatform { os: String },

    /// Every search step came up empty.
    #[error(
        "No Chrome or Chromium executable found (searched {searched} locations).\n\
Install Google Chrome or Chromium, or point {ENV_OVERRIDE} at an existing binary:\n\
  export {ENV_OVERRIDE}=/path/to/chrome"
    )]
    NotFound { searched: usize },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

struct PlatformInfo {
    /// Absolute install locations, most likely first.
    install_paths: Vec<PathBuf>,
    /// Executable names handed to the locate command.
    executable_names: &'static [&'static str],
    /// The locate command itself.
    locate_command: &'static str,
}

fn detect_platform() -> Result<PlatformInfo, LocateError> {
    match std::env::consts::OS {
        "macos" => {
            let mut install_paths: Vec<PathBuf> = [
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
                "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
                "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
                "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            ]
            .iter()
            .map(PathBuf::from)
            .collect();
            if let Some(home) = dirs::home_dir() {
                install_paths.push(
                    home.join("Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
                );
                install_paths.push(home.join("Applications/Chromium.app/Contents/MacOS/Chromium"));
            }
            Ok(PlatformInfo {
                install_paths,
                executable_names: &["google-chrome", "chromium", "chrome"],
                locate_command: "which",
            })
        }
        "linux" | "freebsd" | "openbsd" | "netbsd" => Ok(PlatformInfo {
            install_paths: [
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
                "/usr/local/bin/chromium",
                "/usr/local/bin/google-chrome",
                "/opt/google/chrome/chrome",
                "/usr/bin/microsoft-edge",
                "/usr/bin/brave-browser",
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
            executable_names: &[
                "google-chrome",
                "google-chrome-stable",
                "chromium",
                "chromium-browser",
                "chrome",
            ],
            locate_command: "which",
        }),
        "windows" => {
            let mut roots: Vec<PathBuf> = Vec::new();
            for var in ["PROGRAMFILES", "PROGRAMFILES(X86)"] {
                if let Some(dir) = std::env::var_os(var) {
                    roots.push(PathBuf::from(dir));
                }
            }
            if let Some(local) = dirs::data_local_dir() {
                roots.push(local);
            }
            let mut install_paths = Vec::new();
            for root in &roots {
                install_paths.push(root.join(r"Google\Chrome\Application\chrome.exe"));
                install_paths.push(root.join(r"Chromium\Application\chrome.exe"));
                install_paths.push(root.join(r"Microsoft\Edge\Application\msedge.exe"));
            }
            Ok(PlatformInfo {
                install_paths,
                executable_names: &["chrome.exe", "chromium.exe", "msedge.exe"],
                locate_command: "where",
            })
        }
        os => Err(LocateError::UnsupportedPlatform { os: os.to_string() }),
    }
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns the path of a Chrome-family executable, searching once per process.
pub fn locate_chrome() -> Result<PathBuf, LocateError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let overrides = [ENV_OVERRIDE, ENV_FALLBACK].map(std::env::var_os);
    let path = locate_with(&overrides)?;

    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Lists the well-known install locations for the current OS, in search order.
pub fn candidate_paths() -> Vec<PathBuf> {
    detect_platform()
        .map(|info| info.install_paths)
        .unwrap_or_default()
}

/// Runs the full search with explicit override values instead of reading the
/// environment. `None` entries are skipped.
pub fn locate_with(overrides: &[Option<OsString>]) -> Result<PathBuf, LocateError> {
    // 1. Environment overrides.
    for value in overrides.iter().flatten() {
        let p = PathBuf::from(value);
        if is_executable_file(&p) {
            return Ok(p);
        }
    }

    let info = detect_platform()?;

    // 2. Well-known install locations.
    if let Some(p) = info.install_paths.iter().find(|p| is_executable_file(p)) {
        return Ok(p.clone());
    }

    // 3. Locate command.
    for name in info.executable_names {
        if let Some(p) = run_locate_command(info.locate_command, name) {
            return Ok(p);
        }
    }

    Err(LocateError::NotFound {
        searched: overrides.iter().flatten().count()
            + info.install_paths.len()
            + info.executable_names.len(),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// Asks `which` / `where` for `name` and returns the first existing path it prints.
fn run_locate_command(command: &str, name: &str) -> Option<PathBuf> {
    let output = Command::new(command).arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .find(|p| is_executable_file(p))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_platform_is_supported() {
        detect_platform().expect("current platform should be supported");
    }

    #[test]
    fn candidate_paths_are_absolute() {
        for p in candidate_paths() {
            assert!(p.is_absolute(), "not absolute: {}", p.display());
        }
    }

    #[test]
    fn override_wins_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("my-chrome");
        std::fs::write(&fake, b"#!/bin/sh\n").unwrap();

        let found = locate_with(&[Some(fake.clone().into_os_string()), None]).unwrap();
        assert_eq!(found, fake);
    }

    #[test]
    fn missing_override_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        // Either a real browser is found further down the list, or NotFound.
        match locate_with(&[Some(missing.clone().into_os_string())]) {
            Ok(p) => assert_ne!(p, missing),
            Err(e) => assert!(matches!(e, LocateError::NotFound { .. })),
        }
    }

    #[test]
    fn not_found_message_is_actionable() {
        let e = LocateError::NotFound { searched: 12 };
        let msg = e.to_string();
        assert!(msg.contains(ENV_OVERRIDE));
        assert!(msg.contains("12"));
    }
}
