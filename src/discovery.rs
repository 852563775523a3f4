//! Locating the Claude Code CLI and checking its version.
//!
//! `which::which("claude")` (a `$PATH` lookup) is tried first, then a list of
//! platform-specific install locations. A miss everywhere is
//! [`Error::CliNotFound`], the one error the demo answers with an install
//! hint.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use claude_query::discovery::{find_cli, check_cli_version};
//!
//! # async fn example() -> claude_query::Result<()> {
//! let cli = find_cli()?;
//! let version = check_cli_version(&cli, Some(Duration::from_secs(5))).await?;
//! println!("Found Claude CLI v{version} at {}", cli.display());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{Error, Result};

/// Minimum CLI version whose stream-json output this crate understands.
pub const MIN_CLI_VERSION: &str = "1.0.0";

const CLI_NAME: &str = "claude";

/// Locate the Claude Code CLI binary.
///
/// # Discovery order
///
/// 1. `which claude`
///
/// **Unix fallbacks:** `~/.npm-global/bin`, `/usr/local/bin`, `~/.local/bin`,
/// `node_modules/.bin` (relative to CWD), `~/.yarn/bin`, `~/.claude/local`.
///
/// **Windows fallbacks:** `%USERPROFILE%/AppData/Roaming/npm`,
/// `node_modules/.bin`, `%USERPROFILE%/scoop/shims`,
/// `%USERPROFILE%/.claude/local` (all `claude.exe`).
///
/// # Errors
///
/// Returns [`Error::CliNotFound`] if no binary is found at any location.
pub fn find_cli() -> Result<PathBuf> {
    if let Ok(path) = which::which(CLI_NAME) {
        return Ok(path);
    }

    let found = fallback_candidates(home_dir().as_deref())
        .into_iter()
        .find(|candidate| candidate.is_file());

    match found {
        Some(path) => {
            tracing::debug!(path = %path.display(), "found Claude CLI outside PATH");
            Ok(path)
        }
        None => Err(Error::CliNotFound),
    }
}

/// Resolve an explicitly configured CLI path, failing with
/// [`Error::CliNotFound`] when it does not point at a file.
pub fn resolve_cli(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => {
            tracing::debug!(path = %path.display(), "configured CLI path is not a file");
            Err(Error::CliNotFound)
        }
        None => find_cli(),
    }
}

/// Run `claude --version` and parse the version string from its output.
///
/// The CLI prints something like `1.0.44 (Claude Code)`. The first
/// semver-like token wins.
///
/// # Errors
///
/// - [`Error::Timeout`] if the deadline expires (the process is killed).
/// - [`Error::SpawnFailed`] if the process cannot be launched.
/// - [`Error::ProcessExited`] if it exits with a non-zero code.
/// - [`Error::Transport`] if the output contains no version.
pub async fn check_cli_version(cli_path: &Path, timeout: Option<Duration>) -> Result<String> {
    let mut child = tokio::process::Command::new(cli_path)
        .arg("--version")
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(Error::SpawnFailed)?;

    if let Some(d) = timeout {
        if tokio::time::timeout(d, child.wait()).await.is_err() {
            let _ = child.kill().await;
            return Err(Error::Timeout(format!(
                "version check timed out after {}s",
                d.as_secs_f64()
            )));
        }
    }

    let output = child.wait_with_output().await.map_err(Error::SpawnFailed)?;

    if !output.status.success() {
        return Err(Error::ProcessExited {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version(&stdout).ok_or_else(|| {
        Error::Transport(format!("could not parse version from CLI output: {stdout}"))
    })
}

/// Check the CLI version against [`MIN_CLI_VERSION`].
///
/// # Errors
///
/// [`Error::VersionMismatch`] when the installed CLI is too old, plus every
/// error of [`check_cli_version`].
pub async fn ensure_supported_version(cli_path: &Path, timeout: Option<Duration>) -> Result<String> {
    let found = check_cli_version(cli_path, timeout).await?;
    if !version_satisfies(&found, MIN_CLI_VERSION) {
        return Err(Error::VersionMismatch {
            found,
            required: MIN_CLI_VERSION.into(),
        });
    }
    tracing::debug!(version = %found, "Claude CLI version accepted");
    Ok(found)
}

/// Compare two semver-like version strings (major.minor.patch).
///
/// Returns `true` if `version >= minimum`. Pre-release suffixes are ignored.
#[must_use]
pub fn version_satisfies(version: &str, minimum: &str) -> bool {
    let parse = |s: &str| -> (u32, u32, u32) {
        let core = s.split('-').next().unwrap_or(s);
        let mut parts = core.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);
        (major, minor, patch)
    };
    parse(version) >= parse(minimum)
}

// ── Internals ────────────────────────────────────────────────────────────────

fn parse_version(output: &str) -> Option<String> {
    for word in output.split_whitespace() {
        let trimmed = word.strip_prefix('v').unwrap_or(word);
        if trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) && trimmed.contains('.') {
            let version: String = trimmed
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
                .collect();
            if version.split('.').count() >= 2 {
                return Some(version);
            }
        }
    }
    None
}

#[cfg(unix)]
fn fallback_candidates(home: Option<&Path>) -> Vec<PathBuf> {
    vec![
        home.map(|h| h.join(".npm-global/bin").join(CLI_NAME)),
        Some(PathBuf::from("/usr/local/bin").join(CLI_NAME)),
        home.map(|h| h.join(".local/bin").join(CLI_NAME)),
        Some(PathBuf::from("node_modules/.bin").join(CLI_NAME)),
        home.map(|h| h.join(".yarn/bin").join(CLI_NAME)),
        home.map(|h| h.join(".claude/local").join(CLI_NAME)),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(windows)]
fn fallback_candidates(home: Option<&Path>) -> Vec<PathBuf> {
    let exe = format!("{CLI_NAME}.exe");
    vec![
        home.map(|h| h.join("AppData/Roaming/npm").join(&exe)),
        Some(PathBuf::from("node_modules/.bin").join(&exe)),
        home.map(|h| h.join("scoop/shims").join(&exe)),
        home.map(|h| h.join(".claude/local").join(&exe)),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        std::env::var_os("HOME").map(PathBuf::from)
    }
    #[cfg(windows)]
    {
        std::env::var_os("USERPROFILE")
            .map(PathBuf::from)
            .or_else(|| {
                let drive = std::env::var_os("HOMEDRIVE")?;
                let path = std::env::var_os("HOMEPATH")?;
                Some(PathBuf::from(drive).join(path))
            })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn parse_version_formats() {
        assert_eq!(parse_version("1.2.3"), Some("1.2.3".into()));
        assert_eq!(parse_version("v1.2.3"), Some("1.2.3".into()));
        assert_eq!(parse_version("1.0.44 (Claude Code)"), Some("1.0.44".into()));
        assert_eq!(parse_version("v2.0.0-beta.1"), Some("2.0.0-beta.1".into()));
    }

    #[test]
    fn parse_version_absent() {
        assert_eq!(parse_version(""), None);
        assert_eq!(parse_version("no version here"), None);
    }

    #[test]
    fn version_satisfies_ordering() {
        assert!(version_satisfies("1.0.0", "1.0.0"));
        assert!(version_satisfies("1.0.1", "1.0.0"));
        assert!(version_satisfies("2.0.0", "1.9.9"));
        assert!(!version_satisfies("0.9.9", "1.0.0"));
        assert!(!version_satisfies("1.9.9", "2.0.0"));
    }

    #[test]
    fn version_satisfies_ignores_prerelease_suffix() {
        assert!(version_satisfies("1.0.0-beta.1", "1.0.0"));
    }

    #[cfg(unix)]
    #[test]
    fn fallback_candidates_use_home() {
        let candidates = fallback_candidates(Some(Path::new("/home/u")));
        assert_eq!(candidates[0], PathBuf::from("/home/u/.npm-global/bin/claude"));
        assert!(candidates.contains(&PathBuf::from("/usr/local/bin/claude")));

        let no_home = fallback_candidates(None);
        assert_eq!(
            no_home,
            [
                PathBuf::from("/usr/local/bin/claude"),
                PathBuf::from("node_modules/.bin/claude")
            ]
        );
    }

    #[test]
    fn find_cli_returns_path_or_not_found() {
        match find_cli() {
            Ok(path) => assert!(path.is_file()),
            Err(Error::CliNotFound) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn resolve_cli_rejects_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("claude");
        let err = resolve_cli(Some(&missing)).unwrap_err();
        assert!(err.is_backend_not_found());
    }

    #[test]
    fn resolve_cli_accepts_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claude");
        std::fs::write(&path, "").unwrap();
        assert_eq!(resolve_cli(Some(&path)).unwrap(), path);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn check_cli_version_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let slow = script(dir.path(), "slow_cli", "sleep 999");
        let result = check_cli_version(&slow, Some(Duration::from_millis(50))).await;
        assert!(
            matches!(result, Err(Error::Timeout(_))),
            "expected Timeout, got: {result:?}"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn check_cli_version_without_version_output() {
        let dir = tempfile::tempdir().unwrap();
        let noop = script(dir.path(), "noop.sh", "exit 0");
        let result = check_cli_version(&noop, None).await;
        assert!(
            matches!(result, Err(Error::Transport(_))),
            "expected Transport, got: {result:?}"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ensure_supported_version_rejects_old_cli() {
        let dir = tempfile::tempdir().unwrap();
        let old = script(dir.path(), "old_cli", "echo '0.2.9 (Claude Code)'");
        let err = ensure_supported_version(&old, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::VersionMismatch { ref found, .. } if found == "0.2.9"),
            "got: {err:?}"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ensure_supported_version_accepts_current_cli() {
        let dir = tempfile::tempdir().unwrap();
        let cli = script(dir.path(), "cli", "echo '1.0.44 (Claude Code)'");
        let version = ensure_supported_version(&cli, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(version, "1.0.44");
    }
}
