use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{ClaudeSdkError, Result};

/// Well-known install locations checked after `PATH`.
/// Relative entries are resolved against the home directory.
const CLAUDE_PATHS: &[&str] = &[
    ".npm-global/bin/claude",
    "/usr/local/bin/claude",
    ".local/bin/claude",
    "node_modules/.bin/claude",
    ".yarn/bin/claude",
    ".claude/local/claude",
];

const INSTALL_HINT: &str = "npm install -g @anthropic-ai/claude-code";

/// Locate the `claude` executable.
///
/// Order: `explicit` (returned as-is), `PATH`, then [`CLAUDE_PATHS`].
pub fn find_cli(explicit: Option<&Path>) -> Result<PathBuf> {
    find_cli_with(
        explicit,
        home::home_dir().as_deref(),
        |name| which::which(name).ok(),
        Path::is_file,
    )
}

fn find_cli_with(
    explicit: Option<&Path>,
    home: Option<&Path>,
    on_path: impl Fn(&str) -> Option<PathBuf>,
    installed: impl Fn(&Path) -> bool,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Some(path) = on_path("claude") {
        debug!(path = %path.display(), "found claude on PATH");
        return Ok(path);
    }

    for candidate in CLAUDE_PATHS {
        let full_path = if candidate.starts_with('/') {
            PathBuf::from(candidate)
        } else if let Some(home) = home {
            home.join(candidate)
        } else {
            continue;
        };
        if installed(&full_path) {
            debug!(path = %full_path.display(), "found claude in a known install location");
            return Ok(full_path);
        }
    }

    let message = if on_path("node").is_none() {
        format!(
            "Claude Code requires Node.js, which is not installed.\n\
             Install Node.js from https://nodejs.org/, then run:\n  {INSTALL_HINT}"
        )
    } else {
        format!(
            "Claude Code not found. Install with:\n  {INSTALL_HINT}\n\
             If it is already installed, add it to PATH or pass its location explicitly."
        )
    };

    Err(ClaudeSdkError::CliNotFound {
        path: "claude".into(),
        message,
    })
}
