//! Path helpers shared by the config loader, the ignore matcher and the
//! scheduler.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Expands a leading `~` to the current user's home directory
///
/// Only `~` and `~/…` are expanded; any other path is returned unchanged.
/// When the home directory cannot be determined the path is returned as is.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with(MAIN_SEPARATOR) => {
            rest.trim_start_matches(['/', MAIN_SEPARATOR])
        }
        _ => return PathBuf::from(path),
    };

    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Expands `~` and resolves relative paths against the working directory
pub fn resolve_root(path: &str) -> std::io::Result<PathBuf> {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(std::env::current_dir()?.join(expanded))
    }
}

/// Replaces the host separator with `/`
pub fn to_slash(path: &str) -> String {
    if MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(MAIN_SEPARATOR, "/")
    }
}

/// Lexically cleans a `/`-separated path
///
/// Collapses repeated separators, drops `.` segments, folds `name/..` pairs
/// and strips trailing separators. An empty result becomes `"."`.
pub fn clean_slashes(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Path of `path` relative to `root`, with `/` separators
///
/// Returns `"."` for the root itself, and `None` when `path` lies outside
/// `root`.
pub fn relative_slash(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return Some(".".to_string());
    }
    Some(to_slash(&rel.to_string_lossy()))
}
