//! Utility functions for string handling and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation for logging
//! - Title-to-folder-name sanitisation and collision handling
//! - File system validation for output directories

use std::collections::HashSet;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Characters that are not allowed in folder names on common file systems.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Upper bound, in characters, for a folder name derived from a title.
const MAX_FOLDER_CHARS: usize = 200;

const UNTITLED: &str = "untitled_article";

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of bytes to keep
///
/// # Returns
///
/// The original string if shorter than `max`, otherwise a truncated version
/// with `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// let long = "a".repeat(500);
/// let short = truncate_for_log(&long, 100);
/// assert!(short.ends_with("…(+400 bytes)"));
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Turn an article title into a folder name.
///
/// Removes characters that are illegal on common file systems, folds every
/// run of whitespace into a single `_`, trims leading and trailing
/// underscores and caps the result at 200 characters.
///
/// # Returns
///
/// The sanitised name, or `"untitled_article"` if nothing is left.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(safe_folder_name("Storm: what's next?"), "Storm_what's_next");
/// assert_eq!(safe_folder_name("???"), "untitled_article");
/// ```
pub fn safe_folder_name(title: &str) -> String {
    let cleaned: String = title.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let trimmed: String = joined.trim_matches('_').chars().take(MAX_FOLDER_CHARS).collect();
    let trimmed = trimmed.trim_end_matches('_');
    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Reserve a folder name, appending `_2`, `_3`, ... when `base` is taken.
pub fn claim_folder_name(base: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{base}_{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory (and any missing parents) if needed, then writes
/// and removes a scratch file to verify write permissions.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let check_path = path.join("..__write_check__");
    stdfs::File::create(&check_path)?;
    let _ = stdfs::remove_file(&check_path);
    info!("Output directory is writable");
    Ok(())
}
