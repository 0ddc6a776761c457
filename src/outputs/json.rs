//! JSON output for article records and the run summary.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── Council_approves_budget/
//! │   ├── article.json
//! │   └── image.jpg        # only when an image was stored
//! ├── Flood_waters_recede/
//! │   └── article.json
//! └── run_summary.json
//! ```

use crate::models::{ArticleRecord, PipelineRun};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const ARTICLE_FILE: &str = "article.json";
pub const SUMMARY_FILE: &str = "run_summary.json";

/// Write an [`ArticleRecord`] as `article.json` inside `article_dir`.
///
/// Creates `article_dir` if needed.
///
/// # Returns
///
/// The path of the written file.
#[instrument(level = "info", skip_all, fields(article_dir = %article_dir.display()))]
pub async fn write_article(article_dir: &Path, record: &ArticleRecord) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(record)?;

    if let Err(e) = fs::create_dir_all(article_dir).await {
        error!(error = %e, "Failed to create article dir");
        return Err(e.into());
    }

    let path = article_dir.join(ARTICLE_FILE);
    fs::write(&path, json).await?;
    info!(path = %path.display(), image_saved = record.image_saved, "Wrote article JSON");
    Ok(path)
}

/// Write the [`PipelineRun`] summary to `path`, creating parent directories.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_summary(path: &Path, run: &PipelineRun) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(run)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, json).await?;
    info!("Wrote run summary");
    Ok(())
}
