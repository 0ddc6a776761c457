//! Command-line interface definitions for Headline Harvest.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! All options can be provided via command-line flags or environment variables.

use crate::config::Config;
use crate::outputs::json::SUMMARY_FILE;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Headline Harvest application.
///
/// Options given here take precedence over the matching values of the
/// YAML configuration file.
///
/// # Examples
///
/// ```sh
/// # Discover up to 40 articles and store them under ./articles_output
/// headline_harvest https://news.example.com
///
/// # Smaller run with tuned heuristics
/// headline_harvest https://news.example.com --max-articles 10 -c weights.yaml -o /tmp/out
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Homepage to discover articles on
    #[arg(env = "HARVEST_URL")]
    pub url: String,

    /// Maximum number of article links to follow [default: 40]
    #[arg(long, env = "HARVEST_MAX_ARTICLES")]
    pub max_articles: Option<usize>,

    /// Output directory for article folders
    #[arg(short, long, env = "HARVEST_OUTPUT_DIR", default_value = "./articles_output")]
    pub output: PathBuf,

    /// Simultaneous page fetches during discovery [default: 8]
    #[arg(long, env = "HARVEST_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Optional path to a YAML file with weights and thresholds
    #[arg(short, long, env = "HARVEST_CONFIG")]
    pub config: Option<String>,

    /// Where to write the run summary [default: <output>/run_summary.json]
    #[arg(long, env = "HARVEST_SUMMARY")]
    pub summary: Option<PathBuf>,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(max) = self.max_articles {
            config.run.max_articles = max;
        }
        if let Some(concurrency) = self.concurrency {
            config.run.concurrency = concurrency;
        }
    }

    pub fn summary_path(&self) -> PathBuf {
        self.summary
            .clone()
            .unwrap_or_else(|| self.output.join(SUMMARY_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "headline_harvest",
            "https://news.example.com",
            "--max-articles",
            "10",
            "--output",
            "/tmp/out",
            "--concurrency",
            "4",
        ]);

        assert_eq!(cli.url, "https://news.example.com");
        assert_eq!(cli.max_articles, Some(10));
        assert_eq!(cli.output, PathBuf::from("/tmp/out"));
        assert_eq!(cli.concurrency, Some(4));
        assert_eq!(cli.summary_path(), PathBuf::from("/tmp/out/run_summary.json"));
    }

    #[test]
    fn test_cli_defaults_and_short_flags() {
        let cli = Cli::parse_from(["headline_harvest", "https://news.example.com", "-c", "w.yaml"]);

        assert_eq!(cli.output, PathBuf::from("./articles_output"));
        assert_eq!(cli.config.as_deref(), Some("w.yaml"));
        assert_eq!(cli.max_articles, None);

        let cli = Cli::parse_from([
            "headline_harvest",
            "https://news.example.com",
            "-o",
            "out",
            "--summary",
            "s.json",
        ]);
        assert_eq!(cli.summary_path(), PathBuf::from("s.json"));
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::from_yaml("run:\n  max_articles: 5\n  concurrency: 2\n").unwrap();
        let cli = Cli::parse_from(["headline_harvest", "https://news.example.com", "--concurrency", "12"]);
        cli.apply(&mut config);
        assert_eq!(config.run.max_articles, 5);
        assert_eq!(config.run.concurrency, 12);
    }
}
