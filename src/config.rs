//! Runtime configuration: transport settings and every heuristic weight.
//!
//! All fields carry defaults, so an empty YAML document (or no file at all)
//! yields the stock behaviour and a partial file overrides only the keys it
//! names:
//!
//! ```yaml
//! verifier:
//!   accept_threshold: 35
//! images:
//!   min_score: 50
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunSettings,
    pub http: HttpSettings,
    pub links: LinkRules,
    pub verifier: VerifierWeights,
    pub images: ImageWeights,
    pub harvest: HarvestGates,
    pub materialize: MaterializeSettings,
}

impl Config {
    /// Load a YAML configuration file, or the defaults when `path` is `None`.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(Path::new(path))?;
        let config = Self::from_yaml(&raw)?;
        info!(%path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Upper bound on article candidates taken from the homepage.
    pub max_articles: usize,
    /// Simultaneous article-page fetches during discovery.
    pub concurrency: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_articles: 40,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    /// Timeout for page fetches and full image downloads.
    pub request_timeout_secs: u64,
    /// Timeout for HEAD checks and partial reads during validation.
    pub validation_timeout_secs: u64,
    pub max_retries: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter_ms: u64,
}

impl HttpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            validation_timeout_secs: 15,
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

/// Path substrings used by the link classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkRules {
    pub article_indicators: Vec<String>,
    pub exclusions: Vec<String>,
}

impl Default for LinkRules {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            article_indicators: owned(&[
                "/article/",
                "/news/",
                "/story/",
                "/post/",
                "/blog/",
                "/sports/",
                "/politics/",
                "/business/",
                "/technology/",
                "/entertainment/",
                "/health/",
                "/world/",
                "/opinion/",
            ]),
            exclusions: owned(&[
                "/category/",
                "/tag/",
                "/author/",
                "/search/",
                "/login",
                "/register",
                "/contact",
                "/about",
                "/privacy",
                "/terms",
                "/rss",
                "/feed",
                ".pdf",
                ".xml",
                ".json",
                ".js",
                ".css",
            ]),
        }
    }
}

/// Signed contributions to the article verification score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierWeights {
    /// Trimmed body text shorter than this is rejected outright.
    pub min_text_chars: usize,
    pub accept_threshold: i32,
    pub article_url: i32,
    pub listing_url: i32,
    pub listing_title: i32,
    pub descriptive_title: i32,
    /// Titles with more words than this earn `descriptive_title`.
    pub descriptive_title_words: usize,
    pub substantial_body: i32,
    pub substantial_body_words: usize,
    pub thin_body: i32,
    pub thin_body_words: usize,
    pub oversized_body: i32,
    pub oversized_body_words: usize,
    pub list_like_body: i32,
    /// Lines with fewer words than this count as short.
    pub short_line_words: usize,
    /// Share of short lines above which the body reads as a list.
    pub list_ratio: f64,
}

impl Default for VerifierWeights {
    fn default() -> Self {
        Self {
            min_text_chars: 50,
            accept_threshold: 40,
            article_url: 25,
            listing_url: -30,
            listing_title: -40,
            descriptive_title: 10,
            descriptive_title_words: 4,
            substantial_body: 20,
            substantial_body_words: 150,
            thin_body: -20,
            thin_body_words: 50,
            oversized_body: -10,
            oversized_body_words: 2000,
            list_like_body: -15,
            short_line_words: 10,
            list_ratio: 0.3,
        }
    }
}

/// Image relevance scoring and validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageWeights {
    pub base: i32,
    pub primary_metadata_bonus: i32,
    pub secondary_metadata_bonus: i32,
    pub open_graph_bonus: i32,
    pub twitter_card_bonus: i32,
    pub generic_tag_bonus: i32,
    /// featured / main / hero / cover / article
    pub prominent_keyword: i32,
    /// large / big / full / original
    pub size_keyword: i32,
    /// CMS upload directory such as `wp-content/uploads`
    pub uploads_path: i32,
    /// logo / brand / header / masthead / watermark
    pub branding_keyword: i32,
    pub tracking_pixel: i32,
    pub analytics_marker: i32,
    /// Candidates scoring below this are never selected.
    pub min_score: u8,
    pub min_width: u32,
    pub min_height: u32,
    pub max_bytes: u64,
    /// Bytes read from the start of an image to decode its dimensions.
    pub prefix_bytes: usize,
}

impl Default for ImageWeights {
    fn default() -> Self {
        Self {
            base: 50,
            primary_metadata_bonus: 30,
            secondary_metadata_bonus: 25,
            open_graph_bonus: 25,
            twitter_card_bonus: 20,
            generic_tag_bonus: 5,
            prominent_keyword: 20,
            size_keyword: 12,
            uploads_path: 10,
            branding_keyword: -25,
            tracking_pixel: -50,
            analytics_marker: -40,
            min_score: 40,
            min_width: 100,
            min_height: 100,
            max_bytes: 10 * 1024 * 1024,
            prefix_bytes: 10 * 1024,
        }
    }
}

/// Best-score gates below which the fallback strategies run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestGates {
    pub secondary_below: u8,
    pub markup_below: u8,
}

impl Default for HarvestGates {
    fn default() -> Self {
        Self {
            secondary_below: 80,
            markup_below: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializeSettings {
    pub jpeg_quality: u8,
    pub file_name: String,
}

impl Default for MaterializeSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            file_name: "image".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.verifier.accept_threshold, 40);
        assert_eq!(config.images.min_score, 40);
        assert_eq!(config.harvest.secondary_below, 80);
        assert_eq!(config.materialize.jpeg_quality, 90);
    }

    #[test]
    fn test_partial_yaml_overrides_named_fields_only() {
        let raw = r#"
verifier:
  accept_threshold: 35
images:
  min_score: 50
  max_bytes: 1024
run:
  max_articles: 5
"#;
        let config = Config::from_yaml(raw).unwrap();
        assert_eq!(config.verifier.accept_threshold, 35);
        assert_eq!(config.verifier.article_url, 25);
        assert_eq!(config.images.min_score, 50);
        assert_eq!(config.images.max_bytes, 1024);
        assert_eq!(config.images.base, 50);
        assert_eq!(config.run.max_articles, 5);
        assert_eq!(config.run.concurrency, 8);
    }

    #[test]
    fn test_link_rules_defaults() {
        let rules = LinkRules::default();
        assert_eq!(rules.article_indicators.len(), 13);
        assert!(rules.exclusions.contains(&"/category/".to_string()));
        assert!(rules.exclusions.contains(&".css".to_string()));
    }

    #[test]
    fn test_load_without_path() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.http.max_retries, 3);
        assert_eq!(config.http.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(Config::from_yaml("verifier: [1, 2").is_err());
    }
}
