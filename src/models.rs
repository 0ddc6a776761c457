//! Data models for discovered articles, image candidates and run summaries.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ArticleCandidateLink`]: a same-domain link that looks like an article
//! - [`ArticleRecord`]: a verified article, later enriched with image fields
//! - [`ImageCandidate`] / [`SourceMethod`]: a scored lead-image proposal
//! - [`SelectedImage`] / [`MaterializedImage`]: the chosen and stored image
//! - [`PipelineRun`]: counters and per-article outcomes for one execution
//!
//! Records serialize with snake_case field names; the JSON written per
//! article is exactly the serde representation of [`ArticleRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A link found on a homepage that passed the article-path heuristics.
///
/// The URL always shares the homepage's host and uses `http` or `https`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArticleCandidateLink {
    /// Absolute URL of the suspected article.
    pub url: Url,
    /// Lowercased host of the homepage the link was found on.
    pub homepage_domain: String,
}

/// A verified news article.
///
/// Created by the verifier on acceptance. Everything except the image
/// fields is fixed from that point on; the orchestrator fills in
/// `image_info`, `image_path`, `image_saved` and `processing_timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// The article URL.
    pub url: String,
    /// Extracted headline, or `"Unknown"` when the page had none.
    pub title: String,
    /// Main body text, one paragraph per line.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Name of the extractor that produced the text.
    pub extraction_method: String,
    /// Whitespace-separated token count of `content`.
    pub word_count: usize,
    /// Score assigned by the article verifier.
    pub verification_score: i32,
    pub is_verified_article: bool,
    /// When the article page was extracted.
    pub scraped_timestamp: DateTime<Utc>,
    /// The selected image, once one has been materialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_info: Option<ImageCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub image_saved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_timestamp: Option<DateTime<Utc>>,
}

impl ArticleRecord {
    /// Attach a stored image to this record.
    pub fn attach_image(&mut self, selected: &SelectedImage, stored: &MaterializedImage) {
        self.image_info = Some(selected.candidate.clone());
        self.image_path = Some(stored.path.display().to_string());
        self.image_saved = true;
        self.processing_timestamp = Some(Utc::now());
    }

    /// Mark this record as processed without an image.
    pub fn mark_image_absent(&mut self) {
        self.image_info = None;
        self.image_path = None;
        self.image_saved = false;
        self.processing_timestamp = Some(Utc::now());
    }
}

/// The harvesting technique that proposed an image.
///
/// Variants are declared in strategy priority order, which is also the
/// tie-break order when two candidates share a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMethod {
    /// Main image from the metadata extractor.
    PrimaryMetadata,
    /// Top image from the independent top-image extractor.
    SecondaryMetadata,
    /// `og:image` meta tag.
    OpenGraph,
    /// `twitter:image` meta tag.
    TwitterCard,
    /// A plain `<img>` element.
    GenericTag,
}

impl SourceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMethod::PrimaryMetadata => "primary_metadata",
            SourceMethod::SecondaryMetadata => "secondary_metadata",
            SourceMethod::OpenGraph => "open_graph",
            SourceMethod::TwitterCard => "twitter_card",
            SourceMethod::GenericTag => "generic_tag",
        }
    }
}

impl fmt::Display for SourceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tentative lead image for one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    /// Absolute image URL.
    pub url: String,
    /// Relevance score in `0..=100`.
    pub score: u8,
    pub source: SourceMethod,
}

/// The candidate that passed the minimum-score and size gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub candidate: ImageCandidate,
    /// Dimensions decoded during validation, when the header could be read.
    pub dimensions: Option<(u32, u32)>,
}

/// A downloaded image re-encoded to the canonical format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedImage {
    pub path: std::path::PathBuf,
    /// Always `"jpeg"`.
    pub encoding: &'static str,
    pub quality: u8,
    pub width: u32,
    pub height: u32,
}

/// Attempted vs. succeeded units for one stage of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCount {
    pub attempted: usize,
    pub succeeded: usize,
}

/// What happened to one verified article during the image phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    ImageSaved,
    /// No strategy proposed any candidate.
    NoCandidates,
    /// Candidates existed but none reached the minimum score or passed validation.
    NoneValidated,
    /// Selection succeeded but the download or re-encode failed.
    MaterializeFailed,
    /// The run was stopped before this article was attempted.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleOutcome {
    pub url: String,
    pub title: String,
    pub status: ImageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// Aggregate of a single execution.
///
/// Passed by `&mut` through the orchestrator stages; nothing about a run
/// lives in global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub homepage_url: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    /// Hrefs seen on the homepage → article candidates.
    pub links: StageCount,
    /// Candidates fetched → pages with extractable content.
    pub pages: StageCount,
    /// Pages checked → articles accepted.
    pub verification: StageCount,
    /// Articles attempted → images materialized.
    pub images: StageCount,
    /// Percentage of discovered articles that ended with an image.
    pub success_rate: f64,
    /// Image-completed articles per second of wall time.
    pub throughput: f64,
    pub cancelled: bool,
    pub outcomes: Vec<ArticleOutcome>,
}

impl PipelineRun {
    pub fn new(homepage_url: &str) -> Self {
        Self {
            homepage_url: homepage_url.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            elapsed_secs: 0.0,
            links: StageCount::default(),
            pages: StageCount::default(),
            verification: StageCount::default(),
            images: StageCount::default(),
            success_rate: 0.0,
            throughput: 0.0,
            cancelled: false,
            outcomes: Vec::new(),
        }
    }

    /// Number of verified articles in this run.
    pub fn discovered(&self) -> usize {
        self.verification.succeeded
    }

    /// Number of articles that ended with a stored image.
    pub fn image_completed(&self) -> usize {
        self.images.succeeded
    }

    pub fn record_outcome(&mut self, record: &ArticleRecord, status: ImageStatus, folder: Option<String>) {
        if status != ImageStatus::Skipped {
            self.images.attempted += 1;
        }
        if status == ImageStatus::ImageSaved {
            self.images.succeeded += 1;
        }
        self.outcomes.push(ArticleOutcome {
            url: record.url.clone(),
            title: record.title.clone(),
            status,
            folder,
        });
    }

    /// Stamp the finish time and derive the rates.
    pub fn finalize(&mut self) {
        let finished = Utc::now();
        let elapsed = (finished - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        self.finished_at = Some(finished);
        self.elapsed_secs = elapsed;
        self.success_rate = if self.discovered() > 0 {
            self.image_completed() as f64 / self.discovered() as f64 * 100.0
        } else {
            0.0
        };
        self.throughput = if elapsed > 0.0 {
            self.image_completed() as f64 / elapsed
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ArticleRecord {
        ArticleRecord {
            url: "https://news.example.com/news/a".to_string(),
            title: "A headline".to_string(),
            content: "Body".to_string(),
            author: None,
            date: None,
            description: None,
            extraction_method: "metadata".to_string(),
            word_count: 1,
            verification_score: 55,
            is_verified_article: true,
            scraped_timestamp: Utc::now(),
            image_info: None,
            image_path: None,
            image_saved: false,
            processing_timestamp: None,
        }
    }

    #[test]
    fn test_source_method_order_follows_strategy_priority() {
        assert!(SourceMethod::PrimaryMetadata < SourceMethod::SecondaryMetadata);
        assert!(SourceMethod::SecondaryMetadata < SourceMethod::OpenGraph);
        assert!(SourceMethod::TwitterCard < SourceMethod::GenericTag);
    }

    #[test]
    fn test_source_method_serializes_snake_case() {
        let json = serde_json::to_string(&SourceMethod::OpenGraph).unwrap();
        assert_eq!(json, "\"open_graph\"");
        assert_eq!(SourceMethod::TwitterCard.to_string(), "twitter_card");
    }

    #[test]
    fn test_article_record_omits_absent_image_fields() {
        let json = serde_json::to_string(&record()).unwrap();
        assert!(json.contains("\"image_saved\":false"));
        assert!(!json.contains("image_path"));
        assert!(!json.contains("author"));
    }

    #[test]
    fn test_attach_image_sets_fields() {
        let mut article = record();
        let selected = SelectedImage {
            candidate: ImageCandidate {
                url: "https://news.example.com/hero.jpg".to_string(),
                score: 95,
                source: SourceMethod::OpenGraph,
            },
            dimensions: Some((800, 600)),
        };
        let stored = MaterializedImage {
            path: std::path::PathBuf::from("out/A_headline/image.jpg"),
            encoding: "jpeg",
            quality: 90,
            width: 800,
            height: 600,
        };
        article.attach_image(&selected, &stored);
        assert!(article.image_saved);
        assert_eq!(article.image_info.as_ref().map(|i| i.score), Some(95));
        assert!(article.image_path.as_deref().unwrap().ends_with("image.jpg"));
        assert!(article.processing_timestamp.is_some());
    }

    #[test]
    fn test_run_rates() {
        let mut run = PipelineRun::new("https://news.example.com");
        run.verification = StageCount { attempted: 4, succeeded: 4 };
        let article = record();
        run.record_outcome(&article, ImageStatus::ImageSaved, None);
        run.record_outcome(&article, ImageStatus::ImageSaved, None);
        run.record_outcome(&article, ImageStatus::NoneValidated, None);
        run.record_outcome(&article, ImageStatus::Skipped, None);
        run.finalize();

        assert_eq!(run.images, StageCount { attempted: 3, succeeded: 2 });
        assert_eq!(run.success_rate, 50.0);
        assert_eq!(run.outcomes.len(), 4);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_run_with_no_articles_has_zero_rate() {
        let mut run = PipelineRun::new("https://news.example.com");
        run.finalize();
        assert_eq!(run.success_rate, 0.0);
    }
}
