//! Article verification.
//!
//! Decides whether a fetched candidate page is an article or a listing
//! page that merely lives under an article-looking path. The decision is a
//! signed score over three signals (URL shape, title shape, body shape)
//! compared against a threshold; every weight comes from
//! [`VerifierWeights`]. Scoring is a pure function of `(url, title, text)`.

use crate::config::VerifierWeights;
use crate::extractors::ExtractedContent;
use crate::models::ArticleRecord;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::RegexSet;
use tracing::{debug, info};

/// URL shapes typical of single articles.
static ARTICLE_URL: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"/articles?/",
        r"/news/",
        r"/story/",
        r"/posts?/",
        r"/blog/",
        r"/opinion/",
        r"/features?/",
        r"/reports?/",
        r"/\d{4}/\d{2}/",
        r"/\d{4}-\d{2}-\d{2}/",
        r"articleshow",
        r"photostory",
        r"/web-stories/",
    ])
    .unwrap()
});

/// URL shapes typical of category, tag, archive and section pages.
static LISTING_URL: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"/category/",
        r"/tags?/",
        r"/archives?/",
        r"/index",
        r"/latest[_-]?news/",
        r"/updates/",
        r"/sections?/",
        r"/home$",
        r"/main$",
        r"/$",
        r"/sports$",
        r"/business$",
        r"/world$",
        r"/politics$",
        r"/technology$",
        r"/news$",
    ])
    .unwrap()
});

/// Titles of listing and landing pages.
static LISTING_TITLE: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"latest.*news.*updates",
        r"news.*updates",
        r"breaking.*news",
        r"sections?",
        r"category",
        r"archives?",
        r"all.*news",
        r"homepage",
        r"main.*page",
        r"index",
        r"executive.*lounge",
        r"in.*depth",
        r"future.*of",
        r"business.*future",
        r"(africa|asia|europe|world|uk|us).*latest",
    ])
    .unwrap()
});

/// Why a page was accepted or rejected, with the score that decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted { score: i32 },
    /// Body text below the hard minimum; no score was computed.
    TooShort { chars: usize },
    BelowThreshold { score: i32 },
}

#[derive(Debug, Clone, Default)]
pub struct ArticleVerifier {
    weights: VerifierWeights,
}

impl ArticleVerifier {
    pub fn new(weights: VerifierWeights) -> Self {
        Self { weights }
    }

    /// Signed score for a page. Does not apply the minimum-length floor.
    pub fn score(&self, url: &str, title: &str, text: &str) -> i32 {
        let w = &self.weights;
        let url_lower = url.to_lowercase();
        let title_lower = title.to_lowercase();
        let mut score = 0;

        if ARTICLE_URL.is_match(&url_lower) {
            score += w.article_url;
        }
        if LISTING_URL.is_match(&url_lower) {
            score += w.listing_url;
        }

        if LISTING_TITLE.is_match(&title_lower) {
            score += w.listing_title;
        }
        if title.split_whitespace().count() > w.descriptive_title_words {
            score += w.descriptive_title;
        }

        let words = text.split_whitespace().count();
        if words >= w.substantial_body_words {
            score += w.substantial_body;
        }
        if words < w.thin_body_words {
            score += w.thin_body;
        }
        if words > w.oversized_body_words {
            score += w.oversized_body;
        }
        if list_ratio(text, w.short_line_words) > w.list_ratio {
            score += w.list_like_body;
        }

        score
    }

    /// Apply the length floor, then the score threshold.
    pub fn evaluate(&self, url: &str, title: &str, text: &str) -> Verdict {
        let chars = text.trim().chars().count();
        if chars < self.weights.min_text_chars {
            return Verdict::TooShort { chars };
        }
        let score = self.score(url, title, text);
        if score >= self.weights.accept_threshold {
            Verdict::Accepted { score }
        } else {
            Verdict::BelowThreshold { score }
        }
    }

    /// Build an [`ArticleRecord`] if the extracted page is an article.
    pub fn verify(&self, url: &str, content: ExtractedContent, extraction_method: &str) -> Result<ArticleRecord, Verdict> {
        let title = content
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let verdict = self.evaluate(url, &title, &content.text);
        debug!(%url, ?verdict, "Article detection");

        let Verdict::Accepted { score } = verdict else {
            info!(%url, ?verdict, "Filtered non-article page");
            return Err(verdict);
        };

        Ok(ArticleRecord {
            url: url.to_string(),
            title,
            word_count: content.word_count(),
            content: content.text,
            author: content.author,
            date: content.date,
            description: content.description,
            extraction_method: extraction_method.to_string(),
            verification_score: score,
            is_verified_article: true,
            scraped_timestamp: Utc::now(),
            image_info: None,
            image_path: None,
            image_saved: false,
            processing_timestamp: None,
        })
    }
}

/// Share of non-empty lines with fewer than `short_words` words, over all lines.
fn list_ratio(text: &str, short_words: usize) -> f64 {
    let lines: Vec<&str> = text.split('\n').collect();
    let short = lines
        .iter()
        .filter(|l| !l.trim().is_empty() && l.split_whitespace().count() < short_words)
        .count();
    short as f64 / lines.len().max(1) as f64
}
