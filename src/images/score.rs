//! Image relevance scoring and the exclusion rule.
//!
//! Scores start at a base value, gain a bonus for the harvesting technique
//! that found the image, move up or down on URL keywords, and are clamped
//! to `0..=100`. The exclusion rule is applied before scoring and drops
//! logos, icons, ads, social buttons, small thumbnails and tracking pixels
//! outright.

use crate::config::ImageWeights;
use crate::extractors::ImageTag;
use crate::models::SourceMethod;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static EXCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)logo|icon|favicon|avatar|profile|",
        r"advertisement|ad[_-]|banner|widget|",
        r"social|share|button|arrow|play|",
        r"thumbnail.*small|thumb.*\d+x\d+|\d+x\d+.*thumb|",
        r"facebook\.com/tr|google-analytics|googletagmanager|",
        r"doubleclick|googlesyndication|adsystem|",
        r"pixel\?|track\?|beacon\?|analytics|",
        r"1x1\.gif|transparent\.gif|spacer\.gif",
    ))
    .unwrap()
});

/// `width=1` / `height=1` as a whole query value, or a standalone `1x1` token.
static ONE_PIXEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[?&;](width|height)=1(&|;|$)|(^|[^0-9])1x1([^0-9]|$)").unwrap());

const TRACKING_DOMAINS: &[&str] = &[
    "facebook.com",
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
];

const PROMINENT_TERMS: &[&str] = &["featured", "main", "hero", "cover", "article"];
const SIZE_TERMS: &[&str] = &["large", "big", "full", "original"];
const UPLOAD_MARKERS: &[&str] = &["wp-content/uploads"];
const BRANDING_TERMS: &[&str] = &["logo", "brand", "header", "masthead", "watermark"];
const TRACKING_PIXEL_MARKERS: &[&str] = &["facebook.com/tr", "/tr?"];
const ANALYTICS_MARKERS: &[&str] = &["analytics", "tracking", "pixel?", "beacon?"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[derive(Debug, Clone, Default)]
pub struct ImageScorer {
    weights: ImageWeights,
}

impl ImageScorer {
    pub fn new(weights: ImageWeights) -> Self {
        Self { weights }
    }

    fn source_bonus(&self, source: SourceMethod) -> i32 {
        let w = &self.weights;
        match source {
            SourceMethod::PrimaryMetadata => w.primary_metadata_bonus,
            SourceMethod::SecondaryMetadata => w.secondary_metadata_bonus,
            SourceMethod::OpenGraph => w.open_graph_bonus,
            SourceMethod::TwitterCard => w.twitter_card_bonus,
            SourceMethod::GenericTag => w.generic_tag_bonus,
        }
    }

    /// Relevance of `url` as a lead image, in `0..=100`.
    pub fn score(&self, url: &str, source: SourceMethod) -> u8 {
        let w = &self.weights;
        let lower = url.to_lowercase();
        let mut score = w.base + self.source_bonus(source);

        if contains_any(&lower, PROMINENT_TERMS) {
            score += w.prominent_keyword;
        }
        if contains_any(&lower, SIZE_TERMS) {
            score += w.size_keyword;
        }
        if contains_any(&lower, UPLOAD_MARKERS) {
            score += w.uploads_path;
        }
        if contains_any(&lower, BRANDING_TERMS) {
            score += w.branding_keyword;
        }
        if contains_any(&lower, TRACKING_PIXEL_MARKERS) {
            score += w.tracking_pixel;
        }
        if contains_any(&lower, ANALYTICS_MARKERS) {
            score += w.analytics_marker;
        }

        score.clamp(0, 100) as u8
    }
}

/// True when `url` must never be considered as a lead image.
pub fn is_excluded_url(url: &Url) -> bool {
    let raw = url.as_str();
    if EXCLUDE.is_match(raw) || ONE_PIXEL.is_match(raw) {
        return true;
    }
    url.host_str().is_some_and(|host| {
        let host = host.to_lowercase();
        TRACKING_DOMAINS
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    })
}

/// [`is_excluded_url`], plus the same patterns against `alt` and `class`.
pub fn is_excluded(url: &Url, tag: Option<&ImageTag>) -> bool {
    if is_excluded_url(url) {
        return true;
    }
    tag.is_some_and(|t| EXCLUDE.is_match(&t.alt) || EXCLUDE.is_match(&t.class))
}
