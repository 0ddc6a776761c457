//! Content extractors for article pages.
//!
//! [`MetadataExtractor`] is the [`ContentExtractor`] used during discovery:
//! title, byline and date from JSON-LD and meta tags, body from the article
//! container. [`TopImageExtractor`] only looks for an image, with a
//! layout-first bias (`image_src`, then the largest inline `<img>`), which is
//! what lets the image harvester triangulate a lead image.
//!
//! Both are pure functions of `(html, url)`; fetching is the caller's job.

pub mod document;
pub mod metadata;
pub mod top_image;

pub use document::{Document, ImageTag};
pub use metadata::MetadataExtractor;
pub use top_image::TopImageExtractor;

use url::Url;

/// What an extractor could recover from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    /// Main text, one paragraph per line.
    pub text: String,
    pub author: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    /// Absolute URL of the page's main image, if one was identified.
    pub main_image: Option<Url>,
}

impl ExtractedContent {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

pub trait ContentExtractor: Send + Sync {
    /// Short identifier recorded on article records.
    fn name(&self) -> &'static str;

    /// Extract content from `html`, resolving relative URLs against `url`.
    fn extract(&self, html: &str, url: &Url) -> ExtractedContent;
}
