//! Lead-image candidate harvesting.
//!
//! An [`ImageHarvester`] runs an ordered list of [`HarvestStrategy`]
//! objects. Each strategy may declare a gate: it only runs while the best
//! score gathered so far is below that gate, so the cheap, confident
//! metadata strategy usually ends the search before the full markup scan.
//!
//! | Order | Strategy | Gate | Produces |
//! |-------|----------|------|----------|
//! | 1 | [`PrimaryMetadataStrategy`] | always | metadata main image |
//! | 2 | [`SecondaryMetadataStrategy`] | best < 80 | top-image extractor result |
//! | 3 | [`MarkupStrategy`] | best < 70 | `og:image`, `twitter:image`, every `<img>` |
//!
//! Strategies swallow fetch and parse failures and return no candidates.

use super::score::{ImageScorer, is_excluded, is_excluded_url};
use crate::config::HarvestGates;
use crate::extractors::document::{Document, resolve_http};
use crate::extractors::{ContentExtractor, MetadataExtractor, TopImageExtractor};
use crate::http::Fetcher;
use crate::models::{ImageCandidate, SourceMethod};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// One independent technique for proposing image candidates.
#[async_trait]
pub trait HarvestStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run only while the best score so far is below this value.
    /// `None` means the strategy always runs.
    fn run_below(&self) -> Option<u8>;

    /// Propose candidates for `article_url`. Never fails; problems yield `vec![]`.
    async fn harvest(&self, article_url: &Url) -> Vec<ImageCandidate>;
}

/// Fetch `url` as text together with the URL it was served from, which
/// relative references in the page resolve against. Failures are logged and
/// swallowed.
async fn fetch_html(fetcher: &dyn Fetcher, strategy: &'static str, url: &Url) -> Option<(String, Url)> {
    match fetcher.get(url.as_str()).await {
        Ok(resp) => Some((resp.text(), resp.base_url(url))),
        Err(e) => {
            warn!(strategy, %url, error = %e, "Strategy fetch failed");
            None
        }
    }
}

/// Candidate from an extractor's main image, unless it is excluded.
fn main_image_candidate(image: Option<Url>, scorer: &ImageScorer, source: SourceMethod) -> Option<ImageCandidate> {
    let image = image?;
    if is_excluded_url(&image) {
        debug!(image = %image, "Main image matches exclusion rule");
        return None;
    }
    let score = scorer.score(image.as_str(), source);
    Some(ImageCandidate {
        url: image.to_string(),
        score,
        source,
    })
}

/// Main image from the metadata extractor.
pub struct PrimaryMetadataStrategy {
    fetcher: Arc<dyn Fetcher>,
    scorer: Arc<ImageScorer>,
}

impl PrimaryMetadataStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>, scorer: Arc<ImageScorer>) -> Self {
        Self { fetcher, scorer }
    }
}

#[async_trait]
impl HarvestStrategy for PrimaryMetadataStrategy {
    fn name(&self) -> &'static str {
        "primary_metadata"
    }

    fn run_below(&self) -> Option<u8> {
        None
    }

    #[instrument(level = "info", skip_all, fields(%article_url))]
    async fn harvest(&self, article_url: &Url) -> Vec<ImageCandidate> {
        let Some((html, page)) = fetch_html(self.fetcher.as_ref(), self.name(), article_url).await else {
            return Vec::new();
        };
        let image = MetadataExtractor.extract(&html, &page).main_image;
        main_image_candidate(image, &self.scorer, SourceMethod::PrimaryMetadata)
        .into_iter()
        .collect()
    }
}

/// Top image from the layout-first extractor, on an independent fetch.
pub struct SecondaryMetadataStrategy {
    fetcher: Arc<dyn Fetcher>,
    scorer: Arc<ImageScorer>,
    gate: u8,
}

impl SecondaryMetadataStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>, scorer: Arc<ImageScorer>, gate: u8) -> Self {
        Self { fetcher, scorer, gate }
    }
}

#[async_trait]
impl HarvestStrategy for SecondaryMetadataStrategy {
    fn name(&self) -> &'static str {
        "secondary_metadata"
    }

    fn run_below(&self) -> Option<u8> {
        Some(self.gate)
    }

    #[instrument(level = "info", skip_all, fields(%article_url))]
    async fn harvest(&self, article_url: &Url) -> Vec<ImageCandidate> {
        let Some((html, page)) = fetch_html(self.fetcher.as_ref(), self.name(), article_url).await else {
            return Vec::new();
        };
        let image = TopImageExtractor.top_image(&html, &page);
        main_image_candidate(image, &self.scorer, SourceMethod::SecondaryMetadata)
        .into_iter()
        .collect()
    }
}

/// Social meta tags followed by every `<img>` on the page.
pub struct MarkupStrategy {
    fetcher: Arc<dyn Fetcher>,
    scorer: Arc<ImageScorer>,
    gate: u8,
}

impl MarkupStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>, scorer: Arc<ImageScorer>, gate: u8) -> Self {
        Self { fetcher, scorer, gate }
    }

    /// Parse and score; kept synchronous so the parsed tree never spans an await.
    pub fn candidates_from_html(&self, html: &str, page: &Url) -> Vec<ImageCandidate> {
        let doc = Document::parse(html);
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        let social = [
            (doc.first_meta(&["og:image", "og:image:url"]), SourceMethod::OpenGraph),
            (doc.first_meta(&["twitter:image", "twitter:image:src"]), SourceMethod::TwitterCard),
        ];
        for (raw, source) in social {
            let Some(image) = raw.and_then(|r| resolve_http(page, &r)) else {
                continue;
            };
            if is_excluded_url(&image) || !seen.insert(image.to_string()) {
                continue;
            }
            out.push(ImageCandidate {
                score: self.scorer.score(image.as_str(), source),
                url: image.to_string(),
                source,
            });
        }

        for tag in doc.images() {
            let Some(image) = tag.src.as_deref().and_then(|src| resolve_http(page, src)) else {
                continue;
            };
            if is_excluded(&image, Some(&tag)) || !seen.insert(image.to_string()) {
                continue;
            }
            out.push(ImageCandidate {
                score: self.scorer.score(image.as_str(), SourceMethod::GenericTag),
                url: image.to_string(),
                source: SourceMethod::GenericTag,
            });
        }
        out
    }
}

#[async_trait]
impl HarvestStrategy for MarkupStrategy {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn run_below(&self) -> Option<u8> {
        Some(self.gate)
    }

    #[instrument(level = "info", skip_all, fields(%article_url))]
    async fn harvest(&self, article_url: &Url) -> Vec<ImageCandidate> {
        let Some((html, page)) = fetch_html(self.fetcher.as_ref(), self.name(), article_url).await else {
            return Vec::new();
        };
        self.candidates_from_html(&html, &page)
    }
}

/// Ordered strategies with score-gated short-circuiting.
pub struct ImageHarvester {
    strategies: Vec<Box<dyn HarvestStrategy>>,
}

impl ImageHarvester {
    pub fn new(strategies: Vec<Box<dyn HarvestStrategy>>) -> Self {
        Self { strategies }
    }

    /// The stock three-strategy chain.
    pub fn standard(fetcher: Arc<dyn Fetcher>, scorer: Arc<ImageScorer>, gates: &HarvestGates) -> Self {
        Self::new(vec![
            Box::new(PrimaryMetadataStrategy::new(fetcher.clone(), scorer.clone())),
            Box::new(SecondaryMetadataStrategy::new(
                fetcher.clone(),
                scorer.clone(),
                gates.secondary_below,
            )),
            Box::new(MarkupStrategy::new(fetcher, scorer, gates.markup_below)),
        ])
    }

    /// Every candidate from every strategy that ran, in strategy order.
    #[instrument(level = "info", skip_all, fields(%article_url))]
    pub async fn harvest(&self, article_url: &Url) -> Vec<ImageCandidate> {
        let mut all: Vec<ImageCandidate> = Vec::new();

        for strategy in &self.strategies {
            let best = all.iter().map(|c| c.score).max().unwrap_or(0);
            if let Some(gate) = strategy.run_below() {
                if best >= gate {
                    debug!(strategy = strategy.name(), best, gate, "Skipping strategy; confident enough");
                    continue;
                }
            }
            let found = strategy.harvest(article_url).await;
            debug!(strategy = strategy.name(), count = found.len(), "Strategy finished");
            all.extend(found);
        }

        info!(count = all.len(), "Harvested image candidates");
        all
    }
}
