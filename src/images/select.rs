//! Candidate ranking and validation.
//!
//! Merges the candidates of every strategy that ran, keeps the best score
//! per URL, ranks them and walks the ranking until one passes validation.
//! Validation is fail-open: a candidate whose dimensions cannot be read
//! (network error, truncated or unknown format) is accepted.

use crate::config::ImageWeights;
use crate::http::{FetchResponse, Fetcher};
use crate::models::{ImageCandidate, SelectedImage};
use image::ImageReader;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Result of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Accepted; dimensions are present when the header could be decoded.
    Passed { dimensions: Option<(u32, u32)> },
    TooLarge { bytes: u64 },
    TooSmall { width: u32, height: u32 },
    /// The server answered with a textual document instead of an image.
    NotAnImage { content_type: String },
}

/// One entry per URL with the highest score seen, in first-seen order.
pub fn dedupe(candidates: Vec<ImageCandidate>) -> Vec<ImageCandidate> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<ImageCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match index.get(&candidate.url) {
            Some(&i) => {
                if candidate.score > merged[i].score {
                    merged[i] = candidate;
                }
            }
            None => {
                index.insert(candidate.url.clone(), merged.len());
                merged.push(candidate);
            }
        }
    }
    merged
}

/// Deduplicate, then order by score descending; ties go to the
/// higher-priority strategy.
pub fn rank(candidates: Vec<ImageCandidate>) -> Vec<ImageCandidate> {
    let mut ranked = dedupe(candidates);
    ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.source.cmp(&b.source)));
    ranked
}

pub struct ImageSelector {
    fetcher: Arc<dyn Fetcher>,
    weights: ImageWeights,
}

impl ImageSelector {
    pub fn new(fetcher: Arc<dyn Fetcher>, weights: ImageWeights) -> Self {
        Self { fetcher, weights }
    }

    /// First ranked candidate at or above the minimum score that validates.
    #[instrument(level = "info", skip_all, fields(candidates = candidates.len()))]
    pub async fn select(&self, candidates: Vec<ImageCandidate>) -> Option<SelectedImage> {
        for candidate in rank(candidates) {
            if candidate.score < self.weights.min_score {
                debug!(url = %candidate.url, score = candidate.score, "Below minimum score");
                continue;
            }
            match self.validate(&candidate.url).await {
                Validation::Passed { dimensions } => {
                    info!(url = %candidate.url, score = candidate.score, source = %candidate.source, ?dimensions, "Selected image");
                    return Some(SelectedImage { candidate, dimensions });
                }
                rejected => {
                    debug!(url = %candidate.url, ?rejected, "Candidate failed validation");
                }
            }
        }
        None
    }

    /// Size pre-check on the headers, then a dimension read on a body prefix.
    ///
    /// The size limit is applied to whichever response advertises a
    /// `Content-Length`; servers that refuse HEAD are still checked on the GET.
    pub async fn validate(&self, url: &str) -> Validation {
        match self.fetcher.head(url).await {
            Ok(head) => {
                if let Some(rejected) = self.check_headers(&head) {
                    return rejected;
                }
            }
            Err(e) => debug!(%url, error = %e, "HEAD failed; reading body prefix"),
        }

        let prefix = match self.fetcher.get_prefix(url, self.weights.prefix_bytes).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(%url, error = %e, "Image prefix unavailable; accepting");
                return Validation::Passed { dimensions: None };
            }
        };
        if let Some(rejected) = self.check_headers(&prefix) {
            return rejected;
        }

        match read_dimensions(&prefix.body) {
            Some((width, height)) if width < self.weights.min_width || height < self.weights.min_height => {
                Validation::TooSmall { width, height }
            }
            dimensions => Validation::Passed { dimensions },
        }
    }

    fn check_headers(&self, resp: &FetchResponse) -> Option<Validation> {
        if let Some(bytes) = resp.content_length.filter(|&b| b > self.weights.max_bytes) {
            return Some(Validation::TooLarge { bytes });
        }
        if resp.is_text() {
            return Some(Validation::NotAnImage {
                content_type: resp.content_type.clone().unwrap_or_default(),
            });
        }
        None
    }
}

/// Decode only the image header.
fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
