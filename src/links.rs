//! Homepage link classification.
//!
//! Turns the raw `href` values of a homepage into a bounded, deduplicated
//! list of same-domain URLs whose paths look like articles. Exclusion
//! substrings always win over article indicators, so
//! `/news/category/world` is dropped even though it contains `/news/`.

use crate::config::LinkRules;
use crate::models::ArticleCandidateLink;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};
use url::Url;

/// `/2024/` or `/2024-05/` anywhere in the path.
static DATE_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d{4}/|/\d{4}-\d{2}/").unwrap());

#[derive(Debug, Clone)]
pub struct LinkClassifier {
    rules: LinkRules,
}

impl LinkClassifier {
    pub fn new(rules: LinkRules) -> Self {
        Self { rules }
    }

    /// Filter `hrefs` found on `homepage` down to at most `max_articles`
    /// article candidates, keeping first-seen order.
    #[instrument(level = "info", skip_all, fields(homepage = %homepage, hrefs = hrefs.len()))]
    pub fn classify(&self, homepage: &Url, hrefs: &[String], max_articles: usize) -> Vec<ArticleCandidateLink> {
        let Some(domain) = homepage.host_str().map(str::to_lowercase) else {
            return Vec::new();
        };

        let candidates: Vec<ArticleCandidateLink> = hrefs
            .iter()
            .filter_map(|href| self.accept(homepage, &domain, href))
            .unique()
            .take(max_articles)
            .map(|url| ArticleCandidateLink {
                url,
                homepage_domain: domain.clone(),
            })
            .collect();

        info!(count = candidates.len(), "Classified article candidates");
        candidates
    }

    /// Resolve one `href` and return it if it qualifies as an article candidate.
    fn accept(&self, homepage: &Url, domain: &str, href: &str) -> Option<Url> {
        let Ok(mut resolved) = homepage.join(href) else {
            debug!(%href, "Skipping malformed href");
            return None;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            return None;
        }
        // Host and explicit port must both match; a scheme's default port
        // counts as no port, so http and https links to the host both stay.
        if !resolved
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(domain))
            || resolved.port() != homepage.port()
        {
            return None;
        }

        let path = resolved.path().to_lowercase();
        if path.len() <= 1 || !self.is_article_path(&path) {
            return None;
        }

        // Same page reached through different anchors is one candidate.
        resolved.set_fragment(None);
        Some(resolved)
    }

    /// Article indicator or date segment, and no exclusion substring.
    pub fn is_article_path(&self, path: &str) -> bool {
        let has_indicator = self
            .rules
            .article_indicators
            .iter()
            .any(|ind| path.contains(ind.as_str()));
        let has_date = DATE_SEGMENT.is_match(path);
        let excluded = self
            .rules
            .exclusions
            .iter()
            .any(|ex| path.contains(ex.as_str()));
        (has_indicator || has_date) && !excluded
    }
}

impl Default for LinkClassifier {
    fn default() -> Self {
        Self::new(LinkRules::default())
    }
}
