//! Layout-first top-image detection.
//!
//! Ignores most self-declared metadata and looks at the rendered structure:
//! the top image is an explicit `image_src` link, else the largest declared
//! inline image outside page chrome. Social meta tags are only consulted as
//! a last resort.

use super::document::{Document, ImageTag, in_page_chrome, resolve_http};
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::debug;
use url::Url;

static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

/// Smallest declared area (px²) for an inline image to count as a top image.
const MIN_DECLARED_AREA: u64 = 5_000;

/// Secondary image source with a different bias from [`super::MetadataExtractor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TopImageExtractor;

impl TopImageExtractor {
    /// Absolute URL of the page's top image, resolved against `url`.
    pub fn top_image(&self, html: &str, url: &Url) -> Option<Url> {
        let doc = Document::parse(html);
        let found = find_top_image(&doc, url);
        debug!(%url, found = ?found.as_ref().map(Url::as_str), "Top-image extraction");
        found
    }
}

fn find_top_image(doc: &Document, url: &Url) -> Option<Url> {
    if let Some(found) = doc.link_image_src().and_then(|raw| resolve_http(url, &raw)) {
        return Some(found);
    }
    if let Some(found) = doc.meta("image").and_then(|raw| resolve_http(url, &raw)) {
        return Some(found);
    }

    let largest = doc
        .html()
        .select(&IMG)
        .filter(|img| !in_page_chrome(img))
        .map(ImageTag::from_element)
        .filter_map(|tag| {
            let area = tag.declared_area()?;
            let src = resolve_http(url, tag.src.as_deref()?)?;
            (area >= MIN_DECLARED_AREA).then_some((area, src))
        })
        // first maximum wins
        .fold(None::<(u64, Url)>, |best, (area, src)| match best {
            Some((best_area, _)) if best_area >= area => best,
            _ => Some((area, src)),
        });
    if let Some((_, src)) = largest {
        return Some(src);
    }

    doc.meta("og:image").and_then(|raw| resolve_http(url, &raw))
}
