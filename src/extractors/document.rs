//! Thin query layer over a parsed HTML document.
//!
//! Wraps `scraper::Html` with the handful of lookups the pipeline needs:
//! meta tags by name or property, `<img>` elements with lazy-load fallbacks,
//! hyperlinks, and `<title>`. `scraper::Html` is not `Send`, so a
//! [`Document`] must be built and dropped without crossing an `.await`.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static LINK_IMAGE_SRC: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[rel='image_src'][href]").unwrap());

/// Attributes consulted, in order, for an image's source URL.
pub const IMAGE_SRC_ATTRS: &[&str] = &["src", "data-src", "data-lazy-src", "data-original"];

/// An `<img>` element as seen by the image harvester.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageTag {
    /// First non-empty value among [`IMAGE_SRC_ATTRS`], unresolved.
    pub src: Option<String>,
    pub alt: String,
    /// Class list in source order, single-space separated.
    pub class: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ImageTag {
    pub(crate) fn from_element(el: ElementRef<'_>) -> Self {
        let attrs = el.value();
        let src = IMAGE_SRC_ATTRS
            .iter()
            .filter_map(|name| attrs.attr(name))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string);
        Self {
            src,
            alt: attrs.attr("alt").unwrap_or_default().to_string(),
            class: attrs
                .attr("class")
                .map(|c| c.split_whitespace().collect::<Vec<_>>().join(" "))
                .unwrap_or_default(),
            width: attrs.attr("width").and_then(parse_dimension),
            height: attrs.attr("height").and_then(parse_dimension),
        }
    }

    /// Declared pixel area, when both dimensions are present.
    pub fn declared_area(&self) -> Option<u64> {
        Some(u64::from(self.width?) * u64::from(self.height?))
    }
}

/// Parse `"640"` or `"640px"`; percentages and garbage yield `None`.
fn parse_dimension(raw: &str) -> Option<u32> {
    raw.trim().trim_end_matches("px").trim().parse().ok()
}

pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Content of the first `<meta>` whose `property`, `name` or `itemprop`
    /// equals `key` (case-insensitive) and whose content is non-empty.
    pub fn meta(&self, key: &str) -> Option<String> {
        self.html
            .select(&META)
            .filter(|m| {
                let v = m.value();
                ["property", "name", "itemprop"]
                    .iter()
                    .filter_map(|a| v.attr(a))
                    .any(|name| name.trim().eq_ignore_ascii_case(key))
            })
            .filter_map(|m| m.value().attr("content"))
            .map(str::trim)
            .find(|c| !c.is_empty())
            .map(str::to_string)
    }

    /// First non-empty value among several meta keys, in order.
    pub fn first_meta(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.meta(k))
    }

    /// Every `<img>` element in document order.
    pub fn images(&self) -> Vec<ImageTag> {
        self.html.select(&IMG).map(ImageTag::from_element).collect()
    }

    /// Raw `href` values of every anchor, in document order.
    pub fn hrefs(&self) -> Vec<String> {
        self.html
            .select(&ANCHOR)
            .filter_map(|a| a.value().attr("href"))
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect()
    }

    /// Text of `<title>`, whitespace-normalised.
    pub fn title(&self) -> Option<String> {
        self.html
            .select(&TITLE)
            .next()
            .map(|t| normalize_ws(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    }

    /// Text of the first `<h1>`, whitespace-normalised.
    pub fn first_heading(&self) -> Option<String> {
        self.html
            .select(&H1)
            .next()
            .map(|t| normalize_ws(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    }

    /// `href` of `<link rel="image_src">`.
    pub fn link_image_src(&self) -> Option<String> {
        self.html
            .select(&LINK_IMAGE_SRC)
            .filter_map(|l| l.value().attr("href"))
            .map(str::trim)
            .find(|h| !h.is_empty())
            .map(str::to_string)
    }
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve `raw` against `base`, keeping only `http`/`https` results.
pub fn resolve_http(base: &Url, raw: &str) -> Option<Url> {
    let resolved = base.join(raw.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

/// True when `el` sits inside page chrome (navigation, header, footer, aside).
pub(crate) fn in_page_chrome(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| matches!(a.value().name(), "nav" | "header" | "footer" | "aside"))
}
