//! Metadata-first extraction.
//!
//! Reads document-level metadata (JSON-LD, Open Graph, Twitter cards,
//! common `<meta>` names) for the title, byline, date and main image, and
//! takes the body from the first article-like container on the page.

use super::document::{Document, in_page_chrome, normalize_ws, resolve_http};
use super::{ContentExtractor, ExtractedContent};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

static JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script[type='application/ld+json']").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Article body containers, most specific first.
static CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "[itemprop='articleBody']",
        "article",
        ".article-body",
        ".story-body",
        ".entry-content",
        ".post-content",
        "main",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

const TITLE_KEYS: &[&str] = &["og:title", "twitter:title", "dc.title"];
const AUTHOR_KEYS: &[&str] = &[
    "author",
    "article:author",
    "byl",
    "parsely-author",
    "dc.creator",
    "sailthru.author",
];
const DATE_KEYS: &[&str] = &[
    "article:published_time",
    "og:article:published_time",
    "datePublished",
    "date",
    "dc.date",
    "pubdate",
    "publish_date",
    "parsely-pub-date",
];
const DESCRIPTION_KEYS: &[&str] = &["description", "og:description", "twitter:description"];
const IMAGE_KEYS: &[&str] = &["og:image", "og:image:url", "twitter:image", "twitter:image:src"];

/// Primary extractor: trusts what the page says about itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataExtractor;

impl ContentExtractor for MetadataExtractor {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn extract(&self, html: &str, url: &Url) -> ExtractedContent {
        let doc = Document::parse(html);
        let ld = JsonLd::collect(&doc);

        let title = doc
            .first_meta(TITLE_KEYS)
            .map(|t| normalize_ws(&t))
            .or_else(|| doc.title())
            .or_else(|| doc.first_heading());
        let author = doc.first_meta(AUTHOR_KEYS).or_else(|| ld.author.clone());
        let date = doc.first_meta(DATE_KEYS).or_else(|| ld.date_published.clone());
        let description = doc.first_meta(DESCRIPTION_KEYS);

        let main_image = ld
            .image
            .iter()
            .cloned()
            .chain(doc.first_meta(IMAGE_KEYS))
            .chain(doc.link_image_src())
            .find_map(|raw| resolve_http(url, &raw));

        let text = body_text(&doc);
        debug!(%url, words = text.split_whitespace().count(), has_image = main_image.is_some(), "Metadata extraction");

        ExtractedContent {
            title,
            text,
            author,
            date,
            description,
            main_image,
        }
    }
}

/// Paragraph text of the first container that has any, else of the whole page.
fn body_text(doc: &Document) -> String {
    for container in CONTAINERS.iter() {
        for root in doc.html().select(container) {
            let paragraphs = paragraphs_under(root);
            if !paragraphs.is_empty() {
                return paragraphs.join("\n");
            }
        }
    }

    doc.html()
        .select(&PARAGRAPH)
        .filter(|p| !in_page_chrome(p))
        .map(|p| normalize_ws(&p.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraphs_under(root: ElementRef<'_>) -> Vec<String> {
    root.select(&PARAGRAPH)
        .filter(|p| !in_page_chrome(p))
        .map(|p| normalize_ws(&p.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect()
}

/// The fields we read from `application/ld+json` blocks.
#[derive(Debug, Default)]
struct JsonLd {
    image: Option<String>,
    author: Option<String>,
    date_published: Option<String>,
}

impl JsonLd {
    fn collect(doc: &Document) -> Self {
        let mut out = JsonLd::default();
        for script in doc.html().select(&JSON_LD) {
            let raw = script.text().collect::<String>();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => out.visit(&value),
                Err(e) => debug!(error = %e, "Skipping unparseable JSON-LD block"),
            }
        }
        out
    }

    fn visit(&mut self, value: &Value) {
        match value {
            Value::Array(items) => items.iter().for_each(|v| self.visit(v)),
            Value::Object(map) => {
                if let Some(graph) = map.get("@graph") {
                    self.visit(graph);
                }
                if self.image.is_none() {
                    self.image = map.get("image").and_then(image_url);
                }
                if self.author.is_none() {
                    self.author = map.get("author").and_then(person_name);
                }
                if self.date_published.is_none() {
                    self.date_published = map
                        .get("datePublished")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
            }
            _ => {}
        }
    }
}

/// `image` may be a URL string, an `ImageObject`, or a list of either.
fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("contentUrl"))
            .and_then(image_url),
        Value::Array(items) => items.iter().find_map(image_url),
        _ => None,
    }
}

fn person_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map.get("name").and_then(person_name),
        Value::Array(items) => items.iter().find_map(person_name),
        _ => None,
    }
}
