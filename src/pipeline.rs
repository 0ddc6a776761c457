//! Run orchestration.
//!
//! A run has two phases:
//!
//! 1. **Discovery**: fetch the homepage, classify its links, fetch the
//!    candidate pages concurrently (bounded by `run.concurrency`), extract
//!    and verify them.
//! 2. **Images**: for each verified article, one at a time, harvest →
//!    select → materialize, then persist `article.json` into the article's
//!    folder whether or not an image was stored.
//!
//! All counters live in the [`PipelineRun`] passed in by the caller, so the
//! summary is complete even when the run ends in a [`PipelineError`].
//! Cancellation is cooperative: once the stop flag is set no new page fetch
//! or article is started.

use crate::config::Config;
use crate::extractors::{ContentExtractor, Document, MetadataExtractor};
use crate::http::{FetchError, Fetcher};
use crate::images::{ImageHarvester, ImageMaterializer, ImageScorer, ImageSelector};
use crate::links::LinkClassifier;
use crate::models::{ArticleCandidateLink, ArticleRecord, ImageStatus, PipelineRun, StageCount};
use crate::outputs::json::write_article;
use crate::utils::{claim_folder_name, safe_folder_name, truncate_for_log};
use crate::verifier::ArticleVerifier;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("homepage {url} is unavailable: {source}")]
    HomepageUnavailable {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("no articles discovered on {url}")]
    NoArticles { url: String },
}

/// What became of one candidate page during discovery.
enum PageOutcome {
    /// Stop flag was set before the fetch started.
    Skipped,
    FetchFailed,
    Extracted { url: Url, content: crate::extractors::ExtractedContent },
}

pub struct Pipeline {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    classifier: LinkClassifier,
    verifier: ArticleVerifier,
    harvester: ImageHarvester,
    selector: ImageSelector,
    materializer: ImageMaterializer,
    output_dir: PathBuf,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>, output_dir: PathBuf, stop: Arc<AtomicBool>) -> Self {
        let scorer = Arc::new(ImageScorer::new(config.images.clone()));
        Self {
            classifier: LinkClassifier::new(config.links.clone()),
            verifier: ArticleVerifier::new(config.verifier.clone()),
            harvester: ImageHarvester::standard(fetcher.clone(), scorer, &config.harvest),
            selector: ImageSelector::new(fetcher.clone(), config.images.clone()),
            materializer: ImageMaterializer::new(fetcher.clone(), config.materialize.jpeg_quality),
            fetcher,
            config,
            output_dir,
            stop,
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Execute a full run against `homepage`, recording everything in `run`.
    ///
    /// # Returns
    ///
    /// The verified articles with their image fields filled in.
    ///
    /// # Errors
    ///
    /// Only run-level conditions: the homepage could not be fetched, or no
    /// page on it verified as an article. `run` is finalized in every case.
    #[instrument(level = "info", skip_all, fields(%homepage))]
    pub async fn run(&self, homepage: &str, run: &mut PipelineRun) -> Result<Vec<ArticleRecord>, PipelineError> {
        let result = self.run_inner(homepage, run).await;
        run.finalize();
        result
    }

    async fn run_inner(&self, homepage: &str, run: &mut PipelineRun) -> Result<Vec<ArticleRecord>, PipelineError> {
        let homepage_url = Url::parse(homepage).map_err(|e| PipelineError::HomepageUnavailable {
            url: homepage.to_string(),
            source: FetchError::InvalidUrl(e.to_string()),
        })?;

        let articles = self.discover(&homepage_url, run).await?;
        if articles.is_empty() {
            warn!(homepage = %homepage_url, "No articles verified on homepage");
            return Err(PipelineError::NoArticles {
                url: homepage_url.to_string(),
            });
        }

        Ok(self.process_images(articles, run).await)
    }

    /// Homepage → candidate links → fetched pages → verified articles.
    #[instrument(level = "info", skip_all, fields(homepage = %homepage))]
    async fn discover(&self, homepage: &Url, run: &mut PipelineRun) -> Result<Vec<ArticleRecord>, PipelineError> {
        let resp = self
            .fetcher
            .get(homepage.as_str())
            .await
            .map_err(|source| {
                error!(error = %source, "Homepage fetch failed");
                PipelineError::HomepageUnavailable {
                    url: homepage.to_string(),
                    source,
                }
            })?;

        // Links are judged against where the homepage actually lives.
        let base = resp.base_url(homepage);
        if base != *homepage {
            info!(final_url = %base, "Homepage redirected");
        }
        let hrefs = Document::parse(&resp.text()).hrefs();
        let candidates = self
            .classifier
            .classify(&base, &hrefs, self.config.run.max_articles);
        run.links = StageCount {
            attempted: hrefs.len(),
            succeeded: candidates.len(),
        };
        info!(hrefs = hrefs.len(), candidates = candidates.len(), "Classified homepage links");

        let concurrency = self.config.run.concurrency.max(1);
        let mut pages: Vec<(usize, PageOutcome)> = stream::iter(candidates.into_iter().enumerate())
            .map(|(i, link)| async move { (i, self.fetch_page(link).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        // keep homepage order regardless of completion order
        pages.sort_by_key(|(i, _)| *i);

        let mut articles = Vec::new();
        for (_, page) in pages {
            match page {
                PageOutcome::Skipped => run.cancelled = true,
                PageOutcome::FetchFailed => run.pages.attempted += 1,
                PageOutcome::Extracted { url, content } => {
                    run.pages.attempted += 1;
                    if content.text.trim().is_empty() {
                        debug!(%url, "No extractable text");
                        continue;
                    }
                    run.pages.succeeded += 1;
                    run.verification.attempted += 1;
                    if let Ok(record) = self.verifier.verify(url.as_str(), content, MetadataExtractor.name()) {
                        info!(%url, title = %truncate_for_log(&record.title, 80), score = record.verification_score, "Verified article");
                        run.verification.succeeded += 1;
                        articles.push(record);
                    }
                }
            }
        }

        info!(
            fetched = run.pages.attempted,
            extracted = run.pages.succeeded,
            verified = run.verification.succeeded,
            "Discovery complete"
        );
        Ok(articles)
    }

    async fn fetch_page(&self, link: ArticleCandidateLink) -> PageOutcome {
        if self.stopped() {
            return PageOutcome::Skipped;
        }
        match self.fetcher.get(link.url.as_str()).await {
            Ok(resp) => {
                let content = MetadataExtractor.extract(&resp.text(), &resp.base_url(&link.url));
                PageOutcome::Extracted { url: link.url, content }
            }
            Err(e) => {
                warn!(url = %link.url, error = %e, "Candidate fetch failed");
                PageOutcome::FetchFailed
            }
        }
    }

    /// Sequential image phase; every article is persisted exactly once.
    #[instrument(level = "info", skip_all, fields(articles = articles.len()))]
    async fn process_images(&self, articles: Vec<ArticleRecord>, run: &mut PipelineRun) -> Vec<ArticleRecord> {
        let mut taken = HashSet::new();
        let mut done = Vec::with_capacity(articles.len());

        for mut article in articles {
            let folder = claim_folder_name(&safe_folder_name(&article.title), &mut taken);
            let dir = self.output_dir.join(&folder);

            let status = if self.stopped() {
                run.cancelled = true;
                article.mark_image_absent();
                ImageStatus::Skipped
            } else {
                self.attach_image(&mut article, &dir).await
            };

            let folder = match write_article(&dir, &article).await {
                Ok(_) => Some(folder),
                Err(e) => {
                    error!(url = %article.url, error = %e, "Failed to write article JSON");
                    None
                }
            };
            info!(url = %article.url, ?status, "Article finished");
            run.record_outcome(&article, status, folder);
            done.push(article);
        }
        done
    }

    /// Harvest → select → materialize for one article.
    #[instrument(level = "info", skip_all, fields(url = %article.url))]
    async fn attach_image(&self, article: &mut ArticleRecord, dir: &Path) -> ImageStatus {
        let Ok(url) = Url::parse(&article.url) else {
            article.mark_image_absent();
            return ImageStatus::NoCandidates;
        };

        let candidates = self.harvester.harvest(&url).await;
        if candidates.is_empty() {
            article.mark_image_absent();
            return ImageStatus::NoCandidates;
        }

        let Some(selected) = self.selector.select(candidates).await else {
            article.mark_image_absent();
            return ImageStatus::NoneValidated;
        };

        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create article dir");
            article.mark_image_absent();
            return ImageStatus::MaterializeFailed;
        }
        match self
            .materializer
            .materialize(&selected.candidate.url, dir, &self.config.materialize.file_name)
            .await
        {
            Ok(stored) => {
                article.attach_image(&selected, &stored);
                ImageStatus::ImageSaved
            }
            Err(e) => {
                warn!(image = %selected.candidate.url, error = %e, "Image materialization failed");
                article.mark_image_absent();
                ImageStatus::MaterializeFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::FetchResponse;
    use crate::http::testing::StaticFetcher;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    const HOME: &str = "https://news.example.com/";

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("headline_harvest_pipeline_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn homepage(paths: &[&str]) -> String {
        let links: String = paths.iter().map(|p| format!(r#"<a href="{p}">link</a>"#)).collect();
        format!("<html><body><nav>{links}</nav></body></html>")
    }

    /// A page that verifies: long body of full sentences and a descriptive title.
    fn article_page(title: &str, head_extra: &str, body_extra: &str) -> String {
        let paragraphs: String = (0..15)
            .map(|i| format!("<p>Paragraph {i} reports that the council met late into the evening again.</p>"))
            .collect();
        format!(
            "<html><head><title>{title}</title>{head_extra}</head>\
             <body><article>{paragraphs}</article>{body_extra}</body></html>"
        )
    }

    fn og_image(url: &str) -> String {
        format!(r#"<meta property="og:image" content="{url}">"#)
    }

    fn pipeline(fetcher: StaticFetcher, out: &Path, stop: Arc<AtomicBool>) -> Pipeline {
        Pipeline::new(Config::default(), Arc::new(fetcher), out.to_path_buf(), stop)
    }

    #[tokio::test]
    async fn test_three_articles_all_get_images() {
        let out = scratch_dir("happy");
        let fetcher = StaticFetcher::new()
            .html(
                HOME,
                &homepage(&[
                    "/news/2024/05/river-floods",
                    "/news/2024/05/budget-vote",
                    "/news/2024/05/science-fair",
                    "/news/category/world",
                    "/category/sports",
                ]),
            )
            .html(
                "https://news.example.com/news/2024/05/river-floods",
                &article_page(
                    "River floods the lower valley towns overnight",
                    &og_image("https://news.example.com/media/river.png"),
                    "",
                ),
            )
            .html(
                "https://news.example.com/news/2024/05/budget-vote",
                &article_page(
                    "Council approves the new city budget after debate",
                    &og_image("https://news.example.com/media/budget.png"),
                    "",
                ),
            )
            .html(
                "https://news.example.com/news/2024/05/science-fair",
                &article_page(
                    "Local school wins the regional science fair",
                    &og_image("https://news.example.com/media/fair.png"),
                    "",
                ),
            )
            .bytes("https://news.example.com/media/river.png", "image/png", png(400, 300))
            .bytes("https://news.example.com/media/budget.png", "image/png", png(640, 360))
            .bytes("https://news.example.com/media/fair.png", "image/png", png(200, 200));

        let mut run = PipelineRun::new(HOME);
        let articles = pipeline(fetcher, &out, Arc::new(AtomicBool::new(false)))
            .run(HOME, &mut run)
            .await
            .unwrap();

        assert_eq!(run.links.succeeded, 3);
        assert_eq!(run.verification.attempted, 3);
        assert_eq!(run.discovered(), 3);
        assert_eq!(run.image_completed(), 3);
        assert_eq!(run.success_rate, 100.0);
        assert!(!run.cancelled);

        assert!(articles.iter().all(|a| a.image_saved));
        let first = &articles[0];
        assert_eq!(first.title, "River floods the lower valley towns overnight");
        let info = first.image_info.as_ref().unwrap();
        assert_eq!(info.url, "https://news.example.com/media/river.png");
        assert_eq!(info.score, 80);

        let folder = out.join("River_floods_the_lower_valley_towns_overnight");
        assert!(folder.join("article.json").exists());
        let stored = image::open(folder.join("image.jpg")).unwrap();
        assert_eq!((stored.width(), stored.height()), (400, 300));
        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn test_tracking_pixel_only_article_kept_without_image() {
        let out = scratch_dir("pixel");
        let article = "https://news.example.com/news/2024/05/quiet-day";
        let fetcher = StaticFetcher::new()
            .html(HOME, &homepage(&["/news/2024/05/quiet-day"]))
            .html(
                article,
                &article_page(
                    "A quiet day at the harbour for fishermen",
                    "",
                    r#"<img src="/media/t.png"><img src="https://news.example.com/b.gif?width=1&height=1">"#,
                ),
            )
            .bytes("https://news.example.com/media/t.png", "image/png", png(1, 1));

        let mut run = PipelineRun::new(HOME);
        let articles = pipeline(fetcher, &out, Arc::new(AtomicBool::new(false)))
            .run(HOME, &mut run)
            .await
            .unwrap();

        assert_eq!(run.discovered(), 1);
        assert_eq!(run.image_completed(), 0);
        assert_eq!(run.outcomes[0].status, ImageStatus::NoneValidated);
        assert_eq!(articles.len(), 1);
        assert!(!articles[0].image_saved);

        let folder = out.join("A_quiet_day_at_the_harbour_for_fishermen");
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(folder.join("article.json")).unwrap()).unwrap();
        assert_eq!(json["image_saved"], false);
        assert!(!folder.join("image.jpg").exists());
        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn test_article_without_candidates_and_duplicate_titles() {
        let out = scratch_dir("dupes");
        let fetcher = StaticFetcher::new()
            .html(HOME, &homepage(&["/news/a-story", "/news/b-story"]))
            .html(
                "https://news.example.com/news/a-story",
                &article_page("The same headline appears twice today", "", ""),
            )
            .html(
                "https://news.example.com/news/b-story",
                &article_page("The same headline appears twice today", "", ""),
            );

        let mut run = PipelineRun::new(HOME);
        pipeline(fetcher, &out, Arc::new(AtomicBool::new(false)))
            .run(HOME, &mut run)
            .await
            .unwrap();

        let folders: Vec<Option<String>> = run.outcomes.iter().map(|o| o.folder.clone()).collect();
        assert_eq!(
            folders,
            vec![
                Some("The_same_headline_appears_twice_today".to_string()),
                Some("The_same_headline_appears_twice_today_2".to_string()),
            ]
        );
        assert!(run.outcomes.iter().all(|o| o.status == ImageStatus::NoCandidates));
        assert_eq!(run.images.attempted, 2);
        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn test_unreachable_homepage_is_fatal() {
        let out = scratch_dir("down");
        let mut run = PipelineRun::new(HOME);
        let err = pipeline(StaticFetcher::new().status(HOME, 404), &out, Arc::new(AtomicBool::new(false)))
            .run(HOME, &mut run)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::HomepageUnavailable {
                source: FetchError::Status(404),
                ..
            }
        ));
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_listing_pages_only_means_no_articles() {
        let out = scratch_dir("listing");
        let listing: String = (0..30).map(|i| format!("<p>Headline {i}</p>")).collect();
        let fetcher = StaticFetcher::new()
            .html(HOME, &homepage(&["/news/roundup", "/about", "https://elsewhere.org/news/x"]))
            .html(
                "https://news.example.com/news/roundup",
                &format!("<html><head><title>Latest news and updates</title></head><body>{listing}</body></html>"),
            );

        let mut run = PipelineRun::new(HOME);
        let err = pipeline(fetcher, &out, Arc::new(AtomicBool::new(false)))
            .run(HOME, &mut run)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoArticles { .. }));
        assert_eq!(run.links, StageCount { attempted: 3, succeeded: 1 });
        assert_eq!(run.pages, StageCount { attempted: 1, succeeded: 1 });
        assert_eq!(run.verification, StageCount { attempted: 1, succeeded: 0 });
        assert_eq!(run.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_stop_flag_skips_page_fetches() {
        let out = scratch_dir("stopped");
        let fetcher = StaticFetcher::new()
            .html(HOME, &homepage(&["/news/a-story"]))
            .html(
                "https://news.example.com/news/a-story",
                &article_page("A headline that never gets fetched today", "", ""),
            );
        let mut run = PipelineRun::new(HOME);
        let err = pipeline(fetcher, &out, Arc::new(AtomicBool::new(true)))
            .run(HOME, &mut run)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoArticles { .. }));
        assert!(run.cancelled);
        assert_eq!(run.pages.attempted, 0);
    }

    /// Raises the stop flag as soon as `trigger` has been downloaded.
    struct StopAfterDownload {
        inner: StaticFetcher,
        trigger: String,
        stop: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Fetcher for StopAfterDownload {
        async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
            let resp = self.inner.get(url).await;
            if url == self.trigger {
                self.stop.store(true, Ordering::SeqCst);
            }
            resp
        }

        async fn head(&self, url: &str) -> Result<FetchResponse, FetchError> {
            self.inner.head(url).await
        }

        async fn get_prefix(&self, url: &str, limit: usize) -> Result<FetchResponse, FetchError> {
            self.inner.get_prefix(url, limit).await
        }
    }

    #[tokio::test]
    async fn test_stop_during_image_phase_persists_remaining_articles() {
        let out = scratch_dir("stop_images");
        let river_image = "https://news.example.com/media/river.png";
        let inner = StaticFetcher::new()
            .html(
                HOME,
                &homepage(&[
                    "/news/2024/05/river-floods",
                    "/news/2024/05/budget-vote",
                    "/news/2024/05/science-fair",
                ]),
            )
            .html(
                "https://news.example.com/news/2024/05/river-floods",
                &article_page("River floods the lower valley towns overnight", &og_image(river_image), ""),
            )
            .html(
                "https://news.example.com/news/2024/05/budget-vote",
                &article_page(
                    "Council approves the new city budget after debate",
                    &og_image("https://news.example.com/media/budget.png"),
                    "",
                ),
            )
            .html(
                "https://news.example.com/news/2024/05/science-fair",
                &article_page(
                    "Local school wins the regional science fair",
                    &og_image("https://news.example.com/media/fair.png"),
                    "",
                ),
            )
            .bytes(river_image, "image/png", png(400, 300))
            .bytes("https://news.example.com/media/budget.png", "image/png", png(640, 360))
            .bytes("https://news.example.com/media/fair.png", "image/png", png(200, 200));

        let stop = Arc::new(AtomicBool::new(false));
        let fetcher = StopAfterDownload {
            inner,
            trigger: river_image.to_string(),
            stop: stop.clone(),
        };
        let mut run = PipelineRun::new(HOME);
        let articles = Pipeline::new(Config::default(), Arc::new(fetcher), out.clone(), stop)
            .run(HOME, &mut run)
            .await
            .unwrap();

        let statuses: Vec<ImageStatus> = run.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![ImageStatus::ImageSaved, ImageStatus::Skipped, ImageStatus::Skipped]
        );
        assert!(run.cancelled);
        assert_eq!(run.discovered(), 3);
        assert_eq!(run.images, StageCount { attempted: 1, succeeded: 1 });
        assert!(articles[0].image_saved);
        assert!(articles[1..].iter().all(|a| !a.image_saved));

        for title in [
            "Council_approves_the_new_city_budget_after_debate",
            "Local_school_wins_the_regional_science_fair",
        ] {
            let folder = out.join(title);
            assert!(folder.join("article.json").exists());
            assert!(!folder.join("image.jpg").exists());
        }
        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn test_redirected_homepage_links_classified_against_final_host() {
        let out = scratch_dir("redirect");
        let fetcher = StaticFetcher::new()
            .redirect("https://example.com/", "https://www.example.com/")
            .html(
                "https://www.example.com/",
                &homepage(&["/news/2024/05/river-floods", "https://www.example.com/news/2024/05/budget-vote"]),
            )
            .html(
                "https://www.example.com/news/2024/05/river-floods",
                &article_page("River floods the lower valley towns overnight", &og_image("river.png"), ""),
            )
            .html(
                "https://www.example.com/news/2024/05/budget-vote",
                &article_page("Council approves the new city budget after debate", "", ""),
            )
            .bytes("https://www.example.com/news/2024/05/river.png", "image/png", png(400, 300));

        let mut run = PipelineRun::new("https://example.com/");
        let articles = pipeline(fetcher, &out, Arc::new(AtomicBool::new(false)))
            .run("https://example.com/", &mut run)
            .await
            .unwrap();

        assert_eq!(run.links.succeeded, 2);
        assert_eq!(run.discovered(), 2);
        assert_eq!(articles[0].url, "https://www.example.com/news/2024/05/river-floods");
        assert_eq!(
            articles[0].image_info.as_ref().map(|i| i.url.as_str()),
            Some("https://www.example.com/news/2024/05/river.png")
        );
        let _ = std::fs::remove_dir_all(&out);
    }
}
