//! Full-text article resolution.
//!
//! Downloads an article page (following redirects) and extracts its headline
//! and paragraph text. The headline comes from `og:title`, then `<h1>`, then
//! `<title>`; the body from `<article> p` paragraphs, or every `<p>` when the
//! page has no `<article>` element.

use super::ArticleResolver;
use crate::error::CrawlError;
use crate::models::ResolvedArticle;
use crate::utils::{collapse_whitespace, decode_lossy};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static ARTICLE_P: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article p").expect("valid selector"));
static ANY_P: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("valid selector"));

#[derive(Debug, Clone)]
pub struct HttpArticleResolver {
    client: Client,
}

impl HttpArticleResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ArticleResolver for HttpArticleResolver {
    #[instrument(level = "debug", skip(self))]
    async fn resolve(&self, url: &str) -> Result<ResolvedArticle, CrawlError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CrawlError::unresolvable(url, e))?;
        if !response.status().is_success() {
            return Err(CrawlError::unresolvable(url, response.status()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CrawlError::unresolvable(url, e))?;

        let resolved = extract_article(&decode_lossy(&bytes));
        if resolved.body.is_empty() {
            return Err(CrawlError::unresolvable(url, "no article text"));
        }
        debug!(bytes = resolved.body.len(), "Parsed article");
        Ok(resolved)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Extract the headline and paragraph text from an article page.
pub fn extract_article(html: &str) -> ResolvedArticle {
    let document = Html::parse_document(html);

    let title = document
        .select(&OG_TITLE)
        .filter_map(|meta| meta.value().attr("content"))
        .map(collapse_whitespace)
        .find(|t| !t.is_empty())
        .or_else(|| {
            document
                .select(&H1)
                .chain(document.select(&TITLE))
                .map(element_text)
                .find(|t| !t.is_empty())
        })
        .unwrap_or_default();

    let mut paragraphs: Vec<String> = document
        .select(&ARTICLE_P)
        .map(element_text)
        .filter(|p| !p.is_empty())
        .collect();
    if paragraphs.is_empty() {
        paragraphs = document
            .select(&ANY_P)
            .map(element_text)
            .filter(|p| !p.is_empty())
            .collect();
    }

    ResolvedArticle {
        title,
        body: paragraphs.join("\n"),
    }
}
