use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result, anyhow, bail};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::Url;
use serde::Deserialize;

use crate::client::WikiApi;

/// `titles=` limit for anonymous API clients.
const MAX_TITLES_PER_QUERY: usize = 50;

/// Characters escaped when a title is placed in an article path. `/` and `:`
/// stay literal, as in MediaWiki's own links.
const TITLE_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// One MediaWiki installation, as described by its site-info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiSite {
    endpoint: String,
    site_name: String,
    base_url: Url,
    article_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPage {
    /// Normalized title of the page that was asked for (the redirect source
    /// when the page is a redirect).
    pub title: String,
    pub redirects_to: Option<String>,
    pub url: String,
}

impl WikiSite {
    /// Query `meta=siteinfo` on `endpoint` and build the site from it.
    pub async fn from_endpoint<A>(api: &A, endpoint: &str) -> Result<Self>
    where
        A: WikiApi + ?Sized,
    {
        let payload = api
            .get_json(
                endpoint,
                &[
                    ("action", "query".to_string()),
                    ("meta", "siteinfo".to_string()),
                    ("siprop", "general".to_string()),
                ],
            )
            .await?;
        let parsed: QueryResponse = serde_json::from_value(payload)
            .context("failed to decode site-info API response")?;
        let general = parsed
            .query
            .general
            .ok_or_else(|| anyhow!("site-info response from {endpoint} has no general block"))?;
        let base_url = Url::parse(&general.base)
            .with_context(|| format!("invalid base URL in site-info: {}", general.base))?;
        if !general.articlepath.contains("$1") {
            bail!(
                "article path without $1 placeholder in site-info: {}",
                general.articlepath
            );
        }

        Ok(Self {
            endpoint: endpoint.to_string(),
            site_name: general.sitename,
            base_url,
            article_path: general.articlepath,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    /// Absolute URL of the article `title` on this site.
    pub fn article_url(&self, title: &str) -> Result<String> {
        let underscored = title.replace(' ', "_");
        let encoded = utf8_percent_encode(&underscored, TITLE_PATH).to_string();
        let path = self.article_path.replace("$1", &encoded);
        let url = self
            .base_url
            .join(&path)
            .with_context(|| format!("failed to build article URL for {title}"))?;
        Ok(url.to_string())
    }

    /// Resolve `titles` in as few round trips as the API allows, following
    /// normalization but reporting redirects instead of replacing the title.
    ///
    /// The result is keyed by the titles exactly as passed in. Missing and
    /// invalid pages have no entry. Any failed request fails the whole call.
    pub async fn resolve_titles<A>(
        &self,
        api: &A,
        titles: &[String],
    ) -> Result<BTreeMap<String, ResolvedPage>>
    where
        A: WikiApi + ?Sized,
    {
        let mut results = BTreeMap::new();
        for batch in titles.chunks(MAX_TITLES_PER_QUERY) {
            let payload = api
                .get_json(
                    &self.endpoint,
                    &[
                        ("action", "query".to_string()),
                        ("titles", batch.join("|")),
                        ("redirects", "1".to_string()),
                    ],
                )
                .await?;
            let parsed: QueryResponse = serde_json::from_value(payload)
                .context("failed to decode title query API response")?;
            self.collect_pages(batch, &parsed.query, &mut results)?;
        }
        Ok(results)
    }

    fn collect_pages(
        &self,
        batch: &[String],
        query: &QueryPayload,
        results: &mut BTreeMap<String, ResolvedPage>,
    ) -> Result<()> {
        let normalized = query
            .normalized
            .iter()
            .map(|item| (item.from.as_str(), item.to.as_str()))
            .collect::<HashMap<_, _>>();
        let redirects = query
            .redirects
            .iter()
            .map(|item| (item.from.as_str(), item))
            .collect::<HashMap<_, _>>();
        let pages = query
            .pages
            .iter()
            .map(|page| (page.title.as_str(), page))
            .collect::<HashMap<_, _>>();

        for raw in batch {
            let title = normalized.get(raw.as_str()).copied().unwrap_or(raw.as_str());
            let redirect = redirects.get(title);
            if redirect.is_none() {
                match pages.get(title) {
                    Some(page) if !page.missing && !page.invalid => {}
                    _ => continue,
                }
            }

            let redirects_to = redirect.map(|item| match &item.tofragment {
                Some(fragment) if !fragment.is_empty() => format!("{}#{fragment}", item.to),
                _ => item.to.clone(),
            });
            results.insert(
                raw.clone(),
                ResolvedPage {
                    title: title.to_string(),
                    redirects_to,
                    url: self.article_url(title)?,
                },
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    general: Option<GeneralInfo>,
    #[serde(default)]
    normalized: Vec<TitleMapping>,
    #[serde(default)]
    redirects: Vec<RedirectItem>,
    #[serde(default)]
    pages: Vec<PageItem>,
}

#[derive(Debug, Deserialize)]
struct GeneralInfo {
    sitename: String,
    base: String,
    articlepath: String,
}

#[derive(Debug, Deserialize)]
struct TitleMapping {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct RedirectItem {
    from: String,
    to: String,
    tofragment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageItem {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
}
