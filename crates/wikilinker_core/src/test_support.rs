//! In-memory MediaWiki stand-in for unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::client::WikiApi;

#[derive(Debug, Clone, Default)]
pub struct FakeWiki {
    pub sitename: String,
    pub base: String,
    pub articlepath: String,
    pub pages: BTreeSet<String>,
    pub redirects: BTreeMap<String, (String, Option<String>)>,
    pub broken_siteinfo: bool,
    pub broken_queries: bool,
}

impl FakeWiki {
    pub fn new(sitename: &str, host: &str) -> Self {
        Self {
            sitename: sitename.to_string(),
            base: format!("https://{host}/wiki/Main_Page"),
            articlepath: "/wiki/$1".to_string(),
            ..Self::default()
        }
    }

    pub fn with_pages(mut self, pages: &[&str]) -> Self {
        self.pages
            .extend(pages.iter().map(|page| (*page).to_string()));
        self
    }

    pub fn with_redirect(mut self, from: &str, to: &str, fragment: Option<&str>) -> Self {
        self.redirects.insert(
            from.to_string(),
            (to.to_string(), fragment.map(ToString::to_string)),
        );
        self.pages.insert(to.to_string());
        self
    }

    fn siteinfo(&self) -> Result<Value> {
        if self.broken_siteinfo {
            bail!("connection refused");
        }
        Ok(json!({
            "batchcomplete": true,
            "query": {
                "general": {
                    "sitename": self.sitename,
                    "base": self.base,
                    "articlepath": self.articlepath,
                }
            }
        }))
    }

    fn titles(&self, titles: &str) -> Result<Value> {
        if self.broken_queries {
            bail!("MediaWiki API request failed with HTTP 503 Service Unavailable");
        }
        let mut normalized = Vec::new();
        let mut redirects = Vec::new();
        let mut pages = Vec::new();
        let mut seen = BTreeSet::new();
        for raw in titles.split('|') {
            let title = normalize(raw);
            if title != raw {
                normalized.push(json!({"fromencoded": false, "from": raw, "to": title}));
            }
            let target = match self.redirects.get(&title) {
                Some((to, fragment)) => {
                    let mut item = json!({"from": title, "to": to});
                    if let Some(fragment) = fragment {
                        item["tofragment"] = json!(fragment);
                    }
                    redirects.push(item);
                    to.clone()
                }
                None => title,
            };
            if !seen.insert(target.clone()) {
                continue;
            }
            if self.pages.contains(&target) {
                pages.push(json!({"pageid": seen.len(), "ns": 0, "title": target}));
            } else {
                pages.push(json!({"ns": 0, "title": target, "missing": true}));
            }
        }
        Ok(json!({
            "batchcomplete": true,
            "query": {
                "normalized": normalized,
                "redirects": redirects,
                "pages": pages,
            }
        }))
    }
}

/// MediaWiki-style capitalization of the first letter plus `_` to space.
pub fn normalize(raw: &str) -> String {
    let spaced = raw.replace('_', " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Default)]
pub struct FakeApi {
    wikis: BTreeMap<String, FakeWiki>,
    requests: Mutex<Vec<(String, String)>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wiki(mut self, endpoint: &str, wiki: FakeWiki) -> Self {
        self.wikis.insert(endpoint.to_string(), wiki);
        self
    }

    /// `(endpoint, titles)` of every title query received, in arrival order.
    pub fn title_requests(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WikiApi for FakeApi {
    async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let Some(wiki) = self.wikis.get(endpoint) else {
            bail!("failed to call MediaWiki API at {endpoint}");
        };
        let param = |name: &str| {
            params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.as_str())
        };
        if param("meta") == Some("siteinfo") {
            return wiki.siteinfo();
        }
        if let Some(titles) = param("titles") {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push((endpoint.to_string(), titles.to_string()));
            }
            return wiki.titles(titles);
        }
        bail!("unexpected request to {endpoint}")
    }
}
