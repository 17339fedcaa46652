use std::collections::{BTreeMap, HashMap, HashSet};

use futures_util::future::join_all;
use tracing::{debug, error, warn};

use crate::client::WikiApi;
use crate::registry::{SiteEntry, SiteId, WikiRegistry};
use crate::site::ResolvedPage;

/// A reference resolved on one wiki.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    /// Site name of the wiki the page was found on.
    pub wiki: String,
    pub title: String,
    pub redirects_to: Option<String>,
    pub url: String,
}

/// Resolved references keyed by the reference exactly as the user typed it.
pub type Resolution = BTreeMap<String, ResolvedReference>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(ResolvedReference),
    NotFound,
    /// No prefix matched and no default wiki applies.
    NeedsPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TitleQuery {
    raw: String,
    bare: String,
    /// Whether a registered prefix was recognized, live or not.
    prefixed: bool,
    targets: Vec<SiteId>,
}

/// Resolves references against a registry. Holds no state between calls.
pub struct Resolver<'a, A: ?Sized> {
    registry: &'a WikiRegistry,
    api: &'a A,
}

impl<'a, A> Resolver<'a, A>
where
    A: WikiApi + ?Sized,
{
    pub fn new(registry: &'a WikiRegistry, api: &'a A) -> Self {
        Self { registry, api }
    }

    /// Resolve every title, issuing one batch per target site concurrently.
    ///
    /// `default_wikis` is called at most once, and only when some title
    /// carries no registered prefix. Returns `None` when no title could be
    /// routed to any wiki; otherwise the found references (unfound titles
    /// are omitted).
    pub async fn resolve<F>(&self, titles: &[String], default_wikis: F) -> Option<Resolution>
    where
        F: FnOnce() -> Vec<String>,
    {
        let queries = self.build_queries(titles, default_wikis);
        if !queries
            .iter()
            .any(|query| query.prefixed || !query.targets.is_empty())
        {
            return None;
        }

        let pages = self.fetch_pages(&queries).await;

        let mut resolution = Resolution::new();
        for query in &queries {
            let found = query.targets.iter().find_map(|id| {
                pages
                    .get(id)
                    .and_then(|site_pages| site_pages.get(&query.bare))
                    .map(|page| (*id, page))
            });
            let Some((id, page)) = found else {
                continue;
            };
            let Some(site) = self.registry.site(id) else {
                continue;
            };
            resolution.insert(
                query.raw.clone(),
                ResolvedReference {
                    wiki: site.site_name().to_string(),
                    title: page.title.clone(),
                    redirects_to: page.redirects_to.clone(),
                    url: page.url.clone(),
                },
            );
        }
        Some(resolution)
    }

    /// Resolve a single reference.
    pub async fn lookup<F>(&self, title: &str, default_wikis: F) -> LookupOutcome
    where
        F: FnOnce() -> Vec<String>,
    {
        let title = title.trim();
        match self.resolve(&[title.to_string()], default_wikis).await {
            None => LookupOutcome::NeedsPrefix,
            Some(mut resolution) => resolution
                .remove(title)
                .map(LookupOutcome::Found)
                .unwrap_or(LookupOutcome::NotFound),
        }
    }

    fn build_queries<F>(&self, titles: &[String], default_wikis: F) -> Vec<TitleQuery>
    where
        F: FnOnce() -> Vec<String>,
    {
        let mut default_wikis = Some(default_wikis);
        let mut defaults: Option<Vec<SiteId>> = None;
        let mut seen = HashSet::new();
        let mut queries = Vec::with_capacity(titles.len());

        for raw in titles {
            if !seen.insert(raw.as_str()) {
                continue;
            }
            let query = match split_prefix(self.registry, raw) {
                Some((target, bare)) => TitleQuery {
                    raw: raw.clone(),
                    bare,
                    prefixed: true,
                    targets: target.into_iter().collect(),
                },
                None => {
                    let targets = defaults.get_or_insert_with(|| {
                        default_wikis
                            .take()
                            .map(|resolve| expand_defaults(self.registry, &resolve()))
                            .unwrap_or_default()
                    });
                    TitleQuery {
                        raw: raw.clone(),
                        bare: raw.clone(),
                        prefixed: false,
                        targets: targets.clone(),
                    }
                }
            };
            queries.push(query);
        }
        queries
    }

    async fn fetch_pages(
        &self,
        queries: &[TitleQuery],
    ) -> HashMap<SiteId, BTreeMap<String, ResolvedPage>> {
        let mut batches: BTreeMap<SiteId, Vec<String>> = BTreeMap::new();
        for query in queries {
            if query.bare.trim().is_empty() {
                continue;
            }
            for id in &query.targets {
                let batch = batches.entry(*id).or_default();
                if !batch.contains(&query.bare) {
                    batch.push(query.bare.clone());
                }
            }
        }

        let outcomes = join_all(batches.into_iter().filter_map(|(id, titles)| {
            let site = self.registry.site(id)?;
            Some(async move { (id, site, site.resolve_titles(self.api, &titles).await) })
        }))
        .await;

        let mut pages = HashMap::new();
        for (id, site, outcome) in outcomes {
            match outcome {
                Ok(resolved) => {
                    pages.insert(id, resolved);
                }
                Err(error) => {
                    warn!(
                        site = %site.site_name(),
                        endpoint = %site.endpoint(),
                        error = %format!("{error:#}"),
                        "title resolution failed; skipping site for this message"
                    );
                }
            }
        }
        pages
    }
}

/// Longest registered `:`-joined prefix of `title`, with the bare title
/// after it. `Some((None, _))` means the prefix is registered but its site
/// is down.
fn split_prefix(registry: &WikiRegistry, title: &str) -> Option<(Option<SiteId>, String)> {
    let segments = title.split(':').collect::<Vec<_>>();
    for cut in (1..segments.len()).rev() {
        let prefix = segments[..cut].join(":");
        let target = match registry.lookup(&prefix) {
            SiteEntry::Unregistered => continue,
            SiteEntry::Failed => None,
            SiteEntry::Ready { id, .. } => Some(id),
        };
        return Some((target, segments[cut..].join(":")));
    }
    if segments.len() > 1 {
        debug!(title = %title, "no registered prefix in title");
    }
    None
}

fn expand_defaults(registry: &WikiRegistry, prefixes: &[String]) -> Vec<SiteId> {
    let mut targets = Vec::new();
    for prefix in prefixes {
        match registry.lookup(prefix) {
            SiteEntry::Ready { id, .. } => {
                if !targets.contains(&id) {
                    targets.push(id);
                }
            }
            SiteEntry::Failed => {}
            SiteEntry::Unregistered => {
                error!(prefix = %prefix, "default wiki prefix is not configured");
            }
        }
    }
    targets
}
