use std::collections::HashMap;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::client::WikiApi;
use crate::config::WikiEntry;
use crate::site::WikiSite;

/// Index of a live site inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteId(usize);

/// What a prefix refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteEntry<'a> {
    /// Never configured.
    Unregistered,
    /// Configured, but the site could not be initialized.
    Failed,
    Ready { id: SiteId, site: &'a WikiSite },
}

#[derive(Debug, Clone)]
pub struct SiteFailure {
    pub endpoint: String,
    pub prefixes: Vec<String>,
    pub error: String,
}

/// Outcome of the startup phase: the finished registry and what went wrong
/// while building it.
#[derive(Debug)]
pub struct RegistryBuild {
    pub registry: WikiRegistry,
    pub failures: Vec<SiteFailure>,
    pub duplicate_prefixes: Vec<String>,
}

/// Immutable prefix -> site mapping. Built once at startup and shared by
/// reference afterwards.
#[derive(Debug, Default)]
pub struct WikiRegistry {
    sites: Vec<WikiSite>,
    entries: HashMap<String, Option<SiteId>>,
    order: Vec<String>,
}

impl WikiRegistry {
    /// Initialize every configured wiki concurrently.
    ///
    /// A prefix claimed by an earlier entry stays with that entry. Sites that
    /// fail to initialize leave their prefixes registered as [`SiteEntry::Failed`].
    pub async fn build<A>(api: &A, wikis: &[WikiEntry]) -> RegistryBuild
    where
        A: WikiApi + ?Sized,
    {
        let mut registry = WikiRegistry::default();
        let mut duplicate_prefixes = Vec::new();
        let mut claimed_by_entry = Vec::with_capacity(wikis.len());

        for entry in wikis {
            let mut claimed = Vec::new();
            for prefix in &entry.prefixes {
                if claimed.contains(prefix) {
                    continue;
                }
                if registry.entries.contains_key(prefix) {
                    warn!(
                        prefix = %prefix,
                        endpoint = %entry.endpoint,
                        "duplicate wiki prefix; keeping the earlier registration"
                    );
                    if !duplicate_prefixes.contains(prefix) {
                        duplicate_prefixes.push(prefix.clone());
                    }
                    continue;
                }
                registry.entries.insert(prefix.clone(), None);
                registry.order.push(prefix.clone());
                claimed.push(prefix.clone());
            }
            claimed_by_entry.push(claimed);
        }

        let outcomes = join_all(
            wikis
                .iter()
                .map(|entry| WikiSite::from_endpoint(api, &entry.endpoint)),
        )
        .await;

        let mut failures = Vec::new();
        for ((entry, claimed), outcome) in wikis.iter().zip(claimed_by_entry).zip(outcomes) {
            match outcome {
                Ok(site) => {
                    info!(
                        endpoint = %entry.endpoint,
                        site = %site.site_name(),
                        prefixes = ?claimed,
                        "wiki site ready"
                    );
                    let id = SiteId(registry.sites.len());
                    registry.sites.push(site);
                    for prefix in claimed {
                        registry.entries.insert(prefix, Some(id));
                    }
                }
                Err(error) => {
                    warn!(
                        endpoint = %entry.endpoint,
                        prefixes = ?claimed,
                        error = %format!("{error:#}"),
                        "wiki site initialization failed"
                    );
                    failures.push(SiteFailure {
                        endpoint: entry.endpoint.clone(),
                        prefixes: claimed,
                        error: format!("{error:#}"),
                    });
                }
            }
        }

        RegistryBuild {
            registry,
            failures,
            duplicate_prefixes,
        }
    }

    pub fn lookup(&self, prefix: &str) -> SiteEntry<'_> {
        match self.entries.get(prefix) {
            None => SiteEntry::Unregistered,
            Some(None) => SiteEntry::Failed,
            Some(Some(id)) => SiteEntry::Ready {
                id: *id,
                site: &self.sites[id.0],
            },
        }
    }

    pub fn site(&self, id: SiteId) -> Option<&WikiSite> {
        self.sites.get(id.0)
    }

    /// Registered prefixes in configuration order.
    pub fn prefixes(&self) -> impl Iterator<Item = (&str, SiteEntry<'_>)> {
        self.order
            .iter()
            .map(|prefix| (prefix.as_str(), self.lookup(prefix)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeApi, FakeWiki};

    fn entry(prefixes: &[&str], endpoint: &str) -> WikiEntry {
        WikiEntry {
            prefixes: prefixes.iter().map(|prefix| (*prefix).to_string()).collect(),
            endpoint: endpoint.to_string(),
        }
    }

    #[tokio::test]
    async fn build_registers_live_failed_and_unknown_prefixes() {
        let mut down = FakeWiki::new("Down Wiki", "down.example.org");
        down.broken_siteinfo = true;
        let api = FakeApi::new()
            .with_wiki("https://moe.example.org/api.php", FakeWiki::new("Moe", "moe.example.org"))
            .with_wiki("https://down.example.org/api.php", down);

        let build = WikiRegistry::build(
            &api,
            &[
                entry(&["mgp", "萌百"], "https://moe.example.org/api.php"),
                entry(&["down"], "https://down.example.org/api.php"),
            ],
        )
        .await;
        let registry = build.registry;

        let SiteEntry::Ready { id, site } = registry.lookup("mgp") else {
            panic!("mgp should be live");
        };
        assert_eq!(site.site_name(), "Moe");
        assert!(matches!(registry.lookup("萌百"), SiteEntry::Ready { id: other, .. } if other == id));
        assert_eq!(registry.lookup("down"), SiteEntry::Failed);
        assert_eq!(registry.lookup("nope"), SiteEntry::Unregistered);

        assert_eq!(build.failures.len(), 1);
        assert_eq!(build.failures[0].prefixes, vec!["down".to_string()]);
        assert!(build.failures[0].error.contains("connection refused"));
        assert!(build.duplicate_prefixes.is_empty());
    }

    #[tokio::test]
    async fn duplicate_prefix_keeps_first_registration() {
        let api = FakeApi::new()
            .with_wiki("https://a.example.org/api.php", FakeWiki::new("A", "a.example.org"))
            .with_wiki("https://b.example.org/api.php", FakeWiki::new("B", "b.example.org"));

        let build = WikiRegistry::build(
            &api,
            &[
                entry(&["x", "a"], "https://a.example.org/api.php"),
                entry(&["x", "b"], "https://b.example.org/api.php"),
            ],
        )
        .await;

        assert_eq!(build.duplicate_prefixes, vec!["x".to_string()]);
        let SiteEntry::Ready { site, .. } = build.registry.lookup("x") else {
            panic!("x should be live");
        };
        assert_eq!(site.site_name(), "A");
        let order = build
            .registry
            .prefixes()
            .map(|(prefix, _)| prefix.to_string())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["x", "a", "b"]);
    }

    #[tokio::test]
    async fn repeated_prefix_within_one_entry_is_not_a_clash() {
        let api = FakeApi::new()
            .with_wiki("https://a.example.org/api.php", FakeWiki::new("A", "a.example.org"));

        let build = WikiRegistry::build(
            &api,
            &[entry(&["x", "x", "y"], "https://a.example.org/api.php")],
        )
        .await;

        assert!(build.duplicate_prefixes.is_empty());
        assert!(matches!(build.registry.lookup("x"), SiteEntry::Ready { .. }));
        let order = build
            .registry
            .prefixes()
            .map(|(prefix, _)| prefix.to_string())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn empty_configuration_builds_empty_registry() {
        let build = WikiRegistry::build(&FakeApi::new(), &[]).await;
        assert!(build.registry.is_empty());
        assert!(build.failures.is_empty());
    }
}
