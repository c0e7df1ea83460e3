//! Turning tracked pages into archive queries
//!
//! Hosts with many tracked URLs are queried with one wildcard instead of one
//! query per URL. Because a wildcard also returns captures of pages nobody
//! tracks, the builder also produces a [`MembershipFilter`] that accepts only
//! captures whose loosely-normalized index key matches a tracked page.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use crate::archive::CaptureRecord;
use crate::config::{PageFilterConfig, WorklistConfig};
use crate::db::Page;

static INDEX_PAGE_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"index(\.\w+)?$").expect("index page pattern"));

static WWW_SUBDOMAIN_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://www\d*\.").expect("www subdomain pattern"));

/// Something to ask the archive index about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryTarget {
    Url(String),
    /// Every capture under a host
    Domain(String),
}

impl QueryTarget {
    /// URL or wildcard pattern as sent to the index
    pub fn query_url(&self) -> String {
        match self {
            QueryTarget::Url(url) => url.clone(),
            QueryTarget::Domain(host) => format!("http://{}/*", host),
        }
    }

    /// Collapse `www`, `www2`, ... subdomains onto plain `http://`
    ///
    /// The index matches on SURT keys, which ignore these prefixes anyway.
    pub fn without_www(&self) -> QueryTarget {
        match self {
            QueryTarget::Url(url) => {
                QueryTarget::Url(WWW_SUBDOMAIN_EXPRESSION.replace(url, "http://").into_owned())
            }
            QueryTarget::Domain(_) => {
                let query = self.query_url();
                let collapsed = WWW_SUBDOMAIN_EXPRESSION.replace(&query, "http://");
                let host = collapsed
                    .trim_start_matches("http://")
                    .trim_end_matches("/*")
                    .to_string();
                QueryTarget::Domain(host)
            }
        }
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query_url())
    }
}

/// Collapse `www` variants and drop duplicates, keeping first-seen order
pub fn collapse_www(targets: &[QueryTarget]) -> Vec<QueryTarget> {
    let mut seen = HashSet::new();
    targets
        .iter()
        .map(QueryTarget::without_www)
        .filter(|target| seen.insert(target.clone()))
        .collect()
}

/// "Looks like a page" heuristic on MIME type and path extension
#[derive(Debug, Clone, Default)]
pub struct PageFilter {
    subresource_mime_types: HashSet<String>,
    subresource_extensions: HashSet<String>,
}

impl PageFilter {
    pub fn new(config: &PageFilterConfig) -> Self {
        Self {
            subresource_mime_types: config.subresource_mime_types.iter().cloned().collect(),
            subresource_extensions: config.subresource_extensions.iter().cloned().collect(),
        }
    }

    pub fn is_page(&self, record: &CaptureRecord) -> bool {
        let subresource_mime = record
            .mime_type
            .as_ref()
            .is_some_and(|mime| self.subresource_mime_types.contains(mime));

        !subresource_mime
            && path_extension(&record.url)
                .is_none_or(|ext| !self.subresource_extensions.contains(&ext))
    }
}

/// Decides which listed captures are worth fetching
#[derive(Debug, Clone)]
pub enum MembershipFilter {
    /// Accept anything that looks like a page
    Pages(PageFilter),
    /// Accept captures of tracked pages
    Known {
        url_keys: HashSet<String>,
        /// Hosts with pages lacking a key fall back to the page heuristic
        hosts_without_keys: HashSet<String>,
        pages: PageFilter,
    },
}

impl MembershipFilter {
    pub fn accepts(&self, record: &CaptureRecord) -> bool {
        match self {
            MembershipFilter::Pages(pages) => pages.is_page(record),
            MembershipFilter::Known {
                url_keys,
                hosts_without_keys,
                pages,
            } => {
                let keyless_host = host_of(&record.url)
                    .is_some_and(|host| hosts_without_keys.contains(&host));
                if keyless_host {
                    pages.is_page(record)
                } else {
                    url_keys.contains(&rough_url_key(&record.key))
                }
            }
        }
    }
}

/// Query targets plus the filter for their results
#[derive(Debug, Clone)]
pub struct Worklist {
    pub targets: Vec<QueryTarget>,
    pub filter: MembershipFilter,
}

#[derive(Debug, Default)]
struct HostPages {
    query_domain: bool,
    urls: Vec<String>,
}

/// Group tracked pages by host into the smallest sensible set of queries
pub fn build_worklist(pages: &[Page], config: &WorklistConfig, page_filter: PageFilter) -> Worklist {
    let mut hosts: Vec<(String, HostPages)> = Vec::new();
    let mut host_index: HashMap<String, usize> = HashMap::new();
    let mut url_keys = HashSet::new();
    let mut hosts_without_keys = HashSet::new();

    for page in pages {
        let Some(host) = host_of(&page.url) else {
            warn!(url = %page.url, "Skipping tracked page with no host");
            continue;
        };

        let index = *host_index.entry(host.clone()).or_insert_with(|| {
            hosts.push((host.clone(), HostPages::default()));
            hosts.len() - 1
        });
        let entry = &mut hosts[index].1;

        if !entry.query_domain && !entry.urls.contains(&page.url) {
            if entry.urls.len() >= config.max_urls_per_domain
                && can_query_domain(&host, &config.never_query_domains)
            {
                debug!(%host, "Querying whole domain");
                entry.query_domain = true;
                entry.urls.clear();
            } else {
                entry.urls.push(page.url.clone());
            }
        }

        if hosts_without_keys.contains(&host) {
            continue;
        }
        match &page.url_key {
            Some(key) if !key.is_empty() => {
                url_keys.insert(rough_url_key(key));
            }
            _ => {
                warn!(
                    %host,
                    "Found DB page with no url_key; *all* pages on this host will be imported"
                );
                hosts_without_keys.insert(host);
            }
        }
    }

    let targets = hosts
        .into_iter()
        .flat_map(|(host, data)| {
            if data.query_domain {
                vec![QueryTarget::Domain(host)]
            } else {
                data.urls.into_iter().map(QueryTarget::Url).collect()
            }
        })
        .collect();

    Worklist {
        targets,
        filter: MembershipFilter::Known {
            url_keys,
            hosts_without_keys,
            pages: page_filter,
        },
    }
}

/// An ultra-loose form of an index key, matching across most SURT settings
pub fn rough_url_key(url_key: &str) -> String {
    let lowered = url_key.to_lowercase();
    let without_query = lowered.split(['?', '#']).next().unwrap_or_default();
    let without_index = INDEX_PAGE_EXPRESSION.replace(without_query, "");
    without_index
        .strip_suffix('/')
        .unwrap_or(&without_index)
        .to_string()
}

fn can_query_domain(host: &str, never_query: &[String]) -> bool {
    !never_query
        .iter()
        .any(|denied| host == denied || host.ends_with(&format!(".{}", denied)))
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

fn path_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let ext = Path::new(parsed.path()).extension()?.to_str()?;
    Some(format!(".{}", ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn page(url: &str, key: Option<&str>) -> Page {
        Page {
            uuid: Uuid::nil(),
            url: url.to_string(),
            url_key: key.map(str::to_string),
        }
    }

    fn capture(url: &str, key: &str, mime: Option<&str>) -> CaptureRecord {
        CaptureRecord {
            key: key.to_string(),
            timestamp: Utc::now(),
            url: url.to_string(),
            mime_type: mime.map(str::to_string),
            status_code: Some(200),
            digest: None,
            length: None,
            raw_url: format!("https://web.archive.org/web/2020id_/{}", url),
            view_url: format!("https://web.archive.org/web/2020/{}", url),
        }
    }

    fn page_filter() -> PageFilter {
        PageFilter::new(&PageFilterConfig::default())
    }

    #[test]
    fn test_rough_url_key() {
        assert_eq!(rough_url_key("gov,epa)/Index.html?x=1#top"), "gov,epa)");
        assert_eq!(rough_url_key("gov,epa)/air/"), "gov,epa)/air");
        assert_eq!(rough_url_key("gov,epa)/air/index"), "gov,epa)/air");
        assert_eq!(rough_url_key("gov,epa)/reindexing"), "gov,epa)/reindexing");
    }

    #[test]
    fn test_is_page() {
        let filter = page_filter();
        assert!(filter.is_page(&capture("https://epa.gov/air", "k", Some("text/html"))));
        assert!(filter.is_page(&capture("https://epa.gov/air", "k", None)));
        assert!(!filter.is_page(&capture("https://epa.gov/site.css", "k", Some("text/plain"))));
        assert!(!filter.is_page(&capture("https://epa.gov/logo", "k", Some("image/png"))));
        assert!(filter.is_page(&capture("https://epa.gov/report.pdf", "k", None)));
    }

    #[test]
    fn test_many_urls_become_one_wildcard() {
        let pages: Vec<Page> = (0..31)
            .map(|n| page(&format!("https://www.epa.gov/page{}", n), Some("gov,epa)/x")))
            .collect();
        let worklist = build_worklist(&pages, &WorklistConfig::default(), page_filter());

        assert_eq!(
            worklist.targets,
            vec![QueryTarget::Domain("www.epa.gov".to_string())]
        );
    }

    #[test]
    fn test_threshold_counts_distinct_urls() {
        let pages: Vec<Page> = (0..31)
            .map(|n| page(&format!("https://www.epa.gov/page{}", n % 30), Some("k")))
            .collect();
        let worklist = build_worklist(&pages, &WorklistConfig::default(), page_filter());
        assert_eq!(worklist.targets.len(), 30);
        assert!(worklist.targets.iter().all(|t| matches!(t, QueryTarget::Url(_))));
    }

    #[test]
    fn test_denied_domains_are_never_wildcarded() {
        let pages: Vec<Page> = (0..100)
            .map(|n| page(&format!("https://www.youtube.com/watch{}", n), Some("k")))
            .collect();
        let worklist = build_worklist(&pages, &WorklistConfig::default(), page_filter());

        assert_eq!(worklist.targets.len(), 100);
        assert!(worklist.targets.iter().all(|t| matches!(t, QueryTarget::Url(_))));
    }

    #[test]
    fn test_membership_filter() {
        let pages = vec![
            page("https://www.epa.gov/air/", Some("gov,epa)/air/")),
            page("https://www.nasa.gov/", None),
        ];
        let worklist = build_worklist(&pages, &WorklistConfig::default(), page_filter());
        let filter = &worklist.filter;

        let tracked = capture("http://epa.gov/air/index.html", "gov,epa)/air/index.html", None);
        let untracked = capture("http://epa.gov/water", "gov,epa)/water", None);
        let keyless_page = capture("https://www.nasa.gov/moon", "gov,nasa)/moon", None);
        let keyless_image = capture("https://www.nasa.gov/moon.png", "gov,nasa)/moon.png", None);

        assert!(filter.accepts(&tracked));
        assert!(!filter.accepts(&untracked));
        assert!(filter.accepts(&keyless_page));
        assert!(!filter.accepts(&keyless_image));
    }

    #[test]
    fn test_collapse_www() {
        let targets = vec![
            QueryTarget::Url("https://www.epa.gov/air".to_string()),
            QueryTarget::Url("http://www2.epa.gov/air".to_string()),
            QueryTarget::Url("https://epa.gov/air".to_string()),
            QueryTarget::Domain("www.nasa.gov".to_string()),
        ];
        let collapsed = collapse_www(&targets);

        assert_eq!(
            collapsed,
            vec![
                QueryTarget::Url("http://epa.gov/air".to_string()),
                QueryTarget::Url("https://epa.gov/air".to_string()),
                QueryTarget::Domain("nasa.gov".to_string()),
            ]
        );
        assert_eq!(collapsed[2].query_url(), "http://nasa.gov/*");
    }
}
