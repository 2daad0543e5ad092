use crate::config::{Config, Token};
use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, LINK};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const PER_PAGE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub name: String,
    pub git_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiRepo {
    name: String,
    git_url: Option<String>,
}

/// Where the listing goes after a page.
#[derive(Debug, PartialEq, Eq)]
enum Next {
    /// `Link: <url>; rel="next"` was present.
    Url(String),
    /// A `Link` header was present without a next relation.
    Last,
    /// No `Link` header at all; fall back to counting entries.
    Unknown,
}

struct Page {
    repos: Vec<ApiRepo>,
    next: Next,
}

/// Source of every repository an account can see: owned, collaborator or
/// shared through an org.
pub trait RepositoryLister {
    fn list_repositories(&self) -> Result<Vec<RepositoryRecord>>;
}

pub struct GithubClient {
    http: Client,
    api_url: String,
    username: String,
    token: Token,
}

impl GithubClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            token: config.token.clone(),
        })
    }

    fn fetch_page(&self, url: &str) -> Result<Page> {
        debug!("GET {url}");
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(self.token.expose()))
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .with_context(|| format!("request failed: GET {url}"))?;

        let status = resp.status();
        let next = match resp.headers().get(LINK) {
            Some(link) => link
                .to_str()
                .ok()
                .and_then(parse_next_link)
                .map_or(Next::Last, Next::Url),
            None => Next::Unknown,
        };
        let body = resp
            .text()
            .with_context(|| format!("failed to read response body from {url}"))?;
        if !status.is_success() {
            bail!("GET {url} returned {status}\n{}", body.trim());
        }

        let repos = serde_json::from_str(&body)
            .with_context(|| format!("unexpected response body from {url}"))?;
        Ok(Page { repos, next })
    }
}

impl RepositoryLister for GithubClient {
    fn list_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        let base = format!("{}/user/repos", self.api_url);
        collect_pages(&base, |url| self.fetch_page(url))
    }
}

fn page_url(base: &str, page: usize) -> String {
    format!("{base}?per_page={PER_PAGE}&page={page}")
}

/// Pull `<url>` out of the `rel="next"` entry of a `Link` header.
fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| matches!(p.trim(), r#"rel="next""# | "rel=next"));
        let target = target.trim();
        if is_next && target.starts_with('<') && target.ends_with('>') {
            Some(target[1..target.len() - 1].to_string())
        } else {
            None
        }
    })
}

/// Follow `rel="next"` links from page 1. Servers that send no `Link`
/// header are walked by page number until a page comes back short.
fn collect_pages<F>(base: &str, mut fetch: F) -> Result<Vec<RepositoryRecord>>
where
    F: FnMut(&str) -> Result<Page>,
{
    let mut records = Vec::new();
    let mut page = 1;
    let mut url = page_url(base, page);
    loop {
        let Page { repos, next } = fetch(&url)?;
        let len = repos.len();
        records.extend(repos.into_iter().filter_map(|r| {
            r.git_url.map(|git_url| RepositoryRecord {
                name: r.name,
                git_url,
            })
        }));
        page += 1;
        url = match next {
            Next::Url(next_url) if next_url != url => next_url,
            Next::Url(_) | Next::Last => break,
            Next::Unknown if len >= PER_PAGE => page_url(base, page),
            Next::Unknown => break,
        };
    }
    Ok(records)
}

/// True when `git_url` is `<scheme>://<host>/<username>/<repo>`. Host and
/// owner compare exactly, so every match starts with
/// `<scheme>://<host>/<username>`.
pub fn is_owned_by(git_url: &str, host: &str, username: &str) -> bool {
    let Some((_, rest)) = git_url.split_once("://") else {
        return false;
    };
    let mut parts = rest.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(owner), Some(repo)) => !repo.is_empty() && h == host && owner == username,
        _ => false,
    }
}

/// Map repository name to clone URL for the repos `username` owns.
/// A later duplicate name replaces the earlier entry.
pub fn filter_owned(
    repos: Vec<RepositoryRecord>,
    host: &str,
    username: &str,
) -> HashMap<String, String> {
    let total = repos.len();
    let owned: HashMap<String, String> = repos
        .into_iter()
        .filter(|r| is_owned_by(&r.git_url, host, username))
        .map(|r| (r.name, r.git_url))
        .collect();
    debug!("{} of {total} repo(s) owned by {username}", owned.len());
    owned
}

/// `git://host/owner/repo` -> `https://<token>@host/owner/repo`.
pub fn authenticated_url(git_url: &str, token: &Token) -> String {
    let rest = git_url
        .split_once("://")
        .map_or(git_url, |(_, rest)| rest);
    format!("https://{}@{rest}", token.expose())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, git_url: &str) -> RepositoryRecord {
        RepositoryRecord {
            name: name.to_string(),
            git_url: git_url.to_string(),
        }
    }

    #[test]
    fn filter_keeps_only_owned_repos() {
        let repos = vec![
            record("app", "git://github.com/alice/app.git"),
            record("tool", "git://github.com/bob/tool.git"),
            record("lib", "git://github.com/alice/lib.git"),
            record("org-thing", "git://github.com/acme/org-thing.git"),
        ];
        let owned = filter_owned(repos, "github.com", "alice");

        assert_eq!(owned.len(), 2);
        assert_eq!(owned["app"], "git://github.com/alice/app.git");
        assert_eq!(owned["lib"], "git://github.com/alice/lib.git");
        assert!(!owned.contains_key("tool"));
        assert!(!owned.contains_key("org-thing"));
    }

    #[test]
    fn owner_must_match_whole_segment() {
        assert!(is_owned_by("git://github.com/alice/app", "github.com", "alice"));
        assert!(!is_owned_by("git://github.com/alicebob/app", "github.com", "alice"));
        assert!(!is_owned_by("git://github.com/alice", "github.com", "alice"));
        assert!(!is_owned_by("git://gitlab.com/alice/app", "github.com", "alice"));
        assert!(!is_owned_by("github.com/alice/app", "github.com", "alice"));
    }

    #[test]
    fn owner_and_host_match_exactly() {
        assert!(!is_owned_by("git://github.com/Alice/app", "github.com", "alice"));
        assert!(!is_owned_by("git://GitHub.com/alice/app", "github.com", "alice"));
    }

    #[test]
    fn uppercase_username_does_not_claim_lowercase_owner() {
        let owned = filter_owned(
            vec![record("app", "git://github.com/alice/app")],
            "github.com",
            "ALICE",
        );
        assert!(owned.is_empty());
    }

    #[test]
    fn kept_urls_start_with_host_and_username() {
        let repos = vec![
            record("app", "git://github.com/alice/app"),
            record("Shout", "git://github.com/ALICE/shout"),
            record("other", "git://github.com/alicebob/other"),
            record("tool", "git://github.com/bob/tool"),
        ];
        let owned = filter_owned(repos, "github.com", "alice");
        assert_eq!(owned.len(), 1);
        for url in owned.values() {
            assert!(url.starts_with("git://github.com/alice"), "{url}");
        }
    }

    #[test]
    fn duplicate_names_last_write_wins() {
        let repos = vec![
            record("app", "git://github.com/alice/app-old"),
            record("app", "git://github.com/alice/app"),
        ];
        let owned = filter_owned(repos, "github.com", "alice");
        assert_eq!(owned.len(), 1);
        assert_eq!(owned["app"], "git://github.com/alice/app");
    }

    #[test]
    fn authenticated_url_swaps_scheme_and_injects_token() {
        let token = Token::new("tok123");
        let url = authenticated_url("git://github.com/alice/app", &token);
        assert_eq!(url, "https://tok123@github.com/alice/app");
        assert_eq!(url.matches("tok123").count(), 1);
    }

    #[test]
    fn api_page_deserializes() {
        let body = r#"[
            {"id": 1, "name": "app", "git_url": "git://github.com/alice/app.git", "private": false},
            {"id": 2, "name": "ghost", "git_url": null}
        ]"#;
        let page: Vec<ApiRepo> = serde_json::from_str(body).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].name, "app");
        assert!(page[1].git_url.is_none());
    }

    fn page_of(n: usize, offset: usize) -> Vec<ApiRepo> {
        (0..n)
            .map(|i| ApiRepo {
                name: format!("r{}", offset + i),
                git_url: Some(format!("git://github.com/alice/r{}", offset + i)),
            })
            .collect()
    }

    const BASE: &str = "https://api.test/user/repos";

    /// Serves `total` repos `cap` at a time with GitHub-style `Link` headers,
    /// whatever `per_page` was asked for.
    fn capped_server(total: usize, cap: usize) -> impl FnMut(&str) -> Result<Page> {
        move |url: &str| {
            let page: usize = url
                .rsplit_once("page=")
                .and_then(|(_, n)| n.parse().ok())
                .expect("page number in url");
            let offset = (page - 1) * cap;
            let n = cap.min(total.saturating_sub(offset));
            let next = if offset + n < total {
                Next::Url(format!("{BASE}?per_page={cap}&page={}", page + 1))
            } else {
                Next::Last
            };
            Ok(Page {
                repos: page_of(n, offset),
                next,
            })
        }
    }

    #[test]
    fn pagination_follows_links_past_a_capped_page_size() {
        let records = collect_pages(BASE, capped_server(120, 50)).unwrap();
        assert_eq!(records.len(), 120);
        assert_eq!(records[0].name, "r0");
        assert_eq!(records[119].name, "r119");
    }

    #[test]
    fn pagination_stops_when_link_has_no_next() {
        let mut requested = Vec::new();
        let mut server = capped_server(PER_PAGE, PER_PAGE);
        let records = collect_pages(BASE, |url| {
            requested.push(url.to_string());
            server(url)
        })
        .unwrap();

        assert_eq!(records.len(), PER_PAGE);
        assert_eq!(requested, vec![format!("{BASE}?per_page=100&page=1")]);
    }

    #[test]
    fn pagination_without_link_stops_on_short_page() {
        let mut requested = Vec::new();
        let records = collect_pages(BASE, |url| {
            requested.push(url.to_string());
            let repos = if url.ends_with("page=1") {
                page_of(PER_PAGE, 0)
            } else if url.ends_with("page=2") {
                page_of(3, PER_PAGE)
            } else {
                panic!("fetched past the last page: {url}")
            };
            Ok(Page {
                repos,
                next: Next::Unknown,
            })
        })
        .unwrap();

        assert_eq!(requested.len(), 2);
        assert_eq!(records.len(), PER_PAGE + 3);
    }

    #[test]
    fn pagination_skips_entries_without_git_url() {
        let records = collect_pages(BASE, |_| {
            Ok(Page {
                repos: vec![
                    ApiRepo {
                        name: "a".into(),
                        git_url: Some("git://github.com/alice/a".into()),
                    },
                    ApiRepo {
                        name: "b".into(),
                        git_url: None,
                    },
                ],
                next: Next::Unknown,
            })
        })
        .unwrap();
        assert_eq!(records, vec![record("a", "git://github.com/alice/a")]);
    }

    #[test]
    fn pagination_propagates_errors() {
        let err = collect_pages(BASE, |_| bail!("401 Unauthorized")).unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn next_link_is_parsed_from_header() {
        let header = r#"<https://api.github.com/user/repos?page=3>; rel="next", <https://api.github.com/user/repos?page=9>; rel="last""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/user/repos?page=3")
        );

        let last_page = r#"<https://api.github.com/user/repos?page=1>; rel="first", <https://api.github.com/user/repos?page=8>; rel="prev""#;
        assert_eq!(parse_next_link(last_page), None);
    }
}
