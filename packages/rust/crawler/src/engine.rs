//! Breadth-first crawler engine.
//!
//! The crawler starts from a seed URL, traverses same-domain links up to a
//! depth bound, and reduces every fetched page to prose text. Fetch failures
//! are logged and skipped; only a seed that yields nothing fails the crawl.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use scraper::{Html, Selector};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};
use url::Url;

use deskbot_shared::{CrawlConfig, DeskbotError, Document, Result};

// ---------------------------------------------------------------------------
// CrawlOutcome
// ---------------------------------------------------------------------------

/// Summary of a completed crawl.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Documents fetched and reduced to prose, in BFS order.
    pub documents: Vec<Document>,
    /// Number of URLs skipped (already visited, out of scope, blocked).
    pub pages_skipped: usize,
    /// Fetch errors encountered (URL, error message).
    pub errors: Vec<(String, String)>,
    /// Total duration of the crawl.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Concurrent BFS crawler with same-domain scoping.
pub struct Crawler {
    config: CrawlConfig,
    client: Client,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl Crawler {
    /// Create a new crawler with the given configuration.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DeskbotError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            allow_localhost: false,
        })
    }

    /// Allow crawling localhost/private IPs (for integration tests).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Crawl starting from `seed`, returning the fetched documents.
    ///
    /// A fresh visited set is built per call — crawls are not restartable
    /// mid-run; cross-run idempotence comes from the index upsert.
    #[instrument(skip_all, fields(seed = %seed))]
    pub async fn crawl(&self, seed: &Url) -> Result<CrawlOutcome> {
        let start_time = std::time::Instant::now();

        let scope = CrawlScope::new(seed, &self.config);
        let visited = Arc::new(Mutex::new(HashSet::<String>::new()));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency as usize));

        let mut queue: Vec<(Url, u32)> = vec![(seed.clone(), 0)];
        let mut documents: Vec<Document> = Vec::new();
        let mut errors: Vec<(String, String)> = Vec::new();
        let mut pages_skipped: usize = 0;

        info!(
            max_depth = self.config.max_depth,
            concurrency = self.config.concurrency,
            timeout_secs = self.config.timeout_secs,
            "starting crawl"
        );

        while !queue.is_empty() {
            // Take a batch from the frontier (up to the concurrency limit)
            let batch: Vec<(Url, u32)> = {
                let drain_count = queue.len().min(self.config.concurrency as usize);
                queue.drain(..drain_count).collect()
            };

            let mut handles = Vec::new();

            for (page_url, depth) in batch {
                let normalized = normalize_url(&page_url);

                {
                    let mut vis = visited.lock().await;
                    if vis.contains(&normalized) {
                        pages_skipped += 1;
                        continue;
                    }
                    vis.insert(normalized.clone());
                }

                if !scope.in_scope(&page_url) {
                    debug!(url = %page_url, "out of scope, skipping");
                    pages_skipped += 1;
                    continue;
                }

                if !self.allow_localhost && is_ssrf_target(&page_url) {
                    warn!(url = %page_url, "SSRF protection: blocked");
                    pages_skipped += 1;
                    continue;
                }

                let client = self.client.clone();
                let sem = semaphore.clone();
                let rate_limit = self.config.rate_limit_ms;

                handles.push(tokio::spawn(async move {
                    let _permit = sem.acquire().await.expect("semaphore closed");

                    if rate_limit > 0 {
                        tokio::time::sleep(Duration::from_millis(rate_limit)).await;
                    }

                    let result = fetch_page(&client, &page_url).await;
                    (page_url, depth, result)
                }));
            }

            for handle in handles {
                let (page_url, depth, result) = handle
                    .await
                    .map_err(|e| DeskbotError::Network(format!("crawl task panicked: {e}")))?;

                match result {
                    Ok(fetched) => {
                        // Enqueue child links while within the depth bound
                        if depth < self.config.max_depth {
                            for link in &fetched.links {
                                if let Ok(link_url) = Url::parse(link) {
                                    queue.push((link_url, depth + 1));
                                }
                            }
                        }

                        documents.push(fetched.document);
                    }
                    Err(e) => {
                        warn!(url = %page_url, error = %e, "fetch failed, skipping URL");
                        errors.push((page_url.to_string(), e.to_string()));
                        pages_skipped += 1;
                    }
                }
            }
        }

        if documents.is_empty() {
            let detail = errors
                .first()
                .map(|(url, e)| format!("{url}: {e}"))
                .unwrap_or_else(|| "no pages in scope".into());
            return Err(DeskbotError::Network(format!(
                "crawl of {seed} produced no documents ({detail})"
            )));
        }

        let outcome = CrawlOutcome {
            documents,
            pages_skipped,
            errors,
            duration: start_time.elapsed(),
        };

        info!(
            documents = outcome.documents.len(),
            pages_skipped = outcome.pages_skipped,
            errors = outcome.errors.len(),
            duration_ms = outcome.duration.as_millis(),
            "crawl completed"
        );

        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// Determines which URLs are in scope: same host as the seed, optionally
/// restricted to the configured base URL's path prefix.
struct CrawlScope {
    base_host: String,
    base_path: String,
}

impl CrawlScope {
    fn new(seed: &Url, config: &CrawlConfig) -> Self {
        // The configured base URL narrows the scope below the seed's host
        // (e.g. keeping a crawl inside the help-center subtree). Fall back
        // to the seed itself when it points elsewhere.
        let base = Url::parse(&config.base_url)
            .ok()
            .filter(|b| b.host_str() == seed.host_str());

        let base_path = base.map(|b| b.path().to_string()).unwrap_or_default();

        Self {
            base_host: seed.host_str().unwrap_or("").to_string(),
            base_path,
        }
    }

    fn in_scope(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        // No cross-domain expansion.
        if url.host_str().unwrap_or("") != self.base_host {
            return false;
        }

        self.base_path.is_empty() || self.base_path == "/" || url.path().starts_with(&self.base_path)
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost"
            || host == "127.0.0.1"
            || host == "[::1]"
            || host.ends_with(".local")
            || host.ends_with(".internal")
        {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// A fetched page: its prose document plus outbound links.
struct FetchedPage {
    document: Document,
    links: Vec<String>,
}

/// Fetch a single page, extract its prose text and outbound links.
async fn fetch_page(client: &Client, url: &Url) -> Result<FetchedPage> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| DeskbotError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DeskbotError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| DeskbotError::Network(format!("{url}: body read failed: {e}")))?;

    // Parsing happens strictly after the awaits: scraper's DOM is !Send and
    // must not be held across a suspension point inside a spawned task.
    Ok(reduce_page(url, &body))
}

/// Reduce a fetched body to a prose document and its resolved links.
fn reduce_page(url: &Url, body: &str) -> FetchedPage {
    let doc = Html::parse_document(body);
    let links = extract_links(&doc, url);
    let raw_text = deskbot_text::extract_text(body);

    FetchedPage {
        document: Document {
            url: url.to_string(),
            raw_text,
            fetched_at: Utc::now(),
        },
        links,
    }
}

/// Extract all links from a document, resolved against the base URL.
fn extract_links(doc: &Html, base_url: &Url) -> Vec<String> {
    let link_sel = Selector::parse("a[href]").expect("static selector");
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            // Skip anchors, javascript:, mailto:
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                continue;
            }

            if let Ok(mut resolved) = base_url.join(href) {
                resolved.set_fragment(None);
                links.push(resolved.to_string());
            }
        }
    }

    links
}

/// Normalize a URL for deduplication (strip fragment, trailing-slash noise).
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    // Remove trailing slash for consistency (except root path)
    if s.ends_with('/') && s.matches('/').count() > 3 {
        s.pop();
    }
    s
}

#[cfg(test)]
mod crawler_tests {
    use super::*;
    use deskbot_shared::CrawlConfig;

    fn test_config(server_uri: &str, max_depth: u32) -> CrawlConfig {
        CrawlConfig {
            seed: server_uri.to_string(),
            base_url: server_uri.to_string(),
            user_agent: "deskbot-test".into(),
            max_depth,
            timeout_secs: 5,
            concurrency: 2,
            rate_limit_ms: 0,
        }
    }

    #[test]
    fn normalize_strips_fragment_and_trailing_slash() {
        let url = Url::parse("https://ajuda.example.com/pt-BR/articles/criar-conta/#topo").unwrap();
        let normalized = normalize_url(&url);
        assert!(!normalized.contains('#'));
        assert_eq!(
            normalized,
            "https://ajuda.example.com/pt-BR/articles/criar-conta"
        );
    }

    #[test]
    fn extract_links_resolves_and_filters() {
        let html = r##"<html><body>
            <a href="/articles/2">Article 2</a>
            <a href="https://external.com">External</a>
            <a href="#section">Anchor</a>
            <a href="mailto:suporte@example.com">Mail</a>
            <a href="relative/path">Relative</a>
        </body></html>"##;

        let doc = Html::parse_document(html);
        let base = Url::parse("https://ajuda.example.com/articles/1").unwrap();
        let links = extract_links(&doc, &base);

        assert!(links.contains(&"https://ajuda.example.com/articles/2".to_string()));
        assert!(links.contains(&"https://external.com/".to_string()));
        assert!(links.contains(&"https://ajuda.example.com/articles/relative/path".to_string()));
        assert!(!links.iter().any(|l| l.contains('#')));
        assert!(!links.iter().any(|l| l.starts_with("mailto:")));
    }

    #[test]
    fn scope_rejects_other_hosts() {
        let seed = Url::parse("https://ajuda.example.com/pt-BR/").unwrap();
        let mut config = test_config("https://ajuda.example.com", 3);
        config.base_url = "https://ajuda.example.com".into();
        let scope = CrawlScope::new(&seed, &config);

        assert!(scope.in_scope(&Url::parse("https://ajuda.example.com/pt-BR/articles/1").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://www.example.com/pt-BR/").unwrap()));
        assert!(!scope.in_scope(&Url::parse("ftp://ajuda.example.com/x").unwrap()));
    }

    #[test]
    fn scope_honors_base_path_prefix() {
        let seed = Url::parse("https://ajuda.example.com/pt-BR/").unwrap();
        let mut config = test_config("https://ajuda.example.com", 3);
        config.base_url = "https://ajuda.example.com/pt-BR/".into();
        let scope = CrawlScope::new(&seed, &config);

        assert!(scope.in_scope(&Url::parse("https://ajuda.example.com/pt-BR/articles/1").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://ajuda.example.com/en/articles/1").unwrap()));
    }

    #[test]
    fn ssrf_blocks_private_targets() {
        assert!(is_ssrf_target(&Url::parse("file:///etc/passwd").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://192.168.1.1/admin").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://10.0.0.1/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://localhost:3000/api").unwrap()));
        assert!(!is_ssrf_target(&Url::parse("https://ajuda.example.com/page").unwrap()));
    }

    #[tokio::test]
    async fn crawl_follows_links_and_extracts_prose() {
        let server = wiremock::MockServer::start().await;

        let page1 = r#"<html><body><main>
            <h1>Central de Ajuda</h1>
            <p>Bem-vindo à central.</p>
            <a href="/articles/conta">Criar conta</a>
        </main></body></html>"#;

        let page2 = r#"<html><body><main>
            <h1>Criar conta</h1>
            <p>Baixe o aplicativo e toque em Criar conta.</p>
        </main></body></html>"#;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page1))
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/articles/conta"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page2))
            .mount(&server)
            .await;

        let crawler = Crawler::new(test_config(&server.uri(), 2))
            .unwrap()
            .allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let outcome = crawler.crawl(&seed).await.unwrap();

        assert_eq!(outcome.documents.len(), 2);
        assert!(outcome.errors.is_empty());
        assert!(outcome.documents[0].raw_text.contains("Bem-vindo à central."));
        assert!(outcome.documents[1].raw_text.contains("Baixe o aplicativo"));
    }

    #[tokio::test]
    async fn crawl_terminates_on_self_referential_links() {
        let server = wiremock::MockServer::start().await;

        // Root links to itself and to /loop, which links back to root.
        let root = r#"<html><body><main>
            <p>Cycle root.</p>
            <a href="/">Self</a>
            <a href="/loop">Loop</a>
        </main></body></html>"#;

        let looper = r#"<html><body><main>
            <p>Loop page.</p>
            <a href="/">Back</a>
            <a href="/#frag">Back with fragment</a>
        </main></body></html>"#;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(root))
            .expect(1)
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/loop"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(looper))
            .expect(1)
            .mount(&server)
            .await;

        let crawler = Crawler::new(test_config(&server.uri(), 5))
            .unwrap()
            .allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let outcome = crawler.crawl(&seed).await.unwrap();

        // Each normalized URL fetched at most once (wiremock asserts expect(1)).
        assert_eq!(outcome.documents.len(), 2);
    }

    #[tokio::test]
    async fn crawl_respects_depth_bound() {
        let server = wiremock::MockServer::start().await;

        let page = |body: &str| format!("<html><body><main>{body}</main></body></html>");

        wiremock::Mock::given(wiremock::matchers::path("/"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(page(r#"<p>Root</p><a href="/d1">next</a>"#)),
            )
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::path("/d1"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(page(r#"<p>Depth one</p><a href="/d2">next</a>"#)),
            )
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::path("/d2"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(page("<p>Depth two</p>")),
            )
            .mount(&server)
            .await;

        let crawler = Crawler::new(test_config(&server.uri(), 1))
            .unwrap()
            .allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let outcome = crawler.crawl(&seed).await.unwrap();

        // Root (depth 0) and /d1 (depth 1) fetched; /d2 is past the bound.
        assert_eq!(outcome.documents.len(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_skips_url_but_crawl_continues() {
        let server = wiremock::MockServer::start().await;

        let root = r#"<html><body><main>
            <p>Root page.</p>
            <a href="/missing">Broken</a>
            <a href="/ok">Works</a>
        </main></body></html>"#;

        wiremock::Mock::given(wiremock::matchers::path("/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(root))
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::path("/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::path("/ok"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("<html><body><main><p>Fine.</p></main></body></html>"),
            )
            .mount(&server)
            .await;

        let crawler = Crawler::new(test_config(&server.uri(), 2))
            .unwrap()
            .allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let outcome = crawler.crawl(&seed).await.unwrap();

        assert_eq!(outcome.documents.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].0.contains("/missing"));
    }

    #[tokio::test]
    async fn unreachable_seed_fails_the_crawl() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let crawler = Crawler::new(test_config(&server.uri(), 2))
            .unwrap()
            .allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let err = crawler.crawl(&seed).await.unwrap_err();

        assert!(err.to_string().contains("no documents"));
    }
}
