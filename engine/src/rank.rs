use crate::{config::Config, error::LookupError};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

static GLOBAL_RANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"Global Rank: ([0-9]+)").unwrap());

/// One source of a domain's popularity rank.
pub trait RankProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn rank<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<i64, LookupError>>;
}

/// Open PageRank JSON API, authenticated with the `API-OPR` header.
pub struct OpenPageRank {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct OpenPageRankResponse {
    #[serde(default)]
    response: Vec<OpenPageRankEntry>,
}

#[derive(Debug, Deserialize)]
struct OpenPageRankEntry {
    status_code: u16,
    #[serde(default)]
    page_rank_integer: Option<i64>,
}

impl OpenPageRank {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    async fn fetch(&self, domain: &str) -> Result<i64, LookupError> {
        let body: OpenPageRankResponse = self
            .client
            .get(&self.endpoint)
            .query(&[("domains[]", domain)])
            .header("API-OPR", &self.api_key)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let entry = body
            .response
            .into_iter()
            .next()
            .ok_or_else(|| LookupError::NoValue(format!("empty Open PageRank answer for {domain}")))?;

        match (entry.status_code, entry.page_rank_integer) {
            (200, Some(rank)) => Ok(rank),
            (status, _) => Err(LookupError::NoValue(format!(
                "Open PageRank status {status} for {domain}"
            ))),
        }
    }
}

impl RankProvider for OpenPageRank {
    fn name(&self) -> &'static str {
        "open_page_rank"
    }

    fn rank<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<i64, LookupError>> {
        Box::pin(self.fetch(domain))
    }
}

/// Scrapes the global rank out of the checkpagerank.net result page.
pub struct RankChecker {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl RankChecker {
    pub fn new(client: Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    async fn fetch(&self, domain: &str) -> Result<i64, LookupError> {
        let page = self
            .client
            .post(&self.endpoint)
            .form(&[("name", domain)])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_global_rank(&page).ok_or_else(|| LookupError::NoValue(format!("no global rank on page for {domain}")))
    }
}

impl RankProvider for RankChecker {
    fn name(&self) -> &'static str {
        "rank_checker"
    }

    fn rank<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<i64, LookupError>> {
        Box::pin(self.fetch(domain))
    }
}

pub fn parse_global_rank(page: &str) -> Option<i64> {
    GLOBAL_RANK.captures(page)?[1].parse().ok()
}

/// Providers tried in order; the first success wins.
pub struct RankChain {
    providers: Vec<Box<dyn RankProvider>>,
}

impl RankChain {
    pub fn new(providers: Vec<Box<dyn RankProvider>>) -> Self {
        Self { providers }
    }

    /// Open PageRank when a key is configured, then the scraper.
    pub fn from_config(config: &Config, client: Client) -> Self {
        let mut providers: Vec<Box<dyn RankProvider>> = Vec::new();
        if let Some(key) = &config.page_rank_api_key {
            providers.push(Box::new(OpenPageRank::new(
                client.clone(),
                &config.page_rank_api_url,
                key,
                config.rank_timeout(),
            )));
        }
        providers.push(Box::new(RankChecker::new(
            client,
            &config.rank_checker_url,
            config.rank_timeout(),
        )));
        Self::new(providers)
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn resolve(&self, domain: &str) -> Result<i64, LookupError> {
        let mut last_error = LookupError::Skipped("no rank provider configured");

        for provider in &self.providers {
            match provider.rank(domain).await {
                Ok(rank) => {
                    debug!("Rank for {} from {}: {}", domain, provider.name(), rank);
                    return Ok(rank);
                }
                Err(e) => {
                    debug!("Rank provider {} failed for {}: {}", provider.name(), domain, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedProvider {
        result: Option<i64>,
        calls: Arc<AtomicUsize>,
    }

    impl RankProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn rank<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<i64, LookupError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self.result.ok_or_else(|| LookupError::NoValue(domain.to_string()));
            Box::pin(async move { result })
        }
    }

    fn fixed(result: Option<i64>) -> (Box<dyn RankProvider>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = FixedProvider { result, calls: calls.clone() };
        (Box::new(provider), calls)
    }

    #[tokio::test]
    async fn test_chain_first_success_wins() {
        let (first, first_calls) = fixed(None);
        let (second, _) = fixed(Some(7));
        let (third, third_calls) = fixed(Some(3));

        let chain = RankChain::new(vec![first, second, third]);
        assert_eq!(chain.resolve("example.com").await.unwrap(), 7);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_all_failures() {
        let (first, _) = fixed(None);
        let chain = RankChain::new(vec![first]);
        assert!(chain.resolve("example.com").await.is_err());
        assert!(RankChain::new(Vec::new()).resolve("example.com").await.is_err());
    }

    #[test]
    fn test_missing_key_skips_open_page_rank() {
        let mut config = Config::for_tests("http://127.0.0.1:1");
        let chain = RankChain::from_config(&config, Client::new());
        assert_eq!(chain.provider_names(), vec!["rank_checker"]);

        config.page_rank_api_key = Some("secret".to_string());
        let chain = RankChain::from_config(&config, Client::new());
        assert_eq!(chain.provider_names(), vec!["open_page_rank", "rank_checker"]);
    }

    #[test]
    fn test_parse_global_rank() {
        assert_eq!(parse_global_rank("<b>Global Rank: 1234</b>"), Some(1234));
        assert_eq!(parse_global_rank("Global Rank: n/a"), None);
    }

    #[tokio::test]
    async fn test_open_page_rank_reads_integer_rank() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1.0/getPageRank"))
            .and(query_param("domains[]", "google.com"))
            .and(header("API-OPR", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status_code": 200,
                "response": [{
                    "status_code": 200,
                    "page_rank_integer": 10,
                    "page_rank_decimal": 10.0,
                    "domain": "google.com"
                }]
            })))
            .mount(&server)
            .await;

        let provider = OpenPageRank::new(
            Client::new(),
            format!("{}/api/v1.0/getPageRank", server.uri()),
            "secret",
            Duration::from_secs(2),
        );
        assert_eq!(provider.rank("google.com").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_open_page_rank_unknown_domain_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status_code": 200,
                "response": [{ "status_code": 404, "page_rank_integer": 0, "domain": "nope.zzz" }]
            })))
            .mount(&server)
            .await;

        let provider = OpenPageRank::new(Client::new(), server.uri(), "secret", Duration::from_secs(2));
        assert!(provider.rank("nope.zzz").await.is_err());
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_rank_checker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1.0/getPageRank"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/index.php"))
            .and(body_string_contains("name=example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Global Rank: 42</p>"))
            .mount(&server)
            .await;

        let mut config = Config::for_tests(&server.uri());
        config.page_rank_api_key = Some("secret".to_string());
        let chain = RankChain::from_config(&config, Client::new());
        assert_eq!(chain.resolve("example.com").await.unwrap(), 42);
    }
}
