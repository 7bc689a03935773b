//! Page-content features: the redirect chain taken to reach the page, and
//! whether the registrable domain shows up in the title and copyright notice.

use crate::{
    config::Config,
    error::{AppError, LookupError},
    parser::ParsedUrl,
    types::{ContentFeatures, FetchResult},
};
use once_cell::sync::Lazy;
use reqwest::{header::LOCATION, redirect::Policy, Client, ClientBuilder, Response};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

const COPYRIGHT_GLYPHS: [char; 3] = ['©', '™', '®'];
const COPYRIGHT_WINDOW: usize = 50;

pub struct ContentInspector {
    client: Client,
    max_redirects: usize,
    max_body_bytes: usize,
}

impl ContentInspector {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = Self::client_builder(config).build()?;
        Ok(Self::with_client(client, config))
    }

    /// Certificates are not verified and redirects are never followed by the
    /// client itself.
    pub fn client_builder(config: &Config) -> ClientBuilder {
        Client::builder()
            .redirect(Policy::none())
            .danger_accept_invalid_certs(true)
            .connect_timeout(config.fetch_connect_timeout())
            .read_timeout(config.fetch_read_timeout())
            .user_agent(&config.user_agent)
    }

    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub async fn extract(&self, parsed: &ParsedUrl) -> ContentFeatures {
        match self.fetch(&parsed.url).await {
            Ok(page) => {
                debug!(
                    "Fetched {} ({} redirects, {} body bytes)",
                    parsed.url,
                    page.redirect_hosts.len(),
                    page.body.len()
                );
                content_features(parsed, &page)
            }
            Err(e) => {
                warn!("Content fetch failed for {}: {}", parsed.url, e);
                metrics::counter!("lookup_failures_total", "source" => "content", "kind" => e.kind()).increment(1);
                ContentFeatures::unreachable()
            }
        }
    }

    /// GET with redirects followed by hand so every hop is recorded. A hop is
    /// the URL that answered with the redirect. The body is cut at
    /// `max_body_bytes`.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, LookupError> {
        let mut current = Url::parse(url).map_err(|e| LookupError::NoValue(format!("{url}: {e}")))?;
        let mut redirect_hosts = Vec::new();

        loop {
            let response = self.client.get(current.clone()).send().await?;

            if response.status().is_redirection() {
                if let Some(next) = redirect_target(&current, &response) {
                    if redirect_hosts.len() >= self.max_redirects {
                        return Err(LookupError::TooManyRedirects(self.max_redirects));
                    }
                    redirect_hosts.push(current.host_str().unwrap_or_default().to_ascii_lowercase());
                    current = next;
                    continue;
                }
            }

            let body = self.read_body(response).await?;
            return Ok(FetchResult { body, redirect_hosts });
        }
    }

    async fn read_body(&self, mut response: Response) -> Result<String, LookupError> {
        let mut body = Vec::new();

        while let Some(chunk) = response.chunk().await? {
            let room = self.max_body_bytes - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                debug!("Body of {} truncated at {} bytes", response.url(), self.max_body_bytes);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn redirect_target(current: &Url, response: &Response) -> Option<Url> {
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    current.join(location).ok()
}

pub fn content_features(parsed: &ParsedUrl, page: &FetchResult) -> ContentFeatures {
    let domain = parsed.registrable_domain.to_ascii_lowercase();

    ContentFeatures {
        nb_redirects: page.redirect_hosts.len() as i64,
        nb_external_redirects: page
            .redirect_hosts
            .iter()
            .filter(|host| !host.ends_with(domain.as_str()))
            .count() as i64,
        domain_not_in_title: domain_not_in_title(&page.body, &domain),
        domain_without_copyright: domain_without_copyright(&page.body, &domain),
    }
}

pub fn extract_title(body: &str) -> Option<String> {
    let document = Html::parse_document(body);
    document
        .select(&TITLE)
        .next()
        .map(|title| title.text().collect::<String>())
}

pub fn domain_not_in_title(body: &str, domain: &str) -> i64 {
    match extract_title(body) {
        Some(title) if !domain.is_empty() && title.to_lowercase().contains(domain) => 0,
        _ => 1,
    }
}

/// Looks only at the 50 characters either side of the first copyright glyph.
/// Pages without any glyph score 0.
pub fn domain_without_copyright(body: &str, domain: &str) -> i64 {
    let Some(glyph_at) = body.chars().position(|c| COPYRIGHT_GLYPHS.contains(&c)) else {
        return 0;
    };

    let start = glyph_at.saturating_sub(COPYRIGHT_WINDOW);
    let window: String = body
        .chars()
        .skip(start)
        .take(glyph_at + COPYRIGHT_WINDOW - start)
        .collect::<String>()
        .to_lowercase();

    i64::from(domain.is_empty() || !window.contains(domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_parser;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(body: &str, hosts: &[&str]) -> FetchResult {
        FetchResult {
            body: body.to_string(),
            redirect_hosts: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }

    fn redirect_to(location: &str) -> ResponseTemplate {
        ResponseTemplate::new(302).insert_header("Location", location)
    }

    #[test]
    fn test_title_contains_domain() {
        let parsed = test_parser().parse("https://www.example.com/").unwrap();
        let features = content_features(
            &parsed,
            &page("<html><head><title>Welcome to Example.com</title></head></html>", &[]),
        );
        assert_eq!(features.domain_not_in_title, 0);
        assert_eq!(features.domain_without_copyright, 0);
        assert_eq!(features.nb_redirects, 0);
    }

    #[test]
    fn test_missing_title_counts_as_absent() {
        assert_eq!(domain_not_in_title("<html><body>hi</body></html>", "example.com"), 1);
        assert_eq!(domain_not_in_title("<title>Sign in</title>", "example.com"), 1);
    }

    #[test]
    fn test_copyright_window() {
        let near = "<footer>© 2024 example.com. All rights reserved</footer>";
        assert_eq!(domain_without_copyright(near, "example.com"), 0);

        let far = format!("<footer>© 2024 Example Corp{}example.com</footer>", " ".repeat(80));
        assert_eq!(domain_without_copyright(&far, "example.com"), 1);

        let before = format!("{}example.com ®", "x".repeat(200));
        assert_eq!(domain_without_copyright(&before, "example.com"), 0);
    }

    #[test]
    fn test_copyright_absent_glyph_scores_zero() {
        assert_eq!(domain_without_copyright("<p>no notice here</p>", "example.com"), 0);
    }

    #[test]
    fn test_external_redirects_are_subset() {
        let parsed = test_parser().parse("http://example.com/").unwrap();
        let features = content_features(
            &parsed,
            &page("", &["example.com", "login.example.com", "tracker.net"]),
        );
        assert_eq!(features.nb_redirects, 3);
        assert_eq!(features.nb_external_redirects, 1);
        assert!(features.nb_external_redirects <= features.nb_redirects);
    }

    #[tokio::test]
    async fn test_fetch_records_each_redirect_hop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(redirect_to("/middle"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/middle"))
            .respond_with(redirect_to("/landing"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>Landing</title>"))
            .mount(&server)
            .await;

        let inspector = ContentInspector::new(&Config::for_tests(&server.uri())).unwrap();
        let page = inspector.fetch(&format!("{}/start", server.uri())).await.unwrap();

        assert_eq!(page.redirect_hosts, vec!["127.0.0.1", "127.0.0.1"]);
        assert_eq!(extract_title(&page.body).as_deref(), Some("Landing"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_truncated() {
        let server = MockServer::start().await;
        let head = "<html><head><title>Huge</title></head><body>";
        let body = format!("{head}{}", "a".repeat(4 * 1024 * 1024));
        Mock::given(method("GET"))
            .and(path("/huge"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let mut config = Config::for_tests(&server.uri());
        config.max_body_bytes = 64 * 1024;
        let inspector = ContentInspector::new(&config).unwrap();

        let page = inspector.fetch(&format!("{}/huge", server.uri())).await.unwrap();
        assert_eq!(page.body.len(), 64 * 1024);
        assert!(page.body.starts_with(head));
        assert_eq!(extract_title(&page.body).as_deref(), Some("Huge"));
    }

    #[tokio::test]
    async fn test_redirect_loop_exceeds_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(redirect_to("/loop"))
            .mount(&server)
            .await;

        let mut config = Config::for_tests(&server.uri());
        config.max_redirects = 3;
        let inspector = ContentInspector::new(&config).unwrap();

        let err = inspector.fetch(&format!("{}/loop", server.uri())).await.unwrap_err();
        assert!(matches!(err, LookupError::TooManyRedirects(3)));
    }

    #[tokio::test]
    async fn test_unreachable_page_uses_defaults() {
        let config = Config::for_tests("http://127.0.0.1:1");
        let inspector = ContentInspector::new(&config).unwrap();
        let parsed = test_parser().parse("http://127.0.0.1:1/").unwrap();

        assert_eq!(inspector.extract(&parsed).await, ContentFeatures::unreachable());
    }
}
