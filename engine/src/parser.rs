use crate::{
    config::Config,
    error::{invalid_url, AppError},
};
use publicsuffix::{List, Psl};
use std::path::Path;
use tracing::{info, warn};
use url::{Host, Position, Url};

/// A URL split into the parts the feature extractors look at. Built once per
/// request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// The input exactly as received.
    pub url: String,
    pub scheme: String,
    /// Host without brackets, lowercased by the URL parser.
    pub hostname: String,
    /// `userinfo@host:port` as typed in the address bar.
    pub authority: String,
    pub path: String,
    pub subdomain: String,
    /// Registrable label without the public suffix (`google` in `www.google.co.uk`).
    pub domain: String,
    pub suffix: String,
    /// Label plus public suffix (`google.co.uk`).
    pub registrable_domain: String,
    pub is_ip_literal: bool,
}

impl ParsedUrl {
    /// Whether WHOIS, DNS and rank lookups make sense for this host.
    pub fn has_registrable_domain(&self) -> bool {
        !self.is_ip_literal && !self.registrable_domain.is_empty()
    }
}

pub struct UrlParser {
    psl: List,
}

impl UrlParser {
    pub fn from_list(list: &str) -> Result<Self, AppError> {
        let psl = list
            .parse::<List>()
            .map_err(|e| AppError::PublicSuffix(e.to_string()))?;
        Ok(Self { psl })
    }

    /// Reads the suffix list from `psl_path`, downloading and caching it there
    /// when the file does not exist yet.
    pub async fn load(config: &Config) -> Result<Self, AppError> {
        let path = Path::new(&config.psl_path);
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            info!("Loaded public suffix list from {}", config.psl_path);
            return Self::from_list(&content);
        }

        warn!(
            "Public suffix list not found at {}, downloading from {}",
            config.psl_path, config.psl_url
        );
        let content = reqwest::get(&config.psl_url)
            .await?
            .error_for_status()?
            .text()
            .await?;
        let parser = Self::from_list(&content)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &content).await?;
        info!("Cached public suffix list at {}", config.psl_path);

        Ok(parser)
    }

    pub fn parse(&self, raw: &str) -> Result<ParsedUrl, AppError> {
        let url = Url::parse(raw).map_err(|e| invalid_url(format!("{raw}: {e}")))?;

        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(invalid_url(format!("{raw}: scheme must be http or https")));
        }

        let host = url
            .host()
            .ok_or_else(|| invalid_url(format!("{raw}: missing host")))?;
        let authority = url[Position::BeforeUsername..Position::AfterPort].to_string();
        let path = raw_path(raw);

        let parsed = match host {
            Host::Ipv4(ip) => self.ip_literal(raw, scheme, ip.to_string(), authority, path),
            Host::Ipv6(ip) => self.ip_literal(raw, scheme, ip.to_string(), authority, path),
            Host::Domain(name) => {
                let hostname = name.trim_end_matches('.').to_string();
                let (subdomain, domain, suffix, registrable_domain) = self.split_host(&hostname);
                ParsedUrl {
                    url: raw.to_string(),
                    scheme,
                    hostname,
                    authority,
                    path,
                    subdomain,
                    domain,
                    suffix,
                    registrable_domain,
                    is_ip_literal: false,
                }
            }
        };

        Ok(parsed)
    }

    fn ip_literal(
        &self,
        raw: &str,
        scheme: String,
        hostname: String,
        authority: String,
        path: String,
    ) -> ParsedUrl {
        ParsedUrl {
            url: raw.to_string(),
            scheme,
            domain: hostname.clone(),
            registrable_domain: hostname.clone(),
            hostname,
            authority,
            path,
            subdomain: String::new(),
            suffix: String::new(),
            is_ip_literal: true,
        }
    }

    // Returns (subdomain, domain label, suffix, registrable domain). The label
    // is converted back to Unicode so IDN hosts are measured as typed.
    fn split_host(&self, host: &str) -> (String, String, String, String) {
        let suffix = self
            .psl
            .suffix(host.as_bytes())
            .and_then(|s| std::str::from_utf8(s.as_bytes()).ok())
            .unwrap_or("")
            .to_string();

        let registrable = self
            .psl
            .domain(host.as_bytes())
            .and_then(|d| std::str::from_utf8(d.as_bytes()).ok())
            .map(str::to_string);

        let Some(registrable) = registrable else {
            // The host is a bare public suffix (or single label like `localhost`)
            let subdomain = host
                .strip_suffix(suffix.as_str())
                .map(|s| s.trim_end_matches('.'))
                .unwrap_or(host)
                .to_string();
            return (subdomain, String::new(), suffix, String::new());
        };

        let label = registrable
            .strip_suffix(suffix.as_str())
            .map(|s| s.trim_end_matches('.'))
            .unwrap_or(&registrable);
        let (domain, _) = idna::domain_to_unicode(label);

        let subdomain = host
            .strip_suffix(registrable.as_str())
            .map(|s| s.trim_end_matches('.'))
            .unwrap_or("")
            .to_string();

        (subdomain, domain, suffix, registrable)
    }
}

/// Path exactly as typed: whatever follows the authority, up to the query or
/// fragment. Dot segments, whitespace and escapes are left alone.
fn raw_path(raw: &str) -> String {
    let after_scheme = raw.split_once("://").map(|(_, rest)| rest).unwrap_or(raw);
    let rest = match after_scheme.find(['/', '?', '#']) {
        Some(end) => &after_scheme[end..],
        None => return String::new(),
    };
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    rest[..end].to_string()
}

#[cfg(test)]
pub(crate) const TEST_PSL: &str = "\
// ===BEGIN ICANN DOMAINS===
com
net
org
io
ly
gl
co
uk
co.uk
tk
xyz
top
// ===END ICANN DOMAINS===
";

#[cfg(test)]
pub(crate) fn test_parser() -> UrlParser {
    UrlParser::from_list(TEST_PSL).unwrap()
}
