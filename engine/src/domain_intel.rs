use crate::{
    config::Config,
    error::{AppError, LookupError},
    parser::ParsedUrl,
    rank::RankChain,
    types::{DomainFeatures, WhoisTimestamps},
    whois::WhoisClient,
};
use chrono::{DateTime, Utc};
use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Checks whether a domain publishes NS records.
pub struct DnsProbe {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsProbe {
    pub fn new(timeout: Duration) -> Self {
        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf().unwrap_or_else(|e| {
            warn!("Falling back to default resolver configuration: {}", e);
            (ResolverConfig::default(), ResolverOpts::default())
        });
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            timeout,
        }
    }

    pub async fn has_ns_records(&self, domain: &str) -> Result<bool, LookupError> {
        let lookup = tokio::time::timeout(self.timeout, self.resolver.ns_lookup(domain))
            .await
            .map_err(|_| LookupError::Timeout("NS lookup"))??;
        Ok(lookup.iter().next().is_some())
    }
}

pub struct DomainIntel {
    whois: WhoisClient,
    dns: DnsProbe,
    ranks: RankChain,
}

impl DomainIntel {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self::with_parts(
            WhoisClient::new(&config.whois_server, config.whois_timeout()),
            DnsProbe::new(config.dns_timeout()),
            RankChain::from_config(config, client),
        ))
    }

    pub fn with_parts(whois: WhoisClient, dns: DnsProbe, ranks: RankChain) -> Self {
        Self { whois, dns, ranks }
    }

    /// Runs the three lookups concurrently. A failed lookup only resets its
    /// own features to their failure defaults.
    pub async fn extract(&self, parsed: &ParsedUrl) -> DomainFeatures {
        if !parsed.has_registrable_domain() {
            debug!("No registrable domain for {}, skipping lookups", parsed.hostname);
            return DomainFeatures::default();
        }

        let domain = parsed.registrable_domain.as_str();
        let (whois, dns, rank) = tokio::join!(
            self.whois.lookup(domain),
            self.dns.has_ns_records(domain),
            self.ranks.resolve(domain),
        );

        for (source, result) in [
            ("whois", whois.as_ref().err()),
            ("dns", dns.as_ref().err()),
            ("page_rank", rank.as_ref().err()),
        ] {
            if let Some(e) = result {
                record_failure(source, domain, e);
            }
        }

        domain_features(whois, dns, rank, Utc::now())
    }
}

fn record_failure(source: &'static str, domain: &str, error: &LookupError) {
    match error {
        LookupError::Timeout(_) | LookupError::Connect(_) => {
            warn!("{} lookup for {} failed: {}", source, domain, error)
        }
        _ => debug!("{} lookup for {} failed: {}", source, domain, error),
    }
    metrics::counter!("lookup_failures_total", "source" => source, "kind" => error.kind()).increment(1);
}

/// Maps lookup outcomes onto features; every failure gets its own default.
pub fn domain_features(
    whois: Result<WhoisTimestamps, LookupError>,
    dns: Result<bool, LookupError>,
    rank: Result<i64, LookupError>,
    now: DateTime<Utc>,
) -> DomainFeatures {
    let mut features = DomainFeatures::default();

    if let Ok(timestamps) = whois {
        features.unregistered_domain = 0;
        features.domain_age = days_between(timestamps.creation_date, now);
        features.domain_end = days_between(timestamps.expiration_date, now);
    }

    if let Ok(true) = dns {
        features.unavailable_dns_record = 0;
    }

    if let Ok(page_rank) = rank {
        features.page_rank = page_rank;
    }

    features
}

fn days_between(date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    date.map(|d| (now - d).num_days().abs()).unwrap_or(0)
}
