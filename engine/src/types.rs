use chrono::{DateTime, Utc};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

/// Column order the classifier was trained on. Reordering this list silently
/// corrupts every prediction.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    // Lexical
    "url_length",
    "domain_length",
    "path_depth",
    "nb_subdomains",
    "https_in_hostname",
    "shortened_url",
    "abnormal_subdomain",
    "suspicious_tld",
    "is_ip",
    "is_http",
    "has_at",
    "has_dash",
    "has_double_slash",
    "nb_equals",
    "nb_question_mark",
    // Domain intelligence
    "unregistered_domain",
    "domain_age",
    "domain_end",
    "unavailable_dns_record",
    "page_rank",
    // Content
    "nb_redirects",
    "nb_external_redirects",
    "domain_not_in_title",
    "domain_without_copyright",
];

pub const FEATURE_COUNT: usize = 24;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalFeatures {
    pub url_length: i64,
    pub domain_length: i64,
    pub path_depth: i64,
    pub nb_subdomains: i64,
    pub https_in_hostname: i64,
    pub shortened_url: i64,
    pub abnormal_subdomain: i64,
    pub suspicious_tld: i64,
    pub is_ip: i64,
    pub is_http: i64,
    pub has_at: i64,
    pub has_dash: i64,
    pub has_double_slash: i64,
    pub nb_equals: i64,
    pub nb_question_mark: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainFeatures {
    pub unregistered_domain: i64,
    pub domain_age: i64,
    pub domain_end: i64,
    pub unavailable_dns_record: i64,
    pub page_rank: i64,
}

impl Default for DomainFeatures {
    /// Every lookup failed.
    fn default() -> Self {
        Self {
            unregistered_domain: 1,
            domain_age: 0,
            domain_end: 0,
            unavailable_dns_record: 1,
            page_rank: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFeatures {
    pub nb_redirects: i64,
    pub nb_external_redirects: i64,
    pub domain_not_in_title: i64,
    pub domain_without_copyright: i64,
}

impl ContentFeatures {
    /// Values used when the page cannot be fetched: the binary signals are
    /// set to their suspicious side, the counts to zero since no hop was seen.
    pub fn unreachable() -> Self {
        Self {
            nb_redirects: 0,
            nb_external_redirects: 0,
            domain_not_in_title: 1,
            domain_without_copyright: 1,
        }
    }
}

/// Fixed-order named feature vector handed to the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureVector {
    values: [i64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn assemble(lexical: &LexicalFeatures, domain: &DomainFeatures, content: &ContentFeatures) -> Self {
        Self {
            values: [
                lexical.url_length,
                lexical.domain_length,
                lexical.path_depth,
                lexical.nb_subdomains,
                lexical.https_in_hostname,
                lexical.shortened_url,
                lexical.abnormal_subdomain,
                lexical.suspicious_tld,
                lexical.is_ip,
                lexical.is_http,
                lexical.has_at,
                lexical.has_dash,
                lexical.has_double_slash,
                lexical.nb_equals,
                lexical.nb_question_mark,
                domain.unregistered_domain,
                domain.domain_age,
                domain.domain_end,
                domain.unavailable_dns_record,
                domain.page_rank,
                content.nb_redirects,
                content.nb_external_redirects,
                content.domain_not_in_title,
                content.domain_without_copyright,
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    pub fn values(&self) -> &[i64; FEATURE_COUNT] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> {
        FEATURE_NAMES.iter().copied()
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhoisTimestamps {
    pub creation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Landing page body plus the host of every URL that answered with a redirect.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub body: String,
    pub redirect_hosts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub url: String,
    pub phishing: bool,
    pub features: FeatureVector,
}
