use crate::{error::LookupError, types::WhoisTimestamps};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::debug;

const WHOIS_PORT: u16 = 43;
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

static FIELD_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*([A-Za-z][A-Za-z0-9 ._/-]*?)[ \t]*:[ \t]*(\S.*?)[ \t]*\r?$").unwrap());

static REFER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*(?:refer|whois):[ \t]*(\S+)").unwrap());

static REGISTRAR_SERVER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*Registrar WHOIS Server:[ \t]*(\S+)").unwrap());

const CREATION_KEYS: &[&str] = &[
    "creation date",
    "created",
    "created on",
    "created date",
    "registered",
    "registered on",
    "registration date",
    "registration time",
    "domain registration date",
    "domain create date",
    "domain name commencement date",
    "record created",
];

const EXPIRATION_KEYS: &[&str] = &[
    "registry expiry date",
    "expiration date",
    "expiry date",
    "registrar registration expiration date",
    "expires",
    "expires on",
    "expire date",
    "expiration time",
    "expiry",
    "paid-till",
    "domain expiration date",
    "record expires",
    "renewal date",
];

const NO_RECORD_MARKERS: &[&str] = &[
    "no match for",
    "no match!!",
    "not found",
    "no entries found",
    "no data found",
    "no object found",
    "status: free",
    "status: available",
    "is available for registration",
];

/// Minimal port-43 WHOIS client. Asks the bootstrap server (IANA) which
/// registry is authoritative, queries it, and follows one registrar referral.
pub struct WhoisClient {
    bootstrap: String,
    timeout: Duration,
}

impl WhoisClient {
    pub fn new(bootstrap: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bootstrap: bootstrap.into(),
            timeout,
        }
    }

    pub async fn lookup(&self, domain: &str) -> Result<WhoisTimestamps, LookupError> {
        let bootstrap = self.query(&self.bootstrap, domain).await?;

        let record = match refer_server(&bootstrap) {
            Some(server) => {
                let registry = self.query(&with_port(&server), domain).await?;
                self.append_registrar_record(domain, &server, registry).await
            }
            // Bootstrap server answered with the record itself
            None if parse_timestamps(&bootstrap) != WhoisTimestamps::default() => bootstrap,
            None => return Err(LookupError::NoWhoisServer(domain.to_string())),
        };

        if record.trim().is_empty() {
            return Err(LookupError::NoValue(format!("empty WHOIS answer for {domain}")));
        }

        let timestamps = parse_timestamps(&record);
        if timestamps == WhoisTimestamps::default() && is_unregistered(&record.to_ascii_lowercase()) {
            return Err(LookupError::NotRegistered(domain.to_string()));
        }

        debug!(
            "WHOIS for {}: created {:?}, expires {:?}",
            domain, timestamps.creation_date, timestamps.expiration_date
        );
        Ok(timestamps)
    }

    // Thin registries (.com, .net) only point at the registrar; the registry
    // answer stays first so its dates win.
    async fn append_registrar_record(&self, domain: &str, registry_server: &str, registry: String) -> String {
        let Some(registrar) = registrar_server(&registry) else {
            return registry;
        };
        if registrar.eq_ignore_ascii_case(registry_server) {
            return registry;
        }

        match self.query(&with_port(&registrar), domain).await {
            Ok(detail) => format!("{registry}\n{detail}"),
            Err(e) => {
                debug!("Registrar WHOIS {} failed for {}: {}", registrar, domain, e);
                registry
            }
        }
    }

    async fn query(&self, server: &str, domain: &str) -> Result<String, LookupError> {
        let exchange = async {
            let mut stream = TcpStream::connect(server).await?;
            stream.write_all(format!("{domain}\r\n").as_bytes()).await?;

            let mut response = Vec::new();
            (&mut stream)
                .take(MAX_RESPONSE_BYTES)
                .read_to_end(&mut response)
                .await?;
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&response).into_owned())
        };

        timeout(self.timeout, exchange)
            .await
            .map_err(|_| LookupError::Timeout("WHOIS query"))?
            .map_err(LookupError::from)
    }
}

fn with_port(server: &str) -> String {
    if server.contains(':') {
        server.to_string()
    } else {
        format!("{server}:{WHOIS_PORT}")
    }
}

fn refer_server(response: &str) -> Option<String> {
    REFER_LINE
        .captures(response)
        .map(|caps| caps[1].trim_end_matches('.').to_string())
}

fn registrar_server(response: &str) -> Option<String> {
    let server = REGISTRAR_SERVER_LINE.captures(response)?[1].to_string();
    if server.starts_with("http://") || server.starts_with("https://") {
        return None;
    }
    Some(server.trim_start_matches("whois://").trim_end_matches('/').to_string())
}

fn is_unregistered(record: &str) -> bool {
    NO_RECORD_MARKERS.iter().any(|marker| record.contains(marker))
}

/// First parsable creation and expiration date of a raw WHOIS record.
pub fn parse_timestamps(record: &str) -> WhoisTimestamps {
    let mut timestamps = WhoisTimestamps::default();

    for caps in FIELD_LINE.captures_iter(record) {
        let key = caps[1].to_ascii_lowercase();
        let value = &caps[2];

        if timestamps.creation_date.is_none() && CREATION_KEYS.contains(&key.as_str()) {
            timestamps.creation_date = parse_date(value);
        } else if timestamps.expiration_date.is_none() && EXPIRATION_KEYS.contains(&key.as_str()) {
            timestamps.expiration_date = parse_date(value);
        }

        if timestamps.creation_date.is_some() && timestamps.expiration_date.is_some() {
            break;
        }
    }

    timestamps
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%Y.%m.%d",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%Y%m%d",
    "%b %d %Y",
];

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    // Date-only values, possibly followed by a zone name or a comment
    let candidates = [
        value.split_whitespace().next().unwrap_or(value).to_string(),
        value.split_whitespace().take(3).collect::<Vec<_>>().join(" "),
    ];
    for candidate in &candidates {
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
            }
        }
    }

    None
}
