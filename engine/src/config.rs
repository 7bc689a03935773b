use serde::Deserialize;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub model_dir: String,
    pub psl_path: String,
    pub psl_url: String,
    pub whois_server: String,
    pub whois_timeout_ms: u64,
    pub dns_timeout_ms: u64,
    pub rank_timeout_ms: u64,
    #[serde(default)]
    pub page_rank_api_key: Option<String>,
    pub page_rank_api_url: String,
    pub rank_checker_url: String,
    pub fetch_connect_timeout_ms: u64,
    pub fetch_read_timeout_ms: u64,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
    pub max_concurrent_predictions: usize,
    pub prediction_deadline_ms: u64,
    pub user_agent: String,
}

impl Config {
    /// Defaults, then `phishnet.toml` if present, then `PHISHNET_*` env vars.
    pub fn load() -> Result<Self, AppError> {
        let settings = config::Config::builder()
            .set_default("port", 8000)?
            .set_default("model_dir", "models")?
            .set_default("psl_path", "data/public_suffix_list.dat")?
            .set_default("psl_url", "https://publicsuffix.org/list/public_suffix_list.dat")?
            .set_default("whois_server", "whois.iana.org:43")?
            .set_default("whois_timeout_ms", 5000)?
            .set_default("dns_timeout_ms", 3000)?
            .set_default("rank_timeout_ms", 5000)?
            .set_default("page_rank_api_url", "https://openpagerank.com/api/v1.0/getPageRank")?
            .set_default("rank_checker_url", "https://www.checkpagerank.net/index.php")?
            .set_default("fetch_connect_timeout_ms", 3050)?
            .set_default("fetch_read_timeout_ms", 5000)?
            .set_default("max_redirects", 30)?
            .set_default("max_body_bytes", 2 * 1024 * 1024)?
            .set_default("max_concurrent_predictions", 32)?
            .set_default("prediction_deadline_ms", 30000)?
            .set_default("user_agent", concat!("phishnet-engine/", env!("CARGO_PKG_VERSION")))?
            .add_source(config::File::with_name("phishnet").required(false))
            .add_source(config::Environment::with_prefix("PHISHNET"))
            .build()?;

        let mut config: Config = settings.try_deserialize()?;

        // An empty key in the environment means "not configured"
        if config.page_rank_api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            config.page_rank_api_key = None;
        }

        Ok(config)
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_millis(self.whois_timeout_ms)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn rank_timeout(&self) -> Duration {
        Duration::from_millis(self.rank_timeout_ms)
    }

    pub fn fetch_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_connect_timeout_ms)
    }

    pub fn fetch_read_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_read_timeout_ms)
    }

    pub fn prediction_deadline(&self) -> Duration {
        Duration::from_millis(self.prediction_deadline_ms)
    }
}

#[cfg(test)]
impl Config {
    /// Configuration pointing every external collaborator at `base`.
    pub fn for_tests(base: &str) -> Self {
        Self {
            port: 0,
            model_dir: "models".to_string(),
            psl_path: "unused".to_string(),
            psl_url: format!("{base}/psl"),
            whois_server: "127.0.0.1:9".to_string(),
            whois_timeout_ms: 500,
            dns_timeout_ms: 500,
            rank_timeout_ms: 1000,
            page_rank_api_key: None,
            page_rank_api_url: format!("{base}/api/v1.0/getPageRank"),
            rank_checker_url: format!("{base}/index.php"),
            fetch_connect_timeout_ms: 1000,
            fetch_read_timeout_ms: 2000,
            max_redirects: 30,
            max_body_bytes: 2 * 1024 * 1024,
            max_concurrent_predictions: 4,
            prediction_deadline_ms: 10_000,
            user_agent: "phishnet-engine/test".to_string(),
        }
    }
}
