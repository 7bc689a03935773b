use crate::{
    config::Config,
    content::ContentInspector,
    domain_intel::DomainIntel,
    error::AppError,
    lexical,
    parser::ParsedUrl,
    types::FeatureVector,
};
use std::future::Future;
use std::time::Instant;
use tracing::debug;

/// Produces the full feature vector for a parsed URL. Extraction never fails:
/// lookups that do not answer fall back to their default values.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, parsed: &ParsedUrl) -> impl Future<Output = FeatureVector> + Send;
}

pub struct UrlFeatureExtractor {
    intel: DomainIntel,
    content: ContentInspector,
}

impl UrlFeatureExtractor {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self::with_parts(DomainIntel::new(config)?, ContentInspector::new(config)?))
    }

    pub fn with_parts(intel: DomainIntel, content: ContentInspector) -> Self {
        Self { intel, content }
    }
}

impl FeatureExtractor for UrlFeatureExtractor {
    async fn extract(&self, parsed: &ParsedUrl) -> FeatureVector {
        let start = Instant::now();

        let lexical = lexical::extract(parsed);
        let (domain, content) = tokio::join!(self.intel.extract(parsed), self.content.extract(parsed));

        debug!(
            "Extracted features for {} in {}ms",
            parsed.url,
            start.elapsed().as_millis()
        );
        FeatureVector::assemble(&lexical, &domain, &content)
    }
}
