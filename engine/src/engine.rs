use crate::{
    classifier::PhishingModel,
    error::AppError,
    features::FeatureExtractor,
    parser::UrlParser,
    types::PredictionResult,
};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Parses, extracts and classifies URLs, one per semaphore permit. The model
/// is read-only once loaded.
pub struct PredictionEngine<E> {
    parser: UrlParser,
    extractor: E,
    model: PhishingModel,
    permits: Semaphore,
}

impl<E: FeatureExtractor> PredictionEngine<E> {
    pub fn new(parser: UrlParser, extractor: E, model: PhishingModel, max_concurrent: usize) -> Self {
        info!(
            "Prediction engine ready: model {}, {} concurrent predictions",
            model.version, max_concurrent
        );
        Self {
            parser,
            extractor,
            model,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn model_version(&self) -> &str {
        &self.model.version
    }

    /// Stops admitting predictions. Waiting and later callers get
    /// `ServiceUnavailable`; predictions already holding a permit finish.
    pub fn close(&self) {
        self.permits.close();
        info!("Prediction engine closed");
    }

    pub async fn predict(&self, url: &str) -> Result<PredictionResult, AppError> {
        // Malformed input is rejected before any lookup starts
        let parsed = self.parser.parse(url)?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::ServiceUnavailable("prediction pool closed".to_string()))?;

        let start = Instant::now();
        let features = self.extractor.extract(&parsed).await;
        let probability = self.model.probability(&features);
        let phishing = probability >= self.model.threshold;

        let elapsed_ms = start.elapsed().as_millis() as f64;
        metrics::counter!("predictions_total", "phishing" => if phishing { "true" } else { "false" }).increment(1);
        metrics::histogram!("prediction_duration_ms").record(elapsed_ms);

        debug!("Features for {}: {:?}", url, features);
        info!(
            "Prediction for {}: phishing={} (p={:.3}, {}ms)",
            url, phishing, probability, elapsed_ms
        );

        Ok(PredictionResult {
            url: url.to_string(),
            phishing,
            features,
        })
    }

    /// `predict` bounded by `deadline`. Outstanding lookups are dropped when
    /// the deadline passes.
    pub async fn predict_within(&self, url: &str, deadline: Duration) -> Result<PredictionResult, AppError> {
        tokio::time::timeout(deadline, self.predict(url))
            .await
            .map_err(|_| AppError::DeadlineExceeded(deadline.as_millis() as u64))?
    }
}
