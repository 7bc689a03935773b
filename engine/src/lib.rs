pub mod classifier;
pub mod config;
pub mod content;
pub mod domain_intel;
pub mod engine;
pub mod error;
pub mod features;
pub mod lexical;
pub mod parser;
pub mod rank;
pub mod routes;
pub mod types;
pub mod whois;

pub use config::Config;
pub use engine::PredictionEngine;
pub use error::AppError;
pub use features::{FeatureExtractor, UrlFeatureExtractor};
pub use types::{FeatureVector, PredictionResult, FEATURE_NAMES};
