use crate::{
    error::AppError,
    types::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, info};

fn default_threshold() -> f64 {
    0.5
}

/// Standardisation applied before the linear model: `(x - mean) / scale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Logistic regression artifact. `feature_order` must equal the extractor's
/// column order exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhishingModel {
    pub version: String,
    pub intercept: f64,
    pub weights: Vec<f64>,
    pub feature_order: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub scaler: Option<Scaler>,
}

impl PhishingModel {
    pub fn from_json(content: &str) -> Result<Self, AppError> {
        let model: PhishingModel = serde_json::from_str(content)?;
        model.validate()?;
        Ok(model)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path)?;
        let model = Self::from_json(&content)
            .map_err(|e| AppError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        info!("Loaded model {} from {}", model.version, path.display());
        Ok(model)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.feature_order.len() != FEATURE_COUNT
            || self.feature_order.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(AppError::ModelLoad(format!(
                "feature order mismatch: model expects {:?}",
                self.feature_order
            )));
        }
        if self.weights.len() != FEATURE_COUNT {
            return Err(AppError::ModelLoad(format!(
                "expected {} weights, found {}",
                FEATURE_COUNT,
                self.weights.len()
            )));
        }
        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != FEATURE_COUNT || scaler.scale.len() != FEATURE_COUNT {
                return Err(AppError::ModelLoad("scaler length mismatch".to_string()));
            }
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(AppError::ModelLoad(format!("threshold {} outside [0, 1]", self.threshold)));
        }
        Ok(())
    }

    pub fn probability(&self, features: &FeatureVector) -> f64 {
        let mut score = self.intercept;

        for (i, value) in features.values().iter().enumerate() {
            let mut x = *value as f64;
            if let Some(scaler) = &self.scaler {
                let scale = if scaler.scale[i] == 0.0 { 1.0 } else { scaler.scale[i] };
                x = (x - scaler.mean[i]) / scale;
            }
            score += self.weights[i] * x;
        }

        sigmoid(score)
    }

    pub fn predict(&self, features: &FeatureVector) -> bool {
        self.probability(features) >= self.threshold
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Newest `.json` artifact by modification time; ties go to the
/// lexicographically greatest path so the choice is stable.
pub fn select_latest_artifact(listing: &[ArtifactEntry]) -> Option<&Path> {
    listing
        .iter()
        .filter(|entry| entry.path.extension().is_some_and(|ext| ext == "json"))
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)))
        .map(|entry| entry.path.as_path())
}

pub fn list_artifacts(dir: &Path) -> Result<Vec<ArtifactEntry>, AppError> {
    let entries = fs::read_dir(dir).map_err(|e| AppError::ModelNotFound(format!("{}: {}", dir.display(), e)))?;

    let mut listing = Vec::new();
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        listing.push(ArtifactEntry {
            path: entry.path(),
            modified: metadata.modified()?,
        });
    }

    debug!("Found {} files in {}", listing.len(), dir.display());
    Ok(listing)
}

/// Loads the most recent artifact in `dir`. Running without a model is not
/// an option, so every failure here is fatal to the caller.
pub fn load_latest_model(dir: &Path) -> Result<PhishingModel, AppError> {
    let listing = list_artifacts(dir)?;
    let path = select_latest_artifact(&listing).ok_or_else(|| AppError::ModelNotFound(dir.display().to_string()))?;
    PhishingModel::load_from_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentFeatures, DomainFeatures, LexicalFeatures};
    use std::time::Duration;

    const REFERENCE_MODEL: &str = include_str!("../models/reference-v1.json");

    fn reference() -> PhishingModel {
        PhishingModel::from_json(REFERENCE_MODEL).unwrap()
    }

    fn google_search() -> FeatureVector {
        let lexical = LexicalFeatures {
            url_length: 38,
            domain_length: 6,
            path_depth: 1,
            nb_subdomains: 1,
            nb_equals: 1,
            nb_question_mark: 1,
            ..Default::default()
        };
        let domain = DomainFeatures {
            unregistered_domain: 0,
            domain_age: 9_800,
            domain_end: 1_800,
            unavailable_dns_record: 0,
            page_rank: 10,
        };
        let content = ContentFeatures {
            nb_redirects: 0,
            nb_external_redirects: 0,
            domain_not_in_title: 1,
            domain_without_copyright: 0,
        };
        FeatureVector::assemble(&lexical, &domain, &content)
    }

    fn userinfo_redirect() -> FeatureVector {
        let lexical = LexicalFeatures {
            url_length: 39,
            domain_length: 8,
            nb_subdomains: 1,
            is_http: 1,
            has_at: 1,
            has_dash: 1,
            ..Default::default()
        };
        let domain = DomainFeatures {
            unregistered_domain: 0,
            domain_age: 2_900,
            domain_end: 400,
            unavailable_dns_record: 0,
            page_rank: 4,
        };
        FeatureVector::assemble(&lexical, &domain, &ContentFeatures::unreachable())
    }

    #[test]
    fn test_reference_model_classifies_examples() {
        let model = reference();
        assert!(!model.predict(&google_search()));
        assert!(model.predict(&userinfo_redirect()));
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let model = reference();
        let vector = userinfo_redirect();
        assert_eq!(model.probability(&vector), model.probability(&vector));
    }

    #[test]
    fn test_rejects_wrong_feature_order() {
        let mut model = reference();
        model.feature_order.swap(0, 1);
        let json = serde_json::to_string(&model).unwrap();
        assert!(matches!(PhishingModel::from_json(&json), Err(AppError::ModelLoad(_))));

        let mut short = reference();
        short.weights.pop();
        let json = serde_json::to_string(&short).unwrap();
        assert!(matches!(PhishingModel::from_json(&json), Err(AppError::ModelLoad(_))));
    }

    #[test]
    fn test_scaler_is_applied() {
        let mut model = reference();
        model.weights = vec![0.0; FEATURE_COUNT];
        model.weights[0] = 1.0;
        model.intercept = 0.0;
        model.scaler = Some(Scaler {
            mean: vec![38.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        });
        // url_length equals the mean, so the score is exactly zero
        assert!((model.probability(&google_search()) - 0.5).abs() < 1e-9);
        assert!(model.predict(&google_search()));
    }

    #[test]
    fn test_select_latest_artifact() {
        let epoch = SystemTime::UNIX_EPOCH;
        let listing = vec![
            ArtifactEntry { path: "models/a.json".into(), modified: epoch + Duration::from_secs(10) },
            ArtifactEntry { path: "models/b.json".into(), modified: epoch + Duration::from_secs(30) },
            ArtifactEntry { path: "models/c.bin".into(), modified: epoch + Duration::from_secs(99) },
            ArtifactEntry { path: "models/notes.txt".into(), modified: epoch + Duration::from_secs(50) },
        ];
        assert_eq!(select_latest_artifact(&listing), Some(Path::new("models/b.json")));
    }

    #[test]
    fn test_select_latest_artifact_tie_and_empty() {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(5);
        let listing = vec![
            ArtifactEntry { path: "m/x.json".into(), modified },
            ArtifactEntry { path: "m/y.json".into(), modified },
        ];
        assert_eq!(select_latest_artifact(&listing), Some(Path::new("m/y.json")));
        assert_eq!(select_latest_artifact(&[]), None);
    }

    #[test]
    fn test_load_latest_model_from_directory() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("models");
        let model = load_latest_model(&dir).unwrap();
        assert_eq!(model.feature_order.len(), FEATURE_COUNT);

        let missing = Path::new(env!("CARGO_MANIFEST_DIR")).join("no-such-dir");
        assert!(matches!(load_latest_model(&missing), Err(AppError::ModelNotFound(_))));
    }
}
