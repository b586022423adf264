/// The load-once bundle of everything the scoring path reads: fitted encoders, lookup tables and
/// the model bank. It is built at startup and then only ever borrowed immutably, so one bundle can
/// serve any number of requests (and threads) without locking.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::config::BidderConfig;
use crate::encoders::EncoderBundle;
use crate::error::LoadError;
use crate::features::{FeatureTransformer, CATEGORICAL_COLUMNS, NUMERIC_COLUMNS};
use crate::logger::{LogEvent, Logger};
use crate::lookup::{CreativeBias, CreativeTagCounts, LookupTables};
use crate::model::{ModelArtifact, ScoringModel};
use crate::model_bank::ModelBank;
use crate::request::ModelKey;
use crate::{logln, warnln};

pub struct ArtifactBundle {
    pub encoders: EncoderBundle,
    pub lookups: LookupTables,
    pub models: ModelBank,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn read_model(path: &Path) -> Result<Box<dyn ScoringModel>, LoadError> {
    let artifact: ModelArtifact = read_json(path)?;
    artifact.into_model().map_err(|source| LoadError::InvalidModel {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_key(key: &str) -> Result<ModelKey, LoadError> {
    ModelKey::parse(key).map_err(|e| LoadError::InvalidConfig(e.to_string()))
}

impl ArtifactBundle {
    /// Assemble a bundle from already loaded parts, checking the encoders cover every column
    pub fn new(encoders: EncoderBundle, lookups: LookupTables, models: ModelBank) -> Result<Self, LoadError> {
        encoders
            .require_columns(&CATEGORICAL_COLUMNS, &NUMERIC_COLUMNS)
            .map_err(LoadError::InvalidConfig)?;
        Ok(Self { encoders, lookups, models })
    }

    /// Read every artifact named in the configuration
    pub fn load(config: &BidderConfig, logger: &mut Logger) -> Result<Self, LoadError> {
        config.validate()?;
        let paths = &config.artifacts;

        let encoders: EncoderBundle = read_json(&paths.encoders)?;
        logln!(logger, LogEvent::Load, "Loaded encoders from {} ({} target-encoded columns, {} scaled columns)",
            paths.encoders.display(), encoders.target_encoder.columns.len(), encoders.scaler.columns.len());

        let creative_tags: CreativeTagCounts = read_json(&paths.creative_user_counts)?;
        logln!(logger, LogEvent::Load, "Loaded {} creatives from {}", creative_tags.len(), paths.creative_user_counts.display());

        let creative_bias: CreativeBias = read_json(&paths.creative_bias)?;
        logln!(logger, LogEvent::Load, "Loaded {} creative ad types from {}", creative_bias.len(), paths.creative_bias.display());

        let bid_model = read_model(&paths.bid_model)?;
        logln!(logger, LogEvent::Load, "Loaded bid model from {}: {}", paths.bid_model.display(), bid_model.model_type());
        let mut models = ModelBank::new(bid_model);

        for (key, path) in &paths.ctr_models {
            let model = read_model(path)?;
            logln!(logger, LogEvent::Load, "Loaded CTR model {} from {}: {}", key, path.display(), model.model_type());
            models.add_ctr_model(parse_key(key)?, model);
        }
        for (key, path) in &paths.cvr_models {
            let model = read_model(path)?;
            logln!(logger, LogEvent::Load, "Loaded CVR model {} from {}: {}", key, path.display(), model.model_type());
            models.add_cvr_model(parse_key(key)?, model);
        }
        for key in models.orphan_cvr_keys() {
            warnln!(logger, LogEvent::Load, "CVR model {} has no CTR model and will never be used", key);
        }
        logln!(logger, LogEvent::Load, "Model bank ready: {}", models.summary());

        Self::new(
            encoders,
            LookupTables {
                creative_tags,
                creative_bias,
            },
            models,
        )
    }

    /// Transformer borrowing this bundle's encoders and lookups
    pub fn transformer(&self) -> FeatureTransformer<'_> {
        FeatureTransformer::new(&self.encoders, &self.lookups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Directory with the sample artifacts shipped in the repository
    fn demo_config_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/artifacts/config.json")
    }

    #[test]
    fn test_load_demo_artifacts() {
        let config = BidderConfig::from_file(&demo_config_path()).unwrap();
        let mut logger = Logger::new();
        let bundle = ArtifactBundle::load(&config, &mut logger).unwrap();
        assert_eq!(bundle.models.keys().len(), 5);
        assert!(bundle.models.cvr_model(&ModelKey::parse("3358").unwrap()).is_some());
        assert!(bundle.lookups.creative_tags.contains("00fccc64a1ee2809348509b7ac2a97a5"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let mut config = BidderConfig::from_file(&demo_config_path()).unwrap();
        config.artifacts.bid_model = PathBuf::from("/definitely/not/here/bid.json");
        let mut logger = Logger::new();
        match ArtifactBundle::load(&config, &mut logger) {
            Err(LoadError::Io { path, .. }) => assert_eq!(path, PathBuf::from("/definitely/not/here/bid.json")),
            other => panic!("expected an I/O error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_invalid_model_key_in_config() {
        let mut config = BidderConfig::from_file(&demo_config_path()).unwrap();
        let path = config.artifacts.ctr_models["1458"].clone();
        config.artifacts.ctr_models.insert("adv-1".to_string(), path);
        let mut logger = Logger::new();
        assert!(matches!(ArtifactBundle::load(&config, &mut logger), Err(LoadError::InvalidConfig(_))));
    }

    #[test]
    fn test_encoders_must_cover_columns() {
        let result = ArtifactBundle::new(
            EncoderBundle::default(),
            LookupTables::default(),
            ModelBank::new(Box::new(crate::model::ConstantModel { value: 1.0 })),
        );
        assert!(matches!(result, Err(LoadError::InvalidConfig(_))));
    }
}
