use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// CTR below this means the request is not worth bidding on
pub const DEFAULT_CTR_THRESHOLD: f64 = 0.7;
/// CVR above this earns the conversion multiplier
pub const DEFAULT_CVR_THRESHOLD: f64 = 0.7;
/// Bid multiplier for likely-to-convert traffic
pub const DEFAULT_CVR_MULTIPLIER: f64 = 1.5;
/// The bid never goes below this multiple of the slot floor price
pub const DEFAULT_FLOOR_MARKUP: f64 = 1.1;

/// Advertisers with a CTR model in the default deployment
const DEFAULT_CTR_KEYS: [&str; 5] = ["1458", "3358", "3386", "3427", "3476"];
/// Advertisers with a CVR model in the default deployment
const DEFAULT_CVR_KEYS: [&str; 2] = ["3476", "3358"];

/// Locations of the artifacts written by the training pipeline
///
/// Relative paths are resolved against the directory holding the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub encoders: PathBuf,
    pub creative_user_counts: PathBuf,
    pub creative_bias: PathBuf,
    pub ctr_models: BTreeMap<String, PathBuf>,
    pub cvr_models: BTreeMap<String, PathBuf>,
    pub bid_model: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            encoders: PathBuf::from("saved/encoders_scalers.json"),
            creative_user_counts: PathBuf::from("saved/creative_userid_count.json"),
            creative_bias: PathBuf::from("saved/creative_adtype_map.json"),
            ctr_models: DEFAULT_CTR_KEYS
                .iter()
                .map(|key| (key.to_string(), PathBuf::from(format!("model/{}.json", key))))
                .collect(),
            cvr_models: DEFAULT_CVR_KEYS
                .iter()
                .map(|key| (key.to_string(), PathBuf::from(format!("model/{}_cvr.json", key))))
                .collect(),
            bid_model: PathBuf::from("model/bid.json"),
        }
    }
}

impl ArtifactPaths {
    /// Resolve every relative path against `base`
    pub fn resolved(&self, base: &Path) -> Self {
        let resolve = |path: &PathBuf| if path.is_absolute() { path.clone() } else { base.join(path) };
        Self {
            encoders: resolve(&self.encoders),
            creative_user_counts: resolve(&self.creative_user_counts),
            creative_bias: resolve(&self.creative_bias),
            ctr_models: self.ctr_models.iter().map(|(k, p)| (k.clone(), resolve(p))).collect(),
            cvr_models: self.cvr_models.iter().map(|(k, p)| (k.clone(), resolve(p))).collect(),
            bid_model: resolve(&self.bid_model),
        }
    }
}

/// Bidder configuration: decision thresholds plus where to find the artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BidderConfig {
    pub ctr_threshold: f64,
    pub cvr_threshold: f64,
    pub cvr_multiplier: f64,
    pub floor_markup: f64,
    pub artifacts: ArtifactPaths,
}

impl Default for BidderConfig {
    fn default() -> Self {
        Self {
            ctr_threshold: DEFAULT_CTR_THRESHOLD,
            cvr_threshold: DEFAULT_CVR_THRESHOLD,
            cvr_multiplier: DEFAULT_CVR_MULTIPLIER,
            floor_markup: DEFAULT_FLOOR_MARKUP,
            artifacts: ArtifactPaths::default(),
        }
    }
}

impl BidderConfig {
    /// Read a JSON configuration file; artifact paths come back resolved against its directory
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BidderConfig = serde_json::from_str(&text).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self {
            artifacts: config.artifacts.resolved(base),
            ..config
        })
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        let thresholds = [
            ("ctr_threshold", self.ctr_threshold),
            ("cvr_threshold", self.cvr_threshold),
            ("cvr_multiplier", self.cvr_multiplier),
            ("floor_markup", self.floor_markup),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() {
                return Err(LoadError::InvalidConfig(format!("{} must be finite, got {}", name, value)));
            }
        }
        if self.cvr_multiplier <= 0.0 {
            return Err(LoadError::InvalidConfig(format!("cvr_multiplier must be positive, got {}", self.cvr_multiplier)));
        }
        if self.floor_markup <= 0.0 {
            return Err(LoadError::InvalidConfig(format!("floor_markup must be positive, got {}", self.floor_markup)));
        }
        if self.artifacts.ctr_models.is_empty() {
            return Err(LoadError::InvalidConfig("no CTR models configured".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BidderConfig::default();
        assert_eq!(config.ctr_threshold, 0.7);
        assert_eq!(config.cvr_threshold, 0.7);
        assert_eq!(config.cvr_multiplier, 1.5);
        assert_eq!(config.floor_markup, 1.1);
        assert_eq!(config.artifacts.ctr_models.len(), 5);
        assert_eq!(config.artifacts.cvr_models["3476"], PathBuf::from("model/3476_cvr.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: BidderConfig = serde_json::from_str(r#"{"ctr_threshold": 0.5, "artifacts": {"bid_model": "m/bid.json"}}"#).unwrap();
        assert_eq!(config.ctr_threshold, 0.5);
        assert_eq!(config.cvr_multiplier, 1.5);
        assert_eq!(config.artifacts.bid_model, PathBuf::from("m/bid.json"));
        assert_eq!(config.artifacts.encoders, PathBuf::from("saved/encoders_scalers.json"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = BidderConfig::default();
        config.cvr_multiplier = 0.0;
        assert!(matches!(config.validate(), Err(LoadError::InvalidConfig(_))));

        let mut config = BidderConfig::default();
        config.ctr_threshold = f64::NAN;
        assert!(matches!(config.validate(), Err(LoadError::InvalidConfig(_))));

        let mut config = BidderConfig::default();
        config.artifacts.ctr_models.clear();
        assert!(matches!(config.validate(), Err(LoadError::InvalidConfig(_))));
    }

    #[test]
    fn test_paths_resolve_against_base() {
        let mut paths = ArtifactPaths::default();
        let absolute = std::env::temp_dir().join("bid.json");
        paths.bid_model = absolute.clone();
        let resolved = paths.resolved(Path::new("/srv/bidder"));
        assert_eq!(resolved.encoders, PathBuf::from("/srv/bidder/saved/encoders_scalers.json"));
        assert_eq!(resolved.ctr_models["1458"], PathBuf::from("/srv/bidder/model/1458.json"));
        assert_eq!(resolved.bid_model, absolute);
    }
}
