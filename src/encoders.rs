/// Fitted encoders produced by the offline training pipeline
///
/// - `TargetEncoder`: maps a categorical value to the smoothed target mean seen at training time.
///   Values never seen during fitting encode to the column prior.
/// - `MinMaxScaler`: maps a numeric value into `feature_range` using the training min/max.
///   No clipping is applied, values outside the training range extrapolate linearly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::TransformError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMapping {
    pub mapping: HashMap<String, f64>,
    pub prior: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetEncoder {
    pub columns: HashMap<String, CategoryMapping>,
}

impl TargetEncoder {
    pub fn encode(&self, column: &str, value: &str) -> Result<f64, TransformError> {
        let fitted = self.columns.get(column).ok_or_else(|| TransformError::UnfittedColumn {
            encoder: "target encoder",
            column: column.to_string(),
        })?;
        Ok(fitted.mapping.get(value).copied().unwrap_or(fitted.prior))
    }
}

fn unit_range() -> (f64, f64) {
    (0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleRange {
    pub data_min: f64,
    pub data_max: f64,
    #[serde(default = "unit_range")]
    pub feature_range: (f64, f64),
}

impl ScaleRange {
    pub fn scale(&self, value: f64) -> f64 {
        let mut data_range = self.data_max - self.data_min;
        // constant columns were fitted with a unit range
        if data_range == 0.0 {
            data_range = 1.0;
        }
        let (low, high) = self.feature_range;
        (value - self.data_min) / data_range * (high - low) + low
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub columns: HashMap<String, ScaleRange>,
}

impl MinMaxScaler {
    pub fn transform(&self, column: &str, value: f64) -> Result<f64, TransformError> {
        self.columns
            .get(column)
            .map(|range| range.scale(value))
            .ok_or_else(|| TransformError::UnfittedColumn {
                encoder: "min-max scaler",
                column: column.to_string(),
            })
    }
}

/// Both fitted encoders, stored together in one artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncoderBundle {
    pub target_encoder: TargetEncoder,
    pub scaler: MinMaxScaler,
}

impl EncoderBundle {
    /// Check that every column the transformer will ask for was fitted, and that the fitted
    /// statistics are usable
    pub fn require_columns(&self, categorical: &[&str], numeric: &[&str]) -> Result<(), String> {
        for column in categorical {
            let fitted = self
                .target_encoder
                .columns
                .get(*column)
                .ok_or_else(|| format!("target encoder has no column `{}`", column))?;
            if !fitted.prior.is_finite() || fitted.mapping.values().any(|v| !v.is_finite()) {
                return Err(format!("target encoder column `{}` has non-finite values", column));
            }
        }
        for column in numeric {
            let range = self
                .scaler
                .columns
                .get(*column)
                .ok_or_else(|| format!("min-max scaler has no column `{}`", column))?;
            if !range.data_min.is_finite() || !range.data_max.is_finite() || range.data_max < range.data_min {
                return Err(format!("min-max scaler column `{}` has an invalid range", column));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> TargetEncoder {
        let mut mapping = HashMap::new();
        mapping.insert("windows".to_string(), 0.0009);
        mapping.insert("mac".to_string(), 0.0012);
        let mut columns = HashMap::new();
        columns.insert("device".to_string(), CategoryMapping { mapping, prior: 0.0008 });
        TargetEncoder { columns }
    }

    #[test]
    fn test_known_and_unknown_categories() {
        let encoder = encoder();
        assert_eq!(encoder.encode("device", "mac").unwrap(), 0.0012);
        assert_eq!(encoder.encode("device", "playstation").unwrap(), 0.0008);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let encoder = encoder();
        let first: Vec<f64> = ["windows", "mac", "other"].iter().map(|v| encoder.encode("device", v).unwrap()).collect();
        let second: Vec<f64> = ["windows", "mac", "other"].iter().map(|v| encoder.encode("device", v).unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unfitted_column() {
        assert_eq!(
            encoder().encode("browser", "chrome"),
            Err(TransformError::UnfittedColumn { encoder: "target encoder", column: "browser".to_string() })
        );
    }

    #[test]
    fn test_min_max_scaling() {
        let range = ScaleRange { data_min: 0.0, data_max: 95.0, feature_range: (0.0, 1.0) };
        assert_eq!(range.scale(0.0), 0.0);
        assert_eq!(range.scale(95.0), 1.0);
        assert!((range.scale(47.5) - 0.5).abs() < 1e-12);
        // no clipping outside the fitted range
        assert!((range.scale(190.0) - 2.0).abs() < 1e-12);

        let shifted = ScaleRange { data_min: 10.0, data_max: 20.0, feature_range: (-1.0, 1.0) };
        assert!((shifted.scale(15.0) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_scales_with_unit_range() {
        let range = ScaleRange { data_min: 3.0, data_max: 3.0, feature_range: (0.0, 1.0) };
        assert_eq!(range.scale(3.0), 0.0);
        assert_eq!(range.scale(5.0), 2.0);
    }

    #[test]
    fn test_bundle_deserializes_with_default_feature_range() {
        let json = r#"{
            "target_encoder": {"columns": {"region": {"mapping": {"80": 0.001}, "prior": 0.0007}}},
            "scaler": {"columns": {"time_block": {"data_min": 0, "data_max": 95}}}
        }"#;
        let bundle: EncoderBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.scaler.columns["time_block"].feature_range, (0.0, 1.0));
        assert!(bundle.require_columns(&["region"], &["time_block"]).is_ok());
        assert!(bundle.require_columns(&["city"], &["time_block"]).is_err());
        assert!(bundle.require_columns(&["region"], &["creative_user_count"]).is_err());
    }
}
