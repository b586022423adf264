use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::request::ModelKey;

/// Raw request fields that cannot be turned into a typed `BidRequest`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("field `{field}` is missing")]
    MissingField { field: &'static str },
    #[error("field `{field}` is not an integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },
    #[error("malformed timestamp {value:?}: {reason}")]
    MalformedTimestamp { value: String, reason: &'static str },
    #[error("advertiser id {0:?} is not a numeric model key")]
    InvalidModelKey(String),
    #[error("floor price {0} is negative")]
    NegativeFloorPrice(i64),
}

/// Failures while deriving the feature vector from a valid request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("creative {0:?} has no entry in the creative tag table")]
    UnknownCreative(String),
    #[error("{encoder} has no fitted column `{column}`")]
    UnfittedColumn { encoder: &'static str, column: String },
    #[error("creative {0:?} user count overflows")]
    CountOverflow(String),
}

/// Failures raised by a scoring model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model expects {expected} features, got {actual}")]
    FeatureArity { expected: usize, actual: usize },
    #[error("model produced a non-finite score ({0})")]
    NonFiniteOutput(f64),
    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),
}

/// Failures while reading configuration or artifacts at startup
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot parse {path}: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
    #[error("model artifact {path} is unusable: {source}")]
    InvalidModel { path: PathBuf, source: ModelError },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Which of the three models a prediction failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringStage {
    Ctr,
    Cvr,
    BidPrice,
}

impl fmt::Display for ScoringStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScoringStage::Ctr => "CTR",
            ScoringStage::Cvr => "CVR",
            ScoringStage::BidPrice => "bid-price",
        };
        f.write_str(name)
    }
}

/// Request-scoped failures of the bid decision.
///
/// A low predicted CTR is not an error; it is `BidDecision::Abstain`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BidError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("no CTR model registered for model key {0}")]
    MissingCtrModel(ModelKey),
    #[error("{stage} model for key {key} failed: {source}")]
    Prediction {
        stage: ScoringStage,
        key: ModelKey,
        source: ModelError,
    },
    #[error("final price {price} for model key {key} is not positive")]
    NonPositivePrice { key: ModelKey, price: f64 },
}

impl BidError {
    /// True for errors caused by missing configuration rather than by the request itself
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, BidError::MissingCtrModel(_))
    }
}
