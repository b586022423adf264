/// Bid Decision Engine
///
/// For one request:
/// 1. transform it into the feature vector
/// 2. score CTR with the advertiser's CTR model, abstain when it is below the CTR threshold
/// 3. if the advertiser has a CVR model, score CVR (vector + key) and pick the bid multiplier
/// 4. score the base price with the shared bid model (vector + key)
/// 5. bid max(floor_markup × floor, base × multiplier), which must be positive
///
/// Every failure is returned to the caller for that request only. There is no default bid.

use std::fmt;

use crate::artifacts::ArtifactBundle;
use crate::config::BidderConfig;
use crate::error::{BidError, ScoringStage};
use crate::features::FeatureTransformer;
use crate::logger::{LogEvent, Logger};
use crate::model_bank::ModelBank;
use crate::request::{BidRequest, ModelKey, RawBidRequest};
use crate::utils::TOTAL_REQUESTS_SCORED;
use crate::{errln, logln};
use std::sync::atomic::Ordering;

/// Thresholds and multipliers applied on top of the model scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    pub ctr_threshold: f64,
    pub cvr_threshold: f64,
    pub cvr_multiplier: f64,
    pub floor_markup: f64,
}

impl From<&BidderConfig> for DecisionPolicy {
    fn from(config: &BidderConfig) -> Self {
        Self {
            ctr_threshold: config.ctr_threshold,
            cvr_threshold: config.cvr_threshold,
            cvr_multiplier: config.cvr_multiplier,
            floor_markup: config.floor_markup,
        }
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::from(&BidderConfig::default())
    }
}

/// Outcome of a successful decision
#[derive(Debug, Clone, PartialEq)]
pub enum BidDecision {
    /// Bid `price`; the remaining fields explain how it was reached
    Bid {
        price: f64,
        base_price: f64,
        multiplier: f64,
        ctr: f64,
        cvr: Option<f64>,
    },
    /// Predicted CTR too low to spend on this request
    Abstain { ctr: f64 },
}

impl BidDecision {
    pub fn price(&self) -> Option<f64> {
        match self {
            BidDecision::Bid { price, .. } => Some(*price),
            BidDecision::Abstain { .. } => None,
        }
    }

    pub fn is_abstain(&self) -> bool {
        matches!(self, BidDecision::Abstain { .. })
    }
}

impl fmt::Display for BidDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BidDecision::Bid { price, .. } => write!(f, "{:.4}", price),
            BidDecision::Abstain { .. } => f.write_str("abstain"),
        }
    }
}

pub struct BidEngine<'a> {
    transformer: FeatureTransformer<'a>,
    models: &'a ModelBank,
    policy: DecisionPolicy,
}

fn stage_error(stage: ScoringStage, key: &ModelKey) -> impl FnOnce(crate::error::ModelError) -> BidError + '_ {
    move |source| BidError::Prediction {
        stage,
        key: key.clone(),
        source,
    }
}

impl<'a> BidEngine<'a> {
    pub fn new(bundle: &'a ArtifactBundle, policy: DecisionPolicy) -> Self {
        Self {
            transformer: bundle.transformer(),
            models: &bundle.models,
            policy,
        }
    }

    /// Build an engine from separately owned parts
    pub fn from_parts(transformer: FeatureTransformer<'a>, models: &'a ModelBank, policy: DecisionPolicy) -> Self {
        Self { transformer, models, policy }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Parse raw adapter fields, then decide
    pub fn decide_raw(&self, raw: &RawBidRequest, logger: &mut Logger) -> Result<BidDecision, BidError> {
        let request = match BidRequest::parse(raw) {
            Ok(request) => request,
            Err(e) => {
                errln!(logger, LogEvent::Decision, "bid {}: rejected request: {}",
                    raw.bid_id.as_deref().unwrap_or("?"), e);
                return Err(e.into());
            }
        };
        self.decide(&request, logger)
    }

    /// Decide whether and how much to bid on one request
    pub fn decide(&self, request: &BidRequest, logger: &mut Logger) -> Result<BidDecision, BidError> {
        TOTAL_REQUESTS_SCORED.fetch_add(1, Ordering::Relaxed);
        let result = self.score(request, logger);
        match &result {
            Ok(decision) => {
                logln!(logger, LogEvent::Decision, "bid {}: advertiser {} -> {}",
                    request.bid_id, request.advertiser_id, decision);
            }
            Err(e) => {
                errln!(logger, LogEvent::Decision, "bid {}: {}", request.bid_id, e);
            }
        }
        result
    }

    fn score(&self, request: &BidRequest, logger: &mut Logger) -> Result<BidDecision, BidError> {
        let transformed = self.transformer.transform(request, logger)?;
        let key = &transformed.model_key;

        let ctr_model = self.models.ctr_model(key)?;
        let ctr = ctr_model
            .predict(transformed.features.as_slice())
            .map_err(stage_error(ScoringStage::Ctr, key))?;
        if ctr < self.policy.ctr_threshold {
            logln!(logger, LogEvent::Request, "bid {}: ctr {:.4} below threshold {}",
                request.bid_id, ctr, self.policy.ctr_threshold);
            return Ok(BidDecision::Abstain { ctr });
        }

        let extended = transformed.features.extended_with(key);

        let mut multiplier = 1.0;
        let cvr = match self.models.cvr_model(key) {
            Some(cvr_model) => {
                let cvr = cvr_model
                    .predict(&extended)
                    .map_err(stage_error(ScoringStage::Cvr, key))?;
                if cvr > self.policy.cvr_threshold {
                    multiplier = self.policy.cvr_multiplier;
                }
                Some(cvr)
            }
            None => None,
        };

        let base_price = self
            .models
            .bid_model()
            .predict(&extended)
            .map_err(stage_error(ScoringStage::BidPrice, key))?;

        let floor = self.policy.floor_markup * transformed.floor_price as f64;
        let price = floor.max(base_price * multiplier);
        if price <= 0.0 {
            return Err(BidError::NonPositivePrice { key: key.clone(), price });
        }

        logln!(logger, LogEvent::Request, "bid {}: ctr={:.4} cvr={:?} base={:.4} multiplier={} floor={}",
            request.bid_id, ctr, cvr, base_price, multiplier, transformed.floor_price);

        Ok(BidDecision::Bid {
            price,
            base_price,
            multiplier,
            ctr,
            cvr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, RequestError, TransformError};
    use crate::model::{ConstantModel, LinearModel, Link};
    use crate::sample;

    fn key(id: &str) -> ModelKey {
        ModelKey::parse(id).unwrap()
    }

    /// Bundle whose advertiser `3427` gets the given CTR/CVR/bid scores
    fn bundle_with(ctr: f64, cvr: Option<f64>, bid: f64) -> ArtifactBundle {
        let sample = sample::sample_bundle().unwrap();
        let mut models = ModelBank::new(Box::new(ConstantModel { value: bid }));
        models.add_ctr_model(key("3427"), Box::new(ConstantModel { value: ctr }));
        if let Some(cvr) = cvr {
            models.add_cvr_model(key("3427"), Box::new(ConstantModel { value: cvr }));
        }
        ArtifactBundle::new(sample.encoders, sample.lookups, models).unwrap()
    }

    fn request_with_floor(floor: i64) -> BidRequest {
        let mut raw = sample::sample_raw_request();
        raw.ad_slot_floor_price = Some(floor.to_string());
        BidRequest::parse(&raw).unwrap()
    }

    fn decide(bundle: &ArtifactBundle, request: &BidRequest) -> Result<BidDecision, BidError> {
        let engine = BidEngine::new(bundle, DecisionPolicy::default());
        let mut logger = Logger::new();
        engine.decide(request, &mut logger)
    }

    #[test]
    fn test_low_ctr_abstains() {
        let bundle = bundle_with(0.69, Some(0.99), 500.0);
        let decision = decide(&bundle, &request_with_floor(0)).unwrap();
        assert_eq!(decision, BidDecision::Abstain { ctr: 0.69 });
        assert!(decision.is_abstain());
        assert_eq!(decision.price(), None);
    }

    #[test]
    fn test_ctr_at_threshold_bids() {
        let bundle = bundle_with(0.7, None, 80.0);
        let decision = decide(&bundle, &request_with_floor(0)).unwrap();
        assert_eq!(decision.price(), Some(80.0));
    }

    #[test]
    fn test_high_cvr_multiplies_price() {
        let without = decide(&bundle_with(0.9, Some(0.7), 80.0), &request_with_floor(0)).unwrap();
        let with = decide(&bundle_with(0.9, Some(0.71), 80.0), &request_with_floor(0)).unwrap();
        let no_model = decide(&bundle_with(0.9, None, 80.0), &request_with_floor(0)).unwrap();

        assert_eq!(without.price(), Some(80.0));
        assert_eq!(no_model.price(), Some(80.0));
        assert_eq!(with.price(), Some(1.5 * 80.0));
        match with {
            BidDecision::Bid { multiplier, cvr, base_price, .. } => {
                assert_eq!(multiplier, 1.5);
                assert_eq!(cvr, Some(0.71));
                assert_eq!(base_price, 80.0);
            }
            other => panic!("expected a bid, got {:?}", other),
        }
    }

    #[test]
    fn test_price_never_below_floor_markup() {
        let bundle = bundle_with(0.9, None, 10.0);
        for floor in [0, 5, 9, 10, 50, 300] {
            let decision = decide(&bundle, &request_with_floor(floor)).unwrap();
            let price = decision.price().unwrap();
            assert!(price >= 1.1 * floor as f64, "floor {} price {}", floor, price);
            assert_eq!(price, (1.1 * floor as f64).max(10.0));
        }
    }

    #[test]
    fn test_floor_markup_wins_over_multiplied_price() {
        let bundle = bundle_with(0.9, Some(0.95), 10.0);
        let decision = decide(&bundle, &request_with_floor(100)).unwrap();
        assert!((decision.price().unwrap() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_price_is_an_error() {
        // zero floor and a bid model scoring at or below zero
        for bid in [-5.0, 0.0] {
            let bundle = bundle_with(0.9, None, bid);
            let err = decide(&bundle, &request_with_floor(0)).unwrap_err();
            assert_eq!(err, BidError::NonPositivePrice { key: key("3427"), price: 0.0 });
            assert!(!err.is_configuration_error());
        }

        // a positive floor still rescues a negative model score
        let bundle = bundle_with(0.9, None, -5.0);
        let price = decide(&bundle, &request_with_floor(10)).unwrap().price().unwrap();
        assert!((price - 11.0).abs() < 1e-9);
        assert!(price > 0.0);
    }

    #[test]
    fn test_negative_floor_never_reaches_the_models() {
        let bundle = bundle_with(0.9, None, -5.0);
        let engine = BidEngine::new(&bundle, DecisionPolicy::default());
        let mut raw = sample::sample_raw_request();
        raw.ad_slot_floor_price = Some("-100".to_string());
        let err = engine.decide_raw(&raw, &mut Logger::new()).unwrap_err();
        assert_eq!(err, BidError::Request(RequestError::NegativeFloorPrice(-100)));
    }

    #[test]
    fn test_missing_ctr_model_is_configuration_error() {
        let sample = sample::sample_bundle().unwrap();
        let bundle = ArtifactBundle::new(
            sample.encoders,
            sample.lookups,
            ModelBank::new(Box::new(ConstantModel { value: 1.0 })),
        )
        .unwrap();
        let err = decide(&bundle, &request_with_floor(0)).unwrap_err();
        assert_eq!(err, BidError::MissingCtrModel(key("3427")));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_transform_failure_propagates() {
        let bundle = bundle_with(0.9, None, 80.0);
        let mut raw = sample::sample_raw_request();
        raw.creative_id = Some("unknown".to_string());
        let request = BidRequest::parse(&raw).unwrap();
        let err = decide(&bundle, &request).unwrap_err();
        assert_eq!(err, BidError::Transform(TransformError::UnknownCreative("unknown".to_string())));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_raw_request_errors_propagate() {
        let bundle = bundle_with(0.9, None, 80.0);
        let engine = BidEngine::new(&bundle, DecisionPolicy::default());
        let mut logger = Logger::new();
        let mut raw = sample::sample_raw_request();
        raw.timestamp = Some("2013".to_string());
        let err = engine.decide_raw(&raw, &mut logger).unwrap_err();
        assert!(matches!(err, BidError::Request(RequestError::MalformedTimestamp { .. })));

        // a bad request does not disturb the next one
        let ok = engine.decide_raw(&sample::sample_raw_request(), &mut logger).unwrap();
        assert_eq!(ok.price(), Some(80.0));
    }

    #[test]
    fn test_models_see_extended_vector() {
        let sample = sample::sample_bundle().unwrap();
        // bid model reads only the trailing key feature: 3427 * 0.01
        let mut weights = vec![0.0; 14];
        weights[13] = 0.01;
        let mut models = ModelBank::new(Box::new(LinearModel { weights, intercept: 0.0, link: Link::Identity }));
        models.add_ctr_model(key("3427"), Box::new(LinearModel { weights: vec![0.0; 13], intercept: 5.0, link: Link::Logistic }));
        let bundle = ArtifactBundle::new(sample.encoders, sample.lookups, models).unwrap();

        let price = decide(&bundle, &request_with_floor(0)).unwrap().price().unwrap();
        assert!((price - 34.27).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_errors_name_the_stage() {
        let sample = sample::sample_bundle().unwrap();
        // CTR model expecting the extended vector fails on the 13-element one
        let mut models = ModelBank::new(Box::new(ConstantModel { value: 1.0 }));
        models.add_ctr_model(key("3427"), Box::new(LinearModel { weights: vec![0.0; 14], intercept: 5.0, link: Link::Identity }));
        let bundle = ArtifactBundle::new(sample.encoders, sample.lookups, models).unwrap();

        let err = decide(&bundle, &request_with_floor(0)).unwrap_err();
        assert_eq!(
            err,
            BidError::Prediction {
                stage: ScoringStage::Ctr,
                key: key("3427"),
                source: ModelError::FeatureArity { expected: 14, actual: 13 },
            }
        );
    }

    #[test]
    fn test_custom_policy() {
        let bundle = bundle_with(0.6, Some(0.6), 40.0);
        let policy = DecisionPolicy { ctr_threshold: 0.5, cvr_threshold: 0.5, cvr_multiplier: 2.0, floor_markup: 1.0 };
        let engine = BidEngine::new(&bundle, policy);
        let mut logger = Logger::new();
        let decision = engine.decide(&request_with_floor(0), &mut logger).unwrap();
        assert_eq!(decision.price(), Some(80.0));
        assert_eq!(engine.policy().cvr_multiplier, 2.0);
    }
}
