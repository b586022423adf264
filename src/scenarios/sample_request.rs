/// Scores the reference request against the sample bundle and checks every stage of the decision:
/// the derived categories, the 13 features, the CTR gate and the final price.

use bidprice::engine::{BidDecision, BidEngine, DecisionPolicy};
use bidprice::features::{AdType, FEATURE_COUNT};
use bidprice::logger::{LogEvent, Logger};
use bidprice::request::BidRequest;
use bidprice::sample;
use bidprice::logln;
use crate::scenarios::Validations;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "sample_request",
    run,
});

/// Price the sample bundle gives the reference request
const EXPECTED_PRICE: f64 = 64.0;

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = sample::sample_bundle()?;
    let raw = sample::sample_request_json()?;
    let request = BidRequest::parse(&raw)?;
    let mut checks = Validations::new(scenario_name);

    logln!(logger, LogEvent::Scenario, "Model bank: {}", bundle.models.summary());

    let transformer = bundle.transformer();
    let derived = transformer.derive(&request)?;
    checks.check(logger,
        derived.device == "windows" && derived.browser == "firefox",
        format!("User agent classified as {}/{}", derived.device, derived.browser),
        format!("User agent classified as {}/{}, expected windows/firefox", derived.device, derived.browser));
    checks.check(logger,
        derived.ad_type == AdType::Square,
        format!("300x250 slot is {}", derived.ad_type),
        format!("300x250 slot is {}, expected square", derived.ad_type));
    checks.check(logger,
        derived.time_block == 0 && derived.day == "6",
        format!("Timestamp falls in block {} of day {}", derived.time_block, derived.day),
        format!("Timestamp falls in block {} of day {}, expected block 0 of day 6", derived.time_block, derived.day));

    let transformed = transformer.transform(&request, logger)?;
    checks.check(logger,
        transformed.features.len() == FEATURE_COUNT,
        format!("Feature vector has {} values", FEATURE_COUNT),
        format!("Feature vector has {} values, expected {}", transformed.features.len(), FEATURE_COUNT));
    logln!(logger, LogEvent::Scenario, "Features: {}", transformed.features);

    let engine = BidEngine::new(&bundle, DecisionPolicy::default());
    let decision = engine.decide(&request, logger)?;
    match decision {
        BidDecision::Bid { price, ctr, cvr, multiplier, .. } => {
            checks.check(logger,
                (price - EXPECTED_PRICE).abs() < 1e-9,
                format!("Reference request bids {:.4} (ctr {:.4})", price, ctr),
                format!("Reference request bids {:.4}, expected {:.4}", price, EXPECTED_PRICE));
            checks.check(logger,
                cvr.is_none() && multiplier == 1.0,
                "Advertiser 3427 has no CVR model and no multiplier".to_string(),
                format!("Advertiser 3427 got cvr {:?} and multiplier {}", cvr, multiplier));
        }
        BidDecision::Abstain { ctr } => {
            checks.check(logger, false, String::new(),
                format!("Reference request abstained with ctr {:.4}", ctr));
        }
    }

    checks.finish()
}
