/// Checks the conversion multiplier over synthetic traffic. Advertisers with a CVR model get the
/// multiplier exactly when their predicted CVR is above the threshold; advertisers without one
/// are never scored for CVR and always bid the unmultiplied base price (or the floor markup).

use std::collections::BTreeMap;

use bidprice::engine::{BidDecision, BidEngine, DecisionPolicy};
use bidprice::logger::{LogEvent, Logger};
use bidprice::request::BidRequest;
use bidprice::sample;
use bidprice::synthetic::{RequestGenerator, TrafficParams};
use bidprice::logln;
use crate::scenarios::Validations;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "cvr_multiplier",
    run,
});

const NUM_REQUESTS: usize = 5000;

#[derive(Default)]
struct AdvertiserStats {
    bids: usize,
    cvr_scored: usize,
    multiplied: usize,
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = sample::sample_bundle()?;
    let policy = DecisionPolicy::default();
    let engine = BidEngine::new(&bundle, policy);
    let mut generator = RequestGenerator::new(TrafficParams::default(), 1)?;
    let mut checks = Validations::new(scenario_name);
    let mut quiet = Logger::new();

    let mut stats: BTreeMap<String, AdvertiserStats> = BTreeMap::new();
    let mut mismatches = 0;
    let mut uncovered = 0;

    for raw in generator.take(NUM_REQUESTS) {
        let request = BidRequest::parse(&raw)?;
        let has_cvr_model = bundle.models.cvr_model(&request.advertiser_id).is_some();
        let entry = stats.entry(request.advertiser_id.to_string()).or_default();

        if let BidDecision::Bid { multiplier, cvr, .. } = engine.decide(&request, &mut quiet)? {
            entry.bids += 1;
            match cvr {
                Some(cvr) => {
                    entry.cvr_scored += 1;
                    let expected = if cvr > policy.cvr_threshold { policy.cvr_multiplier } else { 1.0 };
                    if expected == policy.cvr_multiplier {
                        entry.multiplied += 1;
                    }
                    if multiplier != expected || !has_cvr_model {
                        mismatches += 1;
                    }
                }
                None => {
                    if multiplier != 1.0 || has_cvr_model {
                        uncovered += 1;
                    }
                }
            }
        }
    }

    for (advertiser, s) in &stats {
        logln!(logger, LogEvent::Scenario, "Advertiser {}: {} bids, {} CVR-scored, {} multiplied",
            advertiser, s.bids, s.cvr_scored, s.multiplied);
    }

    let scored: usize = stats.values().map(|s| s.cvr_scored).sum();
    let multiplied: usize = stats.values().map(|s| s.multiplied).sum();

    checks.check(logger, mismatches == 0,
        format!("Multiplier is {} exactly when CVR > {}", policy.cvr_multiplier, policy.cvr_threshold),
        format!("{} bids have a multiplier that disagrees with their CVR", mismatches));
    checks.check(logger, uncovered == 0,
        "Only advertisers with a CVR model are CVR-scored".to_string(),
        format!("{} bids skipped or invented a CVR score", uncovered));
    checks.check(logger, multiplied > 0 && multiplied < scored,
        format!("{} of {} CVR-scored bids were multiplied", multiplied, scored),
        format!("CVR branch not exercised in both directions: {} of {} multiplied", multiplied, scored));

    checks.finish()
}
