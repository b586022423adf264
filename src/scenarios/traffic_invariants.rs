/// Runs seeded synthetic traffic through the sample bundle and checks the decision invariants
/// hold for every request:
///
/// - every well-formed request gets a decision, never an error
/// - abstentions are exactly the requests with CTR below the threshold
/// - every bid is at least the floor markup times the floor price
/// - every bid is at least the base price times its multiplier
/// - the feature vector always has 13 values and the time block stays within the day
///
/// The share of abstentions is reported and must be neither 0 nor 1 for the traffic to exercise
/// both branches.

use bidprice::engine::{BidDecision, BidEngine, DecisionPolicy};
use bidprice::features::FEATURE_COUNT;
use bidprice::logger::{LogEvent, Logger};
use bidprice::request::{BidRequest, MAX_TIME_BLOCK};
use bidprice::sample;
use bidprice::synthetic::{RequestGenerator, TrafficParams};
use bidprice::logln;
use crate::scenarios::Validations;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "traffic_invariants",
    run,
});

const NUM_REQUESTS: usize = 5000;

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = sample::sample_bundle()?;
    let policy = DecisionPolicy::default();
    let engine = BidEngine::new(&bundle, policy);
    let transformer = bundle.transformer();
    let mut generator = RequestGenerator::new(TrafficParams::default(), 0)?;
    let mut checks = Validations::new(scenario_name);

    // Per-request detail is too verbose for the scenario log
    let mut quiet = Logger::new();

    let mut errors = 0;
    let mut abstains = 0;
    let mut bids = 0;
    let mut gate_violations = 0;
    let mut floor_violations = 0;
    let mut base_violations = 0;
    let mut vector_violations = 0;
    let mut max_time_block = 0;
    let mut total_price = 0.0;

    for raw in generator.take(NUM_REQUESTS) {
        let request = BidRequest::parse(&raw)?;
        max_time_block = max_time_block.max(request.timestamp.time_block());

        match transformer.transform(&request, &mut quiet) {
            Ok(transformed) if transformed.features.len() == FEATURE_COUNT
                && transformed.features.as_slice().iter().all(|v| v.is_finite()) => {}
            _ => vector_violations += 1,
        }

        let floor = policy.floor_markup * request.ad_slot_floor_price as f64;
        match engine.decide(&request, &mut quiet) {
            Ok(BidDecision::Abstain { ctr }) => {
                abstains += 1;
                if ctr >= policy.ctr_threshold {
                    gate_violations += 1;
                }
            }
            Ok(BidDecision::Bid { price, base_price, multiplier, ctr, .. }) => {
                bids += 1;
                total_price += price;
                if ctr < policy.ctr_threshold {
                    gate_violations += 1;
                }
                if price < floor {
                    floor_violations += 1;
                }
                if price < base_price * multiplier {
                    base_violations += 1;
                }
            }
            Err(e) => {
                errors += 1;
                logln!(logger, LogEvent::Scenario, "{}: {}", request.bid_id, e);
            }
        }
    }

    let abstain_share = abstains as f64 / NUM_REQUESTS as f64;
    logln!(logger, LogEvent::Scenario, "{} requests: {} bids, {} abstentions ({:.1}%), mean bid {:.2}",
        NUM_REQUESTS, bids, abstains, abstain_share * 100.0,
        if bids > 0 { total_price / bids as f64 } else { 0.0 });

    checks.check(logger, errors == 0,
        "Every synthetic request got a decision".to_string(),
        format!("{} synthetic requests failed", errors));
    checks.check(logger, abstains > 0 && bids > 0,
        format!("Both outcomes occur ({:.1}% abstentions)", abstain_share * 100.0),
        format!("Traffic only exercised one outcome: {} bids, {} abstentions", bids, abstains));
    checks.check(logger, gate_violations == 0,
        format!("Abstentions are exactly the requests with CTR below {}", policy.ctr_threshold),
        format!("{} decisions disagree with the CTR threshold", gate_violations));
    checks.check(logger, floor_violations == 0,
        format!("Every bid is at least {} x floor", policy.floor_markup),
        format!("{} bids below {} x floor", floor_violations, policy.floor_markup));
    checks.check(logger, base_violations == 0,
        "Every bid is at least base price x multiplier".to_string(),
        format!("{} bids below base price x multiplier", base_violations));
    checks.check(logger, vector_violations == 0,
        format!("Every request transformed to {} finite features", FEATURE_COUNT),
        format!("{} requests produced a bad feature vector", vector_violations));
    checks.check(logger, max_time_block <= MAX_TIME_BLOCK,
        format!("Largest time block is {}", max_time_block),
        format!("Time block {} is past the end of the day", max_time_block));

    checks.finish()
}
