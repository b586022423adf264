/// Feeds broken requests into a live engine and checks each failure is reported as its own kind,
/// stays scoped to that request, and leaves the engine scoring the next request normally.

use bidprice::engine::{BidEngine, DecisionPolicy};
use bidprice::error::{BidError, RequestError, TransformError};
use bidprice::logger::{LogEvent, Logger};
use bidprice::request::RawBidRequest;
use bidprice::sample;
use bidprice::logln;
use crate::scenarios::Validations;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "error_separation",
    run,
});

struct BrokenRequest {
    name: &'static str,
    request: RawBidRequest,
    expected: fn(&BidError) -> bool,
}

fn broken_requests() -> Vec<BrokenRequest> {
    let base = sample::sample_raw_request();
    vec![
        BrokenRequest {
            name: "unconfigured advertiser",
            request: RawBidRequest { advertiser_id: Some("9999".to_string()), ..base.clone() },
            expected: |e| matches!(e, BidError::MissingCtrModel(_)) && e.is_configuration_error(),
        },
        BrokenRequest {
            name: "non-numeric advertiser",
            request: RawBidRequest { advertiser_id: Some("adv-3427".to_string()), ..base.clone() },
            expected: |e| matches!(e, BidError::Request(RequestError::InvalidModelKey(_))),
        },
        BrokenRequest {
            name: "short timestamp",
            request: RawBidRequest { timestamp: Some("2013060600".to_string()), ..base.clone() },
            expected: |e| matches!(e, BidError::Request(RequestError::MalformedTimestamp { .. })),
        },
        BrokenRequest {
            name: "impossible date",
            request: RawBidRequest { timestamp: Some("20130231000104008".to_string()), ..base.clone() },
            expected: |e| matches!(e, BidError::Request(RequestError::MalformedTimestamp { .. })),
        },
        BrokenRequest {
            name: "textual width",
            request: RawBidRequest { ad_slot_width: Some("wide".to_string()), ..base.clone() },
            expected: |e| matches!(e, BidError::Request(RequestError::InvalidInteger { field: "adSlotWidth", .. })),
        },
        BrokenRequest {
            name: "negative floor",
            request: RawBidRequest { ad_slot_floor_price: Some("-100".to_string()), ..base.clone() },
            expected: |e| matches!(e, BidError::Request(RequestError::NegativeFloorPrice(-100))),
        },
        BrokenRequest {
            name: "missing creative",
            request: RawBidRequest { creative_id: None, ..base.clone() },
            expected: |e| matches!(e, BidError::Request(RequestError::MissingField { .. })),
        },
        BrokenRequest {
            name: "unknown creative",
            request: RawBidRequest { creative_id: Some("ffffffffffffffffffffffffffffffff".to_string()), ..base },
            expected: |e| matches!(e, BidError::Transform(TransformError::UnknownCreative(_))),
        },
    ]
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = sample::sample_bundle()?;
    let engine = BidEngine::new(&bundle, DecisionPolicy::default());
    let reference = sample::sample_raw_request();
    let expected_price = engine.decide_raw(&reference, &mut Logger::new())?.price();
    let mut checks = Validations::new(scenario_name);

    for broken in broken_requests() {
        match engine.decide_raw(&broken.request, &mut Logger::new()) {
            Ok(decision) => checks.check(logger, false, String::new(),
                format!("{}: expected an error, got {}", broken.name, decision)),
            Err(e) => {
                logln!(logger, LogEvent::Scenario, "{}: {}", broken.name, e);
                checks.check(logger, (broken.expected)(&e),
                    format!("{} is reported as {:?}", broken.name, e),
                    format!("{} is reported as unexpected {:?}", broken.name, e));
            }
        }

        let price = engine.decide_raw(&reference, &mut Logger::new())?.price();
        checks.check(logger, price == expected_price,
            format!("Reference request still prices {:?} after {}", price, broken.name),
            format!("Reference request priced {:?} after {}, expected {:?}", price, broken.name, expected_price));
    }

    checks.finish()
}
