/// Walks the ad type bands across their boundaries and checks each slot shape, both directly and
/// as derived by the transformer for a request with that slot.

use bidprice::features::AdType;
use bidprice::logger::{LogEvent, Logger};
use bidprice::request::BidRequest;
use bidprice::sample;
use bidprice::logln;
use crate::scenarios::Validations;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "ad_types",
    run,
});

/// (width, height, expected ad type)
const SLOTS: [(u32, u32, AdType); 14] = [
    (728, 90, AdType::Banner),
    (301, 100, AdType::Banner),
    (300, 100, AdType::Other),
    (250, 100, AdType::Other),
    (200, 100, AdType::Other),
    (199, 100, AdType::Rectangle),
    (300, 250, AdType::Square),
    (121, 100, AdType::Rectangle),
    (120, 100, AdType::Square),
    (100, 100, AdType::Square),
    (80, 100, AdType::Square),
    (79, 100, AdType::Vertical),
    (160, 600, AdType::Vertical),
    (0, 0, AdType::Other),
];

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = sample::sample_bundle()?;
    let transformer = bundle.transformer();
    let mut checks = Validations::new(scenario_name);

    for (width, height, expected) in SLOTS {
        let direct = AdType::from_dimensions(width, height);

        let mut raw = sample::sample_raw_request();
        raw.ad_slot_width = Some(width.to_string());
        raw.ad_slot_height = Some(height.to_string());
        let derived = transformer.derive(&BidRequest::parse(&raw)?)?.ad_type;

        logln!(logger, LogEvent::Scenario, "{}x{}: {}", width, height, direct);
        checks.check(logger, direct == expected && derived == expected,
            format!("{}x{} is {}", width, height, expected),
            format!("{}x{} is {} (derived {}), expected {}", width, height, direct, derived, expected));
    }

    checks.finish()
}
