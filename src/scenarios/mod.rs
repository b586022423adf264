use std::error::Error;
use bidprice::logger::Logger;

/// Function type for scenario entry functions
pub type ScenarioFn = fn(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn Error>>;

/// Entry in the scenario catalog
#[derive(Clone)]
pub struct ScenarioEntry {
    pub short_name: &'static str,
    pub run: ScenarioFn,
}

// Create an inventory collection for scenario entries
inventory::collect!(ScenarioEntry);

/// Get all registered scenarios from the catalog
pub fn get_scenario_catalog() -> Vec<ScenarioEntry> {
    inventory::iter::<ScenarioEntry>
        .into_iter()
        .map(|entry| entry.clone())
        .collect()
}

/// Collects ✓/✗ validation lines and turns them into the scenario result
pub struct Validations {
    scenario_name: String,
    errors: Vec<String>,
}

impl Validations {
    pub fn new(scenario_name: &str) -> Self {
        Self {
            scenario_name: scenario_name.to_string(),
            errors: Vec::new(),
        }
    }

    /// Log `ok_msg` with ✓ if `passed`, otherwise record `failed_msg` and log it with ✗
    pub fn check(&mut self, logger: &mut Logger, passed: bool, ok_msg: String, failed_msg: String) {
        if passed {
            bidprice::logln!(logger, bidprice::logger::LogEvent::Scenario, "✓ {}", ok_msg);
        } else {
            bidprice::errln!(logger, bidprice::logger::LogEvent::Scenario, "✗ {}", failed_msg);
            self.errors.push(failed_msg);
        }
    }

    pub fn finish(self) -> Result<(), Box<dyn Error>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(format!("Scenario '{}' validation failed:\n{}", self.scenario_name, self.errors.join("\n")).into())
        }
    }
}

// Scenario modules
pub mod sample_request;
pub mod traffic_invariants;
pub mod cvr_multiplier;
pub mod error_separation;
pub mod ad_types;
