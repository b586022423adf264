mod scenarios;
mod charts;

use bidprice::artifacts::ArtifactBundle;
use bidprice::config::BidderConfig;
use bidprice::engine::{BidEngine, DecisionPolicy};
use bidprice::logger::{Logger, LogEvent, ConsoleReceiver, FileReceiver, sanitize_filename};
use bidprice::request::RawBidRequest;
use bidprice::sample;
use bidprice::utils::{RAND_SEED, TOTAL_REQUESTS_SCORED};
use bidprice::{log, logln};
use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use scenarios::get_scenario_catalog;

#[derive(Parser)]
#[command(author, version, about = "Real-time bid-price predictor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Score one request against artifacts named in a configuration file
    Score {
        /// Bidder configuration (JSON)
        #[arg(long)]
        config: PathBuf,
        /// Raw bid request (JSON)
        #[arg(long)]
        request: PathBuf,
        /// Also write per-request detail to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Run validation scenarios against the sample bundle
    Scenario {
        /// Scenario short name, or "all"
        name: String,
        /// Number of seeded iterations per scenario
        #[arg(default_value_t = 1)]
        iterations: u64,
        /// First seed
        #[arg(default_value_t = 0)]
        start_iteration: u64,
        /// Stop at the first failing iteration
        #[arg(long)]
        fastbreak: bool,
    },
    /// Histograms of scored synthetic traffic
    Charts,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Command::Score { config, request, log_file }) => score(&config, &request, log_file.as_deref()),
        Some(Command::Scenario { name, iterations, start_iteration, fastbreak }) => {
            run_scenarios(&name, iterations, start_iteration, fastbreak)
        }
        Some(Command::Charts) => charts::generate_all_histograms()
            .map(|()| println!("All histogram generation completed successfully.")),
        None => score_sample(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Load the configured artifacts, score one request and print the price or `abstain`
fn score(config_path: &Path, request_path: &Path, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let mut logger = Logger::new();
    logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Load]));
    if let Some(path) = log_file {
        logger.add_receiver(FileReceiver::new(path, vec![LogEvent::Request, LogEvent::Decision, LogEvent::Load])?);
    }

    let config = BidderConfig::from_file(config_path)?;
    let bundle = ArtifactBundle::load(&config, &mut logger)?;
    let engine = BidEngine::new(&bundle, DecisionPolicy::from(&config));

    let text = fs::read_to_string(request_path)?;
    let raw: RawBidRequest = serde_json::from_str(&text)?;
    let decision = engine.decide_raw(&raw, &mut logger)?;
    logger.flush()?;

    println!("{}", decision);
    Ok(())
}

/// Score the reference request against the embedded sample bundle
fn score_sample() -> Result<(), Box<dyn Error>> {
    let mut logger = Logger::new();
    logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Request, LogEvent::Decision, LogEvent::Load]));

    let bundle = sample::sample_bundle()?;
    logln!(&mut logger, LogEvent::Load, "Sample bundle: {}", bundle.models.summary());
    let engine = BidEngine::new(&bundle, DecisionPolicy::default());
    let decision = engine.decide_raw(&sample::sample_raw_request(), &mut logger)?;

    println!("Bid price: {}", decision);
    Ok(())
}

fn run_scenarios(scenario_arg: &str, iterations: u64, start_iteration: u64, fastbreak: bool) -> Result<(), Box<dyn Error>> {
    let all_scenarios = get_scenario_catalog();

    // Filter scenarios: if "all", use all scenarios; otherwise filter to the named scenario
    let scenarios: Vec<_> = if scenario_arg == "all" {
        all_scenarios.clone()
    } else {
        match all_scenarios.iter().find(|s| s.short_name == scenario_arg) {
            Some(scenario) => vec![scenario.clone()],
            None => {
                let names: Vec<&str> = all_scenarios.iter().map(|s| s.short_name).collect();
                return Err(format!("Scenario '{}' not found. Available scenarios: {}", scenario_arg, names.join(", ")).into());
            }
        }
    };

    // Scenario-level detail only on console for a single named scenario run once
    let mut logger = Logger::new();
    if scenario_arg != "all" && iterations == 1 {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation, LogEvent::Scenario]));
    } else {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
    }
    let summary_receiver_id = logger.add_receiver(FileReceiver::new(&PathBuf::from("log/summary.log"), vec![LogEvent::Validation])?);

    TOTAL_REQUESTS_SCORED.store(0, Ordering::Relaxed);

    if scenario_arg == "all" {
        logln!(&mut logger, LogEvent::Validation, "Running all scenarios {} time(s)...\n", iterations);
    } else {
        logln!(&mut logger, LogEvent::Validation, "Running scenario '{}' {} time(s)...\n", scenario_arg, iterations);
    }

    let mut failures = 0;
    'scenarios: for scenario in &scenarios {
        log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);

        let scenario_log = PathBuf::from(format!("log/{}/scenario.log", sanitize_filename(scenario.short_name)));
        let scenario_receiver_id = logger.add_receiver(FileReceiver::new(&scenario_log, vec![LogEvent::Scenario])?);

        for i in start_iteration..(start_iteration + iterations) {
            if iterations > 1 {
                log!(&mut logger, LogEvent::Validation, "[{}/{}] ", i - start_iteration + 1, iterations);
            }

            RAND_SEED.store(i, Ordering::Relaxed);

            match (scenario.run)(scenario.short_name, &mut logger) {
                Ok(()) => {
                    if iterations > 1 {
                        logln!(&mut logger, LogEvent::Validation, "✓");
                    } else {
                        logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
                    }
                }
                Err(e) => {
                    failures += 1;
                    if iterations > 1 {
                        logln!(&mut logger, LogEvent::Validation, "✗");
                    } else {
                        logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                    }

                    if fastbreak {
                        logger.remove_receiver(scenario_receiver_id);
                        logln!(&mut logger, LogEvent::Validation, "\nStopping scenario execution due to failure (--fastbreak enabled)");
                        logln!(&mut logger, LogEvent::Validation, "Error at iteration {}/{} (seed {}): {}",
                            i - start_iteration + 1, iterations, i, e);
                        break 'scenarios;
                    }
                }
            }

            // Flush so the validation line reaches summary.log
            let _ = logger.flush();
        }

        logger.remove_receiver(scenario_receiver_id);
    }

    logln!(&mut logger, LogEvent::Validation, "\nTotal requests scored: {}", TOTAL_REQUESTS_SCORED.load(Ordering::Relaxed));
    let _ = logger.flush();
    logger.remove_receiver(summary_receiver_id);

    if failures > 0 {
        return Err(format!("{} scenario run(s) failed", failures).into());
    }
    Ok(())
}
