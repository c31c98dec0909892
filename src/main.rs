// src/main.rs - thermobox command line: simulate, replay, monitor and score one scenario
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use thermobox::config::{ScenarioConfig, load_config};
use thermobox::dataset;
use thermobox::error::Result;
use thermobox::monitor::monitor_dataset;
use thermobox::simulator::{RunResult, compare_plant, export, run_scenario};
use thermobox::validation::{Evaluator, assert_within};

#[derive(Parser, Debug)]
#[command(name = "thermobox", about = "Closed-loop temperature control for a heated box.")]
struct Cli {
    /// Scenario TOML file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Parameter override (e.g. --param controller.kp=2.5)
    #[arg(long, global = true, value_parser = parse_key_val, number_of_values = 1)]
    param: Vec<(String, String)>,

    /// Write the run trace as CSV
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Log every step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller against the plant model
    Simulate,
    /// Feed a recorded dataset through the controller
    Replay {
        #[arg(short, long)]
        dataset: PathBuf,
    },
    /// Compare the plant model with a recorded dataset
    Fidelity {
        #[arg(short, long)]
        dataset: PathBuf,
    },
    /// Track a recorded dataset with the plant model and flag anomalies
    Monitor {
        #[arg(short, long)]
        dataset: PathBuf,
    },
    /// Run the scenario (replaying when a dataset is given) and check its tolerances
    Validate {
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.find('=') {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].to_string())),
        None => Err(format!("Invalid KEY=VAL: no `=` found in '{}'.", s)),
    }
}

fn load_scenario(cli: &Cli) -> Result<ScenarioConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading scenario from: {}", path.display());
            load_config(path)?
        }
        None => ScenarioConfig::default(),
    };
    for (key, value) in &cli.param {
        tracing::info!("Override {}={}", key, value);
        config.apply_override(key, value)?;
    }
    config.validate()?;
    Ok(config)
}

fn print_trace(result: &RunResult) {
    println!("{:>10} {:>8} {:>10} {:>8} {:>9}", "time", "target", "measured", "power", "logged");
    for s in result.samples() {
        let logged = s.reference.map_or_else(|| "-".to_string(), |r| format!("{r:.3}"));
        println!(
            "{:>10.2} {:>8.2} {:>10.3} {:>8.3} {:>9}",
            s.timestamp, s.target, s.measured, s.commanded, logged
        );
    }
}

fn finish_run(cli: &Cli, config: &ScenarioConfig, result: &RunResult) -> Result<()> {
    if !config.output.headless {
        print_trace(result);
    }
    if let Some(path) = &cli.output {
        export::write_trace_file(result, path)?;
    }
    Ok(())
}

fn execute(cli: &Cli) -> Result<bool> {
    let config = load_scenario(cli)?;
    match &cli.command {
        Commands::Simulate => {
            let result = run_scenario(&config, None)?;
            finish_run(cli, &config, &result)?;
            if let Some(last) = result.samples().last() {
                println!("Final temperature {:.3}°C (target {:.2}°C)", last.measured, last.target);
            }
            Ok(true)
        }
        Commands::Replay { dataset } => {
            let dataset = dataset::load(dataset)?;
            let result = run_scenario(&config, Some(&dataset))?;
            finish_run(cli, &config, &result)?;
            let metrics = Evaluator::new(config.simulation.settling_band)?.evaluate(&result);
            if let Some(deviation) = metrics.command_deviation {
                println!("Replayed {} samples, max command deviation {:.4}", result.len(), deviation);
            }
            Ok(true)
        }
        Commands::Fidelity { dataset } => {
            let dataset = dataset::load(dataset)?;
            let fidelity = compare_plant(config.plant.to_state()?, &dataset)?;
            println!(
                "{}: rmse {:.4}°C, max error {:.4}°C over {} samples",
                fidelity.dataset, fidelity.rmse, fidelity.max_abs_error, fidelity.samples
            );
            Ok(true)
        }
        Commands::Monitor { dataset } => {
            let dataset = dataset::load(dataset)?;
            let report = monitor_dataset(config.plant.to_state()?, &dataset, &config.monitor)?;
            for (first, last) in report.anomaly_windows() {
                println!("anomaly {:>10.2} .. {:<10.2}", first, last);
            }
            println!(
                "{}: {} anomalous of {} samples, innovation rmse {:.4}°C",
                report.dataset,
                report.anomalies,
                report.samples.len(),
                report.innovation_rmse
            );
            Ok(report.anomalies == 0)
        }
        Commands::Validate { dataset } => {
            let dataset = dataset.as_ref().map(dataset::load).transpose()?;
            let result = run_scenario(&config, dataset.as_ref())?;
            finish_run(cli, &config, &result)?;
            let metrics = Evaluator::new(config.simulation.settling_band)?.evaluate(&result);
            let report = assert_within(&metrics, &config.tolerance);
            print!("{report}");
            println!("{}", if report.passed() { "PASS" } else { "FAIL" });
            Ok(report.passed())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    match execute(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(2)
        }
    }
}
