use std::path::{Path, PathBuf};

use clap::Parser;
use libdice::{DieType, EngineConfig, SessionManager};
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// CLI for physically simulated polyhedral dice
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Dice expressions to roll (format: 2D6, 1D20, etc.)
    #[arg(required = true, value_parser = parse_dice_notation)]
    dice_expressions: Vec<DiceNotation>,

    /// Output format: text, json, csv
    #[arg(short, long, default_value = "text", value_parser = ["text", "json", "csv"])]
    output: String,

    /// Verbose output (debug logging; RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    /// Mass for each die, overriding the config file
    #[arg(long)]
    mass: Option<f32>,

    /// Number of rolls for batch mode
    #[arg(long, default_value_t = 1)]
    batch: usize,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Fixed simulation step in seconds
    #[arg(long, default_value_t = 1.0 / 120.0)]
    dt: f32,

    /// JSON engine configuration; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RollResult {
    die_type: String,
    value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimulationResult {
    results: Vec<RollResult>,
    total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DiceNotation {
    count: usize,
    die: DieType,
}

/// Parse dice notation like 2D6, 1D20, etc.
fn parse_dice_notation(s: &str) -> Result<DiceNotation, String> {
    let upper = s.to_uppercase();
    let Some((count_str, sides_str)) = upper.split_once('D') else {
        return Err(format!("Invalid dice notation: {s}. Format should be like 2D6"));
    };
    if count_str.is_empty() || sides_str.is_empty() {
        return Err(format!("Invalid dice notation: {s}"));
    }

    let count: usize = count_str
        .parse()
        .map_err(|_| format!("Invalid count in dice notation: {s}"))?;
    let sides: u32 = sides_str
        .parse()
        .map_err(|_| format!("Invalid sides in dice notation: {s}"))?;

    if count == 0 {
        return Err(format!("Invalid count: {count}. Must be greater than 0"));
    }
    let die = DieType::from_sides(sides)
        .map_err(|e| format!("{e}. Supported: 4, 6, 8, 10, 12, 20"))?;

    Ok(DiceNotation { count, die })
}

fn load_config(
    path: Option<&Path>,
    mass: Option<f32>,
) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        }
        None => EngineConfig::default(),
    };
    if let Some(mass) = mass {
        config.body.mass = mass;
    }
    Ok(config)
}

fn run_simulation(args: &Args) -> Result<Vec<SimulationResult>, Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref(), args.mass)?;
    match args.seed {
        Some(seed) => run_batches(args, config, StdRng::seed_from_u64(seed)),
        None => run_batches(args, config, OsRng),
    }
}

fn run_batches<R: Rng>(
    args: &Args,
    config: EngineConfig,
    rng: R,
) -> Result<Vec<SimulationResult>, Box<dyn std::error::Error>> {
    if args.batch == 0 {
        return Err("Invalid batch: 0. Must be greater than 0".into());
    }
    if !(args.dt > 0.0) {
        return Err(format!("Invalid step: {}. Must be positive", args.dt).into());
    }
    // one step past the hard timeout
    let max_steps = (config.roll.timeout / args.dt).ceil() as usize + 1;
    let specs: Vec<(DieType, usize)> = args
        .dice_expressions
        .iter()
        .map(|n| (n.die, n.count))
        .collect();

    let mut manager = SessionManager::new(config, rng)?;
    let mut all_results = Vec::with_capacity(args.batch);
    for batch in 0..args.batch {
        let handle = manager.start_roll(&specs)?;
        manager.run_until_complete(handle, args.dt, max_steps)?;
        let report = manager
            .session(handle)
            .and_then(|s| s.report())
            .ok_or("roll session vanished")?;
        manager.cancel(handle)?;
        debug!(batch, total = report.total, "batch done");

        all_results.push(SimulationResult {
            results: report
                .rolls
                .iter()
                .map(|&(die, value)| RollResult {
                    die_type: die.to_string(),
                    value,
                })
                .collect(),
            total: report.total,
        });
    }

    Ok(all_results)
}

fn format_output(
    results: Vec<SimulationResult>,
    output_format: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    match output_format {
        "text" => {
            let mut output = String::new();
            for (i, result) in results.iter().enumerate() {
                if results.len() > 1 {
                    output.push_str(&format!("Roll {}: ", i + 1));
                }

                let values: Vec<String> = result
                    .results
                    .iter()
                    .map(|r| format!("{}: {}", r.die_type, r.value))
                    .collect();
                output.push_str(&format!("{}\n", values.join(", ")));

                if results.len() > 1 {
                    output.push_str(&format!("  Total: {}\n", result.total));
                } else {
                    output.push_str(&format!("Total: {}\n", result.total));
                }
            }
            Ok(output)
        }
        "json" => {
            if results.len() == 1 {
                Ok(serde_json::to_string_pretty(&results[0])?)
            } else {
                Ok(serde_json::to_string_pretty(&results)?)
            }
        }
        "csv" => {
            let mut output = String::from("Roll,Dice Type,Value\n");
            for (i, result) in results.iter().enumerate() {
                for roll in &result.results {
                    output.push_str(&format!("{},{},{}\n", i + 1, roll.die_type, roll.value));
                }
            }
            Ok(output)
        }
        _ => Err("Invalid output format".into()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    info!(dice = ?args.dice_expressions, batch = args.batch, seed = ?args.seed, "rolling");

    match run_simulation(&args) {
        Ok(results) => {
            let output = format_output(results, &args.output)?;
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error during simulation: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<SimulationResult> {
        vec![SimulationResult {
            results: vec![
                RollResult {
                    die_type: "D6".to_string(),
                    value: 4,
                },
                RollResult {
                    die_type: "D20".to_string(),
                    value: 15,
                },
            ],
            total: 19,
        }]
    }

    #[test]
    fn test_parse_dice_notation_valid() {
        assert!(parse_dice_notation("2D6").is_ok());
        assert!(parse_dice_notation("1D20").is_ok());
        assert!(parse_dice_notation("3D4").is_ok());
        assert!(parse_dice_notation("1D12").is_ok());
        assert!(parse_dice_notation("10D8").is_ok());
        assert!(parse_dice_notation("2D10").is_ok());
    }

    #[test]
    fn test_parse_dice_notation_invalid_format() {
        assert!(parse_dice_notation("2D").is_err());
        assert!(parse_dice_notation("D6").is_err());
        assert!(parse_dice_notation("26").is_err());
        assert!(parse_dice_notation("").is_err());
        assert!(parse_dice_notation("D").is_err());
        assert!(parse_dice_notation("2D6D6").is_err());
    }

    #[test]
    fn test_parse_dice_notation_invalid_values() {
        assert!(parse_dice_notation("0D6").is_err()); // Count must be > 0
        assert!(parse_dice_notation("2D3").is_err());
        assert!(parse_dice_notation("2D7").is_err());
        assert!(parse_dice_notation("2D100").is_err());
        assert!(parse_dice_notation("-1D6").is_err());
    }

    #[test]
    fn test_parse_dice_notation_lowercase() {
        assert_eq!(
            parse_dice_notation("2d6"),
            Ok(DiceNotation {
                count: 2,
                die: DieType::Cube
            })
        );
    }

    #[test]
    fn test_format_output_text() {
        let output = format_output(sample(), "text").unwrap();
        assert!(output.contains("D6: 4"));
        assert!(output.contains("D20: 15"));
        assert!(output.contains("Total: 19"));
    }

    #[test]
    fn test_format_output_json() {
        let output = format_output(sample(), "json").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["total"], 19);
        assert_eq!(parsed["results"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["results"][0]["die_type"], "D6");
        assert_eq!(parsed["results"][0]["value"], 4);
        assert_eq!(parsed["results"][1]["die_type"], "D20");
        assert_eq!(parsed["results"][1]["value"], 15);
    }

    #[test]
    fn test_format_output_csv() {
        let output = format_output(sample(), "csv").unwrap();
        assert!(output.contains("Roll,Dice Type,Value"));
        assert!(output.contains("1,D6,4"));
        assert!(output.contains("1,D20,15"));
    }

    #[test]
    fn test_format_output_batch_text() {
        let mut results = sample();
        results.extend(sample());
        let output = format_output(results, "text").unwrap();
        assert!(output.contains("Roll 2: D6: 4, D20: 15"));
        assert!(output.contains("  Total: 19"));
    }

    #[test]
    fn test_format_output_invalid_format() {
        assert!(format_output(sample(), "invalid").is_err());
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let args = Args::parse_from(["polydice", "2d6", "1d20", "--seed", "42", "--batch", "2"]);
        let first = run_simulation(&args).unwrap();
        let second = run_simulation(&args).unwrap();
        assert_eq!(first.len(), 2);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.total, b.total);
            assert_eq!(a.results.len(), 3);
            assert_eq!(a.results[2].die_type, "D20");
            assert!((1..=20).contains(&a.results[2].value));
            assert_eq!(a.total, a.results.iter().map(|r| r.value).sum::<u32>());
        }
    }

    #[test]
    fn test_config_file_and_mass_override() {
        let name = format!("polydice-config-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, r#"{ "die_scale": 0.3, "body": { "mass": 1.0 } }"#).unwrap();
        let config = load_config(Some(&path), Some(2.0)).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.die_scale, 0.3);
        assert_eq!(config.body.mass, 2.0);

        let config = load_config(None, None).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_invalid_mass_is_reported() {
        let args = Args::parse_from(["polydice", "1d6", "--mass=-1", "--seed", "1"]);
        assert!(run_simulation(&args).is_err());
    }
}
