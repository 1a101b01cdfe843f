use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use llm_estimate::{Error, EstimationEngine, ExportFormat, SettingsLoader};

/// CLI
#[derive(Debug, Parser)]
#[command(name = "llm-estimate")]
#[command(about = "Token, cost and context-window estimates for LLM API usage.", long_about = None)]
struct Cli {
    /// Settings file (defaults to the platform config directory, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Estimate tokens from a word count
    Tokens {
        #[arg(allow_negative_numbers = true)]
        words: i64,
    },
    /// Estimate words from a token count
    Words {
        #[arg(allow_negative_numbers = true)]
        tokens: i64,
    },
    /// Quote the cost of an API call
    Cost {
        model: String,
        #[arg(allow_negative_numbers = true)]
        input_tokens: i64,
        #[arg(allow_negative_numbers = true)]
        output_tokens: i64,
        /// Number of identical calls
        #[arg(long, default_value_t = 1)]
        calls: u64,
    },
    /// Quote a prompt before sending it
    Estimate {
        model: String,
        prompt: String,
        #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
        max_output_tokens: i64,
    },
    /// Maximum conversation turns that fit a context window
    Turns {
        /// Context window in tokens
        #[arg(long, allow_negative_numbers = true, conflicts_with = "model", required_unless_present = "model")]
        window: Option<i64>,
        /// Use a registered model's context window
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        system: i64,
        #[arg(long, allow_negative_numbers = true)]
        user: i64,
        #[arg(long, allow_negative_numbers = true)]
        assistant: i64,
    },
    /// Cheapest model that fits a request
    Select {
        #[arg(allow_negative_numbers = true)]
        input_tokens: i64,
        #[arg(allow_negative_numbers = true)]
        output_tokens: i64,
        /// Show every fitting model
        #[arg(long)]
        all: bool,
    },
    /// Context window status for a model at a given usage
    Window {
        model: String,
        used_tokens: u64,
        /// Check whether this many more tokens fit
        #[arg(long, default_value_t = 0)]
        add: u64,
    },
    /// List registered models and prices
    Models,
    /// Price a JSON list of calls and print the session report
    Track {
        /// File with `[{"model": ..., "input_tokens": ..., "output_tokens": ...}]`
        calls: PathBuf,
        /// Write the report to this file
        #[arg(long)]
        export: Option<PathBuf>,
        /// Export format: json or csv
        #[arg(long, default_value = "json")]
        format: ExportFormat,
    },
}

#[derive(Debug, Deserialize)]
struct CallInput {
    model: String,
    input_tokens: i64,
    output_tokens: i64,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_engine(config: Option<PathBuf>) -> Result<EstimationEngine> {
    let loader = match config {
        Some(path) => SettingsLoader::new().file(path),
        None => SettingsLoader::new().default_file(),
    };
    let settings = loader.env().load().context("failed to load settings")?;
    Ok(EstimationEngine::from_settings(&settings)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let engine = load_engine(cli.config)?;
    let json = cli.json;

    match cli.command {
        Commands::Tokens { words } => {
            let estimate = engine.estimate(words)?;
            if json {
                print_json(&estimate)?;
            } else {
                println!("{} words ≈ {} tokens", estimate.word_count, estimate.estimated_tokens);
            }
        }
        Commands::Words { tokens } => {
            let words = engine.estimate_words(tokens)?;
            if json {
                print_json(&serde_json::json!({ "token_count": tokens, "estimated_words": words }))?;
            } else {
                println!("{} tokens ≈ {} words", tokens, words);
            }
        }
        Commands::Cost {
            model,
            input_tokens,
            output_tokens,
            calls,
        } => {
            let quote = engine
                .calculate_cost(&model, input_tokens, output_tokens)?
                .scaled(calls);
            if json {
                print_json(&quote)?;
            } else {
                println!("Model:   {}", quote.model_name);
                println!("Calls:   {}", calls);
                println!("Input:   {} tokens  ${}", quote.input_tokens, quote.input_cost);
                println!("Output:  {} tokens  ${}", quote.output_tokens, quote.output_cost);
                println!("Total:   ${}", quote.total_cost);
            }
        }
        Commands::Estimate {
            model,
            prompt,
            max_output_tokens,
        } => {
            let quote = engine.estimate_text_cost(&model, &prompt, max_output_tokens)?;
            if json {
                print_json(&quote)?;
            } else {
                println!(
                    "~{} prompt tokens + up to {} output tokens on {}: ${}",
                    quote.input_tokens, quote.output_tokens, quote.model_name, quote.total_cost
                );
            }
        }
        Commands::Turns {
            window,
            model,
            system,
            user,
            assistant,
        } => {
            let planned = match (&model, window) {
                (Some(model), _) => engine.plan_turns_for_model(model, system, user, assistant),
                (None, Some(window)) => engine.plan_turns(window, system, user, assistant),
                (None, None) => unreachable!("clap requires --window or --model"),
            };
            match planned {
                Ok(budget) if json => print_json(&budget)?,
                Ok(budget) => println!(
                    "{} turns fit ({} of {} tokens used)",
                    budget.max_turns,
                    budget.used_tokens(),
                    budget.window_tokens
                ),
                Err(Error::UnboundedBudget) if json => {
                    print_json(&serde_json::json!({ "max_turns": null, "unbounded": true }))?
                }
                Err(Error::UnboundedBudget) => {
                    println!("No turn limit: a turn costs zero tokens")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Select {
            input_tokens,
            output_tokens,
            all,
        } => {
            if all {
                let ranked = engine.selector().rank(input_tokens, output_tokens)?;
                if json {
                    print_json(&ranked)?;
                } else {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["Model", "Window", "Cost (USD)"]);
                    for selection in &ranked {
                        table.add_row(vec![
                            Cell::new(&selection.model),
                            Cell::new(selection.context_window),
                            Cell::new(selection.quote.total_cost),
                        ]);
                    }
                    println!("{table}");
                }
            } else {
                let selection = engine.cheapest_fit(input_tokens, output_tokens)?;
                if json {
                    print_json(&selection)?;
                } else {
                    println!(
                        "{} (window {}): ${}",
                        selection.model, selection.context_window, selection.quote.total_cost
                    );
                }
            }
        }
        Commands::Window {
            model,
            used_tokens,
            add,
        } => {
            let mut window = engine.context_window(&model)?;
            window.update(used_tokens);
            let status = window.status();
            if json {
                print_json(&serde_json::json!({
                    "model": model,
                    "limit": window.limit(),
                    "usage": window.usage(),
                    "remaining": window.remaining(),
                    "window": status,
                    "should_proceed": status.should_proceed(),
                    "fits_additional": window.can_fit(add),
                }))?;
            } else {
                match status.utilization() {
                    Some(utilization) => println!(
                        "{}: {} of {} tokens used ({:.1}%), {} remaining",
                        model,
                        window.usage(),
                        window.limit(),
                        utilization * 100.0,
                        window.remaining()
                    ),
                    None => println!(
                        "{}: {} tokens exceed the {} token window",
                        model,
                        window.usage(),
                        window.limit()
                    ),
                }
                if add > 0 {
                    let verdict = if window.can_fit(add) { "fit" } else { "do not fit" };
                    println!("{} more tokens {}", add, verdict);
                }
            }
        }
        Commands::Models => {
            let models: Vec<_> = engine.registry().all().collect();
            if json {
                print_json(&models)?;
            } else {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec![
                    "Model",
                    "Provider",
                    "Kind",
                    "Window",
                    "Input / 1K",
                    "Output / 1K",
                ]);
                for spec in &models {
                    table.add_row(vec![
                        Cell::new(&spec.id),
                        Cell::new(spec.provider),
                        Cell::new(spec.kind.as_str()),
                        Cell::new(spec.context_window),
                        Cell::new(spec.pricing.input_price_per_1k),
                        Cell::new(spec.pricing.output_price_per_1k),
                    ]);
                }
                println!("{table}");
                println!("\n{} models total", models.len());
            }
        }
        Commands::Track {
            calls,
            export,
            format,
        } => {
            let content = std::fs::read_to_string(&calls)
                .with_context(|| format!("failed to read {}", calls.display()))?;
            let inputs: Vec<CallInput> = serde_json::from_str(&content)?;

            let tracker = engine.tracker();
            for call in &inputs {
                tracker.record_with(
                    &call.model,
                    call.input_tokens,
                    call.output_tokens,
                    call.metadata.clone(),
                )?;
            }

            if let Some(path) = export {
                tracker.export(&path, format)?;
            }

            let report = tracker.report();
            if json {
                print_json(&report)?;
            } else {
                println!("Session: {}", report.session_name);
                println!("Total Calls: {}", report.total_calls);
                println!("Total Tokens: {}", report.total_tokens);
                println!("Total Cost: ${}", report.total_cost);
                for (model, usage) in &report.by_model {
                    println!(
                        "  {}: {} calls, {} tokens, ${}",
                        model,
                        usage.calls,
                        usage.total_tokens(),
                        usage.cost
                    );
                }
            }
        }
    }

    Ok(())
}
