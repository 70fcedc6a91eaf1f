use anyhow::Context;
use chrono::NaiveDate;
use clap::{Arg, ArgMatches, Command};
use std::process;

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Sets a custom config file")
}

fn config_path(matches: &ArgMatches) -> &str {
    matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or("config/pipeline.toml")
}

async fn run(matches: ArgMatches) -> anyhow::Result<bool> {
    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let path = config_path(run_matches);
            let date = run_matches.get_one::<NaiveDate>("date").copied();

            let run = lakehouse::run_pipeline(path, date)
                .await
                .with_context(|| format!("pipeline setup failed with config {}", path))?;
            let summary = serde_json::to_string_pretty(&run.summary())?;
            println!("{}", summary);

            if let Some(failure) = &run.failure {
                eprintln!("Pipeline failed at stage {}: {}", failure.stage, failure.error);
            }
            Ok(run.is_success())
        }
        Some(("load-bronze", load_matches)) => {
            let report = lakehouse::run_bronze_load(config_path(load_matches))
                .await
                .context("bronze load failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(true)
        }
        Some(("transform-silver", silver_matches)) => {
            lakehouse::run_silver_transform(config_path(silver_matches))
                .await
                .context("silver transformation failed")?;
            Ok(true)
        }
        _ => anyhow::bail!("No subcommand specified. Use --help for usage information."),
    }
}

#[tokio::main]
async fn main() {
    let matches = Command::new("Weather Pipeline Manager")
        .version("1.0")
        .about("Moves daily weather observations through bronze and silver layers")
        .subcommand(
            Command::new("run")
                .about("Run extract, bronze load and silver transform for one date")
                .arg(config_arg())
                .arg(
                    Arg::new("date")
                        .short('d')
                        .long("date")
                        .value_name("YYYY-MM-DD")
                        .value_parser(clap::value_parser!(NaiveDate))
                        .help("Target date (defaults to yesterday, UTC)"),
                ),
        )
        .subcommand(
            Command::new("load-bronze")
                .about("Load extracted files into the raw table")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("transform-silver")
                .about("Execute the silver procedure")
                .arg(config_arg()),
        )
        .get_matches();

    match run(matches).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Pipeline error: {:#}", e);
            process::exit(1);
        }
    }
}
