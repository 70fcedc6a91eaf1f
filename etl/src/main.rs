use chrono::NaiveDate;
use clap::{Arg, Command};
use std::process;


#[tokio::main]
async fn main() {
    let matches = Command::new("Weather Extraction")
        .version("1.0")
        .about("Extracts daily hourly weather into a CSV file")
        .subcommand(
            Command::new("extract")
                .about("Fetch one day of weather for every configured point")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("date")
                        .short('d')
                        .long("date")
                        .value_name("YYYY-MM-DD")
                        .value_parser(clap::value_parser!(NaiveDate))
                        .help("Target date (defaults to yesterday, UTC)"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("extract", extract_matches)) => {
            let config_path = extract_matches.get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/pipeline.toml");
            let date = extract_matches.get_one::<NaiveDate>("date").copied();

            match etl::run_extraction(config_path, date).await {
                Ok(file) => {
                    tracing::info!(path = %file.path.display(), rows = file.row_count, "Extraction finished");
                }
                Err(e) => {
                    eprintln!("Extraction error: {}", e);
                    process::exit(1);
                }
            }
        },

        _ => {
            eprintln!("Please specify a valid subcommand");
            process::exit(1);
        }
    }
}
