//! Velojoin CLI
//!
//! Runs a join job file (YAML or JSON) and prints every joined table as JSON.

use clap::{Arg, ArgAction, Command};
use std::process;
use velojoin::velojoin::config::{JobConfig, JoinMethod};
use velojoin::velojoin::error::JoinResult;
use velojoin::velojoin::execution::CollectedOutput;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("velo-join")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Velojoin sort-merge join runner")
        .long_about("Joins the tables of two streams described in a job file and prints the joined tables as JSON.")
        .arg(
            Arg::new("job")
                .help("Job file (.yaml, .yml or .json)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("on")
                .long("on")
                .help("Override the join columns (comma separated)")
                .value_delimiter(','),
        )
        .arg(
            Arg::new("method")
                .long("method")
                .short('m')
                .help("Override the join method (inner or cross)"),
        )
        .arg(
            Arg::new("driver")
                .long("driver")
                .help("Apply parent events through the channel driver")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("buffer")
                .long("buffer")
                .help("Driver channel capacity")
                .value_parser(clap::value_parser!(usize))
                .default_value("64"),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .short('p')
                .help("Pretty-print the JSON output")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let job_path = matches
        .get_one::<String>("job")
        .cloned()
        .unwrap_or_default();
    let on: Option<Vec<String>> = matches
        .get_many::<String>("on")
        .map(|values| values.map(|v| v.trim().to_string()).collect());
    let method = matches.get_one::<String>("method").cloned();
    let use_driver = matches.get_flag("driver");
    let buffer = matches.get_one::<usize>("buffer").copied().unwrap_or(64);
    let pretty = matches.get_flag("pretty");

    match run(&job_path, on, method, use_driver, buffer).await {
        Ok(output) => {
            let tables: Vec<serde_json::Value> =
                output.sorted_tables().iter().map(|t| t.to_json()).collect();
            let rendered = if pretty {
                serde_json::to_string_pretty(&tables)
            } else {
                serde_json::to_string(&tables)
            };
            match rendered {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("❌ Failed to render output: {}", e);
                    process::exit(1);
                }
            }
        }
        Err(error) => {
            eprintln!("❌ Join failed: {}", error);
            process::exit(1);
        }
    }
}

async fn run(
    job_path: &str,
    on: Option<Vec<String>>,
    method: Option<String>,
    use_driver: bool,
    buffer: usize,
) -> JoinResult<CollectedOutput> {
    let mut job = JobConfig::from_file(job_path)?;
    if let Some(on) = on {
        job.join.on = Some(on);
    }
    if let Some(method) = method {
        job.join.method = method.parse::<JoinMethod>()?;
    }

    let output = if use_driver {
        job.run_with_driver(buffer).await?
    } else {
        job.run()?
    };
    if let Some(Err(e)) = &output.finished {
        return Err(e.clone());
    }
    Ok(output)
}
