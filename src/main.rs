//! tsdb-cli entry point.
//!
//! Runs a query request file through the scheduler with the built-in
//! executors and prints the JSON response.
//!
//! ## CLI Subcommands
//!
//! - `tsdb-cli run <request.json>` - Execute a request (exit 0/1)
//! - `tsdb-cli config show` - Print effective configuration
//! - `tsdb-cli help` / `tsdb-cli version`

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tsdb_core::config as tsdb_config;
use tsdb_core::telemetry;
use tsdb_core::{builtin_handler, Request};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "run" => {
            let Some(path) = args.get(2) else {
                eprintln!("Missing request file");
                print_command_help("run");
                return ExitCode::FAILURE;
            };
            let env = tsdb_config::load();
            if let Err(e) = telemetry::init_logging(&env.log) {
                eprintln!("Logging setup failed: {}", e);
                return ExitCode::FAILURE;
            }
            match run_request(path, env).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Request failed: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    for line in tsdb_config::load().effective_config().to_env_lines() {
                        println!("{}", line);
                    }
                    ExitCode::SUCCESS
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("tsdb-cli {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Execute the request in `path`. Ctrl-C cancels it.
async fn run_request(path: &str, env: tsdb_config::EnvConfig) -> Result<(), String> {
    let body = std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path, e))?;
    let request = Request::from_json(&body).map_err(|e| format!("invalid request JSON: {}", e))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling request");
            on_signal.cancel();
        }
    });

    let handler = builtin_handler(env.scheduler);
    let response = handler
        .handle_with_cancel(request, cancel)
        .await
        .map_err(|e| e.to_string())?;

    let json = response.to_json_pretty().map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "tsdb-cli - batched time-series query runner v{}

USAGE:
    tsdb-cli [COMMAND] [OPTIONS]

COMMANDS:
    run <FILE>   Execute a request file and print the JSON response
    config       Show configuration (show)
    version      Show version information
    help         Show this help message

EXAMPLES:
    tsdb-cli run request.json
    TSDB_REQUEST_TIMEOUT_MS=5000 tsdb-cli run request.json
    tsdb-cli config show

ENVIRONMENT:
    TSDB_REQUEST_TIMEOUT_MS       Request timeout in ms (default: 0, none)
    TSDB_DEFAULT_MAX_DATA_POINTS  Points per series (default: 100)
    TSDB_LOG_FORMAT               json or pretty (default: json)
    TSDB_LOG_LEVEL                Log filter (default: info)
    TSDB_LOG_FILE                 Log file path (default: stderr)

EXIT CODES:
    0  Success
    1  Failure",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "tsdb-cli run - Execute a request

USAGE:
    tsdb-cli run <FILE>

DESCRIPTION:
    Reads a JSON request, executes it with the built-in `testdata` and
    `math` executors and prints the response to stdout. Per-query errors
    are part of the response; the command fails only when the request
    itself is rejected, times out or is interrupted.

REQUEST FORMAT:
    {{
      \"maxDataPoints\": 10,
      \"queries\": [
        {{ \"refId\": \"A\", \"query\": \"random_walk\",
          \"datasource\": {{ \"id\": 1, \"type\": \"testdata\" }} }},
        {{ \"refId\": \"B\", \"query\": \"#A * 2\", \"depends\": [\"A\"],
          \"datasource\": {{ \"id\": 2, \"type\": \"math\" }} }}
      ]
    }}

EXIT CODES:
    0  Response printed
    1  Request rejected, timed out or cancelled"
            );
        }
        "config" => {
            eprintln!(
                "tsdb-cli config - Show configuration

USAGE:
    tsdb-cli config show

DESCRIPTION:
    Prints the effective value of every TSDB_* variable as KEY=value."
            );
        }
        _ => {
            eprintln!("No help available for: {}", command);
            print_usage();
        }
    }
}
