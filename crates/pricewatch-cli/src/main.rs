//! Pricewatch CLI
//!
//! ## Usage
//!
//! ```bash
//! pricewatch init                          # Write pricewatch.yaml
//! pricewatch run --config pricewatch.yaml  # One extraction into data.csv
//! pricewatch run --value 2000 -o prices.csv --heartbeat-on-failure
//! pricewatch config --url https://...      # Show the effective configuration
//! ```

use clap::Parser;
use pricewatch_cli::{
    execute_config, execute_init, execute_run, init_tracing, Cli, CliConfig, CliResult, Commands,
    Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);

    console::set_colors_enabled(config.color.should_color());
    init_tracing(&config);

    match cli.command {
        Commands::Run(args) => execute_run(&config, &args),
        Commands::Init(args) => execute_init(&config, &args),
        Commands::Config(args) => execute_config(&args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
        .with_log_format(cli.log_format.into())
}
