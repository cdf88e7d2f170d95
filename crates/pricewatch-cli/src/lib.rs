//! Pricewatch CLI library
//!
//! Argument parsing, logging setup and the command handlers behind the
//! `pricewatch` binary. [`run_with_factory`] is generic over the session
//! factory so the whole command can be exercised with the mock driver.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
mod logging;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, ConfigArgs, InitArgs, LogFormatArg, RunArgs, RunOverrides,
};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use logging::{env_filter, init_tracing};
pub use runner::{execute_config, execute_init, execute_run, run_with_factory, RunSummary};
