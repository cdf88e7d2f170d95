//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use pricewatch::RunConfig;
use std::path::PathBuf;

use crate::error::CliResult;

/// Pricewatch: record comparison-site prices to a CSV log
#[derive(Parser, Debug)]
#[command(name = "pricewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one extraction and append the records to the CSV log
    Run(RunArgs),

    /// Write a default configuration file
    Init(InitArgs),

    /// Print the effective configuration
    Config(ConfigArgs),
}

/// Config file and per-run overrides shared by `run` and `config`
#[derive(Args, Debug, Default, Clone)]
pub struct RunOverrides {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Comparison page URL
    #[arg(long)]
    pub url: Option<String>,

    /// Value typed into the input field
    #[arg(long)]
    pub value: Option<String>,

    /// CSV log path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for failure snapshots
    #[arg(long, conflicts_with = "no_diagnostics")]
    pub diagnostics_dir: Option<PathBuf>,

    /// Skip failure snapshots
    #[arg(long)]
    pub no_diagnostics: bool,

    /// How long to wait for results to render
    #[arg(long)]
    pub results_timeout_ms: Option<u64>,

    /// Read at most this many result items
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Disable the chromium sandbox (containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Chromium binary
    #[arg(long)]
    pub chromium_path: Option<String>,
}

impl RunOverrides {
    /// Apply flags on top of `config`
    #[must_use]
    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(url) = &self.url {
            config.target_url.clone_from(url);
        }
        if let Some(value) = &self.value {
            config.field_value.clone_from(value);
        }
        if let Some(output) = &self.output {
            config.output.clone_from(output);
        }
        if self.no_diagnostics {
            config.diagnostics_dir = None;
        } else if let Some(dir) = &self.diagnostics_dir {
            config.diagnostics_dir = Some(dir.clone());
        }
        if let Some(ms) = self.results_timeout_ms {
            config.timeouts.results_ready_ms = ms;
        }
        if self.max_items.is_some() {
            config.selectors.extract.max_items = self.max_items;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if self.no_sandbox {
            config.browser.sandbox = false;
        }
        if let Some(path) = &self.chromium_path {
            config.browser.chromium_path = Some(path.clone());
        }
        config
    }

    /// Load the file (or defaults), apply flags and validate
    pub fn resolve(&self) -> CliResult<RunConfig> {
        let base = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Configuration and overrides
    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Append a "System Check" row when the run fails
    #[arg(long)]
    pub heartbeat_on_failure: bool,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// File to write
    #[arg(default_value = "pricewatch.yaml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Configuration and overrides
    #[command(flatten)]
    pub overrides: RunOverrides,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// JSON objects
    Json,
}

impl From<LogFormatArg> for crate::config::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_run_command() {
            let cli = Cli::parse_from(["pricewatch", "run", "--value", "2000"]);
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert_eq!(args.overrides.value.as_deref(), Some("2000"));
            assert!(!args.heartbeat_on_failure);
        }

        #[test]
        fn test_global_flags_after_subcommand() {
            let cli = Cli::parse_from(["pricewatch", "config", "-vv", "--log-format", "json"]);
            assert_eq!(cli.verbose, 2);
            assert!(matches!(cli.log_format, LogFormatArg::Json));
        }

        #[test]
        fn test_diagnostics_flags_conflict() {
            let result = Cli::try_parse_from([
                "pricewatch",
                "run",
                "--no-diagnostics",
                "--diagnostics-dir",
                "snaps",
            ]);
            assert!(result.is_err());
        }

        #[test]
        fn test_init_default_path() {
            let cli = Cli::parse_from(["pricewatch", "init"]);
            let Commands::Init(args) = cli.command else {
                panic!("expected init");
            };
            assert_eq!(args.path, PathBuf::from("pricewatch.yaml"));
            assert!(!args.force);
        }
    }

    mod override_tests {
        use super::*;

        #[test]
        fn test_flags_override_defaults() {
            let overrides = RunOverrides {
                url: Some("https://compare.example.test/".into()),
                results_timeout_ms: Some(90_000),
                max_items: Some(5),
                headed: true,
                no_diagnostics: true,
                ..RunOverrides::default()
            };
            let config = overrides.apply(RunConfig::default());
            assert_eq!(config.target_url, "https://compare.example.test/");
            assert_eq!(config.timeouts.results_ready_ms, 90_000);
            assert_eq!(config.selectors.extract.max_items, Some(5));
            assert!(!config.browser.headless);
            assert!(config.diagnostics_dir.is_none());
        }

        #[test]
        fn test_no_flags_keeps_config() {
            let base = RunConfig::default().with_field_value("4000");
            let config = RunOverrides::default().apply(base.clone());
            assert_eq!(config, base);
        }

        #[test]
        fn test_resolve_reads_file_then_flags() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("run.yaml");
            fs::write(&path, "field_value: \"2600\"\noutput: prices.csv\n").unwrap();

            let overrides = RunOverrides {
                config: Some(path),
                output: Some(PathBuf::from("other.csv")),
                ..RunOverrides::default()
            };
            let config = overrides.resolve().unwrap();
            assert_eq!(config.field_value, "2600");
            assert_eq!(config.output, PathBuf::from("other.csv"));
        }

        #[test]
        fn test_resolve_validates() {
            let overrides = RunOverrides {
                url: Some(String::new()),
                ..RunOverrides::default()
            };
            assert!(overrides.resolve().is_err());
        }
    }
}
