//! clap [Args](clap::Args) for logging configuration.

use clap::{ArgAction, Args};
use eyre::eyre;
use tracing_subscriber::EnvFilter;

/// The log configuration.
#[derive(Debug, Args)]
#[clap(next_help_heading = "LOGGING")]
pub struct LogArgs {
    /// The filter to use for logs written to stderr. Overrides the
    /// verbosity flags when set.
    #[clap(long = "log.filter", value_name = "FILTER", global = true, default_value = "")]
    pub filter: String,

    /// The verbosity settings for the tracer.
    #[clap(flatten)]
    pub verbosity: Verbosity,
}

impl LogArgs {
    /// Initializes tracing with the configured options from cli args.
    pub fn init_tracing(&self) -> eyre::Result<()> {
        let filter = if self.filter.is_empty() {
            EnvFilter::new(self.verbosity.directive())
        } else {
            EnvFilter::new(&self.filter)
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| eyre!("failed to initialize tracing: {}", e))
    }
}

/// The verbosity settings for the cli.
#[derive(Debug, Copy, Clone, Args)]
#[clap(next_help_heading = "DISPLAY")]
pub struct Verbosity {
    /// Set the minimum log level.
    ///
    /// -v     Warnings & Errors
    /// -vv    Info
    /// -vvv   Debug
    /// -vvvv  Traces (warning: very verbose!)
    #[clap(short, long, action = ArgAction::Count, global = true, default_value_t = 1, verbatim_doc_comment, help_heading = "DISPLAY")]
    verbosity: u8,

    /// Silence all log output.
    #[clap(long, alias = "silent", short = 'q', global = true, help_heading = "DISPLAY")]
    quiet: bool,
}

impl Verbosity {
    /// The directive string for the given verbosity, or `off` when silent.
    pub fn directive(&self) -> &'static str {
        if self.quiet {
            return "off";
        }
        match self.verbosity.saturating_sub(1) {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
