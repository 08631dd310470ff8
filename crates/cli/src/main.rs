// reclink CLI - two-source record linkage from a TOML config

mod exit_codes;
mod linkage;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;

use exit_codes::{linkage_exit_code, EXIT_CONFIG, EXIT_DATA, EXIT_SUCCESS, EXIT_USAGE};
use reclink_linkage::LinkageError;

fn long_version() -> &'static str {
    concat!(env!("CARGO_PKG_VERSION"), " (", env!("RECLINK_COMMIT"), ")")
}

#[derive(Parser)]
#[command(name = "reclink")]
#[command(about = "Link records across two sources: blocking, comparison, classification, evaluation")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full linkage pipeline from a TOML config file
    #[command(after_help = "\
Examples:
  reclink run people.linkage.toml
  reclink run people.linkage.toml --json
  reclink run people.linkage.toml --output result.json")]
    Run {
        /// Path to the .linkage.toml config file
        config: PathBuf,

        /// Output JSON to stdout instead of the human summary only
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a linkage config without running
    #[command(after_help = "\
Examples:
  reclink validate people.linkage.toml")]
    Validate {
        /// Path to the .linkage.toml config file
        config: PathBuf,
    },

    /// Learn a blocking scheme with the Fisher-score selector
    #[command(after_help = "\
Examples:
  reclink select-keys people.linkage.toml
  reclink select-keys people.linkage.toml --json

The config must use `method = \"selected\"` in its [blocking] section.")]
    SelectKeys {
        /// Path to the .linkage.toml config file
        config: PathBuf,

        /// Output the selection report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show block statistics and blocking quality for the configured blocking
    #[command(after_help = "\
Examples:
  reclink blocks people.linkage.toml
  reclink blocks people.linkage.toml --json")]
    Blocks {
        /// Path to the .linkage.toml config file
        config: PathBuf,

        /// Output the blocking report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the Soundex code of each name
    #[command(after_help = "\
Examples:
  reclink soundex robert rupert tymczak")]
    Soundex {
        /// Names to encode
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_DATA, message: msg.into(), hint: None }
    }

    /// Engine error with the exit code of its category.
    pub fn linkage(err: LinkageError) -> Self {
        let hint = match &err {
            LinkageError::ConfigParse(_) => Some("run `reclink validate <config>` after fixing the TOML".to_string()),
            LinkageError::AttributeIndex { .. } => {
                Some("attribute indexes count CSV columns from 0, including the id column".to_string())
            }
            _ => None,
        };
        Self { code: linkage_exit_code(&err), message: err.to_string(), hint }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<LinkageError> for CliError {
    fn from(err: LinkageError) -> Self {
        Self::linkage(err)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let result = match cli.command {
        Commands::Run { config, json, output } => linkage::cmd_run(config, json, output),
        Commands::Validate { config } => linkage::cmd_validate(config),
        Commands::SelectKeys { config, json } => linkage::cmd_select_keys(config, json),
        Commands::Blocks { config, json } => linkage::cmd_blocks(config, json),
        Commands::Soundex { names } => linkage::cmd_soundex(&names),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}
