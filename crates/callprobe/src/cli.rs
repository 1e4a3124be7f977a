//! Command-line parsing.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use callprobe_core::HarnessConfig;

use crate::schema::SchemaDraft;

/// Run scripted voice-dialog test calls.
///
/// Log verbosity follows RUST_LOG, falling back to logging.level in the config.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "callprobe", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// What the user asked for.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run scenario files and print a JSON report per scenario
    Run(RunArgs),
    /// Print the JSON Schema of scenario files
    Schema {
        /// Emit a draft-07 schema instead of draft 2020-12
        #[arg(long)]
        draft07: bool,
    },
}

impl Command {
    /// Schema dialect requested by `callprobe schema`.
    pub fn schema_draft(draft07: bool) -> SchemaDraft {
        if draft07 {
            SchemaDraft::Draft07
        } else {
            SchemaDraft::Draft2020_12
        }
    }
}

/// Arguments of `callprobe run`.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Harness configuration (YAML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write a transcript of every call into DIR
    #[arg(long, value_name = "DIR")]
    pub record: Option<PathBuf>,

    /// Scenario files
    #[arg(required = true, value_name = "SCENARIO")]
    pub scenarios: Vec<PathBuf>,
}

impl RunArgs {
    /// Load the configuration these arguments describe.
    pub fn load_config(&self) -> anyhow::Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => HarnessConfig::default(),
        };

        if let Some(directory) = &self.record {
            config.recording.enabled = true;
            config.recording.directory = Some(directory.display().to_string());
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("callprobe").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let command = parse(&[
            "run",
            "--config",
            "harness.yaml",
            "demos/hello.yaml",
            "--record",
            "out",
            "demos/dtmf.yaml",
        ])
        .unwrap();

        assert_eq!(
            command,
            Command::Run(RunArgs {
                config: Some(PathBuf::from("harness.yaml")),
                record: Some(PathBuf::from("out")),
                scenarios: vec![
                    PathBuf::from("demos/hello.yaml"),
                    PathBuf::from("demos/dtmf.yaml")
                ],
            })
        );
    }

    #[test]
    fn test_run_requires_scenarios() {
        let err = parse(&["run", "--record", "out"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_option_needs_value() {
        assert!(parse(&["run", "--config"]).is_err());
        assert!(parse(&["run", "a.yaml", "--record"]).is_err());
    }

    #[test]
    fn test_parse_schema() {
        assert_eq!(
            parse(&["schema"]).unwrap(),
            Command::Schema { draft07: false }
        );
        assert_eq!(
            parse(&["schema", "--draft07"]).unwrap(),
            Command::Schema { draft07: true }
        );
        assert_eq!(Command::schema_draft(false), SchemaDraft::Draft2020_12);
        assert_eq!(Command::schema_draft(true), SchemaDraft::Draft07);
    }

    #[test]
    fn test_help_version_and_unknown() {
        assert_eq!(parse(&["--help"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
        assert_eq!(
            parse(&["--version"]).unwrap_err().kind(),
            ErrorKind::DisplayVersion
        );
        assert!(parse(&[]).is_err());
        assert_eq!(
            parse(&["dance"]).unwrap_err().kind(),
            ErrorKind::InvalidSubcommand
        );
        assert_eq!(
            parse(&["run", "--verbose", "a.yaml"]).unwrap_err().kind(),
            ErrorKind::UnknownArgument
        );
    }

    #[test]
    fn test_record_enables_recording() {
        let args = RunArgs {
            record: Some(PathBuf::from("transcripts")),
            scenarios: vec![PathBuf::from("a.yaml")],
            ..RunArgs::default()
        };
        let config = args.load_config().unwrap();
        assert!(config.recording.enabled);
        assert_eq!(config.recording.directory.as_deref(), Some("transcripts"));
    }

    #[test]
    fn test_missing_config_file() {
        let args = RunArgs {
            config: Some(PathBuf::from("/nonexistent/callprobe.yaml")),
            ..RunArgs::default()
        };
        let err = args.load_config().unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
