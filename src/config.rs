//! Application configuration module
//!
//! Command-line flags, with the two DSNs falling back to environment
//! variables (a `.env` file is loaded first when present).

use crate::dimension::Dimension;
use crate::error::AppError;
use clap::{Parser, ValueEnum};
use validator::Validate;

/// How reports are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Compare two PostgreSQL databases, or retrieve info about one of them
#[derive(Debug, Parser)]
#[command(name = "pg_diff", version, about)]
pub struct Cli {
    /// What to compare: table_name, table_count, table_schema, row_count,
    /// table_size, index_size, table_total_size, sequence
    #[arg(long = "type", value_name = "T_NAME")]
    pub dimension: String,

    /// DSN or URL of the source database
    #[arg(long, env = "PG_DIFF_SOURCE", hide_env_values = true)]
    pub source: String,

    /// DSN or URL of the target database; omit to show source info only
    #[arg(long, env = "PG_DIFF_TARGET", hide_env_values = true)]
    pub target: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Show both snapshots, or every entry in info mode
    #[arg(long)]
    pub verbose: bool,
}

/// Complete run settings
#[derive(Debug, Clone, Validate)]
pub struct Settings {
    pub dimension: Dimension,

    #[validate(length(min = 1, message = "source DSN must not be empty"))]
    pub source: String,

    #[validate(length(min = 1, message = "target DSN must not be empty"))]
    pub target: Option<String>,

    pub format: OutputFormat,
    pub verbose: bool,
}

impl Settings {
    /// Load settings from the command line and environment
    pub fn load() -> Result<Self, AppError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> Result<Self, AppError> {
        let settings = Self {
            dimension: cli.dimension.parse()?,
            source: cli.source.trim().to_string(),
            target: cli.target.map(|t| t.trim().to_string()),
            format: cli.format,
            verbose: cli.verbose,
        };

        settings
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Settings, AppError> {
        let cli = Cli::try_parse_from(std::iter::once("pg_diff").chain(args.iter().copied()))
            .expect("arguments parse");
        Settings::from_cli(cli)
    }

    #[test]
    fn test_compare_mode() {
        let settings = parse(&[
            "--type=row_count",
            "--source=host=a dbname=x",
            "--target",
            "host=b dbname=x",
        ])
        .unwrap();

        assert_eq!(settings.dimension, Dimension::RowCount);
        assert_eq!(settings.target.as_deref(), Some("host=b dbname=x"));
        assert_eq!(settings.format, OutputFormat::Text);
        assert!(settings.target.is_some());
    }

    #[test]
    fn test_info_mode_without_target() {
        let settings = parse(&["--type", "table_size", "--source", "postgres://u@h/db", "--verbose"]).unwrap();
        assert!(settings.target.is_none());
        assert!(settings.verbose);
    }

    #[test]
    fn test_unknown_type_is_unsupported_dimension() {
        let err = parse(&["--type", "tables", "--source", "postgres://u@h/db"]).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedDimension(_)));
    }

    #[test]
    fn test_empty_target_rejected() {
        let err = parse(&["--type", "table_name", "--source", "postgres://u@h/db", "--target", " "]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("target DSN must not be empty"));
    }

    #[test]
    fn test_json_format() {
        let settings = parse(&[
            "--type",
            "sequence",
            "--source",
            "postgres://u@h/db",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(settings.format, OutputFormat::Json);
    }
}
