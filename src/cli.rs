/*!
 * Command-line definitions
 */

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{LogLevel, PaystreamConfig};
use crate::error::Result;

#[derive(Debug, Parser)]
#[command(name = "paystream")]
#[command(version, about = "Payroll stream ledger and audit log", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Stream database path (`:memory:` for a throwaway store)
    #[arg(long = "streams-db", value_name = "PATH", global = true)]
    pub streams_db: Option<PathBuf>,

    /// Audit log database path
    #[arg(long = "audit-db", value_name = "PATH", global = true)]
    pub audit_db: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Write JSON logs to this file
    #[arg(long = "log", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Pretty-print JSON output
    #[arg(long = "pretty", global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Configuration file (or defaults) with command-line overrides applied
    pub fn resolve_config(&self) -> Result<PaystreamConfig> {
        let mut config = match self.config {
            Some(ref path) => PaystreamConfig::from_file(path)?,
            None => PaystreamConfig::default(),
        };

        if let Some(ref path) = self.streams_db {
            config.streams_db = path.clone();
        }
        if let Some(ref path) = self.audit_db {
            config.audit_db = path.clone();
        }
        if let Some(ref level) = self.log_level {
            config.log_level = level.parse::<LogLevel>()?;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file.clone();
        }
        config.verbose |= self.verbose;

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Salary stream lifecycle
    #[command(subcommand)]
    Stream(StreamCommands),

    /// Audit log inspection and retention
    #[command(subcommand)]
    Logs(LogsCommands),
}

/// Employer/employee pair
#[derive(Debug, Clone, Args)]
pub struct PairArgs {
    /// Employer wallet address (0x + 40 hex)
    #[arg(long)]
    pub employer: String,

    /// Employee wallet address (0x + 40 hex)
    #[arg(long)]
    pub employee: String,
}

#[derive(Debug, Subcommand)]
pub enum StreamCommands {
    /// Open a new stream
    Create {
        #[command(flatten)]
        pair: PairArgs,

        /// Monthly salary (decimal)
        #[arg(long = "monthly-salary")]
        monthly_salary: String,

        /// Streaming rate per second (decimal)
        #[arg(long = "rate-per-second")]
        rate_per_second: String,

        #[arg(long = "duration-months")]
        duration_months: u32,

        #[arg(long = "tax-percent", default_value_t = 0)]
        tax_percent: u8,

        /// Unix seconds; defaults to now
        #[arg(long = "start-time")]
        start_time: Option<i64>,

        /// Unix seconds; defaults to start + 30 days per month
        #[arg(long = "end-time")]
        end_time: Option<i64>,

        #[arg(long = "tx-hash")]
        tx_hash: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Pause the open stream
    Pause {
        #[command(flatten)]
        pair: PairArgs,
    },

    /// Resume the open stream
    Resume {
        #[command(flatten)]
        pair: PairArgs,
    },

    /// Cancel the open stream
    Cancel {
        #[command(flatten)]
        pair: PairArgs,

        #[arg(long = "tx-hash")]
        tx_hash: Option<String>,
    },

    /// Apply an upstream observation to the open stream
    Sync {
        #[command(flatten)]
        pair: PairArgs,

        /// Observed withdrawn total (decimal)
        #[arg(long)]
        withdrawn: Option<String>,

        /// Observed pause state
        #[arg(long)]
        paused: Option<bool>,
    },

    /// List streams for an employer or an employee, newest first
    List {
        #[arg(long, conflicts_with = "employee", required_unless_present = "employee")]
        employer: Option<String>,

        #[arg(long)]
        employee: Option<String>,

        /// active, paused or cancelled
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one stream by id
    Show { id: String },
}

/// Filters shared by `logs query` and `logs export`
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Levels to include (comma separated)
    #[arg(long = "level", value_delimiter = ',')]
    pub levels: Vec<String>,

    /// Categories to include (comma separated)
    #[arg(long = "category", value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Inclusive lower bound (RFC 3339)
    #[arg(long = "start-date")]
    pub start_date: Option<String>,

    /// Inclusive upper bound (RFC 3339)
    #[arg(long = "end-date")]
    pub end_date: Option<String>,

    #[arg(long = "user")]
    pub user_address: Option<String>,

    /// Exact endpoint, or a prefix ending in `*`
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Match records carrying any of these tags (comma separated)
    #[arg(long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Case-insensitive substring of message or details
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct SortArgs {
    /// timestamp, level, category, message, userAddress, endpoint, durationMs
    #[arg(long = "sort-by")]
    pub sort_by: Option<String>,

    /// asc or desc
    #[arg(long = "sort-order")]
    pub sort_order: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum LogsCommands {
    /// Paginated, filtered query
    Query {
        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        sort: SortArgs,

        #[arg(long)]
        page: Option<u32>,

        /// 1 to 500
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Counts by level and category
    Stats {
        #[arg(long = "start-date")]
        start_date: Option<String>,

        #[arg(long = "end-date")]
        end_date: Option<String>,
    },

    /// Bulk export without pagination
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        sort: SortArgs,

        /// 1 to 10000
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Delete records older than the retention window
    Cleanup {
        /// Days to keep (1 to 365); defaults to the configured retention
        #[arg(long)]
        days: Option<u32>,
    },

    /// Fetch one record by id
    Get { id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::try_parse_from([
            "paystream",
            "--streams-db",
            ":memory:",
            "--log-level",
            "debug",
            "logs",
            "cleanup",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.streams_db, PathBuf::from(":memory:"));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(matches!(
            cli.command,
            Commands::Logs(LogsCommands::Cleanup { days: None })
        ));
    }

    #[test]
    fn test_list_requires_a_party() {
        assert!(Cli::try_parse_from(["paystream", "stream", "list"]).is_err());
        assert!(Cli::try_parse_from([
            "paystream",
            "stream",
            "list",
            "--employer",
            "0x1",
            "--employee",
            "0x2"
        ])
        .is_err());
    }

    #[test]
    fn test_comma_separated_levels() {
        let cli = Cli::try_parse_from(["paystream", "logs", "query", "--level", "error,warn"]).unwrap();
        match cli.command {
            Commands::Logs(LogsCommands::Query { filter, .. }) => {
                assert_eq!(filter.levels, vec!["error", "warn"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
