/*!
 * Paystream - payroll stream ledger and audit log
 *
 * Tracks salary streams between employer and employee wallets, mirroring
 * their on-chain lifecycle, with:
 * - One open stream per employer/employee pair, enforced in storage
 * - Pause, resume, cancel and upstream reconciliation (sync)
 * - A structured audit log with filtered queries, stats, export and retention
 * - Fire-and-forget audit emission that never fails a business operation
 */

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;

// Re-export commonly used types
pub use app::Paystream;
pub use config::{AuditConfig, LogLevel, PaystreamConfig};
pub use error::{ErrorKind, PaystreamError, Result};
pub use output::{Envelope, OutputWriter};

pub use paystream_audit as audit;
pub use paystream_ledger as ledger;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
