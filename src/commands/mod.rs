/*!
 * Command handlers: typed requests in, response envelopes out
 */

pub mod logs;
pub mod stream;

use crate::app::Paystream;
use crate::cli::Commands;
use crate::config::PaystreamConfig;
use crate::error::Result;
use crate::output::Envelope;

/// Run one command against an open instance
pub async fn execute(app: &Paystream, config: &PaystreamConfig, command: Commands) -> Result<Envelope> {
    match command {
        Commands::Stream(command) => stream::execute(app, command).await,
        Commands::Logs(command) => logs::execute(app, config, command).await,
    }
}
