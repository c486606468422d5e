/*!
 * `paystream stream ...`
 */

use chrono::Utc;
use uuid::Uuid;

use paystream_ledger::{Amount, LedgerError, StreamStatus, StreamTerms, SyncSnapshot, WalletAddress};

use crate::app::Paystream;
use crate::cli::{PairArgs, StreamCommands};
use crate::error::Result;
use crate::output::{self, Envelope};

fn parse_pair(pair: &PairArgs) -> Result<(WalletAddress, WalletAddress)> {
    Ok((
        WalletAddress::parse(&pair.employer)?,
        WalletAddress::parse(&pair.employee)?,
    ))
}

pub async fn execute(app: &Paystream, command: StreamCommands) -> Result<Envelope> {
    let controller = app.controller();

    match command {
        StreamCommands::Create {
            pair,
            monthly_salary,
            rate_per_second,
            duration_months,
            tax_percent,
            start_time,
            end_time,
            tx_hash,
            notes,
        } => {
            let (employer, employee) = parse_pair(&pair)?;
            let terms = StreamTerms {
                monthly_salary: Amount::parse(&monthly_salary)?,
                rate_per_second: Amount::parse(&rate_per_second)?,
                duration_months,
                tax_percent,
                start_time: start_time.unwrap_or_else(|| Utc::now().timestamp()),
                end_time,
                creation_tx_hash: tx_hash,
                notes,
            };
            let stream = controller.create(&employer, &employee, terms).await?;
            Ok(output::stream_created(&stream))
        }

        StreamCommands::Pause { pair } => {
            let (employer, employee) = parse_pair(&pair)?;
            Ok(output::stream(&controller.pause(&employer, &employee).await?))
        }

        StreamCommands::Resume { pair } => {
            let (employer, employee) = parse_pair(&pair)?;
            Ok(output::stream(&controller.resume(&employer, &employee).await?))
        }

        StreamCommands::Cancel { pair, tx_hash } => {
            let (employer, employee) = parse_pair(&pair)?;
            let stream = controller.cancel(&employer, &employee, tx_hash).await?;
            Ok(output::stream(&stream))
        }

        StreamCommands::Sync {
            pair,
            withdrawn,
            paused,
        } => {
            let (employer, employee) = parse_pair(&pair)?;
            let snapshot = SyncSnapshot {
                withdrawn: withdrawn.as_deref().map(Amount::parse).transpose()?,
                paused,
            };
            let stream = controller.sync(&employer, &employee, snapshot).await?;
            Ok(output::stream(&stream))
        }

        StreamCommands::List {
            employer,
            employee,
            status,
        } => {
            let status = status
                .as_deref()
                .map(str::parse::<StreamStatus>)
                .transpose()?;
            let streams = match (employer, employee) {
                (Some(employer), _) => {
                    controller
                        .streams_for_employer(&WalletAddress::parse(&employer)?, status)
                        .await?
                }
                (None, Some(employee)) => {
                    controller
                        .streams_for_employee(&WalletAddress::parse(&employee)?, status)
                        .await?
                }
                (None, None) => {
                    return Err(LedgerError::invalid_terms("either --employer or --employee is required").into())
                }
            };
            Ok(output::streams(&streams))
        }

        StreamCommands::Show { id } => {
            let id = Uuid::parse_str(&id)
                .map_err(|e| LedgerError::invalid_terms(format!("invalid stream id {:?}: {}", id, e)))?;
            Ok(output::stream(&controller.stream(id).await?))
        }
    }
}
