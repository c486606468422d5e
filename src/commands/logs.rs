/*!
 * `paystream logs ...`
 */

use chrono::{DateTime, Utc};

use paystream_audit::{
    AuditError, LogCategory, LogFilter, LogLevel, LogQuery, Sort, SortField, SortOrder,
};

use crate::app::Paystream;
use crate::cli::{FilterArgs, LogsCommands, SortArgs};
use crate::config::PaystreamConfig;
use crate::error::Result;
use crate::output::{self, Envelope};

fn parse_date(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| AuditError::validation(format!("{} {:?} is not RFC 3339: {}", field, s, e)).into())
    })
    .transpose()
}

impl FilterArgs {
    pub fn to_filter(&self) -> Result<LogFilter> {
        let levels = self
            .levels
            .iter()
            .map(|s| s.parse::<LogLevel>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let categories = self
            .categories
            .iter()
            .map(|s| s.parse::<LogCategory>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut filter = LogFilter::new()
            .levels(levels)
            .categories(categories)
            .between(
                parse_date("startDate", self.start_date.as_deref())?,
                parse_date("endDate", self.end_date.as_deref())?,
            )
            .tags(self.tags.iter().cloned());

        if let Some(ref user) = self.user_address {
            filter = filter.user(user);
        }
        if let Some(ref endpoint) = self.endpoint {
            filter = filter.endpoint(endpoint);
        }
        if let Some(ref search) = self.search {
            filter = filter.search(search.clone());
        }
        Ok(filter)
    }
}

impl SortArgs {
    pub fn to_sort(&self) -> Result<Sort> {
        let sort_by = match self.sort_by {
            Some(ref raw) => raw.parse::<SortField>()?,
            None => SortField::default(),
        };
        let sort_order = match self.sort_order {
            Some(ref raw) => raw.parse::<SortOrder>()?,
            None => SortOrder::default(),
        };
        Ok(Sort::new(sort_by, sort_order))
    }
}

pub async fn execute(app: &Paystream, config: &PaystreamConfig, command: LogsCommands) -> Result<Envelope> {
    let logs = app.logs();

    match command {
        LogsCommands::Query {
            filter,
            sort,
            page,
            limit,
        } => {
            let query = LogQuery {
                filter: filter.to_filter()?,
                page,
                limit,
                sort: sort.to_sort()?,
            };
            Ok(output::log_page(&logs.query(&query).await?))
        }

        LogsCommands::Stats {
            start_date,
            end_date,
        } => {
            let stats = logs
                .stats(
                    parse_date("startDate", start_date.as_deref())?,
                    parse_date("endDate", end_date.as_deref())?,
                )
                .await?;
            Ok(output::log_stats(&stats))
        }

        LogsCommands::Export {
            filter,
            sort,
            limit,
        } => {
            let records = logs
                .export(&filter.to_filter()?, sort.to_sort()?, limit)
                .await?;
            Ok(output::log_export(&records))
        }

        LogsCommands::Cleanup { days } => {
            let days = days.unwrap_or(config.retention_days);
            let deleted = logs.cleanup(days).await?;
            Ok(output::cleanup(deleted, days))
        }

        LogsCommands::Get { id } => Ok(output::log_record(&logs.get(id).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_args_conversion() {
        let args = FilterArgs {
            levels: vec!["error".into(), "warning".into()],
            categories: vec!["business".into()],
            start_date: Some("2026-01-01T00:00:00Z".into()),
            end_date: Some("2026-01-02T00:00:00+02:00".into()),
            user_address: Some("0xABC".into()),
            endpoint: Some("/api/*".into()),
            tags: vec!["stream".into()],
            search: Some("timeout".into()),
        };
        let filter = args.to_filter().unwrap();
        assert_eq!(filter.levels.len(), 2);
        assert_eq!(filter.user_address.as_deref(), Some("0xabc"));
        assert_eq!(
            filter.end_date.unwrap().to_rfc3339(),
            "2026-01-01T22:00:00+00:00"
        );
        filter.validate().unwrap();
    }

    #[test]
    fn test_bad_inputs_are_validation_errors() {
        let args = FilterArgs {
            levels: vec!["fatal".into()],
            ..FilterArgs::default()
        };
        assert_eq!(args.to_filter().unwrap_err().status_code(), 400);

        let args = FilterArgs {
            start_date: Some("yesterday".into()),
            ..FilterArgs::default()
        };
        assert_eq!(args.to_filter().unwrap_err().status_code(), 400);

        let sort = SortArgs {
            sort_by: Some("requestId".into()),
            sort_order: None,
        };
        assert_eq!(sort.to_sort().unwrap_err().status_code(), 400);
    }
}
