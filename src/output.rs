//! Response envelope shared by every operation.
//!
//! Success: `{"success": true, ...payload}`.
//! Failure: `{"success": false, "error": "<message>", "code": "<kind>"}`,
//! plus `"existing"` when a create hit an open stream.

use serde::Serialize;
use serde_json::{json, Map, Value};

use paystream_audit::{AuditRecord, LogPage, LogStats};
use paystream_ledger::Stream;

use crate::error::PaystreamError;

/// One operation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    /// HTTP-equivalent status, not serialised
    #[serde(skip)]
    pub status: u16,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Envelope {
    /// `payload` must serialise to a JSON object; anything else lands under `"data"`
    pub fn ok(status: u16, payload: impl Serialize) -> Self {
        let body = match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(other) => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
            Err(e) => return Self::failure_message(500, "store", &e.to_string()),
        };
        Self {
            success: true,
            status,
            body,
        }
    }

    pub fn error(err: &PaystreamError) -> Self {
        let kind = err.kind();
        let mut envelope = Self::failure_message(kind.status_code(), &kind.to_string(), &err.to_string());
        if let Some(existing) = err.existing_stream() {
            if let Ok(value) = serde_json::to_value(existing) {
                envelope.body.insert("existing".to_string(), value);
            }
        }
        envelope
    }

    fn failure_message(status: u16, code: &str, message: &str) -> Self {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(message.to_string()));
        body.insert("code".to_string(), Value::String(code.to_string()));
        Self {
            success: false,
            status,
            body,
        }
    }

    pub fn to_json(&self, pretty: bool) -> String {
        let rendered = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        // a Map of Values always serialises
        rendered.unwrap_or_else(|_| String::from(r#"{"success":false,"error":"serialisation failure"}"#))
    }
}

pub fn stream_created(stream: &Stream) -> Envelope {
    Envelope::ok(201, json!({ "stream": stream }))
}

pub fn stream(stream: &Stream) -> Envelope {
    Envelope::ok(200, json!({ "stream": stream }))
}

pub fn streams(streams: &[Stream]) -> Envelope {
    Envelope::ok(200, json!({ "streams": streams, "count": streams.len() }))
}

pub fn log_page(page: &LogPage) -> Envelope {
    Envelope::ok(
        200,
        json!({
            "logs": page.records,
            "pagination": {
                "page": page.page,
                "limit": page.limit,
                "total": page.total,
                "totalPages": page.total_pages(),
            }
        }),
    )
}

pub fn log_record(record: &AuditRecord) -> Envelope {
    Envelope::ok(200, json!({ "log": record }))
}

pub fn log_stats(stats: &LogStats) -> Envelope {
    Envelope::ok(200, json!({ "stats": stats }))
}

pub fn log_export(records: &[AuditRecord]) -> Envelope {
    Envelope::ok(200, json!({ "logs": records, "count": records.len() }))
}

pub fn cleanup(deleted: u64, days_to_keep: u32) -> Envelope {
    Envelope::ok(
        200,
        json!({ "deletedCount": deleted, "daysToKeep": days_to_keep }),
    )
}

/// Writes envelopes to stdout
#[derive(Debug, Clone, Copy)]
pub struct OutputWriter {
    pub pretty: bool,
}

impl OutputWriter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    pub fn emit(&self, envelope: &Envelope) {
        println!("{}", envelope.to_json(self.pretty));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paystream_audit::AuditError;
    use paystream_ledger::{Amount, LedgerError, StreamTerms, WalletAddress};

    fn sample_stream() -> Stream {
        let employer = WalletAddress::parse("0x1111111111111111111111111111111111111111").unwrap();
        let employee = WalletAddress::parse("0x2222222222222222222222222222222222222222").unwrap();
        let terms = StreamTerms::new(Amount::parse("1000").unwrap(), Amount::zero(), 12, 0);
        Stream::new(employer, employee, terms, chrono::Utc::now())
    }

    #[test]
    fn test_success_envelope_flattens_payload() {
        let stream = sample_stream();
        let value: Value = serde_json::from_str(&stream_created(&stream).to_json(false)).unwrap();

        assert_eq!(value["success"], json!(true));
        assert_eq!(value["stream"]["status"], json!("active"));
        assert_eq!(value["stream"]["monthlySalary"], json!("1000"));
        assert!(value.get("status").is_none());
    }

    #[test]
    fn test_conflict_envelope_carries_existing() {
        let stream = sample_stream();
        let err = PaystreamError::from(LedgerError::Conflict {
            existing: Box::new(stream.clone()),
        });
        let envelope = Envelope::error(&err);
        assert_eq!(envelope.status, 409);

        let value: Value = serde_json::from_str(&envelope.to_json(false)).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["code"], json!("conflict"));
        assert_eq!(value["existing"]["id"], json!(stream.id));
    }

    #[test]
    fn test_store_error_message_is_generic() {
        let err = PaystreamError::from(AuditError::Store("SQLITE_CORRUPT at /data".into()));
        let envelope = Envelope::error(&err);
        assert_eq!(envelope.status, 500);
        assert_eq!(envelope.body["error"], json!("storage backend failure"));
    }

    #[test]
    fn test_scalar_payload_wrapped() {
        let envelope = Envelope::ok(200, 5);
        assert_eq!(envelope.body["data"], json!(5));
    }
}
