use serde_json::value::RawValue;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;

use crate::json::Node;
use crate::prometheus::report_dropped_entries;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("expected a json object")]
    NotAnObject,
    #[error("value of {0} is not a valid float")]
    InvalidFloat(String),
}

/// One normalized log record.
///
/// Well-known top-level fields land in their own columns, every other field
/// is flattened into the string or float side-arrays. `params` keeps the
/// received object text untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub time: OffsetDateTime,
    pub namespace: String,
    pub source: String,
    pub host: String,
    pub level: String,
    pub trace_id: String,
    pub message: String,
    pub build_commit: String,
    pub config_hash: String,
    pub remote_ip: String,
    pub params: String,
    pub string_keys: Vec<String>,
    pub string_values: Vec<String>,
    pub float_keys: Vec<String>,
    pub float_values: Vec<f64>,
}

impl Default for Entry {
    fn default() -> Self {
        Entry {
            time: OffsetDateTime::UNIX_EPOCH,
            namespace: String::new(),
            source: String::new(),
            host: String::new(),
            level: String::new(),
            trace_id: String::new(),
            message: String::new(),
            build_commit: String::new(),
            config_hash: String::new(),
            remote_ip: String::new(),
            params: String::new(),
            string_keys: Vec::new(),
            string_values: Vec::new(),
            float_keys: Vec::new(),
            float_values: Vec::new(),
        }
    }
}

impl Entry {
    /// Normalizes one JSON object.
    pub fn parse(data: &[u8]) -> Result<Entry, ParseError> {
        let Node::Object(fields) = serde_json::from_slice(data)? else {
            return Err(ParseError::NotAnObject);
        };

        let mut entry = Entry {
            params: String::from_utf8_lossy(data).into_owned(),
            ..Default::default()
        };
        for (key, value) in fields {
            entry.parse_root_field(key, value)?;
        }
        Ok(entry)
    }

    pub fn set_remote_ip(&mut self, remote_ip: &str) {
        self.remote_ip = remote_ip.to_owned();
    }

    fn parse_root_field(&mut self, key: String, value: Node) -> Result<(), ParseError> {
        let field = match key.as_str() {
            "time" => {
                self.time = parse_time(&value);
                return Ok(());
            }
            "namespace" => &mut self.namespace,
            "source" => &mut self.source,
            "host" => &mut self.host,
            "level" => &mut self.level,
            "trace_id" => &mut self.trace_id,
            "message" => &mut self.message,
            "build_commit" => &mut self.build_commit,
            "config_hash" => &mut self.config_hash,
            _ => return self.parse_other_field(&key, value),
        };
        *field = value.into_text().to_lowercase();
        Ok(())
    }

    fn parse_other_field(&mut self, key: &str, value: Node) -> Result<(), ParseError> {
        match value {
            Node::Object(fields) => {
                for (nested_key, nested_value) in fields {
                    self.parse_other_field(&nested_key, nested_value)?;
                }
            }
            Node::Array(items) => {
                for item in items {
                    self.parse_other_field(key, item)?;
                }
            }
            Node::Number(number) => {
                let value = number
                    .as_f64()
                    .ok_or_else(|| ParseError::InvalidFloat(key.to_owned()))?;
                self.float_keys.push(key.to_lowercase());
                self.float_values.push(value);
            }
            other => {
                self.string_keys.push(key.to_lowercase());
                self.string_values.push(other.into_text().to_lowercase());
            }
        }
        Ok(())
    }
}

/// Normalizes a JSON array of objects. Elements that are not objects are
/// skipped, and so are objects that fail to normalize.
pub fn parse_list(data: &[u8]) -> Result<Vec<Entry>, ParseError> {
    let items: Vec<Box<RawValue>> = serde_json::from_slice(data)?;

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let raw = item.get();
        if !raw.starts_with('{') {
            continue;
        }
        match Entry::parse(raw.as_bytes()) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                warn!("skipping list element: {}", err);
                report_dropped_entries("invalid_list_element", 1);
            }
        }
    }
    Ok(entries)
}

// Integer nanoseconds since the epoch, either as a number or a numeric string.
fn parse_time(value: &Node) -> OffsetDateTime {
    let nanos = match value {
        Node::Number(number) => number.as_i64(),
        Node::String(text) => text.parse::<i64>().ok(),
        _ => None,
    };
    nanos
        .and_then(|nanos| OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).ok())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
