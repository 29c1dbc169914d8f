//! Column formats and the codec that translates between raw (stored) values
//! and application values.
//!
//! A format is attached per column in the entity metadata. Decoding happens
//! on every read through the entity (`get`, `values`), encoding on every
//! write (`set`) and on every condition value compiled against the column.
//! Implicit coercions belong here rather than in dirty-tracking comparison.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{OrmError, OrmResult};
use crate::value::Value;

/// Application-facing layout for datetimes; what `chrono` (de)serializes through serde.
const ISO_DATETIME: &str = "%Y-%m-%dT%H:%M:%S";

/// Default stored layout for datetime columns.
pub const DEFAULT_DATETIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// Default stored layout for date columns.
pub const DEFAULT_DATE_LAYOUT: &str = "%Y-%m-%d";

/// Logical format of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFormat {
    DateTime,
    Date,
    Bool,
    I64,
    F64,
    Json,
}

impl fmt::Display for ColumnFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnFormat::DateTime => write!(f, "DateTime"),
            ColumnFormat::Date => write!(f, "Date"),
            ColumnFormat::Bool => write!(f, "Bool"),
            ColumnFormat::I64 => write!(f, "I64"),
            ColumnFormat::F64 => write!(f, "F64"),
            ColumnFormat::Json => write!(f, "Json"),
        }
    }
}

/// Translation strategy between stored and application values.
pub trait FormatCodec: Send + Sync + fmt::Debug {
    /// Stored value → application value.
    ///
    /// # Errors
    /// Returns [`OrmError::Codec`] if `raw` is not a valid stored value for `format`.
    fn decode(&self, format: ColumnFormat, raw: Value) -> OrmResult<Value>;

    /// Application value → stored value.
    ///
    /// # Errors
    /// Returns [`OrmError::Codec`] if `value` cannot be represented in `format`.
    fn encode(&self, format: ColumnFormat, value: Value) -> OrmResult<Value>;

    /// Current time rendered as a stored datetime.
    fn now(&self) -> Value;
}

/// Codec for the built-in [`ColumnFormat`]s.
#[derive(Clone, Debug)]
pub struct StandardCodec {
    datetime_layout: String,
    date_layout: String,
}

impl Default for StandardCodec {
    fn default() -> Self {
        Self::new(DEFAULT_DATETIME_LAYOUT, DEFAULT_DATE_LAYOUT)
    }
}

impl StandardCodec {
    pub fn new(datetime_layout: impl Into<String>, date_layout: impl Into<String>) -> Self {
        Self {
            datetime_layout: datetime_layout.into(),
            date_layout: date_layout.into(),
        }
    }

    fn parse_datetime(&self, s: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(s, &self.datetime_layout)
            .ok()
            .or_else(|| s.parse::<NaiveDateTime>().ok())
    }

    fn parse_date(&self, s: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(s, &self.date_layout)
            .ok()
            .or_else(|| s.parse::<NaiveDate>().ok())
    }
}

fn mismatch(format: ColumnFormat, value: &Value) -> OrmError {
    OrmError::codec(format, format!("unexpected value {value}"))
}

fn truthy(format: ColumnFormat, value: &Value) -> OrmResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(mismatch(format, value)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            _ => Err(mismatch(format, value)),
        },
        _ => Err(mismatch(format, value)),
    }
}

fn integer(format: ColumnFormat, value: Value) -> OrmResult<Value> {
    match value {
        Value::Number(ref n) if n.is_i64() || n.is_u64() => Ok(value),
        Value::String(ref s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| mismatch(format, &value)),
        other => Err(mismatch(format, &other)),
    }
}

fn float(format: ColumnFormat, value: Value) -> OrmResult<Value> {
    let parsed = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| mismatch(format, &value))
}

impl FormatCodec for StandardCodec {
    fn decode(&self, format: ColumnFormat, raw: Value) -> OrmResult<Value> {
        if raw.is_null() {
            return Ok(raw);
        }
        match format {
            ColumnFormat::DateTime => {
                let dt = raw
                    .as_str()
                    .and_then(|s| self.parse_datetime(s))
                    .ok_or_else(|| mismatch(format, &raw))?;
                Ok(Value::String(dt.format(ISO_DATETIME).to_string()))
            }
            ColumnFormat::Date => {
                let d = raw
                    .as_str()
                    .and_then(|s| self.parse_date(s))
                    .ok_or_else(|| mismatch(format, &raw))?;
                Ok(Value::String(d.format(DEFAULT_DATE_LAYOUT).to_string()))
            }
            ColumnFormat::Bool => truthy(format, &raw).map(Value::Bool),
            ColumnFormat::I64 => integer(format, raw),
            ColumnFormat::F64 => float(format, raw),
            ColumnFormat::Json => match raw {
                Value::String(s) => serde_json::from_str(&s)
                    .map_err(|e| OrmError::codec(format, e.to_string())),
                other => Ok(other),
            },
        }
    }

    fn encode(&self, format: ColumnFormat, value: Value) -> OrmResult<Value> {
        if value.is_null() {
            return Ok(value);
        }
        match format {
            ColumnFormat::DateTime => {
                let dt = value
                    .as_str()
                    .and_then(|s| self.parse_datetime(s))
                    .ok_or_else(|| mismatch(format, &value))?;
                Ok(Value::String(dt.format(&self.datetime_layout).to_string()))
            }
            ColumnFormat::Date => {
                let d = value
                    .as_str()
                    .and_then(|s| self.parse_date(s))
                    .ok_or_else(|| mismatch(format, &value))?;
                Ok(Value::String(d.format(&self.date_layout).to_string()))
            }
            ColumnFormat::Bool => truthy(format, &value).map(|b| Value::from(i64::from(b))),
            ColumnFormat::I64 => integer(format, value),
            ColumnFormat::F64 => float(format, value),
            ColumnFormat::Json => Ok(match value {
                Value::String(_) => value,
                other => Value::String(other.to_string()),
            }),
        }
    }

    fn now(&self) -> Value {
        Value::String(
            chrono::Utc::now()
                .naive_utc()
                .format(&self.datetime_layout)
                .to_string(),
        )
    }
}
