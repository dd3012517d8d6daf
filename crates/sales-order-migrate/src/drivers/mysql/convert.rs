//! Conversion between [`Value`] and `mysql_async::Value`.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::Value as MyValue;
use rust_decimal::Decimal;

use crate::core::Value;

/// Charset id MySQL reports for binary strings and blobs.
pub(super) const BINARY_CHARSET: u16 = 63;

/// Convert a binary-protocol value to a [`Value`].
///
/// Zero dates (`0000-00-00`) have no calendar equivalent and become NULL.
pub(super) fn from_mysql(value: MyValue, column_type: ColumnType, binary: bool) -> Value {
    match value {
        MyValue::NULL => Value::Null,
        MyValue::Int(v) => Value::Int(v),
        MyValue::UInt(v) => Value::UInt(v),
        MyValue::Float(v) => Value::Float(f64::from(v)),
        MyValue::Double(v) => Value::Float(v),
        MyValue::Bytes(bytes) => bytes_value(bytes, column_type, binary),
        MyValue::Date(year, month, day, hour, minute, second, micros) => {
            let Some(date) = NaiveDate::from_ymd_opt(year.into(), month.into(), day.into()) else {
                return Value::Null;
            };
            if column_type == ColumnType::MYSQL_TYPE_DATE {
                Value::Date(date)
            } else {
                date.and_hms_micro_opt(hour.into(), minute.into(), second.into(), micros)
                    .map_or(Value::Null, Value::DateTime)
            }
        }
        MyValue::Time(negative, days, hours, minutes, seconds, micros) => {
            if !negative && days == 0 {
                if let Some(t) = NaiveTime::from_hms_micro_opt(
                    hours.into(),
                    minutes.into(),
                    seconds.into(),
                    micros,
                ) {
                    return Value::Time(t);
                }
            }
            // TIME columns span -838:59:59..838:59:59; keep out-of-day values as text
            let sign = if negative { "-" } else { "" };
            Value::Text(format!(
                "{}{}:{:02}:{:02}",
                sign,
                u64::from(days) * 24 + u64::from(hours),
                minutes,
                seconds
            ))
        }
    }
}

fn bytes_value(bytes: Vec<u8>, column_type: ColumnType, binary: bool) -> Value {
    match column_type {
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            match std::str::from_utf8(&bytes).ok().and_then(|s| Decimal::from_str(s).ok()) {
                Some(d) => Value::Decimal(d),
                None => text_or_bytes(bytes),
            }
        }
        _ if binary => Value::Bytes(bytes),
        _ => text_or_bytes(bytes),
    }
}

fn text_or_bytes(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(s) => Value::Text(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

/// Convert a [`Value`] to a bind parameter.
pub(super) fn to_mysql(value: &Value) -> MyValue {
    match value {
        Value::Null => MyValue::NULL,
        Value::Bool(b) => MyValue::Int(i64::from(*b)),
        Value::Int(v) => MyValue::Int(*v),
        Value::UInt(v) => MyValue::UInt(*v),
        Value::Float(v) => MyValue::Double(*v),
        Value::Decimal(d) => MyValue::Bytes(d.to_string().into_bytes()),
        Value::Text(s) => MyValue::Bytes(s.as_bytes().to_vec()),
        Value::Bytes(b) => MyValue::Bytes(b.clone()),
        Value::Date(d) => MyValue::Date(year(d), d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        Value::DateTime(dt) => MyValue::Date(
            year(&dt.date()),
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        ),
        Value::Time(t) => MyValue::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
    }
}

fn year(d: &NaiveDate) -> u16 {
    u16::try_from(d.year()).unwrap_or(0)
}
