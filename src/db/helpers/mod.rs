use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::models::OpKind;

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} value {value} out of range"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_kind(value: &str) -> Result<OpKind> {
    match value {
        "Location" => Ok(OpKind::Location),
        "Transaction" => Ok(OpKind::Transaction),
        "Expense" => Ok(OpKind::Expense),
        "ImageRef" => Ok(OpKind::ImageRef),
        other => Err(anyhow!("unknown operation kind {other}")),
    }
}
