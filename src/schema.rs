//! Schema Snapshot
//!
//! Lightweight projection of a dataset for prompt grounding: a bounded row
//! preview plus a column → coarse type map. Built once per question; never
//! contains the full dataset.

use crate::error::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// First N rows as JSON records.
    pub preview: Vec<BTreeMap<String, serde_json::Value>>,
    /// Column name → coarse scalar type.
    pub column_types: BTreeMap<String, String>,
    pub row_count: usize,
    pub column_count: usize,
}

impl SchemaSnapshot {
    pub fn from_frame(df: &DataFrame, sample_rows: usize) -> Result<Self> {
        let preview = frame_to_rows(df, sample_rows)?;
        let column_types = df
            .get_columns()
            .iter()
            .map(|s| (s.name().to_string(), coarse_type(s.dtype()).to_string()))
            .collect();
        Ok(Self {
            preview,
            column_types,
            row_count: df.height(),
            column_count: df.width(),
        })
    }

    pub fn preview_json(&self) -> String {
        serde_json::to_string_pretty(&self.preview).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn types_json(&self) -> String {
        serde_json::to_string_pretty(&self.column_types).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Map a polars dtype onto the coarse scalar types the prompt talks about.
fn coarse_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "integer",
        DataType::Float32 | DataType::Float64 => "float",
        DataType::Boolean => "boolean",
        DataType::String => "text",
        DataType::Date | DataType::Datetime(_, _) | DataType::Time | DataType::Duration(_) => {
            "temporal"
        }
        _ => "text",
    }
}

/// Convert the first `max_rows` rows of a frame to JSON records.
pub fn frame_to_rows(
    df: &DataFrame,
    max_rows: usize,
) -> Result<Vec<BTreeMap<String, serde_json::Value>>> {
    let limited = df.head(Some(max_rows));
    let column_names: Vec<String> = limited
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = Vec::with_capacity(limited.height());
    for row_idx in 0..limited.height() {
        let mut row = BTreeMap::new();
        for name in &column_names {
            let series = limited.column(name)?;
            row.insert(name.clone(), cell_to_json(series, row_idx)?);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn cell_to_json(series: &Series, row_idx: usize) -> Result<serde_json::Value> {
    let value = series.get(row_idx)?;
    Ok(any_value_to_json(&value))
}

pub(crate) fn any_value_to_json(value: &AnyValue) -> serde_json::Value {
    match value {
        AnyValue::Null => serde_json::Value::Null,
        AnyValue::Boolean(b) => serde_json::Value::Bool(*b),
        AnyValue::String(s) => serde_json::Value::String((*s).to_string()),
        AnyValue::StringOwned(s) => serde_json::Value::String(s.to_string()),
        AnyValue::Int8(v) => serde_json::Value::Number((*v as i64).into()),
        AnyValue::Int16(v) => serde_json::Value::Number((*v as i64).into()),
        AnyValue::Int32(v) => serde_json::Value::Number((*v as i64).into()),
        AnyValue::Int64(v) => serde_json::Value::Number((*v).into()),
        AnyValue::UInt8(v) => serde_json::Value::Number((*v as u64).into()),
        AnyValue::UInt16(v) => serde_json::Value::Number((*v as u64).into()),
        AnyValue::UInt32(v) => serde_json::Value::Number((*v as u64).into()),
        AnyValue::UInt64(v) => serde_json::Value::Number((*v).into()),
        AnyValue::Float32(v) => serde_json::Number::from_f64(*v as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        AnyValue::Float64(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        // Dates, durations, categoricals: fall back to the display form.
        other => serde_json::Value::String(other.to_string()),
    }
}
