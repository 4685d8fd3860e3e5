//! Classifies attempt-failure messages into a small taxonomy for logging
//! and for the attempt history records.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptErrorClass {
    ColumnNotFound,
    UnknownOperation,
    ParseError,
    GroupWithoutAgg,
    TypeMismatch,
    NoResult,
    ExtractionFailure,
    ExecutionError,
}

impl fmt::Display for ScriptErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptErrorClass::ColumnNotFound => write!(f, "ColumnNotFound"),
            ScriptErrorClass::UnknownOperation => write!(f, "UnknownOperation"),
            ScriptErrorClass::ParseError => write!(f, "ParseError"),
            ScriptErrorClass::GroupWithoutAgg => write!(f, "GroupWithoutAgg"),
            ScriptErrorClass::TypeMismatch => write!(f, "TypeMismatch"),
            ScriptErrorClass::NoResult => write!(f, "NoResult"),
            ScriptErrorClass::ExtractionFailure => write!(f, "ExtractionFailure"),
            ScriptErrorClass::ExecutionError => write!(f, "ExecutionError"),
        }
    }
}

/// Pattern-match a failure message against the taxonomy. The messages come
/// from the script parser/interpreter, so the patterns track its wording.
pub fn classify(message: &str) -> ScriptErrorClass {
    let lowered = message.to_lowercase();

    if lowered.contains("no executable code") {
        return ScriptErrorClass::ExtractionFailure;
    }
    if lowered.contains("column") && lowered.contains("not found") {
        return ScriptErrorClass::ColumnNotFound;
    }
    if lowered.contains("unknown operation") {
        return ScriptErrorClass::UnknownOperation;
    }
    if lowered.contains("parse error") {
        return ScriptErrorClass::ParseError;
    }
    if lowered.contains("group_by must be followed by agg") {
        return ScriptErrorClass::GroupWithoutAgg;
    }
    if lowered.contains("type mismatch") || lowered.contains("cannot compare") {
        return ScriptErrorClass::TypeMismatch;
    }
    if lowered.contains("did not assign") {
        return ScriptErrorClass::NoResult;
    }
    ScriptErrorClass::ExecutionError
}
