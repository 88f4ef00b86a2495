//! Column-level view of pipeline rows
//!
//! Typed rows and textual CSV rows are both checked against the same
//! column specs through `Cell`.

use crate::domain::types::parse_datetime;

/// Semantic type a column must be coercible to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Float,
    Integer,
    Timestamp,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Float => "float",
            ColumnKind::Integer => "integer",
            ColumnKind::Timestamp => "timestamp",
        }
    }
}

/// Required column of a tabular schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl ColumnSpec {
    pub const fn required(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind, nullable: false }
    }

    pub const fn nullable(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind, nullable: true }
    }
}

/// A single table value, borrowed from its row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Text(&'a str),
    Float(f64),
    Int(i64),
    Null,
}

impl<'a> Cell<'a> {
    /// Textual CSV cell; blank means null
    pub fn from_text(value: &'a str) -> Self {
        if value.trim().is_empty() {
            Cell::Null
        } else {
            Cell::Text(value)
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Check the cell can be read as `kind` without changing its value.
    ///
    /// Nulls are handled by the caller.
    pub fn coercible_to(&self, kind: ColumnKind) -> Result<(), &'static str> {
        match (kind, *self) {
            (_, Cell::Null) => Err("null value"),
            (ColumnKind::Text, _) => Ok(()),
            (ColumnKind::Float, Cell::Float(v)) if v.is_finite() => Ok(()),
            (ColumnKind::Float, Cell::Float(_)) => Err("non-finite number"),
            (ColumnKind::Float, Cell::Int(_)) => Ok(()),
            (ColumnKind::Float, Cell::Text(s)) => {
                parse_float(s).map(|_| ()).ok_or("not a finite number")
            }
            (ColumnKind::Integer, Cell::Int(_)) => Ok(()),
            (ColumnKind::Integer, Cell::Float(v)) if is_integral(v) => Ok(()),
            (ColumnKind::Integer, Cell::Float(_)) => Err("not an integer"),
            (ColumnKind::Integer, Cell::Text(s)) => {
                parse_integer(s).map(|_| ()).ok_or("not an integer")
            }
            (ColumnKind::Timestamp, Cell::Int(_)) => Ok(()),
            (ColumnKind::Timestamp, Cell::Text(s)) => {
                parse_datetime(s).map(|_| ()).ok_or("not a parseable timestamp")
            }
            (ColumnKind::Timestamp, Cell::Float(_)) => Err("not a parseable timestamp"),
        }
    }
}

impl std::fmt::Display for Cell<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::Int(v) => write!(f, "{}", v),
            Cell::Null => Ok(()),
        }
    }
}

#[inline]
fn is_integral(v: f64) -> bool {
    v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64
}

/// Parse a finite float cell
pub fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer cell, accepting integer-valued floats such as `1000.0`
pub fn parse_integer(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(v) = value.parse::<i64>() {
        return Some(v);
    }
    value.parse::<f64>().ok().filter(|v| is_integral(*v)).map(|v| v as i64)
}
