//! Named columns over typed records
//!
//! Grouping and ranking are driven by caller-chosen column names. Instead of
//! duck-typed column access, every record type that can be grouped implements
//! [`Tabular`], which exposes its key columns as [`KeyValue`]s and its numeric
//! columns as `f64`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarmonizeError;
use crate::models::record::TradeRecord;

/// Key (grouping) columns shared by all record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Source,
    ReporterCode,
    Reporter,
    PartnerCode,
    Partner,
    ProductCode,
    Product,
    Element,
    Period,
    Year,
    Unit,
    Flag,
}

impl Column {
    /// Column name as used in tabular data
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::ReporterCode => "reporter_code",
            Self::Reporter => "reporter",
            Self::PartnerCode => "partner_code",
            Self::Partner => "partner",
            Self::ProductCode => "product_code",
            Self::Product => "product",
            Self::Element => "element",
            Self::Period => "period",
            Self::Year => "year",
            Self::Unit => "unit",
            Self::Flag => "flag",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = HarmonizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let column = match s {
            "source" => Self::Source,
            "reporter_code" => Self::ReporterCode,
            "reporter" => Self::Reporter,
            "partner_code" => Self::PartnerCode,
            "partner" => Self::Partner,
            "product_code" => Self::ProductCode,
            "product" => Self::Product,
            "element" => Self::Element,
            "period" => Self::Period,
            "year" => Self::Year,
            "unit" => Self::Unit,
            "flag" => Self::Flag,
            other => {
                return Err(HarmonizeError::config(format!("unknown column '{other}'")));
            }
        };
        Ok(column)
    }
}

/// Numeric columns that can be summed and ranked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueColumn {
    Value,
    ValueMirror,
}

impl fmt::Display for ValueColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => f.write_str("value"),
            Self::ValueMirror => f.write_str("value_mirror"),
        }
    }
}

/// A single key cell
///
/// Nulls sort first, then integers, then text, which gives group keys a total
/// order independent of the record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Null,
    Int(i64),
    Text(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<null>"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<KeyValue>> From<Option<T>> for KeyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Record types exposing named columns
pub trait Tabular {
    /// Value of a key column
    fn key_value(&self, column: Column) -> KeyValue;

    /// Value of a numeric column; `None` when the column is absent or null
    fn numeric(&self, column: ValueColumn) -> Option<f64>;

    /// Values of several key columns, in order
    fn key_values(&self, columns: &[Column]) -> Vec<KeyValue> {
        columns.iter().map(|c| self.key_value(*c)).collect()
    }
}

impl Tabular for TradeRecord {
    fn key_value(&self, column: Column) -> KeyValue {
        match column {
            Column::Source => self.source.as_str().into(),
            Column::ReporterCode => self.reporter_code.into(),
            Column::Reporter => self.reporter.as_str().into(),
            Column::PartnerCode => self.partner_code.into(),
            Column::Partner => self.partner.as_deref().into(),
            Column::ProductCode => self.product_code.as_str().into(),
            Column::Product => self.product.as_deref().into(),
            Column::Element => self.element.as_str().into(),
            Column::Period => self.period.into(),
            Column::Year => self.year.into(),
            Column::Unit => self.unit.as_str().into(),
            Column::Flag => self.flag.as_deref().into(),
        }
    }

    fn numeric(&self, column: ValueColumn) -> Option<f64> {
        match column {
            ValueColumn::Value => Some(self.value),
            ValueColumn::ValueMirror => None,
        }
    }
}
