//! The canonical trade/production record
//!
//! A `TradeRecord` is one row of a source table after the ingestion layer has
//! renamed its columns. Before resolution its country and product codes are in
//! the source's native code space; after resolution they are canonical and the
//! `harmonized` marker is set.

use serde::{Deserialize, Serialize};

/// One observation of a trade flow or a production quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Reporting body the row comes from (e.g. "faostat", "comtrade")
    pub source: String,
    /// Country submitting the data
    pub reporter_code: i64,
    /// Reporter name
    pub reporter: String,
    /// Counterpart country; absent for production data
    #[serde(default)]
    pub partner_code: Option<i64>,
    /// Partner name
    #[serde(default)]
    pub partner: Option<String>,
    /// Product code in the current code space
    pub product_code: String,
    /// Product name
    #[serde(default)]
    pub product: Option<String>,
    /// Quantity kind, e.g. `export_quantity`, `production`, `area_harvested`
    pub element: String,
    /// Reporting period, either a year (`2021`) or a year-month (`202106`)
    pub period: i32,
    /// Calendar year of the period
    pub year: i32,
    /// Unit of `value`
    pub unit: String,
    /// Observed value
    pub value: f64,
    /// Provenance/quality annotation
    #[serde(default)]
    pub flag: Option<String>,
    /// Whether the codes have already been mapped to the canonical space
    #[serde(default)]
    pub harmonized: bool,
}

/// Full identity of a record within one source
///
/// At most one record may exist per key; the resolver enforces this with its
/// duplicate policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub source: String,
    pub reporter_code: i64,
    pub partner_code: Option<i64>,
    pub product_code: String,
    pub element: String,
    pub period: i32,
    pub unit: String,
    pub flag: Option<String>,
}

/// Direction of a bilateral flow, derived from the element name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowDirection {
    Import,
    Export,
}

impl FlowDirection {
    /// Direction of an element such as `import_quantity` or `export_value`
    #[must_use]
    pub fn of_element(element: &str) -> Option<Self> {
        match (element.contains("import"), element.contains("export")) {
            (true, false) => Some(Self::Import),
            (false, true) => Some(Self::Export),
            _ => None,
        }
    }

    /// The direction seen from the other side of the flow
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Import => Self::Export,
            Self::Export => Self::Import,
        }
    }
}

impl TradeRecord {
    /// Create a new builder for a record from the given source
    #[must_use]
    pub fn builder(source: impl Into<String>) -> TradeRecordBuilder {
        TradeRecordBuilder::new(source)
    }

    /// The uniqueness key of this record within its source
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey {
            source: self.source.clone(),
            reporter_code: self.reporter_code,
            partner_code: self.partner_code,
            product_code: self.product_code.clone(),
            element: self.element.clone(),
            period: self.period,
            unit: self.unit.clone(),
            flag: self.flag.clone(),
        }
    }

    /// Flow direction of this record, if it is a trade flow
    #[must_use]
    pub fn flow_direction(&self) -> Option<FlowDirection> {
        FlowDirection::of_element(&self.element)
    }

    /// Element name as reported by the partner country for the same movement
    /// of goods (`import` and `export` swapped)
    #[must_use]
    pub fn mirror_element(&self) -> Option<String> {
        mirror_element(&self.element)
    }

    /// Whether the period is a year-month (`YYYYMM`) rather than a year
    #[must_use]
    pub const fn is_monthly(&self) -> bool {
        self.period > 9999
    }
}

/// Swap `import` and `export` in an element name
#[must_use]
pub fn mirror_element(element: &str) -> Option<String> {
    match FlowDirection::of_element(element)? {
        FlowDirection::Import => Some(element.replacen("import", "export", 1)),
        FlowDirection::Export => Some(element.replacen("export", "import", 1)),
    }
}

/// Builder for constructing trade records
#[derive(Debug, Clone)]
pub struct TradeRecordBuilder {
    record: TradeRecord,
}

impl TradeRecordBuilder {
    /// Create a new builder with empty fields
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            record: TradeRecord {
                source: source.into(),
                reporter_code: 0,
                reporter: String::new(),
                partner_code: None,
                partner: None,
                product_code: String::new(),
                product: None,
                element: String::new(),
                period: 0,
                year: 0,
                unit: String::new(),
                value: 0.0,
                flag: None,
                harmonized: false,
            },
        }
    }

    /// Set the reporter code and name
    #[must_use]
    pub fn reporter(mut self, code: i64, name: impl Into<String>) -> Self {
        self.record.reporter_code = code;
        self.record.reporter = name.into();
        self
    }

    /// Set the partner code and name
    #[must_use]
    pub fn partner(mut self, code: i64, name: impl Into<String>) -> Self {
        self.record.partner_code = Some(code);
        self.record.partner = Some(name.into());
        self
    }

    /// Set the product code
    #[must_use]
    pub fn product_code(mut self, code: impl Into<String>) -> Self {
        self.record.product_code = code.into();
        self
    }

    /// Set the product name
    #[must_use]
    pub fn product(mut self, name: impl Into<String>) -> Self {
        self.record.product = Some(name.into());
        self
    }

    /// Set the element
    #[must_use]
    pub fn element(mut self, element: impl Into<String>) -> Self {
        self.record.element = element.into();
        self
    }

    /// Set the period; the year is derived from it
    #[must_use]
    pub const fn period(mut self, period: i32) -> Self {
        self.record.period = period;
        self.record.year = if period > 9999 { period / 100 } else { period };
        self
    }

    /// Set a yearly period
    #[must_use]
    pub const fn year(self, year: i32) -> Self {
        self.period(year)
    }

    /// Set the unit
    #[must_use]
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.record.unit = unit.into();
        self
    }

    /// Set the value
    #[must_use]
    pub const fn value(mut self, value: f64) -> Self {
        self.record.value = value;
        self
    }

    /// Set the flag
    #[must_use]
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.record.flag = Some(flag.into());
        self
    }

    /// Mark the record as already carrying canonical codes
    #[must_use]
    pub const fn harmonized(mut self) -> Self {
        self.record.harmonized = true;
        self
    }

    /// Build the record
    #[must_use]
    pub fn build(self) -> TradeRecord {
        self.record
    }
}
