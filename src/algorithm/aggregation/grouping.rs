//! Country group substitution and summation
//!
//! Each record's reporter and/or partner is replaced by a group label taken
//! from the country crosswalk (continent, sub-continent, EU27/ROW, or the
//! country itself) and `value` is summed over everything that ends up sharing
//! a [`GroupKey`]. Rows are bucketed in a `BTreeMap`, so the output is sorted
//! by key and independent of input order.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::crosswalk::CountryCrosswalk;
use crate::models::{Column, KeyValue, Tabular, TradeRecord, ValueColumn};
use crate::utils::logging::{log_operation_complete, log_operation_start, log_rows_removed};

/// Label of the EU27 bucket
pub const EU27_LABEL: &str = "eu27";
/// Label of the rest-of-world bucket
pub const ROW_LABEL: &str = "row";
/// Label for countries without continent information
pub const UNASSIGNED_LABEL: &str = "unassigned";

/// Group substitution rule for one side of a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountryGrouping {
    /// Keep the country itself
    #[default]
    Identity,
    Continent,
    SubContinent,
    /// Two buckets: EU27 members and everything else
    Eu27Row,
}

impl fmt::Display for CountryGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("identity"),
            Self::Continent => f.write_str("continent"),
            Self::SubContinent => f.write_str("sub_continent"),
            Self::Eu27Row => f.write_str("eu27_row"),
        }
    }
}

/// Side of a bilateral record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingSide {
    Reporter,
    Partner,
}

/// A country or the group it was substituted by
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Member {
    label: String,
    /// Canonical code, kept only while the member is still a single country
    code: Option<i64>,
}

impl CountryGrouping {
    fn assign(self, crosswalk: &CountryCrosswalk, code: i64, name: &str) -> Member {
        let label = match self {
            Self::Identity => {
                return Member {
                    label: name.to_string(),
                    code: Some(code),
                };
            }
            Self::Continent => crosswalk
                .info(code)
                .and_then(|info| info.continent.clone())
                .unwrap_or_else(|| UNASSIGNED_LABEL.to_string()),
            Self::SubContinent => crosswalk
                .info(code)
                .and_then(|info| info.sub_continent.clone())
                .unwrap_or_else(|| UNASSIGNED_LABEL.to_string()),
            Self::Eu27Row => {
                if crosswalk.is_eu27(code) {
                    EU27_LABEL.to_string()
                } else {
                    ROW_LABEL.to_string()
                }
            }
        };
        Member { label, code: None }
    }

    /// Regroup a member that may already be a group label
    fn reassign(self, crosswalk: &CountryCrosswalk, member: Member) -> Member {
        match member.code {
            Some(code) => self.assign(crosswalk, code, &member.label),
            None => member,
        }
    }
}

/// Key under which grouped values are summed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub source: String,
    pub reporter_group: String,
    pub reporter_code: Option<i64>,
    pub partner_group: Option<String>,
    pub partner_code: Option<i64>,
    pub product_code: String,
    pub element: String,
    pub unit: String,
    pub period: i32,
}

impl GroupKey {
    fn new(
        source: &str,
        reporter: Member,
        partner: Option<Member>,
        product_code: &str,
        element: &str,
        unit: &str,
        period: i32,
    ) -> Self {
        let (partner_group, partner_code) =
            partner.map_or((None, None), |m| (Some(m.label), m.code));
        Self {
            source: source.to_string(),
            reporter_group: reporter.label,
            reporter_code: reporter.code,
            partner_group,
            partner_code,
            product_code: product_code.to_string(),
            element: element.to_string(),
            unit: unit.to_string(),
            period,
        }
    }
}

/// A record whose reporter and/or partner has been replaced by a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedRecord {
    pub source: String,
    /// Group label, or the country name under identity grouping
    pub reporter_group: String,
    /// Canonical country code under identity grouping, otherwise `None`
    pub reporter_code: Option<i64>,
    pub partner_group: Option<String>,
    pub partner_code: Option<i64>,
    pub product_code: String,
    pub product: Option<String>,
    pub element: String,
    pub period: i32,
    pub year: i32,
    pub unit: String,
    pub value: f64,
    /// Number of input rows summed into this one
    pub record_count: usize,
}

impl GroupedRecord {
    /// The key this record was summed under
    #[must_use]
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            source: self.source.clone(),
            reporter_group: self.reporter_group.clone(),
            reporter_code: self.reporter_code,
            partner_group: self.partner_group.clone(),
            partner_code: self.partner_code,
            product_code: self.product_code.clone(),
            element: self.element.clone(),
            unit: self.unit.clone(),
            period: self.period,
        }
    }

    fn reporter_member(&self) -> Member {
        Member {
            label: self.reporter_group.clone(),
            code: self.reporter_code,
        }
    }

    fn partner_member(&self) -> Option<Member> {
        self.partner_group.as_ref().map(|label| Member {
            label: label.clone(),
            code: self.partner_code,
        })
    }
}

impl Tabular for GroupedRecord {
    fn key_value(&self, column: Column) -> KeyValue {
        match column {
            Column::Source => self.source.as_str().into(),
            Column::ReporterCode => self.reporter_code.into(),
            Column::Reporter => self.reporter_group.as_str().into(),
            Column::PartnerCode => self.partner_code.into(),
            Column::Partner => self.partner_group.as_deref().into(),
            Column::ProductCode => self.product_code.as_str().into(),
            Column::Product => self.product.as_deref().into(),
            Column::Element => self.element.as_str().into(),
            Column::Period => self.period.into(),
            Column::Year => self.year.into(),
            Column::Unit => self.unit.as_str().into(),
            Column::Flag => KeyValue::Null,
        }
    }

    fn numeric(&self, column: ValueColumn) -> Option<f64> {
        match column {
            ValueColumn::Value => Some(self.value),
            ValueColumn::ValueMirror => None,
        }
    }
}

/// Running sum for one group
struct Bucket {
    value: f64,
    record_count: usize,
    product: Option<String>,
    year: i32,
}

fn sum_into_groups(
    rows: impl Iterator<Item = (GroupKey, f64, usize, Option<String>, i32)>,
) -> Vec<GroupedRecord> {
    let mut groups: BTreeMap<GroupKey, Bucket> = BTreeMap::new();
    for (key, value, count, product, year) in rows {
        let bucket = groups.entry(key).or_insert_with(|| Bucket {
            value: 0.0,
            record_count: 0,
            product: None,
            year,
        });
        bucket.value += value;
        bucket.record_count += count;
        if bucket.product.is_none() {
            bucket.product = product;
        }
    }

    groups
        .into_iter()
        .map(|(key, bucket)| GroupedRecord {
            source: key.source,
            reporter_group: key.reporter_group,
            reporter_code: key.reporter_code,
            partner_group: key.partner_group,
            partner_code: key.partner_code,
            product_code: key.product_code,
            product: bucket.product,
            element: key.element,
            period: key.period,
            year: bucket.year,
            unit: key.unit,
            value: bucket.value,
            record_count: bucket.record_count,
        })
        .collect()
}

/// Substitute reporter and partner by their groups and sum `value`
///
/// Records must carry canonical country codes. Countries missing from the
/// crosswalk fall into `unassigned` (continent groupings) or `row` (EU27/ROW).
///
/// # Arguments
/// * `records` - Harmonized records
/// * `crosswalk` - Country crosswalk supplying group memberships
/// * `reporter_grouping` - Rule applied to the reporter
/// * `partner_grouping` - Rule applied to the partner (ignored for records without partner)
///
/// # Returns
/// One grouped record per distinct [`GroupKey`], sorted by key
#[must_use]
pub fn aggregate_by_group(
    records: &[TradeRecord],
    crosswalk: &CountryCrosswalk,
    reporter_grouping: CountryGrouping,
    partner_grouping: CountryGrouping,
) -> Vec<GroupedRecord> {
    let start = Instant::now();
    log_operation_start(
        &format!("Aggregating by reporter {reporter_grouping} and partner {partner_grouping}"),
        records.len(),
    );

    let grouped = sum_into_groups(records.iter().map(|record| {
        let reporter = reporter_grouping.assign(crosswalk, record.reporter_code, &record.reporter);
        let partner = record.partner_code.map(|code| {
            partner_grouping.assign(crosswalk, code, record.partner.as_deref().unwrap_or_default())
        });
        let key = GroupKey::new(
            &record.source,
            reporter,
            partner,
            &record.product_code,
            &record.element,
            &record.unit,
            record.period,
        );
        (key, record.value, 1, record.product.clone(), record.year)
    }));

    log_operation_complete("aggregated", grouped.len(), Some(start.elapsed()));
    grouped
}

/// Apply grouping rules to records that may already be grouped
///
/// Members that are still single countries are substituted; members that are
/// already group labels are kept. Regrouping with the same rules that
/// produced the input returns the input unchanged.
#[must_use]
pub fn regroup(
    grouped: &[GroupedRecord],
    crosswalk: &CountryCrosswalk,
    reporter_grouping: CountryGrouping,
    partner_grouping: CountryGrouping,
) -> Vec<GroupedRecord> {
    sum_into_groups(grouped.iter().map(|record| {
        let reporter = reporter_grouping.reassign(crosswalk, record.reporter_member());
        let partner = record
            .partner_member()
            .map(|member| partner_grouping.reassign(crosswalk, member));
        let key = GroupKey::new(
            &record.source,
            reporter,
            partner,
            &record.product_code,
            &record.element,
            &record.unit,
            record.period,
        );
        (key, record.value, record.record_count, record.product.clone(), record.year)
    }))
}

/// Split one side into `eu27` and `row` and sum, leaving the other side at
/// country granularity
#[must_use]
pub fn eu_row_aggregate(
    records: &[TradeRecord],
    crosswalk: &CountryCrosswalk,
    side: GroupingSide,
) -> Vec<GroupedRecord> {
    match side {
        GroupingSide::Reporter => aggregate_by_group(
            records,
            crosswalk,
            CountryGrouping::Eu27Row,
            CountryGrouping::Identity,
        ),
        GroupingSide::Partner => aggregate_by_group(
            records,
            crosswalk,
            CountryGrouping::Identity,
            CountryGrouping::Eu27Row,
        ),
    }
}

/// Remove records whose reporter or partner is an aggregate entity
///
/// # Returns
/// The retained records and the number removed
#[must_use]
pub fn retain_individual_countries(
    records: Vec<TradeRecord>,
    crosswalk: &CountryCrosswalk,
) -> (Vec<TradeRecord>, usize) {
    let before = records.len();
    let retained: Vec<TradeRecord> = records
        .into_iter()
        .filter(|record| {
            !crosswalk.is_aggregate(record.reporter_code)
                && !record.partner_code.is_some_and(|code| crosswalk.is_aggregate(code))
        })
        .collect();
    let removed = before - retained.len();
    log_rows_removed("Individual country filter", removed, "aggregate reporter or partner");
    (retained, removed)
}
