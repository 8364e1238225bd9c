//! Tests for country grouping, EU27/ROW splits and top-n ranking

use std::collections::BTreeMap;

use trade_harmonizer::algorithm::aggregation::{
    EU27_LABEL, ROW_LABEL, UNASSIGNED_LABEL, compare_aggregate_to_constituents, regroup,
    retain_individual_countries,
};
use trade_harmonizer::{
    Column, CountryGrouping, GroupingSide, HarmonizeError, KeyValue, RankingSpec, TradeRecord,
    aggregate_by_group, eu_row_aggregate, nlargest,
};

use crate::utils::{CANONICAL, HarmonizedCopy, flow, tables};

fn harmonized_flows() -> Vec<TradeRecord> {
    let rows = [
        (68, 21, "236", 2019, 10.0),
        (68, 231, "236", 2019, 5.0),
        (79, 21, "236", 2019, 7.0),
        (79, 68, "236", 2019, 3.0),
        (21, 351, "236", 2019, 120.0),
        (231, 351, "236", 2019, 90.0),
        (21, 351, "236", 2020, 130.0),
        (231, 68, "1632", 2020, 4.0),
        (351, 999, "236", 2020, 2.0),
    ];
    rows.iter()
        .map(|&(reporter, partner, product, year, value)| {
            flow(CANONICAL, reporter, partner, product, "export_quantity", year, value)
                .harmonized_copy()
        })
        .collect()
}

fn totals_by_product_and_period<'a>(
    rows: impl Iterator<Item = (&'a str, i32, f64)>,
) -> BTreeMap<(String, i32), f64> {
    let mut totals = BTreeMap::new();
    for (product, period, value) in rows {
        *totals.entry((product.to_string(), period)).or_insert(0.0) += value;
    }
    totals
}

#[test]
fn test_grouping_conserves_totals() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = harmonized_flows();
    let expected = totals_by_product_and_period(
        records.iter().map(|r| (r.product_code.as_str(), r.period, r.value)),
    );

    for grouping in [
        CountryGrouping::Identity,
        CountryGrouping::Continent,
        CountryGrouping::SubContinent,
        CountryGrouping::Eu27Row,
    ] {
        let grouped = aggregate_by_group(&records, &tables.countries, grouping, grouping);
        let actual = totals_by_product_and_period(
            grouped.iter().map(|g| (g.product_code.as_str(), g.period, g.value)),
        );
        assert_eq!(actual.len(), expected.len(), "grouping {grouping}");
        for (key, total) in &expected {
            assert!((actual[key] - total).abs() < 1e-9, "grouping {grouping} key {key:?}");
        }
        let count: usize = grouped.iter().map(|g| g.record_count).sum();
        assert_eq!(count, records.len());
    }
    Ok(())
}

#[test]
fn test_continent_grouping_labels() -> anyhow::Result<()> {
    let tables = tables()?;
    let grouped = aggregate_by_group(
        &harmonized_flows(),
        &tables.countries,
        CountryGrouping::Continent,
        CountryGrouping::Continent,
    );

    let europe_to_americas: f64 = grouped
        .iter()
        .filter(|g| g.reporter_group == "Europe" && g.partner_group.as_deref() == Some("Americas"))
        .map(|g| g.value)
        .sum();
    assert!((europe_to_americas - 22.0).abs() < 1e-9);

    let unknown_partner = grouped
        .iter()
        .find(|g| g.partner_group.as_deref() == Some(UNASSIGNED_LABEL))
        .map(|g| g.value);
    assert_eq!(unknown_partner, Some(2.0));
    assert!(grouped.iter().all(|g| g.reporter_code.is_none()));
    Ok(())
}

#[test]
fn test_eu_row_split_of_non_member() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = vec![
        flow(CANONICAL, 21, 351, "236", "export_quantity", 2020, 50.0).harmonized_copy(),
        flow(CANONICAL, 21, 231, "236", "export_quantity", 2020, 25.0).harmonized_copy(),
    ];

    let grouped = eu_row_aggregate(&records, &tables.countries, GroupingSide::Reporter);

    let eu: f64 = grouped
        .iter()
        .filter(|g| g.reporter_group == EU27_LABEL)
        .map(|g| g.value)
        .sum();
    let row: f64 = grouped
        .iter()
        .filter(|g| g.reporter_group == ROW_LABEL)
        .map(|g| g.value)
        .sum();
    assert_eq!(eu, 0.0);
    assert!((row - 75.0).abs() < 1e-9);
    assert!(grouped.iter().all(|g| g.partner_code.is_some()));
    Ok(())
}

#[test]
fn test_eu_row_split_on_partner_side() -> anyhow::Result<()> {
    let tables = tables()?;
    let grouped = eu_row_aggregate(&harmonized_flows(), &tables.countries, GroupingSide::Partner);

    let usa_to_eu: f64 = grouped
        .iter()
        .filter(|g| g.reporter_code == Some(231) && g.partner_group.as_deref() == Some(EU27_LABEL))
        .map(|g| g.value)
        .sum();
    assert!((usa_to_eu - 4.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_regroup_with_same_rules_is_stable() -> anyhow::Result<()> {
    let tables = tables()?;
    let grouped = aggregate_by_group(
        &harmonized_flows(),
        &tables.countries,
        CountryGrouping::Eu27Row,
        CountryGrouping::Identity,
    );

    let again = regroup(
        &grouped,
        &tables.countries,
        CountryGrouping::Eu27Row,
        CountryGrouping::Identity,
    );
    assert_eq!(grouped, again);

    let coarser = regroup(
        &grouped,
        &tables.countries,
        CountryGrouping::Eu27Row,
        CountryGrouping::Continent,
    );
    assert!(coarser.len() <= grouped.len());
    Ok(())
}

#[test]
fn test_individual_country_filter_and_world_check() -> anyhow::Result<()> {
    let tables = tables()?;
    let mut records = harmonized_flows();
    let world = flow(CANONICAL, 5000, 351, "236", "export_quantity", 2019, 215.0);
    records.push(world.harmonized_copy());

    let checks = compare_aggregate_to_constituents(&records, &tables.countries, 5000);
    let china_2019 = checks
        .iter()
        .find(|c| c.partner_code == Some(351) && c.period == 2019)
        .ok_or_else(|| anyhow::anyhow!("missing check"))?;
    assert_eq!(china_2019.aggregate_value, Some(215.0));
    assert!((china_2019.constituents_value - 210.0).abs() < 1e-9);
    assert_eq!(china_2019.constituent_count, 2);

    let (retained, removed) = retain_individual_countries(records, &tables.countries);
    assert_eq!(removed, 1);
    assert!(retained.iter().all(|r| r.reporter_code != 5000));
    Ok(())
}

#[test]
fn test_nlargest_per_slice() -> anyhow::Result<()> {
    let records = harmonized_flows();
    let spec = RankingSpec::top(2)
        .with_agg_groups(vec![Column::ReporterCode])
        .with_slice_groups(vec![Column::Period]);

    let ranked = nlargest(&records, &spec)?;

    let mut per_slice: BTreeMap<KeyValue, Vec<f64>> = BTreeMap::new();
    for row in &ranked {
        per_slice
            .entry(row.keys[&Column::Period].clone())
            .or_default()
            .push(row.primary_value());
    }
    assert_eq!(per_slice.len(), 2);
    for values in per_slice.values() {
        assert!(values.len() <= 2);
        assert!(values.windows(2).all(|w| w[0] >= w[1]));
    }
    assert_eq!(per_slice[&KeyValue::Int(2019)], vec![120.0, 90.0]);
    assert_eq!(per_slice[&KeyValue::Int(2020)], vec![130.0, 4.0]);
    assert_eq!(ranked[0].rank, 1);
    Ok(())
}

#[test]
fn test_nlargest_small_group_is_returned_whole() -> anyhow::Result<()> {
    let records = harmonized_flows();
    let spec = RankingSpec::top(5).with_agg_groups(vec![Column::ProductCode]);

    let ranked = nlargest(&records, &spec)?;

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].keys[&Column::ProductCode], KeyValue::Text("236".into()));
    assert!((ranked[0].primary_value() - 367.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_nlargest_time_average() -> anyhow::Result<()> {
    let records = harmonized_flows();
    let spec = RankingSpec::top(1)
        .with_agg_groups(vec![Column::ReporterCode])
        .with_time_average(true);

    let ranked = nlargest(&records, &spec)?;

    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].keys[&Column::ReporterCode], KeyValue::Int(21));
    assert!((ranked[0].primary_value() - 125.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_nlargest_rejects_invalid_spec() {
    let records = harmonized_flows();

    let err = nlargest(&records, &RankingSpec::top(0)).unwrap_err();
    assert!(matches!(err, HarmonizeError::Configuration(_)));

    let spec = RankingSpec::top(3)
        .with_agg_groups(vec![Column::Year])
        .with_time_average(true);
    let err = nlargest(&records, &spec).unwrap_err();
    assert!(matches!(err, HarmonizeError::Configuration(_)));
}
