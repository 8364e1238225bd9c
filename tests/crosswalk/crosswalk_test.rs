//! Tests for crosswalk validation and record resolution

use trade_harmonizer::crosswalk::{MappedField, UnmappedKind};
use trade_harmonizer::{
    CountryCrosswalkRow, CrosswalkTables, HarmonizeError, ProductCrosswalkRow, Resolver,
    ResolverConfig, UnmappedPolicy, resolve,
};

use crate::utils::{CANONICAL, NATIVE, country_rows, flow, product_rows, tables};

#[test]
fn test_resolution_maps_codes_and_names() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = vec![flow(NATIVE, 276, 76, "120110", "export_quantity", 2020, 500.0)];

    let outcome = resolve(records, &tables, UnmappedPolicy::Fail)?;

    assert_eq!(outcome.resolved.len(), 1);
    let record = &outcome.resolved[0];
    assert_eq!(record.reporter_code, 79);
    assert_eq!(record.reporter, "Germany");
    assert_eq!(record.partner_code, Some(21));
    assert_eq!(record.partner.as_deref(), Some("Brazil"));
    assert_eq!(record.product_code, "236");
    assert_eq!(record.product.as_deref(), Some("Soya beans"));
    assert!(record.harmonized);
    Ok(())
}

#[test]
fn test_resolution_is_idempotent() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = vec![
        flow(NATIVE, 251, 76, "120110", "export_quantity", 2020, 10.0),
        flow(NATIVE, 492, 76, "120110", "export_quantity", 2020, 1.0),
        flow(NATIVE, 251, 76, "120190", "export_quantity", 2020, 4.0),
        flow(NATIVE, 842, 156, "440711", "import_quantity", 2021, 7.5),
    ];

    let once = resolve(records, &tables, UnmappedPolicy::Fail)?;
    let twice = resolve(once.resolved.clone(), &tables, UnmappedPolicy::Fail)?;

    assert_eq!(once.resolved.len(), 2);
    assert_eq!(once.resolved, twice.resolved);
    assert_eq!(twice.report.collapsed_rows, 0);
    Ok(())
}

#[test]
fn test_constituents_sum_to_canonical_total() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = vec![
        flow(NATIVE, 251, 76, "120110", "export_quantity", 2020, 10.0),
        flow(NATIVE, 492, 76, "120110", "export_quantity", 2020, 1.0),
        flow(NATIVE, 251, 76, "120190", "export_quantity", 2020, 4.0),
    ];

    let outcome = resolve(records, &tables, UnmappedPolicy::Fail)?;

    assert_eq!(outcome.resolved.len(), 1);
    assert_eq!(outcome.resolved[0].reporter_code, 68);
    assert!((outcome.resolved[0].value - 15.0).abs() < 1e-9);
    assert_eq!(outcome.report.collapsed_rows, 2);
    Ok(())
}

#[test]
fn test_aggregate_reporter_wins_for_flows_to_world() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = vec![
        flow(NATIVE, 251, 0, "120110", "export_quantity", 2020, 10.0),
        flow(NATIVE, 492, 0, "120110", "export_quantity", 2020, 2.0),
        flow(NATIVE, 250, 0, "120110", "export_quantity", 2020, 12.0),
    ];

    let outcome = resolve(records, &tables, UnmappedPolicy::Fail)?;

    assert_eq!(outcome.resolved.len(), 1);
    assert_eq!(outcome.resolved[0].reporter_code, 68);
    assert_eq!(outcome.resolved[0].partner_code, Some(5000));
    assert!((outcome.resolved[0].value - 12.0).abs() < 1e-9);
    assert_eq!(outcome.report.discarded_rows, 2);
    assert!(outcome.discarded.iter().all(|r| r.reporter_code == 68));
    Ok(())
}

#[test]
fn test_aggregate_partner_alone_keeps_constituent_sum() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = vec![
        flow(NATIVE, 251, 0, "120110", "export_quantity", 2020, 10.0),
        flow(NATIVE, 492, 0, "120110", "export_quantity", 2020, 2.0),
    ];

    let outcome = resolve(records, &tables, UnmappedPolicy::Fail)?;

    assert_eq!(outcome.resolved.len(), 1);
    assert!((outcome.resolved[0].value - 12.0).abs() < 1e-9);
    assert!(outcome.discarded.is_empty());
    Ok(())
}

#[test]
fn test_ambiguous_crosswalk_is_rejected() {
    let mut countries = country_rows();
    countries.push(CountryCrosswalkRow::identity(NATIVE, 251, "France").mapped_to(Some(79)));

    let err = CrosswalkTables::from_rows(countries, product_rows()).unwrap_err();
    assert!(matches!(err, HarmonizeError::CrosswalkIntegrity(_)));
    assert!(err.is_integrity_error());

    let mut products = product_rows();
    products.push(ProductCrosswalkRow::new(NATIVE, "120110", Some("1632"), "hs"));
    let err = CrosswalkTables::from_rows(country_rows(), products).unwrap_err();
    assert!(matches!(err, HarmonizeError::CrosswalkIntegrity(_)));
}

#[test]
fn test_fail_policy_errors_on_unmapped_code() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = vec![
        flow(NATIVE, 251, 76, "120110", "export_quantity", 2020, 10.0),
        flow(NATIVE, 999, 76, "120110", "export_quantity", 2020, 3.0),
    ];

    let err = resolve(records, &tables, UnmappedPolicy::Fail).unwrap_err();
    assert!(matches!(err, HarmonizeError::CrosswalkIntegrity(_)));
    Ok(())
}

#[test]
fn test_drop_policy_reports_count_and_sample() -> anyhow::Result<()> {
    let tables = tables()?;
    let mut records: Vec<_> = (0..5)
        .map(|i| flow(NATIVE, 900 + i, 76, "120110", "export_quantity", 2020, 1.0))
        .collect();
    records.push(flow(NATIVE, 251, 76, "120110", "export_quantity", 2020, 10.0));

    let config = ResolverConfig::default()
        .with_unmapped_policy(UnmappedPolicy::Drop)
        .with_sample_size(2);
    let outcome = Resolver::new(&tables, config).resolve(records)?;

    assert_eq!(outcome.resolved.len(), 1);
    assert_eq!(outcome.report.unmapped_rows, 5);
    assert_eq!(outcome.report.dropped_rows, 5);
    assert_eq!(outcome.unmapped.len(), 2);
    assert_eq!(outcome.report.input_rows, 6);
    Ok(())
}

#[test]
fn test_keep_policy_returns_partial_canonical_codes() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = vec![
        flow(NATIVE, 251, 999, "120110", "export_quantity", 2020, 1.0),
        flow(NATIVE, 251, 76, "440719", "export_quantity", 2020, 2.0),
        flow(NATIVE, 251, 76, "120110", "export_quantity", 2020, 3.0),
    ];

    let outcome = resolve(records, &tables, UnmappedPolicy::KeepWithNullCanonical)?;

    assert_eq!(outcome.resolved.len(), 1);
    assert_eq!(outcome.unmapped.len(), 2);
    // kept rows are returned in `unmapped` only
    assert!(outcome.resolved.iter().all(|r| r.value == 3.0));
    assert_eq!(outcome.report.dropped_rows, 0);

    let missing_partner = &outcome.unmapped[0];
    assert_eq!(missing_partner.reporter_canonical, Some(68));
    assert_eq!(missing_partner.partner_canonical, None);
    assert_eq!(missing_partner.product_canonical.as_deref(), Some("236"));
    assert_eq!(missing_partner.reasons.len(), 1);
    assert_eq!(missing_partner.reasons[0].field, MappedField::Partner);
    assert_eq!(missing_partner.reasons[0].kind, UnmappedKind::MissingFromCrosswalk);

    let unmapped_product = &outcome.unmapped[1];
    assert_eq!(unmapped_product.product_canonical, None);
    assert_eq!(unmapped_product.reasons[0].kind, UnmappedKind::NoCanonical);
    Ok(())
}

#[test]
fn test_historical_entity_without_successor_is_unmapped() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = vec![flow(NATIVE, 810, 76, "120110", "export_quantity", 1985, 1.0)];

    let outcome = resolve(records, &tables, UnmappedPolicy::KeepWithNullCanonical)?;

    assert!(outcome.resolved.is_empty());
    assert_eq!(outcome.unmapped.len(), 1);
    assert_eq!(outcome.unmapped[0].reasons[0].field, MappedField::Reporter);
    assert_eq!(
        outcome.unmapped[0].reasons[0].kind,
        UnmappedKind::HistoricalWithoutSuccessor
    );
    Ok(())
}

#[test]
fn test_canonical_source_passes_through() -> anyhow::Result<()> {
    let tables = tables()?;
    let records = vec![flow(CANONICAL, 68, 21, "236", "export_quantity", 2020, 8.0)];

    let outcome = resolve(records, &tables, UnmappedPolicy::Fail)?;

    assert_eq!(outcome.resolved[0].reporter, "France");
    assert_eq!(outcome.resolved[0].reporter_code, 68);
    assert!(tables.countries.is_eu27(68));
    assert_eq!(tables.countries.eu27_members(), vec![68, 79]);
    Ok(())
}
