//! Tests for mirror-flow pairing and cross-source merging

use trade_harmonizer::algorithm::mirror::{
    ESTIMATE_FLAG, annualize_monthly, compare_sources, default_match_keys,
};
use trade_harmonizer::{
    Column, HarmonizeError, MirrorComparator, MirrorConfig, TradeRecord, UnmappedPolicy,
    merge_sources, pair_mirrors, resolve,
};

use crate::utils::{CANONICAL, HarmonizedCopy, NATIVE, flow, tables};

fn harmonized(
    source: &str,
    reporter: i64,
    partner: i64,
    product: &str,
    element: &str,
    value: f64,
) -> TradeRecord {
    flow(source, reporter, partner, product, element, 2020, value).harmonized_copy()
}

#[test]
fn test_consistent_mirror_flows() -> anyhow::Result<()> {
    let a = vec![harmonized(CANONICAL, 68, 21, "236", "export_quantity", 100.0)];
    let b = vec![harmonized(CANONICAL, 21, 68, "236", "import_quantity", 100.0)];

    let forward = pair_mirrors(&a, &b, &default_match_keys())?;
    let backward = pair_mirrors(&b, &a, &default_match_keys())?;

    assert_eq!(forward[0].value_mirror, Some(100.0));
    assert_eq!(backward[0].value_mirror, Some(100.0));
    assert_eq!(forward[0].discrepancy(), Some(0.0));
    assert_eq!(forward[0].source_mirror.as_deref(), Some(CANONICAL));
    Ok(())
}

#[test]
fn test_discrepancy_of_inconsistent_reports() -> anyhow::Result<()> {
    let records = vec![
        harmonized(CANONICAL, 68, 21, "236", "export_quantity", 100.0),
        harmonized(CANONICAL, 21, 68, "236", "import_quantity", 90.0),
        harmonized(CANONICAL, 68, 231, "236", "export_quantity", 12.0),
    ];

    let paired = pair_mirrors(&records, &records, &default_match_keys())?;

    assert_eq!(paired.len(), records.len());
    assert!((paired[0].discrepancy().unwrap_or(f64::NAN) - 10.0).abs() < 1e-9);
    assert!((paired[1].discrepancy().unwrap_or(f64::NAN) + 10.0).abs() < 1e-9);
    assert!(!paired[2].is_matched());
    assert_eq!(paired[2].discrepancy(), None);
    Ok(())
}

#[test]
fn test_product_must_match() -> anyhow::Result<()> {
    let a = vec![harmonized(CANONICAL, 68, 21, "236", "export_quantity", 100.0)];
    let b = vec![harmonized(CANONICAL, 21, 68, "1632", "import_quantity", 100.0)];

    let paired = pair_mirrors(&a, &b, &default_match_keys())?;
    assert_eq!(paired[0].value_mirror, None);

    let paired = pair_mirrors(&a, &b, &[Column::Period, Column::Unit])?;
    assert_eq!(paired[0].value_mirror, Some(100.0));
    Ok(())
}

#[test]
fn test_duplicate_flows_are_rejected() {
    let a = vec![
        harmonized(CANONICAL, 68, 21, "236", "export_quantity", 100.0),
        harmonized(CANONICAL, 68, 21, "236", "export_quantity", 50.0),
    ];
    let b = vec![harmonized(CANONICAL, 21, 68, "236", "import_quantity", 150.0)];

    let err = pair_mirrors(&a, &b, &default_match_keys()).unwrap_err();
    assert!(matches!(err, HarmonizeError::ComparisonKey(_)));

    let err = pair_mirrors(&b, &a, &default_match_keys()).unwrap_err();
    assert!(matches!(err, HarmonizeError::ComparisonKey(_)));
}

#[test]
fn test_comparator_requires_resolved_records() -> anyhow::Result<()> {
    let tables = tables()?;
    let comparator = MirrorComparator::new(&tables.products, MirrorConfig::default())?;
    let native = vec![flow(NATIVE, 251, 76, "120110", "export_quantity", 2020, 1.0)];

    let err = comparator.compare(native, Vec::new()).unwrap_err();
    assert!(matches!(err, HarmonizeError::Configuration(_)));
    Ok(())
}

#[test]
fn test_cross_source_comparison_after_resolution() -> anyhow::Result<()> {
    let tables = tables()?;
    let faostat = resolve(
        vec![flow(CANONICAL, 68, 21, "236", "export_quantity", 2020, 100.0)],
        &tables,
        UnmappedPolicy::Fail,
    )?;
    let comtrade = resolve(
        vec![
            flow(NATIVE, 76, 251, "120110", "import_quantity", 2020, 60.0),
            flow(NATIVE, 76, 251, "120190", "import_quantity", 2020, 35.0),
        ],
        &tables,
        UnmappedPolicy::Fail,
    )?;

    let comparator = MirrorComparator::new(&tables.products, MirrorConfig::default())?;
    let outcome = comparator.compare(faostat.resolved, comtrade.resolved)?;

    assert_eq!(outcome.pairs.len(), 1);
    assert_eq!(outcome.pairs[0].value_mirror, Some(95.0));
    assert_eq!(outcome.pairs[0].source_mirror.as_deref(), Some(NATIVE));
    assert!((outcome.pairs[0].discrepancy().unwrap_or(f64::NAN) - 5.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_strict_mode_excludes_partial_products() -> anyhow::Result<()> {
    let tables = tables()?;
    let a = vec![
        harmonized(CANONICAL, 231, 68, "1632", "export_quantity", 4.0),
        harmonized(CANONICAL, 231, 68, "236", "export_quantity", 9.0),
    ];
    let b = vec![
        harmonized(NATIVE, 68, 231, "1632", "import_quantity", 3.0),
        harmonized(NATIVE, 68, 231, "236", "import_quantity", 9.0),
    ];

    let strict_config = MirrorConfig::default().with_strict(true);
    let strict = MirrorComparator::new(&tables.products, strict_config)?;
    let outcome = strict.compare(a.clone(), b.clone())?;
    assert_eq!(outcome.excluded_rows, 2);
    assert_eq!(outcome.pairs.len(), 1);
    assert_eq!(outcome.pairs[0].record.product_code, "236");

    let lenient = MirrorComparator::new(&tables.products, MirrorConfig::default())?;
    let outcome = lenient.compare(a, b)?;
    assert_eq!(outcome.excluded_rows, 0);
    assert_eq!(outcome.pairs.len(), 2);
    assert_eq!(outcome.pairs[0].value_mirror, Some(3.0));
    Ok(())
}

#[test]
fn test_lenient_mode_sums_partial_product_collisions() -> anyhow::Result<()> {
    let tables = tables()?;
    let a = vec![
        harmonized(CANONICAL, 231, 68, "1632", "export_quantity", 4.0),
        harmonized(CANONICAL, 231, 68, "1632", "export_quantity", 1.0),
    ];
    let b = vec![harmonized(NATIVE, 68, 231, "1632", "import_quantity", 5.0)];

    let comparator = MirrorComparator::new(&tables.products, MirrorConfig::default())?;
    let outcome = comparator.compare(a, b)?;

    assert_eq!(outcome.combined_rows, 1);
    assert_eq!(outcome.pairs.len(), 1);
    assert_eq!(outcome.pairs[0].record.value, 5.0);
    assert_eq!(outcome.pairs[0].discrepancy(), Some(0.0));
    Ok(())
}

#[test]
fn test_partial_products_are_not_summed_across_sources() -> anyhow::Result<()> {
    let tables = tables()?;
    let comparator = MirrorComparator::new(&tables.products, MirrorConfig::default())?;

    for product in ["1632", "236"] {
        let a = vec![
            harmonized(CANONICAL, 21, 231, product, "export_quantity", 100.0),
            harmonized(NATIVE, 21, 231, product, "export_quantity", 90.0),
        ];
        let b = vec![harmonized(CANONICAL, 231, 21, product, "import_quantity", 95.0)];

        let outcome = comparator.compare(a, b)?;

        assert_eq!(outcome.combined_rows, 0, "product {product}");
        let rows: Vec<(&str, f64, Option<f64>)> = outcome
            .pairs
            .iter()
            .map(|p| (p.record.source.as_str(), p.record.value, p.value_mirror))
            .collect();
        assert_eq!(
            rows,
            vec![(CANONICAL, 100.0, Some(95.0)), (NATIVE, 90.0, Some(95.0))],
            "product {product}"
        );
    }
    Ok(())
}

#[test]
fn test_invalid_match_keys_are_rejected() -> anyhow::Result<()> {
    let tables = tables()?;
    let config =
        MirrorConfig::default().with_match_keys(vec![Column::ProductCode, Column::PartnerCode]);
    let err = MirrorComparator::new(&tables.products, config).unwrap_err();
    assert!(matches!(err, HarmonizeError::Configuration(_)));
    Ok(())
}

#[test]
fn test_merge_sources_normalizes_and_annualizes() -> anyhow::Result<()> {
    let yearly = vec![
        TradeRecord::builder(CANONICAL)
            .reporter(21, "Brazil")
            .partner(351, "China")
            .product_code("236")
            .element("export_quantity")
            .year(2020)
            .unit("tonnes")
            .value(2.0)
            .harmonized()
            .build(),
    ];
    let monthly: Vec<TradeRecord> = (1..=12)
        .map(|month| {
            TradeRecord::builder(NATIVE)
                .reporter(21, "Brazil")
                .partner(351, "China")
                .product_code("236")
                .element("export_quantity")
                .period(202_000 + month)
                .unit("kg")
                .value(150.0)
                .harmonized()
                .build()
        })
        .collect();

    let merged = merge_sources(vec![yearly, monthly], true)?;

    assert_eq!(merged.len(), 2);
    assert!(merged.iter().all(|r| r.unit == "kg" && r.period == 2020));

    let comparison = compare_sources(&merged);
    assert_eq!(comparison.len(), 1);
    assert_eq!(comparison[0].value(CANONICAL), Some(2000.0));
    assert_eq!(comparison[0].value(NATIVE), Some(1800.0));
    assert_eq!(comparison[0].difference(CANONICAL, NATIVE), Some(200.0));
    Ok(())
}

#[test]
fn test_merge_rejects_conflicting_names_when_strict() {
    let a = vec![harmonized(CANONICAL, 68, 21, "236", "export_quantity", 1.0)];
    let mut renamed = harmonized(NATIVE, 68, 21, "236", "export_quantity", 1.0);
    renamed.reporter = "French Republic".to_string();

    let err = merge_sources(vec![a.clone(), vec![renamed.clone()]], true).unwrap_err();
    assert!(matches!(err, HarmonizeError::CrosswalkIntegrity(_)));

    let merged = merge_sources(vec![a, vec![renamed]], false);
    assert!(merged.is_ok_and(|rows| rows.len() == 2));
}

#[test]
fn test_incomplete_year_gets_trailing_estimate() {
    let reports = [(202_006, 1.0), (202_012, 2.0), (202_101, 10.0), (202_103, 20.0)];
    let monthly: Vec<TradeRecord> = reports
        .iter()
        .map(|&(period, value)| {
            TradeRecord::builder(NATIVE)
                .reporter(21, "Brazil")
                .product_code("236")
                .element("production")
                .period(period)
                .unit("t")
                .value(value)
                .harmonized()
                .build()
        })
        .collect();

    let yearly = annualize_monthly(monthly);

    assert_eq!(yearly.len(), 2);
    let y2020 = yearly.iter().find(|r| r.year == 2020).map(|r| (r.value, r.flag.clone()));
    let y2021 = yearly.iter().find(|r| r.year == 2021).map(|r| (r.value, r.flag.clone()));
    assert_eq!(y2020, Some((3.0, None)));
    // April 2020 through March 2021
    assert_eq!(y2021, Some((33.0, Some(ESTIMATE_FLAG.to_string()))));
}
