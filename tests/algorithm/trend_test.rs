//! Tests for segmented trend detection over record batches

use trade_harmonizer::algorithm::trend::{SeriesKey, TrendDirection, build_series};
use trade_harmonizer::{HarmonizeError, ObjectiveFunction, TrendConfig, TrendDetector, TrendStatus};

use crate::utils::{noisy_series, series_records};

fn linear_points() -> Vec<(i32, f64)> {
    (1990..=2020).map(|year| (year, 1000.0 + 50.0 * f64::from(year))).collect()
}

fn broken_points() -> Vec<(i32, f64)> {
    (2000..2020)
        .map(|year| {
            let t = f64::from(year - 2000);
            let value = if year < 2010 { 100.0 + 5.0 * t } else { 400.0 - 8.0 * (t - 10.0) };
            (year, value)
        })
        .collect()
}

#[test]
fn test_linear_series_has_one_significant_segment() -> anyhow::Result<()> {
    let detector = TrendDetector::new(TrendConfig::default())?;
    let results = detector.detect_all(&series_records(21, "236", &linear_points()))?;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.status, TrendStatus::Ok);
    assert_eq!(result.n_points, 31);
    assert_eq!(result.segments.len(), 1);

    let segment = result.most_recent_segment.ok_or_else(|| anyhow::anyhow!("no segment"))?;
    assert_eq!((segment.start_year, segment.end_year), (1990, 2020));
    assert!((segment.slope - 50.0).abs() < 1e-6);
    assert!(segment.fit_score > 0.999_999);

    assert!(result.mk_significant);
    assert!((result.mk_slope.unwrap_or_default() - 50.0).abs() < 1e-9);
    let mk = result.mann_kendall.ok_or_else(|| anyhow::anyhow!("no test"))?;
    assert_eq!(mk.trend, TrendDirection::Increasing);
    Ok(())
}

#[test]
fn test_short_series_reports_insufficient_data() -> anyhow::Result<()> {
    let detector = TrendDetector::new(TrendConfig::default())?;
    let points = [(2018, 5.0), (2019, 6.0), (2020, 7.0)];
    let results = detector.detect_all(&series_records(21, "236", &points))?;

    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].status,
        TrendStatus::InsufficientData { points: 3, required: 7 }
    );
    assert!(results[0].is_insufficient());
    assert!(results[0].most_recent_segment.is_none());
    Ok(())
}

#[test]
fn test_constant_series_is_flat_and_not_significant() -> anyhow::Result<()> {
    let detector = TrendDetector::new(TrendConfig::default())?;
    let points: Vec<(i32, f64)> = (2000..=2015).map(|year| (year, 250.0)).collect();
    let results = detector.detect_all(&series_records(79, "236", &points))?;

    let result = &results[0];
    assert_eq!(result.status, TrendStatus::Ok);
    assert_eq!(result.segments.len(), 1);
    assert_eq!(result.most_recent_segment.map(|s| s.slope), Some(0.0));
    assert!(!result.mk_significant);
    assert_eq!(result.absolute_change, Some(0.0));
    Ok(())
}

#[test]
fn test_objective_selects_most_recent_segment() -> anyhow::Result<()> {
    let points = broken_points();
    let records = series_records(21, "236", &points);

    for objective in [ObjectiveFunction::Rss, ObjectiveFunction::R2] {
        let config = TrendConfig::builder()
            .objective(objective)
            .min_data_points(5)
            .build()?;
        let results = TrendDetector::new(config)?.detect_all(&records)?;

        let segment = results[0]
            .most_recent_segment
            .ok_or_else(|| anyhow::anyhow!("no segment for {objective}"))?;
        assert_eq!(results[0].segments.len(), 2, "objective {objective}");
        assert_eq!(segment.start_year, 2010, "objective {objective}");
        assert!((segment.slope + 8.0).abs() < 1e-6, "objective {objective}");
        assert!(results[0].mk_significant);
    }
    Ok(())
}

#[test]
fn test_noisy_series_recovers_slope() -> anyhow::Result<()> {
    let points = noisy_series(1995, 2020, 1000.0, 20.0, 5.0, 42);
    let detector = TrendDetector::new(TrendConfig::default())?;
    let results = detector.detect_all(&series_records(21, "236", &points))?;

    let result = &results[0];
    let segment = result
        .most_recent_segment
        .ok_or_else(|| anyhow::anyhow!("no segment"))?;
    assert!(segment.n_points >= 7);
    assert!((segment.slope - 20.0).abs() < 5.0);
    assert!(result.mk_significant);
    assert!(result.relative_change.is_some_and(|change| change > 0.0));
    Ok(())
}

#[test]
fn test_parallel_matches_sequential() -> anyhow::Result<()> {
    let mut records = Vec::new();
    for (i, reporter) in [21, 68, 79, 231, 351].into_iter().enumerate() {
        let seed = 7 + i as u64;
        let long = noisy_series(1990, 2020, 500.0, 3.0, 40.0, seed);
        let short = noisy_series(2015, 2020, 80.0, -1.0, 2.0, seed);
        records.extend(series_records(reporter, "236", &long));
        records.extend(series_records(reporter, "1632", &short));
    }

    let sequential = TrendDetector::new(TrendConfig::default())?.detect_all(&records)?;
    let config = TrendConfig::builder()
        .multi_process(true)
        .num_threads(3)
        .build()?;
    let parallel = TrendDetector::new(config)?.detect_all(&records)?;

    assert_eq!(sequential.len(), 10);
    assert_eq!(sequential, parallel);
    assert_eq!(sequential.iter().filter(|r| r.is_insufficient()).count(), 5);
    Ok(())
}

#[test]
fn test_series_are_split_by_key() {
    let mut records = series_records(21, "236", &linear_points());
    records.extend(series_records(68, "236", &linear_points()));

    let series = build_series(&records);

    assert_eq!(series.len(), 2);
    let keys: Vec<&SeriesKey> = series.keys().collect();
    assert_eq!(keys[0].reporter_code, 21);
    assert_eq!(keys[1].reporter_code, 68);
    assert!(series.values().all(|points| points.len() == 31));
}

#[test]
fn test_change_window_year_range() -> anyhow::Result<()> {
    let config = TrendConfig::builder().year_range(2000, 2004).build()?;
    let points: Vec<(i32, f64)> =
        (2000..=2010).map(|year| (year, f64::from(year - 1999))).collect();
    let results = TrendDetector::new(config)?.detect_all(&series_records(21, "236", &points))?;

    let change = results[0]
        .changes
        .last()
        .ok_or_else(|| anyhow::anyhow!("no change summary"))?;
    assert_eq!(change.reference_mean, Some(3.0));
    assert_eq!(change.absolute_change, Some(8.0));
    assert!(
        results[0]
            .relative_change
            .is_some_and(|change| (change - 800.0 / 3.0).abs() < 1e-9)
    );
    Ok(())
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let err = TrendConfig::builder().min_data_points(1).build().unwrap_err();
    assert!(matches!(err, HarmonizeError::Configuration(_)));

    let err = TrendConfig::builder().alpha(1.5).build().unwrap_err();
    assert!(matches!(err, HarmonizeError::Configuration(_)));

    let err = TrendConfig::builder().year_range(2010, 2000).build().unwrap_err();
    assert!(matches!(err, HarmonizeError::Configuration(_)));
}
