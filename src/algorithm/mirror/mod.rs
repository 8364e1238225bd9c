//! Mirror flow comparison
//!
//! This module reconciles the two independent reports of the same bilateral
//! trade event and lines up independent estimates from different sources:
//!
//! 1. Pairing of export and import reports with a `value_mirror` column (`pairing`)
//! 2. Unit normalization, monthly annualization and cross-source merge (`merge`)

pub mod merge;
pub mod pairing;

pub use merge::{
    ESTIMATE_FLAG, SourceComparison, UNIT_CONVERSIONS, annualize_monthly, compare_sources,
    merge_sources, normalize_units,
};
pub use pairing::{
    MirrorComparator, MirrorConfig, MirrorOutcome, MirroredRecord, default_match_keys, pair_mirrors,
};
