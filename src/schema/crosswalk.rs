//! Crosswalk tables from record batches

use arrow::record_batch::RecordBatch;

use crate::error::Result;
use crate::models::{CountryCrosswalkRow, ProductCrosswalkRow};
use crate::schema::require_columns;

/// Mandatory columns of the country crosswalk table
pub const COUNTRY_CROSSWALK_COLUMNS: [&str; 4] = ["source", "source_code", "source_name", "status"];

/// Mandatory columns of the product crosswalk table
pub const PRODUCT_CROSSWALK_COLUMNS: [&str; 3] = ["source", "source_code", "classification_family"];

/// Read country crosswalk rows from a batch
///
/// `canonical_code`, `iso3_code`, `continent`, `sub_continent` and `eu27`
/// are optional columns; a null `canonical_code` marks the code as
/// non-mappable.
///
/// # Errors
/// Returns `Schema` for missing or null mandatory columns and
/// `Serialization` for values of the wrong type, including unknown statuses
pub fn country_crosswalk_from_batch(batch: &RecordBatch) -> Result<Vec<CountryCrosswalkRow>> {
    require_columns(batch, &COUNTRY_CROSSWALK_COLUMNS, "Country crosswalk")?;
    Ok(serde_arrow::from_record_batch::<Vec<CountryCrosswalkRow>>(batch)?)
}

/// Read product crosswalk rows from a batch
///
/// # Errors
/// Returns `Schema` for missing or null mandatory columns and
/// `Serialization` for values of the wrong type
pub fn product_crosswalk_from_batch(batch: &RecordBatch) -> Result<Vec<ProductCrosswalkRow>> {
    require_columns(batch, &PRODUCT_CROSSWALK_COLUMNS, "Product crosswalk")?;
    Ok(serde_arrow::from_record_batch::<Vec<ProductCrosswalkRow>>(batch)?)
}
