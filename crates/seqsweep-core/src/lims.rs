use crate::error::Result;
use chrono::NaiveDate;
use std::collections::HashSet;

/// Read-only view of the LIMS. The facility's LIMS is the second authority
/// on sample release; deleters require it to agree with the metadata store
/// before touching customer data.
pub trait Lims {
    /// Samples the LIMS records as released to the customer.
    fn released_sample_ids(&self) -> Result<HashSet<String>>;

    /// The date a sample's data was released, if it has been.
    fn sample_release_date(&self, sample_id: &str) -> Result<Option<NaiveDate>>;
}
