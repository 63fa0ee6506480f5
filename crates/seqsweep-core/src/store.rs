use crate::error::{Error, Result};
use crate::records::{DataDeletedState, ProcRecord, RunElementRecord, SampleRecord};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const SAMPLES: &str = "samples";
pub const RUNS: &str = "runs";
pub const RUN_ELEMENTS: &str = "run_elements";
pub const PROCS: &str = "analysis_driver_procs";

/// Raw document access to the REST metadata store. Implementations own the
/// transport; this crate only consumes documents and issues patches.
///
/// `get_documents` on the proc collection is expected to return documents
/// most-recent-first, as the REST API sorts on creation date.
pub trait MetadataClient {
    fn get_documents(&self, collection: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>>;

    fn get_document(&self, collection: &str, filters: &[(&str, &str)]) -> Result<Option<Value>> {
        Ok(self.get_documents(collection, filters)?.into_iter().next())
    }

    fn patch_entry(
        &self,
        collection: &str,
        payload: &Value,
        id_field: &str,
        id_value: &str,
    ) -> Result<()>;
}

/// Typed view over a `MetadataClient`, constructed fresh for each deletion
/// pass. Run-element lookups are memoised for the lifetime of the store, so
/// dropping it at the end of a pass is the cache invalidation boundary.
pub struct MetadataStore<'a> {
    client: &'a dyn MetadataClient,
    run_element_cache: RefCell<HashMap<String, Vec<RunElementRecord>>>,
}

impl<'a> MetadataStore<'a> {
    pub fn new(client: &'a dyn MetadataClient) -> Self {
        Self {
            client,
            run_element_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn samples_with_data_deleted(
        &self,
        state: DataDeletedState,
    ) -> Result<Vec<SampleRecord>> {
        self.client
            .get_documents(SAMPLES, &[("data_deleted", state.as_str())])?
            .iter()
            .map(SampleRecord::from_document)
            .collect()
    }

    pub fn sample(&self, sample_id: &str) -> Result<Option<SampleRecord>> {
        self.client
            .get_document(SAMPLES, &[("sample_id", sample_id)])?
            .as_ref()
            .map(SampleRecord::from_document)
            .transpose()
    }

    /// Samples the delivery pipeline has marked as sent to the customer.
    pub fn released_sample_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .client
            .get_documents(SAMPLES, &[("delivered", "yes")])?
            .iter()
            .map(SampleRecord::from_document)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(|s| s.sample_id)
            .collect())
    }

    pub fn samples_in_project(&self, project_id: &str) -> Result<Vec<SampleRecord>> {
        self.client
            .get_documents(SAMPLES, &[("project_id", project_id)])?
            .iter()
            .map(SampleRecord::from_document)
            .collect()
    }

    pub fn run_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .client
            .get_documents(RUNS, &[])?
            .iter()
            .map(|doc| {
                doc.get("run_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| Error::Record(format!("missing 'run_id' in {}", doc)))
            })
            .collect::<Result<Vec<_>>>()?;
        ids.sort();
        Ok(ids)
    }

    pub fn run_elements_for_sample(&self, sample_id: &str) -> Result<Vec<RunElementRecord>> {
        if let Some(cached) = self.run_element_cache.borrow().get(sample_id) {
            return Ok(cached.clone());
        }
        let elements: Vec<RunElementRecord> = self
            .client
            .get_documents(RUN_ELEMENTS, &[("sample_id", sample_id)])?
            .iter()
            .map(RunElementRecord::from_document)
            .collect::<Result<Vec<_>>>()?;
        self.run_element_cache
            .borrow_mut()
            .insert(sample_id.to_string(), elements.clone());
        Ok(elements)
    }

    pub fn run_elements_for_run(&self, run_id: &str) -> Result<Vec<RunElementRecord>> {
        self.client
            .get_documents(RUN_ELEMENTS, &[("run_id", run_id)])?
            .iter()
            .map(RunElementRecord::from_document)
            .collect()
    }

    pub fn most_recent_proc(&self, run_id: &str) -> Result<Option<ProcRecord>> {
        self.client
            .get_document(PROCS, &[("dataset_name", run_id)])?
            .as_ref()
            .map(ProcRecord::from_document)
            .transpose()
    }

    /// Advance a sample's `data_deleted` state. Transitions that skip a
    /// state or move backwards are rejected before anything is written.
    pub fn set_data_deleted(&self, sample: &SampleRecord, to: DataDeletedState) -> Result<()> {
        if !sample.data_deleted.can_advance_to(to) {
            return Err(Error::Transition {
                from: sample.data_deleted.to_string(),
                to: to.to_string(),
            });
        }
        debug!(
            "Patching {}: data_deleted {} -> {}",
            sample.sample_id, sample.data_deleted, to
        );
        self.client.patch_entry(
            SAMPLES,
            &json!({ "data_deleted": to.as_str() }),
            "sample_id",
            &sample.sample_id,
        )
    }

    /// Delivery bookkeeping is reset when a sample's fastqs are deleted, so
    /// a re-delivery would be flagged for review.
    pub fn reset_delivery_flags(&self, sample_id: &str) -> Result<()> {
        self.client.patch_entry(
            SAMPLES,
            &json!({ "files_delivered": "no", "files_downloaded": "no" }),
            "sample_id",
            sample_id,
        )
    }

    pub fn set_proc_status(&self, proc_id: &str, status: &str) -> Result<()> {
        self.client
            .patch_entry(PROCS, &json!({ "status": status }), "proc_id", proc_id)
    }
}
