#![allow(dead_code)]

use chrono::NaiveDate;
use seqsweep_core::archive::{ArchiveStateProbe, StateFlag};
use seqsweep_core::config::AppConfig;
use seqsweep_core::error::Result;
use seqsweep_core::lims::Lims;
use seqsweep_core::notify::Notifier;
use seqsweep_core::store::MetadataClient;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Config rooted under a tempdir, with every data root created.
pub fn test_config(root: &Path) -> AppConfig {
    let cfg = AppConfig {
        work_dir: root.join("work"),
        raw_data_dir: root.join("raw"),
        raw_archive_dir: root.join("raw_archive"),
        fastq_dir: root.join("fastq"),
        processed_data_dir: root.join("projects"),
        delivered_data_dir: root.join("delivery"),
        final_archive_dir: root.join("final_archive"),
        rest_api_url: "http://localhost/api".to_string(),
        lims_api_url: "http://localhost/lims".to_string(),
        raw_age_days: 14,
        final_age_days: 365,
        cluster_submit_prefix: None,
        hsm_state_cmd: "lfs hsm_state".to_string(),
        hsm_release_cmd: "lfs hsm_release".to_string(),
    };
    for dir in [
        &cfg.work_dir,
        &cfg.raw_data_dir,
        &cfg.raw_archive_dir,
        &cfg.fastq_dir,
        &cfg.processed_data_dir,
        &cfg.delivered_data_dir,
        &cfg.final_archive_dir,
    ] {
        fs::create_dir_all(dir).unwrap();
    }
    cfg
}

/// In-memory metadata store. Filters are exact string matches; patches are
/// recorded and (optionally) applied so later queries see the new state.
pub struct FakeClient {
    docs: RefCell<HashMap<String, Vec<Value>>>,
    pub patches: RefCell<Vec<(String, Value, String, String)>>,
    pub apply_patches: bool,
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            docs: RefCell::new(HashMap::new()),
            patches: RefCell::new(Vec::new()),
            apply_patches: true,
        }
    }

    pub fn insert(&self, collection: &str, doc: Value) {
        self.docs
            .borrow_mut()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    pub fn patched_fields(&self, id_value: &str) -> Vec<Value> {
        self.patches
            .borrow()
            .iter()
            .filter(|(_, _, _, id)| id == id_value)
            .map(|(_, payload, _, _)| payload.clone())
            .collect()
    }
}

impl MetadataClient for FakeClient {
    fn get_documents(&self, collection: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>> {
        Ok(self
            .docs
            .borrow()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| {
                        filters.iter().all(|(field, value)| {
                            doc.get(*field).and_then(Value::as_str) == Some(*value)
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn patch_entry(
        &self,
        collection: &str,
        payload: &Value,
        id_field: &str,
        id_value: &str,
    ) -> Result<()> {
        self.patches.borrow_mut().push((
            collection.to_string(),
            payload.clone(),
            id_field.to_string(),
            id_value.to_string(),
        ));
        if self.apply_patches {
            if let Some(docs) = self.docs.borrow_mut().get_mut(collection) {
                for doc in docs.iter_mut() {
                    if doc.get(id_field).and_then(Value::as_str) == Some(id_value) {
                        if let (Some(doc_obj), Some(payload_obj)) =
                            (doc.as_object_mut(), payload.as_object())
                        {
                            for (k, v) in payload_obj {
                                doc_obj.insert(k.clone(), v.clone());
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn sample_doc(sample_id: &str, project_id: &str, data_deleted: &str, delivered: &str) -> Value {
    json!({
        "sample_id": sample_id,
        "project_id": project_id,
        "user_sample_id": format!("u_{}", sample_id),
        "data_deleted": data_deleted,
        "delivered": delivered,
    })
}

pub fn run_element_doc(
    run_id: &str,
    project_id: &str,
    sample_id: &str,
    lane: u8,
    reviewed: &str,
    useable_date: &str,
) -> Value {
    json!({
        "run_id": run_id,
        "project_id": project_id,
        "sample_id": sample_id,
        "lane": lane,
        "reviewed": reviewed,
        "useable": "yes",
        "useable_date": useable_date,
    })
}

/// Probe over an in-memory state map. Unknown paths are unarchived.
pub struct FakeProbe {
    states: RefCell<HashMap<PathBuf, HashSet<StateFlag>>>,
    pub released: RefCell<Vec<PathBuf>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self {
            states: RefCell::new(HashMap::new()),
            released: RefCell::new(Vec::new()),
        }
    }

    pub fn set_archived(&self, path: &Path) {
        self.states.borrow_mut().insert(
            path.to_path_buf(),
            [StateFlag::Exists, StateFlag::Archived].into_iter().collect(),
        );
    }

    pub fn set_dirty(&self, path: &Path) {
        self.states.borrow_mut().insert(
            path.to_path_buf(),
            [StateFlag::Exists, StateFlag::Archived, StateFlag::Dirty]
                .into_iter()
                .collect(),
        );
    }
}

impl ArchiveStateProbe for FakeProbe {
    fn states(&self, path: &Path) -> Result<HashSet<StateFlag>> {
        Ok(self
            .states
            .borrow()
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    fn do_release(&self, path: &Path) -> Result<()> {
        self.released.borrow_mut().push(path.to_path_buf());
        self.states
            .borrow_mut()
            .entry(path.to_path_buf())
            .or_default()
            .insert(StateFlag::Released);
        Ok(())
    }
}

pub struct FakeLims {
    pub released: HashSet<String>,
    pub release_dates: HashMap<String, NaiveDate>,
}

impl FakeLims {
    pub fn new() -> Self {
        Self {
            released: HashSet::new(),
            release_dates: HashMap::new(),
        }
    }
}

impl Lims for FakeLims {
    fn released_sample_ids(&self) -> Result<HashSet<String>> {
        Ok(self.released.clone())
    }

    fn sample_release_date(&self, sample_id: &str) -> Result<Option<NaiveDate>> {
        Ok(self.release_dates.get(sample_id).copied())
    }
}

pub struct RecordingNotifier {
    pub messages: RefCell<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            messages: RefCell::new(Vec::new()),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, subject: &str, body: &str) {
        self.messages
            .borrow_mut()
            .push((subject.to_string(), body.to_string()));
    }
}

/// Write a fastq of the given size at
/// `<fastq_dir>/<run>/<project>/<sample>/<sample>_S1_L00<lane>_R1_001.fastq.gz`.
pub fn make_fastq(
    fastq_dir: &Path,
    run_id: &str,
    project_id: &str,
    sample_id: &str,
    lane: u8,
    size: usize,
) -> PathBuf {
    let dir = fastq_dir.join(run_id).join(project_id).join(sample_id);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}_S1_L00{}_R1_001.fastq.gz", sample_id, lane));
    fs::write(&path, vec![b'x'; size]).unwrap();
    path
}
