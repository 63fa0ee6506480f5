use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

/// Where a sample's data sits in the storage hierarchy. A linear one-way
/// state machine: none -> on lustre -> all. Skipping a state or moving
/// backwards is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDeletedState {
    /// Everything still lives on the fast tier.
    None,
    /// Delivered copies purged; raw and processed originals released to
    /// tape, leaving stubs on the fast tier.
    OnLustre,
    /// The released copies are gone too; nothing recoverable remains.
    All,
}

impl DataDeletedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataDeletedState::None => "none",
            DataDeletedState::OnLustre => "on lustre",
            DataDeletedState::All => "all",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(DataDeletedState::None),
            "on lustre" => Ok(DataDeletedState::OnLustre),
            "all" => Ok(DataDeletedState::All),
            other => Err(Error::Record(format!(
                "unknown data_deleted value '{}'",
                other
            ))),
        }
    }

    /// The only permitted transitions are the two forward single steps.
    pub fn can_advance_to(&self, next: DataDeletedState) -> bool {
        matches!(
            (self, next),
            (DataDeletedState::None, DataDeletedState::OnLustre)
                | (DataDeletedState::OnLustre, DataDeletedState::All)
        )
    }
}

impl fmt::Display for DataDeletedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lane review outcome. Anything other than 'not reviewed' counts as
/// resolved for run deletability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewStatus {
    NotReviewed,
    Passed,
    Failed,
    Other(String),
}

impl ReviewStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "not reviewed" => ReviewStatus::NotReviewed,
            "pass" => ReviewStatus::Passed,
            "fail" => ReviewStatus::Failed,
            other => ReviewStatus::Other(other.to_string()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, ReviewStatus::NotReviewed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcStatus {
    Finished,
    Aborted,
    Deleted,
    Other(String),
}

impl ProcStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "finished" => ProcStatus::Finished,
            "aborted" => ProcStatus::Aborted,
            "deleted" => ProcStatus::Deleted,
            other => ProcStatus::Other(other.to_string()),
        }
    }

    /// Processing reached an end state, so the run's data is settled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcStatus::Finished | ProcStatus::Aborted | ProcStatus::Deleted
        )
    }
}

fn req_str(doc: &Value, field: &str) -> Result<String> {
    doc.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Record(format!("missing or non-string field '{}' in {}", field, doc)))
}

fn opt_str(doc: &Value, field: &str) -> Option<String> {
    doc.get(field).and_then(Value::as_str).map(str::to_string)
}

/// One sample document from the metadata store, validated at the boundary.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub sample_id: String,
    pub project_id: String,
    /// Customer-facing name; file basenames in the processed and delivered
    /// areas use this rather than the internal id.
    pub user_sample_id: String,
    pub data_deleted: DataDeletedState,
    pub delivered: bool,
}

impl SampleRecord {
    pub fn from_document(doc: &Value) -> Result<Self> {
        let sample_id = req_str(doc, "sample_id")?;
        let user_sample_id = opt_str(doc, "user_sample_id").unwrap_or_else(|| sample_id.clone());
        let data_deleted = match opt_str(doc, "data_deleted") {
            Some(s) => DataDeletedState::parse(&s)?,
            None => DataDeletedState::None,
        };
        Ok(SampleRecord {
            sample_id,
            project_id: req_str(doc, "project_id")?,
            user_sample_id,
            data_deleted,
            delivered: opt_str(doc, "delivered").as_deref() == Some("yes"),
        })
    }
}

/// One lane/barcode unit of sequencing output.
#[derive(Debug, Clone)]
pub struct RunElementRecord {
    pub run_id: String,
    pub project_id: String,
    pub sample_id: String,
    pub lane: u8,
    pub review_status: ReviewStatus,
    pub useable: bool,
    pub useable_date: Option<DateTime<Utc>>,
}

impl RunElementRecord {
    pub fn from_document(doc: &Value) -> Result<Self> {
        let lane = doc
            .get("lane")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Record(format!("missing or non-integer 'lane' in {}", doc)))?;
        let lane = u8::try_from(lane)
            .map_err(|_| Error::Record(format!("'lane' {} out of range in {}", lane, doc)))?;
        let useable_date = match opt_str(doc, "useable_date") {
            Some(s) => Some(
                DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| Error::Record(format!("bad useable_date '{}': {}", s, e)))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        Ok(RunElementRecord {
            run_id: req_str(doc, "run_id")?,
            project_id: req_str(doc, "project_id")?,
            sample_id: req_str(doc, "sample_id")?,
            lane,
            review_status: ReviewStatus::parse(
                opt_str(doc, "reviewed").as_deref().unwrap_or("not reviewed"),
            ),
            useable: opt_str(doc, "useable").as_deref() == Some("yes"),
            useable_date,
        })
    }
}

/// A pipeline invocation against one run.
#[derive(Debug, Clone)]
pub struct ProcRecord {
    pub proc_id: String,
    pub run_id: String,
    pub status: ProcStatus,
}

impl ProcRecord {
    pub fn from_document(doc: &Value) -> Result<Self> {
        Ok(ProcRecord {
            proc_id: req_str(doc, "proc_id")?,
            run_id: req_str(doc, "dataset_name")?,
            status: ProcStatus::parse(opt_str(doc, "status").as_deref().unwrap_or("")),
        })
    }
}
