use chrono::NaiveDate;
use reqwest::blocking::Client;
use seqsweep_core::error::{Error, Result};
use seqsweep_core::lims::Lims;
use seqsweep_core::store::MetadataClient;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| Error::Other(format!("HTTP client: {}", e)))
}

fn where_clause(filters: &[(&str, &str)]) -> String {
    let obj: serde_json::Map<String, Value> = filters
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    Value::Object(obj).to_string()
}

/// Blocking client for the facility's REST metadata store. Documents come
/// back under a top-level "data" key; filters are passed as a JSON `where`
/// query parameter.
pub struct RestClient {
    base_url: String,
    client: Client,
}

impl RestClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }
}

impl MetadataClient for RestClient {
    fn get_documents(&self, collection: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>> {
        let url = format!("{}/{}", self.base_url, collection);
        debug!("GET {} where {:?}", url, filters);
        let response = self
            .client
            .get(&url)
            .query(&[("where", where_clause(filters))])
            .send()
            .map_err(|e| Error::Other(format!("GET {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| Error::Other(format!("GET {}: {}", url, e)))?;
        let body: Value = response
            .json()
            .map_err(|e| Error::Other(format!("GET {}: bad JSON: {}", url, e)))?;
        match body.get("data") {
            Some(Value::Array(docs)) => Ok(docs.clone()),
            _ => Err(Error::Record(format!(
                "response from {} has no 'data' array",
                url
            ))),
        }
    }

    fn patch_entry(
        &self,
        collection: &str,
        payload: &Value,
        id_field: &str,
        id_value: &str,
    ) -> Result<()> {
        let url = format!("{}/{}", self.base_url, collection);
        debug!("PATCH {} where {}={}", url, id_field, id_value);
        self.client
            .patch(&url)
            .query(&[("where", where_clause(&[(id_field, id_value)]))])
            .json(payload)
            .send()
            .map_err(|e| Error::Other(format!("PATCH {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| Error::Other(format!("PATCH {}: {}", url, e)))?;
        Ok(())
    }
}

/// Read-only LIMS view over the status service the LIMS exports.
pub struct RestLims {
    base_url: String,
    client: Client,
}

impl RestLims {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }

    fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        self.client
            .get(&url)
            .send()
            .map_err(|e| Error::Other(format!("GET {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| Error::Other(format!("GET {}: {}", url, e)))?
            .json()
            .map_err(|e| Error::Other(format!("GET {}: bad JSON: {}", url, e)))
    }
}

impl Lims for RestLims {
    fn released_sample_ids(&self) -> Result<HashSet<String>> {
        let body = self.get_json("samples?status=released")?;
        match body.get("data") {
            Some(Value::Array(ids)) => Ok(ids
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()),
            _ => Err(Error::Record(
                "released-samples response has no 'data' array".to_string(),
            )),
        }
    }

    fn sample_release_date(&self, sample_id: &str) -> Result<Option<NaiveDate>> {
        let body = self.get_json(&format!("sample_status/{}", sample_id))?;
        match body.get("release_date").and_then(Value::as_str) {
            Some(date) => Ok(Some(NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(
                |e| Error::Record(format!("bad release_date '{}': {}", date, e)),
            )?)),
            None => Ok(None),
        }
    }
}
