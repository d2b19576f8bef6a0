//! JSON encoding of requests and decoding of response bodies.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{HordeError, Result};
use crate::types::{ActiveModel, Generation, JobResult, JobStatus, QueuedJob, UserDetails};

/// Encode a request payload. Unset optional fields are absent from the
/// output at every nesting level, never `null`.
pub fn encode<T: Serialize>(payload: &T) -> Result<Value> {
    Ok(serde_json::to_value(payload)?)
}

/// Decode a response body into `T`.
///
/// Fails with [`HordeError::Decode`] when the bytes are not JSON or do not
/// match the shape of `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| HordeError::Decode(format!("{} (body: {})", e, preview(bytes))))
}

/// Response records that keep fields the schema does not name.
pub trait WireRecord {
    /// Record name used in logs.
    const NAME: &'static str;

    /// Fields present on the wire but not in the schema.
    fn extra_fields(&self) -> Vec<&str>;
}

/// [`decode`], then log any unrecognised fields.
pub(crate) fn decode_record<T: DeserializeOwned + WireRecord>(bytes: &[u8]) -> Result<T> {
    let record: T = decode(bytes)?;
    let extra = record.extra_fields();
    if !extra.is_empty() {
        debug!(record = T::NAME, fields = ?extra, "Unrecognised response fields");
    }
    Ok(record)
}

fn keys(map: &Map<String, Value>) -> impl Iterator<Item = &str> {
    map.keys().map(String::as_str)
}

impl WireRecord for QueuedJob {
    const NAME: &'static str = "QueuedJob";

    fn extra_fields(&self) -> Vec<&str> {
        keys(&self.extra).collect()
    }
}

impl WireRecord for JobStatus {
    const NAME: &'static str = "JobStatus";

    fn extra_fields(&self) -> Vec<&str> {
        keys(&self.extra).collect()
    }
}

impl WireRecord for Generation {
    const NAME: &'static str = "Generation";

    fn extra_fields(&self) -> Vec<&str> {
        keys(&self.extra).collect()
    }
}

impl WireRecord for JobResult {
    const NAME: &'static str = "JobResult";

    fn extra_fields(&self) -> Vec<&str> {
        let mut fields = self.status.extra_fields();
        for generation in &self.generations {
            for field in generation.extra_fields() {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }
}

impl WireRecord for UserDetails {
    const NAME: &'static str = "UserDetails";

    fn extra_fields(&self) -> Vec<&str> {
        keys(&self.extra).collect()
    }
}

impl WireRecord for ActiveModel {
    const NAME: &'static str = "ActiveModel";

    fn extra_fields(&self) -> Vec<&str> {
        keys(&self.extra).collect()
    }
}

impl<T: WireRecord> WireRecord for Vec<T> {
    const NAME: &'static str = T::NAME;

    fn extra_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for record in self {
            for field in record.extra_fields() {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }
}

fn preview(bytes: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text.into_owned()
    }
}
