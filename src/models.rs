use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::StatsError;

/// A single sample of a range query, as returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeValueSample {
    pub time: i64,
    pub value: f64,
}

/// Per-metric sample sequences keyed by the metric's external key.
pub type MetricSeries = BTreeMap<String, Vec<TimeValueSample>>;

/// The JSON contract of the statistics endpoint.
///
/// Serialises as `{"status":"success","data":{..}}` or
/// `{"status":"error","error":".."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatsResponse {
    Success { data: MetricSeries },
    Error { error: String },
}

impl StatsResponse {
    pub fn success(data: MetricSeries) -> Self {
        StatsResponse::Success { data }
    }

    pub fn failure(err: &StatsError) -> Self {
        StatsResponse::Error {
            error: err.to_string(),
        }
    }
}
