//! Range queries against the Prometheus HTTP API.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::{
    models::TimeValueSample,
    window::TimeWindow,
    Result,
    StatsError,
};

/// Upper bound on a single backend round trip.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

const USER_AGENT: &str = concat!("fn_stats_api/", env!("CARGO_PKG_VERSION"));
const QUERY_RANGE_PATH: &str = "/api/v1/query_range";
const STATUS_SUCCESS: &str = "success";
const RESULT_TYPE_MATRIX: &str = "matrix";
const NAN_TOKEN: &str = "NaN";

/// Executes one range query and returns its samples in backend order.
#[async_trait]
pub trait RangeQueryClient: Send + Sync {
    async fn query_range(&self, query: &str, window: &TimeWindow) -> Result<Vec<TimeValueSample>>;
}

#[derive(Debug, Deserialize)]
struct RangeQueryEnvelope {
    status: String,
    #[serde(default)]
    data: Option<RangeQueryData>,
    #[serde(rename = "errorType", default)]
    error_type: String,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct RangeQueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<MatrixSeries>,
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    #[allow(dead_code)]
    metric: HashMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Turns a `query_range` response body into samples.
///
/// Samples whose value is the `NaN` token are dropped. Every other value
/// must parse as a finite float. An empty result is a valid, empty series;
/// more than one series means the selector was too broad.
pub fn parse_range_response(query: &str, body: &str) -> Result<Vec<TimeValueSample>> {
    let malformed = |reason: String| StatsError::MalformedResponse {
        query: query.to_string(),
        reason,
        body: body.to_string(),
    };

    let envelope: RangeQueryEnvelope = serde_json::from_str(body)
        .map_err(|e| malformed(format!("Unable to decode response from Prometheus: {}", e)))?;

    if envelope.status != STATUS_SUCCESS {
        return Err(StatsError::BackendError {
            error_type: envelope.error_type,
            message: envelope.error,
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| malformed("Response from Prometheus has no data".to_string()))?;

    if data.result_type != RESULT_TYPE_MATRIX {
        return Err(malformed(format!(
            "Unexpected resultType {:?} returned by Prometheus",
            data.result_type
        )));
    }

    if data.result.len() > 1 {
        return Err(StatsError::AmbiguousResult {
            query: query.to_string(),
            body: body.to_string(),
        });
    }

    let Some(series) = data.result.into_iter().next() else {
        return Ok(Vec::new());
    };

    let mut samples = Vec::with_capacity(series.values.len());
    for (time, raw) in series.values {
        if raw == NAN_TOKEN {
            continue;
        }
        let value: f64 = raw
            .parse()
            .map_err(|_| malformed(format!("Error converting {} to a float64", raw)))?;
        if !value.is_finite() {
            return Err(malformed(format!("Non-finite value {} cannot be returned", raw)));
        }
        samples.push(TimeValueSample {
            time: time as i64,
            value,
        });
    }

    Ok(samples)
}

/// [`RangeQueryClient`] backed by a Prometheus server.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: reqwest::Client,
    base_url: String,
}

impl PrometheusClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        Self::with_base_url(format!("http://{}:{}", host, port))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StatsError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RangeQueryClient for PrometheusClient {
    async fn query_range(&self, query: &str, window: &TimeWindow) -> Result<Vec<TimeValueSample>> {
        let url = format!("{}{}", self.base_url, QUERY_RANGE_PATH);
        let start = window.start_param();
        let end = window.end_param();
        let step = window.step_param();
        debug!("Querying {} with query={} start={} end={} step={}", url, query, start, end, step);

        // Query errors come back as JSON with a 4xx status, so the body is
        // parsed whatever the status.
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("step", step.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("Prometheus answered {} with {} bytes", status, body.len());

        parse_range_response(query, &body)
    }
}
