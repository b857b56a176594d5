//! Statistics endpoint for a function-execution platform.
//!
//! A request for global, per-app or per-route statistics is translated
//! into one Prometheus range query per tracked metric. The results are
//! merged into a single `{"status": .., "data": ..}` document, or a single
//! error if any query fails.

pub mod aggregation;
pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod query;
pub mod scope;
pub mod window;

pub use aggregation::StatsEngine;
pub use backend::{PrometheusClient, RangeQueryClient};
pub use error::{ParameterError, QueryParam, Result, StatsError};
pub use models::{MetricSeries, StatsResponse, TimeValueSample};
pub use query::{MetricCatalog, MetricKind};
pub use scope::Scope;
pub use window::{TimeWindow, WindowParams};
