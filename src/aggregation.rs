use futures::future::try_join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::{
    backend::{RangeQueryClient, QUERY_TIMEOUT},
    metrics,
    models::{MetricSeries, TimeValueSample},
    query::{MetricCatalog, MetricKind},
    scope::Scope,
    window::TimeWindow,
    Result,
    StatsError,
};

/// Slack on top of [`QUERY_TIMEOUT`] for the whole fan-out.
const FAN_OUT_GRACE: Duration = Duration::from_millis(500);

/// Fans a statistics request out into one backend query per metric.
///
/// The engine holds no per-request state; it is cloned into each handler.
#[derive(Clone)]
pub struct StatsEngine {
    client: Arc<dyn RangeQueryClient>,
    catalog: Arc<MetricCatalog>,
    timeout: Duration,
}

impl StatsEngine {
    pub fn new(client: Arc<dyn RangeQueryClient>, catalog: MetricCatalog) -> Self {
        Self {
            client,
            catalog: Arc::new(catalog),
            timeout: QUERY_TIMEOUT + FAN_OUT_GRACE,
        }
    }

    /// Overrides the bound on a whole aggregation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Queries every tracked metric concurrently.
    ///
    /// All-or-nothing: the first failing query aborts the aggregation and
    /// the queries still in flight are dropped.
    pub async fn aggregate(&self, scope: &Scope, window: &TimeWindow) -> Result<MetricSeries> {
        let queries = MetricKind::ALL
            .iter()
            .map(|&kind| self.query_metric(kind, scope, window));

        let results = tokio::time::timeout(self.timeout, try_join_all(queries))
            .await
            .map_err(|_| {
                StatsError::BackendUnreachable(format!(
                    "queries did not complete within {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        Ok(results
            .into_iter()
            .map(|(kind, samples)| (kind.key().to_string(), samples))
            .collect())
    }

    async fn query_metric(
        &self,
        kind: MetricKind,
        scope: &Scope,
        window: &TimeWindow,
    ) -> Result<(MetricKind, Vec<TimeValueSample>)> {
        let query = self.catalog.build_query(kind, scope);
        debug!("Built query for {} at {}: {}", kind, scope, query);

        let started = Instant::now();
        let result = self.client.query_range(&query, window).await;
        metrics::record_backend_query(kind.key(), started.elapsed().as_secs_f64());

        match result {
            Ok(samples) => Ok((kind, samples)),
            Err(e) => {
                warn!("Query for {} failed ({}): {}", kind, e.kind(), query);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatsResponse;
    use crate::window::WindowParams;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Backend {}

        #[async_trait]
        impl RangeQueryClient for Backend {
            async fn query_range(&self, query: &str, window: &TimeWindow) -> Result<Vec<TimeValueSample>>;
        }
    }

    fn window() -> TimeWindow {
        TimeWindow::resolve(&WindowParams::default()).unwrap()
    }

    fn samples() -> Vec<TimeValueSample> {
        vec![
            TimeValueSample { time: 1519214100, value: 1.0 },
            TimeValueSample { time: 1519214130, value: 2.0 },
            TimeValueSample { time: 1519214160, value: 3.0 },
        ]
    }

    #[tokio::test]
    async fn test_every_metric_is_collected() {
        let mut backend = MockBackend::new();
        backend
            .expect_query_range()
            .times(MetricKind::ALL.len())
            .returning(|_, _| Ok(samples()));

        let engine = StatsEngine::new(Arc::new(backend), MetricCatalog::default());
        let data = engine.aggregate(&Scope::Global, &window()).await.unwrap();

        assert_eq!(data.len(), MetricKind::ALL.len());
        for kind in MetricKind::ALL {
            assert_eq!(data[kind.key()], samples());
        }
    }

    #[tokio::test]
    async fn test_queries_follow_scope() {
        let mut backend = MockBackend::new();
        backend
            .expect_query_range()
            .withf(|query, _| query.contains("fn_appname=\"myapp\",fn_path=\"/hello\""))
            .times(MetricKind::ALL.len())
            .returning(|_, _| Ok(Vec::new()));

        let engine = StatsEngine::new(Arc::new(backend), MetricCatalog::default());
        let scope = Scope::resolve(Some("myapp"), Some("/hello"));
        let data = engine.aggregate(&scope, &window()).await.unwrap();

        assert!(data.values().all(Vec::is_empty));
    }

    #[tokio::test]
    async fn test_single_failure_fails_everything() {
        let mut backend = MockBackend::new();
        backend.expect_query_range().returning(|query, _| {
            if query.starts_with("sum(fn_failed") {
                Err(StatsError::BackendError {
                    error_type: "execution".to_string(),
                    message: "query timed out".to_string(),
                })
            } else {
                Ok(samples())
            }
        });

        let engine = StatsEngine::new(Arc::new(backend), MetricCatalog::default());
        let err = engine.aggregate(&Scope::Global, &window()).await.unwrap_err();

        assert!(matches!(err, StatsError::BackendError { .. }));
        assert_eq!(
            StatsResponse::failure(&err),
            StatsResponse::Error {
                error: "Error from Prometheus: execution: query timed out".to_string()
            }
        );
    }

    struct StalledBackend;

    #[async_trait]
    impl RangeQueryClient for StalledBackend {
        async fn query_range(&self, _query: &str, _window: &TimeWindow) -> Result<Vec<TimeValueSample>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_aggregation_is_bounded() {
        let engine = StatsEngine::new(Arc::new(StalledBackend), MetricCatalog::default())
            .with_timeout(Duration::from_millis(50));

        let err = engine.aggregate(&Scope::Global, &window()).await.unwrap_err();
        assert!(matches!(err, StatsError::BackendUnreachable(_)));
    }
}
