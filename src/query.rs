//! Translation of (metric, scope) pairs into PromQL expressions.

use std::collections::HashMap;
use std::fmt;

use crate::scope::{Scope, ScopeKind};

/// Window over which histogram rates are averaged.
pub const ROLLING_RATE_WINDOW: &str = "1m";

pub const DEFAULT_APP_LABEL: &str = "fn_appname";
pub const DEFAULT_ROUTE_LABEL: &str = "fn_path";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Completed,
    Failed,
    Calls,
    Errors,
    TimedOut,
    Durations,
}

/// How the backend query for a metric is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// `sum(metric{labels})`
    CounterSum,
    /// `sum(rate(metric_sum{labels}[1m]))/sum(rate(metric_count{labels}[1m]))`
    HistogramMean,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::Completed,
        MetricKind::Failed,
        MetricKind::Calls,
        MetricKind::Errors,
        MetricKind::TimedOut,
        MetricKind::Durations,
    ];

    /// Key under which this metric appears in the response body.
    pub fn key(&self) -> &'static str {
        match self {
            MetricKind::Completed => "completed",
            MetricKind::Failed => "failed",
            MetricKind::Calls => "calls",
            MetricKind::Errors => "errors",
            MetricKind::TimedOut => "timedout",
            MetricKind::Durations => "durations",
        }
    }

    pub fn shape(&self) -> QueryShape {
        match self {
            MetricKind::Durations => QueryShape::HistogramMean,
            _ => QueryShape::CounterSum,
        }
    }

    fn default_backend_name(&self) -> &'static str {
        match self {
            MetricKind::Completed => "fn_completed",
            MetricKind::Failed => "fn_failed",
            MetricKind::Calls => "fn_calls",
            MetricKind::Errors => "fn_errors",
            MetricKind::TimedOut => "fn_timeouts",
            MetricKind::Durations => "fn_span_agent_submit_duration_seconds",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Backend metric names per (scope kind, metric kind) plus the label
/// names used to narrow a query to an app or a route.
///
/// Built once at start-up and shared read-only between requests.
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    app_label: String,
    route_label: String,
    names: HashMap<(ScopeKind, MetricKind), String>,
}

impl Default for MetricCatalog {
    fn default() -> Self {
        let mut names = HashMap::new();
        for scope in [ScopeKind::Global, ScopeKind::App, ScopeKind::Route] {
            for kind in MetricKind::ALL {
                names.insert((scope, kind), kind.default_backend_name().to_string());
            }
        }

        Self {
            app_label: DEFAULT_APP_LABEL.to_string(),
            route_label: DEFAULT_ROUTE_LABEL.to_string(),
            names,
        }
    }
}

impl MetricCatalog {
    pub fn with_labels(mut self, app_label: impl Into<String>, route_label: impl Into<String>) -> Self {
        self.app_label = app_label.into();
        self.route_label = route_label.into();
        self
    }

    /// Overrides the backend series name of `kind` at `scope`.
    pub fn with_metric_name(mut self, scope: ScopeKind, kind: MetricKind, name: impl Into<String>) -> Self {
        self.names.insert((scope, kind), name.into());
        self
    }

    pub fn metric_name(&self, scope: ScopeKind, kind: MetricKind) -> &str {
        self.names
            .get(&(scope, kind))
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_backend_name())
    }

    /// Builds the PromQL expression for `kind` narrowed to `scope`.
    pub fn build_query(&self, kind: MetricKind, scope: &Scope) -> String {
        let metric = self.metric_name(scope.kind(), kind);
        let selector = self.label_selector(scope);

        match kind.shape() {
            QueryShape::CounterSum => format!("sum({}{})", metric, selector),
            QueryShape::HistogramMean => format!(
                "sum(rate({m}_sum{s}[{w}]))/sum(rate({m}_count{s}[{w}]))",
                m = metric,
                s = selector,
                w = ROLLING_RATE_WINDOW,
            ),
        }
    }

    fn label_selector(&self, scope: &Scope) -> String {
        match scope {
            Scope::Global => String::new(),
            Scope::App(app) => format!("{{{}=\"{}\"}}", self.app_label, escape_label_value(app)),
            Scope::Route { app, route } => format!(
                "{{{}=\"{}\",{}=\"{}\"}}",
                self.app_label,
                escape_label_value(app),
                self.route_label,
                escape_label_value(route),
            ),
        }
    }
}

/// Escapes a value for use inside a double-quoted PromQL string.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn route() -> Scope {
        Scope::Route {
            app: "myapp".to_string(),
            route: "/hello".to_string(),
        }
    }

    #[test]
    fn test_counter_queries() {
        let catalog = MetricCatalog::default();

        assert_eq!(
            catalog.build_query(MetricKind::Completed, &Scope::Global),
            "sum(fn_completed)"
        );
        assert_eq!(
            catalog.build_query(MetricKind::Failed, &Scope::App("myapp".to_string())),
            "sum(fn_failed{fn_appname=\"myapp\"})"
        );
        assert_eq!(
            catalog.build_query(MetricKind::TimedOut, &route()),
            "sum(fn_timeouts{fn_appname=\"myapp\",fn_path=\"/hello\"})"
        );
    }

    #[test]
    fn test_histogram_queries() {
        let catalog = MetricCatalog::default();

        assert_eq!(
            catalog.build_query(MetricKind::Durations, &Scope::Global),
            "sum(rate(fn_span_agent_submit_duration_seconds_sum[1m]))/\
             sum(rate(fn_span_agent_submit_duration_seconds_count[1m]))"
        );
        assert_eq!(
            catalog.build_query(MetricKind::Durations, &Scope::App("myapp".to_string())),
            "sum(rate(fn_span_agent_submit_duration_seconds_sum{fn_appname=\"myapp\"}[1m]))/\
             sum(rate(fn_span_agent_submit_duration_seconds_count{fn_appname=\"myapp\"}[1m]))"
        );
        assert_eq!(
            catalog.build_query(MetricKind::Durations, &route()),
            "sum(rate(fn_span_agent_submit_duration_seconds_sum{fn_appname=\"myapp\",fn_path=\"/hello\"}[1m]))/\
             sum(rate(fn_span_agent_submit_duration_seconds_count{fn_appname=\"myapp\",fn_path=\"/hello\"}[1m]))"
        );
    }

    #[test]
    fn test_label_values_are_escaped() {
        let catalog = MetricCatalog::default();
        let scope = Scope::App("my\"app\\".to_string());

        assert_eq!(
            catalog.build_query(MetricKind::Calls, &scope),
            "sum(fn_calls{fn_appname=\"my\\\"app\\\\\"})"
        );
    }

    #[test]
    fn test_scope_specific_names_and_labels() {
        let catalog = MetricCatalog::default()
            .with_labels("app", "path")
            .with_metric_name(ScopeKind::Route, MetricKind::Calls, "fn_route_calls");

        assert_eq!(catalog.build_query(MetricKind::Calls, &Scope::Global), "sum(fn_calls)");
        assert_eq!(
            catalog.build_query(MetricKind::Calls, &route()),
            "sum(fn_route_calls{app=\"myapp\",path=\"/hello\"})"
        );
    }

    #[test]
    fn test_every_kind_has_a_distinct_key() {
        let mut keys: Vec<_> = MetricKind::ALL.iter().map(MetricKind::key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), MetricKind::ALL.len());
    }
}
