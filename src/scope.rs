use std::fmt;

/// Granularity of a statistics request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    App(String),
    Route { app: String, route: String },
}

/// Discriminant of [`Scope`], used to key the metric name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Global,
    App,
    Route,
}

impl Scope {
    /// An app name is required for a route to be considered.
    pub fn resolve(app: Option<&str>, route: Option<&str>) -> Self {
        match (app, route) {
            (None, _) => Scope::Global,
            (Some(app), None) => Scope::App(app.to_string()),
            (Some(app), Some(route)) => Scope::Route {
                app: app.to_string(),
                route: route.to_string(),
            },
        }
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Global => ScopeKind::Global,
            Scope::App(_) => ScopeKind::App,
            Scope::Route { .. } => ScopeKind::Route,
        }
    }

    pub fn app(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::App(app) | Scope::Route { app, .. } => Some(app),
        }
    }

    pub fn route(&self) -> Option<&str> {
        match self {
            Scope::Route { route, .. } => Some(route),
            _ => None,
        }
    }
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::App => "app",
            ScopeKind::Route => "route",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::App(app) => write!(f, "app {}", app),
            Scope::Route { app, route } => write!(f, "route {}{}", app, route),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        assert_eq!(Scope::resolve(None, None), Scope::Global);
        assert_eq!(Scope::resolve(None, Some("/hello")), Scope::Global);
        assert_eq!(Scope::resolve(Some("myapp"), None), Scope::App("myapp".to_string()));

        let scope = Scope::resolve(Some("myapp"), Some("/hello"));
        assert_eq!(scope.kind(), ScopeKind::Route);
        assert_eq!(scope.app(), Some("myapp"));
        assert_eq!(scope.route(), Some("/hello"));
    }
}
