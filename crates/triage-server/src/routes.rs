//! Prefix dispatch to the externally owned route groups.

use std::collections::BTreeMap;

use axum::Router;

/// The eight REST groups, each bound to a fixed path prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RouteGroup {
    Auth,
    Cases,
    Evidence,
    Analysis,
    Findings,
    Reports,
    Users,
    ThreatIntel,
}

impl RouteGroup {
    pub const ALL: [RouteGroup; 8] = [
        RouteGroup::Auth,
        RouteGroup::Cases,
        RouteGroup::Evidence,
        RouteGroup::Analysis,
        RouteGroup::Findings,
        RouteGroup::Reports,
        RouteGroup::Users,
        RouteGroup::ThreatIntel,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            RouteGroup::Auth => "/api/auth",
            RouteGroup::Cases => "/api/cases",
            RouteGroup::Evidence => "/api/evidence",
            RouteGroup::Analysis => "/api/analysis",
            RouteGroup::Findings => "/api/findings",
            RouteGroup::Reports => "/api/reports",
            RouteGroup::Users => "/api/users",
            RouteGroup::ThreatIntel => "/api/threat-intel",
        }
    }
}

impl std::fmt::Display for RouteGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Handlers supplied for each group. Unmounted groups fall through to 404.
#[derive(Default)]
pub struct RouteTable {
    groups: BTreeMap<RouteGroup, Router>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `router` under the group's prefix, replacing any earlier binding.
    pub fn mount(mut self, group: RouteGroup, router: Router) -> Self {
        self.insert(group, router);
        self
    }

    /// Like [`RouteTable::mount`], returning the replaced router if any.
    pub fn insert(&mut self, group: RouteGroup, router: Router) -> Option<Router> {
        let previous = self.groups.insert(group, router);
        if previous.is_some() {
            tracing::debug!(group = %group, "route group re-mounted");
        }
        previous
    }

    pub fn mounted(&self) -> impl Iterator<Item = RouteGroup> + '_ {
        self.groups.keys().copied()
    }

    /// Nest every bound group under its prefix. Requests and responses pass
    /// through unmodified.
    pub fn into_router(self) -> Router {
        self.groups
            .into_iter()
            .fold(Router::new(), |app, (group, router)| app.nest(group.prefix(), router))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    #[test]
    fn prefixes_are_fixed() {
        let prefixes: Vec<_> = RouteGroup::ALL.iter().map(|g| g.prefix()).collect();
        assert_eq!(
            prefixes,
            [
                "/api/auth",
                "/api/cases",
                "/api/evidence",
                "/api/analysis",
                "/api/findings",
                "/api/reports",
                "/api/users",
                "/api/threat-intel",
            ]
        );
    }

    async fn call(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 16).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn dispatches_by_prefix_with_params() {
        let cases = Router::new()
            .route("/", get(|| async { "all cases" }))
            .route(
                "/{id}",
                get(|axum::extract::Path(id): axum::extract::Path<String>| async move {
                    format!("case {id}")
                }),
            );
        let users = Router::new().route("/me", get(|| async { "me" }));
        let app = RouteTable::new()
            .mount(RouteGroup::Cases, cases)
            .mount(RouteGroup::Users, users)
            .into_router();

        assert_eq!(call(app.clone(), "/api/cases/7").await.1, "case 7");
        assert_eq!(call(app.clone(), "/api/users/me").await.1, "me");
        assert_eq!(call(app, "/api/reports/1").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn remount_replaces() {
        let mut table = RouteTable::new()
            .mount(RouteGroup::Auth, Router::new().route("/login", get(|| async { "v1" })));
        let old = table.insert(
            RouteGroup::Auth,
            Router::new().route("/login", get(|| async { "v2" })),
        );
        assert!(old.is_some());
        assert_eq!(table.mounted().collect::<Vec<_>>(), [RouteGroup::Auth]);
        assert_eq!(call(table.into_router(), "/api/auth/login").await.1, "v2");
    }
}
