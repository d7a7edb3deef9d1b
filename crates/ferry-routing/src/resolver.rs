//! Route provisioning for a push
//!
//! The resolver turns manifest routing intent into route ids associated
//! with the application, in two steps. `plan` reads the domain catalog and
//! the existing routes once and works out the targets without mutating
//! anything; `apply` then creates, reuses and associates routes against
//! that snapshot. Routes created while applying are added to the snapshot
//! so identical targets are not created twice.

use crate::decompose::decompose_route;
use crate::error::{Result, RouteError};
use crate::words::RandomWords;
use ferry_platform::{
    paginate, CreateRouteRequest, ListRoutesRequest, Platform, RouteResource,
};
use ferry_types::{AppId, DomainSummary, ManifestCommon, OrganizationId, RouteId, SpaceId};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Domains visible to one organization
#[derive(Debug, Clone, Default)]
pub struct DomainCatalog {
    private: Vec<DomainSummary>,
    shared: Vec<DomainSummary>,
    all: Vec<DomainSummary>,
}

impl DomainCatalog {
    pub fn new(private: Vec<DomainSummary>, shared: Vec<DomainSummary>) -> Self {
        let all = private.iter().chain(shared.iter()).cloned().collect();
        Self {
            private,
            shared,
            all,
        }
    }

    /// Fetch private and shared domains, following every page
    pub async fn fetch(platform: &dyn Platform, organization_id: &OrganizationId) -> Result<Self> {
        let private = paginate(|cursor| platform.domains().list_private(organization_id, cursor)).await?;
        let shared = paginate(|cursor| platform.domains().list_shared(cursor)).await?;
        Ok(Self::new(private, shared))
    }

    pub fn domains(&self) -> &[DomainSummary] {
        &self.all
    }

    pub fn private_domains(&self) -> &[DomainSummary] {
        &self.private
    }

    /// First non-internal shared domain
    pub fn default_domain(&self) -> Option<&DomainSummary> {
        self.shared.iter().find(|d| !d.internal)
    }

    pub fn find(&self, name: &str) -> Option<&DomainSummary> {
        self.all.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

/// A route the application should be reachable on, before it is resolved
/// to a platform route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub domain: DomainSummary,
    pub host: Option<String>,
    pub path: Option<String>,
    pub port: Option<u16>,
}

/// Outcome of preparing an application's routes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutePlan {
    /// Routes newly associated with the application
    pub associated: Vec<RouteResource>,
    /// Routes the application already had and still wants
    pub retained: Vec<RouteResource>,
    /// Associations removed because routing was disabled
    pub removed: Vec<RouteId>,
}

/// Routing intent of one push, planned before any mutation
#[derive(Debug, Clone, Default)]
pub struct PendingRoutes {
    /// Routes mapped to the application when the plan was made
    current: Vec<RouteResource>,
    /// Platform routes visible when the plan was made
    existing: Vec<RouteResource>,
    targets: Vec<RouteTarget>,
    /// `no-route`: remove every current association
    disable: bool,
}

impl PendingRoutes {
    pub fn targets(&self) -> &[RouteTarget] {
        &self.targets
    }

    pub fn disables_routing(&self) -> bool {
        self.disable
    }
}

/// Hostnames an HTTP route should use.
///
/// Explicit hosts win, then `no-hostname` (the empty host), then a random
/// `<app>-<adjective>-<noun>` name, then the application name with dots
/// stripped.
pub fn derive_hostnames(manifest: &ManifestCommon, words: &dyn RandomWords) -> Vec<String> {
    if !manifest.hosts.is_empty() {
        return manifest.hosts.clone();
    }
    if manifest.no_hostname() {
        return vec![String::new()];
    }

    let name = sanitize_hostname(&manifest.name);
    if manifest.random_route() {
        vec![format!("{}-{}-{}", name, words.adjective(), words.noun())]
    } else {
        vec![name]
    }
}

/// Application name as a hostname label
pub fn sanitize_hostname(name: &str) -> String {
    name.chars().filter(|c| *c != '.').collect()
}

/// Render a platform route as `host.domain:port/path`
pub fn route_url(route: &RouteResource, domain: &DomainSummary) -> String {
    let mut url = String::new();
    if !route.host.is_empty() {
        url.push_str(&route.host);
        url.push('.');
    }
    url.push_str(&domain.name);
    if let Some(port) = route.port {
        url.push_str(&format!(":{}", port));
    }
    url.push_str(&route.path);
    url
}

/// Resolves and associates routes against the platform
pub struct RouteResolver {
    platform: Arc<dyn Platform>,
    words: Arc<dyn RandomWords>,
}

impl RouteResolver {
    pub fn new(platform: Arc<dyn Platform>, words: Arc<dyn RandomWords>) -> Self {
        Self { platform, words }
    }

    /// Bring the application's route associations in line with its manifest
    pub async fn prepare(
        &self,
        app_id: &AppId,
        space_id: &SpaceId,
        manifest: &ManifestCommon,
    ) -> Result<RoutePlan> {
        let pending = self.plan(Some(app_id), space_id, manifest).await?;
        self.apply(app_id, space_id, pending).await
    }

    /// Work out the routing intent without changing anything on the
    /// platform.
    ///
    /// `app_id` is `None` for an application that does not exist yet. Every
    /// domain and route string error surfaces here.
    #[instrument(skip(self, manifest), fields(app = %manifest.name))]
    pub async fn plan(
        &self,
        app_id: Option<&AppId>,
        space_id: &SpaceId,
        manifest: &ManifestCommon,
    ) -> Result<PendingRoutes> {
        let platform = self.platform.as_ref();
        let current = match app_id {
            Some(app_id) => {
                paginate(|cursor| platform.applications().list_routes(app_id, cursor)).await?
            }
            None => Vec::new(),
        };

        // 1. Routing disabled: every association goes
        if manifest.no_route() {
            return Ok(PendingRoutes {
                current,
                disable: true,
                ..Default::default()
            });
        }

        // 2. Snapshot the catalog and the existing routes
        let space = platform.spaces().get(space_id).await?;
        let catalog = DomainCatalog::fetch(platform, &space.organization_id).await?;
        let existing =
            paginate(|cursor| platform.routes().list(ListRoutesRequest { cursor, ..Default::default() }))
                .await?;

        // 3. Work out the targets
        let targets = self.targets(&catalog, manifest, !current.is_empty())?;
        debug!(targets = targets.len(), "Planned routes");

        Ok(PendingRoutes {
            current,
            existing,
            targets,
            disable: false,
        })
    }

    /// Create, reuse, associate or remove routes as planned
    #[instrument(skip(self, space_id, pending), fields(app_id = %app_id))]
    pub async fn apply(
        &self,
        app_id: &AppId,
        space_id: &SpaceId,
        pending: PendingRoutes,
    ) -> Result<RoutePlan> {
        let platform = self.platform.as_ref();
        let PendingRoutes {
            current,
            mut existing,
            targets,
            disable,
        } = pending;
        let mut plan = RoutePlan::default();

        if disable {
            for route in &current {
                platform.applications().remove_route(app_id, &route.id).await?;
                debug!(route_id = %route.id, "Removed route association");
                plan.removed.push(route.id.clone());
            }
            info!(removed = plan.removed.len(), "Routing disabled");
            return Ok(plan);
        }

        for target in &targets {
            let route = self
                .resolve_route_for_domain(space_id, target, &current, &mut existing)
                .await?;

            let already = current.iter().any(|r| r.id == route.id)
                || plan.associated.iter().any(|r| r.id == route.id);
            if already {
                if !plan.retained.iter().any(|r| r.id == route.id) {
                    plan.retained.push(route);
                }
                continue;
            }

            platform.applications().associate_route(app_id, &route.id).await?;
            info!(route = %route_url(&route, &target.domain), "Associated route");
            plan.associated.push(route);
        }

        Ok(plan)
    }

    /// Targets requested by the manifest.
    ///
    /// With no routes, domains, hosts or `no-hostname` requested, an
    /// application that has no routes yet gets one on the default shared
    /// domain; one that already has routes keeps them untouched. A random
    /// route counts as satisfied by the routes the application already has.
    pub fn targets(
        &self,
        catalog: &DomainCatalog,
        manifest: &ManifestCommon,
        has_routes: bool,
    ) -> Result<Vec<RouteTarget>> {
        if !manifest.routes.is_empty() {
            return manifest
                .routes
                .iter()
                .map(|route| {
                    let matched = decompose_route(
                        catalog.domains(),
                        &route.route,
                        manifest.route_path.as_deref(),
                    )?;
                    Ok(RouteTarget {
                        domain: matched.domain.clone(),
                        host: matched.route.host,
                        path: matched.route.path,
                        port: matched.route.port,
                    })
                })
                .collect();
        }

        let domains: Vec<DomainSummary> = if manifest.domains.is_empty() {
            let implicit = manifest.hosts.is_empty() && manifest.no_hostname.is_none();
            if implicit && has_routes {
                return Ok(Vec::new());
            }
            vec![catalog
                .default_domain()
                .cloned()
                .ok_or(RouteError::NoDefaultDomain)?]
        } else {
            manifest
                .domains
                .iter()
                .map(|name| {
                    catalog
                        .find(name)
                        .cloned()
                        .ok_or_else(|| RouteError::DomainNotFound {
                            route: name.clone(),
                        })
                })
                .collect::<Result<_>>()?
        };

        let hosts = derive_hostnames(manifest, self.words.as_ref());
        let path = manifest.route_path.clone().filter(|p| !p.is_empty());

        let mut targets = Vec::new();
        for domain in domains {
            if domain.is_tcp() {
                targets.push(RouteTarget {
                    domain,
                    host: None,
                    path: None,
                    port: None,
                });
                continue;
            }
            for host in &hosts {
                targets.push(RouteTarget {
                    domain: domain.clone(),
                    host: Some(host.clone()).filter(|h| !h.is_empty()),
                    path: path.clone(),
                    port: None,
                });
            }
        }
        Ok(targets)
    }

    /// Find or create the platform route for one target.
    ///
    /// TCP targets with a pinned port reuse the route on that port; without
    /// one they reuse the application's existing route on the domain or
    /// request a random port. HTTP targets reuse the route matching
    /// `{domain, host, path}` or create it.
    pub async fn resolve_route_for_domain(
        &self,
        space_id: &SpaceId,
        target: &RouteTarget,
        current: &[RouteResource],
        existing: &mut Vec<RouteResource>,
    ) -> Result<RouteResource> {
        let domain_id = &target.domain.id;
        let host = target.host.clone().unwrap_or_default();
        let path = target.path.clone().unwrap_or_default();

        let reusable = if target.domain.is_tcp() {
            match target.port {
                Some(port) => existing
                    .iter()
                    .find(|r| &r.domain_id == domain_id && r.port == Some(port)),
                None => current.iter().find(|r| &r.domain_id == domain_id),
            }
        } else {
            existing.iter().find(|r| {
                &r.domain_id == domain_id && r.host == host && r.path == path && r.port.is_none()
            })
        };
        if let Some(route) = reusable {
            debug!(route_id = %route.id, "Reusing existing route");
            return Ok(route.clone());
        }

        let request = if target.domain.is_tcp() {
            CreateRouteRequest {
                space_id: space_id.clone(),
                domain_id: domain_id.clone(),
                host: None,
                path: None,
                port: target.port,
                random_port: target.port.is_none(),
            }
        } else {
            CreateRouteRequest {
                space_id: space_id.clone(),
                domain_id: domain_id.clone(),
                host: Some(host).filter(|h| !h.is_empty()),
                path: Some(path).filter(|p| !p.is_empty()),
                port: None,
                random_port: false,
            }
        };

        let route = self.platform.routes().create(request).await?;
        info!(route = %route_url(&route, &target.domain), "Created route");
        existing.push(route.clone());
        Ok(route)
    }

    /// URLs of every route mapped to the application
    pub async fn route_urls(&self, app_id: &AppId) -> Result<Vec<String>> {
        let platform = self.platform.as_ref();
        let routes = paginate(|cursor| platform.applications().list_routes(app_id, cursor)).await?;

        let mut urls = Vec::with_capacity(routes.len());
        for route in &routes {
            let domain = platform.domains().get(&route.domain_id).await?;
            urls.push(route_url(route, &domain));
        }
        Ok(urls)
    }
}
