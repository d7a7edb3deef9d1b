//! Route provisioning against the in-memory platform, across paginated
//! listings and organization-private domains.

use ferry_platform::{
    ApplicationResource, ApplicationSpec, ApplicationsApi, CreateRouteRequest, InMemoryPlatform,
    Operation, RoutesApi,
};
use ferry_routing::{FixedWords, RouteError, RouteResolver};
use ferry_types::{DomainSummary, ManifestCommon, OrganizationId, Route, SpaceId};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn platform() -> (Arc<InMemoryPlatform>, SpaceId) {
    let platform = Arc::new(InMemoryPlatform::new().with_page_size(1));
    let space = platform.add_space("org-1");
    (platform, space)
}

fn resolver(platform: &Arc<InMemoryPlatform>) -> RouteResolver {
    RouteResolver::new(platform.clone(), Arc::new(FixedWords::new("brave", "otter")))
}

async fn create_app(platform: &InMemoryPlatform, space: &SpaceId, name: &str) -> ApplicationResource {
    ApplicationsApi::create(
        platform,
        space,
        ApplicationSpec {
            name: Some(name.into()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_random_route_across_paged_listings() {
    let (platform, space) = platform();
    platform.add_shared_domain("apps.example.com");
    platform.add_shared_domain("apps.other.com");
    let app = create_app(&platform, &space, "web").await;

    let mut manifest = ManifestCommon::named("web");
    manifest.random_route = Some(true);

    let resolver = resolver(&platform);
    let plan = resolver.prepare(&app.id, &space, &manifest).await.unwrap();
    assert_eq!(plan.associated.len(), 1);

    let urls = resolver.route_urls(&app.id).await.unwrap();
    assert_eq!(urls, vec!["web-brave-otter.apps.example.com".to_string()]);
}

#[tokio::test]
async fn test_existing_route_in_space_is_reused() {
    let (platform, space) = platform();
    let domain = platform.add_shared_domain("apps.example.com");
    RoutesApi::create(
        platform.as_ref(),
        CreateRouteRequest {
            space_id: space.clone(),
            domain_id: domain,
            host: Some("web".into()),
            path: None,
            port: None,
            random_port: false,
        },
    )
    .await
    .unwrap();
    let app = create_app(&platform, &space, "web").await;

    let plan = resolver(&platform)
        .prepare(&app.id, &space, &ManifestCommon::named("web"))
        .await
        .unwrap();

    assert_eq!(plan.associated.len(), 1);
    assert_eq!(platform.call_count(Operation::CreateRoute), 1);
    assert_eq!(platform.application_routes(&app.id).len(), 1);
}

#[tokio::test]
async fn test_private_domain_route() {
    let (platform, space) = platform();
    platform.add_shared_domain("apps.example.com");
    platform.add_domain(
        DomainSummary::http("corp", "corp.example.com"),
        Some(OrganizationId::new("org-1")),
    );
    let app = create_app(&platform, &space, "web").await;

    let mut manifest = ManifestCommon::named("web");
    manifest.routes = vec![Route::new("portal.corp.example.com/admin")];

    let resolver = resolver(&platform);
    resolver.prepare(&app.id, &space, &manifest).await.unwrap();

    let urls = resolver.route_urls(&app.id).await.unwrap();
    assert_eq!(urls, vec!["portal.corp.example.com/admin".to_string()]);
}

#[tokio::test]
async fn test_no_shared_domain_to_default_to() {
    let (platform, space) = platform();
    let app = create_app(&platform, &space, "web").await;

    let err = resolver(&platform)
        .prepare(&app.id, &space, &ManifestCommon::named("web"))
        .await
        .unwrap_err();

    assert_eq!(err, RouteError::NoDefaultDomain);
    assert_eq!(platform.call_count(Operation::CreateRoute), 0);
}
