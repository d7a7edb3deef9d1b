//! Resource-group traits of the remote platform
//!
//! Each trait mirrors one logical group of the platform API. The core only
//! needs typed calls, cursor pagination and pollable job handles, so no wire
//! format leaks through these signatures.

use crate::error::Result;
use crate::pagination::{Cursor, Page};
use crate::resources::*;
use async_trait::async_trait;
use ferry_types::{
    AppId, BuildId, DomainId, DomainSummary, DropletId, OrganizationId, PackageId, RouteId,
    ServiceBindingId, ServiceInstanceId, SpaceId, StackId,
};

#[async_trait]
pub trait ApplicationsApi: Send + Sync {
    async fn list(&self, request: ListApplicationsRequest) -> Result<Page<ApplicationResource>>;

    async fn get(&self, id: &AppId) -> Result<ApplicationResource>;

    async fn create(&self, space_id: &SpaceId, spec: ApplicationSpec) -> Result<ApplicationResource>;

    async fn update(&self, id: &AppId, spec: ApplicationSpec) -> Result<ApplicationResource>;

    async fn delete(&self, id: &AppId) -> Result<()>;

    /// Current per-instance states
    async fn instances(&self, id: &AppId) -> Result<Vec<InstanceInfo>>;

    /// Re-run staging against the current bits
    async fn restage(&self, id: &AppId) -> Result<ApplicationResource>;

    /// Upload application bits
    async fn upload(&self, id: &AppId, request: UploadRequest) -> Result<JobHandle>;

    async fn list_routes(&self, id: &AppId, cursor: Option<Cursor>) -> Result<Page<RouteResource>>;

    async fn associate_route(&self, id: &AppId, route_id: &RouteId) -> Result<()>;

    async fn remove_route(&self, id: &AppId, route_id: &RouteId) -> Result<()>;

    async fn list_service_bindings(
        &self,
        id: &AppId,
        cursor: Option<Cursor>,
    ) -> Result<Page<ServiceBindingResource>>;

    async fn set_current_droplet(&self, id: &AppId, droplet_id: &DropletId) -> Result<()>;
}

#[async_trait]
pub trait RoutesApi: Send + Sync {
    async fn list(&self, request: ListRoutesRequest) -> Result<Page<RouteResource>>;

    async fn create(&self, request: CreateRouteRequest) -> Result<RouteResource>;

    async fn delete(&self, id: &RouteId) -> Result<JobHandle>;
}

#[async_trait]
pub trait DomainsApi: Send + Sync {
    /// Domains owned by an organization
    async fn list_private(
        &self,
        organization_id: &OrganizationId,
        cursor: Option<Cursor>,
    ) -> Result<Page<DomainSummary>>;

    /// Domains available to every organization
    async fn list_shared(&self, cursor: Option<Cursor>) -> Result<Page<DomainSummary>>;

    async fn get(&self, id: &DomainId) -> Result<DomainSummary>;
}

#[async_trait]
pub trait ServiceInstancesApi: Send + Sync {
    async fn list(
        &self,
        request: ListServiceInstancesRequest,
    ) -> Result<Page<ServiceInstanceResource>>;

    async fn get(&self, id: &ServiceInstanceId) -> Result<ServiceInstanceResource>;

    async fn bind(&self, request: BindRequest) -> Result<ServiceBindingResource>;

    async fn unbind(&self, id: &ServiceBindingId) -> Result<()>;
}

#[async_trait]
pub trait PackagesApi: Send + Sync {
    async fn create(&self, app_id: &AppId, source: PackageSource) -> Result<PackageResource>;

    async fn upload_bits(&self, id: &PackageId, request: UploadRequest) -> Result<JobHandle>;

    async fn get(&self, id: &PackageId) -> Result<PackageResource>;
}

#[async_trait]
pub trait BuildsApi: Send + Sync {
    async fn create(&self, package_id: &PackageId) -> Result<BuildResource>;

    async fn get(&self, id: &BuildId) -> Result<BuildResource>;
}

#[async_trait]
pub trait JobsApi: Send + Sync {
    async fn get(&self, job: &JobHandle) -> Result<JobResource>;
}

#[async_trait]
pub trait StacksApi: Send + Sync {
    async fn list(&self, name: Option<String>, cursor: Option<Cursor>) -> Result<Page<StackResource>>;

    async fn get(&self, id: &StackId) -> Result<StackResource>;
}

#[async_trait]
pub trait SpacesApi: Send + Sync {
    async fn get(&self, id: &SpaceId) -> Result<SpaceResource>;

    /// Apply a rendered manifest document to every application it names
    async fn apply_manifest(&self, id: &SpaceId, manifest: String) -> Result<JobHandle>;
}

#[async_trait]
pub trait ResourceMatchApi: Send + Sync {
    /// The subset of `fingerprints` whose contents the platform already holds
    async fn match_resources(&self, fingerprints: Vec<FileFingerprint>) -> Result<Vec<FileFingerprint>>;
}

/// The full platform, one accessor per resource group
pub trait Platform: Send + Sync {
    fn applications(&self) -> &dyn ApplicationsApi;
    fn routes(&self) -> &dyn RoutesApi;
    fn domains(&self) -> &dyn DomainsApi;
    fn service_instances(&self) -> &dyn ServiceInstancesApi;
    fn packages(&self) -> &dyn PackagesApi;
    fn builds(&self) -> &dyn BuildsApi;
    fn jobs(&self) -> &dyn JobsApi;
    fn stacks(&self) -> &dyn StacksApi;
    fn spaces(&self) -> &dyn SpacesApi;
    fn resource_match(&self) -> &dyn ResourceMatchApi;
}
