//! Request and response records exchanged with the platform

use crate::pagination::Cursor;
use ferry_types::{
    AppId, AppState, BuildId, BuildState, DomainId, DropletId, HealthCheckType, InstanceState,
    JobId, JobState, OrganizationId, PackageId, PackageState, PackageUploadState, RouteId,
    ServiceBindingId, ServiceInstanceId, SpaceId, StackId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Remote application record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationResource {
    pub id: AppId,
    pub name: String,
    pub space_id: SpaceId,
    pub state: AppState,
    pub package_state: PackageState,
    pub instances: u32,
    pub memory: u32,
    pub disk_quota: u32,
    pub buildpacks: Vec<String>,
    pub command: Option<String>,
    pub docker_image: Option<String>,
    pub stack_id: Option<StackId>,
    pub health_check_type: Option<HealthCheckType>,
    pub health_check_http_endpoint: Option<String>,
    pub health_check_timeout: Option<u32>,
    pub environment: BTreeMap<String, Option<String>>,
    pub droplet_id: Option<DropletId>,
}

/// Fields to set on create or update; `None` leaves a field untouched
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplicationSpec {
    pub name: Option<String>,
    pub buildpacks: Option<Vec<String>>,
    pub command: Option<String>,
    pub disk_quota: Option<u32>,
    pub docker_image: Option<String>,
    pub docker_credentials: Option<DockerCredentials>,
    pub environment: Option<BTreeMap<String, Option<String>>>,
    pub health_check_type: Option<HealthCheckType>,
    pub health_check_http_endpoint: Option<String>,
    pub health_check_timeout: Option<u32>,
    pub instances: Option<u32>,
    pub memory: Option<u32>,
    pub stack_id: Option<StackId>,
    pub state: Option<AppState>,
}

impl ApplicationSpec {
    /// Spec that only changes the requested state
    pub fn state(state: AppState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListApplicationsRequest {
    pub space_id: Option<SpaceId>,
    pub name: Option<String>,
    pub cursor: Option<Cursor>,
}

/// State of one application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub index: u32,
    pub state: InstanceState,
}

/// Content fingerprint of one artifact file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Path relative to the artifact root, `/` separated
    pub path: String,
    /// Lowercase hex SHA-256 of the contents
    pub sha256: String,
    pub size: u64,
}

/// Artifact upload; `matched` files are already known to the platform and
/// are referenced rather than sent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UploadRequest {
    pub bits: Option<PathBuf>,
    pub matched: Vec<FileFingerprint>,
    pub files: Vec<FileFingerprint>,
}

impl UploadRequest {
    /// Nothing left to send; the upload only finalizes the bits
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Handle of an asynchronous platform job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResource {
    pub id: JobId,
    pub state: JobState,
    pub errors: Vec<String>,
}

/// Remote route record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResource {
    pub id: RouteId,
    pub domain_id: DomainId,
    pub space_id: SpaceId,
    /// Empty when the route has no host
    pub host: String,
    /// Empty when the route has no path
    pub path: String,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default)]
pub struct ListRoutesRequest {
    pub domain_id: Option<DomainId>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub port: Option<u16>,
    pub cursor: Option<Cursor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRouteRequest {
    pub space_id: SpaceId,
    pub domain_id: DomainId,
    pub host: Option<String>,
    pub path: Option<String>,
    pub port: Option<u16>,
    /// Ask the platform to pick a free TCP port
    pub random_port: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstanceResource {
    pub id: ServiceInstanceId,
    pub name: String,
    pub space_id: SpaceId,
}

#[derive(Debug, Clone, Default)]
pub struct ListServiceInstancesRequest {
    pub space_id: Option<SpaceId>,
    pub name: Option<String>,
    pub cursor: Option<Cursor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBindingResource {
    pub id: ServiceBindingId,
    pub app_id: AppId,
    pub service_instance_id: ServiceInstanceId,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindRequest {
    pub app_id: AppId,
    pub service_instance_id: ServiceInstanceId,
    pub binding_name: Option<String>,
    pub parameters: Option<serde_json::Value>,
}

/// What a package is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    Bits,
    Docker {
        image: String,
        credentials: Option<DockerCredentials>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageResource {
    pub id: PackageId,
    pub app_id: AppId,
    pub state: PackageUploadState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResource {
    pub id: BuildId,
    pub package_id: PackageId,
    pub state: BuildState,
    pub droplet_id: Option<DropletId>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackResource {
    pub id: StackId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceResource {
    pub id: SpaceId,
    pub organization_id: OrganizationId,
}
