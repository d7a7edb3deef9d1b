//! Ferry Platform - Remote platform API surface
//!
//! The hosting platform is reached through one trait per resource group
//! (applications, routes, domains, service instances, packages, builds,
//! jobs, stacks, spaces, resource matching), bundled behind the [`Platform`] accessor trait.
//!
//! ## Architectural Boundaries
//!
//! - `ferry-platform` owns: typed calls, cursor pagination, job handles, error classification
//! - `ferry-routing` and `ferry-deployment` own: deciding which calls to make
//! - Wire encoding of a real HTTP client is out of scope; [`InMemoryPlatform`]
//!   stands in for development and tests
//!
//! ## Usage
//!
//! ```no_run
//! use ferry_platform::{paginate, InMemoryPlatform, Platform};
//!
//! # async fn example() -> ferry_platform::Result<()> {
//! let platform = InMemoryPlatform::new();
//! platform.add_shared_domain("apps.example.com");
//!
//! let domains = paginate(|cursor| platform.domains().list_shared(cursor)).await?;
//! assert_eq!(domains.len(), 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod error;
pub mod memory;
pub mod pagination;
pub mod resources;

// Re-exports
pub use api::{
    ApplicationsApi, BuildsApi, DomainsApi, JobsApi, PackagesApi, Platform, ResourceMatchApi,
    RoutesApi, ServiceInstancesApi, SpacesApi, StacksApi,
};
pub use error::{codes, PlatformError, Result};
pub use memory::{InMemoryPlatform, Operation};
pub use pagination::{paginate, Cursor, Page};
pub use resources::{
    ApplicationResource, ApplicationSpec, BindRequest, BuildResource, CreateRouteRequest,
    DockerCredentials, FileFingerprint, InstanceInfo, JobHandle, JobResource, ListApplicationsRequest,
    ListRoutesRequest, ListServiceInstancesRequest, PackageResource, PackageSource,
    RouteResource, ServiceBindingResource, ServiceInstanceResource, SpaceResource,
    StackResource, UploadRequest,
};
