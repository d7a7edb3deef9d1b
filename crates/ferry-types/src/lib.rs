//! Ferry Types - Core types for application deployment orchestration
//!
//! Ferry drives applications onto a Cloud Foundry style hosting platform:
//! it resolves manifests, works out which routes an application should
//! answer on, and sequences the remote create, bind, upload, stage and start
//! calls until the application is running.
//!
//! ## Architectural Boundaries
//!
//! - **ferry-types** owns: identifiers, manifest records, routing records, lifecycle states
//! - **ferry-platform** owns: the remote API surface and its in-memory stand-in
//! - **ferry-manifest** owns: turning manifest documents into [`ApplicationManifest`] values
//! - **ferry-routing** owns: route decomposition and route creation
//! - **ferry-deployment** owns: the push pipeline and lifecycle operations
//!
//! ## Key Concepts
//!
//! - **Manifest**: declarative description of one application
//! - **DecomposedRoute**: a route string split into domain, host, path and port
//! - **RunState**: aggregate of instance states used to decide a start succeeded
//! - **PushStage**: named stages of a single application's push

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod events;
pub mod ids;
pub mod manifest;
pub mod routing;
pub mod state;

// Re-export main types
pub use events::{EventSeverity, PushEvent, PushEventEnvelope};
pub use ids::{
    AppId, BuildId, DomainId, DropletId, JobId, OrganizationId, PackageId, RouteId,
    ServiceBindingId, ServiceInstanceId, SpaceId, StackId,
};
pub use manifest::{
    ApplicationManifest, Docker, HealthCheckType, ManifestCommon, ManifestV3,
    ManifestV3Application, ManifestV3Process, ManifestV3Service, ManifestV3Sidecar,
    ManifestValidationError, Route, RouteProtocol,
};
pub use routing::{DecomposedRoute, DomainKind, DomainSummary};
pub use state::{
    AppState, BuildState, InstanceState, JobState, PackageState, PackageUploadState, PushStage,
    RunState,
};
