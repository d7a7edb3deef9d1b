//! Ferry Deployment Engine
//!
//! Drives an application from a resolved manifest to running instances:
//! create or update the record, prepare routes, bind services while the
//! artifact uploads, then start it and observe staging and the instances.
//!
//! ## Architectural Boundaries
//!
//! - `ferry-manifest` owns: turning manifest files into resolved manifests (called BEFORE a push)
//! - `ferry-routing` owns: route resolution and association (called BY the push pipeline)
//! - `ferry-platform` owns: the remote calls
//! - `ferry-deployment` owns: step ordering, observation loops, timeouts, cancellation, push events
//!
//! ## Key Principle
//!
//! Only reads are repeated. A failed mutation fails the push and is never
//! retried; a staging or start wait that runs out of time is reported as
//! `TimedOut`, never as a failure of the application itself.
//!
//! ## Usage
//!
//! ```no_run
//! use ferry_deployment::{DeploymentConfig, DeploymentManager, PushOptions};
//! use ferry_platform::InMemoryPlatform;
//! use ferry_types::{ApplicationManifest, ManifestCommon};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let platform = Arc::new(InMemoryPlatform::new());
//! let space = platform.add_space("org-1");
//! platform.add_shared_domain("apps.example.com");
//!
//! let manager = DeploymentManager::new(platform, DeploymentConfig::default());
//! let mut events = manager.subscribe();
//!
//! let manifest = ApplicationManifest::new(ManifestCommon::named("web"));
//! let outcome = manager.push(&space, &manifest, &PushOptions::default()).await?;
//! println!("{} is {}", outcome.app, outcome.stage);
//!
//! while let Ok(envelope) = events.try_recv() {
//!     println!("{:?}", envelope.event);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod artifact;
pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod polling;

// Re-exports
pub use artifact::{fingerprint_artifact, upload_request, ArtifactError};
pub use config::{AppRef, DeploymentConfig, PushOptions, ScaleRequest, Timeouts, WaitOptions};
pub use context::PushContext;
pub use error::{DeploymentError, Result, WaitPhase};
pub use manager::{DeploymentManager, PushOutcome};
pub use polling::{poll_until, Backoff, PollError, Probe};
