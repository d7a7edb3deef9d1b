//! Ferry Routing - Route resolution
//!
//! Maps manifest routing intent (`routes`, `domains`, `hosts`,
//! `random-route`, `no-hostname`, `no-route`) onto platform routes and
//! associates them with an application.
//!
//! ## Architectural Boundaries
//!
//! - `ferry-routing` owns: route string decomposition, hostname derivation,
//!   route reuse and creation, route association
//! - `ferry-platform` owns: the remote calls
//! - `ferry-deployment` owns: when routes are prepared during a push
//!
//! ## Key Concepts
//!
//! - **DomainCatalog**: private and shared domains, fetched once per push
//! - **RouteTarget**: a domain plus host/path or port, before it exists remotely
//! - **RandomWords**: injected word source for random hostnames

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod decompose;
pub mod error;
pub mod resolver;
pub mod words;

// Re-exports
pub use decompose::{decompose_route, MatchedRoute};
pub use error::{Result, RouteError};
pub use resolver::{
    derive_hostnames, route_url, sanitize_hostname, DomainCatalog, PendingRoutes, RoutePlan,
    RouteResolver, RouteTarget,
};
pub use words::{FixedWords, RandomWords, WordListRandomWords};
