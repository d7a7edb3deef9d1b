//! Strongly-typed identifiers for platform resources
//!
//! Identifiers are assigned by the remote platform, so they are opaque
//! strings wrapped in newtypes to keep an application id from being
//! passed where a route id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

resource_id!(
    /// Identifier of a deployed application
    AppId
);
resource_id!(
    /// Identifier of a route (host + domain + path, or domain + port)
    RouteId
);
resource_id!(
    /// Identifier of a private or shared domain
    DomainId
);
resource_id!(
    /// Identifier of a space
    SpaceId
);
resource_id!(
    /// Identifier of an organization
    OrganizationId
);
resource_id!(
    /// Identifier of a service instance
    ServiceInstanceId
);
resource_id!(
    /// Identifier of a service binding
    ServiceBindingId
);
resource_id!(
    /// Identifier of an uploaded package
    PackageId
);
resource_id!(
    /// Identifier of a staging build
    BuildId
);
resource_id!(
    /// Identifier of a staged droplet
    DropletId
);
resource_id!(
    /// Identifier of an asynchronous platform job
    JobId
);
resource_id!(
    /// Identifier of a stack
    StackId
);
