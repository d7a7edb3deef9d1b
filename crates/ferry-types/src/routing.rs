//! Routing records shared by the route resolver and the platform surface

use crate::ids::DomainId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of traffic a domain carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    #[default]
    Http,
    Tcp,
}

/// Domain catalog entry used for route matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSummary {
    pub id: DomainId,
    pub name: String,
    pub kind: DomainKind,
    /// Internal domains are never chosen as a default
    pub internal: bool,
}

impl DomainSummary {
    pub fn http(id: impl Into<DomainId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: DomainKind::Http,
            internal: false,
        }
    }

    pub fn tcp(id: impl Into<DomainId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: DomainKind::Tcp,
            internal: false,
        }
    }

    pub fn is_tcp(&self) -> bool {
        self.kind == DomainKind::Tcp
    }
}

/// A route string split against the domain catalog
///
/// Either `host`/`path` (HTTP shape) or `port` (TCP shape) is populated,
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecomposedRoute {
    pub domain: String,
    pub host: Option<String>,
    pub path: Option<String>,
    pub port: Option<u16>,
}

impl fmt::Display for DecomposedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(host) = self.host.as_deref().filter(|h| !h.is_empty()) {
            write!(f, "{}.", host)?;
        }
        f.write_str(&self.domain)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(path) = &self.path {
            f.write_str(path)?;
        }
        Ok(())
    }
}
