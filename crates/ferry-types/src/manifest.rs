//! Application manifest records
//!
//! A manifest is modelled as a shared base record ([`ManifestCommon`]) embedded
//! in two outer records: [`ApplicationManifest`] for the classic lifecycle and
//! [`ManifestV3Application`] for the process/sidecar aware lifecycle.
//! Values are produced once by the manifest resolver and never mutated by
//! later pipeline stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Fields shared by every manifest shape
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManifestCommon {
    /// Application name, unique key for merge and lookup
    pub name: String,
    pub buildpacks: Vec<String>,
    pub command: Option<String>,
    /// Disk quota in megabytes
    pub disk: Option<u32>,
    pub docker: Option<Docker>,
    pub domains: Vec<String>,
    /// Environment variables; a `None` value is an explicit null
    pub environment_variables: BTreeMap<String, Option<String>>,
    pub health_check_http_endpoint: Option<String>,
    pub health_check_type: Option<HealthCheckType>,
    pub hosts: Vec<String>,
    pub instances: Option<u32>,
    /// Memory quota in megabytes
    pub memory: Option<u32>,
    pub no_hostname: Option<bool>,
    pub no_route: Option<bool>,
    /// Local artifact to upload
    pub path: Option<PathBuf>,
    pub random_route: Option<bool>,
    pub route_path: Option<String>,
    pub routes: Vec<Route>,
    pub stack: Option<String>,
    /// Startup timeout in seconds
    pub timeout: Option<u32>,
}

impl ManifestCommon {
    /// Create an otherwise empty manifest with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn no_route(&self) -> bool {
        self.no_route.unwrap_or(false)
    }

    pub fn no_hostname(&self) -> bool {
        self.no_hostname.unwrap_or(false)
    }

    pub fn random_route(&self) -> bool {
        self.random_route.unwrap_or(false)
    }

    /// Docker image, if the application is image based
    pub fn docker_image(&self) -> Option<&str> {
        self.docker.as_ref().and_then(|d| d.image.as_deref())
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        if self.name.trim().is_empty() {
            return Err(ManifestValidationError::MissingName);
        }

        if !self.routes.is_empty() {
            if !self.hosts.is_empty() {
                return Err(ManifestValidationError::RoutesWithHosts);
            }
            if !self.domains.is_empty() {
                return Err(ManifestValidationError::RoutesWithDomains);
            }
            if self.no_hostname.is_some() {
                return Err(ManifestValidationError::RoutesWithNoHostname);
            }
        }

        if let Some(docker) = &self.docker {
            if docker.image.is_some() {
                if !self.buildpacks.is_empty() {
                    return Err(ManifestValidationError::DockerImageWithBuildpacks);
                }
                if self.path.is_some() {
                    return Err(ManifestValidationError::DockerImageWithPath);
                }
            } else if docker.username.is_some() || docker.password.is_some() {
                return Err(ManifestValidationError::DockerCredentialsWithoutImage);
            }

            match (&docker.username, &docker.password) {
                (None, Some(_)) => return Err(ManifestValidationError::DockerPasswordWithoutUsername),
                (Some(_), None) => return Err(ManifestValidationError::DockerUsernameWithoutPassword),
                _ => {}
            }
        }

        Ok(())
    }
}

/// Violated manifest invariant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestValidationError {
    #[error("application does not contain required 'name' value")]
    MissingName,

    #[error("routes and hosts cannot both be set")]
    RoutesWithHosts,

    #[error("routes and domains cannot both be set")]
    RoutesWithDomains,

    #[error("routes and no-hostname cannot both be set")]
    RoutesWithNoHostname,

    #[error("docker image and buildpacks cannot both be set")]
    DockerImageWithBuildpacks,

    #[error("docker image and path cannot both be set")]
    DockerImageWithPath,

    #[error("docker credentials require docker image to be set")]
    DockerCredentialsWithoutImage,

    #[error("docker password requires username")]
    DockerPasswordWithoutUsername,

    #[error("docker username requires password")]
    DockerUsernameWithoutPassword,

    #[error("manifest version {0} is not supported, expected 1")]
    UnsupportedVersion(u32),

    #[error("manifest must declare at least one application")]
    NoApplications,
}

/// Container image settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Docker {
    pub image: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Manifest-level route: a raw route string plus an optional protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub route: String,
    pub protocol: Option<RouteProtocol>,
}

impl Route {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            protocol: None,
        }
    }
}

/// Route protocol tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteProtocol {
    Tcp,
    Http1,
    Http2,
}

impl RouteProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteProtocol::Tcp => "tcp",
            RouteProtocol::Http1 => "http1",
            RouteProtocol::Http2 => "http2",
        }
    }
}

impl fmt::Display for RouteProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(RouteProtocol::Tcp),
            "http1" => Ok(RouteProtocol::Http1),
            "http2" => Ok(RouteProtocol::Http2),
            other => Err(format!("unknown route protocol '{}'", other)),
        }
    }
}

/// Health check strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckType {
    Http,
    None,
    Port,
    Process,
}

impl HealthCheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthCheckType::Http => "http",
            HealthCheckType::None => "none",
            HealthCheckType::Port => "port",
            HealthCheckType::Process => "process",
        }
    }
}

impl fmt::Display for HealthCheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthCheckType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(HealthCheckType::Http),
            "none" => Ok(HealthCheckType::None),
            "port" => Ok(HealthCheckType::Port),
            "process" => Ok(HealthCheckType::Process),
            other => Err(format!("unknown health check type '{}'", other)),
        }
    }
}

/// Classic application manifest: shared fields plus bound service names
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplicationManifest {
    pub common: ManifestCommon,
    /// Names of service instances to bind
    pub services: Vec<String>,
}

impl ApplicationManifest {
    pub fn new(common: ManifestCommon) -> Self {
        Self {
            common,
            services: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.common.name
    }

    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        self.common.validate()
    }
}

/// Process/sidecar aware manifest document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManifestV3 {
    pub version: Option<u32>,
    pub applications: Vec<ManifestV3Application>,
}

impl ManifestV3 {
    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        if let Some(version) = self.version {
            if version != 1 {
                return Err(ManifestValidationError::UnsupportedVersion(version));
            }
        }
        if self.applications.is_empty() {
            return Err(ManifestValidationError::NoApplications);
        }
        for application in &self.applications {
            application.common.validate()?;
        }
        Ok(())
    }
}

/// One application of a [`ManifestV3`] document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManifestV3Application {
    pub common: ManifestCommon,
    pub processes: Vec<ManifestV3Process>,
    pub sidecars: Vec<ManifestV3Sidecar>,
    pub services: Vec<ManifestV3Service>,
    pub labels: BTreeMap<String, Option<String>>,
    pub annotations: BTreeMap<String, Option<String>>,
    pub default_route: Option<bool>,
}

impl ManifestV3Application {
    pub fn name(&self) -> &str {
        &self.common.name
    }
}

/// Per-process overrides
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManifestV3Process {
    pub process_type: String,
    pub command: Option<String>,
    /// Disk quota in megabytes
    pub disk: Option<u32>,
    pub health_check_http_endpoint: Option<String>,
    pub health_check_invocation_timeout: Option<u32>,
    pub health_check_type: Option<HealthCheckType>,
    pub instances: Option<u32>,
    /// Memory quota in megabytes
    pub memory: Option<u32>,
    pub timeout: Option<u32>,
}

/// Sidecar process
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManifestV3Sidecar {
    pub name: String,
    pub command: Option<String>,
    pub process_types: Vec<String>,
    /// Memory quota in megabytes
    pub memory: Option<u32>,
}

/// Structured service binding request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManifestV3Service {
    pub name: String,
    pub binding_name: Option<String>,
    pub parameters: Option<serde_json::Value>,
}

impl ManifestV3Service {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docker(image: Option<&str>, username: Option<&str>, password: Option<&str>) -> Docker {
        Docker {
            image: image.map(String::from),
            username: username.map(String::from),
            password: password.map(String::from),
        }
    }

    #[test]
    fn test_minimal_manifest_is_valid() {
        assert!(ManifestCommon::named("app").validate().is_ok());
    }

    #[test]
    fn test_missing_name_is_invalid() {
        assert_eq!(
            ManifestCommon::default().validate(),
            Err(ManifestValidationError::MissingName)
        );
    }

    #[test]
    fn test_routes_exclude_hosts_domains_and_no_hostname() {
        let mut manifest = ManifestCommon::named("app");
        manifest.routes = vec![Route::new("app.example.com")];
        manifest.hosts = vec!["app".into()];
        assert_eq!(manifest.validate(), Err(ManifestValidationError::RoutesWithHosts));

        manifest.hosts.clear();
        manifest.domains = vec!["example.com".into()];
        assert_eq!(manifest.validate(), Err(ManifestValidationError::RoutesWithDomains));

        manifest.domains.clear();
        manifest.no_hostname = Some(false);
        assert_eq!(
            manifest.validate(),
            Err(ManifestValidationError::RoutesWithNoHostname)
        );
    }

    #[test]
    fn test_docker_image_excludes_buildpacks_and_path() {
        let mut manifest = ManifestCommon::named("app");
        manifest.docker = Some(docker(Some("nginx"), None, None));
        manifest.buildpacks = vec!["java".into()];
        assert_eq!(
            manifest.validate(),
            Err(ManifestValidationError::DockerImageWithBuildpacks)
        );

        manifest.buildpacks.clear();
        manifest.path = Some(PathBuf::from("/tmp/app"));
        assert_eq!(manifest.validate(), Err(ManifestValidationError::DockerImageWithPath));
    }

    #[test]
    fn test_docker_credentials_rules() {
        let mut manifest = ManifestCommon::named("app");

        manifest.docker = Some(docker(None, Some("user"), Some("pass")));
        assert_eq!(
            manifest.validate(),
            Err(ManifestValidationError::DockerCredentialsWithoutImage)
        );

        manifest.docker = Some(docker(Some("nginx"), None, Some("pass")));
        assert_eq!(
            manifest.validate(),
            Err(ManifestValidationError::DockerPasswordWithoutUsername)
        );

        manifest.docker = Some(docker(Some("nginx"), Some("user"), None));
        assert_eq!(
            manifest.validate(),
            Err(ManifestValidationError::DockerUsernameWithoutPassword)
        );

        manifest.docker = Some(docker(Some("nginx"), Some("user"), Some("pass")));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_v3_version_and_applications() {
        let empty = ManifestV3 {
            version: Some(1),
            applications: vec![],
        };
        assert_eq!(empty.validate(), Err(ManifestValidationError::NoApplications));

        let wrong_version = ManifestV3 {
            version: Some(2),
            applications: vec![ManifestV3Application {
                common: ManifestCommon::named("app"),
                ..Default::default()
            }],
        };
        assert_eq!(
            wrong_version.validate(),
            Err(ManifestValidationError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!("HTTP".parse::<HealthCheckType>(), Ok(HealthCheckType::Http));
        assert_eq!("Tcp".parse::<RouteProtocol>(), Ok(RouteProtocol::Tcp));
        assert!("udp".parse::<RouteProtocol>().is_err());
    }
}
