//! Typed reading of merged application documents

use crate::document::{Map, Node};
use crate::error::{ManifestError, Result};
use crate::units::node_megabytes;
use ferry_types::{
    ApplicationManifest, Docker, HealthCheckType, ManifestCommon, ManifestV3Application,
    ManifestV3Process, ManifestV3Service, ManifestV3Sidecar, Route, RouteProtocol,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Typed accessors over one map, naming `context` in every error
struct Fields<'a> {
    map: &'a Map,
    context: String,
}

impl<'a> Fields<'a> {
    fn new(map: &'a Map, context: impl Into<String>) -> Self {
        Self {
            map,
            context: context.into(),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Node> {
        self.map.get(key).filter(|n| !matches!(n, Node::Null))
    }

    fn wrong_type(&self, key: &str, expected: &str, found: &Node) -> ManifestError {
        ManifestError::invalid(
            self.context.clone(),
            format!("'{}' must be {}, found {}", key, expected, found.kind()),
        )
    }

    fn string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(node @ (Node::List(_) | Node::Map(_))) => Err(self.wrong_type(key, "a string", node)),
            Some(node) => Ok(node.scalar_string()),
        }
    }

    fn required_string(&self, key: &'static str) -> Result<String> {
        self.string(key)?
            .ok_or_else(|| ManifestError::MissingRequiredField {
                field: key,
                location: self.context.clone(),
            })
    }

    fn integer(&self, key: &str) -> Result<Option<u32>> {
        match self.get(key) {
            None => Ok(None),
            Some(Node::Integer(i)) => u32::try_from(*i)
                .map(Some)
                .map_err(|_| self.wrong_type(key, "a non-negative integer", &Node::Integer(*i))),
            Some(Node::String(s)) => s.trim().parse::<u32>().map(Some).map_err(|_| {
                ManifestError::invalid(
                    self.context.clone(),
                    format!("'{}' must be an integer, found '{}'", key, s),
                )
            }),
            Some(node) => Err(self.wrong_type(key, "an integer", node)),
        }
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Node::Bool(b)) => Ok(Some(*b)),
            Some(Node::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(ManifestError::invalid(
                    self.context.clone(),
                    format!("'{}' must be a boolean, found '{}'", key, s),
                )),
            },
            Some(node) => Err(self.wrong_type(key, "a boolean", node)),
        }
    }

    fn megabytes(&self, key: &str) -> Result<Option<u32>> {
        match self.get(key) {
            None => Ok(None),
            Some(node) => node_megabytes(node).map(Some).ok_or_else(|| {
                ManifestError::invalid(
                    self.context.clone(),
                    format!(
                        "'{}' has invalid quantity '{}'",
                        key,
                        node.scalar_string().unwrap_or_default()
                    ),
                )
            }),
        }
    }

    fn string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Node::List(items)) => items
                .iter()
                .map(|item| {
                    item.scalar_string()
                        .ok_or_else(|| self.wrong_type(key, "a list of strings", item))
                })
                .collect(),
            Some(node) => Err(self.wrong_type(key, "a list", node)),
        }
    }

    fn string_map(&self, key: &str) -> Result<BTreeMap<String, Option<String>>> {
        match self.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Node::Map(map)) => map
                .iter()
                .map(|(k, v)| match v {
                    Node::Null => Ok((k.clone(), None)),
                    Node::List(_) | Node::Map(_) => Err(self.wrong_type(key, "a map of strings", v)),
                    scalar => Ok((k.clone(), scalar.scalar_string())),
                })
                .collect(),
            Some(node) => Err(self.wrong_type(key, "a map", node)),
        }
    }

    fn maps(&self, key: &str) -> Result<Vec<Fields<'a>>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Node::List(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Node::Map(map) => Ok(Fields::new(
                        map,
                        format!("{} {}[{}]", self.context, key, index),
                    )),
                    other => Err(self.wrong_type(key, "a list of maps", other)),
                })
                .collect(),
            Some(node) => Err(self.wrong_type(key, "a list", node)),
        }
    }

    fn health_check_type(&self, key: &str) -> Result<Option<HealthCheckType>> {
        self.string(key)?
            .map(|s| {
                s.parse::<HealthCheckType>()
                    .map_err(|reason| ManifestError::invalid(self.context.clone(), reason))
            })
            .transpose()
    }
}

/// Read the fields shared by every manifest shape.
///
/// Relative `path` values resolve against `base_dir`.
pub fn common(map: &Map, context: &str, base_dir: Option<&Path>) -> Result<ManifestCommon> {
    let fields = Fields::new(map, context);
    let name = fields.required_string("name")?;
    let fields = Fields::new(map, format!("application '{}'", name));

    let mut buildpacks = fields.string_list("buildpacks")?;
    buildpacks.extend(fields.string("buildpack")?);

    let mut domains: Vec<String> = fields.string("domain")?.into_iter().collect();
    domains.extend(fields.string_list("domains")?);

    let mut hosts: Vec<String> = fields.string("host")?.into_iter().collect();
    hosts.extend(fields.string_list("hosts")?);

    let docker = match fields.get("docker") {
        None => None,
        Some(Node::Map(map)) => {
            let docker = Fields::new(map, format!("application '{}' docker", name));
            Some(Docker {
                image: docker.string("image")?,
                username: docker.string("username")?,
                password: docker.string("password")?,
            })
        }
        Some(node) => return Err(fields.wrong_type("docker", "a map", node)),
    };

    let routes = fields
        .maps("routes")?
        .iter()
        .map(|route| {
            let protocol = route
                .string("protocol")?
                .map(|p| {
                    p.parse::<RouteProtocol>()
                        .map_err(|reason| ManifestError::invalid(route.context.clone(), reason))
                })
                .transpose()?;
            Ok(Route {
                route: route.required_string("route")?,
                protocol,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let path = fields.string("path")?.map(|p| match base_dir {
        Some(dir) => dir.join(p),
        None => p.into(),
    });

    Ok(ManifestCommon {
        name: name.clone(),
        buildpacks,
        command: fields.string("command")?,
        disk: fields.megabytes("disk_quota")?,
        docker,
        domains,
        environment_variables: fields.string_map("env")?,
        health_check_http_endpoint: fields.string("health-check-http-endpoint")?,
        health_check_type: fields.health_check_type("health-check-type")?,
        hosts,
        instances: fields.integer("instances")?,
        memory: fields.megabytes("memory")?,
        no_hostname: fields.boolean("no-hostname")?,
        no_route: fields.boolean("no-route")?,
        path,
        random_route: fields.boolean("random-route")?,
        route_path: fields.string("route-path")?,
        routes,
        stack: fields.string("stack")?,
        timeout: fields.integer("timeout")?,
    })
}

/// Read a classic application manifest
pub fn application_manifest(
    map: &Map,
    context: &str,
    base_dir: Option<&Path>,
) -> Result<ApplicationManifest> {
    let common = common(map, context, base_dir)?;
    let fields = Fields::new(map, format!("application '{}'", common.name));
    let services = fields.string_list("services")?;

    Ok(ApplicationManifest { common, services })
}

/// Read one application of a v3 manifest
pub fn v3_application(
    map: &Map,
    context: &str,
    base_dir: Option<&Path>,
) -> Result<ManifestV3Application> {
    let common = common(map, context, base_dir)?;
    let fields = Fields::new(map, format!("application '{}'", common.name));

    let processes = fields
        .maps("processes")?
        .iter()
        .map(|process| {
            Ok(ManifestV3Process {
                process_type: process.required_string("type")?,
                command: process.string("command")?,
                disk: process.megabytes("disk_quota")?.or(process.megabytes("disk")?),
                health_check_http_endpoint: process.string("health-check-http-endpoint")?,
                health_check_invocation_timeout: process
                    .integer("health-check-invocation-timeout")?,
                health_check_type: process.health_check_type("health-check-type")?,
                instances: process.integer("instances")?,
                memory: process.megabytes("memory")?,
                timeout: process.integer("timeout")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let sidecars = fields
        .maps("sidecars")?
        .iter()
        .map(|sidecar| {
            Ok(ManifestV3Sidecar {
                name: sidecar.required_string("name")?,
                command: sidecar.string("command")?,
                process_types: sidecar.string_list("process_types")?,
                memory: sidecar.megabytes("memory")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let services = match fields.get("services") {
        None => Vec::new(),
        Some(Node::List(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| service(item, &format!("{} services[{}]", fields.context, index)))
            .collect::<Result<Vec<_>>>()?,
        Some(node) => return Err(fields.wrong_type("services", "a list", node)),
    };

    Ok(ManifestV3Application {
        common,
        processes,
        sidecars,
        services,
        labels: fields.string_map("labels")?,
        annotations: fields.string_map("annotations")?,
        default_route: fields.boolean("default-route")?,
    })
}

fn service(node: &Node, context: &str) -> Result<ManifestV3Service> {
    match node {
        Node::String(name) => Ok(ManifestV3Service::named(name.clone())),
        Node::Map(map) => {
            let fields = Fields::new(map, context);
            let binding_name = match fields.string("binding_name")? {
                Some(name) => Some(name),
                None => fields.string("bindingName")?,
            };
            Ok(ManifestV3Service {
                name: fields.required_string("name")?,
                binding_name,
                parameters: fields.get("parameters").cloned().map(serde_json::Value::from),
            })
        }
        other => Err(ManifestError::invalid(
            context,
            format!("service must be a string or a map, found {}", other.kind()),
        )),
    }
}
