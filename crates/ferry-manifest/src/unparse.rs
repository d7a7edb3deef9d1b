//! Rendering manifests back into documents
//!
//! Only populated fields are emitted, keys come out sorted, and quantities
//! are re-suffixed with `M`.

use crate::document::{Map, Node};
use crate::units::format_megabytes;
use ferry_types::{
    ApplicationManifest, ManifestCommon, ManifestV3, ManifestV3Application, ManifestV3Process,
    ManifestV3Service, ManifestV3Sidecar,
};
use std::collections::BTreeMap;

fn put(map: &mut Map, key: &str, value: Option<Node>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

fn strings(values: &[String]) -> Option<Node> {
    (!values.is_empty()).then(|| Node::List(values.iter().cloned().map(Node::String).collect()))
}

fn string_map(values: &BTreeMap<String, Option<String>>) -> Option<Node> {
    (!values.is_empty()).then(|| {
        Node::Map(
            values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone().map(Node::String).unwrap_or(Node::Null)))
                .collect(),
        )
    })
}

fn text(value: &Option<String>) -> Option<Node> {
    value.clone().map(Node::String)
}

fn integer(value: Option<u32>) -> Option<Node> {
    value.map(|v| Node::Integer(i64::from(v)))
}

fn boolean(value: Option<bool>) -> Option<Node> {
    value.map(Node::Bool)
}

fn quantity(value: Option<u32>) -> Option<Node> {
    value.map(|v| Node::String(format_megabytes(v)))
}

/// Fields shared by every manifest shape
pub fn common_to_map(manifest: &ManifestCommon) -> Map {
    let mut map = Map::new();

    put(&mut map, "buildpacks", strings(&manifest.buildpacks));
    put(&mut map, "command", text(&manifest.command));
    put(&mut map, "disk_quota", quantity(manifest.disk));
    if let Some(docker) = &manifest.docker {
        let mut yaml = Map::new();
        put(&mut yaml, "image", text(&docker.image));
        put(&mut yaml, "username", text(&docker.username));
        put(&mut yaml, "password", text(&docker.password));
        map.insert("docker".to_string(), Node::Map(yaml));
    }
    put(&mut map, "domains", strings(&manifest.domains));
    put(&mut map, "env", string_map(&manifest.environment_variables));
    put(
        &mut map,
        "health-check-http-endpoint",
        text(&manifest.health_check_http_endpoint),
    );
    put(
        &mut map,
        "health-check-type",
        manifest.health_check_type.map(|h| Node::from(h.as_str())),
    );
    put(&mut map, "hosts", strings(&manifest.hosts));
    put(&mut map, "instances", integer(manifest.instances));
    put(&mut map, "memory", quantity(manifest.memory));
    map.insert("name".to_string(), Node::from(manifest.name.as_str()));
    put(&mut map, "no-hostname", boolean(manifest.no_hostname));
    put(&mut map, "no-route", boolean(manifest.no_route));
    put(
        &mut map,
        "path",
        manifest
            .path
            .as_ref()
            .map(|p| Node::String(p.display().to_string())),
    );
    put(&mut map, "random-route", boolean(manifest.random_route));
    put(&mut map, "route-path", text(&manifest.route_path));
    if !manifest.routes.is_empty() {
        let routes = manifest
            .routes
            .iter()
            .map(|route| {
                let mut yaml = Map::new();
                yaml.insert("route".to_string(), Node::from(route.route.as_str()));
                put(&mut yaml, "protocol", route.protocol.map(|p| Node::from(p.as_str())));
                Node::Map(yaml)
            })
            .collect();
        map.insert("routes".to_string(), Node::List(routes));
    }
    put(&mut map, "stack", text(&manifest.stack));
    put(&mut map, "timeout", integer(manifest.timeout));

    map
}

pub fn application_to_map(manifest: &ApplicationManifest) -> Map {
    let mut map = common_to_map(&manifest.common);
    put(&mut map, "services", strings(&manifest.services));
    map
}

/// Document holding every application under `applications`
pub fn applications_document(manifests: &[ApplicationManifest]) -> Node {
    let mut root = Map::new();
    root.insert(
        "applications".to_string(),
        Node::List(
            manifests
                .iter()
                .map(|m| Node::Map(application_to_map(m)))
                .collect(),
        ),
    );
    Node::Map(root)
}

fn process_to_map(process: &ManifestV3Process) -> Node {
    let mut map = Map::new();
    map.insert("type".to_string(), Node::from(process.process_type.as_str()));
    put(&mut map, "command", text(&process.command));
    put(&mut map, "disk_quota", quantity(process.disk));
    put(
        &mut map,
        "health-check-http-endpoint",
        text(&process.health_check_http_endpoint),
    );
    put(
        &mut map,
        "health-check-invocation-timeout",
        integer(process.health_check_invocation_timeout),
    );
    put(
        &mut map,
        "health-check-type",
        process.health_check_type.map(|h| Node::from(h.as_str())),
    );
    put(&mut map, "instances", integer(process.instances));
    put(&mut map, "memory", quantity(process.memory));
    put(&mut map, "timeout", integer(process.timeout));
    Node::Map(map)
}

fn sidecar_to_map(sidecar: &ManifestV3Sidecar) -> Node {
    let mut map = Map::new();
    map.insert("name".to_string(), Node::from(sidecar.name.as_str()));
    put(&mut map, "command", text(&sidecar.command));
    put(&mut map, "process_types", strings(&sidecar.process_types));
    put(&mut map, "memory", quantity(sidecar.memory));
    Node::Map(map)
}

fn service_to_map(service: &ManifestV3Service) -> Node {
    let mut map = Map::new();
    map.insert("name".to_string(), Node::from(service.name.as_str()));
    put(&mut map, "binding_name", text(&service.binding_name));
    put(&mut map, "parameters", service.parameters.clone().map(Node::from));
    Node::Map(map)
}

pub fn v3_application_to_map(application: &ManifestV3Application) -> Map {
    let mut map = common_to_map(&application.common);

    if !application.processes.is_empty() {
        map.insert(
            "processes".to_string(),
            Node::List(application.processes.iter().map(process_to_map).collect()),
        );
    }
    put(&mut map, "default-route", boolean(application.default_route));
    if !application.services.is_empty() {
        map.insert(
            "services".to_string(),
            Node::List(application.services.iter().map(service_to_map).collect()),
        );
    }
    if !application.sidecars.is_empty() {
        map.insert(
            "sidecars".to_string(),
            Node::List(application.sidecars.iter().map(sidecar_to_map).collect()),
        );
    }
    put(&mut map, "labels", string_map(&application.labels));
    put(&mut map, "annotations", string_map(&application.annotations));

    map
}

pub fn v3_document(manifest: &ManifestV3) -> Node {
    let mut root = Map::new();
    root.insert(
        "version".to_string(),
        Node::Integer(i64::from(manifest.version.unwrap_or(1))),
    );
    root.insert(
        "applications".to_string(),
        Node::List(
            manifest
                .applications
                .iter()
                .map(|a| Node::Map(v3_application_to_map(a)))
                .collect(),
        ),
    );
    Node::Map(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_types::{Route, RouteProtocol};

    #[test]
    fn test_only_populated_fields_are_emitted() {
        let map = common_to_map(&ManifestCommon::named("app"));
        assert_eq!(map.len(), 1);
        assert_eq!(map["name"], Node::from("app"));
    }

    #[test]
    fn test_quantities_are_suffixed() {
        let mut manifest = ManifestCommon::named("app");
        manifest.memory = Some(512);
        manifest.disk = Some(1024);

        let map = common_to_map(&manifest);
        assert_eq!(map["memory"], Node::from("512M"));
        assert_eq!(map["disk_quota"], Node::from("1024M"));
    }

    #[test]
    fn test_routes_and_null_env() {
        let mut manifest = ApplicationManifest::new(ManifestCommon::named("app"));
        manifest.common.routes = vec![Route {
            route: "tcp.example.com:1024".into(),
            protocol: Some(RouteProtocol::Tcp),
        }];
        manifest.common.environment_variables.insert("EMPTY".into(), None);
        manifest.services = vec!["db".into()];

        let map = application_to_map(&manifest);
        let route = map["routes"].as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(route["protocol"], Node::from("tcp"));
        assert_eq!(map["env"].as_map().unwrap()["EMPTY"], Node::Null);
        assert_eq!(map["services"], Node::List(vec![Node::from("db")]));
    }
}
