//! Manifest loading and resolution
//!
//! Resolution runs in a fixed order: `inherit` chains are folded into one
//! document, `((variables))` are substituted, top-level fields outside
//! `applications` form a template, every application is layered on that
//! template, and the result is parsed and validated.

use crate::document::{Map, Node};
use crate::error::{ManifestError, Result};
use crate::merge::merge;
use crate::parse;
use crate::unparse::{applications_document, v3_document};
use crate::variables::{substitute_document, variables_from_document, Variables};
use ferry_types::{ApplicationManifest, ManifestV3};
use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument};

/// Keys that never reach an application
const NON_TEMPLATE_KEYS: [&str; 3] = ["applications", "inherit", "version"];

/// Source of raw manifest documents
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Node>;
}

/// Reads YAML documents from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemLoader;

impl DocumentLoader for FileSystemLoader {
    fn load(&self, path: &Path) -> Result<Node> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Node::from_yaml_str(&text).map_err(|source| ManifestError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Loads manifest files, following `inherit` references
#[derive(Debug, Clone, Default)]
pub struct ManifestResolver<L = FileSystemLoader> {
    loader: L,
}

impl ManifestResolver<FileSystemLoader> {
    pub fn new() -> Self {
        Self::with_loader(FileSystemLoader)
    }
}

impl<L: DocumentLoader> ManifestResolver<L> {
    pub fn with_loader(loader: L) -> Self {
        Self { loader }
    }

    /// Resolve a classic manifest file into its applications
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn resolve_manifest(
        &self,
        path: &Path,
        variables_path: Option<&Path>,
    ) -> Result<Vec<ApplicationManifest>> {
        let variables = match variables_path {
            Some(vars) => self.load_variables(vars)?,
            None => Variables::new(),
        };
        let document = self.load_document(path)?;
        let manifests = resolve(document, &variables, path.parent())?;

        info!(applications = manifests.len(), "Resolved manifest");
        Ok(manifests)
    }

    /// Resolve a v3 manifest file
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn resolve_manifest_v3(
        &self,
        path: &Path,
        variables_path: Option<&Path>,
    ) -> Result<ManifestV3> {
        let variables = match variables_path {
            Some(vars) => self.load_variables(vars)?,
            None => Variables::new(),
        };
        let document = self.load_document(path)?;
        let manifest = resolve_v3(document, &variables, path.parent())?;

        info!(applications = manifest.applications.len(), "Resolved v3 manifest");
        Ok(manifest)
    }

    /// Load a document with its whole `inherit` chain merged in
    pub fn load_document(&self, path: &Path) -> Result<Map> {
        let mut chain = Vec::new();
        self.load_inheriting(path, &mut chain)
    }

    /// Load a flat variables file; values are coerced to strings
    pub fn load_variables(&self, path: &Path) -> Result<Variables> {
        let document = self.load_map(path)?;
        Ok(variables_from_document(&document))
    }

    fn load_map(&self, path: &Path) -> Result<Map> {
        match self.loader.load(path)? {
            Node::Map(map) => Ok(map),
            Node::Null => Ok(Map::new()),
            other => Err(ManifestError::invalid(
                path.display().to_string(),
                format!("document must be a map, found {}", other.kind()),
            )),
        }
    }

    fn load_inheriting(&self, path: &Path, chain: &mut Vec<PathBuf>) -> Result<Map> {
        let path = normalize(path);
        if chain.contains(&path) {
            return Err(ManifestError::invalid(
                path.display().to_string(),
                "inherit chain refers back to itself",
            ));
        }
        chain.push(path.clone());

        debug!(path = %path.display(), depth = chain.len(), "Loading manifest document");
        let mut document = self.load_map(&path)?;

        let resolved = match document.remove("inherit") {
            None | Some(Node::Null) => document,
            Some(Node::String(parent)) => {
                let parent_path = path
                    .parent()
                    .map(|dir| dir.join(&parent))
                    .unwrap_or_else(|| PathBuf::from(&parent));
                let mut base = self.load_inheriting(&parent_path, chain)?;
                merge(&mut base, &document);
                base
            }
            Some(other) => {
                return Err(ManifestError::invalid(
                    path.display().to_string(),
                    format!("'inherit' must be a string, found {}", other.kind()),
                ))
            }
        };

        chain.pop();
        Ok(resolved)
    }
}

/// Lexically normalize a path so `a/../b` and `b` compare equal
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn template_of(document: &Map) -> Map {
    document
        .iter()
        .filter(|(key, _)| !NON_TEMPLATE_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Each application merged onto the template, paired with its location
fn merged_applications(document: &Map) -> Result<Vec<(Map, String)>> {
    let template = template_of(document);

    let applications = match document.get("applications") {
        None | Some(Node::Null) => return Ok(Vec::new()),
        Some(Node::List(items)) => items,
        Some(other) => {
            return Err(ManifestError::invalid(
                "manifest",
                format!("'applications' must be a list, found {}", other.kind()),
            ))
        }
    };

    applications
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let location = format!("applications[{}]", index);
            let application = item.as_map().ok_or_else(|| {
                ManifestError::invalid(
                    location.clone(),
                    format!("application must be a map, found {}", item.kind()),
                )
            })?;
            if !matches!(application.get("name"), Some(n) if n.scalar_string().is_some()) {
                return Err(ManifestError::MissingRequiredField {
                    field: "name",
                    location,
                });
            }

            let mut merged = template.clone();
            merge(&mut merged, application);
            Ok((merged, location))
        })
        .collect()
}

/// Resolve an already loaded classic manifest document
pub fn resolve(
    mut document: Map,
    variables: &Variables,
    base_dir: Option<&Path>,
) -> Result<Vec<ApplicationManifest>> {
    substitute_document(&mut document, variables)?;

    merged_applications(&document)?
        .into_iter()
        .map(|(merged, location)| {
            let manifest = parse::application_manifest(&merged, &location, base_dir)?;
            manifest.validate().map_err(|e| {
                ManifestError::invalid(format!("application '{}'", manifest.name()), e)
            })?;
            Ok(manifest)
        })
        .collect()
}

/// Resolve an already loaded v3 manifest document
pub fn resolve_v3(
    mut document: Map,
    variables: &Variables,
    base_dir: Option<&Path>,
) -> Result<ManifestV3> {
    substitute_document(&mut document, variables)?;

    let version = match document.get("version") {
        None | Some(Node::Null) => None,
        Some(Node::Integer(v)) => Some(u32::try_from(*v).map_err(|_| {
            ManifestError::invalid("manifest", format!("'version' must be 1, found {}", v))
        })?),
        Some(Node::String(s)) => Some(s.trim().parse::<u32>().map_err(|_| {
            ManifestError::invalid("manifest", format!("'version' must be 1, found '{}'", s))
        })?),
        Some(other) => {
            return Err(ManifestError::invalid(
                "manifest",
                format!("'version' must be an integer, found {}", other.kind()),
            ))
        }
    };

    let applications = merged_applications(&document)?
        .into_iter()
        .map(|(merged, location)| {
            let application = parse::v3_application(&merged, &location, base_dir)?;
            application.common.validate().map_err(|e| {
                ManifestError::invalid(format!("application '{}'", application.name()), e)
            })?;
            Ok(application)
        })
        .collect::<Result<Vec<_>>>()?;

    let manifest = ManifestV3 {
        version,
        applications,
    };
    manifest
        .validate()
        .map_err(|e| ManifestError::invalid("manifest", e))?;
    Ok(manifest)
}

fn write_document(writer: &mut impl Write, document: &Node) -> Result<()> {
    let yaml = document.to_yaml_string()?;
    writer.write_all(b"---\n")?;
    writer.write_all(yaml.as_bytes())?;
    writer.flush()?;
    Ok(())
}

fn create_file(path: &Path) -> Result<File> {
    File::create(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write classic manifests as one YAML document
pub fn write_manifest(writer: &mut impl Write, manifests: &[ApplicationManifest]) -> Result<()> {
    write_document(writer, &applications_document(manifests))
}

pub fn write_manifest_file(path: &Path, manifests: &[ApplicationManifest]) -> Result<()> {
    let mut file = create_file(path)?;
    write_manifest(&mut file, manifests)?;
    debug!(path = %path.display(), applications = manifests.len(), "Wrote manifest");
    Ok(())
}

pub fn write_manifest_v3(writer: &mut impl Write, manifest: &ManifestV3) -> Result<()> {
    write_document(writer, &v3_document(manifest))
}

pub fn write_manifest_v3_file(path: &Path, manifest: &ManifestV3) -> Result<()> {
    let mut file = create_file(path)?;
    write_manifest_v3(&mut file, manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Serves documents from memory
    #[derive(Default)]
    struct StaticLoader {
        documents: HashMap<PathBuf, String>,
    }

    impl StaticLoader {
        fn with(mut self, path: &str, yaml: &str) -> Self {
            self.documents.insert(PathBuf::from(path), yaml.to_string());
            self
        }
    }

    impl DocumentLoader for StaticLoader {
        fn load(&self, path: &Path) -> Result<Node> {
            let text = self.documents.get(path).ok_or_else(|| ManifestError::Io {
                path: path.to_path_buf(),
                source: std::io::ErrorKind::NotFound.into(),
            })?;
            Ok(Node::from_yaml_str(text)?)
        }
    }

    fn document(yaml: &str) -> Map {
        match Node::from_yaml_str(yaml).unwrap() {
            Node::Map(map) => map,
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_template_applies_to_every_application() {
        let manifests = resolve(
            document(
                "memory: 1G\ninstances: 2\napplications:\n- name: a\n- name: b\n  instances: 4\n",
            ),
            &Variables::new(),
            None,
        )
        .unwrap();

        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].common.memory, Some(1024));
        assert_eq!(manifests[0].common.instances, Some(2));
        assert_eq!(manifests[1].common.memory, Some(1024));
        assert_eq!(manifests[1].common.instances, Some(4));
    }

    #[test]
    fn test_variables_are_substituted() {
        let variables: Variables = [("HOST".to_string(), "api".to_string())].into();
        let manifests = resolve(
            document("applications:\n- name: app\n  hosts: [((HOST))]\n"),
            &variables,
            None,
        )
        .unwrap();
        assert_eq!(manifests[0].common.hosts, vec!["api"]);
    }

    #[test]
    fn test_unresolved_variable_is_fatal() {
        let err = resolve(
            document("applications:\n- name: app\n  command: ((CMD))\n"),
            &Variables::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::UnresolvedVariable { ref variable, .. } if variable == "CMD"));
    }

    #[test]
    fn test_application_without_name() {
        let err = resolve(
            document("name: from-template\napplications:\n- memory: 1G\n"),
            &Variables::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::MissingRequiredField { field: "name", .. }));
    }

    #[test]
    fn test_invariant_violation_names_application() {
        let err = resolve(
            document("applications:\n- name: app\n  hosts: [a]\n  routes:\n  - route: a.example.com\n"),
            &Variables::new(),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid manifest (application 'app'): routes and hosts cannot both be set"
        );
    }

    #[test]
    fn test_docker_password_without_username_is_invalid() {
        let err = resolve(
            document("applications:\n- name: app\n  docker:\n    image: nginx\n    password: secret\n"),
            &Variables::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidManifest { .. }));
    }

    #[test]
    fn test_inherit_merges_child_into_parent() {
        let loader = StaticLoader::default()
            .with(
                "/m/base.yml",
                "memory: 512M\napplications:\n- name: a\n  instances: 1\n- name: b\n",
            )
            .with(
                "/m/child.yml",
                "inherit: base.yml\napplications:\n- name: b\n  instances: 3\n- name: c\n",
            );
        let resolver = ManifestResolver::with_loader(loader);

        let manifests = resolver
            .resolve_manifest(Path::new("/m/child.yml"), None)
            .unwrap();

        let names: Vec<_> = manifests.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(manifests[1].common.instances, Some(3));
        assert_eq!(manifests[2].common.memory, Some(512));
    }

    #[test]
    fn test_inherit_cycle_is_rejected() {
        let loader = StaticLoader::default()
            .with("/m/a.yml", "inherit: ./b.yml\n")
            .with("/m/b.yml", "inherit: ../m/a.yml\n");
        let resolver = ManifestResolver::with_loader(loader);

        let err = resolver.load_document(Path::new("/m/a.yml")).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidManifest { .. }));
    }

    #[test]
    fn test_v3_version_must_be_one() {
        let err = resolve_v3(
            document("version: 2\napplications:\n- name: app\n"),
            &Variables::new(),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("version 2 is not supported"));

        let err = resolve_v3(document("version: 1\n"), &Variables::new(), None).unwrap_err();
        assert!(err.to_string().contains("at least one application"));
    }

    #[test]
    fn test_write_manifest() {
        let manifests = resolve(
            document("applications:\n- name: app\n  memory: 1G\n"),
            &Variables::new(),
            None,
        )
        .unwrap();

        let mut out = Vec::new();
        write_manifest(&mut out, &manifests).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("---\n"));
        assert!(text.contains("memory: 1024M"));
        assert!(text.contains("name: app"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/m/./x/../a.yml")), PathBuf::from("/m/a.yml"));
        assert_eq!(normalize(Path::new("../a.yml")), PathBuf::from("../a.yml"));
    }
}
