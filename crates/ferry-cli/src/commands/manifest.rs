//! Manifest commands

use crate::error::CliResult;
use crate::output::{self, print_success, OutputFormat};
use clap::Subcommand;
use ferry_manifest::{
    format_megabytes, write_manifest, write_manifest_file, write_manifest_v3,
    write_manifest_v3_file, ManifestResolver,
};
use ferry_types::{ApplicationManifest, ManifestCommon, ManifestV3Application};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::Tabled;

/// Manifest subcommands
#[derive(Subcommand)]
pub enum ManifestCommands {
    /// Resolve a manifest and list its applications
    Resolve {
        /// Path to the manifest file
        path: PathBuf,

        /// Variables file for ((name)) substitution
        #[arg(long)]
        vars: Option<PathBuf>,

        /// Read the manifest as a v3 document
        #[arg(long)]
        v3: bool,
    },

    /// Resolve a manifest and write it back out in normalized form
    Normalize {
        /// Path to the manifest file
        path: PathBuf,

        /// Variables file for ((name)) substitution
        #[arg(long)]
        vars: Option<PathBuf>,

        /// Read the manifest as a v3 document
        #[arg(long)]
        v3: bool,

        /// Write to this file instead of stdout
        #[arg(short = 'O', long)]
        out: Option<PathBuf>,
    },
}

/// Table row for application display
#[derive(Debug, Serialize, Tabled)]
struct ApplicationRow {
    name: String,
    instances: String,
    memory: String,
    disk: String,
    routes: String,
    services: String,
}

impl ApplicationRow {
    fn new(common: &ManifestCommon, services: Vec<String>) -> Self {
        let quota = |value: Option<u32>| value.map(format_megabytes).unwrap_or_else(|| "-".into());
        let routes = if common.no_route() {
            "none".to_string()
        } else {
            common
                .routes
                .iter()
                .map(|r| r.route.clone())
                .collect::<Vec<_>>()
                .join(", ")
        };

        Self {
            name: common.name.clone(),
            instances: common
                .instances
                .map(|i| i.to_string())
                .unwrap_or_else(|| "-".into()),
            memory: quota(common.memory),
            disk: quota(common.disk),
            routes,
            services: services.join(", "),
        }
    }
}

impl From<&ApplicationManifest> for ApplicationRow {
    fn from(manifest: &ApplicationManifest) -> Self {
        Self::new(&manifest.common, manifest.services.clone())
    }
}

impl From<&ManifestV3Application> for ApplicationRow {
    fn from(application: &ManifestV3Application) -> Self {
        Self::new(
            &application.common,
            application.services.iter().map(|s| s.name.clone()).collect(),
        )
    }
}

/// Execute a manifest command
pub fn execute(
    command: ManifestCommands,
    default_vars: Option<&Path>,
    format: OutputFormat,
) -> CliResult<()> {
    let resolver = ManifestResolver::new();

    match command {
        ManifestCommands::Resolve { path, vars, v3 } => {
            let vars = vars.as_deref().or(default_vars);
            let rows: Vec<ApplicationRow> = if v3 {
                let manifest = resolver.resolve_manifest_v3(&path, vars)?;
                manifest.applications.iter().map(ApplicationRow::from).collect()
            } else {
                let manifests = resolver.resolve_manifest(&path, vars)?;
                manifests.iter().map(ApplicationRow::from).collect()
            };
            output::print_output(rows, format)
        }

        ManifestCommands::Normalize {
            path,
            vars,
            v3,
            out,
        } => {
            let vars = vars.as_deref().or(default_vars);
            match (v3, &out) {
                (true, Some(out)) => {
                    write_manifest_v3_file(out, &resolver.resolve_manifest_v3(&path, vars)?)?
                }
                (true, None) => write_manifest_v3(
                    &mut std::io::stdout().lock(),
                    &resolver.resolve_manifest_v3(&path, vars)?,
                )?,
                (false, Some(out)) => {
                    write_manifest_file(out, &resolver.resolve_manifest(&path, vars)?)?
                }
                (false, None) => write_manifest(
                    &mut std::io::stdout().lock(),
                    &resolver.resolve_manifest(&path, vars)?,
                )?,
            }

            if let Some(out) = out {
                print_success(&format!("Wrote {}", out.display()));
            }
            Ok(())
        }
    }
}
