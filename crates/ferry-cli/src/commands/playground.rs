//! Playground commands
//!
//! Runs the real push pipeline against an in-memory platform seeded from
//! the manifest, so a manifest can be rehearsed without a remote.

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{self, print_error, print_info, print_success, print_warning, OutputFormat};
use clap::Subcommand;
use ferry_deployment::{DeploymentManager, PushOptions};
use ferry_manifest::ManifestResolver;
use ferry_platform::InMemoryPlatform;
use ferry_types::{ApplicationManifest, SpaceId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

const DEFAULT_DOMAIN: &str = "apps.ferry.local";

/// Playground subcommands
#[derive(Subcommand)]
pub enum PlaygroundCommands {
    /// Push every application of a manifest to an in-memory platform
    Push {
        /// Path to the manifest file
        path: PathBuf,

        /// Variables file for ((name)) substitution
        #[arg(long)]
        vars: Option<PathBuf>,

        /// Shared domain of the in-memory platform
        #[arg(long)]
        domain: Option<String>,

        /// Upload and stage but do not start
        #[arg(long)]
        no_start: bool,

        /// Staging timeout in seconds, overriding the configuration
        #[arg(long)]
        staging_timeout: Option<u64>,

        /// Startup timeout in seconds, overriding the configuration
        #[arg(long)]
        startup_timeout: Option<u64>,
    },
}

/// Table row for a push result
#[derive(Debug, Serialize, Tabled)]
struct PushRow {
    name: String,
    created: bool,
    stage: String,
    routes: usize,
}

/// Execute a playground command
pub async fn execute(
    command: PlaygroundCommands,
    config: &CliConfig,
    format: OutputFormat,
) -> CliResult<()> {
    match command {
        PlaygroundCommands::Push {
            path,
            vars,
            domain,
            no_start,
            staging_timeout,
            startup_timeout,
        } => {
            let vars = vars.or_else(|| config.variables.clone());
            let manifests = ManifestResolver::new().resolve_manifest(&path, vars.as_deref())?;
            if manifests.is_empty() {
                return Err(CliError::InvalidInput(format!(
                    "{} declares no applications",
                    path.display()
                )));
            }

            // 1. Seed the platform with what the manifests reference
            let domain = domain
                .or_else(|| config.default_domain.clone())
                .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
            let platform = Arc::new(InMemoryPlatform::new());
            let space = platform.add_space("playground");
            platform.add_shared_domain(&domain);
            seed(&platform, &space, &manifests);
            print_info(&format!(
                "Pushing {} application(s) to {}",
                manifests.len(),
                domain
            ));

            // 2. Push
            let mut deployment = config.deployment.clone();
            if let Some(secs) = staging_timeout {
                deployment.staging_timeout_secs = secs;
            }
            if let Some(secs) = startup_timeout {
                deployment.startup_timeout_secs = secs;
            }
            let manager = DeploymentManager::new(platform.clone(), deployment);

            let options = PushOptions {
                no_start,
                ..Default::default()
            };
            let results = manager.push_all(&space, &manifests, &options).await;

            // 3. Report
            let total = results.len();
            let mut rows = Vec::new();
            let mut failed = 0;
            for result in results {
                match result {
                    Ok(outcome) => rows.push(PushRow {
                        name: outcome.app,
                        created: outcome.created,
                        stage: outcome.stage.to_string(),
                        routes: outcome.routes.len(),
                    }),
                    Err(error) => {
                        failed += 1;
                        print_error(&error.to_string());
                    }
                }
            }
            output::print_output(rows, format)?;

            if failed > 0 {
                return Err(CliError::PushFailed { failed, total });
            }
            print_success(&format!("Pushed {} application(s)", total));
            if no_start {
                print_warning("Applications were left stopped");
            }
            Ok(())
        }
    }
}

/// Register the stacks and service instances the manifests name
fn seed(platform: &InMemoryPlatform, space: &SpaceId, manifests: &[ApplicationManifest]) {
    let stacks: BTreeSet<&str> = manifests
        .iter()
        .filter_map(|m| m.common.stack.as_deref())
        .collect();
    for stack in stacks {
        platform.add_stack(stack);
    }

    let services: BTreeSet<&str> = manifests
        .iter()
        .flat_map(|m| m.services.iter().map(String::as_str))
        .collect();
    for service in services {
        platform.add_service_instance(space, service);
    }
}
