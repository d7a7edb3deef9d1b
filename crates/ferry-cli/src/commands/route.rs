//! Route commands

use crate::error::{CliError, CliResult};
use crate::output::{self, OutputFormat};
use clap::Subcommand;
use ferry_routing::{decompose_route, derive_hostnames, WordListRandomWords};
use ferry_types::{DecomposedRoute, DomainSummary, ManifestCommon};
use serde::Serialize;
use tabled::Tabled;

/// Route subcommands
#[derive(Subcommand)]
pub enum RouteCommands {
    /// Split a route string against a list of domains
    Decompose {
        /// Route string, e.g. `api.example.com/v1` or `tcp.example.com:1024`
        route: String,

        /// HTTP domain to match against (repeatable)
        #[arg(short, long = "domain")]
        domains: Vec<String>,

        /// TCP domain to match against (repeatable)
        #[arg(long = "tcp-domain")]
        tcp_domains: Vec<String>,

        /// Path replacing any path in the route string
        #[arg(long)]
        path: Option<String>,
    },

    /// Show the hostnames a push would use for an application
    Hostnames {
        /// Application name
        name: String,

        /// Explicit hostname (repeatable)
        #[arg(long = "host")]
        hosts: Vec<String>,

        /// Use a random hostname
        #[arg(long)]
        random_route: bool,

        /// Map the bare domain
        #[arg(long)]
        no_hostname: bool,
    },
}

/// Table row for a decomposed route
#[derive(Debug, Serialize, Tabled)]
struct RouteRow {
    url: String,
    domain: String,
    host: String,
    path: String,
    port: String,
}

impl From<DecomposedRoute> for RouteRow {
    fn from(route: DecomposedRoute) -> Self {
        Self {
            url: route.to_string(),
            host: route.host.unwrap_or_default(),
            path: route.path.unwrap_or_default(),
            port: route.port.map(|p| p.to_string()).unwrap_or_default(),
            domain: route.domain,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct HostnameRow {
    hostname: String,
}

/// Execute a route command
pub fn execute(command: RouteCommands, format: OutputFormat) -> CliResult<()> {
    match command {
        RouteCommands::Decompose {
            route,
            domains,
            tcp_domains,
            path,
        } => {
            if domains.is_empty() && tcp_domains.is_empty() {
                return Err(CliError::InvalidInput(
                    "at least one --domain or --tcp-domain is required".into(),
                ));
            }
            let catalog: Vec<DomainSummary> = domains
                .iter()
                .map(|name| DomainSummary::http(name.as_str(), name.as_str()))
                .chain(
                    tcp_domains
                        .iter()
                        .map(|name| DomainSummary::tcp(name.as_str(), name.as_str())),
                )
                .collect();

            let matched = decompose_route(&catalog, &route, path.as_deref())?;
            output::print_output(vec![RouteRow::from(matched.route)], format)
        }

        RouteCommands::Hostnames {
            name,
            hosts,
            random_route,
            no_hostname,
        } => {
            let manifest = ManifestCommon {
                hosts,
                random_route: random_route.then_some(true),
                no_hostname: no_hostname.then_some(true),
                ..ManifestCommon::named(name)
            };
            let rows = derive_hostnames(&manifest, &WordListRandomWords)
                .into_iter()
                .map(|hostname| HostnameRow { hostname })
                .collect();
            output::print_output(rows, format)
        }
    }
}
