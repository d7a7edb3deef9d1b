//! In-memory platform
//!
//! Implements every resource group against local maps so complete push
//! pipelines can run without a network. Starting an application stages its
//! package and brings all requested instances to `RUNNING` immediately.
//! Tests steer the observation loops with scripted states and one-shot
//! failures.

use crate::api::*;
use crate::error::{codes, PlatformError, Result};
use crate::pagination::{page_of, Cursor, Page};
use crate::resources::*;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use ferry_types::{
    AppId, AppState, BuildId, BuildState, DomainId, DomainSummary, DropletId, InstanceState,
    JobId, JobState, OrganizationId, PackageId, PackageState, PackageUploadState, RouteId,
    ServiceBindingId, ServiceInstanceId, SpaceId, StackId,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const DEFAULT_PAGE_SIZE: usize = 50;
const FIRST_TCP_PORT: u64 = 1024;

/// Platform calls, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListApplications,
    GetApplication,
    CreateApplication,
    UpdateApplication,
    DeleteApplication,
    Instances,
    Restage,
    Upload,
    ListApplicationRoutes,
    AssociateRoute,
    RemoveRoute,
    ListServiceBindings,
    SetDroplet,
    ListRoutes,
    CreateRoute,
    DeleteRoute,
    ListDomains,
    GetDomain,
    ListServiceInstances,
    GetServiceInstance,
    Bind,
    Unbind,
    CreatePackage,
    UploadPackage,
    GetPackage,
    CreateBuild,
    GetBuild,
    GetJob,
    ListStacks,
    GetStack,
    GetSpace,
    ApplyManifest,
    MatchResources,
}

struct Sequenced<T> {
    seq: u64,
    value: T,
}

struct AppRecord {
    seq: u64,
    resource: ApplicationResource,
    routes: Vec<RouteId>,
    running: Vec<InstanceState>,
}

struct DomainRecord {
    seq: u64,
    summary: DomainSummary,
    owner: Option<OrganizationId>,
}

/// In-memory platform
pub struct InMemoryPlatform {
    page_size: usize,
    seq: AtomicU64,
    next_port: AtomicU64,
    spaces: DashMap<SpaceId, SpaceResource>,
    applications: DashMap<AppId, AppRecord>,
    routes: DashMap<RouteId, Sequenced<RouteResource>>,
    domains: DashMap<DomainId, DomainRecord>,
    service_instances: DashMap<ServiceInstanceId, Sequenced<ServiceInstanceResource>>,
    bindings: DashMap<ServiceBindingId, Sequenced<ServiceBindingResource>>,
    packages: DashMap<PackageId, PackageResource>,
    builds: DashMap<BuildId, BuildResource>,
    jobs: DashMap<JobId, JobResource>,
    stacks: DashMap<StackId, Sequenced<StackResource>>,
    uploads: DashMap<AppId, Vec<UploadRequest>>,
    known_resources: DashSet<String>,
    staging_scripts: DashMap<String, VecDeque<Result<PackageState>>>,
    instance_scripts: DashMap<String, VecDeque<Result<Vec<InstanceState>>>>,
    build_scripts: DashMap<String, VecDeque<Result<BuildState>>>,
    failures: DashMap<Operation, PlatformError>,
    job_failures: DashMap<Operation, Vec<String>>,
    calls: DashMap<Operation, u64>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            seq: AtomicU64::new(0),
            next_port: AtomicU64::new(FIRST_TCP_PORT),
            spaces: DashMap::new(),
            applications: DashMap::new(),
            routes: DashMap::new(),
            domains: DashMap::new(),
            service_instances: DashMap::new(),
            bindings: DashMap::new(),
            packages: DashMap::new(),
            builds: DashMap::new(),
            jobs: DashMap::new(),
            stacks: DashMap::new(),
            uploads: DashMap::new(),
            known_resources: DashSet::new(),
            staging_scripts: DashMap::new(),
            instance_scripts: DashMap::new(),
            build_scripts: DashMap::new(),
            failures: DashMap::new(),
            job_failures: DashMap::new(),
            calls: DashMap::new(),
        }
    }

    /// Use a smaller page size to exercise pagination
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    // ═══════════════════════════════════════════════════════════════════
    // SEEDING
    // ═══════════════════════════════════════════════════════════════════

    pub fn add_space(&self, organization_id: impl Into<OrganizationId>) -> SpaceId {
        let id = SpaceId::generate();
        self.spaces.insert(
            id.clone(),
            SpaceResource {
                id: id.clone(),
                organization_id: organization_id.into(),
            },
        );
        id
    }

    /// Register a domain; `owner` makes it private to that organization
    pub fn add_domain(&self, summary: DomainSummary, owner: Option<OrganizationId>) -> DomainId {
        let id = summary.id.clone();
        self.domains.insert(
            id.clone(),
            DomainRecord {
                seq: self.next_seq(),
                summary,
                owner,
            },
        );
        id
    }

    pub fn add_shared_domain(&self, name: &str) -> DomainId {
        self.add_domain(DomainSummary::http(DomainId::generate(), name), None)
    }

    pub fn add_service_instance(&self, space_id: &SpaceId, name: &str) -> ServiceInstanceId {
        let id = ServiceInstanceId::generate();
        self.service_instances.insert(
            id.clone(),
            Sequenced {
                seq: self.next_seq(),
                value: ServiceInstanceResource {
                    id: id.clone(),
                    name: name.to_string(),
                    space_id: space_id.clone(),
                },
            },
        );
        id
    }

    pub fn add_stack(&self, name: &str) -> StackId {
        let id = StackId::generate();
        self.stacks.insert(
            id.clone(),
            Sequenced {
                seq: self.next_seq(),
                value: StackResource {
                    id: id.clone(),
                    name: name.to_string(),
                },
            },
        );
        id
    }

    /// Mark file contents as already held by the platform
    pub fn add_known_resource(&self, sha256: &str) {
        self.known_resources.insert(sha256.to_string());
    }

    // ═══════════════════════════════════════════════════════════════════
    // SCRIPTING
    // ═══════════════════════════════════════════════════════════════════

    /// Package states returned by successive application reads; the last
    /// entry repeats once the script is exhausted.
    pub fn script_staging(&self, app_name: &str, states: Vec<Result<PackageState>>) {
        self.staging_scripts
            .insert(app_name.to_string(), states.into_iter().collect());
    }

    /// Instance states returned by successive instance reads
    pub fn script_instances(&self, app_name: &str, states: Vec<Result<Vec<InstanceState>>>) {
        self.instance_scripts
            .insert(app_name.to_string(), states.into_iter().collect());
    }

    /// Build states returned by successive build reads
    pub fn script_builds(&self, app_name: &str, states: Vec<Result<BuildState>>) {
        self.build_scripts
            .insert(app_name.to_string(), states.into_iter().collect());
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: PlatformError) {
        self.failures.insert(operation, error);
    }

    /// Make the next job created by `operation` finish as failed
    pub fn fail_next_job(&self, operation: Operation, errors: Vec<String>) {
        self.job_failures.insert(operation, errors);
    }

    // ═══════════════════════════════════════════════════════════════════
    // INSPECTION
    // ═══════════════════════════════════════════════════════════════════

    pub fn call_count(&self, operation: Operation) -> u64 {
        self.calls.get(&operation).map(|c| *c).unwrap_or(0)
    }

    pub fn find_application(&self, space_id: &SpaceId, name: &str) -> Option<ApplicationResource> {
        self.applications
            .iter()
            .find(|r| &r.resource.space_id == space_id && r.resource.name == name)
            .map(|r| r.resource.clone())
    }

    pub fn application_routes(&self, app_id: &AppId) -> Vec<RouteResource> {
        let route_ids = self
            .applications
            .get(app_id)
            .map(|r| r.routes.clone())
            .unwrap_or_default();
        route_ids
            .iter()
            .filter_map(|id| self.routes.get(id).map(|r| r.value.clone()))
            .collect()
    }

    pub fn application_bindings(&self, app_id: &AppId) -> Vec<ServiceBindingResource> {
        self.sorted(&self.bindings, |b| &b.app_id == app_id)
    }

    pub fn uploads(&self, app_id: &AppId) -> Vec<UploadRequest> {
        self.uploads
            .get(app_id)
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    pub fn running_instances(&self, app_id: &AppId) -> usize {
        self.applications
            .get(app_id)
            .map(|r| {
                r.running
                    .iter()
                    .filter(|s| **s == InstanceState::Running)
                    .count()
            })
            .unwrap_or(0)
    }

    // ═══════════════════════════════════════════════════════════════════
    // INTERNALS
    // ═══════════════════════════════════════════════════════════════════

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn record(&self, operation: Operation) -> Result<()> {
        *self.calls.entry(operation).or_insert(0) += 1;
        match self.failures.remove(&operation) {
            Some((_, error)) => {
                debug!(?operation, %error, "Injected platform failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn new_job(&self, operation: Operation) -> JobHandle {
        let id = JobId::generate();
        let (state, errors) = match self.job_failures.remove(&operation) {
            Some((_, errors)) => (JobState::Failed, errors),
            None => (JobState::Complete, Vec::new()),
        };
        self.jobs.insert(
            id.clone(),
            JobResource {
                id: id.clone(),
                state,
                errors,
            },
        );
        JobHandle { id }
    }

    fn remember_files(&self, request: &UploadRequest) {
        for file in &request.files {
            self.known_resources.insert(file.sha256.clone());
        }
    }

    fn sorted<K, T, F>(&self, map: &DashMap<K, Sequenced<T>>, filter: F) -> Vec<T>
    where
        K: Eq + std::hash::Hash,
        T: Clone,
        F: Fn(&T) -> bool,
    {
        let mut items: Vec<(u64, T)> = map
            .iter()
            .filter(|e| filter(&e.value))
            .map(|e| (e.seq, e.value.clone()))
            .collect();
        items.sort_by_key(|(seq, _)| *seq);
        items.into_iter().map(|(_, v)| v).collect()
    }

    fn domains_where<F>(&self, filter: F) -> Vec<DomainSummary>
    where
        F: Fn(&DomainRecord) -> bool,
    {
        let mut items: Vec<(u64, DomainSummary)> = self
            .domains
            .iter()
            .filter(|e| filter(e.value()))
            .map(|e| (e.seq, e.summary.clone()))
            .collect();
        items.sort_by_key(|(seq, _)| *seq);
        items.into_iter().map(|(_, d)| d).collect()
    }

    fn app_name(&self, id: &AppId) -> Result<String> {
        self.applications
            .get(id)
            .map(|r| r.resource.name.clone())
            .ok_or_else(|| PlatformError::not_found("application", id))
    }

    fn apply_spec(record: &mut AppRecord, spec: ApplicationSpec) {
        let app = &mut record.resource;
        if let Some(name) = spec.name {
            app.name = name;
        }
        if let Some(buildpacks) = spec.buildpacks {
            app.buildpacks = buildpacks;
        }
        if spec.command.is_some() {
            app.command = spec.command;
        }
        if let Some(disk) = spec.disk_quota {
            app.disk_quota = disk;
        }
        if spec.docker_image.is_some() {
            app.docker_image = spec.docker_image;
        }
        if let Some(environment) = spec.environment {
            app.environment = environment;
        }
        if spec.health_check_type.is_some() {
            app.health_check_type = spec.health_check_type;
        }
        if spec.health_check_http_endpoint.is_some() {
            app.health_check_http_endpoint = spec.health_check_http_endpoint;
        }
        if spec.health_check_timeout.is_some() {
            app.health_check_timeout = spec.health_check_timeout;
        }
        if let Some(instances) = spec.instances {
            app.instances = instances;
        }
        if let Some(memory) = spec.memory {
            app.memory = memory;
        }
        if spec.stack_id.is_some() {
            app.stack_id = spec.stack_id;
        }

        match spec.state {
            Some(AppState::Started) if app.state != AppState::Started => {
                app.state = AppState::Started;
                if app.package_state == PackageState::Pending {
                    app.package_state = PackageState::Staged;
                    app.droplet_id = Some(DropletId::generate());
                }
            }
            Some(AppState::Stopped) => app.state = AppState::Stopped,
            _ => {}
        }

        record.running = match record.resource.state {
            AppState::Started => vec![InstanceState::Running; record.resource.instances as usize],
            AppState::Stopped => Vec::new(),
        };
    }

    fn next_scripted<T: Clone>(
        scripts: &DashMap<String, VecDeque<T>>,
        key: &str,
    ) -> Option<T> {
        let mut script = scripts.get_mut(key)?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for InMemoryPlatform {
    fn applications(&self) -> &dyn ApplicationsApi {
        self
    }

    fn routes(&self) -> &dyn RoutesApi {
        self
    }

    fn domains(&self) -> &dyn DomainsApi {
        self
    }

    fn service_instances(&self) -> &dyn ServiceInstancesApi {
        self
    }

    fn packages(&self) -> &dyn PackagesApi {
        self
    }

    fn builds(&self) -> &dyn BuildsApi {
        self
    }

    fn jobs(&self) -> &dyn JobsApi {
        self
    }

    fn stacks(&self) -> &dyn StacksApi {
        self
    }

    fn spaces(&self) -> &dyn SpacesApi {
        self
    }

    fn resource_match(&self) -> &dyn ResourceMatchApi {
        self
    }
}

#[async_trait]
impl ApplicationsApi for InMemoryPlatform {
    async fn list(&self, request: ListApplicationsRequest) -> Result<Page<ApplicationResource>> {
        self.record(Operation::ListApplications)?;

        let mut items: Vec<(u64, ApplicationResource)> = self
            .applications
            .iter()
            .filter(|r| {
                request
                    .space_id
                    .as_ref()
                    .map_or(true, |s| &r.resource.space_id == s)
                    && request.name.as_ref().map_or(true, |n| &r.resource.name == n)
            })
            .map(|r| (r.seq, r.resource.clone()))
            .collect();
        items.sort_by_key(|(seq, _)| *seq);
        let items: Vec<ApplicationResource> = items.into_iter().map(|(_, a)| a).collect();

        Ok(page_of(&items, request.cursor.as_ref(), self.page_size))
    }

    async fn get(&self, id: &AppId) -> Result<ApplicationResource> {
        self.record(Operation::GetApplication)?;

        let name = self.app_name(id)?;
        let scripted = Self::next_scripted(&self.staging_scripts, &name);

        let mut record = self
            .applications
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found("application", id))?;
        match scripted {
            Some(Ok(state)) => record.resource.package_state = state,
            Some(Err(error)) => return Err(error),
            None => {}
        }
        Ok(record.resource.clone())
    }

    async fn create(&self, space_id: &SpaceId, spec: ApplicationSpec) -> Result<ApplicationResource> {
        self.record(Operation::CreateApplication)?;

        if !self.spaces.contains_key(space_id) {
            return Err(PlatformError::not_found("space", space_id));
        }
        let name = spec
            .name
            .clone()
            .ok_or_else(|| PlatformError::api(10008, "application name is required"))?;
        if self.find_application(space_id, &name).is_some() {
            return Err(PlatformError::api(
                codes::APP_NAME_TAKEN,
                format!("The app name is taken: {}", name),
            ));
        }

        let id = AppId::generate();
        let mut record = AppRecord {
            seq: self.next_seq(),
            resource: ApplicationResource {
                id: id.clone(),
                name,
                space_id: space_id.clone(),
                state: AppState::Stopped,
                package_state: PackageState::Pending,
                instances: 1,
                memory: 1024,
                disk_quota: 1024,
                buildpacks: Vec::new(),
                command: None,
                docker_image: None,
                stack_id: None,
                health_check_type: None,
                health_check_http_endpoint: None,
                health_check_timeout: None,
                environment: Default::default(),
                droplet_id: None,
            },
            routes: Vec::new(),
            running: Vec::new(),
        };
        Self::apply_spec(&mut record, spec);
        let resource = record.resource.clone();
        self.applications.insert(id, record);

        Ok(resource)
    }

    async fn update(&self, id: &AppId, spec: ApplicationSpec) -> Result<ApplicationResource> {
        self.record(Operation::UpdateApplication)?;

        let mut record = self
            .applications
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found("application", id))?;
        Self::apply_spec(&mut record, spec);
        Ok(record.resource.clone())
    }

    async fn delete(&self, id: &AppId) -> Result<()> {
        self.record(Operation::DeleteApplication)?;

        self.applications
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found("application", id))
    }

    async fn instances(&self, id: &AppId) -> Result<Vec<InstanceInfo>> {
        self.record(Operation::Instances)?;

        let name = self.app_name(id)?;
        let states = match Self::next_scripted(&self.instance_scripts, &name) {
            Some(scripted) => scripted?,
            None => self
                .applications
                .get(id)
                .map(|r| r.running.clone())
                .unwrap_or_default(),
        };

        Ok(states
            .into_iter()
            .enumerate()
            .map(|(index, state)| InstanceInfo {
                index: index as u32,
                state,
            })
            .collect())
    }

    async fn restage(&self, id: &AppId) -> Result<ApplicationResource> {
        self.record(Operation::Restage)?;

        let mut record = self
            .applications
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found("application", id))?;
        record.resource.package_state = PackageState::Staged;
        record.resource.droplet_id = Some(DropletId::generate());
        if record.resource.state == AppState::Started {
            record.running = vec![InstanceState::Running; record.resource.instances as usize];
        }
        Ok(record.resource.clone())
    }

    async fn upload(&self, id: &AppId, request: UploadRequest) -> Result<JobHandle> {
        self.record(Operation::Upload)?;

        {
            let mut record = self
                .applications
                .get_mut(id)
                .ok_or_else(|| PlatformError::not_found("application", id))?;
            record.resource.package_state = PackageState::Pending;
        }
        self.remember_files(&request);
        self.uploads.entry(id.clone()).or_default().push(request);

        Ok(self.new_job(Operation::Upload))
    }

    async fn list_routes(&self, id: &AppId, cursor: Option<Cursor>) -> Result<Page<RouteResource>> {
        self.record(Operation::ListApplicationRoutes)?;

        if !self.applications.contains_key(id) {
            return Err(PlatformError::not_found("application", id));
        }
        let routes = self.application_routes(id);
        Ok(page_of(&routes, cursor.as_ref(), self.page_size))
    }

    async fn associate_route(&self, id: &AppId, route_id: &RouteId) -> Result<()> {
        self.record(Operation::AssociateRoute)?;

        if !self.routes.contains_key(route_id) {
            return Err(PlatformError::not_found("route", route_id));
        }
        let mut record = self
            .applications
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found("application", id))?;
        if !record.routes.contains(route_id) {
            record.routes.push(route_id.clone());
        }
        Ok(())
    }

    async fn remove_route(&self, id: &AppId, route_id: &RouteId) -> Result<()> {
        self.record(Operation::RemoveRoute)?;

        let mut record = self
            .applications
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found("application", id))?;
        record.routes.retain(|r| r != route_id);
        Ok(())
    }

    async fn list_service_bindings(
        &self,
        id: &AppId,
        cursor: Option<Cursor>,
    ) -> Result<Page<ServiceBindingResource>> {
        self.record(Operation::ListServiceBindings)?;

        let bindings = self.application_bindings(id);
        Ok(page_of(&bindings, cursor.as_ref(), self.page_size))
    }

    async fn set_current_droplet(&self, id: &AppId, droplet_id: &DropletId) -> Result<()> {
        self.record(Operation::SetDroplet)?;

        let mut record = self
            .applications
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found("application", id))?;
        record.resource.droplet_id = Some(droplet_id.clone());
        record.resource.package_state = PackageState::Staged;
        Ok(())
    }
}

#[async_trait]
impl RoutesApi for InMemoryPlatform {
    async fn list(&self, request: ListRoutesRequest) -> Result<Page<RouteResource>> {
        self.record(Operation::ListRoutes)?;

        let routes = self.sorted(&self.routes, |r| {
            request.domain_id.as_ref().map_or(true, |d| &r.domain_id == d)
                && request.host.as_ref().map_or(true, |h| &r.host == h)
                && request.path.as_ref().map_or(true, |p| &r.path == p)
                && request.port.map_or(true, |p| r.port == Some(p))
        });
        Ok(page_of(&routes, request.cursor.as_ref(), self.page_size))
    }

    async fn create(&self, request: CreateRouteRequest) -> Result<RouteResource> {
        self.record(Operation::CreateRoute)?;

        if !self.domains.contains_key(&request.domain_id) {
            return Err(PlatformError::not_found("domain", &request.domain_id));
        }

        let port = match (request.port, request.random_port) {
            (Some(port), _) => Some(port),
            (None, true) => {
                let port = self.next_port.fetch_add(1, Ordering::SeqCst);
                Some(u16::try_from(port).map_err(|_| {
                    PlatformError::api(codes::INSUFFICIENT_RESOURCES, "no TCP ports left")
                })?)
            }
            (None, false) => None,
        };
        let route = RouteResource {
            id: RouteId::generate(),
            domain_id: request.domain_id,
            space_id: request.space_id,
            host: request.host.unwrap_or_default(),
            path: request.path.unwrap_or_default(),
            port,
        };

        let taken = self.routes.iter().any(|r| {
            r.value.domain_id == route.domain_id
                && r.value.host == route.host
                && r.value.path == route.path
                && r.value.port == route.port
        });
        if taken {
            return Err(PlatformError::api(
                codes::ROUTE_TAKEN,
                format!("The route is taken: {}{}", route.host, route.path),
            ));
        }

        self.routes.insert(
            route.id.clone(),
            Sequenced {
                seq: self.next_seq(),
                value: route.clone(),
            },
        );
        Ok(route)
    }

    async fn delete(&self, id: &RouteId) -> Result<JobHandle> {
        self.record(Operation::DeleteRoute)?;

        if self.routes.remove(id).is_none() {
            return Err(PlatformError::not_found("route", id));
        }
        for mut record in self.applications.iter_mut() {
            record.routes.retain(|r| r != id);
        }
        Ok(self.new_job(Operation::DeleteRoute))
    }
}

#[async_trait]
impl DomainsApi for InMemoryPlatform {
    async fn list_private(
        &self,
        organization_id: &OrganizationId,
        cursor: Option<Cursor>,
    ) -> Result<Page<DomainSummary>> {
        self.record(Operation::ListDomains)?;

        let domains = self.domains_where(|d| d.owner.as_ref() == Some(organization_id));
        Ok(page_of(&domains, cursor.as_ref(), self.page_size))
    }

    async fn list_shared(&self, cursor: Option<Cursor>) -> Result<Page<DomainSummary>> {
        self.record(Operation::ListDomains)?;

        let domains = self.domains_where(|d| d.owner.is_none());
        Ok(page_of(&domains, cursor.as_ref(), self.page_size))
    }

    async fn get(&self, id: &DomainId) -> Result<DomainSummary> {
        self.record(Operation::GetDomain)?;

        self.domains
            .get(id)
            .map(|d| d.summary.clone())
            .ok_or_else(|| PlatformError::not_found("domain", id))
    }
}

#[async_trait]
impl ServiceInstancesApi for InMemoryPlatform {
    async fn list(
        &self,
        request: ListServiceInstancesRequest,
    ) -> Result<Page<ServiceInstanceResource>> {
        self.record(Operation::ListServiceInstances)?;

        let instances = self.sorted(&self.service_instances, |s| {
            request.space_id.as_ref().map_or(true, |id| &s.space_id == id)
                && request.name.as_ref().map_or(true, |n| &s.name == n)
        });
        Ok(page_of(&instances, request.cursor.as_ref(), self.page_size))
    }

    async fn get(&self, id: &ServiceInstanceId) -> Result<ServiceInstanceResource> {
        self.record(Operation::GetServiceInstance)?;

        self.service_instances
            .get(id)
            .map(|s| s.value.clone())
            .ok_or_else(|| PlatformError::not_found("service instance", id))
    }

    async fn bind(&self, request: BindRequest) -> Result<ServiceBindingResource> {
        self.record(Operation::Bind)?;

        if !self.applications.contains_key(&request.app_id) {
            return Err(PlatformError::not_found("application", &request.app_id));
        }
        if !self.service_instances.contains_key(&request.service_instance_id) {
            return Err(PlatformError::not_found(
                "service instance",
                &request.service_instance_id,
            ));
        }
        let exists = self.bindings.iter().any(|b| {
            b.value.app_id == request.app_id
                && b.value.service_instance_id == request.service_instance_id
        });
        if exists {
            return Err(PlatformError::api(
                codes::BINDING_EXISTS,
                "The app is already bound to the service instance",
            ));
        }

        let binding = ServiceBindingResource {
            id: ServiceBindingId::generate(),
            app_id: request.app_id,
            service_instance_id: request.service_instance_id,
            name: request.binding_name,
        };
        self.bindings.insert(
            binding.id.clone(),
            Sequenced {
                seq: self.next_seq(),
                value: binding.clone(),
            },
        );
        Ok(binding)
    }

    async fn unbind(&self, id: &ServiceBindingId) -> Result<()> {
        self.record(Operation::Unbind)?;

        self.bindings
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found("service binding", id))
    }
}

#[async_trait]
impl PackagesApi for InMemoryPlatform {
    async fn create(&self, app_id: &AppId, source: PackageSource) -> Result<PackageResource> {
        self.record(Operation::CreatePackage)?;

        if !self.applications.contains_key(app_id) {
            return Err(PlatformError::not_found("application", app_id));
        }
        let state = match source {
            PackageSource::Bits => PackageUploadState::AwaitingUpload,
            PackageSource::Docker { .. } => PackageUploadState::Ready,
        };
        let package = PackageResource {
            id: PackageId::generate(),
            app_id: app_id.clone(),
            state,
        };
        self.packages.insert(package.id.clone(), package.clone());
        Ok(package)
    }

    async fn upload_bits(&self, id: &PackageId, request: UploadRequest) -> Result<JobHandle> {
        self.record(Operation::UploadPackage)?;

        let app_id = {
            let mut package = self
                .packages
                .get_mut(id)
                .ok_or_else(|| PlatformError::not_found("package", id))?;
            package.state = PackageUploadState::Ready;
            package.app_id.clone()
        };
        self.remember_files(&request);
        self.uploads.entry(app_id).or_default().push(request);
        Ok(self.new_job(Operation::UploadPackage))
    }

    async fn get(&self, id: &PackageId) -> Result<PackageResource> {
        self.record(Operation::GetPackage)?;

        self.packages
            .get(id)
            .map(|p| p.clone())
            .ok_or_else(|| PlatformError::not_found("package", id))
    }
}

#[async_trait]
impl BuildsApi for InMemoryPlatform {
    async fn create(&self, package_id: &PackageId) -> Result<BuildResource> {
        self.record(Operation::CreateBuild)?;

        if !self.packages.contains_key(package_id) {
            return Err(PlatformError::not_found("package", package_id));
        }
        let build = BuildResource {
            id: BuildId::generate(),
            package_id: package_id.clone(),
            state: BuildState::Staging,
            droplet_id: None,
            error: None,
        };
        self.builds.insert(build.id.clone(), build.clone());
        Ok(build)
    }

    async fn get(&self, id: &BuildId) -> Result<BuildResource> {
        self.record(Operation::GetBuild)?;

        let package_id = self
            .builds
            .get(id)
            .map(|b| b.package_id.clone())
            .ok_or_else(|| PlatformError::not_found("build", id))?;
        let app_name = self
            .packages
            .get(&package_id)
            .map(|p| p.app_id.clone())
            .and_then(|app_id| self.app_name(&app_id).ok());

        let next = match app_name {
            Some(name) => Self::next_scripted(&self.build_scripts, &name),
            None => None,
        };
        let state = match next {
            Some(scripted) => scripted?,
            None => BuildState::Staged,
        };

        let mut build = self
            .builds
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found("build", id))?;
        build.state = state;
        match state {
            BuildState::Staged if build.droplet_id.is_none() => {
                build.droplet_id = Some(DropletId::generate());
            }
            BuildState::Failed => {
                build.error = Some("StagingError - Staging error: staging failed".to_string());
            }
            _ => {}
        }
        Ok(build.clone())
    }
}

#[async_trait]
impl JobsApi for InMemoryPlatform {
    async fn get(&self, job: &JobHandle) -> Result<JobResource> {
        self.record(Operation::GetJob)?;

        self.jobs
            .get(&job.id)
            .map(|j| j.clone())
            .ok_or_else(|| PlatformError::not_found("job", &job.id))
    }
}

#[async_trait]
impl StacksApi for InMemoryPlatform {
    async fn list(&self, name: Option<String>, cursor: Option<Cursor>) -> Result<Page<StackResource>> {
        self.record(Operation::ListStacks)?;

        let stacks = self.sorted(&self.stacks, |s| name.as_ref().map_or(true, |n| &s.name == n));
        Ok(page_of(&stacks, cursor.as_ref(), self.page_size))
    }

    async fn get(&self, id: &StackId) -> Result<StackResource> {
        self.record(Operation::GetStack)?;

        self.stacks
            .get(id)
            .map(|s| s.value.clone())
            .ok_or_else(|| PlatformError::not_found("stack", id))
    }
}

#[async_trait]
impl SpacesApi for InMemoryPlatform {
    async fn get(&self, id: &SpaceId) -> Result<SpaceResource> {
        self.record(Operation::GetSpace)?;

        self.spaces
            .get(id)
            .map(|s| s.clone())
            .ok_or_else(|| PlatformError::not_found("space", id))
    }

    async fn apply_manifest(&self, id: &SpaceId, manifest: String) -> Result<JobHandle> {
        self.record(Operation::ApplyManifest)?;

        if !self.spaces.contains_key(id) {
            return Err(PlatformError::not_found("space", id));
        }
        let document: serde_yaml::Value = serde_yaml::from_str(&manifest).map_err(|e| {
            PlatformError::api(10008, format!("The request is semantically invalid: {}", e))
        })?;

        let names: Vec<String> = document
            .get("applications")
            .and_then(|a| a.as_sequence())
            .map(|apps| {
                apps.iter()
                    .filter_map(|a| a.get("name").and_then(|n| n.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        for name in names {
            if self.find_application(id, &name).is_none() {
                ApplicationsApi::create(
                    self,
                    id,
                    ApplicationSpec {
                        name: Some(name),
                        ..Default::default()
                    },
                )
                .await?;
            }
        }

        Ok(self.new_job(Operation::ApplyManifest))
    }
}

#[async_trait]
impl ResourceMatchApi for InMemoryPlatform {
    async fn match_resources(&self, fingerprints: Vec<FileFingerprint>) -> Result<Vec<FileFingerprint>> {
        self.record(Operation::MatchResources)?;

        Ok(fingerprints
            .into_iter()
            .filter(|f| self.known_resources.contains(&f.sha256))
            .collect())
    }
}
