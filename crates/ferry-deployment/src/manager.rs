//! Deployment Manager - Push pipeline and lifecycle operations
//!
//! The DeploymentManager is the main entry point for deployment operations.
//! A push walks one application through create/update, routes, service
//! binding and artifact upload, then starts it and observes staging and the
//! running instances. Every other lifecycle operation reuses the same
//! observation loops.

use crate::artifact::{self, ArtifactError};
use crate::config::{AppRef, DeploymentConfig, PushOptions, ScaleRequest, Timeouts, WaitOptions};
use crate::context::PushContext;
use crate::error::{AppContext, DeploymentError, Result, WaitPhase};
use crate::polling::{poll_until, PollError, Probe};
use ferry_manifest::write_manifest_v3;
use ferry_platform::{
    paginate, ApplicationResource, ApplicationSpec, BindRequest, DockerCredentials, JobHandle,
    ListApplicationsRequest, ListServiceInstancesRequest, PackageSource, Platform, UploadRequest,
};
use ferry_routing::{RandomWords, RouteResolver, WordListRandomWords};
use ferry_types::{
    AppId, AppState, ApplicationManifest, BuildId, BuildState, Docker, DropletId, InstanceState,
    JobState, ManifestCommon, ManifestV3, ManifestV3Application, ManifestV3Service, PackageState, PushEvent,
    PushEventEnvelope, PushStage, Route, RouteId, RunState, SpaceId, StackId,
};
use futures::future::join_all;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Result of a successful push
#[derive(Debug, Clone, PartialEq)]
pub struct PushOutcome {
    pub app: String,
    pub app_id: AppId,
    /// The application record was created by this push
    pub created: bool,
    /// `Running`, or the last stage reached when the push did not start
    /// the application
    pub stage: PushStage,
    /// Routes the application is mapped to after the push
    pub routes: Vec<RouteId>,
}

/// Deployment Manager orchestrates application pushes
pub struct DeploymentManager {
    /// Remote platform
    platform: Arc<dyn Platform>,
    /// Route provisioning
    routes: RouteResolver,
    /// Observation loop defaults
    config: DeploymentConfig,
    /// Event channel
    event_tx: broadcast::Sender<PushEventEnvelope>,
}

impl DeploymentManager {
    /// Create a manager drawing random hostnames from the built-in word lists
    pub fn new(platform: Arc<dyn Platform>, config: DeploymentConfig) -> Self {
        Self::with_words(platform, Arc::new(WordListRandomWords), config)
    }

    pub fn with_words(
        platform: Arc<dyn Platform>,
        words: Arc<dyn RandomWords>,
        config: DeploymentConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(4096);

        Self {
            routes: RouteResolver::new(platform.clone(), words),
            platform,
            config,
            event_tx,
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// Subscribe to push events
    pub fn subscribe(&self) -> broadcast::Receiver<PushEventEnvelope> {
        self.event_tx.subscribe()
    }

    // ═══════════════════════════════════════════════════════════════════
    // PUSH
    // ═══════════════════════════════════════════════════════════════════

    /// Push one application and, unless told otherwise, start it
    #[instrument(skip(self, manifest, options), fields(app = %manifest.name()))]
    pub async fn push(
        &self,
        space_id: &SpaceId,
        manifest: &ApplicationManifest,
        options: &PushOptions,
    ) -> Result<PushOutcome> {
        let ctx = self.context(manifest.name(), options.cancel.clone());
        track(&ctx, self.run_push(&ctx, space_id, manifest, options)).await
    }

    /// Push several applications concurrently.
    ///
    /// Results are in manifest order; one failure does not stop the others.
    pub async fn push_all(
        &self,
        space_id: &SpaceId,
        manifests: &[ApplicationManifest],
        options: &PushOptions,
    ) -> Vec<Result<PushOutcome>> {
        join_all(
            manifests
                .iter()
                .map(|manifest| self.push(space_id, manifest, options)),
        )
        .await
    }

    async fn run_push(
        &self,
        ctx: &PushContext,
        space_id: &SpaceId,
        manifest: &ApplicationManifest,
        options: &PushOptions,
    ) -> Result<PushOutcome> {
        let app = ctx.app();
        let common = &manifest.common;
        ctx.enter(PushStage::Resolving);

        // 1. Validate and resolve the stack and routes before any mutation
        manifest
            .validate()
            .map_err(|e| DeploymentError::invalid_manifest(app, e))?;
        let stack_id = match &common.stack {
            Some(stack) => Some(self.find_stack(app, stack).await?),
            None => None,
        };
        let existing = self.find_application(space_id, app).await?;
        let pending = self
            .routes
            .plan(existing.as_ref().map(|a| &a.id), space_id, common)
            .await
            .app_context(app)?;

        // 2. Create or update the application record
        let created = existing.is_none();
        let spec = application_spec(common, stack_id, existing.as_ref());
        let resource = match existing {
            Some(current) => {
                let updated = self
                    .platform
                    .applications()
                    .update(&current.id, spec)
                    .await
                    .app_context(app)?;
                ctx.set_app_id(updated.id.clone());
                ctx.emit(PushEvent::ApplicationUpdated {
                    app_id: updated.id.clone(),
                });
                updated
            }
            None => {
                let new = self
                    .platform
                    .applications()
                    .create(space_id, spec)
                    .await
                    .app_context(app)?;
                ctx.set_app_id(new.id.clone());
                ctx.emit(PushEvent::ApplicationCreated {
                    app_id: new.id.clone(),
                });
                new
            }
        };
        info!(app_id = %resource.id, created, "Application record ready");
        ctx.checkpoint()?;

        // 3. Routes
        let plan = self
            .routes
            .apply(&resource.id, space_id, pending)
            .await
            .app_context(app)?;
        for route in &plan.associated {
            ctx.emit(PushEvent::RouteMapped {
                app_id: resource.id.clone(),
                route: route.id.to_string(),
            });
        }
        ctx.enter(PushStage::RoutesPrepared);
        ctx.checkpoint()?;

        // 4. Bind services while the artifact uploads
        let services: Vec<ManifestV3Service> = manifest
            .services
            .iter()
            .map(ManifestV3Service::named)
            .collect();
        tokio::try_join!(
            self.bind_services(ctx, &resource.id, space_id, &services),
            self.upload_application(ctx, &resource.id, common),
        )?;
        ctx.enter(PushStage::ServicesBound);
        ctx.enter(PushStage::ArtifactUploaded);
        ctx.checkpoint()?;

        // 5. Stop so the new bits are staged on start
        if resource.state != AppState::Stopped {
            self.request_state(app, &resource.id, AppState::Stopped).await?;
        }

        let mut outcome = PushOutcome {
            app: app.to_string(),
            app_id: resource.id.clone(),
            created,
            stage: PushStage::ArtifactUploaded,
            routes: self.mapped_routes(app, &resource.id).await?,
        };

        let instances = common.instances.unwrap_or(resource.instances);
        if options.no_start || instances == 0 {
            info!(no_start = options.no_start, instances, "Leaving application stopped");
            return Ok(outcome);
        }

        // 6. Start and observe
        let timeouts = self.timeouts(options.timeouts);
        self.start_and_wait(ctx, &resource.id, &timeouts).await?;
        outcome.stage = PushStage::Running;

        info!(app_id = %resource.id, "Push complete");
        Ok(outcome)
    }

    /// Apply a v3 manifest to the space, then build and restart every
    /// application that carries an artifact or image.
    ///
    /// Applying the manifest is all-or-nothing; the per-application
    /// pipelines that follow run concurrently and report individually.
    #[instrument(skip(self, manifest, options), fields(space_id = %space_id))]
    pub async fn push_manifest_v3(
        &self,
        space_id: &SpaceId,
        manifest: &ManifestV3,
        options: &PushOptions,
    ) -> Result<Vec<Result<PushOutcome>>> {
        let label = manifest
            .applications
            .first()
            .map(|a| a.name().to_string())
            .unwrap_or_else(|| "manifest".to_string());

        // 1. Validate and render
        manifest
            .validate()
            .map_err(|e| DeploymentError::invalid_manifest(&label, e))?;
        let mut rendered = Vec::new();
        write_manifest_v3(&mut rendered, manifest).app_context(&label)?;
        let document =
            String::from_utf8(rendered).map_err(|e| DeploymentError::invalid_manifest(&label, e))?;

        // 2. Apply to the space and wait for the job
        let ctx = self.context(&label, options.cancel.clone());
        track(&ctx, async {
            let job = self
                .platform
                .spaces()
                .apply_manifest(space_id, document)
                .await
                .app_context(&label)?;
            self.wait_for_job(&ctx, &job).await
        })
        .await?;
        info!(applications = manifest.applications.len(), "Manifest applied");

        // 3. Build and restart each application
        let pushes = manifest
            .applications
            .iter()
            .filter(|a| a.common.path.is_some() || a.common.docker_image().is_some())
            .map(|application| async move {
                let ctx = self.context(application.name(), options.cancel.clone());
                track(&ctx, self.run_v3_push(&ctx, space_id, application, options)).await
            });

        Ok(join_all(pushes).await)
    }

    async fn run_v3_push(
        &self,
        ctx: &PushContext,
        space_id: &SpaceId,
        application: &ManifestV3Application,
        options: &PushOptions,
    ) -> Result<PushOutcome> {
        let app = ctx.app();
        let common = &application.common;
        ctx.enter(PushStage::Resolving);

        let resource = self
            .find_application(space_id, app)
            .await?
            .ok_or_else(|| DeploymentError::ApplicationNotFound {
                app: app.to_string(),
            })?;
        ctx.set_app_id(resource.id.clone());

        // 1. Package the artifact or image
        let source = match common.docker_image() {
            Some(image) => PackageSource::Docker {
                image: image.to_string(),
                credentials: docker_credentials(common),
            },
            None => PackageSource::Bits,
        };
        let package = self
            .platform
            .packages()
            .create(&resource.id, source)
            .await
            .app_context(app)?;
        if let Some(path) = common.path.as_deref() {
            let request = self.diff_artifact(app, path).await?;
            let job = self
                .platform
                .packages()
                .upload_bits(&package.id, request)
                .await
                .app_context(app)?;
            self.wait_for_job(ctx, &job).await?;
        }
        ctx.enter(PushStage::ArtifactUploaded);
        ctx.checkpoint()?;

        // 2. Build and stage
        let timeouts = self.timeouts(options.timeouts);
        let build = self
            .platform
            .builds()
            .create(&package.id)
            .await
            .app_context(app)?;
        ctx.enter(PushStage::Staging);
        let droplet = self.wait_for_build(ctx, &build.id, timeouts.staging).await?;
        ctx.enter(PushStage::Staged);
        self.platform
            .applications()
            .set_current_droplet(&resource.id, &droplet)
            .await
            .app_context(app)?;

        let mut outcome = PushOutcome {
            app: app.to_string(),
            app_id: resource.id.clone(),
            created: false,
            stage: PushStage::Staged,
            routes: self.mapped_routes(app, &resource.id).await?,
        };

        // 3. Restart on the new droplet
        if resource.state != AppState::Stopped {
            self.request_state(app, &resource.id, AppState::Stopped).await?;
        }
        if options.no_start {
            return Ok(outcome);
        }
        self.request_state(app, &resource.id, AppState::Started).await?;
        ctx.enter(PushStage::Starting);
        self.wait_for_running(ctx, &resource.id, timeouts.startup).await?;
        ctx.enter(PushStage::Running);

        outcome.stage = PushStage::Running;
        Ok(outcome)
    }

    // ═══════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════

    /// Start a stopped application and wait until an instance runs
    #[instrument(skip(self, options), fields(app = %app.name))]
    pub async fn start(&self, app: &AppRef, options: &WaitOptions) -> Result<()> {
        let ctx = self.context(&app.name, options.cancel.clone());
        track(&ctx, async {
            let resource = self.get_application(app).await?;
            ctx.set_app_id(resource.id.clone());
            if resource.state == AppState::Started {
                info!("Application already started");
                return Ok(());
            }
            self.start_and_wait(&ctx, &resource.id, &self.timeouts(options.timeouts))
                .await
        })
        .await
    }

    #[instrument(skip(self), fields(app = %app.name))]
    pub async fn stop(&self, app: &AppRef) -> Result<()> {
        let resource = self.get_application(app).await?;
        if resource.state == AppState::Stopped {
            info!("Application already stopped");
            return Ok(());
        }
        self.request_state(&app.name, &resource.id, AppState::Stopped)
            .await
    }

    /// Stop the application unless already stopped, then start it
    #[instrument(skip(self, options), fields(app = %app.name))]
    pub async fn restart(&self, app: &AppRef, options: &WaitOptions) -> Result<()> {
        let ctx = self.context(&app.name, options.cancel.clone());
        track(&ctx, async {
            let resource = self.get_application(app).await?;
            ctx.set_app_id(resource.id.clone());
            self.restart_resource(&ctx, &resource, options).await
        })
        .await
    }

    /// Stage the current bits again and wait for the result
    #[instrument(skip(self, options), fields(app = %app.name))]
    pub async fn restage(&self, app: &AppRef, options: &WaitOptions) -> Result<()> {
        let ctx = self.context(&app.name, options.cancel.clone());
        track(&ctx, async {
            let resource = self.get_application(app).await?;
            ctx.set_app_id(resource.id.clone());
            let timeouts = self.timeouts(options.timeouts);

            let restaged = self
                .platform
                .applications()
                .restage(&resource.id)
                .await
                .app_context(&app.name)?;
            ctx.enter(PushStage::Staging);
            self.wait_for_staging(&ctx, &resource.id, timeouts.staging)
                .await?;
            ctx.enter(PushStage::Staged);

            if restaged.state == AppState::Started {
                ctx.enter(PushStage::Starting);
                self.wait_for_running(&ctx, &resource.id, timeouts.startup)
                    .await?;
                ctx.enter(PushStage::Running);
            }
            Ok(())
        })
        .await
    }

    /// Change instances, memory or disk.
    ///
    /// Memory and disk only apply to new instances, so a started
    /// application is restarted when either changes; an instance count
    /// change alone takes effect without a restart.
    #[instrument(skip(self, options), fields(app = %app.name))]
    pub async fn scale(
        &self,
        app: &AppRef,
        request: ScaleRequest,
        options: &WaitOptions,
    ) -> Result<()> {
        if request.is_empty() {
            debug!("Nothing to scale");
            return Ok(());
        }

        let ctx = self.context(&app.name, options.cancel.clone());
        track(&ctx, async {
            let resource = self.get_application(app).await?;
            ctx.set_app_id(resource.id.clone());

            let scaled = self
                .platform
                .applications()
                .update(
                    &resource.id,
                    ApplicationSpec {
                        instances: request.instances,
                        memory: request.memory,
                        disk_quota: request.disk,
                        ..Default::default()
                    },
                )
                .await
                .app_context(&app.name)?;
            info!(
                instances = scaled.instances,
                memory = scaled.memory,
                disk = scaled.disk_quota,
                "Application scaled"
            );

            if request.requires_restart() && scaled.state == AppState::Started {
                self.restart_resource(&ctx, &scaled, options).await?;
            }
            Ok(())
        })
        .await
    }

    /// Delete the application, unbinding its services first and
    /// optionally deleting every route mapped to it
    #[instrument(skip(self), fields(app = %app.name))]
    pub async fn delete(&self, app: &AppRef, delete_routes: bool) -> Result<()> {
        let ctx = self.context(&app.name, CancellationToken::new());
        let name = app.name.as_str();
        track(&ctx, async {
            let resource = self.get_application(app).await?;
            ctx.set_app_id(resource.id.clone());
            let apps = self.platform.applications();

            // 1. Routes
            if delete_routes {
                let routes = paginate(|cursor| apps.list_routes(&resource.id, cursor))
                    .await
                    .app_context(name)?;
                for route in &routes {
                    let job = self
                        .platform
                        .routes()
                        .delete(&route.id)
                        .await
                        .app_context(name)?;
                    self.wait_for_job(&ctx, &job).await?;
                    debug!(route_id = %route.id, "Route deleted");
                }
            }

            // 2. Service bindings
            let bindings = paginate(|cursor| apps.list_service_bindings(&resource.id, cursor))
                .await
                .app_context(name)?;
            for binding in &bindings {
                self.platform
                    .service_instances()
                    .unbind(&binding.id)
                    .await
                    .app_context(name)?;
            }

            // 3. The application itself
            apps.delete(&resource.id).await.app_context(name)?;
            info!(app_id = %resource.id, delete_routes, "Application deleted");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(app = %app.name))]
    pub async fn rename(&self, app: &AppRef, new_name: &str) -> Result<()> {
        let resource = self.get_application(app).await?;
        self.platform
            .applications()
            .update(
                &resource.id,
                ApplicationSpec {
                    name: Some(new_name.to_string()),
                    ..Default::default()
                },
            )
            .await
            .app_context(&app.name)?;
        info!(new_name, "Application renamed");
        Ok(())
    }

    #[instrument(skip(self, value), fields(app = %app.name))]
    pub async fn set_environment_variable(
        &self,
        app: &AppRef,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let resource = self.get_application(app).await?;
        let mut environment = resource.environment;
        environment.insert(key.to_string(), Some(value.to_string()));
        self.update_environment(&app.name, &resource.id, environment)
            .await
    }

    #[instrument(skip(self), fields(app = %app.name))]
    pub async fn unset_environment_variable(&self, app: &AppRef, key: &str) -> Result<()> {
        let resource = self.get_application(app).await?;
        let mut environment = resource.environment;
        if environment.remove(key).is_none() {
            debug!(key, "Variable was not set");
        }
        self.update_environment(&app.name, &resource.id, environment)
            .await
    }

    /// Rebuild a manifest from the remote application record
    #[instrument(skip(self), fields(app = %app.name))]
    pub async fn get_manifest(&self, app: &AppRef) -> Result<ApplicationManifest> {
        let name = app.name.as_str();
        let resource = self.get_application(app).await?;

        let stack = match &resource.stack_id {
            Some(stack_id) => Some(
                self.platform
                    .stacks()
                    .get(stack_id)
                    .await
                    .app_context(name)?
                    .name,
            ),
            None => None,
        };
        let routes = self
            .routes
            .route_urls(&resource.id)
            .await
            .app_context(name)?;

        let bindings = paginate(|cursor| {
            self.platform
                .applications()
                .list_service_bindings(&resource.id, cursor)
        })
        .await
        .app_context(name)?;
        let mut services = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let instance = self
                .platform
                .service_instances()
                .get(&binding.service_instance_id)
                .await
                .app_context(name)?;
            services.push(instance.name);
        }

        let common = ManifestCommon {
            name: resource.name,
            buildpacks: resource.buildpacks,
            command: resource.command,
            disk: Some(resource.disk_quota),
            docker: resource.docker_image.map(|image| Docker {
                image: Some(image),
                ..Default::default()
            }),
            environment_variables: resource.environment,
            health_check_http_endpoint: resource.health_check_http_endpoint,
            health_check_type: resource.health_check_type,
            instances: Some(resource.instances),
            memory: Some(resource.memory),
            no_route: routes.is_empty().then_some(true),
            routes: routes.into_iter().map(Route::new).collect(),
            stack,
            timeout: resource.health_check_timeout,
            ..Default::default()
        };

        Ok(ApplicationManifest { common, services })
    }

    // ═══════════════════════════════════════════════════════════════════
    // PIPELINE STEPS
    // ═══════════════════════════════════════════════════════════════════

    async fn restart_resource(
        &self,
        ctx: &PushContext,
        resource: &ApplicationResource,
        options: &WaitOptions,
    ) -> Result<()> {
        if resource.state != AppState::Stopped {
            self.request_state(ctx.app(), &resource.id, AppState::Stopped)
                .await?;
        }
        self.start_and_wait(ctx, &resource.id, &self.timeouts(options.timeouts))
            .await
    }

    async fn start_and_wait(&self, ctx: &PushContext, app_id: &AppId, timeouts: &Timeouts) -> Result<()> {
        self.request_state(ctx.app(), app_id, AppState::Started)
            .await?;

        ctx.enter(PushStage::Staging);
        self.wait_for_staging(ctx, app_id, timeouts.staging).await?;
        ctx.enter(PushStage::Staged);

        ctx.enter(PushStage::Starting);
        self.wait_for_running(ctx, app_id, timeouts.startup).await?;
        ctx.enter(PushStage::Running);
        Ok(())
    }

    async fn request_state(&self, app: &str, app_id: &AppId, state: AppState) -> Result<()> {
        self.platform
            .applications()
            .update(app_id, ApplicationSpec::state(state))
            .await
            .app_context(app)?;
        debug!(%state, "Requested application state");
        Ok(())
    }

    async fn bind_services(
        &self,
        ctx: &PushContext,
        app_id: &AppId,
        space_id: &SpaceId,
        services: &[ManifestV3Service],
    ) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }
        let app = ctx.app();

        let bound = paginate(|cursor| {
            self.platform
                .applications()
                .list_service_bindings(app_id, cursor)
        })
        .await
        .app_context(app)?;

        for service in services {
            let instance = paginate(|cursor| {
                self.platform
                    .service_instances()
                    .list(ListServiceInstancesRequest {
                        space_id: Some(space_id.clone()),
                        name: Some(service.name.clone()),
                        cursor,
                    })
            })
            .await
            .app_context(app)?
            .into_iter()
            .next()
            .ok_or_else(|| DeploymentError::NotFound {
                app: app.to_string(),
                kind: "service instance",
                name: service.name.clone(),
            })?;

            if bound.iter().any(|b| b.service_instance_id == instance.id) {
                debug!(service = %service.name, "Service already bound");
                continue;
            }

            self.platform
                .service_instances()
                .bind(BindRequest {
                    app_id: app_id.clone(),
                    service_instance_id: instance.id,
                    binding_name: service.binding_name.clone(),
                    parameters: service.parameters.clone(),
                })
                .await
                .app_context(app)?;
            info!(service = %service.name, "Service bound");
            ctx.emit(PushEvent::ServiceBound {
                app_id: app_id.clone(),
                service: service.name.clone(),
            });
        }
        Ok(())
    }

    async fn upload_application(
        &self,
        ctx: &PushContext,
        app_id: &AppId,
        common: &ManifestCommon,
    ) -> Result<()> {
        let Some(path) = common.path.as_deref() else {
            debug!("No artifact to upload");
            return Ok(());
        };
        let app = ctx.app();

        let request = self.diff_artifact(app, path).await?;
        let job = self
            .platform
            .applications()
            .upload(app_id, request)
            .await
            .app_context(app)?;
        self.wait_for_job(ctx, &job).await
    }

    /// Fingerprint the artifact and leave out what the platform already has
    async fn diff_artifact(&self, app: &str, path: &Path) -> Result<UploadRequest> {
        let artifact_error = |source: ArtifactError| DeploymentError::Artifact {
            app: app.to_string(),
            source,
        };

        let owned = path.to_path_buf();
        let fingerprints = tokio::task::spawn_blocking(move || artifact::fingerprint_artifact(&owned))
            .await
            .map_err(|e| {
                artifact_error(ArtifactError::ReadFile {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            })?
            .map_err(artifact_error)?;

        let known = if fingerprints.is_empty() {
            Vec::new()
        } else {
            self.platform
                .resource_match()
                .match_resources(fingerprints.clone())
                .await
                .app_context(app)?
        };

        let request = artifact::upload_request(path, fingerprints, &known);
        info!(
            matched = request.matched.len(),
            sending = request.files.len(),
            "Artifact compared with platform resources"
        );
        Ok(request)
    }

    // ═══════════════════════════════════════════════════════════════════
    // OBSERVATION
    // ═══════════════════════════════════════════════════════════════════

    async fn wait_for_staging(&self, ctx: &PushContext, app_id: &AppId, timeout: Duration) -> Result<()> {
        let apps = self.platform.applications();
        let state = poll_until(self.config.backoff(), timeout, ctx.cancel_token(), || async move {
            let resource = apps.get(app_id).await?;
            debug!(package_state = ?resource.package_state, "Polled staging");
            Ok(if resource.package_state.is_terminal() {
                Probe::Ready(resource.package_state)
            } else {
                Probe::Pending
            })
        })
        .await
        .map_err(|e| poll_failure(ctx, WaitPhase::Staging, e))?;

        match state {
            PackageState::Failed => Err(DeploymentError::StagingFailed {
                app: ctx.app().to_string(),
                reason: format!("application {} reported package state FAILED", app_id),
            }),
            _ => Ok(()),
        }
    }

    async fn wait_for_build(&self, ctx: &PushContext, build_id: &BuildId, timeout: Duration) -> Result<DropletId> {
        let builds = self.platform.builds();
        let build = poll_until(self.config.backoff(), timeout, ctx.cancel_token(), || async move {
            let build = builds.get(build_id).await?;
            debug!(build_state = ?build.state, "Polled build");
            Ok(if build.state.is_terminal() {
                Probe::Ready(build)
            } else {
                Probe::Pending
            })
        })
        .await
        .map_err(|e| poll_failure(ctx, WaitPhase::Staging, e))?;

        let app = ctx.app().to_string();
        match (build.state, build.droplet_id) {
            (BuildState::Staged, Some(droplet)) => Ok(droplet),
            (BuildState::Staged, None) => Err(DeploymentError::StagingFailed {
                app,
                reason: format!("build {} staged without a droplet", build.id),
            }),
            _ => Err(DeploymentError::StagingFailed {
                app,
                reason: build
                    .error
                    .unwrap_or_else(|| format!("build {} failed", build.id)),
            }),
        }
    }

    async fn wait_for_running(&self, ctx: &PushContext, app_id: &AppId, timeout: Duration) -> Result<()> {
        let apps = self.platform.applications();
        let (state, instances) =
            poll_until(self.config.backoff(), timeout, ctx.cancel_token(), || async move {
                let states: Vec<InstanceState> = apps
                    .instances(app_id)
                    .await?
                    .into_iter()
                    .map(|i| i.state)
                    .collect();
                ctx.emit(PushEvent::InstancesObserved {
                    app_id: app_id.clone(),
                    states: states.clone(),
                });

                Ok(match RunState::aggregate(states.iter().copied()) {
                    RunState::Pending => Probe::Pending,
                    state => Probe::Ready((state, states)),
                })
            })
            .await
            .map_err(|e| poll_failure(ctx, WaitPhase::Start, e))?;

        match state {
            RunState::Running => {
                info!(instances = instances.len(), "Application running");
                Ok(())
            }
            _ => Err(DeploymentError::RunFailed {
                app: ctx.app().to_string(),
                reason: format!(
                    "application {} instances reported {}",
                    app_id,
                    instances
                        .iter()
                        .map(|s| s.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }),
        }
    }

    async fn wait_for_job(&self, ctx: &PushContext, job: &JobHandle) -> Result<()> {
        let jobs = self.platform.jobs();
        let resource = poll_until(
            self.config.backoff(),
            self.config.job_timeout(),
            ctx.cancel_token(),
            || async move {
                let resource = jobs.get(job).await?;
                Ok(if resource.state.is_terminal() {
                    Probe::Ready(resource)
                } else {
                    Probe::Pending
                })
            },
        )
        .await
        .map_err(|e| poll_failure(ctx, WaitPhase::Job, e))?;

        if resource.state == JobState::Failed {
            return Err(DeploymentError::JobFailed {
                app: ctx.app().to_string(),
                job: resource.id,
                errors: resource.errors,
            });
        }
        debug!(job_id = %resource.id, "Job complete");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // LOOKUPS
    // ═══════════════════════════════════════════════════════════════════

    async fn find_application(&self, space_id: &SpaceId, name: &str) -> Result<Option<ApplicationResource>> {
        let apps = paginate(|cursor| {
            self.platform.applications().list(ListApplicationsRequest {
                space_id: Some(space_id.clone()),
                name: Some(name.to_string()),
                cursor,
            })
        })
        .await
        .app_context(name)?;
        Ok(apps.into_iter().next())
    }

    async fn mapped_routes(&self, app: &str, app_id: &AppId) -> Result<Vec<RouteId>> {
        let apps = self.platform.applications();
        let routes = paginate(|cursor| apps.list_routes(app_id, cursor))
            .await
            .app_context(app)?;
        Ok(routes.into_iter().map(|r| r.id).collect())
    }

    async fn get_application(&self, app: &AppRef) -> Result<ApplicationResource> {
        self.find_application(&app.space_id, &app.name)
            .await?
            .ok_or_else(|| DeploymentError::ApplicationNotFound {
                app: app.name.clone(),
            })
    }

    async fn find_stack(&self, app: &str, stack: &str) -> Result<StackId> {
        paginate(|cursor| self.platform.stacks().list(Some(stack.to_string()), cursor))
            .await
            .app_context(app)?
            .into_iter()
            .next()
            .map(|s| s.id)
            .ok_or_else(|| DeploymentError::NotFound {
                app: app.to_string(),
                kind: "stack",
                name: stack.to_string(),
            })
    }

    async fn update_environment(
        &self,
        app: &str,
        app_id: &AppId,
        environment: std::collections::BTreeMap<String, Option<String>>,
    ) -> Result<()> {
        self.platform
            .applications()
            .update(
                app_id,
                ApplicationSpec {
                    environment: Some(environment),
                    ..Default::default()
                },
            )
            .await
            .app_context(app)?;
        Ok(())
    }

    fn timeouts(&self, overrides: Option<Timeouts>) -> Timeouts {
        overrides.unwrap_or_else(|| self.config.timeouts())
    }

    fn context(&self, app: &str, cancel: CancellationToken) -> PushContext {
        PushContext::new(app, cancel, self.event_tx.clone())
    }
}

/// Run `operation`, publishing its failure on the context
async fn track<T>(ctx: &PushContext, operation: impl Future<Output = Result<T>>) -> Result<T> {
    let result = operation.await;
    if let Err(error) = &result {
        ctx.record_failure(error);
    }
    result
}

fn poll_failure(ctx: &PushContext, phase: WaitPhase, error: PollError) -> DeploymentError {
    match error {
        PollError::TimedOut => DeploymentError::TimedOut {
            app: ctx.app().to_string(),
            phase,
        },
        PollError::Cancelled => ctx.cancelled(),
        PollError::Platform(source) => DeploymentError::remote(ctx.app(), source),
    }
}

fn docker_credentials(common: &ManifestCommon) -> Option<DockerCredentials> {
    let docker = common.docker.as_ref()?;
    match (&docker.username, &docker.password) {
        (Some(username), Some(password)) => Some(DockerCredentials {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    }
}

/// Fields to send on create or update.
///
/// On update the manifest's environment is laid over the existing one, so
/// variables set outside the manifest survive a push.
fn application_spec(
    common: &ManifestCommon,
    stack_id: Option<StackId>,
    existing: Option<&ApplicationResource>,
) -> ApplicationSpec {
    let environment = match existing {
        Some(current) => {
            let mut environment = current.environment.clone();
            environment.extend(common.environment_variables.clone());
            Some(environment)
        }
        None if common.environment_variables.is_empty() => None,
        None => Some(common.environment_variables.clone()),
    };

    ApplicationSpec {
        name: Some(common.name.clone()),
        buildpacks: Some(common.buildpacks.clone()).filter(|b| !b.is_empty()),
        command: common.command.clone(),
        disk_quota: common.disk,
        docker_image: common.docker_image().map(String::from),
        docker_credentials: docker_credentials(common),
        environment,
        health_check_type: common.health_check_type,
        health_check_http_endpoint: common.health_check_http_endpoint.clone(),
        health_check_timeout: common.timeout,
        instances: common.instances,
        memory: common.memory,
        stack_id,
        state: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_platform::{InMemoryPlatform, Operation, PlatformError};
    use ferry_routing::FixedWords;
    use ferry_types::DomainSummary;

    fn setup() -> (Arc<InMemoryPlatform>, DeploymentManager, SpaceId) {
        let platform = Arc::new(InMemoryPlatform::new());
        let space = platform.add_space("org-1");
        platform.add_shared_domain("apps.example.com");
        let manager = DeploymentManager::with_words(
            platform.clone(),
            Arc::new(FixedWords::new("brave", "otter")),
            DeploymentConfig::default(),
        );
        (platform, manager, space)
    }

    fn manifest(name: &str) -> ApplicationManifest {
        ApplicationManifest::new(ManifestCommon {
            instances: Some(1),
            memory: Some(64),
            ..ManifestCommon::named(name)
        })
    }

    #[test]
    fn test_update_merges_environment() {
        let mut common = ManifestCommon::named("web");
        common
            .environment_variables
            .insert("MODE".into(), Some("prod".into()));
        common
            .environment_variables
            .insert("LOG".into(), Some("debug".into()));

        let mut existing_env = std::collections::BTreeMap::new();
        existing_env.insert("LOG".to_string(), Some("info".to_string()));
        existing_env.insert("KEEP".to_string(), Some("yes".to_string()));
        let existing = ApplicationResource {
            id: AppId::new("app-1"),
            name: "web".into(),
            space_id: SpaceId::new("space-1"),
            state: AppState::Started,
            package_state: PackageState::Staged,
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
            environment: existing_env,
            droplet_id: None,
        };

        let spec = application_spec(&common, None, Some(&existing));
        let env = spec.environment.unwrap();
        assert_eq!(env["LOG"], Some("debug".to_string()));
        assert_eq!(env["KEEP"], Some("yes".to_string()));
        assert_eq!(env["MODE"], Some("prod".to_string()));
    }

    #[test]
    fn test_create_without_environment_leaves_it_unset() {
        let spec = application_spec(&ManifestCommon::named("web"), None, None);
        assert!(spec.environment.is_none());
        assert!(spec.buildpacks.is_none());
        assert_eq!(spec.name.as_deref(), Some("web"));
    }

    #[tokio::test]
    async fn test_push_creates_then_updates() {
        let (platform, manager, space) = setup();

        let first = manager
            .push(&space, &manifest("web"), &PushOptions::default())
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.stage, PushStage::Running);

        let second = manager
            .push(&space, &manifest("web"), &PushOptions::default())
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.app_id, first.app_id);
        assert_eq!(second.routes, first.routes);
        assert_eq!(platform.call_count(Operation::CreateApplication), 1);
        assert_eq!(platform.call_count(Operation::CreateRoute), 1);
    }

    #[tokio::test]
    async fn test_unknown_stack_aborts_before_mutation() {
        let (platform, manager, space) = setup();
        let mut manifest = manifest("web");
        manifest.common.stack = Some("cflinuxfs9".into());

        let err = manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeploymentError::NotFound { kind: "stack", .. }));
        assert_eq!(platform.call_count(Operation::CreateApplication), 0);
    }

    #[tokio::test]
    async fn test_no_start_leaves_application_stopped() {
        let (platform, manager, space) = setup();

        let outcome = manager
            .push(&space, &manifest("web"), &PushOptions::no_start())
            .await
            .unwrap();

        assert_eq!(outcome.stage, PushStage::ArtifactUploaded);
        let app = platform.find_application(&space, "web").unwrap();
        assert_eq!(app.state, AppState::Stopped);
    }

    #[tokio::test]
    async fn test_zero_instances_skips_start() {
        let (platform, manager, space) = setup();
        let mut manifest = manifest("web");
        manifest.common.instances = Some(0);

        let outcome = manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.stage, PushStage::ArtifactUploaded);
        assert_eq!(platform.call_count(Operation::Instances), 0);
    }

    #[tokio::test]
    async fn test_create_failure_is_not_retried() {
        let (platform, manager, space) = setup();
        platform.fail_next(
            Operation::CreateApplication,
            PlatformError::api(10008, "The request is semantically invalid"),
        );

        let err = manager
            .push(&space, &manifest("web"), &PushOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeploymentError::RemoteOperationFailed { .. }));
        assert_eq!(platform.call_count(Operation::CreateApplication), 1);
        assert_eq!(platform.call_count(Operation::CreateRoute), 0);
    }

    #[tokio::test]
    async fn test_missing_service_instance() {
        let (_platform, manager, space) = setup();
        let mut manifest = manifest("web");
        manifest.services = vec!["db".into()];

        let err = manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::NotFound {
                kind: "service instance",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_services_bound_once() {
        let (platform, manager, space) = setup();
        platform.add_service_instance(&space, "db");
        let mut manifest = manifest("web");
        manifest.services = vec!["db".into()];

        let outcome = manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap();
        manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap();

        assert_eq!(platform.application_bindings(&outcome.app_id).len(), 1);
        assert_eq!(platform.call_count(Operation::Bind), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_job() {
        let (platform, manager, space) = setup();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "hello").unwrap();
        platform.fail_next_job(Operation::Upload, vec!["disk full".into()]);

        let mut manifest = manifest("web");
        manifest.common.path = Some(dir.path().to_path_buf());

        let err = manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::JobFailed { ref errors, .. } if errors == &vec!["disk full".to_string()]));
    }

    #[tokio::test]
    async fn test_scale_instances_only_does_not_restart() {
        let (platform, manager, space) = setup();
        manager
            .push(&space, &manifest("web"), &PushOptions::default())
            .await
            .unwrap();
        let updates = platform.call_count(Operation::UpdateApplication);

        let app = AppRef::new(space.clone(), "web");
        manager
            .scale(
                &app,
                ScaleRequest {
                    instances: Some(3),
                    ..Default::default()
                },
                &WaitOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(platform.call_count(Operation::UpdateApplication), updates + 1);
        let resource = platform.find_application(&space, "web").unwrap();
        assert_eq!(resource.instances, 3);
        assert_eq!(resource.state, AppState::Started);
    }

    #[tokio::test]
    async fn test_scale_memory_restarts_started_application() {
        let (platform, manager, space) = setup();
        manager
            .push(&space, &manifest("web"), &PushOptions::default())
            .await
            .unwrap();
        let updates = platform.call_count(Operation::UpdateApplication);

        let app = AppRef::new(space.clone(), "web");
        manager
            .scale(
                &app,
                ScaleRequest {
                    memory: Some(512),
                    ..Default::default()
                },
                &WaitOptions::default(),
            )
            .await
            .unwrap();

        // scale, stop, start
        assert_eq!(platform.call_count(Operation::UpdateApplication), updates + 3);
        let resource = platform.find_application(&space, "web").unwrap();
        assert_eq!(resource.memory, 512);
        assert_eq!(platform.running_instances(&resource.id), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_noops_in_target_state() {
        let (platform, manager, space) = setup();
        manager
            .push(&space, &manifest("web"), &PushOptions::default())
            .await
            .unwrap();
        let app = AppRef::new(space.clone(), "web");
        let updates = platform.call_count(Operation::UpdateApplication);

        manager.start(&app, &WaitOptions::default()).await.unwrap();
        assert_eq!(platform.call_count(Operation::UpdateApplication), updates);

        manager.stop(&app).await.unwrap();
        manager.stop(&app).await.unwrap();
        assert_eq!(platform.call_count(Operation::UpdateApplication), updates + 1);
        assert_eq!(
            platform.find_application(&space, "web").unwrap().state,
            AppState::Stopped
        );
    }

    #[tokio::test]
    async fn test_lifecycle_on_missing_application() {
        let (_platform, manager, space) = setup();
        let app = AppRef::new(space, "ghost");

        let err = manager
            .restart(&app, &WaitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::ApplicationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_environment_variables() {
        let (platform, manager, space) = setup();
        manager
            .push(&space, &manifest("web"), &PushOptions::default())
            .await
            .unwrap();
        let app = AppRef::new(space.clone(), "web");

        manager
            .set_environment_variable(&app, "MODE", "prod")
            .await
            .unwrap();
        manager
            .set_environment_variable(&app, "LOG", "info")
            .await
            .unwrap();
        manager.unset_environment_variable(&app, "LOG").await.unwrap();

        let env = platform.find_application(&space, "web").unwrap().environment;
        assert_eq!(env.len(), 1);
        assert_eq!(env["MODE"], Some("prod".to_string()));
    }

    #[tokio::test]
    async fn test_rename() {
        let (platform, manager, space) = setup();
        manager
            .push(&space, &manifest("web"), &PushOptions::default())
            .await
            .unwrap();

        manager
            .rename(&AppRef::new(space.clone(), "web"), "portal")
            .await
            .unwrap();
        assert!(platform.find_application(&space, "web").is_none());
        assert!(platform.find_application(&space, "portal").is_some());
    }

    #[tokio::test]
    async fn test_delete_with_routes_and_bindings() {
        let (platform, manager, space) = setup();
        platform.add_service_instance(&space, "db");
        let mut manifest = manifest("web");
        manifest.services = vec!["db".into()];
        let outcome = manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap();

        manager
            .delete(&AppRef::new(space.clone(), "web"), true)
            .await
            .unwrap();

        assert!(platform.find_application(&space, "web").is_none());
        assert!(platform.application_bindings(&outcome.app_id).is_empty());
        assert_eq!(platform.call_count(Operation::DeleteRoute), 1);
        assert_eq!(platform.call_count(Operation::Unbind), 1);
    }

    #[tokio::test]
    async fn test_get_manifest_round_trips_push() {
        let (platform, manager, space) = setup();
        platform.add_service_instance(&space, "db");
        let stack = platform.add_stack("cflinuxfs4");
        let mut manifest = manifest("web");
        manifest.services = vec!["db".into()];
        manifest.common.stack = Some("cflinuxfs4".into());
        manifest.common.buildpacks = vec!["java_buildpack".into()];
        manifest
            .common
            .environment_variables
            .insert("MODE".into(), Some("prod".into()));
        manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap();
        assert_eq!(
            platform.find_application(&space, "web").unwrap().stack_id,
            Some(stack)
        );

        let rebuilt = manager
            .get_manifest(&AppRef::new(space, "web"))
            .await
            .unwrap();

        assert_eq!(rebuilt.common.stack.as_deref(), Some("cflinuxfs4"));
        assert_eq!(rebuilt.common.buildpacks, vec!["java_buildpack".to_string()]);
        assert_eq!(rebuilt.common.memory, Some(64));
        assert_eq!(rebuilt.services, vec!["db".to_string()]);
        assert_eq!(
            rebuilt.common.routes,
            vec![Route::new("web.apps.example.com")]
        );
        assert_eq!(rebuilt.common.no_route, None);
    }

    #[tokio::test]
    async fn test_route_errors_carry_application() {
        let (_platform, manager, space) = setup();
        let mut manifest = manifest("web");
        manifest.common.routes = vec![Route::new("web.missing.com")];

        let err = manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::DomainNotFound { ref app, ref route } if app == "web" && route == "web.missing.com"
        ));
    }

    #[tokio::test]
    async fn test_route_errors_abort_before_create() {
        let (platform, manager, space) = setup();
        let mut manifest = manifest("web");
        manifest.common.routes = vec![Route::new("web.missing.com")];

        let err = manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeploymentError::DomainNotFound { .. }));
        assert_eq!(platform.call_count(Operation::CreateApplication), 0);
        assert_eq!(platform.call_count(Operation::CreateRoute), 0);
        assert!(platform.find_application(&space, "web").is_none());
    }

    #[tokio::test]
    async fn test_route_errors_abort_before_update() {
        let (platform, manager, space) = setup();
        manager
            .push(&space, &manifest("web"), &PushOptions::default())
            .await
            .unwrap();

        let mut broken = manifest("web");
        broken.common.memory = Some(256);
        broken.common.routes = vec![Route::new("web.missing.com")];
        let err = manager
            .push(&space, &broken, &PushOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeploymentError::DomainNotFound { .. }));
        assert_eq!(platform.find_application(&space, "web").unwrap().memory, 64);
    }

    #[tokio::test]
    async fn test_no_default_domain_aborts_before_create() {
        let platform = Arc::new(InMemoryPlatform::new());
        let space = platform.add_space("org-1");
        let manager = DeploymentManager::with_words(
            platform.clone(),
            Arc::new(FixedWords::new("brave", "otter")),
            DeploymentConfig::default(),
        );

        let err = manager
            .push(&space, &manifest("web"), &PushOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeploymentError::NoDefaultDomain { .. }));
        assert_eq!(platform.call_count(Operation::CreateApplication), 0);
    }

    #[tokio::test]
    async fn test_tcp_route_gets_random_port() {
        let (platform, manager, space) = setup();
        platform.add_domain(DomainSummary::tcp("tcp-1", "tcp.example.com"), None);
        let mut manifest = manifest("broker");
        manifest.common.routes = vec![Route::new("tcp.example.com")];

        let outcome = manager
            .push(&space, &manifest, &PushOptions::default())
            .await
            .unwrap();

        let routes = platform.application_routes(&outcome.app_id);
        assert_eq!(routes.len(), 1);
        assert!(routes[0].port.is_some());
        assert_eq!(routes[0].host, "");
    }
}
