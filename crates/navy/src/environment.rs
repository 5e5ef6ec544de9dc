//! Named environment: settings, middleware and a driver tied together

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::ConfigDocument;
use crate::driver::{create_driver, Driver, DriverError, LaunchOptions, ServiceList};
use crate::external_ip::{ExternalIpResolver, ResolutionError};
use crate::middleware::{self, Middleware, OperationContext, OperationKind, PipelineError};
use crate::runtime::LogStream;
use crate::settings::EnvironmentSettings;

/// Errors that can occur in environment operations
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Middleware(#[from] PipelineError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Builder that collects middleware before the environment is frozen
pub struct EnvironmentBuilder {
    settings: EnvironmentSettings,
    middleware: Vec<Middleware>,
    driver: Option<Arc<dyn Driver>>,
    resolver: Option<ExternalIpResolver>,
}

impl EnvironmentBuilder {
    /// Register a middleware. Runs after everything registered before it.
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Use `driver` instead of the one selected by the settings
    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Use `resolver` instead of reading the process environment
    pub fn with_resolver(mut self, resolver: ExternalIpResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Environment {
        let driver = self
            .driver
            .unwrap_or_else(|| create_driver(&self.settings));
        let resolver = self
            .resolver
            .unwrap_or_else(ExternalIpResolver::from_env)
            .with_configured_host(self.settings.external_ip.clone());

        Environment {
            log_target: self.settings.log_target(),
            settings: self.settings,
            middleware: self.middleware.into(),
            driver,
            resolver,
            compile_lock: Mutex::new(()),
        }
    }
}

/// A named multi-service environment.
///
/// Operations that compile configuration (`launch`, `update`, `reconfigure`,
/// `destroy`) are serialized per environment: the pipeline run, the write of
/// the compiled file and the backend call consuming it form one critical
/// section. Read-only operations never take the lock.
pub struct Environment {
    settings: EnvironmentSettings,
    log_target: String,
    middleware: Arc<[Middleware]>,
    driver: Arc<dyn Driver>,
    resolver: ExternalIpResolver,
    compile_lock: Mutex<()>,
}

impl Environment {
    pub fn builder(settings: EnvironmentSettings) -> EnvironmentBuilder {
        EnvironmentBuilder {
            settings,
            middleware: Vec::new(),
            driver: None,
            resolver: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &EnvironmentSettings {
        &self.settings
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }

    fn context(&self, kind: OperationKind, services: &[String]) -> OperationContext {
        OperationContext::new(self.settings.name.clone(), kind).with_services(services)
    }

    /// Run the middleware over the freshly resolved configuration without
    /// writing anything
    pub async fn compile(&self, ctx: &OperationContext) -> Result<ConfigDocument, EnvironmentError> {
        let base = self.driver.get_config().await?;
        Ok(middleware::run(base, ctx, &self.middleware)?)
    }

    /// Compile and write. Callers must hold `compile_lock`.
    async fn compile_and_write(&self, ctx: &OperationContext) -> Result<(), EnvironmentError> {
        log::debug!(
            target: self.log_target.as_str(),
            "Compiling configuration for {} of {:?} through {} middleware",
            ctx.kind,
            ctx.services,
            self.middleware.len()
        );
        let config = self.compile(ctx).await?;
        self.driver.write_config(&config).await?;
        Ok(())
    }

    /// Recompile the configuration outside of any lifecycle operation
    pub async fn reconfigure(&self) -> Result<(), EnvironmentError> {
        let _guard = self.compile_lock.lock().await;
        let ctx = self.context(OperationKind::Reload, &[]);
        self.compile_and_write(&ctx).await
    }

    /// Compile the configuration and bring `services` up
    pub async fn launch(&self, services: &[String], opts: LaunchOptions) -> Result<(), EnvironmentError> {
        if services.is_empty() {
            return Ok(());
        }

        let _guard = self.compile_lock.lock().await;
        let ctx = self
            .context(OperationKind::Launch, services)
            .with_options(opts);
        self.compile_and_write(&ctx).await?;

        log::info!(target: self.log_target.as_str(), "Launching {}", services.join(", "));
        self.driver.launch(services, opts).await?;
        Ok(())
    }

    /// Compile the configuration, pull and recreate `services`
    pub async fn update(&self, services: &[String]) -> Result<(), EnvironmentError> {
        if services.is_empty() {
            return Ok(());
        }

        let _guard = self.compile_lock.lock().await;
        let ctx = self
            .context(OperationKind::Update, services)
            .with_options(LaunchOptions {
                no_deps: true,
                force_recreate: false,
            });
        self.compile_and_write(&ctx).await?;

        log::info!(target: self.log_target.as_str(), "Updating {}", services.join(", "));
        self.driver.update(services).await?;
        Ok(())
    }

    pub async fn start(&self, services: &[String]) -> Result<(), EnvironmentError> {
        Ok(self.driver.start(services).await?)
    }

    pub async fn stop(&self, services: &[String]) -> Result<(), EnvironmentError> {
        Ok(self.driver.stop(services).await?)
    }

    pub async fn restart(&self, services: &[String]) -> Result<(), EnvironmentError> {
        Ok(self.driver.restart(services).await?)
    }

    pub async fn kill(&self, services: &[String]) -> Result<(), EnvironmentError> {
        Ok(self.driver.kill(services).await?)
    }

    pub async fn rm(&self, services: &[String]) -> Result<(), EnvironmentError> {
        Ok(self.driver.rm(services).await?)
    }

    /// Tear the environment down and drop its compiled configuration
    pub async fn destroy(&self) -> Result<(), EnvironmentError> {
        let _guard = self.compile_lock.lock().await;
        log::info!(target: self.log_target.as_str(), "Destroying {}", self.settings.name);
        self.driver.destroy().await?;
        self.driver.remove_config().await?;
        Ok(())
    }

    pub async fn ps(&self) -> Result<ServiceList, EnvironmentError> {
        Ok(self.driver.ps().await?)
    }

    pub async fn port(
        &self,
        service: &str,
        private_port: u16,
        index: Option<u32>,
    ) -> Result<Option<u16>, EnvironmentError> {
        Ok(self.driver.port(service, private_port, index).await?)
    }

    pub async fn get_log_stream(&self, services: &[String]) -> Result<Option<LogStream>, EnvironmentError> {
        Ok(self.driver.get_log_stream(services).await?)
    }

    pub async fn get_launched_service_names(&self) -> Result<Vec<String>, EnvironmentError> {
        Ok(self.driver.get_launched_service_names().await?)
    }

    pub async fn get_available_service_names(&self) -> Result<Vec<String>, EnvironmentError> {
        Ok(self.driver.get_available_service_names().await?)
    }

    /// Address published ports are reachable on.
    ///
    /// Unless a resolver was given to the builder, `NAVY_HOST`,
    /// `NAVY_EXTERNAL_IP` and `DOCKER_HOST` are the values captured when the
    /// environment was built.
    pub async fn external_ip(&self) -> Result<String, EnvironmentError> {
        Ok(self.resolver.resolve().await?)
    }

    /// `http://<external ip>:<published port>`, `None` when the port is unmapped
    pub async fn url(&self, service: &str, private_port: u16) -> Result<Option<String>, EnvironmentError> {
        let Some(port) = self.port(service, private_port, None).await? else {
            return Ok(None);
        };
        let ip = self.external_ip().await?;
        Ok(Some(format!("http://{}:{}", ip, port)))
    }
}
