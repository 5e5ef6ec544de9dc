//! Navy
//!
//! Named multi-service development environments on top of docker-compose.
//!
//! # Overview
//!
//! An [`Environment`] wraps one compose project. Lifecycle operations go
//! through a backend [`Driver`]; operations that bring services up first run a
//! chain of [`Middleware`] over the configuration resolved from the user's
//! compose files and write the result to a compiled compose file that all
//! later backend invocations use.
//!
//! # Example Settings File
//!
//! ```yaml
//! name: dev
//! driver: docker-compose
//! compose_files:
//!   - docker-compose.yml
//! external_ip: docker.local
//! ```
//!
//! ```rust,ignore
//! let settings = EnvironmentSettings::from_file("navy.yml")?;
//! let env = Environment::builder(settings)
//!     .with_middleware(Middleware::infallible("pin-images", pin_images))
//!     .build();
//!
//! env.launch(&["web".to_string()], LaunchOptions::default()).await?;
//! let port = env.port("web", 80, None).await?;
//! ```

pub mod cli;
pub mod config;
pub mod driver;
pub mod environment;
pub mod external_ip;
pub mod middleware;
pub mod runtime;
pub mod settings;

pub use cli::NavyArgs;
pub use config::{ComposeConfigStore, ConfigDocument, ConfigError};
pub use driver::{
    create_driver, DockerComposeDriver, Driver, DriverError, DriverKind, LaunchOptions, Service,
    ServiceList, ServiceStatus,
};
pub use environment::{Environment, EnvironmentBuilder, EnvironmentError};
pub use external_ip::{ExternalIpResolver, ResolutionError};
pub use middleware::{
    Middleware, MiddlewareError, OperationContext, OperationKind, PipelineError,
};
pub use runtime::{
    ComposeClient, ExecError, ExecOptions, LogSink, LogSource, LogStream, LogStreamError,
    ProcessClient,
};
pub use settings::{EnvironmentSettings, SettingsError};
