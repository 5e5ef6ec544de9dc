//! Configuration middleware pipeline
//!
//! A middleware is a named, pure transform over a [`ConfigDocument`]. The
//! registered list is folded left to right over the configuration the backend
//! reports, and the result is what gets written as the compiled compose file.
//!
//! ```rust,ignore
//! let always_restart = Middleware::infallible("always-restart", |mut config, _ctx| {
//!     for name in config.service_names() {
//!         if let Some(service) = config.service_mut(&name) {
//!             service.insert("restart".into(), "always".into());
//!         }
//!     }
//!     config
//! });
//! ```

use std::fmt;
use std::sync::Arc;

use crate::config::ConfigDocument;
use crate::driver::LaunchOptions;

/// Why the pipeline is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Launch,
    Update,
    Reload,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Launch => write!(f, "launch"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Reload => write!(f, "reload"),
        }
    }
}

/// Immutable snapshot handed to every middleware of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    /// Environment the pipeline runs for
    pub environment: String,
    /// Operation that triggered the run
    pub kind: OperationKind,
    /// Services the operation targets
    pub services: Vec<String>,
    /// Launch options of the operation (defaults for non-launch operations)
    pub options: LaunchOptions,
}

impl OperationContext {
    pub fn new(environment: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            environment: environment.into(),
            kind,
            services: Vec::new(),
            options: LaunchOptions::default(),
        }
    }

    pub fn with_services(mut self, services: &[String]) -> Self {
        self.services = services.to_vec();
        self
    }

    pub fn with_options(mut self, options: LaunchOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether the operation targets `service`
    pub fn targets(&self, service: &str) -> bool {
        self.services.iter().any(|s| s == service)
    }
}

/// Error raised from inside a middleware
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MiddlewareError(String);

impl MiddlewareError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A pipeline step failed; nothing from this run is persisted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Middleware '{middleware}' failed: {source}")]
pub struct PipelineError {
    pub middleware: String,
    #[source]
    pub source: MiddlewareError,
}

type TransformFn =
    dyn Fn(ConfigDocument, &OperationContext) -> Result<ConfigDocument, MiddlewareError> + Send + Sync;

/// A named configuration transform
#[derive(Clone)]
pub struct Middleware {
    name: String,
    transform: Arc<TransformFn>,
}

impl Middleware {
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(ConfigDocument, &OperationContext) -> Result<ConfigDocument, MiddlewareError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            transform: Arc::new(transform),
        }
    }

    /// Middleware that cannot fail
    pub fn infallible<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(ConfigDocument, &OperationContext) -> ConfigDocument + Send + Sync + 'static,
    {
        Self::new(name, move |config, ctx| Ok(transform(config, ctx)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(
        &self,
        config: ConfigDocument,
        ctx: &OperationContext,
    ) -> Result<ConfigDocument, PipelineError> {
        (self.transform)(config, ctx).map_err(|source| PipelineError {
            middleware: self.name.clone(),
            source,
        })
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").field("name", &self.name).finish()
    }
}

/// Fold `middleware` over `base` in order
pub fn run(
    base: ConfigDocument,
    ctx: &OperationContext,
    middleware: &[Middleware],
) -> Result<ConfigDocument, PipelineError> {
    middleware.iter().try_fold(base, |config, step| step.apply(config, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn base() -> ConfigDocument {
        ConfigDocument::from_yaml(
            r#"
services:
  web:
    image: nginx
  db:
    image: postgres
"#,
        )
        .unwrap()
    }

    fn ctx() -> OperationContext {
        OperationContext::new("dev", OperationKind::Launch).with_services(&["web".to_string()])
    }

    fn append_marker(marker: &'static str) -> Middleware {
        Middleware::infallible(marker, move |mut config, _ctx| {
            let trail = match config.get("trail").and_then(Value::as_str) {
                Some(existing) => format!("{existing},{marker}"),
                None => marker.to_string(),
            };
            config.insert("trail", Value::from(trail));
            config
        })
    }

    #[test]
    fn test_empty_pipeline_returns_base() {
        assert_eq!(run(base(), &ctx(), &[]).unwrap(), base());
    }

    #[test]
    fn test_applies_in_registration_order() {
        let chain = [append_marker("a"), append_marker("b"), append_marker("c")];
        let result = run(base(), &ctx(), &chain).unwrap();
        assert_eq!(result.get("trail").and_then(Value::as_str), Some("a,b,c"));
    }

    #[test]
    fn test_middleware_sees_context() {
        let only_targets = Middleware::infallible("only-targets", |mut config, ctx| {
            for name in config.service_names() {
                if !ctx.targets(&name) {
                    config.remove_service(&name);
                }
            }
            config
        });

        let result = run(base(), &ctx(), &[only_targets]).unwrap();
        assert_eq!(result.service_names(), vec!["web"]);
    }

    #[test]
    fn test_failure_aborts_the_pipeline() {
        let ran_after = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran_after.clone();

        let chain = [
            append_marker("a"),
            Middleware::new("reject", |_config, _ctx| {
                Err(MiddlewareError::new("db is not allowed"))
            }),
            Middleware::infallible("after", move |config, _ctx| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                config
            }),
        ];

        let err = run(base(), &ctx(), &chain).unwrap_err();
        assert_eq!(err.middleware, "reject");
        assert_eq!(err.to_string(), "Middleware 'reject' failed: db is not allowed");
        assert!(!ran_after.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_same_inputs_produce_identical_output() {
        let chain = [
            append_marker("a"),
            Middleware::infallible("ports", |mut config, _ctx| {
                if let Some(web) = config.service_mut("web") {
                    web.insert(Value::from("ports"), serde_yaml::from_str("['80']").unwrap());
                }
                config
            }),
        ];

        let first = run(base(), &ctx(), &chain).unwrap().to_yaml().unwrap();
        let second = run(base(), &ctx(), &chain).unwrap().to_yaml().unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_operation_kind_display() {
        assert_eq!(OperationKind::Launch.to_string(), "launch");
        assert_eq!(OperationKind::Update.to_string(), "update");
        assert_eq!(OperationKind::Reload.to_string(), "reload");
    }
}
