//! DataStage client operations.
//!
//! [`DataStage`] holds the connection settings, the process executor and
//! the (optional) result cache.  The operations in [`ops`] build the
//! client argument vectors, run them, and shape the textual output into
//! JSON.  [`namespace`] exposes them to the registry as the `datastage`
//! namespace.
//!
//! `dsjob` calling convention:
//!
//! ```text
//! dsjob -domain D -server S -user U -password P <selector> [targets...]
//! ```

pub mod ops;

pub use ops::namespace;

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cache::{derive_key, CacheStore};
use crate::config::DataStageConfig;
use crate::error::OpError;
use crate::exec::Executor;
use crate::registry::Args;

/// Shared context for every DataStage operation.
pub struct DataStage {
    config: DataStageConfig,
    executor: Arc<dyn Executor>,
    cache: Option<Arc<CacheStore>>,
}

impl DataStage {
    /// `cache: None` runs every operation uncached.
    pub fn new(
        config: DataStageConfig,
        executor: Arc<dyn Executor>,
        cache: Option<Arc<CacheStore>>,
    ) -> Self {
        Self {
            config,
            executor,
            cache,
        }
    }

    pub fn config(&self) -> &DataStageConfig {
        &self.config
    }

    fn setting<'a>(&'a self, name: &'static str, value: &'a Option<String>) -> Result<&'a str, OpError> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(OpError::NotConfigured(name))
    }

    pub(crate) fn domain(&self) -> Result<&str, OpError> {
        self.setting("domain", &self.config.domain)
    }

    pub(crate) fn server(&self) -> Result<&str, OpError> {
        self.setting("server", &self.config.server)
    }

    fn user(&self) -> Result<&str, OpError> {
        self.setting("user", &self.config.user)
    }

    fn password(&self) -> Result<&str, OpError> {
        self.setting("password", &self.config.password)
    }

    /// Build a `dsjob` argument vector.
    pub(crate) fn dsjob_argv(&self, selector: &[&str], targets: &[&str]) -> Result<Vec<String>, OpError> {
        let mut argv = vec![
            self.config.dsjob_bin.clone(),
            "-domain".into(),
            self.domain()?.into(),
            "-server".into(),
            self.server()?.into(),
            "-user".into(),
            self.user()?.into(),
            "-password".into(),
            self.password()?.into(),
        ];
        argv.extend(selector.iter().map(|s| s.to_string()));
        argv.extend(targets.iter().map(|s| s.to_string()));
        Ok(argv)
    }

    /// Build a `dsexport` argument vector for one job.
    pub(crate) fn dsexport_argv(&self, project: &str, job: &str, output_file: &str) -> Result<Vec<String>, OpError> {
        Ok(vec![
            self.config.dsexport_bin.clone(),
            format!("/D={}", self.domain()?),
            format!("/H={}", self.server()?),
            format!("/U={}", self.user()?),
            format!("/P={}", self.password()?),
            format!("/JOB={job}"),
            "/NODEPENDENTS".into(),
            project.into(),
            output_file.into(),
        ])
    }

    /// Build a `dssearch` argument vector.  Note the client expects
    /// `-user`/`-password` before `-server`.
    pub(crate) fn dssearch_argv(&self, selector: &[&str], targets: &[&str]) -> Result<Vec<String>, OpError> {
        let mut argv = vec![
            self.config.dssearch_bin.clone(),
            "-domain".into(),
            self.domain()?.into(),
            "-user".into(),
            self.user()?.into(),
            "-password".into(),
            self.password()?.into(),
            "-server".into(),
            self.server()?.into(),
        ];
        argv.extend(selector.iter().map(|s| s.to_string()));
        argv.extend(targets.iter().map(|s| s.to_string()));
        Ok(argv)
    }

    pub(crate) async fn run(&self, argv: Vec<String>) -> Result<String, OpError> {
        Ok(self.executor.execute(&argv).await?)
    }

    /// Project argument, falling back to the configured default project.
    pub(crate) fn project(&self, args: &Args) -> Result<String, OpError> {
        match optional_str(args, "project")? {
            Some(p) => Ok(p),
            None => self
                .config
                .project
                .clone()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| OpError::MissingArgument("project".into())),
        }
    }

    /// Memoize `compute` under a key scoped to `operation` and `key_args`.
    ///
    /// Cache failures are logged and treated as a miss; errors from
    /// `compute` are never cached.
    pub(crate) async fn cached<F, Fut>(&self, operation: &str, key_args: &[&str], compute: F) -> Result<Value, OpError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, OpError>>,
    {
        let Some(cache) = self.cache.as_deref() else {
            return compute().await;
        };

        let key = operation_key(operation, key_args);
        match cache.get(&key) {
            Ok(Some(hit)) => {
                debug!(operation, key = %key, "cache hit");
                return Ok(hit);
            }
            Ok(None) => debug!(operation, key = %key, "cache miss"),
            Err(e) => warn!(operation, error = %e, "cache read failed, running uncached"),
        }

        let value = compute().await?;
        if let Err(e) = cache.put(&key, &value) {
            warn!(operation, error = %e, "cache write failed");
        }
        Ok(value)
    }
}

impl std::fmt::Debug for DataStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStage")
            .field("server", &self.config.server)
            .field("project", &self.config.project)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Cache key for `operation` called with `args`: the operation symbol is
/// the first positional value so different operations never share keys.
pub fn operation_key(operation: &str, args: &[&str]) -> String {
    let positional: Vec<Value> = std::iter::once(operation)
        .chain(args.iter().copied())
        .map(|s| Value::String(s.to_string()))
        .collect();
    derive_key(&positional, &Map::new())
}

// ── Argument helpers ────────────────────────────────────────

/// Required string argument.  Numbers and booleans are accepted and
/// rendered as text.
pub(crate) fn required_str(args: &Args, name: &str) -> Result<String, OpError> {
    optional_str(args, name)?.ok_or_else(|| OpError::MissingArgument(name.to_string()))
}

/// Optional string argument; `null` and empty strings count as absent.
pub(crate) fn optional_str(args: &Args, name: &str) -> Result<Option<String>, OpError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(OpError::invalid(name, "expected a string")),
    }
}

/// Optional list-of-strings argument.
pub(crate) fn optional_str_list(args: &Args, name: &str) -> Result<Vec<String>, OpError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(OpError::invalid(name, "expected a list of strings")),
            })
            .collect(),
        Some(_) => Err(OpError::invalid(name, "expected a list of strings")),
    }
}
