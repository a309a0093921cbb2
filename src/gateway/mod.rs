//! Gateway facade.
//!
//! Holds the registered operations and dispatches calls by name.  The
//! registration set is fixed by [`bootstrap`]: descriptors are loaded,
//! bound and registered once at startup, and the resulting [`Gateway`] is
//! shared read-only.  A changed descriptor takes effect on restart.
//!
//! Caching is not applied here.  Each bound callable decides for itself
//! whether its result may be memoized.

mod auth;
pub mod http;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::datastage::{self, DataStage};
use crate::error::{ErrorBody, OpError};
use crate::registry::prompts::{load_prompts, Prompt};
use crate::registry::{self, Args, Binding, Handler, SymbolTable};

pub use http::{start_http, HttpServer};

/// Discovery metadata for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub name: String,
    pub description: String,
}

/// A registered, invokable operation.
struct Operation {
    info: OperationInfo,
    target: String,
    handler: Handler,
}

/// Errors surfaced to the caller of [`Gateway::invoke`].
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
    #[error("operation `{name}` failed: {source}")]
    Operation {
        name: String,
        #[source]
        source: OpError,
    },
}

impl GatewayError {
    /// Structured form reported to remote callers.
    pub fn to_body(&self) -> ErrorBody {
        match self {
            GatewayError::UnknownOperation(_) => ErrorBody::new("UnknownOperation", self.to_string()),
            GatewayError::Operation { name, source } => {
                let mut body = ErrorBody::from(source);
                body.operation = Some(name.clone());
                body
            }
        }
    }
}

/// Name → operation dispatch table plus the prompt catalogue.
#[derive(Default)]
pub struct Gateway {
    operations: BTreeMap<String, Operation>,
    prompts: BTreeMap<String, Prompt>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose each binding as a named operation.  Returns how many were
    /// registered; a name that is already taken keeps its first binding.
    pub fn register_all(&mut self, bindings: Vec<Binding>) -> usize {
        let mut registered = 0;
        for b in bindings {
            if self.operations.contains_key(&b.name) {
                warn!(name = %b.name, target = %b.target, "operation already registered, skipping");
                continue;
            }
            debug!(name = %b.name, target = %b.target, "registered operation");
            self.operations.insert(
                b.name.clone(),
                Operation {
                    info: OperationInfo {
                        name: b.name,
                        description: b.description,
                    },
                    target: b.target,
                    handler: b.handler,
                },
            );
            registered += 1;
        }
        registered
    }

    pub fn set_prompts(&mut self, prompts: BTreeMap<String, Prompt>) {
        self.prompts = prompts;
    }

    /// `{name, description}` of every operation, sorted by name.
    pub fn operations(&self) -> Vec<OperationInfo> {
        self.operations.values().map(|op| op.info.clone()).collect()
    }

    /// The `namespace.symbol` an operation is bound to.
    pub fn target(&self, name: &str) -> Option<&str> {
        self.operations.get(name).map(|op| op.target.as_str())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn prompts(&self) -> impl Iterator<Item = &Prompt> {
        self.prompts.values()
    }

    pub fn prompt(&self, name: &str) -> Option<&Prompt> {
        self.prompts.get(name)
    }

    /// Invoke operation `name` with keyword arguments.
    pub async fn invoke(&self, name: &str, args: Args) -> Result<Value, GatewayError> {
        let op = self
            .operations
            .get(name)
            .ok_or_else(|| GatewayError::UnknownOperation(name.to_string()))?;

        let started = std::time::Instant::now();
        let result = (op.handler)(args).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                info!(operation = name, elapsed_ms, "operation completed");
                Ok(value)
            }
            Err(source) => {
                warn!(operation = name, elapsed_ms, kind = source.kind(), error = %source, "operation failed");
                Err(GatewayError::Operation {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }
}

/// Build the symbol table every descriptor is resolved against.
pub fn symbol_table(ds: &Arc<DataStage>) -> SymbolTable {
    SymbolTable::new().with(datastage::namespace(ds))
}

/// One-shot startup sequence: load descriptors, bind, register, then load
/// the prompt catalogue.
///
/// Descriptors that fail to load are logged and skipped.  A missing or
/// unreadable tools directory is fatal: a gateway with nothing to serve
/// is a misconfiguration.
pub fn bootstrap(config: &Config, ds: Arc<DataStage>) -> anyhow::Result<Gateway> {
    use anyhow::Context;

    let symbols = symbol_table(&ds);
    let tools_dir = &config.gateway.tools_dir;
    let report = registry::load(tools_dir, &symbols)
        .with_context(|| format!("loading operation descriptors from {}", tools_dir.display()))?;

    for err in &report.errors {
        warn!(error = %err, "skipping operation descriptor");
    }

    let mut gateway = Gateway::new();
    let registered = gateway.register_all(report.bindings);

    let catalogue = load_prompts(&config.gateway.prompts_dir);
    for err in &catalogue.errors {
        warn!(error = %err, "skipping prompt");
    }
    gateway.set_prompts(catalogue.prompts);

    info!(
        operations = registered,
        skipped = report.errors.len(),
        prompts = gateway.prompts.len(),
        "gateway initialised"
    );
    Ok(gateway)
}
