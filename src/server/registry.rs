//! The process-wide tool catalog.
//!
//! Built once by [`crate::tools::bootstrap`] before the server accepts
//! traffic, then frozen behind an `Arc`. The registry knows nothing about
//! permissions; the dispatcher filters through the token policy before
//! anything here is reached.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::auth::RequestScope;
use crate::error::{Error, Result};
use crate::types::{ExecutionResult, ToolInfo};

/// A tool implementation.
///
/// One shape for every handler: arguments in, [`ExecutionResult`] out, with
/// the request scope available for handlers that care about the caller's
/// identity. Expected failures belong in the result's `error_kind`;
/// returning `Err` is reserved for argument validation (`Error::Validation`)
/// and genuine bugs.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool.
    async fn handle(&self, args: Value, scope: RequestScope) -> Result<ExecutionResult>;
}

/// A registered tool: published schema plus handler.
#[derive(Clone)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the arguments.
    pub input_schema: Value,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl ToolDefinition {
    /// The published `{name, description, inputSchema}` record.
    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Catalog mapping tool names to handlers, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Init phase only; fails on a duplicate name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }
        self.index.insert(name.clone(), self.tools.len());
        self.tools.push(ToolDefinition {
            name,
            description: description.into(),
            input_schema,
            handler,
        });
        Ok(())
    }

    /// The full catalog in registration order.
    pub fn definitions(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(ToolDefinition::info).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by name.
    ///
    /// Performs no permission checks; the dispatcher does that first.
    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        scope: RequestScope,
    ) -> Result<ExecutionResult> {
        let def = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        def.handler.handle(args, scope).await
    }
}

/// Boxed future returned by typed tool closures.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<ExecutionResult>> + Send>>;

/// A handler that deserializes its arguments into a typed struct first.
///
/// Serde failures surface as `Error::Validation`, which the dispatcher maps
/// to JSON-RPC `-32602`.
pub struct TypedTool<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T, RequestScope) -> HandlerFuture + Send + Sync,
{
    handler: F,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, F> TypedTool<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T, RequestScope) -> HandlerFuture + Send + Sync,
{
    /// Wrap a closure taking typed arguments.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> ToolHandler for TypedTool<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T, RequestScope) -> HandlerFuture + Send + Sync,
{
    async fn handle(&self, args: Value, scope: RequestScope) -> Result<ExecutionResult> {
        let typed: T = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        (self.handler)(typed, scope).await
    }
}
