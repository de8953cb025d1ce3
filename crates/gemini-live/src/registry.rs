//! Tool handlers and function-call dispatch.

use crate::config_store::LiveConfig;
use crate::error::ToolError;
use async_trait::async_trait;
use gemini_live_types::{FunctionCall, FunctionResponse, Schema, ToolCall, ToolResponse};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{Instrument, info, info_span, warn};

/// Error text sent back for calls to tools nobody handles.
pub const NO_HANDLER: &str = "no handler registered";

/// Runs one function call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, call: FunctionCall) -> Result<Value, ToolError>;
}

/// Maps tool names to their current handler.
///
/// Features register on mount and unregister on unmount; the registry outlives
/// individual connections.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the handler for `name`, returning the replaced one.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) -> Option<Arc<dyn ToolHandler>> {
        let name = name.into();
        info!(tool = %name, "Registering tool handler");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, handler)
    }

    /// Removes the handler for `name`. Removing an unknown name is a no-op.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            info!(tool = %name, "Unregistered tool handler");
        }
        removed
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handler(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Answers every call in `tool_call`.
    ///
    /// Arguments are checked against the declaration in `config` when there is
    /// one. Handlers run concurrently on their own tasks. The response has
    /// exactly one entry per call, in call order: unknown tools, invalid
    /// arguments, handler errors and handler panics all become `{"error": ..}`
    /// entries for the affected id only.
    pub async fn dispatch(&self, tool_call: ToolCall, config: Option<&LiveConfig>) -> ToolResponse {
        let pending: Vec<_> = tool_call
            .function_calls
            .into_iter()
            .map(|call| {
                let handler = self.handler(&call.name);
                let schema = config
                    .and_then(|c| c.declaration(&call.name))
                    .and_then(|d| d.parameters.clone());
                run_call(call, handler, schema)
            })
            .collect();

        ToolResponse {
            function_responses: futures::future::join_all(pending).await,
        }
    }
}

async fn run_call(
    call: FunctionCall,
    handler: Option<Arc<dyn ToolHandler>>,
    schema: Option<Schema>,
) -> FunctionResponse {
    let Some(handler) = handler else {
        warn!(tool = %call.name, id = %call.id, "Tool call for a tool with no handler");
        return FunctionResponse::error(&call, NO_HANDLER);
    };

    if let Some(schema) = schema {
        if let Err(e) = schema.validate(&Value::Object(call.args.clone())) {
            warn!(tool = %call.name, id = %call.id, error = %e, "Tool call arguments rejected");
            return FunctionResponse::error(&call, ToolError::from(e).to_string());
        }
    }

    let span = info_span!("tool_call", tool = %call.name, id = %call.id);
    let task_call = call.clone();
    let outcome = tokio::spawn(async move { handler.call(task_call).await }.instrument(span)).await;

    match outcome {
        Ok(Ok(output)) => FunctionResponse::success(&call, output),
        Ok(Err(e)) => {
            // The whole context chain, so the model sees the underlying cause.
            let message = match &e {
                ToolError::Failed(err) => format!("{err:#}"),
                other => other.to_string(),
            };
            warn!(tool = %call.name, id = %call.id, error = %message, "Tool handler failed");
            FunctionResponse::error(&call, message)
        }
        Err(join_error) => {
            let message = if join_error.is_panic() {
                "tool handler panicked"
            } else {
                "tool handler was cancelled"
            };
            warn!(tool = %call.name, id = %call.id, "{message}");
            FunctionResponse::error(&call, message)
        }
    }
}

/// A handler built from a closure over the raw argument map.
pub struct FnTool<F> {
    f: F,
}

/// Wraps `f` as a handler that receives the untyped arguments.
pub fn tool_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnTool { f })
}

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, call: FunctionCall) -> Result<Value, ToolError> {
        Ok((self.f)(call.args).await?)
    }
}

/// A handler that decodes its arguments into `A` before running.
pub struct TypedTool<A, F> {
    f: F,
    _args: PhantomData<fn() -> A>,
}

/// Wraps `f` as a handler taking typed arguments.
///
/// Arguments that do not deserialize into `A` are answered with an
/// invalid-arguments error without calling `f`.
pub fn typed_tool<A, R, F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    A: DeserializeOwned + Send + 'static,
    R: Serialize + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    Arc::new(TypedTool {
        f,
        _args: PhantomData,
    })
}

#[async_trait]
impl<A, R, F, Fut> ToolHandler for TypedTool<A, F>
where
    A: DeserializeOwned + Send + 'static,
    R: Serialize + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    async fn call(&self, call: FunctionCall) -> Result<Value, ToolError> {
        let args: A = serde_json::from_value(Value::Object(call.args))
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let output = (self.f)(args).await?;
        serde_json::to_value(output).map_err(|e| ToolError::Failed(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use gemini_live_types::ToolDeclaration;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    fn call(id: &str, name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            id: id.to_string(),
            name: name.to_string(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    fn echo(label: &'static str) -> Arc<dyn ToolHandler> {
        tool_fn(move |args| async move { Ok(json!({ "handled_by": label, "args": args })) })
    }

    #[tokio::test]
    async fn every_call_id_gets_exactly_one_response() {
        let registry = ToolRegistry::new();
        registry.register("known", echo("known"));

        let batch = ToolCall {
            function_calls: vec![
                call("1", "known", json!({})),
                call("2", "missing", json!({})),
                call("3", "known", json!({ "x": 1 })),
            ],
        };
        let response = registry.dispatch(batch, None).await;

        let ids: Vec<_> = response.function_responses.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(response.function_responses[0].response["handled_by"], "known");
        assert_eq!(response.function_responses[1].error_message(), Some(NO_HANDLER));
        assert_eq!(response.function_responses[2].response["args"]["x"], 1);
    }

    #[tokio::test]
    async fn routes_each_call_to_its_own_handler() {
        let registry = ToolRegistry::new();
        registry.register("draft_email", echo("email"));
        registry.register("book_calendar", echo("calendar"));

        let batch = ToolCall {
            function_calls: vec![
                call("c", "book_calendar", json!({})),
                call("e", "draft_email", json!({})),
            ],
        };
        let response = registry.dispatch(batch, None).await;

        assert_eq!(response.function_responses[0].id, "c");
        assert_eq!(response.function_responses[0].response["handled_by"], "calendar");
        assert_eq!(response.function_responses[1].id, "e");
        assert_eq!(response.function_responses[1].response["handled_by"], "email");
    }

    #[tokio::test]
    async fn failures_are_isolated_to_their_call() {
        let registry = ToolRegistry::new();
        registry.register("ok", echo("ok"));
        registry.register(
            "fails",
            tool_fn(|_| async { Err(anyhow::anyhow!("calendar API unavailable")) }),
        );
        registry.register(
            "panics",
            tool_fn(|_| async {
                if true {
                    panic!("handler bug");
                }
                Ok(Value::Null)
            }),
        );

        let batch = ToolCall {
            function_calls: vec![
                call("1", "fails", json!({})),
                call("2", "panics", json!({})),
                call("3", "ok", json!({})),
            ],
        };
        let response = registry.dispatch(batch, None).await;

        assert_eq!(
            response.function_responses[0].error_message(),
            Some("calendar API unavailable")
        );
        assert_eq!(
            response.function_responses[1].error_message(),
            Some("tool handler panicked")
        );
        assert_eq!(response.function_responses[2].error_message(), None);
    }

    #[tokio::test]
    async fn handler_error_keeps_its_context_chain() {
        let registry = ToolRegistry::new();
        registry.register(
            "book_calendar",
            tool_fn(|_| async {
                Err(anyhow::anyhow!("'tomorrow' is not an ISO 8601 date and time"))
                    .context("invalid startDateTime")
            }),
        );

        let batch = ToolCall {
            function_calls: vec![call("1", "book_calendar", json!({}))],
        };
        let response = registry.dispatch(batch, None).await;
        assert_eq!(
            response.function_responses[0].error_message(),
            Some("invalid startDateTime: 'tomorrow' is not an ISO 8601 date and time")
        );
    }

    #[tokio::test]
    async fn unregistered_tool_yields_error_entry() {
        let registry = ToolRegistry::new();
        registry.register("book_calendar", echo("calendar"));
        assert!(registry.unregister("book_calendar"));
        assert!(!registry.unregister("book_calendar"));

        let batch = ToolCall {
            function_calls: vec![call("1", "book_calendar", json!({}))],
        };
        let response = registry.dispatch(batch, None).await;
        assert_eq!(response.function_responses.len(), 1);
        assert_eq!(response.function_responses[0].error_message(), Some(NO_HANDLER));
    }

    #[tokio::test]
    async fn arguments_are_validated_against_the_declaration() {
        let registry = ToolRegistry::new();
        registry.register("search_youtube", echo("youtube"));
        let config = LiveConfig::new("models/test").with_tool(
            ToolDeclaration::new("search_youtube", "Search").with_parameters(
                Schema::object()
                    .required_property("query", Schema::string())
                    .property("maxResults", Schema::number()),
            ),
        );

        let batch = ToolCall {
            function_calls: vec![
                call("good", "search_youtube", json!({ "query": "rust" })),
                call("bad", "search_youtube", json!({ "maxResults": 3 })),
            ],
        };
        let response = registry.dispatch(batch, Some(&config)).await;

        assert_eq!(response.function_responses[0].error_message(), None);
        assert_eq!(
            response.function_responses[1].error_message(),
            Some("invalid arguments: missing required argument `query`")
        );
    }

    #[derive(Deserialize)]
    struct SearchArgs {
        query: String,
        #[serde(rename = "maxResults", default)]
        max_results: Option<u32>,
    }

    #[tokio::test]
    async fn typed_tool_decodes_arguments() {
        let registry = ToolRegistry::new();
        registry.register(
            "search_youtube",
            typed_tool(|args: SearchArgs| async move {
                Ok(json!({ "query": args.query, "limit": args.max_results.unwrap_or(5) }))
            }),
        );

        let batch = ToolCall {
            function_calls: vec![
                call("1", "search_youtube", json!({ "query": "tokio" })),
                call("2", "search_youtube", json!({ "query": 12 })),
            ],
        };
        let response = registry.dispatch(batch, None).await;

        assert_eq!(response.function_responses[0].response, json!({ "query": "tokio", "limit": 5 }));
        let error = response.function_responses[1].error_message().unwrap();
        assert!(error.starts_with("invalid arguments:"), "{error}");
    }

    #[tokio::test]
    async fn slow_handler_does_not_serialize_the_batch() {
        let registry = ToolRegistry::new();
        let started = Arc::new(tokio::sync::Barrier::new(2));
        for name in ["a", "b"] {
            let started = started.clone();
            registry.register(
                name,
                tool_fn(move |_| {
                    let started = started.clone();
                    async move {
                        // Both handlers must be running at once to pass the barrier.
                        started.wait().await;
                        Ok(json!({}))
                    }
                }),
            );
        }

        let batch = ToolCall {
            function_calls: vec![call("1", "a", json!({})), call("2", "b", json!({}))],
        };
        let response = tokio::time::timeout(Duration::from_secs(5), registry.dispatch(batch, None))
            .await
            .expect("handlers ran one after the other");
        let ids: HashSet<_> = response.function_responses.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn names_are_sorted() {
        let registry = ToolRegistry::new();
        registry.register("b", echo("b"));
        registry.register("a", echo("a"));
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert!(registry.contains("a"));
    }
}
