use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use super::{DynamicTool, Error, Tool, ToolResult};

pub(crate) type BoxedToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// Type-erased tool, shared by typed and dynamic tools.
pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    fn execute(self: Arc<Self>, arguments: Value) -> BoxedToolFuture;
}

pub(crate) struct TypedToolObject<T: Tool>(pub T);

impl<T: Tool> ToolObject for TypedToolObject<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    fn execute(self: Arc<Self>, arguments: Value) -> BoxedToolFuture {
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(std::future::ready(ToolResult::Err(
                    Error::invalid_input().with_reason(reason),
                )));
            }
        };
        let span = debug_span!("tool execute", name = self.name());
        Box::pin(self.0.execute(input).instrument(span))
    }
}

pub(crate) struct DynamicToolObject(pub Arc<dyn DynamicTool>);

impl ToolObject for DynamicToolObject {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    fn execute(self: Arc<Self>, arguments: Value) -> BoxedToolFuture {
        let span = debug_span!("tool execute", name = self.name());
        Box::pin(async move { self.0.call(arguments).await }.instrument(span))
    }
}
