use std::collections::HashMap;
use std::sync::Arc;

use toolchat_model::{ModelTool, ToolCallRequest};

use crate::tool::object::{
    BoxedToolFuture, DynamicToolObject, ToolObject, TypedToolObject,
};
use crate::tool::{DynamicTool, Error, Tool, ToolResult};

/// An object that manages toolset and handles requests from the model.
#[derive(Default)]
pub struct Manager {
    tools: HashMap<String, Arc<dyn ToolObject>>,
}

impl Manager {
    /// Registers a typed tool, replacing any tool with the same name.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        self.insert(Arc::new(TypedToolObject(tool)));
    }

    /// Registers a dynamic tool, replacing any tool with the same name.
    pub fn add_dynamic_tool(&mut self, tool: Arc<dyn DynamicTool>) {
        self.insert(Arc::new(DynamicToolObject(tool)));
    }

    fn insert(&mut self, tool: Arc<dyn ToolObject>) {
        let name = tool.name().to_owned();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!("tool `{name}` registered twice, keeping the later one");
        }
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the definitions of all tools, sorted by name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Turns every request into a future and hands it to `spawner` along
    /// with the request's position.
    ///
    /// Every request produces exactly one future. Requests for unknown
    /// tools resolve to a [`NotFound`](super::ErrorKind::NotFound) error.
    pub(crate) fn handle_requests<S>(
        &self,
        requests: &[ToolCallRequest],
        mut spawner: S,
    ) where
        S: FnMut(usize, BoxedToolFuture),
    {
        let span = debug_span!("tool manager");
        let _enter = span.enter();

        for (index, req) in requests.iter().enumerate() {
            let Some(tool) = self.tools.get(&req.name) else {
                warn!("tool not found: {}", req.name);
                let err = Error::not_found()
                    .with_reason(format!("no tool named `{}`", req.name));
                spawner(index, Box::pin(std::future::ready(ToolResult::Err(err))));
                continue;
            };

            trace!("spawning a tool ({}) with args: {:?}", req.id, req.arguments);
            spawner(index, Arc::clone(tool).execute(req.arguments.clone()));
        }
    }
}
