use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::internal::server::tool::handler::ToolExecutor;
use rmcp::model::Tool;

pub struct RegisteredTool {
    pub metadata: Tool,
    pub executor: ToolExecutor,
}

/// Thread-safe tool registry that can be shared across transports
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<RegisteredTool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: String, tool: RegisteredTool) {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredTool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Tool metadata ordered by name
    pub fn list_metadata(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|tool| tool.metadata.clone())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn count(&self) -> usize {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
