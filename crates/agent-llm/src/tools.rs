//! Tool descriptors attached to requests, and the local executor used for
//! the single tool round-trip of chat-completions nodes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Name of the provider-side search builtin
pub const WEB_SEARCH: &str = "$web_search";

/// Tool descriptor sent with a completion request
///
/// The serialized shape is exactly what the vendor expects in its `tools`
/// array, so each variant is tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSpec {
    /// Hosted web search (Responses dialect)
    WebSearch {
        /// Maximum number of results
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },

    /// Provider builtin function such as `$web_search` (chat dialect)
    BuiltinFunction {
        /// Builtin being enabled
        function: BuiltinFunction,
    },

    /// Caller-defined function with a JSON schema
    Function {
        /// Function definition
        function: FunctionDefinition,
    },
}

/// Name of a builtin function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinFunction {
    pub name: String,
}

/// Caller-defined function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name
    pub name: String,

    /// Description of what the function does
    pub description: String,

    /// JSON schema for the arguments
    pub parameters: Value,
}

impl ToolSpec {
    /// Hosted web search with a result limit
    pub fn web_search(limit: u32) -> Self {
        Self::WebSearch { limit: Some(limit) }
    }

    /// Provider builtin function
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::BuiltinFunction {
            function: BuiltinFunction { name: name.into() },
        }
    }

    /// Caller-defined function
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self::Function {
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

type Handler = Box<dyn Fn(&Value) -> String + Send + Sync>;

/// Synchronous name-to-handler table
///
/// Runs on the bridge worker thread between the non-streaming call and the
/// streaming follow-up. Unknown names never fail the node: they produce an
/// error string that is sent back to the model as the tool result.
#[derive(Default)]
pub struct ToolExecutor {
    handlers: HashMap<String, Handler>,
}

impl ToolExecutor {
    /// Create an empty executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor with the `$web_search` builtin registered
    ///
    /// The search itself runs provider-side, so the local handler only
    /// echoes the arguments back.
    pub fn with_web_search() -> Self {
        Self::new().register(WEB_SEARCH, |args| args.to_string())
    }

    /// Register a handler
    pub fn register<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }

    /// Whether a handler exists for `name`
    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Run the handler for `name`
    pub fn execute(&self, name: &str, args: &Value) -> String {
        match self.handlers.get(name) {
            Some(handler) => handler(args),
            None => format!("Error: unknown tool '{name}'"),
        }
    }
}

impl fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("ToolExecutor").field("tools", &names).finish()
    }
}
