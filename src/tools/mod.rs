//! Tool system - registry, dispatch, and the built-in companion tool set

mod builtin;
mod dispatcher;
mod registry;

pub use builtin::{SYSTEM_INSTRUCTION_KEY, builtin_registry};
pub use dispatcher::ToolDispatcher;
pub use registry::{RegisteredTool, ToolArgs, ToolHandler, ToolParam, ToolRegistry, ToolSpec};
